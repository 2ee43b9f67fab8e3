use crate::message::Message;
use bytes::BytesMut;
use tracing::trace;

/// Minimum scratch capacity; encode starts here and doubles on overflow.
pub const BUF_MIN: usize = 1024;

/// Growable scratch buffer for message encode/decode.
///
/// There is exactly one of these per arrow, owned by the transfer engine and
/// only ever touched from the dispatch thread. Content never survives a call:
/// it is scratch space, so growth reallocates without preserving anything.
pub struct CodecBuffer {
    buf: BytesMut,
}

impl CodecBuffer {
    pub fn new() -> CodecBuffer {
        CodecBuffer {
            buf: BytesMut::with_capacity(BUF_MIN),
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    /// Grows the buffer to at least `min_size` bytes. Scratch content is
    /// discarded.
    pub fn ensure_capacity(&mut self, min_size: usize) {
        if self.buf.capacity() < min_size {
            trace!("growing codec buffer from {} to {} bytes", self.buf.capacity(), min_size);
            self.buf = BytesMut::with_capacity(min_size);
        }
    }

    /// Encodes `message` into the scratch buffer, doubling the capacity and
    /// retrying on overflow. Returns the encoded length; the bytes are
    /// available via [`CodecBuffer::encoded`] until the next call.
    pub fn encode(&mut self, message: &Message) -> usize {
        loop {
            self.buf.clear();
            match message.encode(&mut self.buf) {
                Ok(len) => return len,
                Err(_overflow) => {
                    let doubled = self.buf.capacity() * 2;
                    self.ensure_capacity(doubled);
                }
            }
        }
    }

    pub fn encoded(&self) -> &[u8] {
        &self.buf
    }

    /// Stages `wire_bytes` in the scratch buffer and decodes them. Schema
    /// violations propagate as fatal errors.
    pub fn decode(&mut self, wire_bytes: &[u8]) -> anyhow::Result<Message> {
        self.ensure_capacity(wire_bytes.len());
        self.buf.clear();
        self.buf.extend_from_slice(wire_bytes);
        Message::decode(&mut self.buf.as_ref())
    }
}

impl Default for CodecBuffer {
    fn default() -> CodecBuffer {
        CodecBuffer::new()
    }
}
