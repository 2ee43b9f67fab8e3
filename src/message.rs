use anyhow::bail;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use bytes_varint::try_get_fixed::TryGetFixedSupport;
use bytes_varint::{VarIntSupport, VarIntSupportMut};

/// Key of the single entry in the application property map.
pub const SEND_TIME_KEY: &str = "SendTime";

/// Wire tag for an i64 property value. The property map is fixed-schema, but
/// the tag is kept on the wire so a peer speaking a different schema fails
/// loudly instead of decoding garbage timestamps.
const TAG_I64: u8 = 0x81;

/// In-memory representation of one benchmark message.
///
/// The id is unique within the process lifetime of the link (a counter
/// starting at 1); on the wire it travels in decimal string form in the native
/// id field. `send_time` is milliseconds since the epoch, set immediately
/// before each send and carried as the sole entry of the property map. The
/// body is opaque - only its size matters to the benchmark.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: u64,
    pub send_time: i64,
    pub body: Bytes,
    pub durable: bool,
}

/// Signals that the target buffer's capacity is too small for the encoded
/// message. Recovered by the codec buffer through growth and retry; every
/// other decode/encode failure is fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeOverflow {
    pub required: usize,
}

impl Message {
    pub fn build(id: u64, send_time: i64, body: Bytes, durable: bool) -> Message {
        Message { id, send_time, body, durable }
    }

    /// Exact encoded size, used for the overflow check before writing.
    pub fn encoded_len(&self) -> usize {
        let id_str_len = decimal_len(self.id);
        varint_len(id_str_len as u64) + id_str_len        // id string
            + 1                                           // durable flag
            + 1                                           // property map arity
            + varint_len(SEND_TIME_KEY.len() as u64) + SEND_TIME_KEY.len()
            + 1 + 8                                       // type tag + timestamp
            + 4 + self.body.len()                         // body
    }

    /// Encodes into `buf` without growing it: if the encoded form does not
    /// fit the current capacity, an overflow signal is returned and nothing
    /// is written. Returns the number of bytes written.
    pub fn encode(&self, buf: &mut BytesMut) -> Result<usize, EncodeOverflow> {
        let required = self.encoded_len();
        if buf.len() + required > buf.capacity() {
            return Err(EncodeOverflow { required });
        }

        let id_str = self.id.to_string();
        buf.put_usize_varint(id_str.len());
        buf.put_slice(id_str.as_bytes());
        buf.put_u8(self.durable as u8);
        buf.put_u8(1); // property map arity
        buf.put_usize_varint(SEND_TIME_KEY.len());
        buf.put_slice(SEND_TIME_KEY.as_bytes());
        buf.put_u8(TAG_I64);
        buf.put_i64(self.send_time);
        buf.put_u32(self.body.len() as u32);
        buf.put_slice(&self.body);
        Ok(required)
    }

    /// Decodes a complete wire message.
    ///
    /// Any deviation from the canonical schema - wrong property map arity,
    /// wrong key, wrong value type, non-numeric id, truncation - is an error:
    /// the benchmark assumes a cooperating peer, and a schema mismatch means
    /// the timing records would be garbage.
    pub fn decode(buf: &mut impl Buf) -> anyhow::Result<Message> {
        let id_str = get_string(buf)?;
        let id: u64 = match id_str.parse() {
            Ok(id) => id,
            Err(_) => bail!("message id is not a decimal number: {:?}", id_str),
        };

        let durable = match buf.try_get_u8()? {
            0 => false,
            1 => true,
            other => bail!("invalid durable flag: {}", other),
        };

        let arity = buf.try_get_u8()?;
        if arity != 1 {
            bail!("unexpected property map arity: {}", arity);
        }
        let key = get_string(buf)?;
        if key != SEND_TIME_KEY {
            bail!("unexpected property name: {:?}", key);
        }
        let tag = buf.try_get_u8()?;
        if tag != TAG_I64 {
            bail!("unexpected property type tag: {:#x}", tag);
        }
        let send_time = buf.try_get_i64()?;

        let body_len = buf.try_get_u32()? as usize;
        if buf.remaining() < body_len {
            bail!("truncated message body: {} of {} bytes", buf.remaining(), body_len);
        }
        let body = buf.copy_to_bytes(body_len);

        Ok(Message { id, send_time, body, durable })
    }
}

fn get_string(buf: &mut impl Buf) -> anyhow::Result<String> {
    let len = buf.try_get_usize_varint()?;
    if buf.remaining() < len {
        bail!("truncated string: {} of {} bytes", buf.remaining(), len);
    }
    Ok(String::from_utf8(buf.copy_to_bytes(len).to_vec())?)
}

fn decimal_len(n: u64) -> usize {
    n.to_string().len()
}

fn varint_len(n: u64) -> usize {
    let mut len = 1;
    let mut n = n >> 7;
    while n != 0 {
        len += 1;
        n >>= 7;
    }
    len
}
