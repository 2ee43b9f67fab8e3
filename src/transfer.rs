use crate::codec::CodecBuffer;
use crate::engine::{DeliveryId, ProtocolEngine};
use crate::flow::FlowController;
use crate::message::Message;
use bytes::Bytes;
use std::io::Write;
use std::time::SystemTime;
use tracing::{error, trace};

/// Milliseconds since the epoch, the timestamp resolution of timing records.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .expect("system clock is before the unix epoch")
        .as_millis() as i64
}

/// Where the per-message timing records go. Exactly one component - the
/// transfer engine - writes records, in event-processing order; the external
/// analysis tooling matches lines by position.
pub trait RecordSink: Send {
    /// `<id>,<send_time_ms>`
    fn on_sent(&mut self, id: u64, send_time: i64);

    /// `<id>,<send_time_ms>,<receive_time_ms>`
    fn on_received(&mut self, id: u64, send_time: i64, receive_time: i64);

    /// `S<delivery_tag>,<ack_time_ms>` - sampled settlement diagnostics
    fn on_settled(&mut self, tag: u64, ack_time: i64);
}

/// Production sink: line-per-record on stdout. Write errors are logged, not
/// propagated - if stdout is gone the benchmark output is lost either way.
pub struct StdoutSink {
    out: std::io::Stdout,
}

impl StdoutSink {
    pub fn new() -> StdoutSink {
        StdoutSink {
            out: std::io::stdout(),
        }
    }
}

impl Default for StdoutSink {
    fn default() -> StdoutSink {
        StdoutSink::new()
    }
}

impl RecordSink for StdoutSink {
    fn on_sent(&mut self, id: u64, send_time: i64) {
        if let Err(e) = writeln!(self.out, "{},{}", id, send_time) {
            error!("error writing send record: {}", e);
        }
    }

    fn on_received(&mut self, id: u64, send_time: i64, receive_time: i64) {
        if let Err(e) = writeln!(self.out, "{},{},{}", id, send_time, receive_time) {
            error!("error writing receive record: {}", e);
        }
    }

    fn on_settled(&mut self, tag: u64, ack_time: i64) {
        if let Err(e) = writeln!(self.out, "S{},{}", tag, ack_time) {
            error!("error writing settlement record: {}", e);
        }
    }
}

/// In-memory sink for tests and the loopback harness: records formatted
/// exactly like [`StdoutSink`] lines, minus the newline.
#[derive(Default)]
pub struct MemorySink {
    pub lines: Vec<String>,
}

impl RecordSink for MemorySink {
    fn on_sent(&mut self, id: u64, send_time: i64) {
        self.lines.push(format!("{},{}", id, send_time));
    }

    fn on_received(&mut self, id: u64, send_time: i64, receive_time: i64) {
        self.lines.push(format!("{},{},{}", id, send_time, receive_time));
    }

    fn on_settled(&mut self, tag: u64, ack_time: i64) {
        self.lines.push(format!("S{},{}", tag, ack_time));
    }
}

/// Progress counters, incremented exactly once per protocol event and never
/// decremented. For a sender `acknowledged <= sent <= desired_count` (when
/// bounded); for a receiver `received <= desired_count`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Counters {
    pub sent: u64,
    pub received: u64,
    pub acknowledged: u64,
}

/// Settlement records are sampled: one acknowledgment in every batch of this
/// size carries a record, keeping the diagnostic cheap at high rates.
const SETTLEMENT_SAMPLE_MASK: u64 = 255;

/// Drives the send or receive workload: produces/consumes messages, keeps the
/// counters, and emits the timing records. One unit of work per dispatch; the
/// role is fixed for the life of the arrow by which paths the driver invokes.
pub struct TransferEngine<S: RecordSink> {
    body: Bytes,
    durable: bool,
    settlement: bool,
    desired_count: u64,
    pub flow: FlowController,
    codec: CodecBuffer,
    pub counters: Counters,
    sink: S,
}

impl<S: RecordSink> TransferEngine<S> {
    pub fn new(
        body_size: usize,
        durable: bool,
        settlement: bool,
        desired_count: u64,
        credit_window: u32,
        sink: S,
    ) -> TransferEngine<S> {
        TransferEngine {
            // fixed body template, reused for every message - only size matters
            body: Bytes::from(vec![b'x'; body_size]),
            durable,
            settlement,
            desired_count,
            flow: FlowController::new(credit_window),
            codec: CodecBuffer::new(),
            counters: Counters::default(),
            sink,
        }
    }

    /// Send path: produce messages while credit and the count budget allow.
    /// Sends occur in increasing id order; the delivery tag equals the id.
    pub fn on_sendable(&mut self, engine: &mut dyn ProtocolEngine) -> anyhow::Result<()> {
        while self.flow.available_sends(self.counters.sent, self.desired_count) > 0 {
            let id = self.counters.sent + 1;
            let send_time = now_millis();
            let message = Message::build(id, send_time, self.body.clone(), self.durable);

            let len = self.codec.encode(&message);
            engine.send_bytes(id, &self.codec.encoded()[..len])?;

            self.counters.sent += 1;
            self.flow.on_send();
            self.sink.on_sent(id, send_time);
        }
        trace!("send burst done, sent={}", self.counters.sent);
        Ok(())
    }

    /// Acknowledgment path: count the settlement, sampling a settlement
    /// record for one acknowledgment per batch when enabled.
    pub fn on_acknowledged(&mut self, tag: u64) {
        if self.settlement && (self.counters.acknowledged & SETTLEMENT_SAMPLE_MASK) == 0 {
            self.sink.on_settled(tag, now_millis());
        }
        self.counters.acknowledged += 1;
    }

    /// Receive path for one complete delivery: decode, record, accept.
    /// Credit top-up is the driver's follow-up step.
    pub fn on_delivery(
        &mut self,
        engine: &mut dyn ProtocolEngine,
        delivery: DeliveryId,
        payload: &[u8],
    ) -> anyhow::Result<()> {
        self.flow.on_delivery();

        let message = self.codec.decode(payload)?;
        self.sink.on_received(message.id, message.send_time, now_millis());

        engine.accept(delivery)?;
        self.counters.received += 1;
        Ok(())
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}
