//! A micro-benchmark driver ("arrow") for point-to-point AMQP 1.0 message transfer.
//!
//! An arrow is one half of a paired producer/consumer harness: it connects (or
//! listens), opens a single sender or receiver link, streams messages under
//! credit-based flow control and emits one timing record per message on stdout
//! for external latency/throughput analysis.
//!
//! ## Design
//!
//! * The arrow does *not* implement AMQP framing, SASL or TLS. All of that is
//!   the job of an external protocol engine which delivers typed lifecycle
//!   events (connection opened, link opened, credit granted, delivery
//!   received/acknowledged, transport closed, timer fired) and accepts
//!   outbound operations (connect, listen, open link, send bytes, grant
//!   credit, accept, close). The seam is the [`engine::ProtocolEngine`] trait;
//!   any conforming engine - a real AMQP library adapter or a test double -
//!   can drive the arrow.
//! * The driver is a single-threaded state machine: one dispatch loop pulls
//!   ready events from the engine and handles them synchronously. There is at
//!   most one connection, one link and one logical unit of in-flight work per
//!   process, so no locks are needed. The duration timer is just another
//!   event in the stream, not a concurrent mutation.
//! * Flow control, not retry, paces work against the peer: a sender produces
//!   exactly as many messages as it holds credit for, a receiver tops its
//!   credit window up by `credit_window - current_credit` after each
//!   processed delivery.
//!
//! ## Message schema
//!
//! Exactly one canonical on-wire schema is supported, and a peer deviating
//! from it is a fatal error (the benchmark assumes a cooperating peer):
//!
//! * the message id is the decimal string form of a counter starting at 1,
//!   carried in the native id field
//! * the application property section is a single-entry map
//!   `"SendTime" -> i64` milliseconds since the epoch
//! * the body is an opaque, fixed-size byte string
//!
//! ## Output contract
//!
//! Every successful send writes `<id>,<send_time_ms>` and every successful
//! receive writes `<id>,<send_time_ms>,<receive_time_ms>` to stdout, one line
//! per message, in event-processing order. With settlement sampling enabled,
//! a sender additionally writes `S<delivery_tag>,<ack_time_ms>` for one in
//! every 256 acknowledgments. Nothing else is ever written to stdout;
//! diagnostics go to stderr.

pub mod codec;
pub mod config;
pub mod driver;
pub mod engine;
pub mod flow;
pub mod harness;
pub mod message;
pub mod termination;
pub mod transfer;
