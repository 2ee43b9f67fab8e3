use async_trait::async_trait;
use bytes::Bytes;
#[cfg(test)]
use mockall::automock;
use std::fmt;
use std::time::Duration;

/// Identifies one in-flight delivery on the receiver side, engine-assigned.
pub type DeliveryId = u64;

/// An AMQP error condition as reported by the peer or the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub name: String,
    pub description: String,
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.description)
    }
}

/// Lifecycle events delivered by the protocol engine, consumed one at a time
/// by the driver's dispatch loop. Events can be synthesized in tests, so the
/// whole state machine is testable without a live network.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrowEvent {
    /// The listener is ready (server connection mode only).
    ListenerOpen,
    /// The connection is established (outbound or accepted).
    ConnectionOpened,
    /// The peer attached its end of the link. For a passively opened link the
    /// engine reports the address the peer asked for, to be mirrored locally.
    LinkRemoteOpened { address: Option<String> },
    /// Sender side: the link's current credit, as granted by the peer.
    CreditGranted { credit: u32 },
    /// Receiver side: a delivery is readable. `partial` deliveries are not
    /// yet complete and must be ignored until the engine re-delivers them.
    DeliveryReceived {
        delivery: DeliveryId,
        payload: Bytes,
        partial: bool,
    },
    /// Sender side: the peer settled the delivery with the given tag.
    DeliveryAcknowledged { tag: u64 },
    /// The peer closed the link, session or connection.
    RemoteClosed { condition: Option<Condition> },
    /// The underlying transport went away.
    TransportClosed { condition: Option<Condition> },
    /// The duration timer elapsed.
    TimerFired,
    /// The engine has no more work pending; the process can exit.
    Exhausted,
}

/// The external protocol engine: a pre-existing AMQP 1.0 implementation (or a
/// test double) that owns framing, SASL, TLS and I/O. The arrow only issues
/// these operations and consumes the resulting [`ArrowEvent`] stream.
///
/// All operations apply to the process's single connection/link; `close` is
/// idempotent - closing an already-closing entity is a no-op.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ProtocolEngine: Send {
    fn connect(&mut self, host: &str, port: &str) -> anyhow::Result<()>;

    fn listen(&mut self, host: &str, port: &str) -> anyhow::Result<()>;

    fn open_sender(&mut self, address: &str) -> anyhow::Result<()>;

    fn open_receiver(&mut self, address: &str) -> anyhow::Result<()>;

    /// Hands one encoded message to the engine for transmission, tagged with
    /// the numeric delivery tag used in acknowledgment events.
    fn send_bytes(&mut self, tag: u64, payload: &[u8]) -> anyhow::Result<()>;

    /// Receiver side: grants `amount` additional credit to the peer.
    fn grant_credit(&mut self, amount: u32) -> anyhow::Result<()>;

    /// Accepts and settles a received delivery.
    fn accept(&mut self, delivery: DeliveryId) -> anyhow::Result<()>;

    fn set_timeout(&mut self, after: Duration);

    fn cancel_timeout(&mut self);

    /// Requests close of the active link/session/connection and any listener.
    fn close(&mut self);

    /// Pulls the next ready lifecycle event, suspending until one is
    /// available. `None` means the engine is gone and the loop must end.
    async fn next_event(&mut self) -> Option<ArrowEvent>;
}
