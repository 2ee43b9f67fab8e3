use crate::codec::CodecBuffer;
use crate::engine::{ArrowEvent, DeliveryId, ProtocolEngine};
use crate::message::Message;
use crate::transfer::now_millis;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

/// Address the loopback peer attaches to when it initiates the link
/// (passive channel mode on the arrow side).
pub const PEER_ADDRESS: &str = "loopback";

/// In-process protocol engine with a scripted peer on the other end of the
/// link. Loopback only: the wire is a queue of [`ArrowEvent`]s filled
/// synchronously by each operation, so the arrow exercises its full
/// connect/attach/flow/transfer/close lifecycle without a network. A real
/// AMQP engine adapter plugs into the same [`ProtocolEngine`] seam.
pub struct HarnessEngine {
    queue: VecDeque<ArrowEvent>,
    peer: Peer,
    deadline: Option<Instant>,
    next_delivery: DeliveryId,
    peer_attached: bool,
    closed: bool,
}

enum Peer {
    /// Receives what the arrow sends: grants a credit window on attach,
    /// acknowledges every transfer, re-grants the window once it is drained.
    Accepting {
        credit_window: u32,
        credit_left: u32,
    },
    /// Produces pre-encoded payloads against the credit the arrow grants.
    Scripted { pending: VecDeque<Bytes> },
    /// Produces well-formed messages on demand against granted credit,
    /// optionally bounded by a message count.
    Generating {
        next_id: u64,
        limit: Option<u64>,
        body: Bytes,
        durable: bool,
        codec: CodecBuffer,
    },
}

impl HarnessEngine {
    /// Peer for a send-mode arrow.
    pub fn accepting_peer(credit_window: u32) -> HarnessEngine {
        HarnessEngine::new(Peer::Accepting {
            credit_window,
            credit_left: credit_window,
        })
    }

    /// Peer for a receive-mode arrow, delivering exactly these payloads.
    pub fn scripted_peer(payloads: Vec<Bytes>) -> HarnessEngine {
        HarnessEngine::new(Peer::Scripted {
            pending: payloads.into_iter().collect(),
        })
    }

    /// Peer for a receive-mode arrow, generating messages on demand.
    pub fn generating_peer(limit: Option<u64>, body_size: usize, durable: bool) -> HarnessEngine {
        HarnessEngine::new(Peer::Generating {
            next_id: 1,
            limit,
            body: Bytes::from(vec![b'x'; body_size]),
            durable,
            codec: CodecBuffer::new(),
        })
    }

    fn new(peer: Peer) -> HarnessEngine {
        HarnessEngine {
            queue: VecDeque::new(),
            peer,
            deadline: None,
            next_delivery: 1,
            peer_attached: false,
            closed: false,
        }
    }

    /// Peer-side production: turn `amount` of granted credit into queued
    /// deliveries, as far as the peer has messages left.
    fn produce(&mut self, amount: u32) {
        for _ in 0..amount {
            let payload = match &mut self.peer {
                Peer::Scripted { pending } => pending.pop_front(),
                Peer::Generating { next_id, limit, body, durable, codec } => {
                    let exhausted = matches!(limit, Some(limit) if *next_id > *limit);
                    if exhausted {
                        None
                    } else {
                        let message = Message::build(*next_id, now_millis(), body.clone(), *durable);
                        *next_id += 1;
                        let len = codec.encode(&message);
                        Some(Bytes::copy_from_slice(&codec.encoded()[..len]))
                    }
                }
                Peer::Accepting { .. } => None,
            };

            match payload {
                Some(payload) => {
                    let delivery = self.next_delivery;
                    self.next_delivery += 1;
                    self.queue.push_back(ArrowEvent::DeliveryReceived {
                        delivery,
                        payload,
                        partial: false,
                    });
                }
                None => {
                    trace!("peer has no more messages to produce");
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl ProtocolEngine for HarnessEngine {
    fn connect(&mut self, host: &str, port: &str) -> anyhow::Result<()> {
        debug!("harness: connecting to {}:{}", host, port);
        self.queue.push_back(ArrowEvent::ConnectionOpened);
        Ok(())
    }

    fn listen(&mut self, host: &str, port: &str) -> anyhow::Result<()> {
        debug!("harness: listening on {}:{}", host, port);
        self.queue.push_back(ArrowEvent::ListenerOpen);
        // the loopback peer connects as soon as the listener is up and
        // initiates the link attach, naming the address it wants
        self.queue.push_back(ArrowEvent::ConnectionOpened);
        self.queue.push_back(ArrowEvent::LinkRemoteOpened {
            address: Some(PEER_ADDRESS.to_string()),
        });
        self.peer_attached = true;
        Ok(())
    }

    fn open_sender(&mut self, address: &str) -> anyhow::Result<()> {
        debug!("harness: sender link for {:?} attached", address);
        if !self.peer_attached {
            self.queue.push_back(ArrowEvent::LinkRemoteOpened { address: None });
            self.peer_attached = true;
        }
        if let Peer::Accepting { credit_window, .. } = self.peer {
            self.queue.push_back(ArrowEvent::CreditGranted { credit: credit_window });
        }
        Ok(())
    }

    fn open_receiver(&mut self, address: &str) -> anyhow::Result<()> {
        debug!("harness: receiver link for {:?} attached", address);
        if !self.peer_attached {
            self.queue.push_back(ArrowEvent::LinkRemoteOpened { address: None });
            self.peer_attached = true;
        }
        Ok(())
    }

    fn send_bytes(&mut self, tag: u64, payload: &[u8]) -> anyhow::Result<()> {
        // the peer decodes what it receives, so a malformed sender fails here
        Message::decode(&mut &*payload)?;

        self.queue.push_back(ArrowEvent::DeliveryAcknowledged { tag });

        if let Peer::Accepting { credit_window, credit_left } = &mut self.peer {
            *credit_left = credit_left.saturating_sub(1);
            if *credit_left == 0 {
                *credit_left = *credit_window;
                trace!("harness: peer re-grants credit window of {}", credit_window);
                self.queue.push_back(ArrowEvent::CreditGranted { credit: *credit_window });
            }
        }
        Ok(())
    }

    fn grant_credit(&mut self, amount: u32) -> anyhow::Result<()> {
        trace!("harness: arrow granted {} credit", amount);
        self.produce(amount);
        Ok(())
    }

    fn accept(&mut self, delivery: DeliveryId) -> anyhow::Result<()> {
        trace!("harness: delivery {} accepted", delivery);
        Ok(())
    }

    fn set_timeout(&mut self, after: Duration) {
        self.deadline = Some(Instant::now() + after);
    }

    fn cancel_timeout(&mut self) {
        self.deadline = None;
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        debug!("harness: closing");
        // link teardown discards deliveries still in flight
        self.queue
            .retain(|event| !matches!(event, ArrowEvent::DeliveryReceived { .. }));
        self.queue.push_back(ArrowEvent::TransportClosed { condition: None });
        self.queue.push_back(ArrowEvent::Exhausted);
    }

    async fn next_event(&mut self) -> Option<ArrowEvent> {
        // the timer preempts queued work so a busy link cannot starve it
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                self.deadline = None;
                return Some(ArrowEvent::TimerFired);
            }
        }

        if let Some(event) = self.queue.pop_front() {
            return Some(event);
        }

        if let Some(deadline) = self.deadline.take() {
            tokio::time::sleep_until(deadline).await;
            return Some(ArrowEvent::TimerFired);
        }

        if self.closed {
            return None;
        }

        warn!("harness: peer has no further events, reporting exhaustion");
        Some(ArrowEvent::Exhausted)
    }
}
