use crate::config::{ArrowConfig, ChannelMode, ConnectionMode, Operation};
use crate::engine::{ArrowEvent, ProtocolEngine};
use crate::termination::TerminationPolicy;
use crate::transfer::{Counters, RecordSink, TransferEngine};
use anyhow::bail;
use std::time::Duration;
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DriverState {
    Init,
    Connecting,
    Listening,
    Connected,
    LinkOpening,
    LinkActive,
    Closing,
    Closed,
}

/// The arrow: top-level state machine over the engine's lifecycle events.
///
/// Exactly one link is driven to completion per instance. Dispatch is
/// single-threaded: the run loop pulls one event at a time and handles it
/// synchronously, so counters and the codec buffer need no synchronization.
/// The duration timer surfaces as [`ArrowEvent::TimerFired`] in the same
/// stream rather than racing the loop from another thread.
pub struct Arrow<E: ProtocolEngine, S: RecordSink> {
    config: ArrowConfig,
    engine: E,
    transfer: TransferEngine<S>,
    termination: TerminationPolicy,
    state: DriverState,
    link_opened_locally: bool,
    initial_credit_granted: bool,
}

impl<E: ProtocolEngine, S: RecordSink> Arrow<E, S> {
    pub fn new(config: ArrowConfig, engine: E, sink: S) -> Arrow<E, S> {
        let transfer = TransferEngine::new(
            config.body_size,
            config.durable,
            config.settlement,
            config.desired_count,
            config.credit_window,
            sink,
        );
        let termination = TerminationPolicy::new(config.desired_count);

        Arrow {
            config,
            engine,
            transfer,
            termination,
            state: DriverState::Init,
            link_opened_locally: false,
            initial_credit_granted: false,
        }
    }

    pub fn counters(&self) -> Counters {
        self.transfer.counters
    }

    pub fn sink(&self) -> &S {
        self.transfer.sink()
    }

    /// Connects or listens, arms the duration timer, then dispatches events
    /// until the engine is exhausted or a fatal error surfaces.
    pub async fn run(&mut self) -> anyhow::Result<Counters> {
        self.start()?;

        while let Some(event) = self.engine.next_event().await {
            trace!("dispatching {:?} in state {:?}", event, self.state);
            if !self.handle(event)? {
                break;
            }
        }

        Ok(self.transfer.counters)
    }

    fn start(&mut self) -> anyhow::Result<()> {
        if self.config.desired_duration > Duration::ZERO {
            self.engine.set_timeout(self.config.desired_duration);
        }

        match self.config.connection_mode {
            ConnectionMode::Client => {
                debug!("connecting to {}:{}", self.config.host, self.config.port);
                self.engine.connect(&self.config.host, &self.config.port)?;
                self.state = DriverState::Connecting;
            }
            ConnectionMode::Server => {
                debug!("listening on {}:{}", self.config.host, self.config.port);
                self.engine.listen(&self.config.host, &self.config.port)?;
                self.state = DriverState::Listening;
            }
        }
        Ok(())
    }

    /// Handles one lifecycle event; returns false once the engine has no more
    /// work and the process can exit.
    fn handle(&mut self, event: ArrowEvent) -> anyhow::Result<bool> {
        match event {
            ArrowEvent::ListenerOpen => {
                debug!("listener is ready");
            }

            ArrowEvent::ConnectionOpened => {
                self.state = DriverState::Connected;
                if self.config.channel_mode == ChannelMode::Active {
                    self.open_link(None)?;
                    self.state = DriverState::LinkOpening;
                }
            }

            ArrowEvent::LinkRemoteOpened { address } => {
                if !self.link_opened_locally {
                    // passive mode: mirror the address the peer attached to
                    self.open_link(address.as_deref())?;
                }
                if self.config.operation == Operation::Receive && !self.initial_credit_granted {
                    let amount = self.transfer.flow.initial_grant();
                    debug!("granting initial credit window of {}", amount);
                    self.engine.grant_credit(amount)?;
                    self.initial_credit_granted = true;
                }
                self.state = DriverState::LinkActive;
            }

            ArrowEvent::CreditGranted { credit } => match self.state {
                DriverState::Closing | DriverState::Closed => {
                    trace!("ignoring flow update on a closing link");
                }
                DriverState::LinkActive => {
                    if self.config.operation == Operation::Send {
                        self.transfer.flow.credit_updated(credit);
                        self.transfer.on_sendable(&mut self.engine)?;
                    } else {
                        trace!("ignoring flow update on receiver link");
                    }
                }
                _ => bail!("credit granted before the link is active"),
            },

            ArrowEvent::DeliveryReceived { delivery, payload, partial } => {
                if self.config.operation != Operation::Receive {
                    bail!("unexpected inbound delivery on a sender link");
                }
                match self.state {
                    DriverState::Closing | DriverState::Closed => {
                        // in flight when the count target latched the stop
                        trace!("ignoring delivery {} on a closing link", delivery);
                        return Ok(true);
                    }
                    DriverState::LinkActive => {}
                    _ => bail!("delivery before the link is active"),
                }
                if partial {
                    trace!("delivery {} is partial, waiting for completion", delivery);
                    return Ok(true);
                }

                self.transfer.on_delivery(&mut self.engine, delivery, &payload)?;

                if self.termination.count_reached(self.transfer.counters.received) {
                    self.stop();
                } else {
                    let amount = self.transfer.flow.topup_amount();
                    if amount > 0 {
                        self.engine.grant_credit(amount)?;
                        self.transfer.flow.granted(amount);
                    }
                }
            }

            ArrowEvent::DeliveryAcknowledged { tag } => {
                if self.config.operation != Operation::Send {
                    bail!("unexpected acknowledgment on a receiver link");
                }
                match self.state {
                    DriverState::Closing | DriverState::Closed => {
                        trace!("ignoring acknowledgment {} on a closing link", tag);
                        return Ok(true);
                    }
                    DriverState::LinkActive => {}
                    _ => bail!("acknowledgment before the link is active"),
                }
                self.transfer.on_acknowledged(tag);

                if self.termination.count_reached(self.transfer.counters.acknowledged) {
                    self.stop();
                }
            }

            ArrowEvent::RemoteClosed { condition } => {
                if let Some(condition) = condition {
                    bail!("remote closed with error condition: {}", condition);
                }
                // complete the close handshake
                self.engine.close();
                self.state = DriverState::Closing;
            }

            ArrowEvent::TransportClosed { condition } => {
                match (self.config.connection_mode, condition) {
                    (ConnectionMode::Client, Some(condition)) => {
                        bail!("transport error: {}", condition);
                    }
                    (ConnectionMode::Server, Some(condition)) => {
                        // probe connections testing the listener are expected noise
                        debug!("ignoring transport error on listener: {}", condition);
                    }
                    (_, None) => {
                        trace!("transport closed cleanly");
                    }
                }
            }

            ArrowEvent::TimerFired => {
                debug!("duration elapsed");
                self.stop();
            }

            ArrowEvent::Exhausted => {
                self.state = DriverState::Closed;
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn open_link(&mut self, mirrored_address: Option<&str>) -> anyhow::Result<()> {
        let address = mirrored_address.unwrap_or(&self.config.path).to_string();
        match self.config.operation {
            Operation::Send => {
                debug!("opening sender link for {:?}", address);
                self.engine.open_sender(&address)?;
            }
            Operation::Receive => {
                debug!("opening receiver link for {:?}", address);
                self.engine.open_receiver(&address)?;
            }
        }
        self.link_opened_locally = true;
        Ok(())
    }

    /// Voluntary stop: close everything and cancel the timer so a stale fire
    /// cannot arrive after shutdown. Latched - the count/duration race
    /// resolves to a single close.
    fn stop(&mut self) {
        if !self.termination.begin_stop() {
            return;
        }
        debug!("stopping: {:?}", self.transfer.counters);
        self.engine.close();
        self.engine.cancel_timeout();
        self.state = DriverState::Closing;
    }
}
