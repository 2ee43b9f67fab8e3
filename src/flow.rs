use std::cmp::min;

/// Credit bookkeeping for the single sender or receiver link.
///
/// `current_credit` changes only through the engine's flow events (sender
/// side) and through this controller's own send/delivery/top-up accounting
/// (receiver side). Top-ups are always `credit_window - current_credit`,
/// never an unbounded re-request, so the number of in-flight deliveries
/// stays bounded by the configured window.
#[derive(Debug)]
pub struct FlowController {
    credit_window: u32,
    current_credit: u32,
}

impl FlowController {
    pub fn new(credit_window: u32) -> FlowController {
        FlowController {
            credit_window,
            current_credit: 0,
        }
    }

    pub fn current_credit(&self) -> u32 {
        self.current_credit
    }

    /// Sender side: the engine reported the link's current credit.
    pub fn credit_updated(&mut self, credit: u32) {
        self.current_credit = credit;
    }

    /// Number of messages that may be produced right now: bounded by credit
    /// and, if `desired_count` is nonzero, by the remaining count.
    pub fn available_sends(&self, sent: u64, desired_count: u64) -> u64 {
        let by_credit = self.current_credit as u64;
        if desired_count == 0 {
            by_credit
        } else {
            min(by_credit, desired_count.saturating_sub(sent))
        }
    }

    /// One message was handed to the engine, consuming one credit.
    pub fn on_send(&mut self) {
        self.current_credit = self.current_credit.saturating_sub(1);
    }

    /// Receiver side: one complete delivery arrived, consuming one credit.
    pub fn on_delivery(&mut self) {
        self.current_credit = self.current_credit.saturating_sub(1);
    }

    /// Receiver side: the amount to request from the engine to restore the
    /// window, issued once after each fully processed delivery.
    pub fn topup_amount(&self) -> u32 {
        self.credit_window.saturating_sub(self.current_credit)
    }

    /// Records credit this side asked the engine to grant.
    pub fn granted(&mut self, amount: u32) {
        self.current_credit += amount;
    }

    /// Initial receiver grant: the full window.
    pub fn initial_grant(&mut self) -> u32 {
        self.granted(self.credit_window);
        self.credit_window
    }
}
