//! Outcome of a dispatch call.

use crate::error::DispatchError;
use crate::message::Outgoing;

/// A message of a batch that was not delivered.
#[derive(Debug)]
pub struct EntryFailure {
    /// Position of the message in the outbox.
    pub index: usize,
    /// Recipients of the message.
    pub recipients: Vec<String>,
    /// Subject of the message.
    pub subject: String,
    /// Why it failed.
    pub error: DispatchError,
}

/// What a successful `send_email` call delivered.
///
/// Single and broadcast sends either deliver everything or return an error,
/// so their reports never hold failures. A batch reports each entry that
/// failed without stopping the others.
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// Number of messages the relay accepted.
    pub delivered: usize,
    /// Messages that failed, in outbox order.
    pub failures: Vec<EntryFailure>,
}

impl DispatchReport {
    /// Returns true if nothing failed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Number of messages attempted.
    #[must_use]
    pub fn attempted(&self) -> usize {
        self.delivered + self.failures.len()
    }

    pub(crate) const fn record_delivered(&mut self) {
        self.delivered += 1;
    }

    pub(crate) fn record_failure(&mut self, index: usize, message: &Outgoing, error: DispatchError) {
        self.failures.push(EntryFailure {
            index,
            recipients: message.recipients.clone(),
            subject: message.subject.clone(),
            error,
        });
    }
}
