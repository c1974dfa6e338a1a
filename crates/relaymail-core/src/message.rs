//! Message shapes and their delivery policies.
//!
//! Each shape is an [`Outbox`]: it says which messages to send, in which
//! order, and whether one message failing stops the rest.

use serde::Deserialize;

use crate::compose::compose_message;

/// What to do when one message of an outbox fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// The first failure ends the call.
    Abort,
    /// Per-message failures are recorded and the next message is tried.
    /// Connection-level failures still end the call.
    Isolate,
}

/// One composed message ready for the envelope and data phases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outgoing {
    /// Envelope recipients, in the order given by the caller.
    pub recipients: Vec<String>,
    /// Subject, kept for diagnostics.
    pub subject: String,
    /// Header block and body.
    pub transcript: String,
}

impl Outgoing {
    /// Comma-joined recipients, as used in error messages.
    #[must_use]
    pub fn recipient_list(&self) -> String {
        self.recipients.join(",")
    }
}

/// A set of messages sharing one sender and one session.
pub trait Outbox {
    /// Composes every message to send, in order.
    fn outgoing(&self, sender: &str) -> Vec<Outgoing>;

    /// How failures of individual messages are handled.
    fn failure_policy(&self) -> FailurePolicy;
}

/// One message to one recipient.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SingleMessage {
    /// Recipient address.
    pub to: String,
    /// Subject line.
    #[serde(default)]
    pub subject: String,
    /// Body, HTML or plain text.
    #[serde(default)]
    pub body: String,
}

impl SingleMessage {
    /// Creates a message.
    #[must_use]
    pub fn new(to: impl Into<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            body: body.into(),
        }
    }

    fn compose(&self, sender: &str) -> Outgoing {
        Outgoing {
            recipients: vec![self.to.clone()],
            subject: self.subject.clone(),
            transcript: compose_message(sender, &[&self.to], &self.subject, &self.body),
        }
    }
}

impl Outbox for SingleMessage {
    fn outgoing(&self, sender: &str) -> Vec<Outgoing> {
        vec![self.compose(sender)]
    }

    fn failure_policy(&self) -> FailurePolicy {
        FailurePolicy::Abort
    }
}

/// Independent messages sent over one session.
///
/// A failure on one entry is recorded and the batch moves on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BatchMessages {
    /// Entries, sent in order.
    pub sends: Vec<SingleMessage>,
}

impl BatchMessages {
    /// Creates a batch from its entries.
    #[must_use]
    pub const fn new(sends: Vec<SingleMessage>) -> Self {
        Self { sends }
    }
}

impl Outbox for BatchMessages {
    fn outgoing(&self, sender: &str) -> Vec<Outgoing> {
        self.sends.iter().map(|entry| entry.compose(sender)).collect()
    }

    fn failure_policy(&self) -> FailurePolicy {
        FailurePolicy::Isolate
    }
}

/// One message delivered to many recipients in a single envelope.
///
/// Either every recipient is accepted and the message is sent, or nothing is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BroadcastMessage {
    /// Recipients; the order is kept in the `To` header and in `RCPT TO`.
    #[serde(rename = "tos")]
    pub to: Vec<String>,
    /// Subject line.
    #[serde(default)]
    pub subject: String,
    /// Body, HTML or plain text.
    #[serde(default)]
    pub body: String,
}

impl BroadcastMessage {
    /// Creates a broadcast.
    #[must_use]
    pub fn new<I, S>(to: I, subject: impl Into<String>, body: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            to: to.into_iter().map(Into::into).collect(),
            subject: subject.into(),
            body: body.into(),
        }
    }
}

impl Outbox for BroadcastMessage {
    fn outgoing(&self, sender: &str) -> Vec<Outgoing> {
        vec![Outgoing {
            recipients: self.to.clone(),
            subject: self.subject.clone(),
            transcript: compose_message(sender, &self.to, &self.subject, &self.body),
        }]
    }

    fn failure_policy(&self) -> FailurePolicy {
        FailurePolicy::Abort
    }
}

/// Any of the three shapes, as read from a request document.
///
/// The shape is told apart by its keys: `sends` for a batch, `tos` for a
/// broadcast, `to` for a single message.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum MailRequest {
    /// Independent messages.
    Batch(BatchMessages),
    /// One message, many recipients.
    Broadcast(BroadcastMessage),
    /// One message, one recipient.
    Single(SingleMessage),
}

impl MailRequest {
    /// Short name of the shape, for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Batch(_) => "batch",
            Self::Broadcast(_) => "broadcast",
            Self::Single(_) => "single",
        }
    }
}

impl Outbox for MailRequest {
    fn outgoing(&self, sender: &str) -> Vec<Outgoing> {
        match self {
            Self::Batch(batch) => batch.outgoing(sender),
            Self::Broadcast(broadcast) => broadcast.outgoing(sender),
            Self::Single(single) => single.outgoing(sender),
        }
    }

    fn failure_policy(&self) -> FailurePolicy {
        match self {
            Self::Batch(batch) => batch.failure_policy(),
            Self::Broadcast(broadcast) => broadcast.failure_policy(),
            Self::Single(single) => single.failure_policy(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn single_composes_one_message() {
        let message = SingleMessage::new("you@x.com", "Hi", "hello");
        let outgoing = message.outgoing("me@x.com");
        assert_eq!(outgoing.len(), 1);
        assert_eq!(outgoing[0].recipients, vec!["you@x.com"]);
        assert!(outgoing[0].transcript.starts_with("From: me@x.com\r\nTo: you@x.com\r\n"));
        assert_eq!(message.failure_policy(), FailurePolicy::Abort);
    }

    #[test]
    fn batch_keeps_entry_order() {
        let batch = BatchMessages::new(vec![
            SingleMessage::new("a@x.com", "one", "1"),
            SingleMessage::new("b@x.com", "two", "<p>2</p>"),
        ]);
        let outgoing = batch.outgoing("me@x.com");
        assert_eq!(outgoing.len(), 2);
        assert_eq!(outgoing[1].recipient_list(), "b@x.com");
        assert!(outgoing[1].transcript.contains("Content-Type: text/html"));
        assert_eq!(batch.failure_policy(), FailurePolicy::Isolate);
    }

    #[test]
    fn broadcast_is_one_message() {
        let broadcast = BroadcastMessage::new(["a@x.com", "b@x.com"], "News", "text");
        let outgoing = broadcast.outgoing("me@x.com");
        assert_eq!(outgoing.len(), 1);
        assert_eq!(outgoing[0].recipients, vec!["a@x.com", "b@x.com"]);
        assert!(outgoing[0].transcript.contains("To: a@x.com,b@x.com\r\n"));
    }

    #[test]
    fn request_shape_follows_keys() {
        let batch: MailRequest =
            serde_json::from_str(r#"{"sends": [{"to": "a@x.com", "subject": "s", "body": "b"}]}"#)
                .unwrap();
        assert_eq!(batch.kind(), "batch");

        let broadcast: MailRequest =
            serde_json::from_str(r#"{"tos": ["a@x.com", "b@x.com"], "subject": "s", "body": "b"}"#)
                .unwrap();
        assert_eq!(broadcast.kind(), "broadcast");
        assert_eq!(broadcast.failure_policy(), FailurePolicy::Abort);

        let single: MailRequest =
            serde_json::from_str(r#"{"to": "a@x.com", "subject": "s", "body": "b"}"#).unwrap();
        assert_eq!(
            single,
            MailRequest::Single(SingleMessage::new("a@x.com", "s", "b"))
        );
    }
}
