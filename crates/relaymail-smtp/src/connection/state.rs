//! Session state types.

use std::fmt;

/// Position of a [`Session`](super::Session) in the submission sequence.
///
/// Transitions only move forward, except [`reset`](super::Session::reset)
/// which returns to `Authenticated`:
///
/// ```text
/// Connected → Encrypted → Authenticated → EnvelopeOpen → RecipientAdded → DataWritten
///                              ↑                                            │
///                              └──────────────────── reset ─────────────────┘
/// ```
///
/// Any state may move to `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Greeting read and EHLO exchanged over plain TCP.
    #[default]
    Connected,
    /// STARTTLS completed; the channel is encrypted and certificates verified.
    Encrypted,
    /// Credentials accepted; ready for a mail transaction.
    Authenticated,
    /// `MAIL FROM` accepted.
    EnvelopeOpen,
    /// At least one `RCPT TO` accepted.
    RecipientAdded,
    /// Message data accepted by the relay.
    DataWritten,
    /// QUIT sent or connection lost.
    Closed,
}

impl SessionState {
    /// Returns `true` once credentials have been accepted and the session is still open.
    #[must_use]
    pub const fn is_authenticated(self) -> bool {
        matches!(
            self,
            Self::Authenticated | Self::EnvelopeOpen | Self::RecipientAdded | Self::DataWritten
        )
    }

    /// Returns `true` while a mail transaction is in progress.
    #[must_use]
    pub const fn in_transaction(self) -> bool {
        matches!(self, Self::EnvelopeOpen | Self::RecipientAdded)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connected => "connected",
            Self::Encrypted => "encrypted",
            Self::Authenticated => "authenticated",
            Self::EnvelopeOpen => "in an open envelope",
            Self::RecipientAdded => "holding recipients",
            Self::DataWritten => "after data transfer",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}
