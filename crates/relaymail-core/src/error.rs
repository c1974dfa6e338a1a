//! Error types for the dispatch engine.

use thiserror::Error;

use crate::config::ConfigError;
use crate::report::DispatchReport;

/// Boxed diagnostic from whichever transport produced the failure.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while dispatching mail.
///
/// Every variant names the stage that failed and carries the address or
/// relay it concerns, so the message is readable without SMTP knowledge.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Configuration is missing a field or holds an unusable value.
    #[error("Invalid relay configuration: {0}")]
    ConfigInvalid(#[from] ConfigError),

    /// The relay could not be reached or refused the connection.
    #[error("Error connecting to SMTP server {relay}: {source}")]
    Connect {
        /// `host:port` of the relay.
        relay: String,
        /// Underlying diagnostic.
        #[source]
        source: BoxError,
    },

    /// STARTTLS or the TLS handshake failed.
    #[error("Error starting TLS with {relay}: {source}")]
    Encryption {
        /// `host:port` of the relay.
        relay: String,
        /// Underlying diagnostic.
        #[source]
        source: BoxError,
    },

    /// The relay refused the sender's credentials.
    #[error("Error authenticating as {identity}: {source}")]
    Auth {
        /// Identity used for authentication.
        identity: String,
        /// Underlying diagnostic.
        #[source]
        source: BoxError,
    },

    /// The relay refused the sender (`MAIL FROM`).
    #[error("Error setting sender {sender} for mail to {recipients}: {source}")]
    Envelope {
        /// Envelope sender.
        sender: String,
        /// Recipients of the message, comma-joined.
        recipients: String,
        /// Underlying diagnostic.
        #[source]
        source: BoxError,
    },

    /// A recipient was refused by the relay or is not a usable address.
    #[error("Recipient {address} rejected: {message}")]
    RecipientRejected {
        /// The refused address.
        address: String,
        /// What the relay (or address check) said.
        message: String,
    },

    /// The message body was refused or could not be transferred.
    #[error("Error sending email body to {recipients}: {source}")]
    Transfer {
        /// Recipients of the message, comma-joined.
        recipients: String,
        /// Underlying diagnostic.
        #[source]
        source: BoxError,
    },

    /// RSET between batch entries failed.
    #[error("Error resetting connection: {source}")]
    Reset {
        /// Underlying diagnostic.
        #[source]
        source: BoxError,
    },

    /// The mail library reported a failure it does not attribute to a stage.
    #[error("Error sending email to {recipients}: {source}")]
    Delivery {
        /// Recipients of the message, comma-joined.
        recipients: String,
        /// Underlying diagnostic.
        #[source]
        source: BoxError,
    },

    /// A batch stopped early on a connection-level failure.
    ///
    /// `report` holds what was delivered and recorded before the stop;
    /// entries from `index` on were not delivered.
    #[error("Batch stopped at entry {} after {} delivered: {source}", .index + 1, .report.delivered)]
    BatchAborted {
        /// Position of the entry being handled when the batch stopped.
        index: usize,
        /// Outcome of the entries before `index`.
        report: DispatchReport,
        /// The failure that ended the batch.
        #[source]
        source: Box<DispatchError>,
    },

    /// A message had no recipients at all.
    #[error("Message \"{subject}\" has no recipients")]
    NoRecipients {
        /// Subject of the message, for identification.
        subject: String,
    },
}

impl DispatchError {
    /// Short name of the stage that failed.
    #[must_use]
    pub fn stage(&self) -> &'static str {
        match self {
            Self::ConfigInvalid(_) => "configuration",
            Self::Connect { .. } => "connect",
            Self::Encryption { .. } => "encryption",
            Self::Auth { .. } => "authentication",
            Self::Envelope { .. } => "envelope",
            Self::RecipientRejected { .. } | Self::NoRecipients { .. } => "recipient",
            Self::Transfer { .. } | Self::Delivery { .. } => "transfer",
            Self::Reset { .. } => "reset",
            Self::BatchAborted { source, .. } => source.stage(),
        }
    }

    /// Returns true if the failure invalidates the whole session rather than
    /// one message. A batch stops on fatal errors and records the rest.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConfigInvalid(_)
                | Self::Connect { .. }
                | Self::Encryption { .. }
                | Self::Auth { .. }
                | Self::Reset { .. }
                | Self::BatchAborted { .. }
        )
    }

    /// Outcome of the entries handled before a batch stopped, if it did.
    #[must_use]
    pub const fn partial_report(&self) -> Option<&DispatchReport> {
        match self {
            Self::BatchAborted { report, .. } => Some(report),
            _ => None,
        }
    }

    /// Attaches the batch outcome so far to a failure that ends the batch.
    ///
    /// When no entry was attempted yet the failure is returned unchanged.
    #[must_use]
    pub(crate) fn into_aborted(self, report: DispatchReport, index: usize) -> Self {
        if report.attempted() == 0 {
            return self;
        }
        Self::BatchAborted {
            index,
            report,
            source: Box::new(self),
        }
    }
}

/// Result type alias using [`DispatchError`].
pub type Result<T> = std::result::Result<T, DispatchError>;
