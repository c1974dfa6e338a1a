//! Error types for SMTP operations.

use std::io;

use crate::connection::SessionState;
use crate::types::ReplyCode;

/// Result type alias for SMTP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// SMTP error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// TLS error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Server returned error response.
    #[error("SMTP error {code}: {message}")]
    SmtpError {
        /// Reply code (e.g., 550).
        code: u16,
        /// Error message from server.
        message: String,
    },

    /// Protocol error (unexpected response).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Feature not supported by server.
    #[error("Server does not support {0}")]
    NotSupported(String),

    /// Operation attempted from a state that does not allow it.
    #[error("Cannot {operation} while session is {state}")]
    InvalidState {
        /// Operation that was refused.
        operation: &'static str,
        /// State the session was in.
        state: SessionState,
    },

    /// The server closed the connection.
    #[error("Connection closed by server")]
    ConnectionClosed,
}

impl Error {
    /// Creates an SMTP error from a reply code and message.
    #[must_use]
    pub fn smtp_error(code: u16, message: impl Into<String>) -> Self {
        Self::SmtpError {
            code,
            message: message.into(),
        }
    }

    /// Returns true if this is a permanent error (5xx).
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::SmtpError { code, .. } if *code >= 500 && *code < 600)
    }

    /// Returns true if this is a transient error (4xx).
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::SmtpError { code, .. } if *code >= 400 && *code < 500)
    }

    /// Returns true if the underlying connection can no longer be used.
    ///
    /// Covers transport failures and the 421 "closing channel" reply.
    #[must_use]
    pub const fn is_connection_lost(&self) -> bool {
        match self {
            Self::Io(_) | Self::Tls(_) | Self::ConnectionClosed | Self::Protocol(_) => true,
            Self::SmtpError { code, .. } => *code == ReplyCode::SERVICE_UNAVAILABLE.as_u16(),
            _ => false,
        }
    }

    /// Returns the server's text for SMTP replies, or the error display otherwise.
    #[must_use]
    pub fn server_message(&self) -> String {
        match self {
            Self::SmtpError { code, message } => format!("{code} {message}"),
            other => other.to_string(),
        }
    }
}
