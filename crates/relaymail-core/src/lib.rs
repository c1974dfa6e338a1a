//! # relaymail-core
//!
//! Dispatch engine for outbound mail through an authenticated relay.
//!
//! This crate provides:
//! - Relay configuration and validation
//! - Content classification and transcript composition
//! - Single, batch and broadcast message shapes
//! - Two delivery paths (protocol driver and mail library) behind [`Mailer`]
//!
//! ## Example
//!
//! ```no_run
//! use relaymail_core::{Mailer, RelayConfig, SingleMessage};
//!
//! # async fn example() -> relaymail_core::Result<()> {
//! let config = RelayConfig::new("smtp.example.com", "587", "me@example.com", "app-token");
//! let mailer = Mailer::new(&config)?;
//! let message = SingleMessage::new("you@example.com", "Hello", "<p>Hi there</p>");
//! mailer.send_email(&message).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod compose;
pub mod config;
pub mod content;
mod error;
pub mod message;
pub mod report;
pub mod service;
pub mod transport;

pub use compose::{compose, compose_message};
pub use config::{ConfigError, Relay, RelayConfig};
pub use content::ContentType;
pub use error::{BoxError, DispatchError, Result};
pub use message::{
    BatchMessages, BroadcastMessage, FailurePolicy, MailRequest, Outbox, Outgoing, SingleMessage,
};
pub use report::{DispatchReport, EntryFailure};
pub use service::{
    LibraryFailure, LibraryProvider, LibraryTransport, Mailer, Provider, ProviderKind, RawProvider,
};
pub use transport::{Connector, SmtpConnector, TransportSession};
