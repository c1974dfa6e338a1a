//! # relaymail-smtp
//!
//! SMTP submission client for handing messages to an authenticated relay.
//!
//! ## Features
//!
//! - **Runtime-checked session state**: operations out of order are refused
//!   before anything is written to the wire
//! - **STARTTLS with mandatory certificate verification** (rustls + webpki roots)
//! - **AUTH PLAIN**, only permitted after the channel is encrypted
//! - **Reusable connections**: RSET between messages, recipient rejections
//!   that do not tear down the envelope
//!
//! ## Quick Start
//!
//! ```ignore
//! use relaymail_smtp::{Address, Session, DEFAULT_CLIENT_HOSTNAME};
//!
//! #[tokio::main]
//! async fn main() -> relaymail_smtp::Result<()> {
//!     let mut session = Session::connect("smtp.example.com", 587, DEFAULT_CLIENT_HOSTNAME).await?;
//!     session.upgrade_encryption("smtp.example.com").await?;
//!     session.authenticate("user@example.com", "app-password").await?;
//!
//!     session.open_envelope(&Address::new("user@example.com")?).await?;
//!     session.add_recipient(&Address::new("friend@example.org")?).await?;
//!     session.write_body(b"Subject: Hi\r\n\r\nHello!").await?;
//!
//!     session.close().await
//! }
//! ```
//!
//! ## Modules
//!
//! - [`command`]: SMTP command builders
//! - [`connection`]: Streams and the submission session
//! - [`parser`]: Response parser
//! - [`types`]: Core SMTP types (addresses, extensions, replies)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
mod error;
pub mod parser;
pub mod types;

pub use connection::{
    DEFAULT_CLIENT_HOSTNAME, ServerInfo, Session, SessionState, SmtpIo, SmtpStream,
};
pub use error::{Error, Result};
pub use types::{Address, AuthMechanism, Extension, Reply, ReplyCode};
