//! Delivery providers.
//!
//! A relay is served either by the raw protocol driver or by the mail
//! library. [`Mailer`] picks one from the relay host and exposes a single
//! `send_email` call for every message shape.

mod library;
mod provider;
mod raw;

pub use library::{LibraryFailure, LibraryProvider, LibraryTransport, smtp_transport};
pub use provider::{Mailer, Provider, ProviderKind};
pub use raw::RawProvider;
