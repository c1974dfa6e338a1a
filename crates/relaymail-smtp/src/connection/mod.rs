//! SMTP connection management.
//!
//! A [`Session`] owns one connection to a relay and tracks where it is in
//! the submission sequence with a [`SessionState`].

mod session;
mod state;
mod stream;

pub use session::{DEFAULT_CLIENT_HOSTNAME, Session};
pub use state::SessionState;
pub use stream::{SmtpIo, SmtpStream, connect};

use crate::types::{AuthMechanism, Extension};
use std::collections::HashSet;

/// Server capabilities from EHLO response.
#[derive(Debug, Clone, Default)]
pub struct ServerInfo {
    /// Server hostname from greeting.
    pub hostname: String,
    /// Supported extensions.
    pub extensions: HashSet<Extension>,
}

impl ServerInfo {
    /// Checks if the server supports an extension.
    #[must_use]
    pub fn supports(&self, ext: &Extension) -> bool {
        self.extensions.contains(ext)
    }

    /// Checks if STARTTLS is supported.
    #[must_use]
    pub fn supports_starttls(&self) -> bool {
        self.supports(&Extension::StartTls)
    }

    /// Returns supported authentication mechanisms.
    #[must_use]
    pub fn auth_mechanisms(&self) -> Vec<AuthMechanism> {
        self.extensions
            .iter()
            .find_map(|ext| match ext {
                Extension::Auth(mechanisms) => Some(mechanisms.clone()),
                _ => None,
            })
            .unwrap_or_default()
    }

    /// Replaces the advertised extensions with those of an EHLO reply.
    ///
    /// The first line of the reply is the greeting and is skipped.
    pub(crate) fn update_from_ehlo(&mut self, lines: &[String]) {
        self.extensions = lines.iter().skip(1).map(|line| Extension::parse(line)).collect();
    }
}
