//! Transport seams for the raw protocol path.
//!
//! [`TransportSession`] is the protocol surface the dispatch driver needs;
//! [`Connector`] opens one. Both are implemented for the SMTP session from
//! `relaymail-smtp`, and tests substitute recording stubs.

use relaymail_smtp::{Address, Result, Session, SessionState, SmtpIo, SmtpStream};

/// One connection to a relay, driven through the submission sequence.
#[allow(async_fn_in_trait)]
pub trait TransportSession {
    /// Current protocol state.
    fn state(&self) -> SessionState;

    /// Switches to TLS, verifying the certificate for `server_name`.
    async fn upgrade_encryption(&mut self, server_name: &str) -> Result<()>;

    /// Authenticates; only valid on an encrypted session.
    async fn authenticate(&mut self, identity: &str, secret: &str) -> Result<()>;

    /// Declares the envelope sender.
    async fn open_envelope(&mut self, sender: &Address) -> Result<()>;

    /// Adds one envelope recipient.
    async fn add_recipient(&mut self, recipient: &Address) -> Result<()>;

    /// Transfers the transcript and ends the data phase.
    async fn write_body(&mut self, transcript: &[u8]) -> Result<()>;

    /// Returns to the authenticated state for the next message.
    async fn reset(&mut self) -> Result<()>;

    /// Releases the connection.
    async fn close(&mut self) -> Result<()>;
}

/// Opens transport sessions.
#[allow(async_fn_in_trait)]
pub trait Connector {
    /// Session type produced.
    type Session: TransportSession;

    /// Connects to `host:port` and completes the greeting.
    async fn connect(&self, host: &str, port: u16) -> Result<Self::Session>;
}

impl<S: SmtpIo> TransportSession for Session<S> {
    fn state(&self) -> SessionState {
        Self::state(self)
    }

    async fn upgrade_encryption(&mut self, server_name: &str) -> Result<()> {
        Self::upgrade_encryption(self, server_name).await
    }

    async fn authenticate(&mut self, identity: &str, secret: &str) -> Result<()> {
        Self::authenticate(self, identity, secret).await
    }

    async fn open_envelope(&mut self, sender: &Address) -> Result<()> {
        Self::open_envelope(self, sender).await
    }

    async fn add_recipient(&mut self, recipient: &Address) -> Result<()> {
        Self::add_recipient(self, recipient).await
    }

    async fn write_body(&mut self, transcript: &[u8]) -> Result<()> {
        Self::write_body(self, transcript).await
    }

    async fn reset(&mut self) -> Result<()> {
        Self::reset(self).await
    }

    async fn close(&mut self) -> Result<()> {
        Self::close(self).await
    }
}

/// Connects over TCP to a real relay.
#[derive(Debug, Clone)]
pub struct SmtpConnector {
    client_hostname: String,
}

impl SmtpConnector {
    /// Creates a connector announcing `client_hostname` in EHLO.
    #[must_use]
    pub fn new(client_hostname: impl Into<String>) -> Self {
        Self {
            client_hostname: client_hostname.into(),
        }
    }
}

impl Connector for SmtpConnector {
    type Session = Session<SmtpStream>;

    async fn connect(&self, host: &str, port: u16) -> Result<Self::Session> {
        Session::connect(host, port, &self.client_hostname).await
    }
}
