//! Submission session over a single relay connection.

use super::{ServerInfo, SessionState, SmtpIo, SmtpStream, connect};
use crate::command::Command;
use crate::error::{Error, Result};
use crate::parser::{is_last_reply_line, parse_reply};
use crate::types::{Address, AuthMechanism, Reply, ReplyCode};
use base64::Engine;
use tracing::debug;

/// Hostname announced in EHLO when the caller does not provide one.
pub const DEFAULT_CLIENT_HOSTNAME: &str = "localhost";

/// SMTP session driven through connect, STARTTLS, AUTH and mail transactions.
///
/// Unlike a type-state client, a failed command leaves the session usable
/// where the protocol allows it: a rejected `RCPT TO` keeps the envelope
/// open for further recipients, and [`reset`](Self::reset) returns to
/// `Authenticated` for the next message. Operations called from the wrong
/// [`SessionState`] fail with [`Error::InvalidState`] without touching the wire.
#[derive(Debug)]
pub struct Session<S = SmtpStream> {
    stream: Option<S>,
    server_info: ServerInfo,
    state: SessionState,
    client_hostname: String,
}

impl Session<SmtpStream> {
    /// Opens a TCP connection, reads the greeting and sends EHLO.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails or the server refuses the greeting.
    pub async fn connect(hostname: &str, port: u16, client_hostname: &str) -> Result<Self> {
        debug!(%hostname, port, "connecting to relay");
        let stream = connect(hostname, port).await?;
        Self::from_stream(stream, client_hostname).await
    }
}

impl<S: SmtpIo> Session<S> {
    /// Creates a session from an open stream, reads the greeting and sends EHLO.
    ///
    /// # Errors
    ///
    /// Returns an error if the greeting or EHLO is rejected.
    pub async fn from_stream(stream: S, client_hostname: impl Into<String>) -> Result<Self> {
        let mut session = Self {
            stream: Some(stream),
            server_info: ServerInfo::default(),
            state: SessionState::Connected,
            client_hostname: client_hostname.into(),
        };

        let greeting = session.read_reply().await?;
        if greeting.code != ReplyCode::SERVICE_READY {
            return Err(greeting.into_error());
        }

        // First word of the greeting is the server's name
        session.server_info.hostname = greeting
            .message
            .first()
            .and_then(|msg| msg.split_whitespace().next())
            .unwrap_or("unknown")
            .to_string();

        session.ehlo().await?;
        Ok(session)
    }

    /// Returns the current session state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Returns the server information from the latest EHLO.
    #[must_use]
    pub const fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }

    /// Upgrades the connection with STARTTLS and repeats EHLO.
    ///
    /// The certificate must be valid for `server_name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the server does not offer STARTTLS, refuses it,
    /// or the handshake fails. A failed handshake closes the session.
    pub async fn upgrade_encryption(&mut self, server_name: &str) -> Result<()> {
        self.require("upgrade to TLS", |s| s == SessionState::Connected)?;

        if !self.server_info.supports_starttls() {
            return Err(Error::NotSupported("STARTTLS".into()));
        }

        let reply = self.command(Command::StartTls).await?;
        if reply.code != ReplyCode::SERVICE_READY {
            return Err(reply.into_error());
        }

        let stream = self.stream.take().ok_or(Error::ConnectionClosed)?;
        match stream.upgrade_to_tls(server_name).await {
            Ok(tls) => self.stream = Some(tls),
            Err(err) => {
                self.state = SessionState::Closed;
                return Err(err);
            }
        }
        debug!(%server_name, "TLS established");

        self.ehlo().await?;
        self.state = SessionState::Encrypted;
        Ok(())
    }

    /// Authenticates with the PLAIN mechanism.
    ///
    /// PLAIN sends the secret in the clear, so it is only allowed once the
    /// channel is encrypted.
    ///
    /// # Errors
    ///
    /// Returns an error if the session is not encrypted, the server does not
    /// offer PLAIN, or the credentials are refused.
    pub async fn authenticate(&mut self, identity: &str, secret: &str) -> Result<()> {
        self.require("authenticate", |s| s == SessionState::Encrypted)?;
        if !self.stream.as_ref().is_some_and(|s| s.is_encrypted()) {
            return Err(Error::InvalidState {
                operation: "authenticate",
                state: SessionState::Connected,
            });
        }

        let mechanisms = self.server_info.auth_mechanisms();
        if !mechanisms.is_empty() && !mechanisms.contains(&AuthMechanism::Plain) {
            return Err(Error::NotSupported("AUTH PLAIN".into()));
        }

        let credentials = format!("\0{identity}\0{secret}");
        let encoded = base64::engine::general_purpose::STANDARD.encode(credentials.as_bytes());
        let reply = self
            .command(Command::Auth {
                mechanism: AuthMechanism::Plain,
                initial_response: Some(encoded),
            })
            .await?;

        if !reply.is_success() {
            return Err(reply.into_error());
        }

        debug!(%identity, "authenticated");
        self.state = SessionState::Authenticated;
        Ok(())
    }

    /// Starts a mail transaction with `MAIL FROM`.
    ///
    /// # Errors
    ///
    /// Returns an error if the session is not authenticated or the sender is refused.
    pub async fn open_envelope(&mut self, sender: &Address) -> Result<()> {
        self.require("open an envelope", |s| s == SessionState::Authenticated)?;

        let reply = self
            .command(Command::MailFrom {
                from: sender.clone(),
            })
            .await?;
        if !reply.is_success() {
            return Err(reply.into_error());
        }

        self.state = SessionState::EnvelopeOpen;
        Ok(())
    }

    /// Adds a recipient with `RCPT TO`.
    ///
    /// A refused recipient leaves the state unchanged, so other recipients
    /// can still be added to the same envelope.
    ///
    /// # Errors
    ///
    /// Returns an error if no envelope is open or the relay refuses the recipient.
    pub async fn add_recipient(&mut self, recipient: &Address) -> Result<()> {
        self.require("add a recipient", SessionState::in_transaction)?;

        let reply = self
            .command(Command::RcptTo {
                to: recipient.clone(),
            })
            .await?;
        if !reply.is_success() {
            return Err(reply.into_error());
        }

        self.state = SessionState::RecipientAdded;
        Ok(())
    }

    /// Sends `DATA`, the message, and the end-of-data marker.
    ///
    /// Line endings are normalized to CRLF and lines starting with `.` are
    /// dot-stuffed.
    ///
    /// # Errors
    ///
    /// Returns an error if no recipient was accepted, or the relay refuses
    /// the data phase or the message.
    pub async fn write_body(&mut self, message: &[u8]) -> Result<()> {
        self.require("write the message body", |s| {
            s == SessionState::RecipientAdded
        })?;

        let reply = self.command(Command::Data).await?;
        if reply.code != ReplyCode::START_DATA {
            return Err(reply.into_error());
        }

        let payload = encode_data(message);
        debug!(bytes = payload.len(), "sending message data");
        self.write(&payload).await?;

        // The server has consumed the transaction either way
        self.state = SessionState::DataWritten;
        let reply = self.read_reply().await?;
        if !reply.is_success() {
            return Err(reply.into_error());
        }
        Ok(())
    }

    /// Aborts or finishes the current transaction with `RSET`.
    ///
    /// # Errors
    ///
    /// Returns an error if the session is not authenticated or RSET is refused.
    pub async fn reset(&mut self) -> Result<()> {
        self.require("reset", SessionState::is_authenticated)?;

        let reply = self.command(Command::Rset).await?;
        if !reply.is_success() {
            return Err(reply.into_error());
        }

        self.state = SessionState::Authenticated;
        Ok(())
    }

    /// Sends QUIT and releases the connection. Available in any state.
    ///
    /// The connection is released even when QUIT fails.
    ///
    /// # Errors
    ///
    /// Returns an error if QUIT could not be delivered or was refused.
    pub async fn close(&mut self) -> Result<()> {
        if self.state == SessionState::Closed || self.stream.is_none() {
            self.state = SessionState::Closed;
            self.stream = None;
            return Ok(());
        }

        let result = self.command(Command::Quit).await;
        self.state = SessionState::Closed;
        self.stream = None;

        let reply = result?;
        if !reply.is_success() && reply.code != ReplyCode::CLOSING {
            return Err(reply.into_error());
        }
        Ok(())
    }

    async fn ehlo(&mut self) -> Result<()> {
        let reply = self
            .command(Command::Ehlo {
                hostname: self.client_hostname.clone(),
            })
            .await?;
        if !reply.is_success() {
            return Err(reply.into_error());
        }

        self.server_info.update_from_ehlo(&reply.message);
        Ok(())
    }

    fn require(&self, operation: &'static str, allowed: impl Fn(SessionState) -> bool) -> Result<()> {
        if allowed(self.state) {
            Ok(())
        } else {
            Err(Error::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    async fn command(&mut self, cmd: Command) -> Result<Reply> {
        debug!(command = cmd.verb(), "sending command");
        self.write(&cmd.serialize()).await?;
        self.read_reply().await
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(Error::ConnectionClosed)?;
        let result = stream.write_all(data).await;
        self.track(result)
    }

    async fn read_reply(&mut self) -> Result<Reply> {
        let stream = self.stream.as_mut().ok_or(Error::ConnectionClosed)?;
        let mut lines = Vec::new();
        let result = loop {
            match stream.read_line().await {
                Ok(line) if line.is_empty() => {}
                Ok(line) => {
                    let is_last = is_last_reply_line(&line);
                    lines.push(line);
                    if is_last {
                        break parse_reply(&lines);
                    }
                }
                Err(err) => break Err(err),
            }
        };

        let reply = self.track(result)?;
        if reply.code == ReplyCode::SERVICE_UNAVAILABLE {
            self.mark_closed();
            return Err(reply.into_error());
        }
        Ok(reply)
    }

    /// Drops the connection when `result` shows it is no longer usable.
    fn track<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result
            && err.is_connection_lost()
        {
            self.mark_closed();
        }
        result
    }

    fn mark_closed(&mut self) {
        self.state = SessionState::Closed;
        self.stream = None;
    }
}

/// Normalizes line endings to CRLF, dot-stuffs, and appends the end-of-data marker.
fn encode_data(message: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(message.len() + 64);
    let body = message.strip_suffix(b"\n").unwrap_or(message);

    if !body.is_empty() {
        for line in body.split(|&b| b == b'\n') {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if line.first() == Some(&b'.') {
                out.push(b'.');
            }
            out.extend_from_slice(line);
            out.extend_from_slice(b"\r\n");
        }
    }

    out.extend_from_slice(b".\r\n");
    out
}
