//! Session tests against a scripted relay.
//!
//! `tokio_test::io::Mock` checks every byte the session writes and panics on
//! anything unexpected, so each script doubles as a wire-level assertion.

#![allow(clippy::unwrap_used)]

use relaymail_smtp::{Address, Error, Result, Session, SessionState, SmtpIo};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_test::io::{Builder, Mock};

/// Mock stream whose TLS upgrade only flips a flag.
#[derive(Debug)]
struct ScriptedStream {
    reader: BufReader<Mock>,
    encrypted: bool,
}

impl SmtpIo for ScriptedStream {
    async fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        if self.reader.read_line(&mut line).await? == 0 {
            return Err(Error::ConnectionClosed);
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.reader.get_mut().write_all(data).await?;
        Ok(())
    }

    async fn upgrade_to_tls(mut self, _hostname: &str) -> Result<Self> {
        self.encrypted = true;
        Ok(self)
    }

    fn is_encrypted(&self) -> bool {
        self.encrypted
    }
}

const GREETING: &[u8] = b"220 relay.example.com ESMTP ready\r\n";
const EHLO: &[u8] = b"EHLO localhost\r\n";
const EHLO_REPLY: &[u8] = b"250-relay.example.com\r\n250-STARTTLS\r\n250 AUTH PLAIN LOGIN\r\n";
const AUTH: &[u8] = b"AUTH PLAIN AHVzZXJAZXhhbXBsZS5jb20Ac2VjcmV0\r\n";

/// Script up to and including a successful AUTH.
fn handshake() -> Builder {
    let mut builder = Builder::new();
    builder
        .read(GREETING)
        .write(EHLO)
        .read(EHLO_REPLY)
        .write(b"STARTTLS\r\n")
        .read(b"220 Go ahead\r\n")
        .write(EHLO)
        .read(EHLO_REPLY)
        .write(AUTH)
        .read(b"235 2.7.0 Accepted\r\n");
    builder
}

async fn session(builder: &mut Builder) -> Session<ScriptedStream> {
    let stream = ScriptedStream {
        reader: BufReader::new(builder.build()),
        encrypted: false,
    };
    Session::from_stream(stream, "localhost").await.unwrap()
}

async fn authenticated(builder: &mut Builder) -> Session<ScriptedStream> {
    let mut session = session(builder).await;
    session.upgrade_encryption("relay.example.com").await.unwrap();
    session.authenticate("user@example.com", "secret").await.unwrap();
    session
}

fn addr(s: &str) -> Address {
    Address::new(s).unwrap()
}

#[tokio::test]
async fn full_submission_sequence() {
    let mut script = handshake();
    script
        .write(b"MAIL FROM:<user@example.com>\r\n")
        .read(b"250 OK\r\n")
        .write(b"RCPT TO:<friend@example.org>\r\n")
        .read(b"250 OK\r\n")
        .write(b"DATA\r\n")
        .read(b"354 End data with <CR><LF>.<CR><LF>\r\n")
        .write(b"Subject: Hi\r\n\r\nHello\r\n.\r\n")
        .read(b"250 2.0.0 Queued\r\n")
        .write(b"QUIT\r\n")
        .read(b"221 Bye\r\n");

    let mut session = authenticated(&mut script).await;
    assert_eq!(session.server_info().hostname, "relay.example.com");
    assert_eq!(session.state(), SessionState::Authenticated);

    session.open_envelope(&addr("user@example.com")).await.unwrap();
    assert_eq!(session.state(), SessionState::EnvelopeOpen);
    session.add_recipient(&addr("friend@example.org")).await.unwrap();
    assert_eq!(session.state(), SessionState::RecipientAdded);
    session.write_body(b"Subject: Hi\r\n\r\nHello").await.unwrap();
    assert_eq!(session.state(), SessionState::DataWritten);

    session.close().await.unwrap();
    assert_eq!(session.state(), SessionState::Closed);
}

#[tokio::test]
async fn authenticate_requires_encryption() {
    let mut script = Builder::new();
    script
        .read(GREETING)
        .write(EHLO)
        .read(EHLO_REPLY)
        .write(b"QUIT\r\n")
        .read(b"221 Bye\r\n");

    let mut session = session(&mut script).await;
    let err = session
        .authenticate("user@example.com", "secret")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::InvalidState {
            operation: "authenticate",
            state: SessionState::Connected
        }
    ));

    session.close().await.unwrap();
}

#[tokio::test]
async fn starttls_must_be_advertised() {
    let mut script = Builder::new();
    script
        .read(GREETING)
        .write(EHLO)
        .read(b"250-relay.example.com\r\n250 AUTH PLAIN\r\n");

    let mut session = session(&mut script).await;
    let err = session.upgrade_encryption("relay.example.com").await.unwrap_err();
    assert!(matches!(err, Error::NotSupported(_)));
    assert_eq!(session.state(), SessionState::Connected);
}

#[tokio::test]
async fn bad_credentials_are_reported() {
    let mut script = Builder::new();
    script
        .read(GREETING)
        .write(EHLO)
        .read(EHLO_REPLY)
        .write(b"STARTTLS\r\n")
        .read(b"220 Go ahead\r\n")
        .write(EHLO)
        .read(EHLO_REPLY)
        .write(AUTH)
        .read(b"535 5.7.8 Authentication credentials invalid\r\n");

    let mut session = session(&mut script).await;
    session.upgrade_encryption("relay.example.com").await.unwrap();
    let err = session
        .authenticate("user@example.com", "secret")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::SmtpError { code: 535, .. }));
    assert_eq!(session.state(), SessionState::Encrypted);
}

#[tokio::test]
async fn rejected_recipient_keeps_envelope_open() {
    let mut script = handshake();
    script
        .write(b"MAIL FROM:<user@example.com>\r\n")
        .read(b"250 OK\r\n")
        .write(b"RCPT TO:<a@example.org>\r\n")
        .read(b"250 OK\r\n")
        .write(b"RCPT TO:<b@example.org>\r\n")
        .read(b"550 5.1.1 No such user\r\n")
        .write(b"RCPT TO:<c@example.org>\r\n")
        .read(b"250 OK\r\n");

    let mut session = authenticated(&mut script).await;
    session.open_envelope(&addr("user@example.com")).await.unwrap();
    session.add_recipient(&addr("a@example.org")).await.unwrap();

    let err = session.add_recipient(&addr("b@example.org")).await.unwrap_err();
    assert!(err.is_permanent());
    assert!(!err.is_connection_lost());
    assert_eq!(session.state(), SessionState::RecipientAdded);

    session.add_recipient(&addr("c@example.org")).await.unwrap();
}

#[tokio::test]
async fn reset_reopens_for_next_message() {
    let mut script = handshake();
    script
        .write(b"MAIL FROM:<user@example.com>\r\n")
        .read(b"250 OK\r\n")
        .write(b"RSET\r\n")
        .read(b"250 Flushed\r\n")
        .write(b"MAIL FROM:<user@example.com>\r\n")
        .read(b"250 OK\r\n");

    let mut session = authenticated(&mut script).await;
    session.open_envelope(&addr("user@example.com")).await.unwrap();
    session.reset().await.unwrap();
    assert_eq!(session.state(), SessionState::Authenticated);
    session.open_envelope(&addr("user@example.com")).await.unwrap();
}

#[tokio::test]
async fn out_of_order_calls_touch_nothing() {
    let mut script = handshake();
    let mut session = authenticated(&mut script).await;

    let err = session.write_body(b"too early").await.unwrap_err();
    assert!(matches!(err, Error::InvalidState { .. }));
    let err = session.add_recipient(&addr("a@example.org")).await.unwrap_err();
    assert!(matches!(err, Error::InvalidState { .. }));
    assert_eq!(session.state(), SessionState::Authenticated);
}

#[tokio::test]
async fn service_unavailable_closes_session() {
    let mut script = handshake();
    script
        .write(b"MAIL FROM:<user@example.com>\r\n")
        .read(b"421 4.3.2 Shutting down\r\n");

    let mut session = authenticated(&mut script).await;
    let err = session.open_envelope(&addr("user@example.com")).await.unwrap_err();
    assert!(err.is_connection_lost());
    assert_eq!(session.state(), SessionState::Closed);

    // Nothing left to send QUIT over
    session.close().await.unwrap();
}

#[tokio::test]
async fn rejected_greeting_fails_connect() {
    let mock = Builder::new().read(b"554 No service\r\n").build();
    let stream = ScriptedStream {
        reader: BufReader::new(mock),
        encrypted: false,
    };
    let err = Session::from_stream(stream, "localhost").await.unwrap_err();
    assert!(matches!(err, Error::SmtpError { code: 554, .. }));
}
