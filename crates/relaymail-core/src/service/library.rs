//! Library provider: hands composed messages to lettre.
//!
//! lettre owns the connection lifecycle here (implicit TLS or STARTTLS,
//! authentication, pooling). The transcript is still composed by this
//! crate and sent verbatim, so both providers transmit identical content.

use std::sync::Arc;

use lettre::address::Envelope;
use lettre::transport::smtp::authentication::{Credentials, Mechanism};
use lettre::transport::smtp::extension::ClientId;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use tracing::{debug, info, warn};

use crate::config::Relay;
use crate::error::{BoxError, DispatchError, Result};
use crate::message::{FailurePolicy, Outgoing};
use crate::report::DispatchReport;

/// Port on which relays expect TLS from the first byte.
const IMPLICIT_TLS_PORT: u16 = 465;

/// Where in its session the library failed.
#[derive(Debug)]
pub enum LibraryFailure {
    /// The relay could not be reached, timed out or closed the session.
    Connect(BoxError),
    /// Implicit TLS or STARTTLS failed.
    Encryption(BoxError),
    /// Credentials were refused.
    Auth(BoxError),
    /// The relay refused a mailbox of the envelope.
    Recipient(BoxError),
    /// The relay refused the message.
    Message(BoxError),
}

/// A mail library transport that sends pre-composed messages.
#[allow(async_fn_in_trait)]
pub trait LibraryTransport {
    /// Sends `transcript` to the envelope's recipients.
    async fn send_raw(
        &self,
        envelope: &Envelope,
        transcript: &[u8],
    ) -> std::result::Result<(), LibraryFailure>;
}

impl LibraryTransport for AsyncSmtpTransport<Tokio1Executor> {
    async fn send_raw(
        &self,
        envelope: &Envelope,
        transcript: &[u8],
    ) -> std::result::Result<(), LibraryFailure> {
        AsyncTransport::send_raw(self, envelope, transcript)
            .await
            .map(|_| ())
            .map_err(LibraryFailure::from)
    }
}

/// Source of a library error that carries no reply code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ErrorOrigin {
    Tls,
    Client,
    Transport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailureClass {
    Connect,
    Encryption,
    Auth,
    Recipient,
    Message,
}

/// Maps a reply code, or the origin of a code-less error, to a stage.
///
/// 421 means the relay is closing the session, so it counts as a
/// connection failure like on the raw path.
const fn classify(status: Option<u16>, origin: ErrorOrigin) -> FailureClass {
    match status {
        Some(421) => FailureClass::Connect,
        Some(530..=539) => FailureClass::Auth,
        Some(450 | 550 | 551 | 553) => FailureClass::Recipient,
        Some(_) => FailureClass::Message,
        None => match origin {
            ErrorOrigin::Tls => FailureClass::Encryption,
            ErrorOrigin::Client => FailureClass::Message,
            ErrorOrigin::Transport => FailureClass::Connect,
        },
    }
}

impl LibraryFailure {
    fn classified(class: FailureClass, source: BoxError) -> Self {
        match class {
            FailureClass::Connect => Self::Connect(source),
            FailureClass::Encryption => Self::Encryption(source),
            FailureClass::Auth => Self::Auth(source),
            FailureClass::Recipient => Self::Recipient(source),
            FailureClass::Message => Self::Message(source),
        }
    }
}

impl From<lettre::transport::smtp::Error> for LibraryFailure {
    fn from(err: lettre::transport::smtp::Error) -> Self {
        let status = err
            .status()
            .and_then(|code| code.to_string().parse::<u16>().ok());
        let origin = if err.is_tls() {
            ErrorOrigin::Tls
        } else if err.is_client() {
            ErrorOrigin::Client
        } else {
            ErrorOrigin::Transport
        };
        Self::classified(classify(status, origin), err.into())
    }
}

/// Picks the refused recipient out of a rejection.
///
/// lettre does not say which `RCPT TO` failed. A lone recipient is the
/// refused one; otherwise the diagnostic must name exactly one of them.
fn rejected_address<'a>(recipients: &'a [String], diagnostic: &str) -> Option<&'a str> {
    if let [only] = recipients {
        return Some(only.as_str());
    }

    let diagnostic = diagnostic.to_ascii_lowercase();
    let mut named = recipients
        .iter()
        .filter(|r| diagnostic.contains(&r.to_ascii_lowercase()));
    match (named.next(), named.next()) {
        (Some(address), None) => Some(address.as_str()),
        _ => None,
    }
}

/// Builds lettre's pooled transport for `relay`.
///
/// Port 465 uses implicit TLS; any other port upgrades with STARTTLS. In
/// both cases the certificate is verified against `relay.host`.
///
/// # Errors
///
/// Returns an error if the TLS parameters cannot be built for the host.
pub fn smtp_transport(relay: &Relay) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
    let builder = if relay.port == IMPLICIT_TLS_PORT {
        AsyncSmtpTransport::<Tokio1Executor>::relay(&relay.host)
    } else {
        AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&relay.host)
    }
    .map_err(|e| DispatchError::Encryption {
        relay: relay.endpoint(),
        source: e.into(),
    })?;

    Ok(builder
        .port(relay.port)
        .hello_name(ClientId::Domain(relay.client_hostname.clone()))
        .credentials(Credentials::new(
            relay.sender.clone(),
            relay.credential.clone(),
        ))
        .authentication(vec![Mechanism::Plain])
        .build())
}

/// Sends each message through a [`LibraryTransport`].
#[derive(Debug)]
pub struct LibraryProvider<T> {
    transport: T,
    relay: Arc<Relay>,
}

impl<T: LibraryTransport> LibraryProvider<T> {
    /// Creates a provider for `relay`.
    #[must_use]
    pub const fn new(transport: T, relay: Arc<Relay>) -> Self {
        Self { transport, relay }
    }

    /// Delivers `outgoing` in order, with the same failure semantics as the
    /// raw provider.
    ///
    /// # Errors
    ///
    /// Under [`FailurePolicy::Abort`] returns the first failure. Under
    /// [`FailurePolicy::Isolate`] only connect, encryption and
    /// authentication failures are returned, wrapped in
    /// [`DispatchError::BatchAborted`] once an entry was handled; the rest
    /// land in the report.
    pub async fn deliver(
        &self,
        outgoing: &[Outgoing],
        policy: FailurePolicy,
    ) -> Result<DispatchReport> {
        let mut report = DispatchReport::default();

        for (index, message) in outgoing.iter().enumerate() {
            match self.send_one(message).await {
                Ok(()) => {
                    info!(to = %message.recipient_list(), subject = %message.subject, "message delivered");
                    report.record_delivered();
                }
                Err(err) if policy == FailurePolicy::Abort => return Err(err),
                Err(err) if err.is_fatal() => {
                    warn!(index, error = %err, "relay unusable, stopping batch");
                    return Err(err.into_aborted(report, index));
                }
                Err(err) => {
                    warn!(index, to = %message.recipient_list(), error = %err, "batch entry failed");
                    report.record_failure(index, message, err);
                }
            }
        }

        Ok(report)
    }

    async fn send_one(&self, message: &Outgoing) -> Result<()> {
        if message.recipients.is_empty() {
            return Err(DispatchError::NoRecipients {
                subject: message.subject.clone(),
            });
        }

        let sender = self
            .relay
            .sender
            .parse::<lettre::Address>()
            .map_err(|e| DispatchError::Envelope {
                sender: self.relay.sender.clone(),
                recipients: message.recipient_list(),
                source: e.into(),
            })?;

        let mut recipients = Vec::with_capacity(message.recipients.len());
        for recipient in &message.recipients {
            let address = recipient.parse::<lettre::Address>().map_err(|e| {
                DispatchError::RecipientRejected {
                    address: recipient.clone(),
                    message: e.to_string(),
                }
            })?;
            recipients.push(address);
        }

        let envelope =
            Envelope::new(Some(sender), recipients).map_err(|e| DispatchError::Envelope {
                sender: self.relay.sender.clone(),
                recipients: message.recipient_list(),
                source: e.into(),
            })?;

        debug!(to = %message.recipient_list(), "handing message to library transport");
        self.transport
            .send_raw(&envelope, message.transcript.as_bytes())
            .await
            .map_err(|failure| match failure {
                LibraryFailure::Connect(source) => DispatchError::Connect {
                    relay: self.relay.endpoint(),
                    source,
                },
                LibraryFailure::Encryption(source) => DispatchError::Encryption {
                    relay: self.relay.endpoint(),
                    source,
                },
                LibraryFailure::Auth(source) => DispatchError::Auth {
                    identity: self.relay.sender.clone(),
                    source,
                },
                LibraryFailure::Recipient(source) => {
                    let diagnostic = source.to_string();
                    match rejected_address(&message.recipients, &diagnostic) {
                        Some(address) => DispatchError::RecipientRejected {
                            address: address.to_string(),
                            message: diagnostic,
                        },
                        None => DispatchError::Delivery {
                            recipients: message.recipient_list(),
                            source,
                        },
                    }
                }
                LibraryFailure::Message(source) => DispatchError::Delivery {
                    recipients: message.recipient_list(),
                    source,
                },
            })
    }
}
