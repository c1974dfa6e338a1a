//! Raw protocol provider: drives a [`TransportSession`] directly.

use std::sync::Arc;

use relaymail_smtp::{Address, SessionState};
use tracing::{debug, info, warn};

use crate::config::Relay;
use crate::error::{DispatchError, Result};
use crate::message::{FailurePolicy, Outgoing};
use crate::report::DispatchReport;
use crate::transport::{Connector, TransportSession};

/// Sends an outbox over one session it opens and closes itself.
///
/// The session is connected, encrypted and authenticated once. Each message
/// then gets its own envelope, with RSET in between.
#[derive(Debug)]
pub struct RawProvider<C> {
    connector: C,
    relay: Arc<Relay>,
}

impl<C: Connector> RawProvider<C> {
    /// Creates a provider for `relay`.
    #[must_use]
    pub const fn new(connector: C, relay: Arc<Relay>) -> Self {
        Self { connector, relay }
    }

    /// Delivers `outgoing` in order.
    ///
    /// # Errors
    ///
    /// Under [`FailurePolicy::Abort`] returns the first failure. Under
    /// [`FailurePolicy::Isolate`] only connection-level failures are
    /// returned; the rest land in the report. A batch that stops after
    /// handling some entries returns [`DispatchError::BatchAborted`] with
    /// the report so far.
    pub async fn deliver(
        &self,
        outgoing: &[Outgoing],
        policy: FailurePolicy,
    ) -> Result<DispatchReport> {
        if outgoing.is_empty() {
            return Ok(DispatchReport::default());
        }

        let mut session = self.open().await?;
        let result = self.drive(&mut session, outgoing, policy).await;
        release(&mut session).await;
        result
    }

    /// Connects, upgrades to TLS and authenticates.
    async fn open(&self) -> Result<C::Session> {
        let relay = &self.relay;
        let mut session = self
            .connector
            .connect(&relay.host, relay.port)
            .await
            .map_err(|e| DispatchError::Connect {
                relay: relay.endpoint(),
                source: e.into(),
            })?;

        if let Err(err) = self.handshake(&mut session).await {
            release(&mut session).await;
            return Err(err);
        }
        Ok(session)
    }

    async fn handshake(&self, session: &mut C::Session) -> Result<()> {
        let relay = &self.relay;
        session
            .upgrade_encryption(&relay.host)
            .await
            .map_err(|e| DispatchError::Encryption {
                relay: relay.endpoint(),
                source: e.into(),
            })?;

        session
            .authenticate(&relay.sender, &relay.credential)
            .await
            .map_err(|e| DispatchError::Auth {
                identity: relay.sender.clone(),
                source: e.into(),
            })?;

        debug!(relay = %relay.endpoint(), "session ready");
        Ok(())
    }

    async fn drive(
        &self,
        session: &mut C::Session,
        outgoing: &[Outgoing],
        policy: FailurePolicy,
    ) -> Result<DispatchReport> {
        let mut report = DispatchReport::default();

        for (index, message) in outgoing.iter().enumerate() {
            if index > 0
                && session.state() != SessionState::Authenticated
                && let Err(e) = session.reset().await
            {
                warn!(index, error = %e, "RSET failed, stopping batch");
                let err = DispatchError::Reset { source: e.into() };
                return Err(err.into_aborted(report, index));
            }

            match self.send_one(session, message).await {
                Ok(()) => {
                    info!(to = %message.recipient_list(), subject = %message.subject, "message delivered");
                    report.record_delivered();
                }
                Err(err) if policy == FailurePolicy::Abort => return Err(err),
                Err(err) if session.state() == SessionState::Closed => {
                    warn!(index, error = %err, "connection lost, stopping batch");
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

    /// Envelope, recipients and data for one message.
    async fn send_one(&self, session: &mut C::Session, message: &Outgoing) -> Result<()> {
        let Some(first) = message.recipients.first() else {
            return Err(DispatchError::NoRecipients {
                subject: message.subject.clone(),
            });
        };
        debug!(to = %first, count = message.recipients.len(), "opening envelope");

        session
            .open_envelope(&self.relay.sender_address)
            .await
            .map_err(|e| DispatchError::Envelope {
                sender: self.relay.sender.clone(),
                recipients: message.recipient_list(),
                source: e.into(),
            })?;

        for recipient in &message.recipients {
            let address =
                Address::new(recipient.as_str()).map_err(|e| DispatchError::RecipientRejected {
                    address: recipient.clone(),
                    message: e.to_string(),
                })?;
            session
                .add_recipient(&address)
                .await
                .map_err(|e| DispatchError::RecipientRejected {
                    address: recipient.clone(),
                    message: e.server_message(),
                })?;
        }

        session
            .write_body(message.transcript.as_bytes())
            .await
            .map_err(|e| DispatchError::Transfer {
                recipients: message.recipient_list(),
                source: e.into(),
            })
    }
}

/// Closes the session; a failed QUIT is only logged.
async fn release<S: TransportSession>(session: &mut S) {
    if let Err(err) = session.close().await {
        warn!(error = %err, "QUIT failed, dropping connection");
    }
}
