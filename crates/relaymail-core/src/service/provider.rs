//! Provider selection and the [`Mailer`] facade.

use std::fmt;
use std::sync::Arc;

use lettre::{AsyncSmtpTransport, Tokio1Executor};
use serde::Deserialize;
use tracing::{debug, info};

use super::library::{LibraryProvider, LibraryTransport, smtp_transport};
use super::raw::RawProvider;
use crate::config::{Relay, RelayConfig};
use crate::error::{DispatchError, Result};
use crate::message::{FailurePolicy, Outbox, Outgoing};
use crate::report::DispatchReport;
use crate::transport::{Connector, SmtpConnector};

/// Relays that are reached through the mail library instead of the raw
/// protocol driver.
const LIBRARY_RELAYS: &[&str] = &["smtp.qq.com"];

/// How messages reach a relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// The protocol driver in this crate, over one session per call.
    Raw,
    /// lettre, which manages its own connections.
    Library,
}

impl ProviderKind {
    /// Looks up the provider for a relay host.
    ///
    /// Unknown relays get [`ProviderKind::Raw`], which assumes the relay
    /// offers STARTTLS followed by `AUTH PLAIN`.
    #[must_use]
    pub fn for_host(host: &str) -> Self {
        let host = host.trim().trim_end_matches('.');
        if LIBRARY_RELAYS
            .iter()
            .any(|relay| relay.eq_ignore_ascii_case(host))
        {
            Self::Library
        } else {
            Self::Raw
        }
    }

    /// Lowercase name, as accepted in configuration.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Library => "library",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One of the two delivery paths.
pub enum Provider<C, L> {
    /// Protocol driver.
    Raw(RawProvider<C>),
    /// Mail library.
    Library(LibraryProvider<L>),
}

impl<C: Connector, L: LibraryTransport> Provider<C, L> {
    /// Which path this is.
    #[must_use]
    pub const fn kind(&self) -> ProviderKind {
        match self {
            Self::Raw(_) => ProviderKind::Raw,
            Self::Library(_) => ProviderKind::Library,
        }
    }

    /// Delivers `outgoing` under `policy`.
    ///
    /// # Errors
    ///
    /// Returns the terminal failure of the chosen path.
    pub async fn deliver(
        &self,
        outgoing: &[Outgoing],
        policy: FailurePolicy,
    ) -> Result<DispatchReport> {
        match self {
            Self::Raw(raw) => raw.deliver(outgoing, policy).await,
            Self::Library(library) => library.deliver(outgoing, policy).await,
        }
    }
}

/// Sends single, batch and broadcast mail through one relay.
///
/// The configuration is validated when the mailer is built. Each
/// [`send_email`](Self::send_email) call then composes its messages and hands
/// them to the provider chosen for the relay.
pub struct Mailer<C = SmtpConnector, L = AsyncSmtpTransport<Tokio1Executor>> {
    relay: Arc<Relay>,
    provider: Provider<C, L>,
}

impl Mailer {
    /// Creates a mailer for `config` with the production transports.
    ///
    /// No connection is made here.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::ConfigInvalid`] if a required field is missing
    /// or unusable.
    pub fn new(config: &RelayConfig) -> Result<Self> {
        let relay = Arc::new(Relay::from_config(config)?);
        let provider = match relay.provider {
            ProviderKind::Raw => Provider::Raw(RawProvider::new(
                SmtpConnector::new(relay.client_hostname.clone()),
                Arc::clone(&relay),
            )),
            ProviderKind::Library => {
                Provider::Library(LibraryProvider::new(smtp_transport(&relay)?, Arc::clone(&relay)))
            }
        };
        debug!(relay = %relay.endpoint(), provider = %relay.provider, "mailer ready");
        Ok(Self { relay, provider })
    }
}

impl<C: Connector, L: LibraryTransport> Mailer<C, L> {
    /// Creates a mailer over caller-supplied transports.
    ///
    /// Only the transport for the selected provider is kept.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::ConfigInvalid`] if a required field is missing
    /// or unusable.
    pub fn with_transports(config: &RelayConfig, connector: C, library: L) -> Result<Self> {
        let relay = Arc::new(Relay::from_config(config)?);
        let provider = match relay.provider {
            ProviderKind::Raw => Provider::Raw(RawProvider::new(connector, Arc::clone(&relay))),
            ProviderKind::Library => {
                Provider::Library(LibraryProvider::new(library, Arc::clone(&relay)))
            }
        };
        Ok(Self { relay, provider })
    }

    /// The validated relay settings.
    #[must_use]
    pub fn relay(&self) -> &Relay {
        &self.relay
    }

    /// The provider serving this relay.
    #[must_use]
    pub const fn provider_kind(&self) -> ProviderKind {
        self.provider.kind()
    }

    /// Sends everything in `outbox`.
    ///
    /// Single and broadcast sends deliver everything or fail. A batch
    /// returns `Ok` with its per-entry failures in the report unless the
    /// connection itself fails.
    ///
    /// Per-message failures (`Envelope`, `RecipientRejected`, `Transfer`,
    /// `Delivery`) name the recipients of the message. Session failures
    /// (`Connect`, `Encryption`, `Auth`) concern no single recipient and
    /// name the relay or the sender identity instead.
    ///
    /// # Errors
    ///
    /// Returns the first failure for single and broadcast sends, and
    /// connection-level failures for batches. A batch that stops after
    /// handling some entries returns [`DispatchError::BatchAborted`], which
    /// carries the report so far.
    pub async fn send_email<O: Outbox + ?Sized>(&self, outbox: &O) -> Result<DispatchReport> {
        let policy = outbox.failure_policy();
        let outgoing = outbox.outgoing(&self.relay.sender);

        if policy == FailurePolicy::Abort
            && let Some(empty) = outgoing.iter().find(|m| m.recipients.is_empty())
        {
            return Err(DispatchError::NoRecipients {
                subject: empty.subject.clone(),
            });
        }

        info!(
            relay = %self.relay.endpoint(),
            provider = %self.provider.kind(),
            messages = outgoing.len(),
            "sending email"
        );
        let report = self.provider.deliver(&outgoing, policy).await?;
        if !report.is_complete() {
            info!(
                delivered = report.delivered,
                failed = report.failures.len(),
                "batch finished with failures"
            );
        }
        Ok(report)
    }
}

impl<C, L> fmt::Debug for Mailer<C, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mailer")
            .field("relay", &self.relay)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn library_relay_is_matched_loosely() {
        assert_eq!(ProviderKind::for_host("smtp.qq.com"), ProviderKind::Library);
        assert_eq!(ProviderKind::for_host("SMTP.QQ.COM."), ProviderKind::Library);
        assert_eq!(ProviderKind::for_host(" smtp.qq.com "), ProviderKind::Library);
    }

    #[test]
    fn other_relays_use_the_driver() {
        assert_eq!(ProviderKind::for_host("smtp.gmail.com"), ProviderKind::Raw);
        assert_eq!(ProviderKind::for_host("qq.com"), ProviderKind::Raw);
        assert_eq!(ProviderKind::for_host(""), ProviderKind::Raw);
    }

    #[test]
    fn kind_names_round_trip_through_serde() {
        for kind in [ProviderKind::Raw, ProviderKind::Library] {
            let json = format!("\"{kind}\"");
            let parsed: ProviderKind = serde_json::from_str(&json).unwrap();
            assert_eq!(parsed, kind);
        }
    }

    #[test]
    fn invalid_config_fails_before_building_transports() {
        let config = RelayConfig::new("smtp.example.com", "587", "me@example.com", "");
        let err = Mailer::new(&config).unwrap_err();
        assert!(matches!(err, DispatchError::ConfigInvalid(_)));
        assert_eq!(err.stage(), "configuration");
    }
}
