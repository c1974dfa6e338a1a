//! Relay configuration.
//!
//! A [`RelayConfig`] is loaded and validated once and then only read. The
//! dispatch engine turns it into a [`Relay`], the checked form every
//! provider works from.

use std::fmt;

use relaymail_smtp::{Address, DEFAULT_CLIENT_HOSTNAME};
use serde::{Deserialize, Deserializer};

use crate::service::ProviderKind;

/// Validation error for relay configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Relay host is empty.
    #[error("SMTP address is required")]
    MissingHost,
    /// Relay port is empty.
    #[error("Port is required")]
    MissingPort,
    /// Relay port is not a number in 1-65535.
    #[error("Port must be 1-65535, got {0:?}")]
    InvalidPort(String),
    /// Sender address is empty.
    #[error("From email address is required")]
    MissingSender,
    /// Sender address is not a usable envelope address.
    #[error("From email address is invalid: {0}")]
    InvalidSender(String),
    /// Sender authorization credential is empty.
    #[error("From email authorization code is required")]
    MissingCredential,
    /// The document could not be parsed.
    #[error("Cannot parse relay configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ConfigError {
    /// Get the field name this error relates to.
    #[must_use]
    pub const fn field(&self) -> &'static str {
        match self {
            Self::MissingHost => "host",
            Self::MissingPort | Self::InvalidPort(_) => "port",
            Self::MissingSender | Self::InvalidSender(_) => "sender_address",
            Self::MissingCredential => "sender_credential",
            Self::Parse(_) => "document",
        }
    }
}

/// Relay connection settings.
///
/// Field names also accept the keys `Smtp`, `Port`, `From`, `From_code` and
/// `PortInt`. Missing fields deserialize as empty so that [`validate`](Self::validate)
/// can name them.
#[derive(Clone, Default, Deserialize)]
pub struct RelayConfig {
    /// Relay hostname, also used as the TLS server name.
    #[serde(default, alias = "Smtp", alias = "smtp")]
    pub host: String,
    /// Relay port as written in the configuration.
    #[serde(default, alias = "Port", deserialize_with = "port_text")]
    pub port: String,
    /// Envelope sender and `From` header address.
    #[serde(default, alias = "From", alias = "from")]
    pub sender_address: String,
    /// Authorization token or app password for the sender.
    #[serde(default, alias = "From_code", alias = "from_code")]
    pub sender_credential: String,
    /// Numeric port; takes precedence over `port` when present.
    #[serde(default, alias = "PortInt", alias = "port_int")]
    pub port_number: Option<u16>,
    /// Forces a provider instead of looking one up by host.
    #[serde(default)]
    pub provider: Option<ProviderKind>,
    /// Hostname announced in EHLO.
    #[serde(default)]
    pub client_hostname: Option<String>,
}

impl RelayConfig {
    /// Creates a configuration from the four required fields.
    #[must_use]
    pub fn new(
        host: impl Into<String>,
        port: impl Into<String>,
        sender_address: impl Into<String>,
        sender_credential: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: port.into(),
            sender_address: sender_address.into(),
            sender_credential: sender_credential.into(),
            ..Self::default()
        }
    }

    /// Parses a JSON document holding either the record itself or the record
    /// under an `"email"` key, and validates it.
    ///
    /// # Errors
    ///
    /// Returns an error if the document does not parse or a field is invalid.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let mut value: serde_json::Value = serde_json::from_str(text)?;
        if let Some(section) = value.get_mut("email").map(serde_json::Value::take) {
            value = section;
        }
        let config: Self = serde_json::from_value(value)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every required field is present and usable.
    ///
    /// # Errors
    ///
    /// Returns the first problem found, in field order.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::MissingHost);
        }
        self.port_u16()?;
        if self.sender_address.trim().is_empty() {
            return Err(ConfigError::MissingSender);
        }
        Address::new(self.sender_address.trim())
            .map_err(|e| ConfigError::InvalidSender(e.to_string()))?;
        if self.sender_credential.is_empty() {
            return Err(ConfigError::MissingCredential);
        }
        Ok(())
    }

    /// Returns the port as a number.
    ///
    /// The port string is required even when `port_number` is set; the
    /// numeric port only replaces its value.
    ///
    /// # Errors
    ///
    /// Returns an error if no port is set or it is not in 1-65535.
    pub fn port_u16(&self) -> Result<u16, ConfigError> {
        let text = self.port.trim();
        if text.is_empty() {
            return Err(ConfigError::MissingPort);
        }

        if let Some(port) = self.port_number {
            return if port == 0 {
                Err(ConfigError::InvalidPort(port.to_string()))
            } else {
                Ok(port)
            };
        }

        match text.parse::<u16>() {
            Ok(port) if port != 0 => Ok(port),
            _ => Err(ConfigError::InvalidPort(text.to_string())),
        }
    }
}

impl fmt::Debug for RelayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("sender_address", &self.sender_address)
            .field("sender_credential", &"<redacted>")
            .field("port_number", &self.port_number)
            .field("provider", &self.provider)
            .field("client_hostname", &self.client_hostname)
            .finish()
    }
}

/// Accepts the port as either a string or a number.
fn port_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum PortValue {
        Text(String),
        Number(u64),
    }

    Ok(match PortValue::deserialize(deserializer)? {
        PortValue::Text(text) => text,
        PortValue::Number(n) => n.to_string(),
    })
}

/// Validated relay settings shared by the providers.
#[derive(Clone)]
pub struct Relay {
    /// Relay hostname.
    pub host: String,
    /// Relay port.
    pub port: u16,
    /// Sender address, as configured.
    pub sender: String,
    /// Sender address in envelope form.
    pub sender_address: Address,
    /// Authorization credential.
    pub credential: String,
    /// Hostname announced in EHLO.
    pub client_hostname: String,
    /// Provider chosen for this relay.
    pub provider: ProviderKind,
}

impl Relay {
    /// Validates `config` and resolves the provider.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn from_config(config: &RelayConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let sender = config.sender_address.trim().to_string();
        let sender_address =
            Address::new(sender.clone()).map_err(|e| ConfigError::InvalidSender(e.to_string()))?;

        Ok(Self {
            host: config.host.trim().to_string(),
            port: config.port_u16()?,
            sender,
            sender_address,
            credential: config.sender_credential.clone(),
            client_hostname: config
                .client_hostname
                .clone()
                .unwrap_or_else(|| DEFAULT_CLIENT_HOSTNAME.to_string()),
            provider: config
                .provider
                .unwrap_or_else(|| ProviderKind::for_host(&config.host)),
        })
    }

    /// `host:port`, as used in diagnostics.
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for Relay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relay")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("sender", &self.sender)
            .field("credential", &"<redacted>")
            .field("client_hostname", &self.client_hostname)
            .field("provider", &self.provider)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn valid() -> RelayConfig {
        RelayConfig::new("smtp.example.com", "587", "me@example.com", "app-token")
    }

    #[test]
    fn valid_config_passes() {
        let config = valid();
        assert!(config.validate().is_ok());
        assert_eq!(config.port_u16().unwrap(), 587);
    }

    #[test]
    fn missing_fields_are_named() {
        let mut config = valid();
        config.host = "  ".into();
        assert!(matches!(config.validate(), Err(ConfigError::MissingHost)));

        let mut config = valid();
        config.port = String::new();
        assert!(matches!(config.validate(), Err(ConfigError::MissingPort)));

        let mut config = valid();
        config.sender_address = String::new();
        assert!(matches!(config.validate(), Err(ConfigError::MissingSender)));

        let mut config = valid();
        config.sender_credential = String::new();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::MissingCredential));
        assert_eq!(err.field(), "sender_credential");
        assert_eq!(err.to_string(), "From email authorization code is required");
    }

    #[test]
    fn port_must_be_numeric() {
        let mut config = valid();
        config.port = "smtp".into();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidPort(_))));

        config.port = "0".into();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidPort(_))));
    }

    #[test]
    fn numeric_port_takes_precedence() {
        let mut config = valid();
        config.port = "465".into();
        config.port_number = Some(465);
        assert_eq!(config.port_u16().unwrap(), 465);

        config.port_number = Some(2525);
        assert_eq!(config.port_u16().unwrap(), 2525);
    }

    #[test]
    fn numeric_port_does_not_replace_missing_port() {
        let mut config = valid();
        config.port = String::new();
        config.port_number = Some(465);
        assert!(matches!(config.validate(), Err(ConfigError::MissingPort)));

        let text = r#"{"Smtp": "smtp.qq.com", "Port": "", "PortInt": 465, "From": "me@qq.com", "From_code": "abcd"}"#;
        assert!(matches!(
            RelayConfig::from_json(text),
            Err(ConfigError::MissingPort)
        ));
    }

    #[test]
    fn sender_must_be_an_address() {
        let mut config = valid();
        config.sender_address = "not-an-address".into();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidSender(_))));
    }

    #[test]
    fn parses_legacy_keys_under_email_section() {
        let text = r#"{
            "email": {
                "Smtp": "smtp.qq.com",
                "Port": "465",
                "From": "me@qq.com",
                "From_code": "abcd"
            }
        }"#;
        let config = RelayConfig::from_json(text).unwrap();
        assert_eq!(config.host, "smtp.qq.com");
        assert_eq!(config.port_u16().unwrap(), 465);
        assert_eq!(config.sender_address, "me@qq.com");
    }

    #[test]
    fn parses_snake_case_with_numeric_port() {
        let text = r#"{
            "host": "smtp.example.com",
            "port": 587,
            "sender_address": "me@example.com",
            "sender_credential": "token",
            "provider": "library"
        }"#;
        let config = RelayConfig::from_json(text).unwrap();
        assert_eq!(config.port, "587");
        assert_eq!(config.provider, Some(ProviderKind::Library));
    }

    #[test]
    fn missing_credential_in_document_is_invalid() {
        let text = r#"{"host": "smtp.example.com", "port": "587", "sender_address": "me@example.com"}"#;
        assert!(matches!(
            RelayConfig::from_json(text),
            Err(ConfigError::MissingCredential)
        ));
    }

    #[test]
    fn debug_redacts_credential() {
        let rendered = format!("{:?}", valid());
        assert!(!rendered.contains("app-token"));
        assert!(rendered.contains("<redacted>"));

        let relay = Relay::from_config(&valid()).unwrap();
        assert!(!format!("{relay:?}").contains("app-token"));
    }

    #[test]
    fn relay_resolves_provider_and_defaults() {
        let relay = Relay::from_config(&valid()).unwrap();
        assert_eq!(relay.provider, ProviderKind::Raw);
        assert_eq!(relay.client_hostname, "localhost");
        assert_eq!(relay.endpoint(), "smtp.example.com:587");

        let mut config = valid();
        config.host = "smtp.qq.com".into();
        assert_eq!(
            Relay::from_config(&config).unwrap().provider,
            ProviderKind::Library
        );
    }
}
