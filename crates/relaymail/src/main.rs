//! `relaymail` - send mail described by a JSON document.
//!
//! Usage: `relaymail <config.json> <message.json>`
//!
//! The message document's keys pick the shape: `sends` for a batch, `tos`
//! for a broadcast, `to` for a single message.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, bail};
use relaymail_core::{DispatchError, DispatchReport, MailRequest, Mailer, RelayConfig};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "usage: relaymail <config.json> <message.json>";

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "relaymail=info,relaymail_core=info,relaymail_smtp=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run().await {
        Ok(report) if report.is_complete() => ExitCode::SUCCESS,
        Ok(report) => {
            print_failures(&report);
            ExitCode::from(2)
        }
        Err(err) => {
            error!("{err:#}");
            if let Some(report) = err
                .downcast_ref::<DispatchError>()
                .and_then(DispatchError::partial_report)
            {
                println!("delivered {} message(s) before stopping", report.delivered);
                print_failures(report);
            }
            eprintln!("relaymail: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<DispatchReport> {
    let (config_path, message_path) = parse_args(std::env::args_os().skip(1).map(PathBuf::from))?;

    let config = RelayConfig::from_json(&read(&config_path)?)
        .inspect_err(|err| error!(field = err.field(), "rejected relay configuration"))
        .with_context(|| format!("Invalid configuration in {}", config_path.display()))?;
    let request: MailRequest = serde_json::from_str(&read(&message_path)?)
        .with_context(|| format!("Cannot parse message in {}", message_path.display()))?;

    let mailer = Mailer::new(&config)?;
    info!(
        shape = request.kind(),
        provider = %mailer.provider_kind(),
        "dispatching"
    );

    let report = mailer.send_email(&request).await?;
    println!(
        "delivered {} of {} message(s)",
        report.delivered,
        report.attempted()
    );
    Ok(report)
}

fn parse_args(mut args: impl Iterator<Item = PathBuf>) -> anyhow::Result<(PathBuf, PathBuf)> {
    match (args.next(), args.next(), args.next()) {
        (Some(config), Some(message), None) => Ok((config, message)),
        _ => bail!(USAGE),
    }
}

fn read(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Cannot read {}", path.display()))
}

fn print_failures(report: &DispatchReport) {
    for failure in &report.failures {
        eprintln!(
            "entry {} ({}): {}",
            failure.index + 1,
            failure.recipients.join(","),
            failure.error
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(args: &[&str]) -> impl Iterator<Item = PathBuf> {
        args.iter().map(PathBuf::from).collect::<Vec<_>>().into_iter()
    }

    #[test]
    fn takes_exactly_two_paths() {
        let (config, message) = parse_args(paths(&["relay.json", "mail.json"])).unwrap();
        assert_eq!(config, PathBuf::from("relay.json"));
        assert_eq!(message, PathBuf::from("mail.json"));

        assert!(parse_args(paths(&["relay.json"])).is_err());
        assert!(parse_args(paths(&["a", "b", "c"])).is_err());
    }
}
