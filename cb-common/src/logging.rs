//! Logging setup for the scanner binary.
//!
//! Runs are started by an external scheduler that captures stderr, so every
//! record goes there. Transport crates (hyper, reqwest, h2, rustls) are held at
//! `warn` unless `RUST_LOG` says otherwise.

use std::fmt;
use std::io::IsTerminal;
use std::str::FromStr;

use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::config::ObservabilityConfig;

/// Crates whose debug output drowns the scan log.
pub const NOISY_MODULES: &[&str] = &["hyper", "hyper_util", "reqwest", "h2", "rustls"];

/// Output format of the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line, for log shippers
    Json,
    /// Single-line human-readable records
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            other => Err(format!("'{}' is not one of json, pretty", other)),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Json => "json",
            Self::Pretty => "pretty",
        })
    }
}

fn build_directives(log_level: &str) -> String {
    NOISY_MODULES
        .iter()
        .fold(log_level.to_ascii_lowercase(), |acc, module| {
            format!("{},{}=warn", acc, module)
        })
}

fn build_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(build_directives(log_level)))
}

/// Install the global subscriber for a scanner run.
///
/// An unknown format falls back to pretty. Returns `false` when a subscriber
/// was already installed, in which case the existing one is left alone.
pub fn init_logging(config: &ObservabilityConfig) -> bool {
    let format = config.log_format.parse().unwrap_or(LogFormat::Pretty);
    let registry = tracing_subscriber::registry().with(build_filter(&config.log_level));

    let installed = match format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(false)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        LogFormat::Pretty => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_ansi(std::io::stderr().is_terminal())
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    }
    .is_ok();

    if installed {
        tracing::debug!(level = %config.log_level, %format, "Logging ready");
    }
    installed
}
