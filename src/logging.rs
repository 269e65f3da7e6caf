/// Structured logging setup using tracing
///
/// Writes to stderr ONLY (never stdout): stdout carries the JSON-RPC stream in
/// server mode and JSON results in one-shot mode.
/// Auto-detects format: human-readable with ANSI colors when stderr is a terminal,
/// structured JSON when piped/redirected.

use std::fs::OpenOptions;
use std::io::IsTerminal;
use std::sync::Mutex;
use tracing_subscriber::{
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};
use crate::config::Config;

/// Initialize tracing subscriber with stderr output plus an optional file layer
///
/// Format auto-detection:
/// - Terminal: human-readable with ANSI colors
/// - Pipe/redirect: structured JSON
///
/// Log level from config.log_level (default: info)
/// RUST_LOG env var can override at runtime
pub fn init_logging(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let mut file_error = None;
    let log_file = config.log_file.as_ref().and_then(|path| {
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => Some(Mutex::new(file)),
            Err(e) => {
                file_error = Some(format!("{}: {}", path, e));
                None
            }
        }
    });

    if std::io::stderr().is_terminal() {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(true)
            )
            .with(log_file.map(|file| {
                tracing_subscriber::fmt::layer()
                    .with_writer(file)
                    .with_ansi(false)
            }))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .json()
            )
            .with(log_file.map(|file| {
                tracing_subscriber::fmt::layer()
                    .with_writer(file)
                    .with_ansi(false)
            }))
            .init();
    }

    if let Some(err) = file_error {
        tracing::warn!(error = %err, "Could not open log_file, logging to stderr only");
    }
}
