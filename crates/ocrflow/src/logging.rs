//! Tracing subscriber setup for the binary.
//!
//! Library code logs through `tracing`, the storage layer through `log`;
//! `LogTracer` forwards the latter into the same subscriber.

use tracing_log::LogTracer;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter};

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("A global tracing subscriber is already installed: {0}")]
    Subscriber(#[from] tracing::subscriber::SetGlobalDefaultError),

    #[error("Failed to bridge the log facade: {0}")]
    LogBridge(#[from] log::SetLoggerError),
}

/// Filter used when `RUST_LOG` is not set.
pub fn default_filter(verbose: bool) -> &'static str {
    if verbose {
        "ocrflow=debug"
    } else {
        "ocrflow=info"
    }
}

/// Installs the global subscriber. Output goes to stderr so command
/// results on stdout stay machine-readable.
pub fn init(verbose: bool, json: bool) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        let layer = fmt::layer().json().with_writer(std::io::stderr);
        tracing::subscriber::set_global_default(registry.with(layer))?;
    } else {
        let layer = fmt::layer().with_target(false).with_writer(std::io::stderr);
        tracing::subscriber::set_global_default(registry.with(layer))?;
    }

    LogTracer::init()?;
    Ok(())
}
