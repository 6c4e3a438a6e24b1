//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the global tracing subscriber for the host process
//! - Select pretty or JSON output
//!
//! # Design Decisions
//! - Only binaries call [`init_logging`]; library code just emits events
//! - `RUST_LOG` overrides the configured level when set

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::schema::{LogFormat, LoggingConfig};

/// Build the event filter: `RUST_LOG` when present, else the configured
/// level, else `info`.
pub fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. Returns false when one was already set
/// (for example by a test harness).
pub fn init_logging(config: &LoggingConfig) -> bool {
    let registry = tracing_subscriber::registry().with(env_filter(config));
    let result = match config.format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init(),
    };
    result.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_level_falls_back() {
        let config = LoggingConfig {
            level: "not a [valid directive".to_string(),
            format: LogFormat::Pretty,
        };
        // must not panic whatever RUST_LOG holds
        let _ = env_filter(&config);
    }

    #[test]
    fn second_init_is_refused() {
        let config = LoggingConfig::default();
        let _ = init_logging(&config);
        assert!(!init_logging(&config));
    }
}
