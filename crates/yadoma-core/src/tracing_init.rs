//! Logging setup for the agent.
//!
//! Installs a `tracing_subscriber` registry with an env-filter and either
//! human-readable or JSON line output.

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    /// One JSON object per line, for log aggregation.
    Json,
}

impl LogFormat {
    pub const fn from_json_flag(json: bool) -> Self {
        if json { Self::Json } else { Self::Text }
    }
}

/// Build the filter: `RUST_LOG` wins, `default_filter` otherwise
/// (e.g. `"yadoma_agent=info,yadoma_core=info"`).
fn env_filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter))
}

/// Install the global subscriber, failing if one is already set.
pub fn try_init_tracing(default_filter: &str, format: LogFormat) -> Result<(), TryInitError> {
    let filter = env_filter(default_filter);
    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init(),
    }
}

/// Install the global subscriber.
///
/// If one is already installed it stays in place and receives a warning.
/// Returns `true` when this call installed the subscriber.
pub fn init_tracing(default_filter: &str, log_json: bool) -> bool {
    match try_init_tracing(default_filter, LogFormat::from_json_flag(log_json)) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Tracing subscriber already installed, keeping it");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_flag_selects_format() {
        assert_eq!(LogFormat::from_json_flag(true), LogFormat::Json);
        assert_eq!(LogFormat::from_json_flag(false), LogFormat::Text);
    }

    #[test]
    fn second_init_is_rejected() {
        init_tracing("yadoma_core=debug", false);
        assert!(try_init_tracing("yadoma_core=debug", LogFormat::Text).is_err());
        assert!(!init_tracing("yadoma_core=debug", true));
    }
}
