//! Logging setup using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the filter:
//! 1. `LogConfig::level` (if provided)
//! 2. `EXEC_LAYER_LOG` environment variable (e.g. "info", "exec_layer_unix=trace")
//! 3. default to `info`

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing_subscriber::{EnvFilter, fmt};

/// Environment variable consulted when no level is configured
pub const LOG_ENV: &str = "EXEC_LAYER_LOG";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogConfig {
    /// Filter directive, e.g. "debug" or "info,exec_layer_unix=trace"
    #[serde(default)]
    pub level: Option<String>,

    #[serde(default)]
    pub format: LogFormat,
}

/// Initialise the global logging subscriber, writing to stderr.
///
/// Fails if the configured level does not parse or a subscriber is already set.
pub fn init_logging(config: &LogConfig) -> Result<()> {
    let filter = build_filter(config)?;
    let builder = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true);

    match config.format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    }
    .map_err(|e| anyhow!("failed to install log subscriber: {e}"))
}

fn build_filter(config: &LogConfig) -> Result<EnvFilter> {
    if let Some(level) = &config.level {
        return EnvFilter::try_new(level).with_context(|| format!("invalid log level '{level}'"));
    }

    // A bad environment value is not worth failing startup for
    let filter = std::env::var(LOG_ENV)
        .ok()
        .and_then(|value| EnvFilter::try_new(value).ok())
        .unwrap_or_else(|| EnvFilter::new("info"));

    Ok(filter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_filter_from_config() {
        let config = LogConfig {
            level: Some("info,exec_layer_unix=trace".to_string()),
            format: LogFormat::Text,
        };
        let filter = build_filter(&config).unwrap();
        assert!(filter.to_string().contains("exec_layer_unix=trace"));
    }

    #[test]
    fn test_build_filter_rejects_bad_level() {
        let config = LogConfig {
            level: Some("exec_layer=loud".to_string()),
            format: LogFormat::Text,
        };
        let error = build_filter(&config).unwrap_err();
        assert!(error.to_string().contains("exec_layer=loud"));
    }

    #[test]
    fn test_log_config_serialization() {
        let config: LogConfig = serde_json::from_str(r#"{"level":"debug","format":"json"}"#).unwrap();
        assert_eq!(config.level.as_deref(), Some("debug"));
        assert_eq!(config.format, LogFormat::Json);

        let config: LogConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, LogConfig::default());
        assert_eq!(config.format, LogFormat::Text);
    }
}
