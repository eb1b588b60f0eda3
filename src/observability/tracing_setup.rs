// observability/tracing_setup.rs - Tracing Configuration

use std::str::FromStr;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
    EnvFilter, Layer,
};

/// Tracing output format
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TracingFormat {
    /// Human-readable format (default)
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
    /// JSON format for log aggregation
    Json,
}

impl FromStr for TracingFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(TracingFormat::Pretty),
            "compact" => Ok(TracingFormat::Compact),
            "json" => Ok(TracingFormat::Json),
            other => Err(format!("unknown log format: {}", other)),
        }
    }
}

/// Configuration for tracing
#[derive(Clone, Debug)]
pub struct TracingConfig {
    /// Filter directives, overridden by `RUST_LOG` when set
    pub filter: String,

    pub format: TracingFormat,

    /// Emit span open/close events
    pub with_span_events: bool,

    /// Include file and line numbers
    pub with_file: bool,

    pub with_target: bool,

    pub with_thread_names: bool,

    /// ANSI colors (ignored for JSON)
    pub with_ansi: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            filter: "info,contract_net=debug".into(),
            format: TracingFormat::Pretty,
            with_span_events: false,
            with_file: false,
            with_target: true,
            with_thread_names: false,
            with_ansi: true,
        }
    }
}

impl TracingConfig {
    /// Config for a single `--log-level` value applied to everything
    pub fn with_level(level: &str, format: TracingFormat) -> Self {
        let verbose = matches!(level, "debug" | "trace");
        Self {
            filter: format!("{},contract_net={}", level, level),
            format,
            with_span_events: level == "trace",
            with_file: verbose,
            with_ansi: format != TracingFormat::Json,
            ..Self::default()
        }
    }
}

/// Initialize the global tracing subscriber.
///
/// Fails if a global subscriber is already installed.
pub fn try_init_tracing(config: &TracingConfig) -> Result<(), TryInitError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));

    let span_events = if config.with_span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let base = fmt::layer()
        .with_span_events(span_events)
        .with_file(config.with_file)
        .with_line_number(config.with_file)
        .with_target(config.with_target)
        .with_thread_names(config.with_thread_names);

    let fmt_layer = match config.format {
        TracingFormat::Pretty => base.with_ansi(config.with_ansi).boxed(),
        TracingFormat::Compact => base.compact().with_ansi(config.with_ansi).boxed(),
        TracingFormat::Json => base.json().boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    tracing::info!(
        filter = %config.filter,
        format = ?config.format,
        "Tracing initialized"
    );
    Ok(())
}

/// Initialize tracing, ignoring an already-installed subscriber.
///
/// Call once at application startup.
pub fn init_tracing(config: TracingConfig) {
    if let Err(e) = try_init_tracing(&config) {
        eprintln!("tracing already initialized: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracing_config_default() {
        let config = TracingConfig::default();
        assert!(config.filter.contains("contract_net"));
        assert!(config.with_ansi);
    }

    #[test]
    fn test_json_format_disables_ansi() {
        let config = TracingConfig::with_level("info", TracingFormat::Json);
        assert_eq!(config.format, TracingFormat::Json);
        assert!(!config.with_ansi);
        assert!(!config.with_file);
    }

    #[test]
    fn test_with_level() {
        let config = TracingConfig::with_level("debug", TracingFormat::Compact);
        assert_eq!(config.filter, "debug,contract_net=debug");
        assert!(config.with_file);
        assert!(!config.with_span_events);
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("JSON".parse::<TracingFormat>(), Ok(TracingFormat::Json));
        assert_eq!("compact".parse::<TracingFormat>(), Ok(TracingFormat::Compact));
        assert!("xml".parse::<TracingFormat>().is_err());
    }
}
