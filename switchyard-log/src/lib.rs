//! Switchyard Logging
//!
//! Installs a `tracing` subscriber configured from `SWITCHYARD_*` environment
//! variables. The dispatch crates only emit `tracing` events; nothing is
//! printed until a subscriber is installed.
//!
//! # Usage
//!
//! ```rust
//! // Reads SWITCHYARD_LOG_LEVEL, SWITCHYARD_LOG_FORMAT and SWITCHYARD_DEBUG.
//! let _ = switchyard_log::try_init();
//!
//! tracing::info!(endpoints = 2, "dispatcher ready");
//! ```
//!
//! # Environment Variables
//!
//! - `SWITCHYARD_DEBUG=1` - Enable debug logging
//! - `SWITCHYARD_LOG_LEVEL=trace|debug|info|warn|error|off` - Set log level
//! - `SWITCHYARD_LOG_FORMAT=pretty|json|compact` - Set output format
//! - `SWITCHYARD_LOG_COLOR=1|0` - Enable/disable colors
//! - `SWITCHYARD_LOG_TARGET=1|0` - Include the event target
//!
//! `RUST_LOG`, when set, overrides the level with a full filter directive.

use std::env;
use thiserror::Error;
use tracing::Subscriber;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer, fmt, prelude::*};

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "SWITCHYARD";

// ============================================================================
// Log Levels
// ============================================================================

/// Minimum level of emitted events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    /// Trace level (most verbose)
    Trace,
    /// Debug level
    Debug,
    /// Info level
    Info,
    /// Warning level
    Warn,
    /// Error level (least verbose)
    Error,
    /// Off (no logging)
    Off,
}

impl Level {
    /// Parse a level name.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Some(Level::Trace),
            "debug" => Some(Level::Debug),
            "info" => Some(Level::Info),
            "warn" | "warning" => Some(Level::Warn),
            "error" => Some(Level::Error),
            "off" | "none" => Some(Level::Off),
            _ => None,
        }
    }

    /// Filter directive for this level.
    pub fn as_directive(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Off => "off",
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_directive())
    }
}

// ============================================================================
// Log Format
// ============================================================================

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Multi-line human-readable format
    Pretty,
    /// Compact single-line format
    Compact,
    /// JSON format for structured logging
    Json,
}

impl Format {
    /// Parse a format name.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pretty" => Some(Format::Pretty),
            "compact" => Some(Format::Compact),
            "json" => Some(Format::Json),
            _ => None,
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Whether debug mode is enabled
    pub debug: bool,
    /// Minimum log level
    pub level: Level,
    /// Output format
    pub format: Format,
    /// Whether colors are enabled
    pub color: bool,
    /// Whether to include the event target
    pub target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            debug: false,
            level: Level::Info,
            format: Format::Json,
            color: false,
            target: true,
        }
    }
}

impl LogConfig {
    /// Create config from `SWITCHYARD_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{}_{}", ENV_PREFIX, name));
        let defaults = Self::default();

        let debug = var("DEBUG").map(|v| is_truthy(&v)).unwrap_or(false);

        let level = var("LOG_LEVEL")
            .and_then(|s| Level::parse(&s))
            .unwrap_or(if debug { Level::Debug } else { defaults.level });

        let format = var("LOG_FORMAT")
            .and_then(|s| Format::parse(&s))
            .unwrap_or(defaults.format);

        // JSON output never carries color codes.
        let color = format != Format::Json
            && var("LOG_COLOR")
                .map(|v| is_truthy(&v))
                .unwrap_or_else(|| lookup("NO_COLOR").is_none() && lookup("TERM").is_some());

        let target = var("LOG_TARGET")
            .map(|v| is_truthy(&v))
            .unwrap_or(defaults.target);

        Self {
            debug,
            level,
            format,
            color,
            target,
        }
    }

    /// Set the minimum level.
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Set the output format.
    pub fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    /// Enable debug mode, lowering the level to at least debug.
    pub fn with_debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        if enabled && self.level > Level::Debug {
            self.level = Level::Debug;
        }
        self
    }

    /// The filter applied when `RUST_LOG` is unset.
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.level.as_directive()))
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

// ============================================================================
// Subscriber
// ============================================================================

/// Errors raised while installing the subscriber.
#[derive(Debug, Error)]
pub enum LogError {
    /// A global subscriber was already installed.
    #[error("Failed to install tracing subscriber: {0}")]
    AlreadyInitialized(#[from] tracing_subscriber::util::TryInitError),
}

/// Build the formatting layer for `config`.
pub fn fmt_layer<S>(config: &LogConfig) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a> + 'static,
{
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(config.color)
        .with_target(config.target);

    match config.format {
        Format::Pretty => layer.pretty().boxed(),
        Format::Compact => layer.compact().boxed(),
        Format::Json => layer.json().boxed(),
    }
}

/// Create a subscriber for `config` without installing it.
pub fn subscriber(config: &LogConfig) -> impl Subscriber + Send + Sync + use<> {
    tracing_subscriber::registry()
        .with(config.env_filter())
        .with(fmt_layer(config))
}

/// Install the global subscriber configured from the environment.
pub fn try_init() -> Result<(), LogError> {
    try_init_with(&LogConfig::from_env())
}

/// Install the global subscriber for `config`.
pub fn try_init_with(config: &LogConfig) -> Result<(), LogError> {
    subscriber(config).try_init()?;
    tracing::debug!(level = %config.level, format = ?config.format, "Logging initialized");
    Ok(())
}

/// Install the global subscriber, ignoring an already installed one.
pub fn init() {
    let _ = try_init();
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> LogConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        LogConfig::from_lookup(move |key| vars.get(key).cloned())
    }

    #[test]
    fn test_level_ordering() {
        assert!(Level::Trace < Level::Debug);
        assert!(Level::Debug < Level::Info);
        assert!(Level::Info < Level::Warn);
        assert!(Level::Warn < Level::Error);
        assert!(Level::Error < Level::Off);
    }

    #[test]
    fn test_level_parse() {
        assert_eq!(Level::parse("debug"), Some(Level::Debug));
        assert_eq!(Level::parse("DEBUG"), Some(Level::Debug));
        assert_eq!(Level::parse("warning"), Some(Level::Warn));
        assert_eq!(Level::parse("invalid"), None);
    }

    #[test]
    fn test_format_parse() {
        assert_eq!(Format::parse("pretty"), Some(Format::Pretty));
        assert_eq!(Format::parse("compact"), Some(Format::Compact));
        assert_eq!(Format::parse("json"), Some(Format::Json));
        assert_eq!(Format::parse("invalid"), None);
    }

    #[test]
    fn test_defaults_without_variables() {
        assert_eq!(config(&[]), LogConfig::default());
    }

    #[test]
    fn test_debug_lowers_level() {
        let config = config(&[("SWITCHYARD_DEBUG", "1")]);
        assert!(config.debug);
        assert_eq!(config.level, Level::Debug);
    }

    #[test]
    fn test_explicit_level_wins_over_debug() {
        let config = config(&[("SWITCHYARD_DEBUG", "true"), ("SWITCHYARD_LOG_LEVEL", "trace")]);
        assert_eq!(config.level, Level::Trace);
    }

    #[test]
    fn test_color_only_for_text_formats() {
        let json = config(&[("SWITCHYARD_LOG_COLOR", "1")]);
        assert!(!json.color);

        let pretty = config(&[("SWITCHYARD_LOG_FORMAT", "pretty"), ("SWITCHYARD_LOG_COLOR", "1")]);
        assert_eq!(pretty.format, Format::Pretty);
        assert!(pretty.color);
    }

    #[test]
    fn test_with_debug() {
        let config = LogConfig::default().with_level(Level::Error).with_debug(true);
        assert_eq!(config.level, Level::Debug);

        let config = LogConfig::default().with_level(Level::Trace).with_debug(true);
        assert_eq!(config.level, Level::Trace);
    }

    #[test]
    fn test_subscriber_scoped() {
        let config = LogConfig::default().with_format(Format::Compact);
        tracing::subscriber::with_default(subscriber(&config), || {
            tracing::info!(attempt = 1, "scoped event");
        });
    }

    #[test]
    fn test_second_init_fails() {
        let config = LogConfig::default().with_level(Level::Off);
        let first = try_init_with(&config);
        let second = try_init_with(&config);
        assert!(first.is_ok());
        assert!(matches!(second, Err(LogError::AlreadyInitialized(_))));
    }
}
