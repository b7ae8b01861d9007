//! Tracing subscriber setup for binaries embedding `skillflow`.
//!
//! Library code only emits `tracing` events; nothing is printed unless the
//! host installs a subscriber, either with [`init`] or its own.

use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// Level for `skillflow` events. `RUST_LOG` directives still apply.
    pub level: Level,
    pub target: LogTarget,
    /// One JSON object per event instead of human-readable lines.
    pub json: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            target: LogTarget::default(),
            json: false,
        }
    }
}

impl ObservabilityConfig {
    /// Parses `level` (`trace`, `debug`, `info`, `warn`, `error`).
    pub fn with_level_str(mut self, level: &str) -> Result<Self, String> {
        self.level = Level::from_str(level)
            .map_err(|e| format!("invalid log level '{}': {}", level, e))?;
        Ok(self)
    }

    pub fn with_target(mut self, target: LogTarget) -> Self {
        self.target = target;
        self
    }

    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub enum LogTarget {
    /// Standard error, leaving stdout to command output.
    #[default]
    Console,
    File(String),
}

/// Installs the global subscriber.
///
/// # Errors
///
/// Fails if a directive does not parse, the log file cannot be created, or a
/// global subscriber is already set.
pub fn init(config: ObservabilityConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("skillflow={}", config.level).parse()?);

    let subscriber = tracing_subscriber::registry().with(filter);

    match (config.target, config.json) {
        (LogTarget::Console, false) => {
            subscriber
                .with(fmt::layer().with_writer(std::io::stderr))
                .try_init()?;
        }
        (LogTarget::Console, true) => {
            subscriber
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .try_init()?;
        }
        (LogTarget::File(path), json) => {
            let file = std::sync::Mutex::new(std::fs::File::create(path)?);
            if json {
                subscriber
                    .with(fmt::layer().json().with_ansi(false).with_writer(file))
                    .try_init()?;
            } else {
                subscriber
                    .with(fmt::layer().with_ansi(false).with_writer(file))
                    .try_init()?;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_parsing() {
        let config = ObservabilityConfig::default().with_level_str("debug").unwrap();
        assert_eq!(config.level, Level::DEBUG);
        assert!(ObservabilityConfig::default().with_level_str("loud").is_err());
    }
}
