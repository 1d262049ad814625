//! Structured logging configuration.

use std::path::PathBuf;

use crate::config::LoggingSettings;

/// Filter used when nothing else is configured.
const DEFAULT_DIRECTIVE: &str = "warn";

/// Filter used with `--verbose`.
const VERBOSE_DIRECTIVE: &str = "cardsmith=debug,info";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable, multi-line.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    /// Parses a format name; anything but `json` is pretty.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

/// Resolved logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Output format.
    pub format: LogFormat,
    /// `EnvFilter` directive.
    pub directive: String,
    /// Log file; stderr when `None`.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Pretty,
            directive: DEFAULT_DIRECTIVE.to_string(),
            file: None,
        }
    }
}

impl LoggingConfig {
    /// Builds logging configuration from config settings with env overrides.
    ///
    /// The filter comes from `CARDSMITH_LOG`, then `RUST_LOG`, then
    /// `--verbose`, then the config file.
    #[must_use]
    pub fn from_settings(settings: Option<&LoggingSettings>, verbose: bool) -> Self {
        Self::resolve(settings, verbose, |key| std::env::var(key).ok())
    }

    pub(crate) fn resolve(
        settings: Option<&LoggingSettings>,
        verbose: bool,
        var: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let non_empty = |key: &str| var(key).filter(|v| !v.trim().is_empty());

        let directive = non_empty("CARDSMITH_LOG")
            .or_else(|| non_empty("RUST_LOG"))
            .or_else(|| verbose.then(|| VERBOSE_DIRECTIVE.to_string()))
            .or_else(|| settings.and_then(|s| s.level.clone()))
            .unwrap_or_else(|| DEFAULT_DIRECTIVE.to_string());

        let format = non_empty("CARDSMITH_LOG_FORMAT")
            .or_else(|| settings.and_then(|s| s.format.clone()))
            .map(|f| LogFormat::parse(&f))
            .unwrap_or_default();

        let file = non_empty("CARDSMITH_LOG_FILE")
            .or_else(|| settings.and_then(|s| s.file.clone()))
            .map(PathBuf::from);

        Self {
            format,
            directive,
            file,
        }
    }
}
