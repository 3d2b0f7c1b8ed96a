//! Subscriber setup for hosts and plugin binaries.
//!
//! Plugin binaries write compact lines without timestamps to stderr: stdout
//! carries the TCP handshake, and the host re-emits every stderr line as its
//! own event, timestamp included.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use crate::error::{TelemetryError, TelemetryResult};

/// Environment variable read by hosts for their log level.
pub const HOST_LOG_ENV: &str = "OCM_LOG";

/// Environment variable read by plugin binaries for their log level.
pub const PLUGIN_LOG_ENV: &str = "OCM_PLUGIN_LOG";

/// Applied before user directives, which can override them.
const QUIET_DEPENDENCIES: &[&str] = &["hyper=warn", "hyper_util=warn"];

type BoxedLayer = Box<dyn Layer<tracing_subscriber::Registry> + Send + Sync>;

/// Line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// `tracing-subscriber`'s default single-line format.
    #[default]
    Full,
    /// Shorter single lines.
    Compact,
    /// Multi-line, for terminals.
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Where log lines go.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogTarget {
    /// Standard output. Never use this in a plugin binary.
    Stdout,
    /// Standard error.
    #[default]
    Stderr,
    /// Daily rolling files `<directory>/<prefix>.<date>`.
    File {
        /// Log directory, created on setup.
        directory: PathBuf,
        /// File name prefix.
        prefix: String,
    },
}

/// Logging configuration; embeddable in a host's own config file.
///
/// ```toml
/// level = "info"
/// format = "json"
/// directives = ["ocm_plugin=debug"]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Base filter, e.g. `"info"` or `"warn,ocm_plugin=debug"`.
    pub level: String,
    /// Line format.
    pub format: LogFormat,
    /// Output.
    pub target: LogTarget,
    /// Extra `target=level` directives.
    pub directives: Vec<String>,
    /// Colored output.
    pub ansi: bool,
    /// Timestamp every line.
    pub timestamps: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
            target: LogTarget::default(),
            directives: Vec::new(),
            ansi: true,
            timestamps: true,
        }
    }
}

impl LogConfig {
    /// Defaults with the given level.
    #[must_use]
    pub fn new(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            ..Self::default()
        }
    }

    /// Settings for plugin binaries: compact, uncolored, untimed, stderr.
    #[must_use]
    pub fn for_plugin(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            format: LogFormat::Compact,
            target: LogTarget::Stderr,
            directives: Vec::new(),
            ansi: false,
            timestamps: false,
        }
    }

    /// Set the line format.
    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the output.
    #[must_use]
    pub fn with_target(mut self, target: LogTarget) -> Self {
        self.target = target;
        self
    }

    /// Write to daily rolling files instead of a terminal.
    #[must_use]
    pub fn with_log_files(
        mut self,
        directory: impl Into<PathBuf>,
        prefix: impl Into<String>,
    ) -> Self {
        self.target = LogTarget::File {
            directory: directory.into(),
            prefix: prefix.into(),
        };
        self.ansi = false;
        self
    }

    /// Add a `target=level` directive.
    #[must_use]
    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.directives.push(directive.into());
        self
    }

    fn build_filter(&self) -> TelemetryResult<EnvFilter> {
        let mut filter = EnvFilter::try_new(&self.level).map_err(|e| {
            TelemetryError::ConfigError(format!("invalid level {:?}: {e}", self.level))
        })?;
        let directives = QUIET_DEPENDENCIES
            .iter()
            .copied()
            .chain(self.directives.iter().map(String::as_str));
        for directive in directives {
            let parsed = directive.parse::<Directive>().map_err(|e| {
                TelemetryError::ConfigError(format!("invalid directive {directive:?}: {e}"))
            })?;
            filter = filter.add_directive(parsed);
        }
        Ok(filter)
    }

    fn build_layer<W>(&self, writer: W) -> BoxedLayer
    where
        W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
    {
        let layer = fmt::layer().with_writer(writer).with_ansi(self.ansi);
        match (self.format, self.timestamps) {
            (LogFormat::Full, true) => layer.boxed(),
            (LogFormat::Full, false) => layer.without_time().boxed(),
            (LogFormat::Compact, true) => layer.compact().boxed(),
            (LogFormat::Compact, false) => layer.compact().without_time().boxed(),
            (LogFormat::Pretty, true) => layer.pretty().boxed(),
            (LogFormat::Pretty, false) => layer.pretty().without_time().boxed(),
            (LogFormat::Json, true) => layer.json().boxed(),
            (LogFormat::Json, false) => layer.json().without_time().boxed(),
        }
    }
}

/// The level from `var`, or `fallback` when it is unset or empty.
#[must_use]
pub fn level_from_env(var: &str, fallback: &str) -> String {
    std::env::var(var)
        .ok()
        .filter(|level| !level.trim().is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

/// Install the global subscriber described by `config`.
///
/// # Errors
///
/// Returns an error for an invalid level or directive, an uncreatable log
/// directory, or when a subscriber is already installed.
pub fn setup_logging(config: &LogConfig) -> TelemetryResult<()> {
    let filter = config.build_filter()?;
    let layer = match &config.target {
        LogTarget::Stdout => config.build_layer(std::io::stdout),
        LogTarget::Stderr => config.build_layer(std::io::stderr),
        LogTarget::File { directory, prefix } => {
            std::fs::create_dir_all(directory)?;
            config.build_layer(tracing_appender::rolling::daily(directory, prefix))
        },
    };

    tracing_subscriber::registry()
        .with(layer.with_filter(filter))
        .try_init()
        .map_err(|e| TelemetryError::InitError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plugin_preset_keeps_stdout_free() {
        let config = LogConfig::for_plugin("debug");
        assert_eq!(config.target, LogTarget::Stderr);
        assert_eq!(config.format, LogFormat::Compact);
        assert!(!config.ansi);
        assert!(!config.timestamps);
    }

    #[test]
    fn test_sparse_config_uses_defaults() {
        let config: LogConfig = toml::from_str(
            r#"
            format = "json"
            directives = ["ocm_plugin=trace"]
            "#,
        )
        .unwrap();
        assert_eq!(config.level, "info");
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.target, LogTarget::Stderr);
        assert_eq!(config.directives, ["ocm_plugin=trace"]);
        assert!(config.timestamps);
    }

    #[test]
    fn test_file_target_serialization() {
        let config = LogConfig::new("warn").with_log_files("/var/log/ocm", "host");
        assert!(!config.ansi);
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["target"]["file"]["prefix"], "host");

        let parsed: LogConfig = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_build_filter() {
        assert!(LogConfig::new("warn,ocm_runtime=debug").build_filter().is_ok());
        assert!(
            LogConfig::new("info")
                .with_directive("hyper=debug")
                .build_filter()
                .is_ok()
        );

        let invalid = LogConfig::new("debug").with_directive("[invalid=syntax");
        assert!(matches!(invalid.build_filter(), Err(TelemetryError::ConfigError(_))));
    }

    #[test]
    fn test_level_from_unset_env() {
        assert_eq!(level_from_env("OCM_TELEMETRY_TEST_UNSET_LEVEL", "warn"), "warn");
    }

    #[test]
    fn test_file_target_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("logs");

        // The directory is created even when another test already installed
        // the global subscriber.
        let _ = setup_logging(&LogConfig::new("info").with_log_files(&logs, "host"));
        assert!(logs.is_dir());
    }
}
