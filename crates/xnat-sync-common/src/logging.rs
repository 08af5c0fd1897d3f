//! Logging setup
//!
//! One place to set up the global `tracing` subscriber for every xnat-sync
//! front-end. Supports:
//!
//! - Console (stderr), daily-rotating file, or both
//! - Text or JSON formatting
//! - Verbosity tiers mapped from a repeated `-v` flag
//! - Environment overrides (`XNAT_SYNC_LOG_*`)
//!
//! Diagnostics go to stderr so that command output on stdout stays
//! machine-readable.
//!
//! # Example
//!
//! ```no_run
//! use xnat_sync_common::logging::{init_logging, LogConfig, LogLevel};
//! use tracing::info;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = LogConfig::builder().level(LogLevel::from_verbosity(2)).build();
//!     let _guard = init_logging(&config)?;
//!
//!     info!("ready");
//!     Ok(())
//! }
//! ```

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{Level, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, writer::BoxMakeWriter},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Minimum severity written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    #[default]
    Warn,
    Error,
}

impl LogLevel {
    /// Map a `-v` occurrence count onto a level.
    ///
    /// 0 → warn, 1 → info, 2 → debug, 3 or more → trace.
    pub fn from_verbosity(count: u8) -> Self {
        [LogLevel::Warn, LogLevel::Info, LogLevel::Debug]
            .get(usize::from(count))
            .copied()
            .unwrap_or(LogLevel::Trace)
    }
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

/// Case-insensitive lookup of `raw` among `(name, value)` pairs
fn parse_choice<T: Copy>(what: &str, raw: &str, choices: &[(&str, T)]) -> Result<T> {
    let wanted = raw.trim().to_ascii_lowercase();
    choices
        .iter()
        .find(|(name, _)| *name == wanted)
        .map(|(_, value)| *value)
        .ok_or_else(|| {
            let names: Vec<&str> = choices.iter().map(|(name, _)| *name).collect();
            anyhow!("unknown {} '{}' (one of: {})", what, raw, names.join(", "))
        })
}

impl std::str::FromStr for LogLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        parse_choice(
            "log level",
            s,
            &[
                ("trace", LogLevel::Trace),
                ("debug", LogLevel::Debug),
                ("info", LogLevel::Info),
                ("warn", LogLevel::Warn),
                ("warning", LogLevel::Warn),
                ("error", LogLevel::Error),
            ],
        )
    }
}

/// Where log lines are written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    /// stderr
    #[default]
    Console,
    /// Daily-rotated files under `log_dir`
    File,
    Both,
}

impl LogOutput {
    fn console(self) -> bool {
        self != LogOutput::File
    }

    fn file(self) -> bool {
        self != LogOutput::Console
    }
}

impl std::str::FromStr for LogOutput {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        parse_choice(
            "log output",
            s,
            &[
                ("console", LogOutput::Console),
                ("stderr", LogOutput::Console),
                ("file", LogOutput::File),
                ("both", LogOutput::Both),
            ],
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        parse_choice("log format", s, &[("text", LogFormat::Text), ("json", LogFormat::Json)])
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    pub level: LogLevel,

    /// Output target
    pub output: LogOutput,

    /// Text or JSON
    pub format: LogFormat,

    /// Directory for rotated log files (file output only)
    pub log_dir: PathBuf,

    /// Log file name prefix ("xnat-sync" -> "xnat-sync.2026-10-18")
    pub log_file_prefix: String,

    /// Extra filter directives, e.g. "reqwest=warn,hyper=warn"
    pub filter_directives: Option<String>,

    /// Whether to include module targets in console lines
    pub include_targets: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Warn,
            output: LogOutput::Console,
            format: LogFormat::Text,
            log_dir: PathBuf::from("./logs"),
            log_file_prefix: "xnat-sync".to_string(),
            filter_directives: None,
            include_targets: false,
        }
    }
}

impl LogConfig {
    /// Defaults overlaid with the environment
    pub fn from_env() -> Result<Self> {
        Self::default().merge_env()
    }

    /// Apply environment overrides on top of `self`.
    ///
    /// - `XNAT_SYNC_LOG_LEVEL`: trace, debug, info, warn, error
    /// - `XNAT_SYNC_LOG_OUTPUT`: console, file, both
    /// - `XNAT_SYNC_LOG_FORMAT`: text, json
    /// - `XNAT_SYNC_LOG_DIR`: directory for log files
    /// - `XNAT_SYNC_LOG_FILTER`: additional filter directives
    pub fn merge_env(self) -> Result<Self> {
        self.merge_vars(|name| std::env::var(name).ok())
    }

    fn merge_vars(mut self, var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(level) = var("XNAT_SYNC_LOG_LEVEL") {
            self.level = level.parse()?;
        }
        if let Some(output) = var("XNAT_SYNC_LOG_OUTPUT") {
            self.output = output.parse()?;
        }
        if let Some(format) = var("XNAT_SYNC_LOG_FORMAT") {
            self.format = format.parse()?;
        }
        self.log_dir = var("XNAT_SYNC_LOG_DIR").map(PathBuf::from).unwrap_or(self.log_dir);
        self.filter_directives = var("XNAT_SYNC_LOG_FILTER").or(self.filter_directives);
        Ok(self)
    }

    pub fn builder() -> LogConfigBuilder {
        LogConfigBuilder::default()
    }
}

/// Builder for LogConfig
#[derive(Default)]
pub struct LogConfigBuilder {
    config: LogConfig,
}

impl LogConfigBuilder {
    pub fn level(mut self, level: LogLevel) -> Self {
        self.config.level = level;
        self
    }

    pub fn output(mut self, output: LogOutput) -> Self {
        self.config.output = output;
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.config.format = format;
        self
    }

    pub fn log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.log_dir = dir.into();
        self
    }

    pub fn build(self) -> LogConfig {
        self.config
    }
}

/// Initialize the global subscriber.
///
/// Call once at startup. When file output is enabled the returned guard
/// flushes the background writer on drop and must be held until exit.
pub fn init_logging(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let base = Level::from(config.level);
    let filter = config
        .filter_directives
        .iter()
        .flat_map(|directives| directives.split(','))
        .map(str::trim)
        .filter(|directive| !directive.is_empty())
        .try_fold(EnvFilter::from_default_env().add_directive(base.into()), |filter, directive| {
            let directive = directive
                .parse()
                .with_context(|| format!("invalid log filter directive '{}'", directive))?;
            Ok::<_, anyhow::Error>(filter.add_directive(directive))
        })?;

    let console = config
        .output
        .console()
        .then(|| fmt_layer(config, BoxMakeWriter::new(std::io::stderr), true));

    let (file, guard) = if config.output.file() {
        let (writer, guard) = rolling_writer(config)?;
        (Some(fmt_layer(config, writer, false)), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()?;

    Ok(guard)
}

/// Non-blocking writer over a daily-rotated file in `log_dir`
fn rolling_writer(config: &LogConfig) -> Result<(BoxMakeWriter, WorkerGuard)> {
    std::fs::create_dir_all(&config.log_dir)
        .with_context(|| format!("cannot create log directory {}", config.log_dir.display()))?;
    let appender = tracing_appender::rolling::daily(&config.log_dir, &config.log_file_prefix);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    Ok((BoxMakeWriter::new(writer), guard))
}

fn fmt_layer<S>(
    config: &LogConfig,
    writer: BoxMakeWriter,
    ansi: bool,
) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let layer = fmt::layer()
        .with_writer(writer)
        .with_target(config.include_targets)
        .with_ansi(ansi);

    match config.format {
        LogFormat::Text => layer.boxed(),
        LogFormat::Json => layer.json().boxed(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_tiers() {
        assert_eq!(LogLevel::from_verbosity(0), LogLevel::Warn);
        assert_eq!(LogLevel::from_verbosity(1), LogLevel::Info);
        assert_eq!(LogLevel::from_verbosity(2), LogLevel::Debug);
        assert_eq!(LogLevel::from_verbosity(3), LogLevel::Trace);
        assert_eq!(LogLevel::from_verbosity(9), LogLevel::Trace);
    }

    #[test]
    fn test_log_level_from_str() {
        assert_eq!("DEBUG".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        let err = "loud".parse::<LogLevel>().unwrap_err();
        assert!(err.to_string().contains("one of: trace"));
        assert_eq!(Level::from(LogLevel::Error), Level::ERROR);
    }

    #[test]
    fn test_log_output_from_str() {
        assert_eq!("stderr".parse::<LogOutput>().unwrap(), LogOutput::Console);
        assert_eq!("both".parse::<LogOutput>().unwrap(), LogOutput::Both);
        assert!("syslog".parse::<LogOutput>().is_err());
        assert!(LogOutput::Both.console() && LogOutput::Both.file());
        assert!(!LogOutput::Console.file());
    }

    #[test]
    fn test_config_builder() {
        let config = LogConfig::builder()
            .level(LogLevel::Debug)
            .output(LogOutput::File)
            .format(LogFormat::Json)
            .log_dir("/var/log/xnat-sync")
            .build();

        assert_eq!(config.level, LogLevel::Debug);
        assert_eq!(config.output, LogOutput::File);
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.log_dir, PathBuf::from("/var/log/xnat-sync"));
        assert_eq!(config.log_file_prefix, "xnat-sync");
    }

    #[test]
    fn test_environment_overrides_builder() {
        let vars = |name: &str| match name {
            "XNAT_SYNC_LOG_LEVEL" => Some("trace".to_string()),
            "XNAT_SYNC_LOG_FILTER" => Some("hyper=warn".to_string()),
            _ => None,
        };

        let config = LogConfig::builder()
            .level(LogLevel::Info)
            .format(LogFormat::Json)
            .build()
            .merge_vars(vars)
            .unwrap();

        assert_eq!(config.level, LogLevel::Trace);
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.filter_directives.as_deref(), Some("hyper=warn"));
    }

    #[test]
    fn test_bad_environment_value_is_an_error() {
        let vars = |name: &str| (name == "XNAT_SYNC_LOG_OUTPUT").then(|| "syslog".to_string());
        assert!(LogConfig::default().merge_vars(vars).is_err());
    }
}
