// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Logging setup shared by ChunkFS binaries
//!
//! Binaries flatten [`CliLoggingArgs`] into their clap structs and call
//! [`CliLoggingArgs::init`] once at startup. Library crates only emit
//! `tracing` events and never install a subscriber themselves.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use tracing::Level;

/// Output format for log messages
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, clap::ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable plaintext format
    #[default]
    Plaintext,
    /// Structured JSON format
    Json,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Plaintext => write!(f, "plaintext"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "plaintext" => Ok(LogFormat::Plaintext),
            "json" => Ok(LogFormat::Json),
            _ => Err(format!(
                "Invalid log format: {}. Use 'plaintext' or 'json'",
                s
            )),
        }
    }
}

/// Log level accepted on the command line
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CliLogLevel {
    /// Only error conditions
    Error,
    /// Errors and warnings
    #[default]
    Warn,
    /// Errors, warnings, and informational messages
    Info,
    /// Every filesystem operation
    Debug,
    /// Chunk-level detail
    Trace,
}

impl From<CliLogLevel> for Level {
    fn from(level: CliLogLevel) -> Self {
        match level {
            CliLogLevel::Error => Level::ERROR,
            CliLogLevel::Warn => Level::WARN,
            CliLogLevel::Info => Level::INFO,
            CliLogLevel::Debug => Level::DEBUG,
            CliLogLevel::Trace => Level::TRACE,
        }
    }
}

impl std::fmt::Display for CliLogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliLogLevel::Error => write!(f, "error"),
            CliLogLevel::Warn => write!(f, "warn"),
            CliLogLevel::Info => write!(f, "info"),
            CliLogLevel::Debug => write!(f, "debug"),
            CliLogLevel::Trace => write!(f, "trace"),
        }
    }
}

/// Logging-related command-line arguments
///
/// Use with `#[command(flatten)]`. Output goes to stderr unless `--log-file`
/// or `--log-dir` is given, so it never interleaves with command output on
/// stdout.
#[derive(Clone, Debug, Default, clap::Args, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CliLoggingArgs {
    /// Log verbosity level
    #[arg(long, value_enum, global = true, help = "Log verbosity level (default: warn)")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<CliLogLevel>,

    /// Log output format
    #[arg(long, value_enum, global = true, help = "Log output format (default: plaintext)")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_format: Option<LogFormat>,

    /// Directory for log files
    #[arg(long, global = true, help = "Directory for log files")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<String>,

    /// Log filename
    #[arg(long, global = true, help = "Log filename")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<String>,
}

impl CliLoggingArgs {
    /// Install the global subscriber described by these arguments
    pub fn init(self, component: &str) -> anyhow::Result<()> {
        let level = self.log_level.unwrap_or_default().into();
        let format = self.log_format.unwrap_or_default();

        if self.logs_to_file() {
            let log_path = self.resolve_log_path(component);
            init_to_file(component, level, format, &log_path)
        } else {
            init(component, level, format)
        }
    }

    pub fn logs_to_file(&self) -> bool {
        self.log_file.is_some() || self.log_dir.is_some()
    }

    /// Resolve the log file path
    ///
    /// An absolute `log_file` wins. A relative `log_file` is placed under
    /// `log_dir` when one is given. With neither, the platform location is
    /// used.
    pub fn resolve_log_path(&self, component: &str) -> PathBuf {
        match (&self.log_file, &self.log_dir) {
            (Some(file), _) if Path::new(file).is_absolute() => PathBuf::from(file),
            (Some(file), Some(dir)) => Path::new(dir).join(file),
            (Some(file), None) => PathBuf::from(file),
            (None, Some(dir)) => Path::new(dir).join(format!("{}.log", component)),
            (None, None) => get_standard_log_path_for_component(component),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.log_level.is_none()
            && self.log_format.is_none()
            && self.log_dir.is_none()
            && self.log_file.is_none()
    }
}

/// Standard log file path with the component name as the filename
pub fn get_standard_log_path_for_component(component: &str) -> PathBuf {
    let base_path = get_standard_log_path();
    let parent = base_path.parent().unwrap_or(Path::new("/tmp"));
    parent.join(format!("{}.log", component))
}

/// Platform-specific log file path
///
/// - macOS: `~/Library/Logs/chunkfs.log`
/// - Linux: `~/.local/share/chunkfs/chunkfs.log`
/// - Other: `~/chunkfs.log`
pub fn get_standard_log_path() -> PathBuf {
    #[cfg(target_os = "macos")]
    {
        let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/tmp"));
        path.push("Library");
        path.push("Logs");
        path.push("chunkfs.log");
        path
    }

    #[cfg(target_os = "linux")]
    {
        let mut path = dirs::data_dir()
            .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from("/tmp")));
        path.push("chunkfs");
        path.push("chunkfs.log");
        path
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/tmp"));
        path.push("chunkfs.log");
        path
    }
}

/// Initialize logging to stderr
///
/// `RUST_LOG` overrides `default_level` when set.
pub fn init(component: &str, default_level: Level, format: LogFormat) -> anyhow::Result<()> {
    init_with_writer(component, default_level, format, io::stderr)
}

/// Initialize logging to a file, creating parent directories as needed
pub fn init_to_file(
    component: &str,
    default_level: Level,
    format: LogFormat,
    log_path: &Path,
) -> anyhow::Result<()> {
    use std::fs;

    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let log_file = fs::OpenOptions::new().create(true).append(true).open(log_path)?;

    init_with_writer(component, default_level, format, log_file)
}

/// Initialize logging with a custom writer
pub fn init_with_writer<W>(
    component: &str,
    default_level: Level,
    format: LogFormat,
    writer: W,
) -> anyhow::Result<()>
where
    W: for<'writer> tracing_subscriber::fmt::MakeWriter<'writer> + Send + Sync + 'static,
{
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter(component, default_level));

    match format {
        LogFormat::Json => {
            let layer = tracing_subscriber::fmt::layer().with_writer(writer).json();
            #[cfg(debug_assertions)]
            let layer = layer.with_file(true).with_line_number(true);

            tracing_subscriber::registry().with(filter).with(layer).try_init()?;
        }
        LogFormat::Plaintext => {
            let layer = tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false);
            #[cfg(debug_assertions)]
            let layer = layer.with_file(true).with_line_number(true);

            tracing_subscriber::registry().with(filter).with(layer).try_init()?;
        }
    }

    Ok(())
}

/// Filter used when `RUST_LOG` is unset. The engine crate always follows
/// the requested level alongside the component.
fn default_filter(component: &str, level: Level) -> EnvFilter {
    let component = component.replace('-', "_");
    EnvFilter::new(format!(
        "{level},{component}={level},chunkfs_core={level}",
        level = level,
        component = component
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        logging: CliLoggingArgs,
    }

    #[test]
    fn test_cli_log_level_conversion() {
        assert_eq!(Level::from(CliLogLevel::Error), Level::ERROR);
        assert_eq!(Level::from(CliLogLevel::Warn), Level::WARN);
        assert_eq!(Level::from(CliLogLevel::Info), Level::INFO);
        assert_eq!(Level::from(CliLogLevel::Debug), Level::DEBUG);
        assert_eq!(Level::from(CliLogLevel::Trace), Level::TRACE);
    }

    #[test]
    fn test_cli_log_level_display() {
        assert_eq!(format!("{}", CliLogLevel::Error), "error");
        assert_eq!(format!("{}", CliLogLevel::Debug), "debug");
        assert_eq!(format!("{}", CliLogLevel::Trace), "trace");
    }

    #[test]
    fn test_cli_log_level_default_is_quiet() {
        assert_eq!(CliLogLevel::default(), CliLogLevel::Warn);
    }

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("json".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!("PlainText".parse::<LogFormat>(), Ok(LogFormat::Plaintext));
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_parse_logging_flags() {
        let cli = TestCli::parse_from([
            "test",
            "--log-level",
            "debug",
            "--log-format",
            "json",
            "--log-dir",
            "/var/log/chunkfs",
        ]);
        assert_eq!(cli.logging.log_level, Some(CliLogLevel::Debug));
        assert_eq!(cli.logging.log_format, Some(LogFormat::Json));
        assert!(cli.logging.logs_to_file());

        let cli = TestCli::parse_from(["test"]);
        assert!(cli.logging.is_empty());
        assert!(!cli.logging.logs_to_file());
    }

    #[test]
    fn test_resolve_log_path() {
        let args = CliLoggingArgs {
            log_file: Some("/abs/run.log".to_string()),
            log_dir: Some("/ignored".to_string()),
            ..Default::default()
        };
        assert_eq!(args.resolve_log_path("chunkfs"), PathBuf::from("/abs/run.log"));

        let args = CliLoggingArgs {
            log_file: Some("run.log".to_string()),
            log_dir: Some("/logs".to_string()),
            ..Default::default()
        };
        assert_eq!(args.resolve_log_path("chunkfs"), PathBuf::from("/logs/run.log"));

        let args = CliLoggingArgs {
            log_dir: Some("/logs".to_string()),
            ..Default::default()
        };
        assert_eq!(args.resolve_log_path("chunkfs"), PathBuf::from("/logs/chunkfs.log"));

        let args = CliLoggingArgs::default();
        assert!(args.resolve_log_path("chunkfs").ends_with("chunkfs.log"));
    }

    #[test]
    fn test_logging_args_serialize_skips_unset() {
        let args = CliLoggingArgs {
            log_level: Some(CliLogLevel::Trace),
            ..Default::default()
        };
        let json = serde_json::to_value(&args).unwrap();
        assert_eq!(json, serde_json::json!({ "log-level": "trace" }));
    }

    #[test]
    fn test_default_filter_mentions_engine() {
        let filter = default_filter("chunkfs-cli", Level::DEBUG).to_string();
        assert!(filter.contains("chunkfs_cli=debug"));
        assert!(filter.contains("chunkfs_core=debug"));
    }

    #[test]
    fn test_init_to_file_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("chunkfs.log");
        // Another test may already own the global subscriber; only the file matters here.
        let _ = init_to_file("chunkfs-test", Level::INFO, LogFormat::Json, &path);
        assert!(path.exists());
    }

    #[test]
    fn test_standard_log_path_for_component() {
        let path = get_standard_log_path_for_component("chunkfs-cli");
        assert!(path.to_string_lossy().ends_with("chunkfs-cli.log"));

        #[cfg(target_os = "linux")]
        assert!(path.to_string_lossy().contains("chunkfs"));
    }
}
