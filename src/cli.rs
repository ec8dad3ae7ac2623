use std::path::{Path, PathBuf};
use clap::{Parser, ValueEnum};
use regex::Regex;

use crate::config::MonitorConfig;
use crate::error::{MonitorError, Result};

#[derive(Parser)]
#[command(name = "pollwatch")]
#[command(author = "pollwatch Team")]
#[command(version)]
#[command(about = "A poll-and-diff directory monitor")]
#[command(long_about = "pollwatch scans a directory on a fixed delay, compares successive snapshots and reports created, modified, deleted and finished-writing files. No native file system notification APIs are used.")]
pub struct Cli {
    /// Directory to monitor
    #[arg(value_name = "PATH", help = "Path to monitor (defaults to current directory)")]
    pub path: Option<PathBuf>,

    /// Also monitor every non-hidden subdirectory
    #[arg(short, long, help = "Monitor subdirectories too")]
    pub recursive: bool,

    /// Delay between scans in milliseconds
    #[arg(short, long, help = "Delay between scans in ms")]
    pub delay: Option<u64>,

    /// TOML configuration file
    #[arg(short, long, value_name = "FILE", help = "Configuration file")]
    pub config: Option<PathBuf>,

    /// Report files once they stop growing
    #[arg(long, help = "Enable the finished-writing recognizer")]
    pub finished_writing: bool,

    /// Scans a file size must stay unchanged before it counts as written
    #[arg(long, value_name = "N", help = "Stable observations for finished-writing")]
    pub stable_scans: Option<u32>,

    /// Enable verbose logging
    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,

    /// Disable colors in output
    #[arg(long, help = "Disable colored output")]
    pub no_color: bool,

    /// Show only specific file types
    #[arg(long, value_delimiter = ',', help = "File extensions to report (e.g., rs,py,js)")]
    pub extensions: Option<Vec<String>>,

    /// Regular expressions for paths that should not be reported
    #[arg(long, value_delimiter = ',', help = "Path patterns to ignore")]
    pub ignore: Option<Vec<String>>,

    /// Output format
    #[arg(long, default_value = "text", help = "Output format")]
    pub output: OutputFormat,

    /// Print scan status events too
    #[arg(long, help = "Print scan status events")]
    pub status: bool,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Plain text output (default)
    Text,
    /// JSON output for scripting
    Json,
    /// Compact single-line format
    Compact,
}

impl Cli {
    pub fn get_watch_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(|| {
            std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
        })
    }

    pub fn should_watch_extension(&self, path: &Path) -> bool {
        if let Some(ref extensions) = self.extensions {
            if let Some(ext) = path.extension().and_then(|s| s.to_str()) {
                extensions.iter().any(|e| e.eq_ignore_ascii_case(ext))
            } else {
                false
            }
        } else {
            true // Report all files if no extensions specified
        }
    }

    pub fn get_ignore_patterns(&self) -> Result<Vec<Regex>> {
        self.ignore
            .iter()
            .flatten()
            .map(|pattern| {
                Regex::new(pattern)
                    .map_err(|err| MonitorError::Config(format!("invalid ignore pattern '{}': {}", pattern, err)))
            })
            .collect()
    }

    /// Defaults, then the config file, then environment, then flags.
    pub fn build_config(&self) -> Result<MonitorConfig> {
        let mut config = MonitorConfig::load_or_default(self.config.as_deref())?;
        config.apply_env();

        if self.recursive {
            config.scan.recursive = true;
        }
        if let Some(delay) = self.delay {
            config.scan.delay_ms = delay;
        }
        if self.finished_writing {
            config.recognizers.finished_writing = true;
        }
        if let Some(scans) = self.stable_scans {
            config.recognizers.stable_observations = scans;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn setup_logging(&self) {
        let level = if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        };

        tracing_subscriber::fmt()
            .with_max_level(level)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .with_writer(std::io::stderr)
            .init();
    }

    pub fn validate(&self) -> Result<(), String> {
        let path = self.get_watch_path();

        if !path.exists() {
            return Err(format!("Path does not exist: {}", path.display()));
        }

        if !path.is_dir() {
            return Err(format!("Path is not a directory: {}", path.display()));
        }

        if self.delay == Some(0) {
            return Err("Delay must be greater than 0".to_string());
        }

        Ok(())
    }
}
