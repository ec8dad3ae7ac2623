//! Configuration management for pollwatch
//!
//! This module provides configuration structures and defaults for the scan
//! loop, the failure throttle and the set of recognizers a monitor starts with.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use serde::{Deserialize, Serialize};

use crate::core::recognizer::{
    CreatedRecognizer, DeletedRecognizer, FinishedWritingRecognizer, ModifiedRecognizer, Recognizer,
};
use crate::error::{MonitorError, Result};

/// Global configuration for a directory monitor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Scan loop configuration
    pub scan: ScanConfig,
    /// Failure throttle configuration
    pub throttle: ThrottleConfig,
    /// Recognizers registered at construction
    pub recognizers: RecognizerConfig,
}

/// Configuration for the scan loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Delay between scan ticks in milliseconds
    pub delay_ms: u64,
    /// Whether subdirectories of the root are discovered and scanned
    pub recursive: bool,
    /// Pause between directories within one tick, in milliseconds
    pub directory_pause_ms: u64,
    /// How long `stop` waits for the worker before detaching it
    pub stop_timeout_ms: u64,
}

/// Configuration for the failure throttle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    /// Number of failures kept in history; reaching it inside the window trips
    pub capacity: usize,
    /// Sliding window in seconds
    pub window_secs: u64,
    /// Forced cooldown in seconds once tripped
    pub cooldown_secs: u64,
}

/// Which built-in recognizers to register
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognizerConfig {
    pub created: bool,
    pub modified: bool,
    pub deleted: bool,
    pub finished_writing: bool,
    /// Consecutive equal-size observations before a file counts as written
    pub stable_observations: u32,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            delay_ms: 1000,
            recursive: false,
            directory_pause_ms: 10,
            stop_timeout_ms: 2000,
        }
    }
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            capacity: 10,
            window_secs: 60,
            cooldown_secs: 60,
        }
    }
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            created: true,
            modified: true,
            deleted: true,
            finished_writing: false,
            stable_observations: FinishedWritingRecognizer::DEFAULT_STABLE_OBSERVATIONS,
        }
    }
}

impl ScanConfig {
    /// Get the inter-scan delay
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Get the pause between directories
    pub fn directory_pause(&self) -> Duration {
        Duration::from_millis(self.directory_pause_ms)
    }

    /// Get the stop timeout
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

impl ThrottleConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

impl RecognizerConfig {
    /// Build the enabled recognizers in registration order.
    pub fn build(&self) -> Vec<Arc<dyn Recognizer>> {
        let mut recognizers: Vec<Arc<dyn Recognizer>> = Vec::new();
        if self.created {
            recognizers.push(Arc::new(CreatedRecognizer));
        }
        if self.modified {
            recognizers.push(Arc::new(ModifiedRecognizer));
        }
        if self.deleted {
            recognizers.push(Arc::new(DeletedRecognizer));
        }
        if self.finished_writing {
            recognizers.push(Arc::new(FinishedWritingRecognizer::new(self.stable_observations)));
        }
        recognizers
    }
}

/// Configuration loading and management
impl MonitorConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|err| MonitorError::Config(format!("cannot read {}: {}", path.display(), err)))?;
        let config: Self = toml::from_str(&text)
            .map_err(|err| MonitorError::Config(format!("cannot parse {}: {}", path.display(), err)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` when given, otherwise use defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Default configuration with environment overrides applied
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Override values with environment variables if present
    pub fn apply_env(&mut self) {
        if let Ok(val) = std::env::var("POLLWATCH_DELAY_MS") {
            if let Ok(ms) = val.parse::<u64>() {
                self.scan.delay_ms = ms;
            }
        }

        if let Ok(val) = std::env::var("POLLWATCH_RECURSIVE") {
            if let Ok(recursive) = val.parse::<bool>() {
                self.scan.recursive = recursive;
            }
        }

        if let Ok(val) = std::env::var("POLLWATCH_DIRECTORY_PAUSE_MS") {
            if let Ok(ms) = val.parse::<u64>() {
                self.scan.directory_pause_ms = ms;
            }
        }

        if let Ok(val) = std::env::var("POLLWATCH_STOP_TIMEOUT_MS") {
            if let Ok(ms) = val.parse::<u64>() {
                self.scan.stop_timeout_ms = ms;
            }
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.scan.delay_ms == 0 {
            return Err(MonitorError::Config("delay_ms must be greater than 0".to_string()));
        }

        if self.throttle.capacity == 0 {
            return Err(MonitorError::Config("throttle capacity must be greater than 0".to_string()));
        }

        if self.throttle.window_secs == 0 {
            return Err(MonitorError::Config("throttle window_secs must be greater than 0".to_string()));
        }

        if self.recognizers.stable_observations < 2 {
            return Err(MonitorError::Config("stable_observations must be at least 2".to_string()));
        }

        Ok(())
    }
}
