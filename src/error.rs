//! Error types for the directory monitor.
//!
//! Only lifecycle misuse and setup failures reach callers. Scan failures and
//! recognizer panics are recovered inside the worker and surface through logs.

use std::path::PathBuf;
use thiserror::Error;

use crate::core::lifecycle::{ServiceState, Transition};

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Cannot {transition} a monitor that is {from}")]
    InvalidTransition {
        from: ServiceState,
        transition: Transition,
    },

    #[error("Root directory does not exist: {}", .0.display())]
    RootNotFound(PathBuf),

    #[error("Root path is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("Monitor has been destroyed")]
    Destroyed,

    #[error("Failed to scan {}: {}", .directory.display(), .source)]
    Scan {
        directory: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Recognizer '{recognizer}' panicked")]
    RecognizerPanicked { recognizer: String },

    #[error("Failed to spawn scan worker: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type Result<T, E = MonitorError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_transition_message() {
        let err = MonitorError::InvalidTransition {
            from: ServiceState::Running,
            transition: Transition::Start,
        };
        assert_eq!(err.to_string(), "Cannot start a monitor that is running");
    }

    #[test]
    fn test_scan_error_keeps_source() {
        let err = MonitorError::Scan {
            directory: PathBuf::from("/tmp/gone"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        };
        assert!(err.to_string().contains("/tmp/gone"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
