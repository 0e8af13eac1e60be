//! Core error types for saycount-core.
//!
//! Synchronous precondition failures (`InvalidDuration`, `AlreadyRunning`) are
//! returned straight to the caller. Failures that happen on the timing loop or
//! the announcer worker are collected out of band and drained with
//! [`CountdownEngine::take_errors`](crate::CountdownEngine::take_errors).

use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

/// Core error type for saycount-core.
#[derive(Error, Debug)]
pub enum CountdownError {
    /// `start` was called with a zero duration
    #[error("Countdown duration must be positive, got {seconds}")]
    InvalidDuration { seconds: u32 },

    /// `start` was called while a run (or its loop thread) is still active
    #[error("Countdown already running")]
    AlreadyRunning,

    /// The announcer failed to render or accept an utterance
    #[error("Announcer error: {0}")]
    Announcer(#[from] AnnouncerError),

    /// The timing loop did not acknowledge a stop request in time
    #[error("Timing loop did not acknowledge stop within {waited_ms} ms")]
    TimeoutOnStop { waited_ms: u64 },

    /// The time source itself failed; fatal for the run
    #[error("Clock unavailable: {0}")]
    Clock(#[from] ClockError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// IO errors (thread spawning)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Announcer and announcement-queue errors.
#[derive(Error, Debug)]
pub enum AnnouncerError {
    /// No speech program could be found on this system
    #[error("No speech program found (tried: {tried})")]
    NoBackend { tried: String },

    /// The speech program could not be launched
    #[error("Failed to launch '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The speech program ran but reported failure
    #[error("'{program}' exited with {status}")]
    Failed { program: String, status: String },

    /// The queue was full; the utterance was dropped
    #[error("Announcement queue full, dropped \"{utterance}\"")]
    QueueFull { utterance: String },

    /// The worker is gone; the utterance was dropped
    #[error("Announcement queue closed, dropped \"{utterance}\"")]
    QueueClosed { utterance: String },
}

/// Time source errors.
#[derive(Error, Debug)]
pub enum ClockError {
    /// The system clock reports a time before the Unix epoch
    #[error("system time is before the Unix epoch: {0}")]
    BeforeEpoch(String),

    /// The time cannot be represented
    #[error("time out of representable range")]
    OutOfRange,

    /// A simulated clock was switched off
    #[error("clock switched off")]
    Unavailable,
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {}: {message}", path.display())]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {}: {message}", path.display())]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),

    /// The configuration directory could not be determined or created
    #[error("Configuration directory unavailable: {0}")]
    NoDataDir(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::ParseFailed(err.to_string())
    }
}

/// Out-of-band sink for failures raised off the caller's thread.
#[derive(Debug, Default)]
pub(crate) struct ErrorLog {
    errors: Mutex<Vec<CountdownError>>,
}

impl ErrorLog {
    pub(crate) fn push(&self, err: impl Into<CountdownError>) {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(err.into());
    }

    pub(crate) fn drain(&self) -> Vec<CountdownError> {
        std::mem::take(&mut *self.errors.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

/// Result type alias for CountdownError
pub type Result<T, E = CountdownError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn announcer_errors_convert_into_countdown_error() {
        let err: CountdownError = AnnouncerError::QueueFull {
            utterance: "3".into(),
        }
        .into();
        assert!(matches!(err, CountdownError::Announcer(_)));
        assert_eq!(
            err.to_string(),
            "Announcer error: Announcement queue full, dropped \"3\""
        );
    }

    #[test]
    fn invalid_duration_message_names_the_value() {
        let err = CountdownError::InvalidDuration { seconds: 0 };
        assert_eq!(err.to_string(), "Countdown duration must be positive, got 0");
    }
}
