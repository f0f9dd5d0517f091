//! Error types for the usage guard and its companions.

use std::time::Duration;

use thiserror::Error;

use crate::ratelimit::TimeWindow;

/// Main error type for cradle-guard operations.
#[derive(Error, Debug)]
pub enum GuardError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Rate limiting errors
    #[error(transparent)]
    RateLimit(#[from] RateLimitError),

    /// Persistence store errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// JSON encode/decode errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<::config::ConfigError> for GuardError {
    fn from(err: ::config::ConfigError) -> Self {
        GuardError::Config(err.to_string())
    }
}

/// Raised when a call would exceed one of the sliding-window caps.
///
/// Callers should surface `retry_after` and not retry before it elapses.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RateLimitError {
    #[error("Per-minute limit exceeded, retry after {}s", .retry_after.as_secs())]
    MinuteLimitExceeded { retry_after: Duration },

    #[error("Per-hour limit exceeded, retry after {}s", .retry_after.as_secs())]
    HourLimitExceeded { retry_after: Duration },

    #[error("Per-day limit exceeded, retry after {}s", .retry_after.as_secs())]
    DayLimitExceeded { retry_after: Duration },
}

impl RateLimitError {
    /// Build the error for a breached window.
    pub fn for_window(window: TimeWindow, retry_after: Duration) -> Self {
        match window {
            TimeWindow::Minute => RateLimitError::MinuteLimitExceeded { retry_after },
            TimeWindow::Hour => RateLimitError::HourLimitExceeded { retry_after },
            TimeWindow::Day => RateLimitError::DayLimitExceeded { retry_after },
        }
    }

    /// The window whose cap was breached.
    pub fn window(&self) -> TimeWindow {
        match self {
            RateLimitError::MinuteLimitExceeded { .. } => TimeWindow::Minute,
            RateLimitError::HourLimitExceeded { .. } => TimeWindow::Hour,
            RateLimitError::DayLimitExceeded { .. } => TimeWindow::Day,
        }
    }

    /// How long to wait before the breached window admits another call.
    pub fn retry_after(&self) -> Duration {
        match self {
            RateLimitError::MinuteLimitExceeded { retry_after }
            | RateLimitError::HourLimitExceeded { retry_after }
            | RateLimitError::DayLimitExceeded { retry_after } => *retry_after,
        }
    }
}

/// Result type alias for cradle-guard operations.
pub type Result<T> = std::result::Result<T, GuardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_error_window_round_trip() {
        for window in [TimeWindow::Minute, TimeWindow::Hour, TimeWindow::Day] {
            let err = RateLimitError::for_window(window, Duration::from_secs(5));
            assert_eq!(err.window(), window);
            assert_eq!(err.retry_after(), Duration::from_secs(5));
        }
    }

    #[test]
    fn test_rate_limit_error_message() {
        let err = RateLimitError::MinuteLimitExceeded {
            retry_after: Duration::from_secs(42),
        };
        assert_eq!(err.to_string(), "Per-minute limit exceeded, retry after 42s");

        let wrapped: GuardError = err.into();
        assert!(matches!(wrapped, GuardError::RateLimit(_)));
    }
}
