//! Sliding time windows used by the rate limiter.

use std::fmt;
use std::time::Duration;

/// Trailing window a cap is enforced over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimeWindow {
    /// Trailing 60 seconds
    Minute,
    /// Trailing 3600 seconds
    Hour,
    /// Trailing 86400 seconds
    Day,
}

impl TimeWindow {
    /// All windows, narrowest first. This is the order caps are checked in.
    pub const ALL: [TimeWindow; 3] = [TimeWindow::Minute, TimeWindow::Hour, TimeWindow::Day];

    /// Get the duration of this time window.
    pub fn duration(&self) -> Duration {
        match self {
            TimeWindow::Minute => Duration::from_secs(60),
            TimeWindow::Hour => Duration::from_secs(3600),
            TimeWindow::Day => Duration::from_secs(86400),
        }
    }

    /// The window length as a chrono duration, for timestamp arithmetic.
    pub fn span(&self) -> chrono::Duration {
        match self {
            TimeWindow::Minute => chrono::Duration::seconds(60),
            TimeWindow::Hour => chrono::Duration::seconds(3600),
            TimeWindow::Day => chrono::Duration::seconds(86400),
        }
    }

    /// The longest window; nothing older is ever kept.
    pub fn longest() -> TimeWindow {
        TimeWindow::Day
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TimeWindow::Minute => "minute",
            TimeWindow::Hour => "hour",
            TimeWindow::Day => "day",
        };
        write!(f, "{}", name)
    }
}
