//! Sliding-window rate limiting.

mod ledger;
mod limiter;
mod window;

pub use ledger::{TimestampLedger, WindowCounts};
pub use limiter::{RateLimiter, UsageStats};
pub use window::TimeWindow;
