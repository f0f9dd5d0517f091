//! Cradle Guard - usage guard and growth tooling for an infant tracking app
//!
//! This crate holds the non-UI logic behind the app's assistant features:
//! a sliding-window rate limiter and usage recorder that guard calls to
//! cost-incurring services, WHO growth percentiles with trend projection,
//! the activity log model with import/merge, and profile-sharing invitations.

pub mod activity;
pub mod anomaly;
pub mod clock;
pub mod config;
pub mod error;
pub mod growth;
pub mod guard;
pub mod ratelimit;
pub mod sharing;
pub mod usage;

pub use guard::UsageGuard;
