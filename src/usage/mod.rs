//! Call outcome recording, statistics and persistence.

mod record;
mod recorder;
mod stats;
mod store;

pub use record::{decode_records, encode_records, CallCategory, CallRecord};
pub use recorder::UsageRecorder;
pub use stats::{CategoryStats, UsageStatistics};
pub use store::{FileStore, KeyValueStore, MemoryStore};
