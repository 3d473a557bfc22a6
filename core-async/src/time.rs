//! Time-related utilities.

pub use tokio::time::{error::Elapsed, interval, sleep, sleep_until, timeout, Interval, Sleep};

pub use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
