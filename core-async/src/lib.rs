//! Async abstraction layer for the range cache workspace.
//!
//! Every other crate reaches the executor through this crate instead of
//! depending on tokio directly, so runtime choices stay in one place.
//!
//! # Modules
//!
//! - `task`: Task spawning and the blocking worker pool
//! - `time`: Sleep, timeouts, durations
//! - `sync`: Async-aware locks, channels, semaphores and `CancellationToken`
//! - `fs`: Async filesystem helpers
//! - `runtime`: Runtime handles and `block_on`
//!
//! # Examples
//!
//! ```rust
//! use core_async::task;
//! use core_async::time::{sleep, Duration};
//!
//! async fn example() {
//!     let handle = task::spawn(async {
//!         sleep(Duration::from_millis(10)).await;
//!         42
//!     });
//!     assert_eq!(handle.await.unwrap(), 42);
//! }
//! ```

// Re-export the async entry-point/test macros so downstream crates never need
// direct Tokio dependencies.
pub use core_async_macros::{main, test};

pub mod fs;
pub mod runtime;
pub mod sync;
pub mod task;
pub mod time;

pub use task::spawn;
pub use tokio::{join, select};
pub use time::{sleep, Duration, Instant};
