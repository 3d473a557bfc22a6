//! Synchronization primitives.
//!
//! Async-aware locks and channels from `tokio::sync`, plus the
//! `CancellationToken` used to stop in-flight work cooperatively.
//!
//! # Examples
//!
//! ```rust
//! use core_async::sync::{CancellationToken, Semaphore};
//! use std::sync::Arc;
//!
//! async fn example() {
//!     let permits = Arc::new(Semaphore::new(4));
//!     let _permit = permits.acquire().await.unwrap();
//!
//!     let token = CancellationToken::new();
//!     let child = token.child_token();
//!     token.cancel();
//!     assert!(child.is_cancelled());
//! }
//! ```

pub use tokio::sync::{
    broadcast, mpsc, oneshot, watch, AcquireError, Mutex, MutexGuard, Notify, OnceCell,
    OwnedSemaphorePermit, RwLock, RwLockReadGuard, RwLockWriteGuard, Semaphore, SemaphorePermit,
};

pub use tokio_util::sync::{CancellationToken, DropGuard, WaitForCancellationFuture};
