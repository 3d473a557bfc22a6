//! Task spawning.
//!
//! `spawn` schedules async work on the current runtime. `spawn_blocking`
//! moves synchronous work (positional file I/O, hashing) onto tokio's bounded
//! blocking pool so it never stalls the executor.

pub use tokio::task::{spawn, spawn_blocking, yield_now, JoinError, JoinHandle, JoinSet};
