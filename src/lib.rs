//! Workspace placeholder crate.
//!
//! This crate exists to expose shared feature flags that map to the individual
//! workspace crates. Host applications can depend on `range-cache-workspace`
//! and enable `desktop-shims` to get a `CoreService` backed by the default
//! reqwest HTTP client without wiring each crate individually.

#[cfg(feature = "desktop-shims")]
pub use core_service::{CoreError, CoreService};
