//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the range cache core:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Event bus system
//!
//! ## Overview
//!
//! Every other core crate depends on this one for its logging conventions,
//! fail-fast configuration and the broadcast channel used to publish cache
//! activity to diagnostics and UI collaborators.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
