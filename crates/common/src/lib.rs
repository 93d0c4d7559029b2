//! Lipsync Common Utilities
//!
//! Shared infrastructure for all lipsync crates:
//! - Error types and result aliases
//! - Frame clock: time/frame conversion for arbitrary frame rates
//! - Tracing/logging initialization
//! - Configuration loading

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
