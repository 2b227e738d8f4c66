//! ridechat Core Library
//!
//! Shared functionality for ridechat components:
//! - Common error types
//! - Tracing/logging initialisation

pub mod error;
pub mod tracing_init;

pub use error::{Error, Result};
