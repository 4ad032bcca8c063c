//! Smolitux Core - shared types for the voice-control workspace
//!
//! Provides the error type, the `Result` alias and the persisted
//! voice-control configuration used by every other crate.

pub mod config;
pub mod error;

pub use config::*;
pub use error::*;
