//! lobbykit Core Library
//!
//! Shared functionality for lobbykit components:
//! - Configuration resolution and hierarchy
//! - Tracing subscriber setup
//! - Common error types

pub mod config;
pub mod error;
pub mod tracing_init;

pub use config::{Config, LoggingConfig, MatchmakingConfig, TimeoutConfig};
pub use error::{Error, Result};
