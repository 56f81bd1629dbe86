//! Utilities
//!
//! Shared error types and configuration.

pub mod config;
pub mod error;

pub use config::ApiConfig;
pub use error::{AppError, AppResult};
