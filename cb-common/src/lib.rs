//! CB Common - Shared configuration, logging and error types for the CB scanner.
//!
//! This crate provides:
//! - Configuration types and layered loading (defaults, JSON file, environment)
//! - Configuration validation
//! - Error types
//! - Logging setup

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;
pub mod validation;

pub use config::{
    Config, FilterConfig, HistoryConfig, ListingConfig, NotificationConfig, ObservabilityConfig,
};
pub use error::{Error, Result};
pub use logging::LogFormat;
pub use validation::{Validate, ValidationError, ValidationResult};
