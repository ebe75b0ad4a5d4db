//! Configuration validation.
//!
//! Catches threshold combinations that would make a scan meaningless
//! (an empty price band, a zero batch size, a drop lookback longer than
//! the guaranteed history).

use thiserror::Error;

use crate::config::{Config, FilterConfig, HistoryConfig, ListingConfig, ObservabilityConfig};
use crate::logging::LogFormat;

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Configuration conflict: {reason}")]
    Conflict { reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

fn invalid(field: &str, reason: impl Into<String>) -> ValidationError {
    ValidationError::InvalidValue {
        field: field.to_string(),
        reason: reason.into(),
    }
}

impl Validate for Config {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        let sections: [&dyn Validate; 4] =
            [&self.observability, &self.listing, &self.history, &self.filter];
        for section in sections {
            if let Err(e) = section.validate() {
                errors.push(e);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else if errors.len() == 1 {
            Err(errors.remove(0))
        } else {
            Err(ValidationError::Multiple(errors))
        }
    }
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        if let Err(reason) = self.log_format.parse::<LogFormat>() {
            return Err(invalid("observability.log_format", reason));
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
            other => Err(invalid(
                "observability.log_level",
                format!("'{}' is not a log level", other),
            )),
        }
    }
}

impl Validate for ListingConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.timeout_secs == 0 {
            return Err(invalid("listing.timeout_secs", "must be positive"));
        }
        Ok(())
    }
}

impl Validate for HistoryConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.batch_size == 0 {
            return Err(invalid("history.batch_size", "must be positive"));
        }
        if self.lookback_days == 0 {
            return Err(invalid("history.lookback_days", "must be positive"));
        }
        Ok(())
    }
}

impl Validate for FilterConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.min_price.is_nan() || self.max_price.is_nan() || self.min_price > self.max_price {
            return Err(ValidationError::Conflict {
                reason: format!(
                    "filter.min_price {} exceeds filter.max_price {}",
                    self.min_price, self.max_price
                ),
            });
        }
        if self.volume_window == 0 {
            return Err(invalid("filter.volume_window", "must be positive"));
        }
        if self.min_rows <= self.drop_lookback {
            return Err(ValidationError::Conflict {
                reason: format!(
                    "filter.min_rows {} must exceed filter.drop_lookback {}",
                    self.min_rows, self.drop_lookback
                ),
            });
        }
        if self.shares_per_lot <= 0.0 {
            return Err(invalid("filter.shares_per_lot", "must be positive"));
        }
        Ok(())
    }
}
