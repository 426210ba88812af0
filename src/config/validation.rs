//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check the log level is a usable filter directive
//! - Check the body high-water mark is positive
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: DocumentConfig → Result<(), Vec<ValidationError>>

use thiserror::Error;

use crate::config::schema::DocumentConfig;
use crate::observability::logging::parse_filter;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("logging.level must not be empty")]
    EmptyLogLevel,

    #[error("logging.level '{0}' is not a valid filter directive")]
    InvalidLogLevel(String),

    #[error("body.high_water_mark must be greater than 0")]
    ZeroHighWaterMark,
}

/// Check a parsed configuration, collecting every error.
pub fn validate_config(config: &DocumentConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let level = config.logging.level.trim();
    if level.is_empty() {
        errors.push(ValidationError::EmptyLogLevel);
    } else if parse_filter(level).is_err() {
        errors.push(ValidationError::InvalidLogLevel(config.logging.level.clone()));
    }

    if config.body.high_water_mark == 0 {
        errors.push(ValidationError::ZeroHighWaterMark);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
