use crate::constants::{MAX_FAST_FALLBACK_TIMEOUT_MSEC, UNSAFE_PORTS};
use std::time::Duration;

/// Validation errors specific to configuration
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigValidationError {
  #[error("Invalid value for field {field}: {value}. {reason}")]
  InvalidFieldValue { field: String, value: String, reason: String },

  #[error("Conflicting configuration: {reason}")]
  ConflictingConfiguration { reason: String },
}

/// Result type for configuration validation
pub type ValidationResult<T> = Result<T, ConfigValidationError>;

/// Validator for basic configuration fields
pub struct BasicConfigValidator;

impl BasicConfigValidator {
  /// Validate the port used for records without a port override and for the origin
  pub fn validate_default_port(port: u16) -> ValidationResult<()> {
    if port == 0 {
      return Err(ConfigValidationError::InvalidFieldValue {
        field: "default_port".to_string(),
        value: port.to_string(),
        reason: "Port cannot be 0".to_string(),
      });
    }
    if UNSAFE_PORTS.contains(&port) {
      return Err(ConfigValidationError::InvalidFieldValue {
        field: "default_port".to_string(),
        value: port.to_string(),
        reason: "Port is on the blocked port list".to_string(),
      });
    }
    Ok(())
  }

  /// Validate the fast fallback timeout. Zero is accepted and means the alternate starts immediately.
  pub fn validate_fast_fallback_timeout(timeout: Duration) -> ValidationResult<()> {
    if timeout > Duration::from_millis(MAX_FAST_FALLBACK_TIMEOUT_MSEC) {
      return Err(ConfigValidationError::InvalidFieldValue {
        field: "fast_fallback_timeout".to_string(),
        value: format!("{:?}", timeout),
        reason: format!("Fast fallback timeout is too large (max {} ms)", MAX_FAST_FALLBACK_TIMEOUT_MSEC),
      });
    }
    Ok(())
  }

  /// Validate the per attempt timeout
  pub fn validate_attempt_timeout(timeout: Duration) -> ValidationResult<()> {
    if timeout.is_zero() {
      return Err(ConfigValidationError::InvalidFieldValue {
        field: "attempt_timeout".to_string(),
        value: format!("{:?}", timeout),
        reason: "Attempt timeout cannot be 0".to_string(),
      });
    }
    Ok(())
  }

  /// The head start given to HTTP/3 must end before the attempt itself times out
  pub fn validate_timeouts(fast_fallback_timeout: Duration, attempt_timeout: Duration) -> ValidationResult<()> {
    if fast_fallback_timeout >= attempt_timeout {
      return Err(ConfigValidationError::ConflictingConfiguration {
        reason: format!(
          "fast_fallback_timeout ({:?}) must be shorter than attempt_timeout ({:?})",
          fast_fallback_timeout, attempt_timeout
        ),
      });
    }
    Ok(())
  }

  /// Validate the endpoint set cache capacity
  pub fn validate_cache_size(size: usize) -> ValidationResult<()> {
    if size == 0 {
      return Err(ConfigValidationError::InvalidFieldValue {
        field: "endpoint_set_cache_size".to_string(),
        value: size.to_string(),
        reason: "Cache size cannot be 0".to_string(),
      });
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_validate_default_port() {
    assert!(BasicConfigValidator::validate_default_port(443).is_ok());
    assert!(BasicConfigValidator::validate_default_port(8443).is_ok());
    assert!(BasicConfigValidator::validate_default_port(0).is_err());
    assert!(BasicConfigValidator::validate_default_port(25).is_err());
  }

  #[test]
  fn test_validate_fast_fallback_timeout() {
    assert!(BasicConfigValidator::validate_fast_fallback_timeout(Duration::ZERO).is_ok());
    assert!(BasicConfigValidator::validate_fast_fallback_timeout(Duration::from_millis(50)).is_ok());
    assert!(BasicConfigValidator::validate_fast_fallback_timeout(Duration::from_secs(61)).is_err());
  }

  #[test]
  fn test_validate_timeouts() {
    assert!(BasicConfigValidator::validate_attempt_timeout(Duration::ZERO).is_err());
    assert!(BasicConfigValidator::validate_timeouts(Duration::from_millis(50), Duration::from_secs(1)).is_ok());
    assert!(matches!(
      BasicConfigValidator::validate_timeouts(Duration::from_secs(2), Duration::from_secs(1)),
      Err(ConfigValidationError::ConflictingConfiguration { .. })
    ));
  }

  #[test]
  fn test_validate_cache_size() {
    assert!(BasicConfigValidator::validate_cache_size(1).is_ok());
    assert!(BasicConfigValidator::validate_cache_size(0).is_err());
  }
}
