use super::{
  FallbackConfig,
  validation::{BasicConfigValidator, ConfigValidationError},
};
use std::time::Duration;

/// Builder for creating validated configurations.
/// Starts from the defaults; every setter validates its own field and `build` validates the combination.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
  config: FallbackConfig,
}

impl ConfigBuilder {
  /// Create a new configuration builder
  pub fn new() -> Self {
    Self::default()
  }

  /// Allow or forbid falling back to the plain origin
  pub fn with_origin_fallback_allowed(mut self, allowed: bool) -> Self {
    self.config.origin_fallback_allowed = allowed;
    self
  }

  /// Set the head start of HTTP/3 attempts
  pub fn with_fast_fallback_timeout(mut self, timeout: Duration) -> Result<Self, ConfigValidationError> {
    BasicConfigValidator::validate_fast_fallback_timeout(timeout)?;
    self.config.fast_fallback_timeout = timeout;
    Ok(self)
  }

  /// Set whether a reset signal clears the exclusion list
  pub fn with_reset_exclusion_list_on_signal(mut self, reset: bool) -> Self {
    self.config.reset_exclusion_list_on_signal = reset;
    self
  }

  /// Enable or disable HTTP/3 attempts
  pub fn with_http3(mut self, enabled: bool) -> Self {
    self.config.http3_enabled = enabled;
    self
  }

  /// Enable or disable HTTP/2 attempts
  pub fn with_http2(mut self, enabled: bool) -> Self {
    self.config.http2_enabled = enabled;
    self
  }

  /// Set the port used when no port override is advertised
  pub fn with_default_port(mut self, port: u16) -> Result<Self, ConfigValidationError> {
    BasicConfigValidator::validate_default_port(port)?;
    self.config.default_port = port;
    Ok(self)
  }

  /// Set the upper bound of a single attempt
  pub fn with_attempt_timeout(mut self, timeout: Duration) -> Result<Self, ConfigValidationError> {
    BasicConfigValidator::validate_attempt_timeout(timeout)?;
    self.config.attempt_timeout = timeout;
    Ok(self)
  }

  /// Set the capacity of the endpoint set cache
  pub fn with_endpoint_set_cache_size(mut self, size: usize) -> Result<Self, ConfigValidationError> {
    BasicConfigValidator::validate_cache_size(size)?;
    self.config.endpoint_set_cache_size = size;
    Ok(self)
  }

  /// Build the final configuration
  pub fn build(self) -> Result<FallbackConfig, ConfigValidationError> {
    // Final validation
    BasicConfigValidator::validate_timeouts(self.config.fast_fallback_timeout, self.config.attempt_timeout)?;
    if !self.config.http3_enabled && !self.config.http2_enabled {
      crate::trace::warn!("Both HTTP/3 and HTTP/2 are disabled: only http/1.1 endpoints will be attempted");
    }
    Ok(self.config)
  }
}
