use crate::constants::{
  DEFAULT_ATTEMPT_TIMEOUT_MSEC, DEFAULT_ENDPOINT_SET_CACHE_SIZE, DEFAULT_FAST_FALLBACK_TIMEOUT_MSEC, DEFAULT_HTTPS_PORT,
};
use std::time::Duration;

pub mod builder;
#[cfg(test)]
mod integration_tests;
mod toml;
pub mod validation;

pub use self::{
  builder::ConfigBuilder,
  toml::ConfigToml,
  validation::{ConfigValidationError, ValidationResult},
};

/// Configuration of endpoint selection and fallback.
/// Immutable once built; every component takes it at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackConfig {
  /// Whether the plain origin may be contacted after every advertised endpoint failed
  pub origin_fallback_allowed: bool,
  /// Head start of an HTTP/3 attempt before the alternate attempt is started. Zero races immediately.
  pub fast_fallback_timeout: Duration,
  /// Whether a reset signal clears the exclusion list
  pub reset_exclusion_list_on_signal: bool,
  /// Attempt QUIC transports
  pub http3_enabled: bool,
  /// Attempt TLS over TCP with h2
  pub http2_enabled: bool,
  /// Port used when a record carries no port override, and for the origin
  pub default_port: u16,
  /// Upper bound of a single connection attempt
  pub attempt_timeout: Duration,
  /// Max number of origins kept in the endpoint set cache
  pub endpoint_set_cache_size: usize,
}

impl Default for FallbackConfig {
  fn default() -> Self {
    Self {
      origin_fallback_allowed: true,
      fast_fallback_timeout: Duration::from_millis(DEFAULT_FAST_FALLBACK_TIMEOUT_MSEC),
      reset_exclusion_list_on_signal: true,
      http3_enabled: true,
      http2_enabled: true,
      default_port: DEFAULT_HTTPS_PORT,
      attempt_timeout: Duration::from_millis(DEFAULT_ATTEMPT_TIMEOUT_MSEC),
      endpoint_set_cache_size: DEFAULT_ENDPOINT_SET_CACHE_SIZE,
    }
  }
}
