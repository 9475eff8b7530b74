//! Integration tests for configuration building from TOML and through the builder

#[cfg(test)]
mod tests {
  use crate::{ConfigBuilder, ConfigToml, FallbackConfig, config::ConfigValidationError};
  use std::time::Duration;

  #[test]
  fn test_config_builder_basic_usage() {
    let config = ConfigBuilder::new()
      .with_origin_fallback_allowed(false)
      .with_fast_fallback_timeout(Duration::from_millis(300))
      .unwrap()
      .with_reset_exclusion_list_on_signal(false)
      .with_http3(false)
      .with_default_port(8443)
      .unwrap()
      .with_attempt_timeout(Duration::from_secs(5))
      .unwrap()
      .with_endpoint_set_cache_size(16)
      .unwrap()
      .build()
      .unwrap();

    assert!(!config.origin_fallback_allowed);
    assert_eq!(config.fast_fallback_timeout, Duration::from_millis(300));
    assert!(!config.reset_exclusion_list_on_signal);
    assert!(!config.http3_enabled);
    assert!(config.http2_enabled);
    assert_eq!(config.default_port, 8443);
    assert_eq!(config.attempt_timeout, Duration::from_secs(5));
    assert_eq!(config.endpoint_set_cache_size, 16);
  }

  #[test]
  fn test_validation_errors() {
    assert!(ConfigBuilder::new().with_default_port(0).is_err());
    assert!(ConfigBuilder::new().with_attempt_timeout(Duration::ZERO).is_err());
    assert!(ConfigBuilder::new().with_endpoint_set_cache_size(0).is_err());
    assert!(
      ConfigBuilder::new()
        .with_fast_fallback_timeout(Duration::from_secs(3600))
        .is_err()
    );

    // each field is valid alone, the combination is not
    let result = ConfigBuilder::new()
      .with_fast_fallback_timeout(Duration::from_secs(10))
      .unwrap()
      .with_attempt_timeout(Duration::from_secs(1))
      .unwrap()
      .build();
    assert!(matches!(
      result,
      Err(ConfigValidationError::ConflictingConfiguration { .. })
    ));
  }

  #[test]
  fn test_zero_fast_fallback_timeout_is_accepted() {
    let config = ConfigBuilder::new()
      .with_fast_fallback_timeout(Duration::ZERO)
      .unwrap()
      .build()
      .unwrap();
    assert!(config.fast_fallback_timeout.is_zero());
  }

  #[test]
  fn test_config_from_toml() {
    let config_toml = ConfigToml::parse(
      r#"
origin_fallback_allowed = false
fast_fallback_timeout_ms = 0
reset_exclusion_list_on_signal = false
http2_enabled = false
default_port = 8443
attempt_timeout = "1500ms"
"#,
    )
    .unwrap();
    let config = FallbackConfig::try_from(config_toml).unwrap();

    assert!(!config.origin_fallback_allowed);
    assert!(config.fast_fallback_timeout.is_zero());
    assert!(!config.reset_exclusion_list_on_signal);
    assert!(config.http3_enabled);
    assert!(!config.http2_enabled);
    assert_eq!(config.default_port, 8443);
    assert_eq!(config.attempt_timeout, Duration::from_millis(1500));
  }

  #[test]
  fn test_invalid_toml_values() {
    let config_toml = ConfigToml::parse("default_port = 25").unwrap();
    assert!(FallbackConfig::try_from(config_toml).is_err());

    let config_toml = ConfigToml::parse("attempt_timeout = \"forever\"").unwrap();
    assert!(FallbackConfig::try_from(config_toml).is_err());

    assert!(ConfigToml::parse("default_port = \"https\"").is_err());
  }
}
