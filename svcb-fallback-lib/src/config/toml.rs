use super::{ConfigBuilder, FallbackConfig};
use crate::trace::warn;
use anyhow::anyhow;
use serde::Deserialize;
use std::{collections::HashSet, fs, time::Duration};

/// TOML representation of [`FallbackConfig`]. Every field is optional and falls back to its default.
///
/// ```toml
/// origin_fallback_allowed = true
/// fast_fallback_timeout_ms = 50
/// reset_exclusion_list_on_signal = true
/// http3_enabled = true
/// http2_enabled = true
/// default_port = 443
/// attempt_timeout = "30s"
/// endpoint_set_cache_size = 1024
/// ```
#[derive(Deserialize, Debug, Default, PartialEq, Eq, Clone)]
pub struct ConfigToml {
  pub origin_fallback_allowed: Option<bool>,
  pub fast_fallback_timeout_ms: Option<u64>,
  pub reset_exclusion_list_on_signal: Option<bool>,
  pub http3_enabled: Option<bool>,
  pub http2_enabled: Option<bool>,
  pub default_port: Option<u16>,
  pub attempt_timeout: Option<String>,
  pub endpoint_set_cache_size: Option<usize>,
}

impl ConfigToml {
  /// Read and parse a configuration file
  pub fn new(config_file: &str) -> Result<Self, anyhow::Error> {
    let config_str = fs::read_to_string(config_file)?;
    Self::parse(&config_str)
  }

  /// Parse configuration text, warning about unknown fields
  pub fn parse(config_str: &str) -> Result<Self, anyhow::Error> {
    // Check unused fields during deserialization
    let t = toml::de::Deserializer::new(config_str);
    let mut unused = HashSet::new();

    let res = serde_ignored::deserialize(t, |path| {
      unused.insert(path.to_string());
    })
    .map_err(|e| anyhow!(e));

    if !unused.is_empty() {
      let str = unused.iter().fold(String::new(), |acc, x| acc + x + "\n");
      warn!("Configuration contains unsupported fields. Check typos:\n{}", str);
    }

    res
  }
}

impl TryFrom<ConfigToml> for FallbackConfig {
  type Error = anyhow::Error;

  fn try_from(config_toml: ConfigToml) -> Result<Self, Self::Error> {
    let mut builder = ConfigBuilder::new()
      .with_origin_fallback_allowed(config_toml.origin_fallback_allowed.unwrap_or(true))
      .with_reset_exclusion_list_on_signal(config_toml.reset_exclusion_list_on_signal.unwrap_or(true))
      .with_http3(config_toml.http3_enabled.unwrap_or(true))
      .with_http2(config_toml.http2_enabled.unwrap_or(true));

    if let Some(msec) = config_toml.fast_fallback_timeout_ms {
      builder = builder
        .with_fast_fallback_timeout(Duration::from_millis(msec))
        .map_err(|e| anyhow!("Invalid fast fallback timeout: {}", e))?;
    }

    if let Some(port) = config_toml.default_port {
      builder = builder
        .with_default_port(port)
        .map_err(|e| anyhow!("Invalid default port: {}", e))?;
    }

    if let Some(timeout) = config_toml.attempt_timeout.as_ref() {
      builder = builder
        .with_attempt_timeout(parse_duration(timeout)?)
        .map_err(|e| anyhow!("Invalid attempt timeout: {}", e))?;
    }

    if let Some(size) = config_toml.endpoint_set_cache_size {
      builder = builder
        .with_endpoint_set_cache_size(size)
        .map_err(|e| anyhow!("Invalid endpoint set cache size: {}", e))?;
    }

    builder.build().map_err(|e| anyhow!("Invalid configuration: {}", e))
  }
}

/// Parse duration string like "500ms", "30s", "5m" into Duration
fn parse_duration(s: &str) -> Result<Duration, anyhow::Error> {
  let s = s.trim();
  if s.is_empty() {
    return Err(anyhow!("Empty duration string"));
  }

  let (num_part, unit_part) = if let Some(pos) = s.find(|c: char| c.is_alphabetic()) {
    (&s[..pos], &s[pos..])
  } else {
    return Err(anyhow!("Duration must include a unit (ms, s, m)"));
  };

  let num: u64 = num_part
    .trim()
    .parse()
    .map_err(|_| anyhow!("Invalid number in duration: {}", num_part))?;

  let duration = match unit_part.to_lowercase().as_str() {
    "ms" | "msec" | "millis" | "milliseconds" => Duration::from_millis(num),
    "s" | "sec" | "secs" | "second" | "seconds" => Duration::from_secs(num),
    "m" | "min" | "mins" | "minute" | "minutes" => {
      let secs = num
        .checked_mul(60)
        .ok_or_else(|| anyhow!("Duration out of range: {}", s))?;
      Duration::from_secs(secs)
    }
    _ => return Err(anyhow!("Invalid duration unit: {}. Use ms, s, or m", unit_part)),
  };

  Ok(duration)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_duration() {
    assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
    assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
    assert_eq!(parse_duration(" 2 min ").unwrap(), Duration::from_secs(120));
    assert!(parse_duration("").is_err());
    assert!(parse_duration("30").is_err());
    assert!(parse_duration("1h").is_err());
    assert!(parse_duration("xs").is_err());
  }

  #[test]
  fn test_parse_duration_out_of_range() {
    assert!(parse_duration("999999999999999999m").is_err());
    assert!(parse_duration("99999999999999999999s").is_err());
    assert_eq!(
      parse_duration("307445734561825860m").unwrap(),
      Duration::from_secs(307445734561825860 * 60)
    );

    let config_toml = ConfigToml::parse("attempt_timeout = \"999999999999999999m\"\n").unwrap();
    assert!(FallbackConfig::try_from(config_toml).is_err());
  }

  #[test]
  fn test_empty_toml_is_default() {
    let config_toml = ConfigToml::parse("").unwrap();
    assert_eq!(config_toml, ConfigToml::default());
    let config = FallbackConfig::try_from(config_toml).unwrap();
    assert_eq!(config, FallbackConfig::default());
  }

  #[test]
  fn test_unknown_fields_are_ignored() {
    let config_toml = ConfigToml::parse("origin_fallback_alowed = false\nhttp3_enabled = false\n").unwrap();
    assert_eq!(config_toml.origin_fallback_allowed, None);
    assert_eq!(config_toml.http3_enabled, Some(false));
  }
}
