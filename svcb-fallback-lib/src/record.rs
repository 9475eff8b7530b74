//! HTTPS/SVCB answer records and the endpoint records derived from them
//!
//! The core does not parse DNS wire format. It consumes answers that a DoH transport already decoded
//! into [`SvcbAnswer`], whose parameters are the closed [`SvcParam`] enum.

use crate::{error::RecordError, transport::RecordTransports};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use bytes::Bytes;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Normalizes a DNS name for comparison: lowercase, without the trailing root dot
pub(crate) fn normalize_name(name: &str) -> String {
  name.strip_suffix('.').unwrap_or(name).to_ascii_lowercase()
}

/// Validates if the given name follows basic DNS naming rules.
/// Underscores are accepted since service names like `_8443._https.example.com` are legal targets.
fn validate_name(name: &str) -> bool {
  let name = name.strip_suffix('.').unwrap_or(name);
  !name.is_empty()
    && name.len() <= 253
    && name
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_')
    && !name.starts_with('.')
    && !name.contains("..")
}

/* ---------------------------------------------------------- */
/// A single SvcParam of an HTTPS/SVCB record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SvcParam {
  /// Keys the client must understand to use the record
  Mandatory(Vec<String>),
  /// Advertised ALPN identifiers
  Alpn(Vec<String>),
  /// `http/1.1` is not implied
  NoDefaultAlpn,
  /// Port override
  Port(u16),
  /// IPv4 addresses of the target
  Ipv4Hint(Vec<Ipv4Addr>),
  /// Encrypted ClientHello configuration list, opaque
  Ech(Bytes),
  /// IPv6 addresses of the target
  Ipv6Hint(Vec<Ipv6Addr>),
  /// Any other key, as `keyNNNNN`
  Unknown { key: u16, value: Bytes },
}

impl SvcParam {
  /// Presentation name of the key
  pub fn key_name(&self) -> String {
    match self {
      Self::Mandatory(_) => "mandatory".to_string(),
      Self::Alpn(_) => "alpn".to_string(),
      Self::NoDefaultAlpn => "no-default-alpn".to_string(),
      Self::Port(_) => "port".to_string(),
      Self::Ipv4Hint(_) => "ipv4hint".to_string(),
      Self::Ech(_) => "ech".to_string(),
      Self::Ipv6Hint(_) => "ipv6hint".to_string(),
      Self::Unknown { key, .. } => format!("key{key}"),
    }
  }

  /// Parse a parameter from its presentation format, e.g., `("alpn", "h2,h3")` or `("port", "8443")`.
  /// `echconfig` is accepted as a legacy alias of `ech`.
  pub fn parse(key: &str, value: &str) -> Result<Self, RecordError> {
    let invalid = |reason: String| RecordError::InvalidParamValue {
      key: key.to_string(),
      reason,
    };
    let list = |value: &str| -> Vec<String> {
      value
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
    };

    match key.to_ascii_lowercase().as_str() {
      "mandatory" => Ok(Self::Mandatory(list(value))),
      "alpn" => {
        let ids = list(value);
        if ids.is_empty() {
          return Err(invalid("empty ALPN list".to_string()));
        }
        Ok(Self::Alpn(ids))
      }
      "no-default-alpn" => Ok(Self::NoDefaultAlpn),
      "port" => value
        .trim()
        .parse::<u16>()
        .map(Self::Port)
        .map_err(|e| invalid(e.to_string())),
      "ipv4hint" => list(value)
        .iter()
        .map(|s| s.parse::<Ipv4Addr>())
        .collect::<Result<Vec<_>, _>>()
        .map(Self::Ipv4Hint)
        .map_err(|e| invalid(e.to_string())),
      "ipv6hint" => list(value)
        .iter()
        .map(|s| s.parse::<Ipv6Addr>())
        .collect::<Result<Vec<_>, _>>()
        .map(Self::Ipv6Hint)
        .map_err(|e| invalid(e.to_string())),
      "ech" | "echconfig" => BASE64
        .decode(value.trim())
        .map(|v| Self::Ech(Bytes::from(v)))
        .map_err(|e| invalid(e.to_string())),
      other => match other.strip_prefix("key").and_then(|n| n.parse::<u16>().ok()) {
        Some(key) => Ok(Self::Unknown {
          key,
          value: Bytes::copy_from_slice(value.as_bytes()),
        }),
        None => Err(RecordError::UnknownParamKey(other.to_string())),
      },
    }
  }
}

/* ---------------------------------------------------------- */
/// A decoded HTTPS/SVCB answer record as delivered by the DoH transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SvcbAnswer {
  /// Owner name of the record, i.e., the origin
  pub owner: String,
  /// Time to live in seconds
  pub ttl: u32,
  /// SvcPriority, 0 is AliasMode
  pub priority: u16,
  /// TargetName, `.` refers to the owner itself
  pub target_name: Option<String>,
  /// SvcParams in answer order
  pub params: Vec<SvcParam>,
}

impl SvcbAnswer {
  /// Create an answer without parameters
  pub fn new(owner: &str, ttl: u32, priority: u16, target_name: Option<&str>) -> Self {
    Self {
      owner: owner.to_string(),
      ttl,
      priority,
      target_name: target_name.map(|s| s.to_string()),
      params: Vec::new(),
    }
  }

  /// Append a parameter
  pub fn with_param(mut self, param: SvcParam) -> Self {
    self.params.push(param);
    self
  }

  /// Append a parameter given in presentation format
  pub fn with_presentation_param(self, key: &str, value: &str) -> Result<Self, RecordError> {
    let param = SvcParam::parse(key, value)?;
    Ok(self.with_param(param))
  }
}

/* ---------------------------------------------------------- */
/// A single alternative service endpoint of an origin
#[derive(Debug, Clone, PartialEq, Eq, derive_builder::Builder)]
#[builder(build_fn(validate = "Self::validate", error = "RecordError"))]
pub struct EndpointRecord {
  /// Lower value is preferred
  priority: u16,
  /// Name to connect to
  #[builder(setter(into))]
  target_name: String,
  /// Advertised ALPN identifiers without duplicates, in advertised order
  #[builder(setter(custom), default)]
  alpn: Vec<String>,
  /// Whether `http/1.1` is excluded from the implied ALPN set
  #[builder(default)]
  no_default_alpn: bool,
  /// Port override
  #[builder(setter(strip_option), default)]
  port: Option<u16>,
  /// Opaque ECH configuration list
  #[builder(setter(custom), default)]
  ech_config: Option<Bytes>,
  #[builder(default)]
  ipv4_hint: Vec<Ipv4Addr>,
  #[builder(default)]
  ipv6_hint: Vec<Ipv6Addr>,
}

impl EndpointRecordBuilder {
  /// Set the ALPN identifiers; duplicates are dropped keeping the first occurrence
  pub fn alpn<I, S>(&mut self, ids: I) -> &mut Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let mut deduped: Vec<String> = Vec::new();
    for id in ids.into_iter().map(Into::into) {
      if !deduped.contains(&id) {
        deduped.push(id);
      }
    }
    self.alpn = Some(deduped);
    self
  }

  /// Set the ECH configuration list
  pub fn ech_config(&mut self, config: impl Into<Bytes>) -> &mut Self {
    self.ech_config = Some(Some(config.into()));
    self
  }

  fn validate(&self) -> Result<(), RecordError> {
    if let Some(name) = &self.target_name {
      if !validate_name(name) {
        return Err(RecordError::InvalidTargetName(name.clone()));
      }
      if self.priority == Some(0) {
        return Err(RecordError::AliasMode(name.clone()));
      }
    }
    Ok(())
  }
}

impl From<derive_builder::UninitializedFieldError> for RecordError {
  fn from(e: derive_builder::UninitializedFieldError) -> Self {
    match e.field_name() {
      "target_name" => RecordError::MissingTargetName,
      field => RecordError::InvalidParamValue {
        key: field.to_string(),
        reason: "missing".to_string(),
      },
    }
  }
}

impl EndpointRecord {
  pub fn priority(&self) -> u16 {
    self.priority
  }

  pub fn target_name(&self) -> &str {
    &self.target_name
  }

  pub fn alpn(&self) -> &[String] {
    &self.alpn
  }

  pub fn no_default_alpn(&self) -> bool {
    self.no_default_alpn
  }

  pub fn port(&self) -> Option<u16> {
    self.port
  }

  /// Port override, or the given scheme default
  pub fn effective_port(&self, default_port: u16) -> u16 {
    self.port.unwrap_or(default_port)
  }

  pub fn ech_config(&self) -> Option<&Bytes> {
    self.ech_config.as_ref()
  }

  /// Whether the record opts into Encrypted ClientHello
  pub fn has_ech(&self) -> bool {
    self.ech_config.is_some()
  }

  /// IPv4 hints followed by IPv6 hints
  pub fn ip_hints(&self) -> Vec<IpAddr> {
    self
      .ipv4_hint
      .iter()
      .copied()
      .map(IpAddr::V4)
      .chain(self.ipv6_hint.iter().copied().map(IpAddr::V6))
      .collect()
  }

  /// Transports usable for this record under the given switches
  pub fn transports(&self, http2_enabled: bool, http3_enabled: bool) -> RecordTransports {
    RecordTransports::select(&self.alpn, self.no_default_alpn, http2_enabled, http3_enabled)
  }
}

impl std::fmt::Display for EndpointRecord {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{} {}", self.priority, self.target_name)?;
    if let Some(port) = self.port {
      write!(f, ":{port}")?;
    }
    Ok(())
  }
}

impl TryFrom<&SvcbAnswer> for EndpointRecord {
  type Error = RecordError;

  fn try_from(answer: &SvcbAnswer) -> Result<Self, Self::Error> {
    let target = answer.target_name.as_deref().ok_or(RecordError::MissingTargetName)?;
    let target = match target {
      "." | "" => normalize_name(&answer.owner),
      name => normalize_name(name),
    };

    let mut builder = EndpointRecordBuilder::default();
    builder.priority(answer.priority).target_name(target);

    let mut seen: Vec<String> = Vec::with_capacity(answer.params.len());
    let mut mandatory: Vec<String> = Vec::new();
    for param in answer.params.iter() {
      let key = param.key_name();
      if seen.contains(&key) {
        return Err(RecordError::DuplicatedParam(key));
      }
      seen.push(key);

      match param {
        SvcParam::Mandatory(keys) => mandatory = keys.clone(),
        SvcParam::Alpn(ids) => {
          builder.alpn(ids.iter().cloned());
        }
        SvcParam::NoDefaultAlpn => {
          builder.no_default_alpn(true);
        }
        SvcParam::Port(port) => {
          builder.port(*port);
        }
        SvcParam::Ipv4Hint(addrs) => {
          builder.ipv4_hint(addrs.clone());
        }
        SvcParam::Ech(config) => {
          builder.ech_config(config.clone());
        }
        SvcParam::Ipv6Hint(addrs) => {
          builder.ipv6_hint(addrs.clone());
        }
        SvcParam::Unknown { .. } => {}
      }
    }

    // Keys we do not interpret must not be mandatory
    if let Some(key) = mandatory.iter().find(|k| k.starts_with("key")) {
      return Err(RecordError::InvalidParamValue {
        key: "mandatory".to_string(),
        reason: format!("unsupported mandatory key {key}"),
      });
    }

    builder.build()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_presentation_params() {
    assert_eq!(
      SvcParam::parse("alpn", "h2,h3").unwrap(),
      SvcParam::Alpn(vec!["h2".to_string(), "h3".to_string()])
    );
    assert_eq!(SvcParam::parse("port", "8443").unwrap(), SvcParam::Port(8443));
    assert_eq!(SvcParam::parse("no-default-alpn", "").unwrap(), SvcParam::NoDefaultAlpn);
    assert_eq!(
      SvcParam::parse("ipv4hint", "192.0.2.1,192.0.2.2").unwrap(),
      SvcParam::Ipv4Hint(vec![Ipv4Addr::new(192, 0, 2, 1), Ipv4Addr::new(192, 0, 2, 2)])
    );
    assert_eq!(
      SvcParam::parse("echconfig", "AQID").unwrap(),
      SvcParam::Ech(Bytes::from_static(&[1, 2, 3]))
    );
    assert!(matches!(
      SvcParam::parse("key65000", "opaque").unwrap(),
      SvcParam::Unknown { key: 65000, .. }
    ));
  }

  #[test]
  fn test_parse_presentation_params_invalid() {
    assert!(matches!(
      SvcParam::parse("port", "65536"),
      Err(RecordError::InvalidParamValue { .. })
    ));
    assert!(matches!(
      SvcParam::parse("alpn", ","),
      Err(RecordError::InvalidParamValue { .. })
    ));
    assert!(matches!(
      SvcParam::parse("ech", "not base64!"),
      Err(RecordError::InvalidParamValue { .. })
    ));
    assert!(matches!(
      SvcParam::parse("bogus", "1"),
      Err(RecordError::UnknownParamKey(_))
    ));
  }

  #[test]
  fn test_record_from_answer() {
    let answer = SvcbAnswer::new("test.fallback.com", 55, 4, Some("Foo.Example.com."))
      .with_presentation_param("alpn", "h2,h3,h2")
      .unwrap()
      .with_presentation_param("port", "8443")
      .unwrap()
      .with_presentation_param("ech", "AQID")
      .unwrap()
      .with_presentation_param("ipv6hint", "2001:db8::1")
      .unwrap();
    let record = EndpointRecord::try_from(&answer).unwrap();

    assert_eq!(record.priority(), 4);
    assert_eq!(record.target_name(), "foo.example.com");
    assert_eq!(record.alpn(), &["h2".to_string(), "h3".to_string()]);
    assert_eq!(record.port(), Some(8443));
    assert_eq!(record.effective_port(443), 8443);
    assert!(record.has_ech());
    assert_eq!(record.ip_hints(), vec!["2001:db8::1".parse::<IpAddr>().unwrap()]);
  }

  #[test]
  fn test_record_in_place_target() {
    let answer = SvcbAnswer::new("Origin.example.", 60, 1, Some("."));
    let record = EndpointRecord::try_from(&answer).unwrap();
    assert_eq!(record.target_name(), "origin.example");
    assert_eq!(record.port(), None);
    assert_eq!(record.effective_port(443), 443);
    assert!(!record.has_ech());
  }

  #[test]
  fn test_malformed_records() {
    let missing = SvcbAnswer::new("example.com", 60, 1, None);
    assert_eq!(EndpointRecord::try_from(&missing), Err(RecordError::MissingTargetName));

    let alias = SvcbAnswer::new("example.com", 60, 0, Some("alias.example.net"));
    assert!(matches!(EndpointRecord::try_from(&alias), Err(RecordError::AliasMode(_))));

    let invalid = SvcbAnswer::new("example.com", 60, 1, Some("bad..name"));
    assert!(matches!(
      EndpointRecord::try_from(&invalid),
      Err(RecordError::InvalidTargetName(_))
    ));

    let duplicated = SvcbAnswer::new("example.com", 60, 1, Some("a.example.com"))
      .with_param(SvcParam::Port(443))
      .with_param(SvcParam::Port(8443));
    assert!(matches!(
      EndpointRecord::try_from(&duplicated),
      Err(RecordError::DuplicatedParam(_))
    ));

    let mandatory_unknown = SvcbAnswer::new("example.com", 60, 1, Some("a.example.com"))
      .with_param(SvcParam::Mandatory(vec!["key65000".to_string()]))
      .with_presentation_param("key65000", "x")
      .unwrap();
    assert!(EndpointRecord::try_from(&mandatory_unknown).is_err());
  }

  #[test]
  fn test_builder() {
    let record = EndpointRecordBuilder::default()
      .priority(2)
      .target_name("svc.example.com")
      .alpn(["h3", "h3"])
      .no_default_alpn(true)
      .port(4433)
      .ech_config(Bytes::from_static(b"ech"))
      .build()
      .unwrap();
    assert_eq!(record.alpn(), &["h3".to_string()]);
    assert_eq!(record.to_string(), "2 svc.example.com:4433");

    let missing = EndpointRecordBuilder::default().priority(2).build();
    assert_eq!(missing, Err(RecordError::MissingTargetName));
  }
}
