use crate::{
  config::FallbackConfig,
  constants::UNSAFE_PORTS,
  endpoint_set::EndpointSet,
  exclusion::{ExclusionEpoch, ExclusionKey},
  record::EndpointRecord,
  transport::RecordTransports,
};

/// Chooses the next endpoint to attempt.
///
/// Records are walked in stored order, i.e., ascending priority with ties in answer order. A record is
/// eligible when it is not excluded and usable: its port is safe and at least one of its transports is
/// enabled. A set whose records all set `no-default-alpn` has no eligible record. A record without ECH is still eligible; whether the plain origin may be used afterwards is
/// decided separately by [`crate::OriginFallbackGate`].
#[derive(Debug, Clone)]
pub struct ConnectionAttemptPolicy {
  default_port: u16,
  http2_enabled: bool,
  http3_enabled: bool,
}

impl Default for ConnectionAttemptPolicy {
  fn default() -> Self {
    Self::new(&FallbackConfig::default())
  }
}

impl ConnectionAttemptPolicy {
  pub fn new(config: &FallbackConfig) -> Self {
    Self {
      default_port: config.default_port,
      http2_enabled: config.http2_enabled,
      http3_enabled: config.http3_enabled,
    }
  }

  /// Exclusion key of a record of the set
  pub fn exclusion_key(&self, set: &EndpointSet, record: &EndpointRecord) -> ExclusionKey {
    ExclusionKey::new(set.origin(), record.target_name(), record.effective_port(self.default_port))
  }

  /// Transports the record can be attempted with
  pub fn transports(&self, record: &EndpointRecord) -> RecordTransports {
    record.transports(self.http2_enabled, self.http3_enabled)
  }

  /// Whether the record can be attempted at all, regardless of exclusions
  pub fn is_usable(&self, record: &EndpointRecord) -> bool {
    let port = record.effective_port(self.default_port);
    if port == 0 || UNSAFE_PORTS.contains(&port) {
      return false;
    }
    !self.transports(record).is_empty()
  }

  fn eligible<'a>(
    &'a self,
    set: &'a EndpointSet,
    exclusions: &'a ExclusionEpoch,
  ) -> impl Iterator<Item = &'a EndpointRecord> + 'a {
    set
      .records()
      .iter()
      .filter(move |r| {
        !set.all_no_default_alpn() && self.is_usable(r) && !exclusions.is_excluded(&self.exclusion_key(set, r))
      })
  }

  /// First eligible record, or `None` when the set is exhausted
  pub fn next_candidate(&self, set: &EndpointSet, exclusions: &ExclusionEpoch) -> Option<EndpointRecord> {
    self.eligible(set, exclusions).next().cloned()
  }

  /// First eligible record that is a different endpoint than `current`.
  /// Used as the alternate raced against an HTTP/3 attempt.
  pub fn alternate_candidate(
    &self,
    set: &EndpointSet,
    exclusions: &ExclusionEpoch,
    current: &EndpointRecord,
  ) -> Option<EndpointRecord> {
    let current_key = self.exclusion_key(set, current);
    self
      .eligible(set, exclusions)
      .find(|r| self.exclusion_key(set, r) != current_key)
      .cloned()
  }

  /// Every record is either excluded or unusable
  pub fn is_exhausted(&self, set: &EndpointSet, exclusions: &ExclusionEpoch) -> bool {
    self.eligible(set, exclusions).next().is_none()
  }
}
