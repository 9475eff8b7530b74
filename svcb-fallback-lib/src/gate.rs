use crate::{
  config::FallbackConfig, endpoint_set::EndpointSet, exclusion::ExclusionEpoch, policy::ConnectionAttemptPolicy,
};

/// Why falling back to the plain origin address was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
  /// Origin fallback is disabled by configuration
  OriginFallbackDisabled,
  /// Every advertised endpoint carries ECH and all of them failed
  AllEndpointsRequireEch,
}

impl std::fmt::Display for BlockReason {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::OriginFallbackDisabled => write!(f, "origin fallback is disabled"),
      Self::AllEndpointsRequireEch => write!(f, "every advertised endpoint requires ECH"),
    }
  }
}

/// Outcome of the origin fallback gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
  Allowed,
  Blocked(BlockReason),
}

impl GateDecision {
  pub fn is_allowed(&self) -> bool {
    matches!(self, Self::Allowed)
  }
}

/// Decides whether a connection may fall back to the origin's plain address record.
///
/// - Strict mode (`origin_fallback_allowed == false`): always refused.
/// - Otherwise refused only when every record carries ECH and every record is exhausted;
///   the plain origin would then be a downgrade every advertised alternative opted out of.
#[derive(Debug, Clone)]
pub struct OriginFallbackGate {
  origin_fallback_allowed: bool,
  policy: ConnectionAttemptPolicy,
}

impl Default for OriginFallbackGate {
  fn default() -> Self {
    Self::new(&FallbackConfig::default())
  }
}

impl OriginFallbackGate {
  pub fn new(config: &FallbackConfig) -> Self {
    Self {
      origin_fallback_allowed: config.origin_fallback_allowed,
      policy: ConnectionAttemptPolicy::new(config),
    }
  }

  pub fn allowed(&self, set: &EndpointSet, exclusions: &ExclusionEpoch) -> GateDecision {
    if !self.origin_fallback_allowed {
      return GateDecision::Blocked(BlockReason::OriginFallbackDisabled);
    }
    if set.all_have_ech() && self.policy.is_exhausted(set, exclusions) {
      return GateDecision::Blocked(BlockReason::AllEndpointsRequireEch);
    }
    GateDecision::Allowed
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{ExclusionRegistry, record::EndpointRecordBuilder};
  use bytes::Bytes;

  fn set_of(ech: &[bool]) -> EndpointSet {
    let records = ech
      .iter()
      .enumerate()
      .map(|(i, has_ech)| {
        let mut builder = EndpointRecordBuilder::default();
        builder
          .priority(i as u16 + 1)
          .target_name(format!("t{i}.example.com"))
          .alpn(["h2"]);
        if *has_ech {
          builder.ech_config(Bytes::from_static(b"ech"));
        }
        builder.build().unwrap()
      })
      .collect();
    EndpointSet::new("example.com", records)
  }

  fn exhaust(set: &EndpointSet) -> ExclusionEpoch {
    let policy = ConnectionAttemptPolicy::default();
    let exclusions = ExclusionRegistry::new().snapshot();
    for record in set.records() {
      exclusions.exclude(&policy.exclusion_key(set, record));
    }
    exclusions
  }

  fn gate(allowed: bool) -> OriginFallbackGate {
    OriginFallbackGate::new(&FallbackConfig {
      origin_fallback_allowed: allowed,
      ..Default::default()
    })
  }

  #[test]
  fn test_all_ech_exhausted_is_refused_even_when_allowed() {
    for n in 1..=4 {
      let set = set_of(&vec![true; n]);
      let exclusions = exhaust(&set);
      assert_eq!(
        gate(true).allowed(&set, &exclusions),
        GateDecision::Blocked(BlockReason::AllEndpointsRequireEch)
      );
      assert_eq!(
        gate(false).allowed(&set, &exclusions),
        GateDecision::Blocked(BlockReason::OriginFallbackDisabled)
      );
    }
  }

  #[test]
  fn test_no_ech_follows_configuration() {
    for n in 0..=3 {
      let set = set_of(&vec![false; n]);
      assert!(set.none_have_ech());
      let exclusions = exhaust(&set);
      assert!(gate(true).allowed(&set, &exclusions).is_allowed());
      assert!(!gate(false).allowed(&set, &exclusions).is_allowed());
    }
  }

  #[test]
  fn test_mixed_ech_follows_configuration_after_exhaustion() {
    let set = set_of(&[true, true, false]);
    assert!(set.mixed_ech());
    let exclusions = exhaust(&set);
    assert!(gate(true).allowed(&set, &exclusions).is_allowed());
    assert!(!gate(false).allowed(&set, &exclusions).is_allowed());
  }
}
