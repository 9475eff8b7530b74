//! Exclusion list of endpoints that failed during the current epoch
//!
//! Exclusions never expire by time. Only [`ExclusionRegistry::reset`] clears them, and it does so wholesale
//! by installing a new generation. A resolution works on the generation it started with
//! ([`ExclusionEpoch`]), so a concurrent reset is observed either fully before or fully after it.

use crate::record::normalize_name;
use std::sync::{Arc, PoisonError, RwLock};

/// DashMap type alias, uses ahash::RandomState as hashbuilder
type DashMap<K, V> = dashmap::DashMap<K, V, ahash::RandomState>;

/// Identifies an endpoint of an origin: `(origin, target name, effective port)`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExclusionKey {
  origin: String,
  target: String,
  port: u16,
}

impl ExclusionKey {
  pub fn new(origin: &str, target: &str, port: u16) -> Self {
    Self {
      origin: normalize_name(origin),
      target: normalize_name(target),
      port,
    }
  }

  pub fn origin(&self) -> &str {
    &self.origin
  }

  pub fn target(&self) -> &str {
    &self.target
  }

  pub fn port(&self) -> u16 {
    self.port
  }
}

impl std::fmt::Display for ExclusionKey {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{} -> {}:{}", self.origin, self.target, self.port)
  }
}

/* ---------------------------------------------------------- */
#[derive(Debug)]
/// One generation of the exclusion list, sharded by origin
struct Generation {
  epoch: u64,
  excluded: DashMap<String, ahash::HashSet<(String, u16)>>,
}

impl Generation {
  fn new(epoch: u64) -> Self {
    Self {
      epoch,
      excluded: DashMap::default(),
    }
  }
}

/// Handle to the exclusion list generation a resolution works on
#[derive(Debug, Clone)]
pub struct ExclusionEpoch(Arc<Generation>);

impl ExclusionEpoch {
  /// Epoch number of this generation
  pub fn epoch(&self) -> u64 {
    self.0.epoch
  }

  /// Whether the endpoint failed in this generation
  pub fn is_excluded(&self, key: &ExclusionKey) -> bool {
    self
      .0
      .excluded
      .get(&key.origin)
      .is_some_and(|targets| targets.contains(&(key.target.clone(), key.port)))
  }

  /// Exclude the endpoint, returning false if it was already excluded
  pub fn exclude(&self, key: &ExclusionKey) -> bool {
    self
      .0
      .excluded
      .entry(key.origin.clone())
      .or_default()
      .insert((key.target.clone(), key.port))
  }

  /// Number of excluded endpoints of the origin
  pub fn excluded_count(&self, origin: &str) -> usize {
    self
      .0
      .excluded
      .get(&normalize_name(origin))
      .map(|targets| targets.len())
      .unwrap_or(0)
  }
}

/* ---------------------------------------------------------- */
/// Registry of failed endpoints, shared by concurrent resolutions of different origins
#[derive(Debug, Clone)]
pub struct ExclusionRegistry {
  current: Arc<RwLock<Arc<Generation>>>,
}

impl Default for ExclusionRegistry {
  fn default() -> Self {
    Self::new()
  }
}

impl ExclusionRegistry {
  pub fn new() -> Self {
    Self {
      current: Arc::new(RwLock::new(Arc::new(Generation::new(0)))),
    }
  }

  /// Current generation. Hold it for the whole resolution.
  pub fn snapshot(&self) -> ExclusionEpoch {
    let current = self.current.read().unwrap_or_else(PoisonError::into_inner);
    ExclusionEpoch(current.clone())
  }

  /// Current epoch number
  pub fn epoch(&self) -> u64 {
    self.snapshot().epoch()
  }

  pub fn is_excluded(&self, origin: &str, target: &str, port: u16) -> bool {
    self.snapshot().is_excluded(&ExclusionKey::new(origin, target, port))
  }

  pub fn exclude(&self, origin: &str, target: &str, port: u16) {
    self.snapshot().exclude(&ExclusionKey::new(origin, target, port));
  }

  /// Clear every exclusion of every origin and move to the next epoch
  pub fn reset(&self) -> u64 {
    let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
    let epoch = current.epoch.wrapping_add(1);
    *current = Arc::new(Generation::new(epoch));
    epoch
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_exclusion_persists_until_reset() {
    let registry = ExclusionRegistry::new();
    assert!(!registry.is_excluded("example.com", "a.example.com", 443));

    registry.exclude("example.com", "a.example.com", 443);
    for i in 0..10 {
      registry.exclude("other.com", &format!("t{i}.other.com"), 443);
      assert!(registry.is_excluded("example.com", "a.example.com", 443));
    }

    // the same target on another port or for another origin is a different endpoint
    assert!(!registry.is_excluded("example.com", "a.example.com", 8443));
    assert!(!registry.is_excluded("other.com", "a.example.com", 443));

    assert_eq!(registry.reset(), 1);
    assert!(!registry.is_excluded("example.com", "a.example.com", 443));
    assert!(!registry.is_excluded("other.com", "t0.other.com", 443));
    assert_eq!(registry.epoch(), 1);
  }

  #[test]
  fn test_names_are_normalized() {
    let registry = ExclusionRegistry::new();
    registry.exclude("Example.COM.", "A.example.com.", 443);
    assert!(registry.is_excluded("example.com", "a.example.com", 443));
  }

  #[test]
  fn test_snapshot_is_isolated_from_reset() {
    let registry = ExclusionRegistry::new();
    let before = registry.snapshot();
    let key = ExclusionKey::new("example.com", "a.example.com", 443);
    assert!(before.exclude(&key));
    assert!(!before.exclude(&key));

    registry.reset();
    let after = registry.snapshot();

    // the running resolution keeps its generation, the next one starts clean
    assert!(before.is_excluded(&key));
    assert_eq!(before.epoch(), 0);
    assert!(!after.is_excluded(&key));
    assert_eq!(after.epoch(), 1);

    // writes to a stale generation never leak into the current one
    before.exclude(&ExclusionKey::new("example.com", "b.example.com", 443));
    assert_eq!(after.excluded_count("example.com"), 0);
    assert_eq!(before.excluded_count("example.com"), 2);
  }

  #[test]
  fn test_concurrent_origins() {
    let registry = ExclusionRegistry::new();
    let handles = (0..8)
      .map(|i| {
        let registry = registry.clone();
        std::thread::spawn(move || {
          let origin = format!("origin{i}.example");
          for j in 0..50u16 {
            registry.exclude(&origin, "svc.example", j);
          }
        })
      })
      .collect::<Vec<_>>();
    for handle in handles {
      handle.join().unwrap();
    }

    let snapshot = registry.snapshot();
    for i in 0..8 {
      assert_eq!(snapshot.excluded_count(&format!("origin{i}.example")), 50);
    }
  }
}
