//! Origin keyed cache of endpoint sets
//!
//! An entry lives for the smallest TTL of the answers it was built from. Expired entries are dropped on access
//! and by [`EndpointSetCache::prune_expired`]; a refreshed answer replaces the set as a whole.

use crate::{
  constants::{DEFAULT_ENDPOINT_SET_CACHE_SIZE, MIN_ENDPOINT_SET_TTL_SEC},
  endpoint_set::EndpointSet,
  record::normalize_name,
  trace::*,
};
use std::{
  sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
  },
  time::Duration,
};
use tokio::time::Instant;

/// DashMap type alias, uses ahash::RandomState as hashbuilder
type DashMap<K, V> = dashmap::DashMap<K, V, ahash::RandomState>;

/// A cached endpoint set with its expiration
#[derive(Debug, Clone)]
struct CacheEntry {
  set: Arc<EndpointSet>,
  expires_at: Instant,
}

impl CacheEntry {
  fn is_expired(&self) -> bool {
    Instant::now() >= self.expires_at
  }
}

/// Statistics of the endpoint set cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
  pub size: usize,
  pub max_size: usize,
  pub expired_count: usize,
  pub hits: u64,
  pub misses: u64,
}

/// Cache of endpoint sets keyed by normalized origin name
pub struct EndpointSetCache {
  inner: DashMap<String, CacheEntry>,
  max_size: usize,
  hits: AtomicU64,
  misses: AtomicU64,
}

impl std::fmt::Debug for EndpointSetCache {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("EndpointSetCache")
      .field("size", &self.inner.len())
      .field("max_size", &self.max_size)
      .finish()
  }
}

impl Default for EndpointSetCache {
  fn default() -> Self {
    Self::new(DEFAULT_ENDPOINT_SET_CACHE_SIZE)
  }
}

impl EndpointSetCache {
  pub fn new(max_size: usize) -> Self {
    Self {
      inner: DashMap::default(),
      max_size: max_size.max(1),
      hits: AtomicU64::new(0),
      misses: AtomicU64::new(0),
    }
  }

  /// Cached set of the origin, if present and not expired
  pub fn get(&self, origin: &str) -> Option<Arc<EndpointSet>> {
    let origin = normalize_name(origin);
    // Remove expired entry
    self.inner.remove_if(&origin, |_, entry| entry.is_expired());

    match self.inner.get(&origin) {
      Some(entry) => {
        self.hits.fetch_add(1, Ordering::Relaxed);
        Some(entry.set.clone())
      }
      None => {
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
      }
    }
  }

  /// Cache the set for `ttl`, at least [`MIN_ENDPOINT_SET_TTL_SEC`] seconds.
  /// When full, expired entries are pruned first, then the entry closest to expiration is evicted.
  pub fn insert(&self, set: EndpointSet, ttl: Duration) -> Arc<EndpointSet> {
    let ttl = ttl.max(Duration::from_secs(MIN_ENDPOINT_SET_TTL_SEC));
    let origin = set.origin().to_string();

    if !self.inner.contains_key(&origin) && self.inner.len() >= self.max_size {
      self.prune_expired();
      if self.inner.len() >= self.max_size {
        self.evict_one();
      }
    }

    let set = Arc::new(set);
    self.inner.insert(
      origin,
      CacheEntry {
        set: set.clone(),
        expires_at: Instant::now() + ttl,
      },
    );
    set
  }

  pub fn remove(&self, origin: &str) -> Option<Arc<EndpointSet>> {
    self.inner.remove(&normalize_name(origin)).map(|(_, entry)| entry.set)
  }

  /// Drop every cached set
  pub fn clear(&self) {
    self.inner.clear();
  }

  /// Drop expired sets, returning how many were dropped
  pub fn prune_expired(&self) -> usize {
    let before = self.inner.len();
    self.inner.retain(|_, entry| !entry.is_expired());
    let pruned = before.saturating_sub(self.inner.len());
    if pruned > 0 {
      trace!("Pruned {} expired endpoint set(s)", pruned);
    }
    pruned
  }

  fn evict_one(&self) {
    let victim = self
      .inner
      .iter()
      .min_by_key(|entry| entry.expires_at)
      .map(|entry| entry.key().clone());
    if let Some(origin) = victim {
      debug!("Endpoint set cache full, evicting {}", origin);
      self.inner.remove(&origin);
    }
  }

  pub fn len(&self) -> usize {
    self.inner.len()
  }

  pub fn is_empty(&self) -> bool {
    self.inner.is_empty()
  }

  /// Get statistics about the cache
  pub fn stats(&self) -> CacheStats {
    CacheStats {
      size: self.inner.len(),
      max_size: self.max_size,
      expired_count: self.inner.iter().filter(|entry| entry.is_expired()).count(),
      hits: self.hits.load(Ordering::Relaxed),
      misses: self.misses.load(Ordering::Relaxed),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test(start_paused = true)]
  async fn test_entry_expires_after_ttl() {
    let cache = EndpointSetCache::new(8);
    cache.insert(EndpointSet::empty("example.com"), Duration::from_secs(30));

    assert!(cache.get("Example.com.").is_some());
    tokio::time::advance(Duration::from_secs(29)).await;
    assert!(cache.get("example.com").is_some());
    assert_eq!(cache.stats().expired_count, 0);

    tokio::time::advance(Duration::from_secs(1)).await;
    assert_eq!(cache.stats().expired_count, 1);
    assert!(cache.get("example.com").is_none());
    assert!(cache.is_empty());

    let stats = cache.stats();
    assert_eq!(stats.hits, 2);
    assert_eq!(stats.misses, 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_zero_ttl_is_raised_to_minimum() {
    let cache = EndpointSetCache::new(8);
    cache.insert(EndpointSet::empty("example.com"), Duration::ZERO);
    assert!(cache.get("example.com").is_some());
    tokio::time::advance(Duration::from_secs(MIN_ENDPOINT_SET_TTL_SEC)).await;
    assert!(cache.get("example.com").is_none());
  }

  #[tokio::test(start_paused = true)]
  async fn test_capacity_prunes_then_evicts() {
    let cache = EndpointSetCache::new(2);
    cache.insert(EndpointSet::empty("a.example"), Duration::from_secs(10));
    cache.insert(EndpointSet::empty("b.example"), Duration::from_secs(60));

    // full of live entries: the one expiring first goes
    cache.insert(EndpointSet::empty("c.example"), Duration::from_secs(60));
    assert_eq!(cache.len(), 2);
    assert!(cache.get("a.example").is_none());

    // expired entries are pruned before anything is evicted
    tokio::time::advance(Duration::from_secs(61)).await;
    cache.insert(EndpointSet::empty("d.example"), Duration::from_secs(60));
    assert_eq!(cache.len(), 1);

    // replacing an existing origin never evicts
    cache.insert(EndpointSet::empty("e.example"), Duration::from_secs(60));
    cache.insert(EndpointSet::empty("d.example"), Duration::from_secs(60));
    assert_eq!(cache.len(), 2);

    cache.clear();
    assert!(cache.is_empty());
  }
}
