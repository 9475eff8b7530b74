//! HTTPS record source abstractions
//!
//! A [`SvcbSource`] yields decoded HTTPS answers for an origin, e.g. from a DoH transport.
//! [`CachingSvcbResolver`] turns those answers into endpoint sets and caches them.

use crate::{
  cache::EndpointSetCache,
  config::FallbackConfig,
  endpoint_set::EndpointSet,
  error::SourceError,
  orchestrator::ResetSignal,
  record::{SvcbAnswer, normalize_name},
  trace::*,
};
use std::{
  collections::HashMap,
  sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
  },
  time::Duration,
};

/// Trait for HTTPS record lookup strategies
#[async_trait::async_trait]
pub trait SvcbSource: Send + Sync {
  /// Look up the HTTPS answers of an origin
  async fn lookup(&self, origin: &str) -> Result<Vec<SvcbAnswer>, SourceError>;
}

/// Resolver building endpoint sets from a source, with caching
pub struct CachingSvcbResolver<S> {
  source: S,
  cache: EndpointSetCache,
}

impl<S: SvcbSource> CachingSvcbResolver<S> {
  /// Create a new caching resolver sized by the configuration
  pub fn new(source: S, config: &FallbackConfig) -> Self {
    Self {
      source,
      cache: EndpointSetCache::new(config.endpoint_set_cache_size),
    }
  }

  /// Get the underlying cache
  pub fn cache(&self) -> &EndpointSetCache {
    &self.cache
  }

  /// Drop every cached endpoint set when the signal invalidates cached answers, so the next resolution
  /// rebuilds the set from a fresh lookup. Returns whether the cache was cleared.
  pub fn handle_reset_signal(&self, signal: ResetSignal) -> bool {
    match signal {
      ResetSignal::CacheCleared | ResetSignal::OperatorRequest => {
        let dropped = self.cache.len();
        self.cache.clear();
        info!("Endpoint set cache cleared by {}, dropped {} set(s)", signal, dropped);
        true
      }
      ResetSignal::ConfigurationChanged => false,
    }
  }

  /// Endpoint set of the origin. A failed lookup yields an empty set, which is not cached,
  /// so the origin is reached through its plain address if the gate allows it.
  pub async fn resolve(&self, origin: &str) -> Arc<EndpointSet> {
    let origin = normalize_name(origin);
    if let Some(set) = self.cache.get(&origin) {
      trace!("Endpoint set cache hit: {}", origin);
      return set;
    }

    match self.source.lookup(&origin).await {
      Ok(answers) => {
        let ttl = answers
          .iter()
          .map(|a| a.ttl)
          .min()
          .map(|ttl| Duration::from_secs(ttl as u64))
          .unwrap_or_default();
        let set = EndpointSet::from_answers(&origin, &answers);
        self.cache.insert(set, ttl)
      }
      Err(SourceError::NoRecords(_)) => {
        debug!("No HTTPS records for {}", origin);
        Arc::new(EndpointSet::empty(&origin))
      }
      Err(e) => {
        warn!("{}", e);
        Arc::new(EndpointSet::empty(&origin))
      }
    }
  }
}

/* ---------------------------------------------------------- */
/// Mock HTTPS record source for testing
pub struct MockSvcbSource {
  responses: HashMap<String, Result<Vec<SvcbAnswer>, String>>,
  lookups: AtomicUsize,
}

impl MockSvcbSource {
  /// Create a new mock source without any records
  pub fn new() -> Self {
    Self {
      responses: HashMap::new(),
      lookups: AtomicUsize::new(0),
    }
  }

  /// Add mock answers for an origin
  pub fn add_answers(&mut self, origin: &str, answers: Vec<SvcbAnswer>) {
    self.responses.insert(normalize_name(origin), Ok(answers));
  }

  /// Make lookups of an origin fail
  pub fn add_failure(&mut self, origin: &str, reason: &str) {
    self.responses.insert(normalize_name(origin), Err(reason.to_string()));
  }

  /// Set answers of an origin, builder style
  pub fn with_answers(mut self, origin: &str, answers: Vec<SvcbAnswer>) -> Self {
    self.add_answers(origin, answers);
    self
  }

  /// Number of lookups served so far
  pub fn lookups(&self) -> usize {
    self.lookups.load(Ordering::Relaxed)
  }
}

impl Default for MockSvcbSource {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait::async_trait]
impl SvcbSource for MockSvcbSource {
  async fn lookup(&self, origin: &str) -> Result<Vec<SvcbAnswer>, SourceError> {
    self.lookups.fetch_add(1, Ordering::Relaxed);
    match self.responses.get(&normalize_name(origin)) {
      Some(Ok(answers)) => Ok(answers.clone()),
      Some(Err(reason)) => Err(SourceError::LookupFailed {
        origin: origin.to_string(),
        reason: reason.clone(),
      }),
      None => Err(SourceError::NoRecords(origin.to_string())),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn answers() -> Vec<SvcbAnswer> {
    vec![
      SvcbAnswer::new("example.com", 300, 1, Some("a.example.com"))
        .with_presentation_param("alpn", "h3,h2")
        .unwrap(),
      SvcbAnswer::new("example.com", 60, 2, Some("."))
        .with_presentation_param("port", "8443")
        .unwrap(),
    ]
  }

  #[tokio::test(start_paused = true)]
  async fn test_caching_resolver() {
    let source = MockSvcbSource::new().with_answers("example.com", answers());
    let resolver = CachingSvcbResolver::new(source, &FallbackConfig::default());

    let set = resolver.resolve("Example.com.").await;
    assert_eq!(set.len(), 2);
    assert_eq!(set.records()[1].target_name(), "example.com");
    assert_eq!(set.records()[1].port(), Some(8443));

    // served from the cache until the smallest TTL expires
    resolver.resolve("example.com").await;
    assert_eq!(resolver.source.lookups(), 1);
    tokio::time::advance(Duration::from_secs(60)).await;
    resolver.resolve("example.com").await;
    assert_eq!(resolver.source.lookups(), 2);
  }

  #[tokio::test]
  async fn test_lookup_failure_yields_empty_set() {
    let mut source = MockSvcbSource::new();
    source.add_failure("broken.example", "SERVFAIL");
    let resolver = CachingSvcbResolver::new(source, &FallbackConfig::default());

    let set = resolver.resolve("broken.example").await;
    assert!(set.is_empty());
    let set = resolver.resolve("unknown.example").await;
    assert!(set.is_empty());
    assert!(resolver.cache().is_empty());
  }

  #[tokio::test]
  async fn test_reset_signal_drops_cached_sets() {
    let source = MockSvcbSource::new().with_answers("example.com", answers());
    let resolver = CachingSvcbResolver::new(source, &FallbackConfig::default());

    let before = resolver.resolve("example.com").await;
    assert!(!resolver.handle_reset_signal(ResetSignal::ConfigurationChanged));
    assert!(Arc::ptr_eq(&before, &resolver.resolve("example.com").await));
    assert_eq!(resolver.source.lookups(), 1);

    assert!(resolver.handle_reset_signal(ResetSignal::CacheCleared));
    assert!(resolver.cache().is_empty());
    let after = resolver.resolve("example.com").await;
    assert!(!Arc::ptr_eq(&before, &after));
    assert_eq!(resolver.source.lookups(), 2);
    assert_eq!(resolver.cache().len(), 1);
  }

  #[tokio::test]
  async fn test_mock_source_not_found() {
    let source = MockSvcbSource::new();
    let result = source.lookup("notfound.example").await;
    assert!(matches!(result.unwrap_err(), SourceError::NoRecords(_)));
  }
}
