use crate::{
  record::{EndpointRecord, SvcbAnswer, normalize_name},
  trace::*,
};

/// ECH coverage of an endpoint set. Exactly one variant holds for any set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EchCoverage {
  /// Non-empty set where every record carries an ECH config
  All,
  /// No record carries an ECH config, including the empty set
  None,
  /// Some records carry an ECH config and some do not
  Mixed,
}

/// Ordered alternative endpoints of a single origin, built once per HTTPS answer and immutable afterwards
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointSet {
  origin: String,
  /// Sorted ascending by priority, equal priorities in answer order
  records: Vec<EndpointRecord>,
  coverage: EchCoverage,
  /// Every record sets `no-default-alpn`, so none of them is used
  all_no_default_alpn: bool,
}

impl EndpointSet {
  /// Build a set from already validated records
  pub fn new(origin: &str, mut records: Vec<EndpointRecord>) -> Self {
    // Vec::sort_by_key is stable
    records.sort_by_key(|r| r.priority());
    let coverage = Self::coverage_of(&records);
    let all_no_default_alpn = !records.is_empty() && records.iter().all(|r| r.no_default_alpn());
    Self {
      origin: normalize_name(origin),
      records,
      coverage,
      all_no_default_alpn,
    }
  }

  /// Build a set from decoded answers. Malformed records are dropped with a diagnostic.
  pub fn from_answers(origin: &str, answers: &[SvcbAnswer]) -> Self {
    let records = answers
      .iter()
      .filter_map(|answer| match EndpointRecord::try_from(answer) {
        Ok(record) => Some(record),
        Err(e) => {
          warn!("Dropping HTTPS record of {} (priority {}): {}", origin, answer.priority, e);
          None
        }
      })
      .collect::<Vec<_>>();
    debug!(
      "Built endpoint set for {} with {} of {} records",
      origin,
      records.len(),
      answers.len()
    );
    let set = Self::new(origin, records);
    if set.all_no_default_alpn {
      warn!("Every HTTPS record of {} sets no-default-alpn, not using its endpoints", set.origin);
    }
    set
  }

  /// An origin without alternative endpoints
  pub fn empty(origin: &str) -> Self {
    Self::new(origin, Vec::new())
  }

  fn coverage_of(records: &[EndpointRecord]) -> EchCoverage {
    let with_ech = records.iter().filter(|r| r.has_ech()).count();
    match with_ech {
      0 => EchCoverage::None,
      n if n == records.len() => EchCoverage::All,
      _ => EchCoverage::Mixed,
    }
  }

  pub fn origin(&self) -> &str {
    &self.origin
  }

  pub fn records(&self) -> &[EndpointRecord] {
    &self.records
  }

  pub fn len(&self) -> usize {
    self.records.len()
  }

  pub fn is_empty(&self) -> bool {
    self.records.is_empty()
  }

  pub fn ech_coverage(&self) -> EchCoverage {
    self.coverage
  }

  pub fn all_have_ech(&self) -> bool {
    self.coverage == EchCoverage::All
  }

  pub fn none_have_ech(&self) -> bool {
    self.coverage == EchCoverage::None
  }

  pub fn mixed_ech(&self) -> bool {
    self.coverage == EchCoverage::Mixed
  }

  /// Non-empty set where every record sets `no-default-alpn`. Such a set offers no usable endpoint.
  pub fn all_no_default_alpn(&self) -> bool {
    self.all_no_default_alpn
  }
}
