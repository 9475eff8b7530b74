use crate::{record::EndpointRecord, transport::Transport};

/// What a connection attempt was made to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptTarget {
  /// An advertised alternative endpoint
  Endpoint(EndpointRecord),
  /// The plain origin address
  Origin(String),
}

impl std::fmt::Display for AttemptTarget {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::Endpoint(record) => write!(f, "{}", record),
      Self::Origin(origin) => write!(f, "origin {}", origin),
    }
  }
}

/// How a connection attempt ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
  Succeeded,
  /// Failed with the given reason; the endpoint is excluded
  Failed(String),
  /// Lost a race or the resolution was cancelled; the endpoint is not excluded
  Cancelled,
}

impl AttemptOutcome {
  pub fn is_failed(&self) -> bool {
    matches!(self, Self::Failed(_))
  }
}

/// One entry of the attempt history of a resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptRecord {
  pub target: AttemptTarget,
  pub transport: Transport,
  pub outcome: AttemptOutcome,
}

impl std::fmt::Display for AttemptRecord {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match &self.outcome {
      AttemptOutcome::Succeeded => write!(f, "{} [{}] succeeded", self.target, self.transport),
      AttemptOutcome::Failed(reason) => write!(f, "{} [{}] failed: {}", self.target, self.transport, reason),
      AttemptOutcome::Cancelled => write!(f, "{} [{}] cancelled", self.target, self.transport),
    }
  }
}

/// Where the winning connection goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SucceededVia {
  Endpoint(EndpointRecord),
  Origin,
}

/// Summary of a successful resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackReport {
  pub origin: String,
  pub succeeded_via: SucceededVia,
  pub transport: Transport,
  /// Every attempt in the order it was started, the winning one included
  pub attempted: Vec<AttemptRecord>,
}

impl FallbackReport {
  /// Target name of the winning endpoint, or the origin name
  pub fn winner_name(&self) -> &str {
    match &self.succeeded_via {
      SucceededVia::Endpoint(record) => record.target_name(),
      SucceededVia::Origin => &self.origin,
    }
  }

  pub fn via_origin(&self) -> bool {
    matches!(self.succeeded_via, SucceededVia::Origin)
  }
}

/* ---------------------------------------------------------- */
/// Attempt history of a single resolution.
/// Entries are appended when an attempt starts and completed when it ends.
#[derive(Debug, Default)]
pub(crate) struct AttemptLog {
  entries: Vec<(AttemptTarget, Transport, Option<AttemptOutcome>)>,
}

impl AttemptLog {
  /// Register a started attempt, returning its index
  pub(crate) fn start(&mut self, target: AttemptTarget, transport: Transport) -> usize {
    self.entries.push((target, transport, None));
    self.entries.len() - 1
  }

  /// Record the outcome of a started attempt. The first outcome recorded wins.
  pub(crate) fn finish(&mut self, index: usize, outcome: AttemptOutcome) {
    if let Some((_, _, slot)) = self.entries.get_mut(index) {
      slot.get_or_insert(outcome);
    }
  }

  /// Completed history. An attempt that never reported back was cancelled.
  pub(crate) fn into_records(self) -> Vec<AttemptRecord> {
    self
      .entries
      .into_iter()
      .map(|(target, transport, outcome)| AttemptRecord {
        target,
        transport,
        outcome: outcome.unwrap_or(AttemptOutcome::Cancelled),
      })
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_attempt_log() {
    let mut log = AttemptLog::default();
    let first = log.start(AttemptTarget::Origin("example.com".to_string()), Transport::Http3);
    let second = log.start(AttemptTarget::Origin("example.com".to_string()), Transport::Http2);
    log.finish(second, AttemptOutcome::Succeeded);
    log.finish(second, AttemptOutcome::Failed("late".to_string()));
    log.finish(42, AttemptOutcome::Succeeded);

    let records = log.into_records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[first].outcome, AttemptOutcome::Cancelled);
    assert_eq!(records[second].outcome, AttemptOutcome::Succeeded);
    assert_eq!(records[second].to_string(), "origin example.com [h2] succeeded");
  }
}
