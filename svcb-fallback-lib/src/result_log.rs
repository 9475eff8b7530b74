use crate::{
  error::FallbackError,
  report::{AttemptRecord, FallbackReport, SucceededVia},
  trace::info,
};

fn attempts_summary(attempted: &[AttemptRecord]) -> String {
  attempted.iter().map(|a| a.to_string()).collect::<Vec<_>>().join(", ")
}

/// Emit the terminal result of a successful resolution
pub(crate) fn success_log(report: &FallbackReport) {
  let via = match &report.succeeded_via {
    SucceededVia::Endpoint(record) => record.to_string(),
    SucceededVia::Origin => "origin".to_string(),
  };
  info!(
    name: crate::constants::log_event_names::FALLBACK_RESULT,
    "{}: connected via {} [{}] after {} attempt(s): {}",
    report.origin,
    via,
    report.transport,
    report.attempted.len(),
    attempts_summary(&report.attempted)
  );
}

/// Emit the terminal result of a failed resolution. Policy blocks are reported apart from network failures.
pub(crate) fn failure_log(error: &FallbackError) {
  let kind = if error.is_blocked_by_policy() {
    "blocked"
  } else {
    "failed"
  };
  info!(
    name: crate::constants::log_event_names::FALLBACK_RESULT,
    "{} ({}) after {} attempt(s): {}",
    error,
    kind,
    error.attempted().len(),
    attempts_summary(error.attempted())
  );
}
