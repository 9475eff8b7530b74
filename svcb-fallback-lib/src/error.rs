use crate::{gate::BlockReason, report::AttemptRecord};

/// Errors in a decoded HTTPS/SVCB answer. A record failing with one of these is dropped from the endpoint set.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
  /* --------------------------------------- */
  #[error("Record has no target name")]
  MissingTargetName,

  #[error("Invalid target name: {0}")]
  InvalidTargetName(String),

  /// Priority 0 denotes AliasMode, which does not describe a service endpoint
  #[error("AliasMode record (priority 0) to {0} is not a service endpoint")]
  AliasMode(String),

  #[error("Duplicated SvcParam key: {0}")]
  DuplicatedParam(String),

  /* --------------------------------------- */
  #[error("Invalid value for SvcParam {key}: {reason}")]
  InvalidParamValue { key: String, reason: String },

  #[error("Unknown SvcParam key: {0}")]
  UnknownParamKey(String),
}

/// Failure of a single connection attempt. These never leave the orchestrator on their own;
/// they are kept in the attempt log and lead to the endpoint being excluded.
#[derive(thiserror::Error, Debug)]
pub enum ConnectError {
  #[error("IO error: {0}")]
  IoError(#[from] std::io::Error),

  #[error("Connection refused by {0}")]
  Refused(String),

  #[error("Failed to resolve {host}: {reason}")]
  DnsError { host: String, reason: String },

  #[error("TLS handshake failed: {0}")]
  TlsHandshake(String),

  #[error("QUIC handshake failed: {0}")]
  QuicHandshake(String),

  #[error("Connection attempt timed out")]
  TimedOut,

  /// The attempt task ended without producing a result, e.g. it panicked
  #[error("Connection attempt aborted: {0}")]
  Aborted(String),
}

/// Terminal failure of a whole fallback resolution
#[derive(thiserror::Error, Debug)]
pub enum FallbackError {
  /// Every advertised endpoint failed and the policy forbids using the plain origin address
  #[error("Fallback to origin {origin} blocked by policy: {reason}")]
  BlockedByPolicy {
    origin: String,
    reason: BlockReason,
    attempted: Vec<AttemptRecord>,
  },

  /// The plain origin address was tried and failed
  #[error("Origin {origin} is unreachable: {source}")]
  OriginUnreachable {
    origin: String,
    #[source]
    source: ConnectError,
    attempted: Vec<AttemptRecord>,
  },

  /// The caller cancelled the resolution
  #[error("Connection to {origin} cancelled")]
  Cancelled { origin: String, attempted: Vec<AttemptRecord> },
}

impl FallbackError {
  /// Attempts made before the failure, in the order they were started
  pub fn attempted(&self) -> &[AttemptRecord] {
    match self {
      Self::BlockedByPolicy { attempted, .. } => attempted,
      Self::OriginUnreachable { attempted, .. } => attempted,
      Self::Cancelled { attempted, .. } => attempted,
    }
  }

  /// Whether this failure is a security policy decision rather than a network failure
  pub fn is_blocked_by_policy(&self) -> bool {
    matches!(self, Self::BlockedByPolicy { .. })
  }
}

/// Errors of an HTTPS record source
#[derive(thiserror::Error, Debug)]
pub enum SourceError {
  #[error("HTTPS record lookup for {origin} failed: {reason}")]
  LookupFailed { origin: String, reason: String },

  #[error("No HTTPS records for {0}")]
  NoRecords(String),
}
