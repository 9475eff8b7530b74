mod cache;
pub mod config;
mod connector;
mod constants;
mod endpoint_set;
mod error;
mod exclusion;
mod gate;
mod orchestrator;
mod policy;
mod record;
mod report;
mod result_log;
mod source;
mod transport;


#[allow(unused)]
pub(crate) mod trace {
  pub(crate) use tracing::{debug, error, info, trace, warn};
}

pub use cache::{CacheStats, EndpointSetCache};
pub use config::{ConfigBuilder, ConfigToml, FallbackConfig};
pub use connector::{ConnectRequest, Connector, Script, ScriptedConnection, ScriptedConnector};
pub use endpoint_set::{EchCoverage, EndpointSet};
pub use error::{ConnectError, FallbackError, RecordError, SourceError};
pub use exclusion::{ExclusionEpoch, ExclusionKey, ExclusionRegistry};
pub use gate::{BlockReason, GateDecision, OriginFallbackGate};
pub use orchestrator::{FallbackOrchestrator, FallbackOutcome, ResetSignal};
pub use policy::ConnectionAttemptPolicy;
pub use record::{EndpointRecord, EndpointRecordBuilder, SvcParam, SvcbAnswer};
pub use report::{AttemptOutcome, AttemptRecord, AttemptTarget, FallbackReport, SucceededVia};
pub use source::{CachingSvcbResolver, MockSvcbSource, SvcbSource};
pub use transport::{RecordTransports, Transport};
