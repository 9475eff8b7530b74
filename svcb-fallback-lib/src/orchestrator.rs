//! Connection fallback across the alternative endpoints of an origin
//!
//! A resolution walks the endpoint set in priority order. Each candidate is attempted with its preferred
//! transport; an HTTP/3 attempt gets a head start of `fast_fallback_timeout`, after which an alternate attempt
//! is raced against it and the first success wins. Failed candidates are excluded for the rest of the epoch.
//! Once every candidate is exhausted, [`OriginFallbackGate`] decides whether the plain origin may be used.

use crate::{
  config::FallbackConfig,
  connector::{ConnectRequest, Connector},
  endpoint_set::EndpointSet,
  error::{ConnectError, FallbackError},
  exclusion::{ExclusionEpoch, ExclusionRegistry},
  gate::{BlockReason, GateDecision, OriginFallbackGate},
  policy::ConnectionAttemptPolicy,
  record::EndpointRecord,
  report::{AttemptLog, AttemptOutcome, AttemptTarget, FallbackReport, SucceededVia},
  result_log::{failure_log, success_log},
  source::{CachingSvcbResolver, SvcbSource},
  trace::*,
  transport::Transport,
};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Events that may clear the exclusion list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetSignal {
  /// Configuration was reloaded
  ConfigurationChanged,
  /// Cached DNS answers were flushed
  CacheCleared,
  /// Explicit request by an operator
  OperatorRequest,
}

impl std::fmt::Display for ResetSignal {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::ConfigurationChanged => write!(f, "configuration change"),
      Self::CacheCleared => write!(f, "cache clear"),
      Self::OperatorRequest => write!(f, "operator request"),
    }
  }
}

/// Established connection and how it was reached
#[derive(Debug)]
pub struct FallbackOutcome<T> {
  pub connection: T,
  pub report: FallbackReport,
}

/* ---------------------------------------------------------- */
/// A spawned connection attempt. Dropping it aborts the task.
struct AttemptTask<T> {
  /// Index in the attempt log
  index: usize,
  target: AttemptTarget,
  transport: Transport,
  handle: JoinHandle<Result<T, ConnectError>>,
  finished: bool,
}

impl<T> AttemptTask<T> {
  fn is_running(&self) -> bool {
    !self.finished
  }

  /// Wait for the attempt. Cancel safe; must not be called again once it returned.
  async fn join(&mut self) -> Result<T, ConnectError> {
    let res = (&mut self.handle).await;
    self.finished = true;
    match res {
      Ok(result) => result,
      Err(e) => Err(ConnectError::Aborted(e.to_string())),
    }
  }

  /// Abort the attempt and wait until its task is gone.
  /// Returns false without doing anything if the attempt already finished.
  async fn cancel(&mut self) -> bool {
    if self.finished {
      return false;
    }
    self.handle.abort();
    // a connection established right before the abort is dropped here
    let _ = (&mut self.handle).await;
    self.finished = true;
    true
  }

  fn succeeded_via(&self) -> SucceededVia {
    match &self.target {
      AttemptTarget::Endpoint(record) => SucceededVia::Endpoint(record.clone()),
      AttemptTarget::Origin(_) => SucceededVia::Origin,
    }
  }
}

impl<T> Drop for AttemptTask<T> {
  fn drop(&mut self) {
    self.handle.abort();
  }
}

/// Per resolution state: the endpoint set, the exclusion generation, the attempt history
struct Resolution<'a> {
  set: &'a EndpointSet,
  exclusions: ExclusionEpoch,
  log: AttemptLog,
  cancel: CancellationToken,
}

enum State {
  Idle,
  Attempting(EndpointRecord),
  OriginAttempt,
}

struct Connected<T> {
  connection: T,
  via: SucceededVia,
  transport: Transport,
}

/// Result of attempting a single candidate
enum Step<T> {
  Connected(Connected<T>),
  Failed,
  Cancelled,
}

/// Result of a whole resolution
enum Terminal<T> {
  Connected(Connected<T>),
  Blocked(BlockReason),
  OriginFailed(ConnectError),
  Cancelled,
}

enum HeadStart<T> {
  Finished(Result<T, ConnectError>),
  TimerFired,
  Cancelled,
}

enum RaceEvent<T> {
  Primary(Result<T, ConnectError>),
  Alternate(Result<T, ConnectError>),
  Cancelled,
}

/* ---------------------------------------------------------- */
/// Drives connection attempts over the endpoint set of an origin
pub struct FallbackOrchestrator<C: Connector> {
  connector: Arc<C>,
  config: FallbackConfig,
  registry: ExclusionRegistry,
  policy: ConnectionAttemptPolicy,
  gate: OriginFallbackGate,
}

impl<C: Connector> FallbackOrchestrator<C> {
  pub fn new(connector: Arc<C>, config: FallbackConfig) -> Self {
    Self {
      connector,
      policy: ConnectionAttemptPolicy::new(&config),
      gate: OriginFallbackGate::new(&config),
      registry: ExclusionRegistry::new(),
      config,
    }
  }

  /// Share an exclusion registry with other orchestrators
  pub fn with_registry(mut self, registry: ExclusionRegistry) -> Self {
    self.registry = registry;
    self
  }

  pub fn registry(&self) -> &ExclusionRegistry {
    &self.registry
  }

  pub fn config(&self) -> &FallbackConfig {
    &self.config
  }

  /// Clear the exclusion list if the configuration allows resets on signals.
  /// Returns whether the list was reset. Cached endpoint sets are dropped separately by
  /// [`CachingSvcbResolver::handle_reset_signal`].
  pub fn handle_reset_signal(&self, signal: ResetSignal) -> bool {
    if !self.config.reset_exclusion_list_on_signal {
      info!("Ignoring {}: exclusion list reset on signal is disabled", signal);
      return false;
    }
    let epoch = self.registry.reset();
    info!("Exclusion list reset by {}, now in epoch {}", signal, epoch);
    true
  }

  /// Resolve the origin's endpoint set through the resolver and connect
  pub async fn connect_to<S: SvcbSource>(
    &self,
    resolver: &CachingSvcbResolver<S>,
    origin: &str,
  ) -> Result<FallbackOutcome<C::Connection>, FallbackError> {
    let set = resolver.resolve(origin).await;
    self.connect(&set).await
  }

  /// Connect to the origin of the endpoint set
  pub async fn connect(&self, set: &EndpointSet) -> Result<FallbackOutcome<C::Connection>, FallbackError> {
    self.connect_with_cancel(set, CancellationToken::new()).await
  }

  /// Connect to the origin of the endpoint set. Cancelling the token aborts every attempt in flight.
  pub async fn connect_with_cancel(
    &self,
    set: &EndpointSet,
    cancel: CancellationToken,
  ) -> Result<FallbackOutcome<C::Connection>, FallbackError> {
    let mut ctx = Resolution {
      set,
      exclusions: self.registry.snapshot(),
      log: AttemptLog::default(),
      cancel,
    };
    debug!(
      "Connecting to {} with {} endpoint(s) ({:?} ECH) in epoch {}",
      set.origin(),
      set.len(),
      set.ech_coverage(),
      ctx.exclusions.epoch()
    );

    let terminal = self.run(&mut ctx).await;

    let origin = set.origin().to_string();
    let attempted = ctx.log.into_records();
    let error = match terminal {
      Terminal::Connected(Connected {
        connection,
        via,
        transport,
      }) => {
        let report = FallbackReport {
          origin,
          succeeded_via: via,
          transport,
          attempted,
        };
        success_log(&report);
        return Ok(FallbackOutcome { connection, report });
      }
      Terminal::Blocked(reason) => FallbackError::BlockedByPolicy {
        origin,
        reason,
        attempted,
      },
      Terminal::OriginFailed(source) => FallbackError::OriginUnreachable {
        origin,
        source,
        attempted,
      },
      Terminal::Cancelled => FallbackError::Cancelled { origin, attempted },
    };
    failure_log(&error);
    Err(error)
  }

  async fn run(&self, ctx: &mut Resolution<'_>) -> Terminal<C::Connection> {
    let mut state = State::Idle;
    loop {
      state = match state {
        State::Idle => {
          if ctx.cancel.is_cancelled() {
            return Terminal::Cancelled;
          }
          match self.policy.next_candidate(ctx.set, &ctx.exclusions) {
            Some(candidate) => State::Attempting(candidate),
            None => match self.gate.allowed(ctx.set, &ctx.exclusions) {
              GateDecision::Allowed => State::OriginAttempt,
              GateDecision::Blocked(reason) => {
                warn!("Every endpoint of {} failed, origin fallback blocked: {}", ctx.set.origin(), reason);
                return Terminal::Blocked(reason);
              }
            },
          }
        }
        State::Attempting(candidate) => match self.attempt_endpoint(ctx, candidate).await {
          Step::Connected(connected) => return Terminal::Connected(connected),
          Step::Failed => State::Idle,
          Step::Cancelled => return Terminal::Cancelled,
        },
        State::OriginAttempt => return self.attempt_origin(ctx).await,
      };
    }
  }

  /// Attempt a single candidate over its transports
  async fn attempt_endpoint(&self, ctx: &mut Resolution<'_>, candidate: EndpointRecord) -> Step<C::Connection> {
    let transports = self.policy.transports(&candidate);
    let Some(first) = transports.primary() else {
      // the policy only hands out usable records
      self.exclude(ctx, &candidate);
      return Step::Failed;
    };
    let mut primary = self.spawn(ctx, Some(&candidate), first);
    if !first.is_quic() {
      return self.await_single(ctx, &candidate, &mut primary).await;
    }

    // zero timeout: no head start, the alternate starts right away
    let head_start = if self.config.fast_fallback_timeout.is_zero() {
      HeadStart::TimerFired
    } else {
      let timer = tokio::time::sleep(self.config.fast_fallback_timeout);
      tokio::pin!(timer);
      tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => HeadStart::Cancelled,
        res = primary.join() => HeadStart::Finished(res),
        _ = &mut timer => HeadStart::TimerFired,
      }
    };

    match head_start {
      HeadStart::Cancelled => {
        self.cancel_task(ctx, &mut primary).await;
        return Step::Cancelled;
      }
      HeadStart::Finished(Ok(connection)) => return Step::Connected(self.connected(ctx, &primary, connection)),
      HeadStart::Finished(Err(e)) => {
        self.fail(ctx, &primary, &e);
        return match transports.tcp_fallback() {
          Some(tcp) => {
            let mut tcp_task = self.spawn(ctx, Some(&candidate), tcp);
            self.await_single(ctx, &candidate, &mut tcp_task).await
          }
          None => {
            self.exclude(ctx, &candidate);
            Step::Failed
          }
        };
      }
      HeadStart::TimerFired => {}
    }

    // Head start is over: race the TCP transport of the same record, or else the next candidate
    let alternate = match transports.tcp_fallback() {
      Some(tcp) => Some((candidate.clone(), tcp)),
      None => self.next_alternate(ctx, &candidate),
    };
    let Some((mut alternate_record, alternate_transport)) = alternate else {
      debug!("No alternate for {} of {}", candidate, ctx.set.origin());
      return self.await_single(ctx, &candidate, &mut primary).await;
    };
    debug!(
      "HTTP/3 to {} did not complete within {:?}, racing {} [{}]",
      candidate, self.config.fast_fallback_timeout, alternate_record, alternate_transport
    );
    let same_record = alternate_record == candidate;
    let mut alternate = self.spawn(ctx, Some(&alternate_record), alternate_transport);

    loop {
      let event = tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => RaceEvent::Cancelled,
        res = primary.join(), if primary.is_running() => RaceEvent::Primary(res),
        res = alternate.join(), if alternate.is_running() => RaceEvent::Alternate(res),
      };

      match event {
        RaceEvent::Cancelled => {
          self.cancel_task(ctx, &mut primary).await;
          self.cancel_task(ctx, &mut alternate).await;
          return Step::Cancelled;
        }
        RaceEvent::Primary(Ok(connection)) => {
          self.cancel_task(ctx, &mut alternate).await;
          return Step::Connected(self.connected(ctx, &primary, connection));
        }
        RaceEvent::Alternate(Ok(connection)) => {
          self.cancel_task(ctx, &mut primary).await;
          return Step::Connected(self.connected(ctx, &alternate, connection));
        }
        RaceEvent::Primary(Err(e)) => {
          self.fail(ctx, &primary, &e);
          if !same_record {
            self.exclude(ctx, &candidate);
          }
        }
        RaceEvent::Alternate(Err(e)) => {
          self.fail(ctx, &alternate, &e);
          if !same_record {
            self.exclude(ctx, &alternate_record);
            // keep racing the stalled HTTP/3 attempt against the next eligible record
            if primary.is_running() {
              if let Some((next, transport)) = self.next_alternate(ctx, &candidate) {
                debug!("Alternate {} failed, racing {} [{}]", alternate_record, next, transport);
                alternate = self.spawn(ctx, Some(&next), transport);
                alternate_record = next;
              }
            }
          }
        }
      }

      if !primary.is_running() && !alternate.is_running() {
        if same_record {
          self.exclude(ctx, &candidate);
        }
        return Step::Failed;
      }
    }
  }

  /// Next eligible record other than the candidate, with the transport to race it on
  fn next_alternate(&self, ctx: &Resolution<'_>, candidate: &EndpointRecord) -> Option<(EndpointRecord, Transport)> {
    let next = self.policy.alternate_candidate(ctx.set, &ctx.exclusions, candidate)?;
    let transports = self.policy.transports(&next);
    let transport = transports.tcp().or(transports.primary())?;
    Some((next, transport))
  }

  /// Wait for a lone attempt on the candidate, excluding the candidate if it fails
  async fn await_single(
    &self,
    ctx: &mut Resolution<'_>,
    candidate: &EndpointRecord,
    task: &mut AttemptTask<C::Connection>,
  ) -> Step<C::Connection> {
    let res = tokio::select! {
      biased;
      _ = ctx.cancel.cancelled() => None,
      res = task.join() => Some(res),
    };
    match res {
      None => {
        self.cancel_task(ctx, task).await;
        Step::Cancelled
      }
      Some(Ok(connection)) => Step::Connected(self.connected(ctx, task, connection)),
      Some(Err(e)) => {
        self.fail(ctx, task, &e);
        self.exclude(ctx, candidate);
        Step::Failed
      }
    }
  }

  /// Attempt the plain origin address
  async fn attempt_origin(&self, ctx: &mut Resolution<'_>) -> Terminal<C::Connection> {
    debug!("Falling back to origin {}", ctx.set.origin());
    let mut task = self.spawn(ctx, None, Transport::Plain);
    let res = tokio::select! {
      biased;
      _ = ctx.cancel.cancelled() => None,
      res = task.join() => Some(res),
    };
    match res {
      None => {
        self.cancel_task(ctx, &mut task).await;
        Terminal::Cancelled
      }
      Some(Ok(connection)) => Terminal::Connected(self.connected(ctx, &task, connection)),
      Some(Err(e)) => {
        self.fail(ctx, &task, &e);
        Terminal::OriginFailed(e)
      }
    }
  }

  /// Spawn an attempt to the record, or to the plain origin when `record` is `None`
  fn spawn(
    &self,
    ctx: &mut Resolution<'_>,
    record: Option<&EndpointRecord>,
    transport: Transport,
  ) -> AttemptTask<C::Connection> {
    let (request, target) = match record {
      Some(record) => {
        let transports = self.policy.transports(record);
        let request = ConnectRequest {
          origin: ctx.set.origin().to_string(),
          host: record.target_name().to_string(),
          port: record.effective_port(self.config.default_port),
          transport,
          alpn: transports.alpn_for(transport).map(str::to_string),
          ech_config: record.ech_config().cloned(),
          ip_hints: record.ip_hints(),
        };
        (request, AttemptTarget::Endpoint(record.clone()))
      }
      None => (
        ConnectRequest::origin(ctx.set.origin(), self.config.default_port),
        AttemptTarget::Origin(ctx.set.origin().to_string()),
      ),
    };
    debug!("Attempting {} for {}", request, request.origin);

    let index = ctx.log.start(target.clone(), transport);
    let connector = self.connector.clone();
    let attempt_timeout = self.config.attempt_timeout;
    let handle = tokio::spawn(async move {
      match tokio::time::timeout(attempt_timeout, connector.connect(request)).await {
        Ok(result) => result,
        Err(_) => Err(ConnectError::TimedOut),
      }
    });

    AttemptTask {
      index,
      target,
      transport,
      handle,
      finished: false,
    }
  }

  fn connected(
    &self,
    ctx: &mut Resolution<'_>,
    task: &AttemptTask<C::Connection>,
    connection: C::Connection,
  ) -> Connected<C::Connection> {
    ctx.log.finish(task.index, AttemptOutcome::Succeeded);
    Connected {
      connection,
      via: task.succeeded_via(),
      transport: task.transport,
    }
  }

  fn fail(&self, ctx: &mut Resolution<'_>, task: &AttemptTask<C::Connection>, error: &ConnectError) {
    debug!("Attempt to {} [{}] failed: {}", task.target, task.transport, error);
    ctx.log.finish(task.index, AttemptOutcome::Failed(error.to_string()));
  }

  async fn cancel_task(&self, ctx: &mut Resolution<'_>, task: &mut AttemptTask<C::Connection>) {
    if task.cancel().await {
      debug!("Cancelled attempt to {} [{}]", task.target, task.transport);
      ctx.log.finish(task.index, AttemptOutcome::Cancelled);
    }
  }

  fn exclude(&self, ctx: &Resolution<'_>, record: &EndpointRecord) {
    let key = self.policy.exclusion_key(ctx.set, record);
    if ctx.exclusions.exclude(&key) {
      debug!("Excluded {} in epoch {}", key, ctx.exclusions.epoch());
    }
  }
}
