//! Connection establishment seam
//!
//! The fallback logic never opens sockets itself. It hands a [`ConnectRequest`] to a [`Connector`], which owns
//! the actual QUIC/TLS stacks and the resolution of the target's address records.

use crate::{error::ConnectError, record::normalize_name, transport::Transport};
use bytes::Bytes;
use std::{
  net::IpAddr,
  sync::{Arc, Mutex, PoisonError},
  time::Duration,
};

/// DashMap type alias, uses ahash::RandomState as hashbuilder
type DashMap<K, V> = dashmap::DashMap<K, V, ahash::RandomState>;

/// A single connection attempt to hand to a [`Connector`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
  /// Origin the connection is made for, used as the TLS server name
  pub origin: String,
  /// Name to connect to: the endpoint's target name, or the origin itself
  pub host: String,
  pub port: u16,
  pub transport: Transport,
  /// ALPN identifier to offer, `None` for the plain origin
  pub alpn: Option<String>,
  /// ECH configuration to use, `None` for endpoints without ECH and for the plain origin
  pub ech_config: Option<Bytes>,
  /// Address hints advertised by the endpoint
  pub ip_hints: Vec<IpAddr>,
}

impl ConnectRequest {
  /// Request for the plain origin address: default port, no ALPN preference, no ECH, no hints
  pub fn origin(origin: &str, port: u16) -> Self {
    let origin = normalize_name(origin);
    Self {
      host: origin.clone(),
      origin,
      port,
      transport: Transport::Plain,
      alpn: None,
      ech_config: None,
      ip_hints: Vec::new(),
    }
  }
}

impl std::fmt::Display for ConnectRequest {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}:{} [{}]", self.host, self.port, self.transport)
  }
}

/// Trait for connection establishment
#[async_trait::async_trait]
pub trait Connector: Send + Sync + 'static {
  /// Established connection handed back to the caller
  type Connection: Send + 'static;

  /// Establish a connection. The returned future may be dropped at any await point when the attempt
  /// loses a race or the resolution is cancelled.
  async fn connect(&self, request: ConnectRequest) -> Result<Self::Connection, ConnectError>;
}

/* ---------------------------------------------------------- */
/// Behavior of a scripted connection attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Script {
  /// Connect after the given delay
  Succeed { after: Duration },
  /// Fail after the given delay
  Fail { after: Duration, reason: String },
  /// Never complete
  Hang,
}

impl Script {
  /// Connect immediately
  pub fn succeed() -> Self {
    Self::Succeed { after: Duration::ZERO }
  }

  /// Fail immediately
  pub fn fail(reason: &str) -> Self {
    Self::Fail {
      after: Duration::ZERO,
      reason: reason.to_string(),
    }
  }
}

/// Connection produced by [`ScriptedConnector`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedConnection {
  pub host: String,
  pub port: u16,
  pub transport: Transport,
  pub alpn: Option<String>,
  pub ech: bool,
}

type ScriptKey = (String, Transport);

/// Counts attempts whose future was dropped before completing
struct DropGuard {
  dropped: Arc<DashMap<ScriptKey, usize>>,
  key: ScriptKey,
  completed: bool,
}

impl Drop for DropGuard {
  fn drop(&mut self) {
    if !self.completed {
      *self.dropped.entry(self.key.clone()).or_default() += 1;
    }
  }
}

/// Deterministic [`Connector`] for tests and demos.
///
/// Each `(host, transport)` pair follows its [`Script`]. Pairs without a script fail immediately.
/// Every request is recorded, and attempts dropped before completion (cancelled or timed out) are counted.
pub struct ScriptedConnector {
  scripts: DashMap<ScriptKey, Script>,
  calls: Mutex<Vec<ConnectRequest>>,
  dropped: Arc<DashMap<ScriptKey, usize>>,
}

impl Default for ScriptedConnector {
  fn default() -> Self {
    Self::new()
  }
}

impl ScriptedConnector {
  /// Create a new scripted connector where every attempt is refused
  pub fn new() -> Self {
    Self {
      scripts: DashMap::default(),
      calls: Mutex::new(Vec::new()),
      dropped: Arc::new(DashMap::default()),
    }
  }

  /// Set the script of a host and transport
  pub fn with_script(self, host: &str, transport: Transport, script: Script) -> Self {
    self.set_script(host, transport, script);
    self
  }

  /// Replace the script of a host and transport, also while attempts are running
  pub fn set_script(&self, host: &str, transport: Transport, script: Script) {
    self.scripts.insert((normalize_name(host), transport), script);
  }

  /// Every request received so far, in arrival order
  pub fn calls(&self) -> Vec<ConnectRequest> {
    self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
  }

  /// Number of requests received for the host, over every transport
  pub fn attempts(&self, host: &str) -> usize {
    let host = normalize_name(host);
    self.calls().iter().filter(|c| normalize_name(&c.host) == host).count()
  }

  /// Number of attempts to the host and transport dropped before completion
  pub fn cancelled(&self, host: &str, transport: Transport) -> usize {
    self
      .dropped
      .get(&(normalize_name(host), transport))
      .map(|count| *count)
      .unwrap_or(0)
  }
}

#[async_trait::async_trait]
impl Connector for ScriptedConnector {
  type Connection = ScriptedConnection;

  async fn connect(&self, request: ConnectRequest) -> Result<ScriptedConnection, ConnectError> {
    self
      .calls
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .push(request.clone());

    let key = (normalize_name(&request.host), request.transport);
    let script = self
      .scripts
      .get(&key)
      .map(|s| s.clone())
      .unwrap_or_else(|| Script::fail("no script"));

    let mut guard = DropGuard {
      dropped: self.dropped.clone(),
      key,
      completed: false,
    };

    let result = match script {
      Script::Succeed { after } => {
        tokio::time::sleep(after).await;
        Ok(ScriptedConnection {
          host: request.host.clone(),
          port: request.port,
          transport: request.transport,
          alpn: request.alpn.clone(),
          ech: request.ech_config.is_some(),
        })
      }
      Script::Fail { after, reason } => {
        tokio::time::sleep(after).await;
        match request.transport {
          Transport::Http3 => Err(ConnectError::QuicHandshake(reason)),
          _ => Err(ConnectError::Refused(format!("{}: {}", request, reason))),
        }
      }
      Script::Hang => std::future::pending().await,
    };
    guard.completed = true;
    result
  }
}
