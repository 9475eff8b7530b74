use crate::constants::{ALPN_H2, ALPN_H3, DEFAULT_ALPN};

/// Transport used for a connection attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
  /// HTTP/3 over QUIC (UDP)
  Http3,
  /// HTTP/2 over TLS (TCP)
  Http2,
  /// Default TLS over TCP, ALPN left to the TLS layer. Used for the plain origin.
  Plain,
}

impl Transport {
  /// Whether this transport runs over QUIC
  pub fn is_quic(&self) -> bool {
    matches!(self, Self::Http3)
  }

  /// Short label used in reports and logs
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Http3 => "h3",
      Self::Http2 => "h2",
      Self::Plain => "plain",
    }
  }
}

impl std::fmt::Display for Transport {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

/// Whether the ALPN identifier belongs to the HTTP/3 family, i.e., `h3` or a draft like `h3-29`
pub(crate) fn is_h3_family(alpn: &str) -> bool {
  alpn == ALPN_H3 || alpn.strip_prefix("h3-").is_some_and(|draft| !draft.is_empty())
}

/* ---------------------------------------------------------- */
/// Transports a single endpoint record can be reached with, after applying the HTTP/2 and HTTP/3 switches
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RecordTransports {
  /// ALPN identifier for the QUIC attempt, if any
  quic: Option<String>,
  /// TCP based transport and its ALPN identifier, if any
  tcp: Option<(Transport, String)>,
}

impl RecordTransports {
  /// Select transports from an advertised ALPN list.
  /// Unless `no_default_alpn` is set, `http/1.1` is implicitly part of the list.
  pub fn select(alpn: &[String], no_default_alpn: bool, http2_enabled: bool, http3_enabled: bool) -> Self {
    let quic = if http3_enabled {
      alpn.iter().find(|id| is_h3_family(id)).cloned()
    } else {
      None
    };

    let has_h2 = alpn.iter().any(|id| id == ALPN_H2);
    let has_http11 = !no_default_alpn || alpn.iter().any(|id| id == DEFAULT_ALPN);
    let tcp = if http2_enabled && has_h2 {
      Some((Transport::Http2, ALPN_H2.to_string()))
    } else if has_http11 {
      Some((Transport::Plain, DEFAULT_ALPN.to_string()))
    } else {
      None
    };

    Self { quic, tcp }
  }

  /// No transport is usable
  pub fn is_empty(&self) -> bool {
    self.quic.is_none() && self.tcp.is_none()
  }

  /// Transport attempted first: HTTP/3 when available, then the TCP transport
  pub fn primary(&self) -> Option<Transport> {
    if self.quic.is_some() {
      Some(Transport::Http3)
    } else {
      self.tcp()
    }
  }

  /// TCP based transport, if the record advertises one
  pub fn tcp(&self) -> Option<Transport> {
    self.tcp.as_ref().map(|(t, _)| *t)
  }

  /// TCP transport usable as a fallback for the QUIC attempt on the same record
  pub fn tcp_fallback(&self) -> Option<Transport> {
    if self.quic.is_some() { self.tcp() } else { None }
  }

  /// ALPN identifier to offer for the given transport
  pub fn alpn_for(&self, transport: Transport) -> Option<&str> {
    match transport {
      Transport::Http3 => self.quic.as_deref(),
      _ => self.tcp.as_ref().filter(|(t, _)| *t == transport).map(|(_, id)| id.as_str()),
    }
  }
}
