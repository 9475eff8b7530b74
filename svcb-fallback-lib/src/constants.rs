/// Default port of the `https` scheme, used when a record carries no port override
pub const DEFAULT_HTTPS_PORT: u16 = 443;

/// Default head start given to an HTTP/3 attempt before the alternate transport is raced, in milliseconds.
/// The value is a placeholder and is expected to be tuned through configuration.
pub const DEFAULT_FAST_FALLBACK_TIMEOUT_MSEC: u64 = 50;

/// Default upper bound of a single connection attempt in milliseconds
pub const DEFAULT_ATTEMPT_TIMEOUT_MSEC: u64 = 30_000;

/// Upper bound accepted for the fast fallback timeout in milliseconds
pub const MAX_FAST_FALLBACK_TIMEOUT_MSEC: u64 = 60_000;

/// Minimum lifetime of a cached endpoint set, applied when every answer carries TTL 0
pub const MIN_ENDPOINT_SET_TTL_SEC: u64 = 1;

/// Default capacity of the endpoint set cache
pub const DEFAULT_ENDPOINT_SET_CACHE_SIZE: usize = 1024;

/// ALPN identifier implied by every HTTPS record unless `no-default-alpn` is present
pub const DEFAULT_ALPN: &str = "http/1.1";

/// ALPN identifier of HTTP/2 over TLS
pub const ALPN_H2: &str = "h2";

/// ALPN identifier of HTTP/3; drafts are advertised as `h3-<n>`
pub const ALPN_H3: &str = "h3";

/// Ports a client must never connect to for https, see the "bad port" list of the Fetch standard.
/// A record pointing at one of them is skipped.
pub const UNSAFE_PORTS: &[u16] = &[
  1, 7, 9, 11, 13, 15, 17, 19, 20, 21, 22, 23, 25, 37, 42, 43, 53, 69, 77, 79, 87, 95, 101, 102, 103, 104, 109, 110, 111,
  113, 115, 117, 119, 123, 135, 137, 139, 143, 161, 179, 389, 427, 465, 512, 513, 514, 515, 526, 530, 531, 532, 540, 548,
  554, 556, 563, 587, 601, 636, 989, 990, 993, 995, 1719, 1720, 1723, 2049, 3659, 4045, 4190, 5060, 5061, 6000, 6566,
  6665, 6666, 6667, 6668, 6669, 6679, 6697, 10080,
];

/// Names of structured log events
pub mod log_event_names {
  /// Terminal result of a fallback resolution
  pub const FALLBACK_RESULT: &str = "svcb_fallback_result";
}
