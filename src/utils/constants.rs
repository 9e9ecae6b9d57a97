//! Shared constants and invariants

pub const DEFAULT_SAFETY_MARGIN_SECS: u64 = 30;
pub const DEFAULT_MIN_REFRESH_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_HTTP_TIMEOUT_MS: u64 = 5000;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 3000;
/// Longest `expires_in` accepted from the token endpoint (10 years)
pub const MAX_TOKEN_LIFETIME_SECS: u64 = 10 * 365 * 24 * 60 * 60;

// Backoff between failed refreshes
pub const DEFAULT_BASE_DELAY_MS: u64 = 500;
pub const DEFAULT_MAX_DELAY_MS: u64 = 60_000;
pub const DEFAULT_MULTIPLIER: f64 = 2.0;
pub const DEFAULT_JITTER_RATIO: f64 = 0.2;

pub const DEFAULT_CONFIG_PATH: &str = "token-client.yaml";
pub const METRICS_PREFIX: &str = "tokenclient";
