use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::utils::constants::MAX_TOKEN_LIFETIME_SECS;

/// Token as issued by the endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenRecord {
    pub value: String,
    pub token_type: String,
    pub expires_in_seconds: u64,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
    /// `false` means the issued token must not be used
    pub active: bool,
}

impl TokenRecord {
    pub fn new(value: impl Into<String>, expires_in_seconds: u64) -> Self {
        Self {
            value: value.into(),
            token_type: "Bearer".to_owned(),
            expires_in_seconds,
            refresh_token: None,
            scope: None,
            active: true,
        }
    }

    /// `expires_in`, capped at [`MAX_TOKEN_LIFETIME_SECS`].
    pub fn lifetime(&self) -> Duration {
        Duration::from_secs(self.expires_in_seconds.min(MAX_TOKEN_LIFETIME_SECS))
    }
}

impl fmt::Debug for TokenRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenRecord")
            .field("value", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("expires_in_seconds", &self.expires_in_seconds)
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("scope", &self.scope)
            .field("active", &self.active)
            .finish()
    }
}

/// Token installed in the cache, with its expiry fixed at the moment it was obtained.
#[derive(Debug, Clone)]
pub struct CachedToken {
    pub record: TokenRecord,
    pub obtained_at: Instant,
    pub expiry_instant: Instant,
    /// wall clock counterpart of `obtained_at`, for logs and metrics only
    pub issued_at: DateTime<Utc>,
}

impl CachedToken {
    pub fn new(record: TokenRecord, obtained_at: Instant) -> Self {
        let expiry_instant = obtained_at
            .checked_add(record.lifetime())
            .or_else(|| obtained_at.checked_add(Duration::from_secs(MAX_TOKEN_LIFETIME_SECS)))
            .unwrap_or(obtained_at);
        Self {
            record,
            obtained_at,
            expiry_instant,
            issued_at: Utc::now(),
        }
    }

    pub fn value(&self) -> &str {
        &self.record.value
    }

    pub fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.expiry_instant
    }

    /// Instant at which a refresh should start: `expiry - safety_margin`, never before `obtained_at`.
    pub fn refresh_at(&self, safety_margin: Duration) -> Instant {
        self.expiry_instant
            .checked_sub(safety_margin)
            .filter(|at| *at >= self.obtained_at)
            .unwrap_or(self.obtained_at)
    }

    pub fn expires_at_unix(&self) -> i64 {
        let lifetime = i64::try_from(self.record.lifetime().as_secs()).unwrap_or(i64::MAX);
        self.issued_at.timestamp().saturating_add(lifetime)
    }
}
