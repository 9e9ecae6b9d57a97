use std::sync::{Arc, PoisonError, RwLock};

use tokio::time::Instant;

use crate::cache::token::CachedToken;

/// Holds the current token. The lock only guards an `Arc` swap, so a reader
/// always sees one whole record and never waits on network I/O.
#[derive(Debug, Clone, Default)]
pub struct TokenCache {
    inner: Arc<RwLock<Option<Arc<CachedToken>>>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current token, if any exchange ever succeeded.
    pub fn read(&self) -> Option<Arc<CachedToken>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the current token unconditionally.
    pub fn write(&self, token: CachedToken) {
        let token = Arc::new(token);
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = Some(token);
    }

    /// Current token only if it has not reached its own expiry at `now`.
    pub fn valid_at(&self, now: Instant) -> Option<Arc<CachedToken>> {
        self.read().filter(|token| !token.is_expired_at(now))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::cache::token::TokenRecord;

    #[test]
    fn empty_until_first_write() {
        let cache = TokenCache::new();
        assert!(cache.read().is_none());

        cache.write(CachedToken::new(TokenRecord::new("first", 60), Instant::now()));
        assert_eq!(cache.read().unwrap().value(), "first");
    }

    #[test]
    fn write_replaces_without_merging() {
        let cache = TokenCache::new();
        let mut record = TokenRecord::new("first", 60);
        record.scope = Some("read".into());
        cache.write(CachedToken::new(record, Instant::now()));

        cache.write(CachedToken::new(TokenRecord::new("second", 120), Instant::now()));
        let current = cache.read().unwrap();
        assert_eq!(current.value(), "second");
        assert_eq!(current.record.scope, None);
        assert_eq!(current.record.expires_in_seconds, 120);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_token_is_not_valid() {
        let cache = TokenCache::new();
        cache.write(CachedToken::new(TokenRecord::new("short", 2), Instant::now()));
        assert!(cache.valid_at(Instant::now()).is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.valid_at(Instant::now()).is_none());
        // still inspectable
        assert_eq!(cache.read().unwrap().value(), "short");
    }

    #[test]
    fn concurrent_readers_never_see_mixed_records() {
        let cache = TokenCache::new();
        cache.write(CachedToken::new(TokenRecord::new("gen-0", 0), Instant::now()));

        std::thread::scope(|scope| {
            let writer = cache.clone();
            scope.spawn(move || {
                for generation in 1..=500u64 {
                    let value = format!("gen-{}", generation);
                    writer.write(CachedToken::new(TokenRecord::new(value, generation), Instant::now()));
                }
            });
            for _ in 0..4 {
                let reader = cache.clone();
                scope.spawn(move || {
                    for _ in 0..500 {
                        let token = reader.read().unwrap();
                        let expected = format!("gen-{}", token.record.expires_in_seconds);
                        assert_eq!(token.value(), expected);
                    }
                });
            }
        });
    }
}
