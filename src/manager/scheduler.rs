use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::settings::RefreshConfig;
use crate::manager::manager::Shared;
use crate::manager::state::ManagerState;
use crate::observability::metrics::TRIGGER_SCHEDULED;
use crate::resilience::retry::{Backoff, BackoffPolicy};
use crate::sources::oauth2::TokenExchange;
use crate::utils::constants::{DEFAULT_MIN_REFRESH_INTERVAL_MS, DEFAULT_SAFETY_MARGIN_SECS};

/// Timing policy of the background refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshSettings {
    /// refresh starts this long before the token expires
    pub safety_margin: Duration,
    /// floor for any scheduled wait, guards against zero or tiny lifetimes
    pub min_refresh_interval: Duration,
    pub backoff: BackoffPolicy,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            safety_margin: Duration::from_secs(DEFAULT_SAFETY_MARGIN_SECS),
            min_refresh_interval: Duration::from_millis(DEFAULT_MIN_REFRESH_INTERVAL_MS),
            backoff: BackoffPolicy::default(),
        }
    }
}

impl From<&RefreshConfig> for RefreshSettings {
    fn from(cfg: &RefreshConfig) -> Self {
        Self {
            safety_margin: Duration::from_secs(cfg.safety_margin_seconds),
            min_refresh_interval: Duration::from_millis(cfg.min_refresh_interval_ms),
            backoff: BackoffPolicy::from(&cfg.retry),
        }
    }
}

/// Background task: waits for the refresh deadline, refreshes through the
/// gate, backs off on failure, exits on cancellation.
pub struct RefreshScheduler<E: TokenExchange> {
    shared: Arc<Shared<E>>,
    cancel: CancellationToken,
    backoff: Backoff,
}

impl<E: TokenExchange> RefreshScheduler<E> {
    pub(crate) fn new(shared: Arc<Shared<E>>, cancel: CancellationToken) -> Self {
        let backoff = Backoff::new(shared.settings.backoff.clone());
        Self { shared, cancel, backoff }
    }

    pub async fn run(mut self) {
        info!("refresh scheduler started");
        let mut retry_delay: Option<Duration> = None;

        loop {
            let delay = match retry_delay.take() {
                Some(delay) => delay,
                None => self.delay_until_refresh(Instant::now()),
            };
            debug!(delay_ms = delay.as_millis() as u64, "next refresh check scheduled");

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = sleep(delay) => {}
            }

            if !self.refresh_due(Instant::now()) {
                // replaced by a forced refresh while we were waiting
                debug!("token already renewed, re-arming timer");
                self.reset_backoff();
                continue;
            }

            match self.shared.refresh(TRIGGER_SCHEDULED, Some(&self.cancel)).await {
                Ok(()) => {
                    if self.backoff.failures() > 0 {
                        info!(failures = self.backoff.failures(), "token refresh recovered");
                    }
                    self.reset_backoff();
                }
                Err(_) if self.cancel.is_cancelled() || self.shared.state() != ManagerState::Running => break,
                Err(err) => {
                    let delay = self.backoff.next_delay();
                    self.shared.metrics.consecutive_failures.set(self.backoff.failures() as i64);
                    if err.is_retryable() {
                        warn!(
                            reason = err.kind(),
                            error = %err,
                            failures = self.backoff.failures(),
                            retry_in_ms = delay.as_millis() as u64,
                            "background token refresh failed, keeping current token"
                        );
                    } else {
                        error!(
                            reason = err.kind(),
                            error = %err,
                            failures = self.backoff.failures(),
                            retry_in_ms = delay.as_millis() as u64,
                            "background token refresh rejected, retries are unlikely to help"
                        );
                    }
                    retry_delay = Some(delay);
                }
            }
        }

        info!("refresh scheduler stopped");
    }

    fn reset_backoff(&mut self) {
        self.backoff.reset();
        self.shared.metrics.consecutive_failures.set(0);
    }

    /// `obtained_at + expires_in - safety_margin - now`, clamped to the minimum interval.
    fn delay_until_refresh(&self, now: Instant) -> Duration {
        let settings = &self.shared.settings;
        self.shared
            .cache
            .read()
            .map(|token| token.refresh_at(settings.safety_margin).saturating_duration_since(now))
            .unwrap_or(Duration::ZERO)
            .max(settings.min_refresh_interval)
    }

    fn refresh_due(&self, now: Instant) -> bool {
        let margin = self.shared.settings.safety_margin;
        self.shared
            .cache
            .read()
            .map(|token| now >= token.refresh_at(margin))
            .unwrap_or(true)
    }
}
