//! Auto-managed token client.
//!
//! [`AutoManagedTokenManager::start`] performs the first exchange and launches
//! the background [`RefreshScheduler`]. [`AutoManagedTokenManager::get_token`]
//! only ever reads the cache. [`AutoManagedTokenManager::stop`] cancels the
//! scheduler and waits for it.
//!
//! Lifecycle rules:
//! - `start` outside `NotStarted` returns a state error; it never launches a
//!   second scheduler.
//! - `stop` before `start` is a no-op, and calling it again after the manager
//!   stopped is a no-op too.
//! - the cache survives `stop` ([`AutoManagedTokenManager::last_known_token`]),
//!   but `get_token` reports a state error once stopped.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::cache::token::CachedToken;
use crate::cache::token_cache::TokenCache;
use crate::config::sources::{ServiceConfig, TokenEndpointConfig};
use crate::error::TokenError;
use crate::manager::scheduler::{RefreshScheduler, RefreshSettings};
use crate::manager::state::ManagerState;
use crate::observability::metrics::{Metrics, TRIGGER_FORCED, TRIGGER_INITIAL};
use crate::resilience::gate::RefreshGate;
use crate::sources::credentials::CredentialSource;
use crate::sources::oauth2::{EndpointSettings, TokenEndpointClient, TokenExchange};

/// State shared between the façade and its background task.
pub(crate) struct Shared<E> {
    exchanger: E,
    pub(crate) cache: TokenCache,
    gate: RefreshGate<Result<(), TokenError>>,
    state: Mutex<ManagerState>,
    pub(crate) settings: RefreshSettings,
    pub(crate) metrics: Metrics,
}

impl<E: TokenExchange> Shared<E> {
    pub(crate) fn state(&self) -> ManagerState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// One exchange through the single-admission gate. Callers queued behind
    /// an in-flight attempt get that attempt's outcome.
    pub(crate) async fn refresh(
        &self,
        trigger: &'static str,
        cancel: Option<&CancellationToken>,
    ) -> Result<(), TokenError> {
        let (outcome, ran) = self
            .gate
            .run(|| async {
                let state = self.state();
                if state != ManagerState::Running {
                    return Err(TokenError::illegal_state("refresh_token", state));
                }

                let cached = self.exchange_once(trigger).await?;

                let state = self.state();
                if state != ManagerState::Running || cancel.is_some_and(CancellationToken::is_cancelled) {
                    debug!(trigger, "discarding token obtained after stop was requested");
                    return Err(TokenError::illegal_state("refresh_token", state));
                }
                self.install(cached);
                Ok(())
            })
            .await;

        if !ran {
            debug!(trigger, "joined an in-flight token exchange");
        }
        outcome
    }

    async fn exchange_once(&self, trigger: &'static str) -> Result<CachedToken, TokenError> {
        let started = Instant::now();
        let result = self.exchanger.exchange().await.and_then(|record| {
            if record.active {
                Ok(record)
            } else {
                Err(TokenError::InactiveToken)
            }
        });
        self.metrics.observe_attempt(trigger, started.elapsed().as_secs_f64());

        match result {
            Ok(record) => Ok(CachedToken::new(record, started)),
            Err(err) => {
                self.metrics.observe_failure(trigger, err.kind());
                Err(err)
            }
        }
    }

    fn install(&self, cached: CachedToken) {
        self.metrics.token_expiry_unix.set(cached.expires_at_unix());
        info!(
            expires_in = cached.record.expires_in_seconds,
            token_type = %cached.record.token_type,
            "token installed"
        );
        self.cache.write(cached);
    }

    fn set_state(&self, next: ManagerState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = next;
    }
}

struct Worker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct AutoManagedTokenManager<E: TokenExchange = TokenEndpointClient> {
    pub(crate) shared: Arc<Shared<E>>,
    worker: Mutex<Option<Worker>>,
}

impl<E: TokenExchange> AutoManagedTokenManager<E> {
    pub fn new(exchanger: E, settings: RefreshSettings) -> Self {
        Self {
            shared: Arc::new(Shared {
                exchanger,
                cache: TokenCache::new(),
                gate: RefreshGate::new(),
                state: Mutex::new(ManagerState::NotStarted),
                settings,
                metrics: Metrics::new(),
            }),
            worker: Mutex::new(None),
        }
    }

    /// First exchange, then the background scheduler. On failure the manager
    /// stays `NotStarted` and nothing is spawned.
    pub async fn start(&self) -> Result<(), TokenError> {
        let _gate = self.shared.gate.lock().await;

        let state = self.shared.state();
        if state != ManagerState::NotStarted {
            return Err(TokenError::illegal_state("start", state));
        }

        let cached = self.shared.exchange_once(TRIGGER_INITIAL).await.inspect_err(|err| {
            error!(reason = err.kind(), error = %err, "initial token exchange failed");
        })?;
        self.shared.install(cached);

        // the worker is in place before stop can observe Running
        let cancel = CancellationToken::new();
        let scheduler = RefreshScheduler::new(self.shared.clone(), cancel.clone());
        let handle = tokio::spawn(scheduler.run());
        *self.worker.lock().unwrap_or_else(PoisonError::into_inner) = Some(Worker { cancel, handle });

        self.shared.set_state(ManagerState::Running);
        self.shared.metrics.up.set(1);

        info!("token manager started");
        Ok(())
    }

    /// Current token value. Never touches the network and never waits on the scheduler.
    pub fn get_token(&self) -> Result<String, TokenError> {
        self.current_token().map(|token| token.value().to_owned())
    }

    /// Same checks as [`Self::get_token`], returning the whole cached token
    /// from a single cache read.
    pub fn current_token(&self) -> Result<Arc<CachedToken>, TokenError> {
        let state = self.shared.state();
        if state != ManagerState::Running {
            return Err(TokenError::illegal_state("get_token", state));
        }
        self.shared
            .cache
            .valid_at(Instant::now())
            .ok_or_else(TokenError::no_valid_token)
    }

    /// Immediate exchange through the same gate as the scheduler. The cache
    /// is left untouched on failure.
    pub async fn refresh_token(&self) -> Result<(), TokenError> {
        let state = self.shared.state();
        if state != ManagerState::Running {
            return Err(TokenError::illegal_state("refresh_token", state));
        }
        self.shared.refresh(TRIGGER_FORCED, None).await.inspect_err(|err| {
            debug!(reason = err.kind(), "forced token refresh failed");
        })
    }

    /// Cancel the scheduler and wait until it is gone. After this returns no
    /// refresh writes to the cache.
    pub async fn stop(&self) {
        let worker = {
            let mut state = self.shared.state.lock().unwrap_or_else(PoisonError::into_inner);
            match *state {
                ManagerState::NotStarted => return,
                ManagerState::Running => *state = ManagerState::Stopped,
                ManagerState::Stopped => {}
            }
            self.worker.lock().unwrap_or_else(PoisonError::into_inner).take()
        };

        if let Some(Worker { cancel, handle }) = worker {
            cancel.cancel();
            if let Err(err) = handle.await {
                error!("refresh scheduler terminated abnormally: {}", err);
            }
            self.shared.metrics.up.set(0);
            info!("token manager stopped");
        }

        // drain a forced refresh that may still be in flight
        let _gate = self.shared.gate.lock().await;
    }

    pub fn state(&self) -> ManagerState {
        self.shared.state()
    }

    /// Last installed token regardless of state or expiry, for diagnostics.
    pub fn last_known_token(&self) -> Option<Arc<CachedToken>> {
        self.shared.cache.read()
    }

    pub fn metrics(&self) -> &Metrics {
        &self.shared.metrics
    }

    pub fn settings(&self) -> &RefreshSettings {
        &self.shared.settings
    }
}

impl AutoManagedTokenManager<TokenEndpointClient> {
    /// Pull credentials from `source` once and build an HTTP-backed manager.
    pub fn from_source(
        endpoint: EndpointSettings,
        source: &dyn CredentialSource,
        settings: RefreshSettings,
    ) -> Result<Self, TokenError> {
        let credentials = source.credentials()?;
        let client = TokenEndpointClient::new(endpoint, credentials)?;
        Ok(Self::new(client, settings))
    }

    pub fn from_endpoint_config(cfg: &TokenEndpointConfig, settings: RefreshSettings) -> Result<Self, TokenError> {
        Self::from_source(EndpointSettings::from(cfg), &cfg.credentials, settings)
    }

    pub fn from_config(cfg: &ServiceConfig) -> Result<Self, TokenError> {
        Self::from_endpoint_config(&cfg.token, RefreshSettings::from(&cfg.refresh))
    }
}

impl<E: TokenExchange> Drop for AutoManagedTokenManager<E> {
    fn drop(&mut self) {
        let worker = self.worker.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(worker) = worker.take() {
            worker.cancel.cancel();
        }
    }
}
