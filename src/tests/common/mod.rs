// tests/common/mod.rs
pub use axum::Router;
pub use serde_json::json;
pub use tokio::task::JoinHandle;

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::Client;
use tokio::time::Instant;

use crate::cache::token::TokenRecord;
use crate::error::TokenError;
use crate::manager::RefreshSettings;
use crate::resilience::retry::BackoffPolicy;
use crate::sources::oauth2::TokenExchange;

/// Spawn an Axum router on an ephemeral port and return (JoinHandle, SocketAddr)
pub async fn spawn_axum(router: Router) -> (JoinHandle<()>, SocketAddr) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind failed");
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.expect("server failed");
    });
    (handle, addr)
}

pub fn build_reqwest_client() -> Client {
    Client::builder()
        .timeout(std::time::Duration::from_secs(5))
        .build()
        .expect("reqwest client")
}

pub type Step = Result<TokenRecord, TokenError>;

struct Script {
    steps: VecDeque<Step>,
    /// answered once `steps` is exhausted
    fallback: Step,
    calls: Vec<Instant>,
}

/// In-memory token endpoint. Answers scripted steps in order, then repeats
/// the fallback. Every call is timestamped with the (possibly paused) tokio clock.
#[derive(Clone)]
pub struct ScriptedExchange {
    script: Arc<Mutex<Script>>,
    latency: Duration,
}

impl ScriptedExchange {
    pub fn new(fallback: Step) -> Self {
        Self {
            script: Arc::new(Mutex::new(Script {
                steps: VecDeque::new(),
                fallback,
                calls: Vec::new(),
            })),
            latency: Duration::ZERO,
        }
    }

    /// Always issues `value` valid for `expires_in` seconds.
    pub fn issuing(value: &str, expires_in: u64) -> Self {
        Self::new(Ok(TokenRecord::new(value, expires_in)))
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn then(self, step: Step) -> Self {
        self.script.lock().unwrap().steps.push_back(step);
        self
    }

    pub fn push(&self, step: Step) {
        self.script.lock().unwrap().steps.push_back(step);
    }

    pub fn set_fallback(&self, step: Step) {
        self.script.lock().unwrap().fallback = step;
    }

    pub fn calls(&self) -> usize {
        self.script.lock().unwrap().calls.len()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.script.lock().unwrap().calls.clone()
    }
}

impl TokenExchange for ScriptedExchange {
    async fn exchange(&self) -> Result<TokenRecord, TokenError> {
        let step = {
            let mut script = self.script.lock().unwrap();
            script.calls.push(Instant::now());
            match script.steps.pop_front() {
                Some(step) => step,
                None => script.fallback.clone(),
            }
        };
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        step
    }
}

pub fn record(value: &str, expires_in: u64) -> Step {
    Ok(TokenRecord::new(value, expires_in))
}

pub fn unavailable() -> Step {
    Err(TokenError::status(503, "upstream unavailable"))
}

/// Backoff without jitter so retry instants are predictable.
pub fn settings(safety_margin: Duration, min_refresh_interval: Duration, base_delay: Duration) -> RefreshSettings {
    RefreshSettings {
        safety_margin,
        min_refresh_interval,
        backoff: BackoffPolicy {
            base_delay,
            max_delay: base_delay * 8,
            multiplier: 2.0,
            jitter_ratio: 0.0,
        },
    }
}
