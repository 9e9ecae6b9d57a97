use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use http::StatusCode;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::settings::SettingsConfig;
use crate::error::TokenError;
use crate::manager::AutoManagedTokenManager;
use crate::observability::routes;
use crate::sources::oauth2::TokenExchange;

pub struct AppState<E: TokenExchange> {
    pub manager: Arc<AutoManagedTokenManager<E>>,
}

impl<E: TokenExchange> Clone for AppState<E> {
    fn clone(&self) -> Self {
        Self {
            manager: self.manager.clone(),
        }
    }
}

pub fn app<E: TokenExchange>(settings_config: &SettingsConfig, manager: Arc<AutoManagedTokenManager<E>>) -> Router {
    let state = AppState { manager };
    Router::new()
        .route("/token", get(get_token::<E>))
        .route("/health", get(health::<E>))
        .merge(routes::router::<E>(&settings_config.metrics))
        .with_state(state)
}

/// Serve the token, health and metrics routes until `shutdown` is cancelled.
pub async fn start<E: TokenExchange>(
    settings_config: &SettingsConfig,
    manager: Arc<AutoManagedTokenManager<E>>,
    shutdown: CancellationToken,
) -> Result<()> {
    let app = app(settings_config, manager);

    let bind_addr = &settings_config.server.host;
    let port = &settings_config.server.port;
    let listener = tokio::net::TcpListener::bind(format!("{}:{}", bind_addr, port))
        .await
        .with_context(|| format!("cannot bind {}:{}", bind_addr, port))?;
    info!(address = %bind_addr, port = %port, "http server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("http server failed")
}

async fn get_token<E: TokenExchange>(State(state): State<AppState<E>>) -> Response {
    match state.manager.current_token() {
        Ok(cached) => (
            StatusCode::OK,
            Json(json!({
                "access_token": cached.value(),
                "token_type": cached.record.token_type,
                "expires_at": cached.expires_at_unix(),
            })),
        )
            .into_response(),
        Err(err) => error_response(&err),
    }
}

async fn health<E: TokenExchange>(State(state): State<AppState<E>>) -> Response {
    match state.manager.current_token() {
        Ok(_) => (StatusCode::OK, "ok").into_response(),
        Err(err) => error_response(&err),
    }
}

fn error_response(err: &TokenError) -> Response {
    let status = match err {
        TokenError::State(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": err.to_string(), "reason": err.kind() }))).into_response()
}
