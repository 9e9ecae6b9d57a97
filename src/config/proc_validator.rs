//! Configuration validation with aggregated errors.
//! - Aggregates all issues into Vec<String>
//! - Validates:
//!   * token endpoint url and timeout
//!   * literal credentials are not blank
//!   * refresh / retry invariants
//!   * server and metrics settings

use reqwest::Url;
use tracing::{error, info};

use crate::config::settings::{RefreshConfig, SettingsConfig};
use crate::config::sources::{CredentialValue, ServiceConfig, TokenEndpointConfig};

/// Public entrypoint: returns Ok(()) or Err(Vec<String>) containing all issues.
pub fn validate_service_config(cfg: &ServiceConfig) -> Result<(), Vec<String>> {
    let mut errors: Vec<String> = Vec::new();

    validate_token(&cfg.token, &mut errors);
    validate_refresh(&cfg.refresh, &mut errors);
    validate_settings(&cfg.settings, &mut errors);

    if errors.is_empty() {
        info!("config validation passed");
        Ok(())
    } else {
        for e in &errors {
            error!("config validation: {}", e);
        }
        Err(errors)
    }
}

fn validate_token(token: &TokenEndpointConfig, errors: &mut Vec<String>) {
    match Url::parse(&token.url) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
        Ok(url) => errors.push(format!(
            "token.url: unsupported scheme '{}', expected http or https",
            url.scheme()
        )),
        Err(e) => errors.push(format!("token.url: '{}' is not a valid url: {}", token.url, e)),
    }

    if token.request_timeout_ms == 0 {
        errors.push("token.request_timeout_ms must be greater than 0".to_string());
    }

    validate_credential_value("token.credentials.client_id", &token.credentials.client_id, errors);
    validate_credential_value("token.credentials.client_secret", &token.credentials.client_secret, errors);
}

fn validate_credential_value(field: &str, value: &CredentialValue, errors: &mut Vec<String>) {
    match value {
        CredentialValue::Literal { value } if value.trim().is_empty() => {
            errors.push(format!("{}: literal value must not be empty", field));
        }
        CredentialValue::FromEnv { from_env, .. } if from_env.trim().is_empty() => {
            errors.push(format!("{}: from_env must name a variable", field));
        }
        CredentialValue::FromFile { path } if path.trim().is_empty() => {
            errors.push(format!("{}: path must not be empty", field));
        }
        _ => {}
    }
}

fn validate_refresh(refresh: &RefreshConfig, errors: &mut Vec<String>) {
    let retry = &refresh.retry;
    if retry.base_delay_ms == 0 {
        errors.push("refresh.retry.base_delay_ms must be greater than 0".to_string());
    }
    if retry.max_delay_ms < retry.base_delay_ms {
        errors.push(format!(
            "refresh.retry.max_delay_ms ({}) must be >= base_delay_ms ({})",
            retry.max_delay_ms, retry.base_delay_ms
        ));
    }
    if !(retry.multiplier >= 1.0 && retry.multiplier.is_finite()) {
        errors.push(format!("refresh.retry.multiplier ({}) must be >= 1.0", retry.multiplier));
    }
    if !(0.0..=1.0).contains(&retry.jitter_ratio) {
        errors.push(format!(
            "refresh.retry.jitter_ratio ({}) must be within 0.0..=1.0",
            retry.jitter_ratio
        ));
    }
    if refresh.min_refresh_interval_ms == 0 {
        errors.push("refresh.min_refresh_interval_ms must be greater than 0".to_string());
    }
}

fn validate_settings(settings: &SettingsConfig, errors: &mut Vec<String>) {
    if settings.server.port.parse::<u16>().is_err() {
        errors.push(format!("settings.server.port '{}' is not a valid port", settings.server.port));
    }
    if settings.server.host.trim().is_empty() {
        errors.push("settings.server.host must not be empty".to_string());
    }
    if settings.metrics.is_enabled && !settings.metrics.path.starts_with('/') {
        errors.push(format!(
            "settings.metrics.path '{}' must start with '/'",
            settings.metrics.path
        ));
    }
    if let Some(logging) = &settings.logging {
        let level = logging.level.to_lowercase();
        if !["trace", "debug", "info", "warn", "error"].contains(&level.as_str()) {
            errors.push(format!("settings.logging.level '{}' is not supported", logging.level));
        }
    }
}
