use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::settings::{RefreshConfig, SettingsConfig};
use crate::utils::constants::DEFAULT_HTTP_TIMEOUT_MS;

/// ================================
/// Full service configuration
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    #[serde(default)]
    pub settings: SettingsConfig,
    pub token: TokenEndpointConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
}

/// ================================
/// Token endpoint
/// ================================
#[derive(Debug, Deserialize, Clone)]
pub struct TokenEndpointConfig {
    pub url: String,
    #[serde(default)]
    pub auth_method: ClientAuthMethod,
    pub scope: Option<String>,
    /// disables TLS certificate validation, non-production endpoints only
    #[serde(default)]
    pub skip_cert_verify: bool,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    pub credentials: CredentialsConfig,
}

/// How client credentials travel to the token endpoint
#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ClientAuthMethod {
    /// JSON body `{"client_id", "client_secret"}`
    #[default]
    Json,
    /// urlencoded body with `grant_type=client_credentials`
    Form,
    /// `Authorization: Basic` header, urlencoded `grant_type` body
    Basic,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CredentialsConfig {
    pub client_id: CredentialValue,
    pub client_secret: CredentialValue,
}

/// Credential value sources
#[derive(Deserialize, Clone)]
#[serde(untagged)]
pub enum CredentialValue {
    Literal {
        value: String,
    },
    FromEnv {
        from_env: String,
        default: Option<String>,
    },
    FromFile {
        path: String,
    },
}

impl fmt::Debug for CredentialValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialValue::Literal { .. } => f.debug_struct("Literal").field("value", &"[redacted]").finish(),
            CredentialValue::FromEnv { from_env, .. } => f.debug_struct("FromEnv").field("from_env", from_env).finish(),
            CredentialValue::FromFile { path } => f.debug_struct("FromFile").field("path", path).finish(),
        }
    }
}

fn default_request_timeout_ms() -> u64 {
    DEFAULT_HTTP_TIMEOUT_MS
}
