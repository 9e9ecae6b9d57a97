//! Credential sources.
//!
//! The manager pulls a [`CredentialPair`] from exactly one source, once,
//! before it is started. Which source is used is decided when the manager is
//! built.

use std::{env, fmt, fs};

use secrecy::{ExposeSecret, SecretString};

use crate::config::sources::{CredentialValue, CredentialsConfig};
use crate::error::TokenError;

#[derive(Clone)]
pub struct CredentialPair {
    client_id: String,
    client_secret: SecretString,
}

impl CredentialPair {
    /// Both halves must be non-blank.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Result<Self, TokenError> {
        let client_id = client_id.into();
        let client_secret = client_secret.into();
        if client_id.trim().is_empty() {
            return Err(TokenError::Credential("client_id must not be empty".into()));
        }
        if client_secret.trim().is_empty() {
            return Err(TokenError::Credential("client_secret must not be empty".into()));
        }
        Ok(Self {
            client_id,
            client_secret: SecretString::new(client_secret),
        })
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn client_secret(&self) -> &SecretString {
        &self.client_secret
    }
}

impl fmt::Debug for CredentialPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPair")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .finish()
    }
}

/// Supplies the client identifier and secret.
pub trait CredentialSource {
    fn credentials(&self) -> Result<CredentialPair, TokenError>;
}

impl CredentialSource for CredentialPair {
    fn credentials(&self) -> Result<CredentialPair, TokenError> {
        Ok(self.clone())
    }
}

/// Reads both halves from environment variables, falling back to defaults when unset.
#[derive(Debug, Clone)]
pub struct EnvCredentials {
    pub client_id_var: String,
    pub client_secret_var: String,
    pub client_id_default: Option<String>,
    pub client_secret_default: Option<String>,
}

impl EnvCredentials {
    pub fn new(client_id_var: impl Into<String>, client_secret_var: impl Into<String>) -> Self {
        Self {
            client_id_var: client_id_var.into(),
            client_secret_var: client_secret_var.into(),
            client_id_default: None,
            client_secret_default: None,
        }
    }

    pub fn with_defaults(mut self, client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        self.client_id_default = Some(client_id.into());
        self.client_secret_default = Some(client_secret.into());
        self
    }
}

impl CredentialSource for EnvCredentials {
    fn credentials(&self) -> Result<CredentialPair, TokenError> {
        let client_id = env_or_default(&self.client_id_var, self.client_id_default.as_deref())?;
        let client_secret = env_or_default(&self.client_secret_var, self.client_secret_default.as_deref())?;
        CredentialPair::new(client_id, client_secret)
    }
}

impl CredentialSource for CredentialsConfig {
    fn credentials(&self) -> Result<CredentialPair, TokenError> {
        let client_id = resolve_value("client_id", &self.client_id)?;
        let client_secret = resolve_value("client_secret", &self.client_secret)?;
        CredentialPair::new(client_id, client_secret)
    }
}

fn env_or_default(var: &str, default: Option<&str>) -> Result<String, TokenError> {
    match env::var(var) {
        Ok(value) => Ok(value),
        Err(_) => default
            .map(str::to_owned)
            .ok_or_else(|| TokenError::Credential(format!("environment variable '{}' is not set", var))),
    }
}

fn resolve_value(field: &str, value: &CredentialValue) -> Result<String, TokenError> {
    match value {
        CredentialValue::Literal { value } => Ok(value.to_owned()),
        CredentialValue::FromEnv { from_env, default } => env_or_default(from_env, default.as_deref())
            .map_err(|err| TokenError::Credential(format!("{}: {}", field, err))),
        CredentialValue::FromFile { path } => fs::read_to_string(path)
            .map(|content| content.trim().to_string())
            .map_err(|err| TokenError::Credential(format!("{}: cannot read '{}': {}", field, path, err))),
    }
}

pub(crate) fn expose(pair: &CredentialPair) -> (&str, &str) {
    (pair.client_id(), pair.client_secret().expose_secret())
}
