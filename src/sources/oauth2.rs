use std::future::Future;
use std::time::Duration;

use base64::engine::general_purpose;
use base64::Engine;
use http::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cache::token::TokenRecord;
use crate::config::sources::{ClientAuthMethod, TokenEndpointConfig};
use crate::error::{ProtocolError, TokenError};
use crate::sources::credentials::{expose, CredentialPair};
use crate::utils::constants::{DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_HTTP_TIMEOUT_MS, MAX_TOKEN_LIFETIME_SECS};

static GRANT_TYPE: &str = "client_credentials";

/// One client-credentials exchange. The manager is generic over this seam.
pub trait TokenExchange: Send + Sync + 'static {
    fn exchange(&self) -> impl Future<Output = Result<TokenRecord, TokenError>> + Send;
}

#[derive(Debug, Clone)]
pub struct EndpointSettings {
    pub url: String,
    pub auth_method: ClientAuthMethod,
    pub scope: Option<String>,
    pub skip_cert_verify: bool,
    pub request_timeout: Duration,
}

impl EndpointSettings {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            auth_method: ClientAuthMethod::default(),
            scope: None,
            skip_cert_verify: false,
            request_timeout: Duration::from_millis(DEFAULT_HTTP_TIMEOUT_MS),
        }
    }
}

impl From<&TokenEndpointConfig> for EndpointSettings {
    fn from(cfg: &TokenEndpointConfig) -> Self {
        Self {
            url: cfg.url.to_owned(),
            auth_method: cfg.auth_method,
            scope: cfg.scope.to_owned().filter(|s| !s.trim().is_empty()),
            skip_cert_verify: cfg.skip_cert_verify,
            request_timeout: Duration::from_millis(cfg.request_timeout_ms),
        }
    }
}

/// Performs client-credentials exchanges against a single token endpoint.
#[derive(Debug, Clone)]
pub struct TokenEndpointClient {
    client: Client,
    url: Url,
    credentials: CredentialPair,
    auth_method: ClientAuthMethod,
    scope: Option<String>,
    skip_cert_verify: bool,
}

#[derive(Serialize)]
struct JsonCredentials<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    scope: Option<&'a str>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    token_type: Option<String>,
    expires_in: u64,
    refresh_token: Option<String>,
    scope: Option<String>,
    #[serde(default = "default_active")]
    active: bool,
}

fn default_active() -> bool {
    true
}

impl TokenEndpointClient {
    pub fn new(settings: EndpointSettings, credentials: CredentialPair) -> Result<Self, TokenError> {
        let url = Url::parse(&settings.url)
            .map_err(|err| TokenError::Configuration(format!("invalid token endpoint '{}': {}", settings.url, err)))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(TokenError::Configuration(format!(
                "unsupported token endpoint scheme '{}'",
                url.scheme()
            )));
        }

        if settings.skip_cert_verify {
            warn!(url = %url, "TLS certificate verification is disabled for the token endpoint");
        }

        let connect_timeout = settings
            .request_timeout
            .min(Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS));
        let client = Client::builder()
            .timeout(settings.request_timeout)
            .connect_timeout(connect_timeout)
            .danger_accept_invalid_certs(settings.skip_cert_verify)
            .build()
            .map_err(|err| TokenError::Configuration(format!("cannot build HTTP client: {}", err)))?;

        Ok(Self {
            client,
            url,
            credentials,
            auth_method: settings.auth_method,
            scope: settings.scope,
            skip_cert_verify: settings.skip_cert_verify,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Whether the HTTP client was built to accept invalid TLS certificates.
    pub fn skip_cert_verify(&self) -> bool {
        self.skip_cert_verify
    }

    /// POST the credentials and parse the issued token.
    pub async fn fetch_token(&self) -> Result<TokenRecord, TokenError> {
        let (client_id, client_secret) = expose(&self.credentials);
        let scope = self.scope.as_deref();

        let mut request = self
            .client
            .post(self.url.clone())
            .header(ACCEPT, "application/json");

        request = match self.auth_method {
            ClientAuthMethod::Json => request.json(&JsonCredentials {
                client_id,
                client_secret,
                scope,
            }),
            ClientAuthMethod::Form => {
                let mut form = vec![
                    ("grant_type", GRANT_TYPE),
                    ("client_id", client_id),
                    ("client_secret", client_secret),
                ];
                if let Some(scope) = scope {
                    form.push(("scope", scope));
                }
                request.form(&form)
            }
            ClientAuthMethod::Basic => {
                let encoded = general_purpose::STANDARD.encode(format!("{}:{}", client_id, client_secret));
                let mut form = vec![("grant_type", GRANT_TYPE)];
                if let Some(scope) = scope {
                    form.push(("scope", scope));
                }
                request
                    .header(AUTHORIZATION, format!("Basic {}", encoded))
                    .form(&form)
            }
        };

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            debug!(status = status.as_u16(), "token endpoint rejected the exchange");
            return Err(TokenError::status(status.as_u16(), &body));
        }

        parse_token_response(&body)
    }
}

impl TokenExchange for TokenEndpointClient {
    async fn exchange(&self) -> Result<TokenRecord, TokenError> {
        self.fetch_token().await
    }
}

/// Parse a 2xx body. A record flagged `active=false` is an error.
pub fn parse_token_response(body: &str) -> Result<TokenRecord, TokenError> {
    let response: TokenResponse = serde_json::from_str(body)?;
    if response.access_token.trim().is_empty() {
        return Err(ProtocolError::MalformedBody("empty access_token".into()).into());
    }
    if response.expires_in > MAX_TOKEN_LIFETIME_SECS {
        return Err(ProtocolError::MalformedBody(format!(
            "expires_in {} exceeds {} seconds",
            response.expires_in, MAX_TOKEN_LIFETIME_SECS
        ))
        .into());
    }
    if !response.active {
        return Err(TokenError::InactiveToken);
    }
    Ok(TokenRecord {
        value: response.access_token,
        token_type: response.token_type.unwrap_or_else(|| "Bearer".to_owned()),
        expires_in_seconds: response.expires_in,
        refresh_token: response.refresh_token,
        scope: response.scope,
        active: response.active,
    })
}
