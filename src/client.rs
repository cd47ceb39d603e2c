use serde::Deserialize;
use serde_json::json;
use url::Url;

use crate::error::{BoxError, Error};
use crate::tokens::RefreshedTokens;
use crate::traits::{BootstrapIssuer, TokenRefresher};

/// Endpoints of the credential backend.
///
/// ```rust,ignore
/// use widget_relay::ClientConfig;
///
/// let config = ClientConfig::new("https://auth.example.com/api/auth/refresh".parse()?)
///     .with_bootstrap_url("https://auth.example.com/api/widgets/bootstrap".parse()?);
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ClientConfig {
    pub(crate) refresh_url: Url,
    pub(crate) bootstrap_url: Option<Url>,
}

impl ClientConfig {
    #[must_use]
    pub fn new(refresh_url: Url) -> Self {
        Self {
            refresh_url,
            bootstrap_url: None,
        }
    }

    /// Create config from environment variables.
    ///
    /// # Required env vars
    /// - `WIDGET_RELAY_REFRESH_URL`: token refresh endpoint
    ///
    /// # Optional env vars
    /// - `WIDGET_RELAY_BOOTSTRAP_URL`: bootstrap-token endpoint
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the refresh URL is missing or either URL is invalid.
    pub fn from_env() -> Result<Self, Error> {
        let refresh_url = std::env::var("WIDGET_RELAY_REFRESH_URL")
            .map_err(|_| Error::Config("WIDGET_RELAY_REFRESH_URL is required".into()))?;
        let mut config = Self::new(parse_url("WIDGET_RELAY_REFRESH_URL", &refresh_url)?);

        if let Ok(bootstrap_url) = std::env::var("WIDGET_RELAY_BOOTSTRAP_URL") {
            config = config.with_bootstrap_url(parse_url("WIDGET_RELAY_BOOTSTRAP_URL", &bootstrap_url)?);
        }
        Ok(config)
    }

    #[must_use]
    pub fn with_bootstrap_url(mut self, url: Url) -> Self {
        self.bootstrap_url = Some(url);
        self
    }

    #[must_use]
    pub fn refresh_url(&self) -> &Url {
        &self.refresh_url
    }

    #[must_use]
    pub fn bootstrap_url(&self) -> Option<&Url> {
        self.bootstrap_url.as_ref()
    }
}

fn parse_url(name: &str, value: &str) -> Result<Url, Error> {
    value
        .parse()
        .map_err(|e| Error::Config(format!("{name}: {e}")))
}

#[derive(Deserialize)]
struct BootstrapResponse {
    token: String,
}

/// HTTP implementation of the renewal and bootstrap collaborators.
#[derive(Clone)]
pub struct RelayClient {
    config: ClientConfig,
    http: reqwest::Client,
}

impl RelayClient {
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Exchange a refresh token for fresh access/id tokens.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] on network failure, or
    /// [`Error::Collaborator`] if the refresh endpoint rejects the request.
    pub async fn refresh_tokens(&self, refresh_token: &str) -> Result<RefreshedTokens, Error> {
        let response = self
            .http
            .post(self.config.refresh_url.clone())
            .json(&json!({ "refreshToken": refresh_token }))
            .send()
            .await?;

        let response = Self::ensure_success(response, "token refresh").await?;
        response.json::<RefreshedTokens>().await.map_err(Into::into)
    }

    /// Mint a bootstrap token for a widget backend.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when no bootstrap URL is configured,
    /// [`Error::Http`] on network failure, or [`Error::Collaborator`] if the
    /// endpoint rejects the request.
    pub async fn issue_bootstrap_token(&self, access_token: &str) -> Result<String, Error> {
        let url = self
            .config
            .bootstrap_url
            .clone()
            .ok_or_else(|| Error::Config("bootstrap URL not configured".into()))?;

        let response = self
            .http
            .post(url)
            .bearer_auth(access_token)
            .send()
            .await?;

        let response = Self::ensure_success(response, "bootstrap issuance").await?;
        Ok(response.json::<BootstrapResponse>().await?.token)
    }

    /// Checks HTTP response status; returns the response on success or an error with details.
    async fn ensure_success(
        response: reqwest::Response,
        operation: &'static str,
    ) -> Result<reqwest::Response, Error> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(Error::Collaborator {
            operation,
            status: Some(status),
            detail: body,
        })
    }
}

impl TokenRefresher for RelayClient {
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedTokens, BoxError> {
        Ok(self.refresh_tokens(refresh_token).await?)
    }
}

impl BootstrapIssuer for RelayClient {
    async fn issue(&self, access_token: &str) -> Result<String, BoxError> {
        Ok(self.issue_bootstrap_token(access_token).await?)
    }
}
