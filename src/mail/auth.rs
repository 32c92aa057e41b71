//! Google OAuth access tokens for the Gmail API.
//!
//! Tokens come from, in order: an explicit access token, a cached token that
//! is still valid, or a refresh-token grant against the token endpoint.
//! The interactive consent flow is not handled here; the refresh token must
//! be obtained beforehand and stored in the token file or the environment.

use std::path::Path;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{ConfigError, MailError};

pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Refresh this long before the token actually expires.
const EXPIRY_BUFFER: Duration = Duration::from_secs(60);

/// Lifetime assumed for tokens supplied without an expiry.
const STATIC_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

const REFRESH_TIMEOUT: Duration = Duration::from_secs(30);

/// Something that can hand out a bearer token.
#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    async fn access_token(&self) -> Result<String, MailError>;
}

/// A fixed token. Used in tests and for short-lived manual runs.
pub struct StaticToken(SecretString);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::from(token.into()))
    }
}

#[async_trait]
impl AccessTokenSource for StaticToken {
    async fn access_token(&self) -> Result<String, MailError> {
        Ok(self.0.expose_secret().to_string())
    }
}

/// OAuth credentials.
#[derive(Debug, Clone, Default)]
pub struct GoogleAuthConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<SecretString>,
    pub refresh_token: Option<SecretString>,
    /// Pre-issued access token, assumed valid for an hour.
    pub access_token: Option<SecretString>,
    pub token_uri: Option<String>,
}

/// The authorized-user file written by Google's client libraries.
#[derive(Debug, Deserialize)]
struct TokenFile {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    token_uri: Option<String>,
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default)]
    client_secret: Option<String>,
}

impl GoogleAuthConfig {
    /// Read credentials through `lookup` (normally the process environment).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            client_id: non_empty("GOOGLE_CLIENT_ID"),
            client_secret: non_empty("GOOGLE_CLIENT_SECRET").map(SecretString::from),
            refresh_token: non_empty("GOOGLE_REFRESH_TOKEN").map(SecretString::from),
            access_token: non_empty("GMAIL_ACCESS_TOKEN").map(SecretString::from),
            token_uri: None,
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Fill fields that are still unset from a token file. A missing file
    /// is not an error.
    pub fn with_token_file(mut self, path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!(path = %path.display(), "No token file");
            return Ok(self);
        }
        let content = std::fs::read_to_string(path)?;
        let file: TokenFile = serde_json::from_str(&content).map_err(|e| {
            ConfigError::ParseError(format!("{}: {e}", path.display()))
        })?;

        if self.client_id.is_none() {
            self.client_id = file.client_id;
        }
        if self.client_secret.is_none() {
            self.client_secret = file.client_secret.map(SecretString::from);
        }
        if self.refresh_token.is_none() {
            self.refresh_token = file.refresh_token.map(SecretString::from);
        }
        // A stored access token is likely stale; only use it when nothing
        // can refresh.
        if self.access_token.is_none() && self.refresh_token.is_none() {
            self.access_token = file.token.map(SecretString::from);
        }
        if self.token_uri.is_none() {
            self.token_uri = file.token_uri;
        }
        Ok(self)
    }

    fn can_refresh(&self) -> bool {
        self.client_id.is_some() && self.client_secret.is_some() && self.refresh_token.is_some()
    }

    pub fn is_valid(&self) -> bool {
        self.access_token.is_some() || self.can_refresh()
    }
}

#[derive(Debug)]
struct CachedToken {
    token: SecretString,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Caching OAuth token source.
pub struct GoogleAuth {
    http: reqwest::Client,
    config: GoogleAuthConfig,
    cache: Mutex<Option<CachedToken>>,
}

impl GoogleAuth {
    pub fn new(config: GoogleAuthConfig) -> Result<Self, ConfigError> {
        Self::with_timeout(config, REFRESH_TIMEOUT)
    }

    /// Like [`GoogleAuth::new`] with a custom timeout for token refreshes.
    pub fn with_timeout(config: GoogleAuthConfig, timeout: Duration) -> Result<Self, ConfigError> {
        if !config.is_valid() {
            return Err(ConfigError::MissingRequired {
                key: "GMAIL_ACCESS_TOKEN".to_string(),
                hint: "Set GMAIL_ACCESS_TOKEN, or GOOGLE_CLIENT_ID + GOOGLE_CLIENT_SECRET + \
                       GOOGLE_REFRESH_TOKEN, or provide a token file"
                    .to_string(),
            });
        }

        let cache = config.access_token.as_ref().map(|token| CachedToken {
            token: token.clone(),
            expires_at: Instant::now() + STATIC_TOKEN_LIFETIME,
        });

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::ParseError(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            config,
            cache: Mutex::new(cache),
        })
    }

    async fn refresh(&self) -> Result<CachedToken, MailError> {
        let (Some(client_id), Some(client_secret), Some(refresh_token)) = (
            self.config.client_id.as_deref(),
            self.config.client_secret.as_ref(),
            self.config.refresh_token.as_ref(),
        ) else {
            return Err(MailError::TokenRefresh(
                "access token expired and no refresh credentials are configured".to_string(),
            ));
        };

        let token_uri = self
            .config
            .token_uri
            .as_deref()
            .unwrap_or(DEFAULT_TOKEN_URI);
        debug!(token_uri, "Refreshing Google OAuth token");

        let response = self
            .http
            .post(token_uri)
            .form(&[
                ("client_id", client_id),
                ("client_secret", client_secret.expose_secret()),
                ("refresh_token", refresh_token.expose_secret()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| MailError::TokenRefresh(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MailError::TokenRefresh(format!("HTTP {status}: {body}")));
        }

        let parsed: TokenResponse = response
            .json()
            .await
            .map_err(|e| MailError::TokenRefresh(format!("invalid token response: {e}")))?;

        let lifetime = parsed
            .expires_in
            .map(Duration::from_secs)
            .unwrap_or(STATIC_TOKEN_LIFETIME);
        info!(expires_in_secs = lifetime.as_secs(), "Google OAuth token refreshed");

        Ok(CachedToken {
            token: SecretString::from(parsed.access_token),
            expires_at: Instant::now() + lifetime,
        })
    }
}

#[async_trait]
impl AccessTokenSource for GoogleAuth {
    async fn access_token(&self) -> Result<String, MailError> {
        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.as_ref()
            && cached.expires_at > Instant::now() + EXPIRY_BUFFER
        {
            return Ok(cached.token.expose_secret().to_string());
        }

        let fresh = self.refresh().await?;
        let token = fresh.token.expose_secret().to_string();
        *cache = Some(fresh);
        Ok(token)
    }
}
