//! OAuth2 access token sources for Google Cloud APIs.
//!
//! Tokens are obtained in one of four ways:
//! - a pre-issued bearer token supplied through configuration
//! - the compute metadata server available on GCE, GKE and Cloud Run
//! - a service account JSON key, exchanged through a signed RS256 JWT assertion
//! - none at all, for the local Pub/Sub emulator
//!
//! Fetched tokens are cached until shortly before they expire.

use super::pubsub::PubSubError;
use crate::provider::{PubSubAuthMethod, SecretString};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

#[cfg(test)]
#[path = "gcp_auth_tests.rs"]
mod tests;

/// Token endpoint of the metadata server for the default service account
pub const DEFAULT_METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// OAuth2 scope granting access to Pub/Sub
pub const PUBSUB_SCOPE: &str = "https://www.googleapis.com/auth/pubsub";

/// Default OAuth2 token endpoint for service account assertions
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

const JWT_BEARER_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Tokens are refreshed this long before their reported expiry
const EXPIRY_MARGIN_SECONDS: i64 = 60;

/// Lifetime requested for signed assertions
const ASSERTION_LIFETIME_SECONDS: i64 = 3600;

/// Source of bearer tokens attached to API requests
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Get a valid access token, or `None` when requests are sent unauthenticated
    async fn access_token(&self) -> Result<Option<String>, PubSubError>;
}

/// Build the token source matching an authentication method
pub fn token_source_for(
    auth: &PubSubAuthMethod,
    http_client: HttpClient,
) -> Result<Arc<dyn TokenSource>, PubSubError> {
    let source: Arc<dyn TokenSource> = match auth {
        PubSubAuthMethod::MetadataServer => Arc::new(MetadataServerTokenSource::new(http_client)),
        PubSubAuthMethod::AccessToken { token } => {
            if token.is_empty() {
                return Err(PubSubError::ConfigurationError(
                    "access token must not be empty".to_string(),
                ));
            }
            Arc::new(StaticTokenSource::new(token.clone()))
        }
        PubSubAuthMethod::ServiceAccountKey { path } => {
            Arc::new(ServiceAccountTokenSource::from_file(path, http_client)?)
        }
        PubSubAuthMethod::Emulator => Arc::new(NoAuthTokenSource),
    };
    Ok(source)
}

// ============================================================================
// Token cache
// ============================================================================

#[derive(Clone)]
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn new(token: String, expires_in_seconds: i64) -> Self {
        Self {
            token,
            expires_at: Utc::now() + Duration::seconds(expires_in_seconds),
        }
    }

    fn is_fresh(&self) -> bool {
        Utc::now() + Duration::seconds(EXPIRY_MARGIN_SECONDS) < self.expires_at
    }
}

/// Response body shared by the metadata server and the OAuth2 token endpoint
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    ASSERTION_LIFETIME_SECONDS
}

async fn read_token_response(
    response: reqwest::Response,
    source: &str,
) -> Result<TokenResponse, PubSubError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| PubSubError::NetworkError(format!("Failed to read token response: {}", e)))?;

    if !status.is_success() {
        return Err(PubSubError::Authentication(format!(
            "{} returned HTTP {}: {}",
            source,
            status.as_u16(),
            body
        )));
    }

    serde_json::from_str(&body).map_err(|e| {
        PubSubError::Authentication(format!("{} returned an unreadable token: {}", source, e))
    })
}

// ============================================================================
// Static token
// ============================================================================

/// Pre-issued token used verbatim
pub struct StaticTokenSource {
    token: SecretString,
}

impl StaticTokenSource {
    pub fn new(token: SecretString) -> Self {
        Self { token }
    }
}

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn access_token(&self) -> Result<Option<String>, PubSubError> {
        Ok(Some(self.token.expose_secret().to_string()))
    }
}

// ============================================================================
// Emulator
// ============================================================================

/// No authentication, used against the Pub/Sub emulator
pub struct NoAuthTokenSource;

#[async_trait]
impl TokenSource for NoAuthTokenSource {
    async fn access_token(&self) -> Result<Option<String>, PubSubError> {
        Ok(None)
    }
}

// ============================================================================
// Metadata server
// ============================================================================

/// Token source backed by the compute metadata server
pub struct MetadataServerTokenSource {
    http_client: HttpClient,
    token_url: String,
    cache: RwLock<Option<CachedToken>>,
}

impl MetadataServerTokenSource {
    pub fn new(http_client: HttpClient) -> Self {
        Self::with_url(http_client, DEFAULT_METADATA_TOKEN_URL)
    }

    /// Use a non-default token URL
    pub fn with_url(http_client: HttpClient, token_url: impl Into<String>) -> Self {
        Self {
            http_client,
            token_url: token_url.into(),
            cache: RwLock::new(None),
        }
    }

    async fn fetch(&self) -> Result<CachedToken, PubSubError> {
        let response = self
            .http_client
            .get(&self.token_url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| {
                PubSubError::Authentication(format!("Metadata server unreachable: {}", e))
            })?;

        let token = read_token_response(response, "metadata server").await?;
        Ok(CachedToken::new(token.access_token, token.expires_in))
    }
}

#[async_trait]
impl TokenSource for MetadataServerTokenSource {
    async fn access_token(&self) -> Result<Option<String>, PubSubError> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref().filter(|c| c.is_fresh()) {
                return Ok(Some(cached.token.clone()));
            }
        }

        let mut cache = self.cache.write().await;
        if let Some(cached) = cache.as_ref().filter(|c| c.is_fresh()) {
            return Ok(Some(cached.token.clone()));
        }

        let fresh = self.fetch().await?;
        tracing::debug!(expires_at = %fresh.expires_at, "Fetched access token from metadata server");
        let token = fresh.token.clone();
        *cache = Some(fresh);
        Ok(Some(token))
    }
}

// ============================================================================
// Service account key
// ============================================================================

/// Fields of a service account JSON key file used for token exchange
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: SecretString,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key", &self.private_key)
            .field("private_key_id", &self.private_key_id)
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

/// Token source exchanging a signed JWT assertion for an access token
pub struct ServiceAccountTokenSource {
    http_client: HttpClient,
    key: ServiceAccountKey,
    encoding_key: EncodingKey,
    cache: RwLock<Option<CachedToken>>,
}

impl ServiceAccountTokenSource {
    /// Create token source from a parsed key
    pub fn new(key: ServiceAccountKey, http_client: HttpClient) -> Result<Self, PubSubError> {
        if key.client_email.is_empty() {
            return Err(PubSubError::ConfigurationError(
                "service account key has no client_email".to_string(),
            ));
        }

        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.expose_secret().as_bytes())
            .map_err(|e| {
                PubSubError::ConfigurationError(format!(
                    "service account private key is not a valid RSA PEM: {}",
                    e
                ))
            })?;

        Ok(Self {
            http_client,
            key,
            encoding_key,
            cache: RwLock::new(None),
        })
    }

    /// Load key from a JSON key file
    pub fn from_file(path: &Path, http_client: HttpClient) -> Result<Self, PubSubError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            PubSubError::ConfigurationError(format!(
                "cannot read service account key '{}': {}",
                path.display(),
                e
            ))
        })?;

        let key: ServiceAccountKey = serde_json::from_str(&contents).map_err(|e| {
            PubSubError::ConfigurationError(format!(
                "service account key '{}' is not valid JSON: {}",
                path.display(),
                e
            ))
        })?;

        Self::new(key, http_client)
    }

    /// Build the signed assertion sent to the token endpoint
    fn signed_assertion(&self) -> Result<String, PubSubError> {
        let iat = Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: &self.key.client_email,
            scope: PUBSUB_SCOPE,
            aud: &self.key.token_uri,
            iat,
            exp: iat + ASSERTION_LIFETIME_SECONDS,
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key.private_key_id.clone();

        jsonwebtoken::encode(&header, &claims, &self.encoding_key)
            .map_err(|e| PubSubError::Authentication(format!("Failed to sign assertion: {}", e)))
    }

    async fn fetch(&self) -> Result<CachedToken, PubSubError> {
        let assertion = self.signed_assertion()?;

        let response = self
            .http_client
            .post(&self.key.token_uri)
            .form(&[
                ("grant_type", JWT_BEARER_GRANT_TYPE),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await
            .map_err(|e| PubSubError::NetworkError(format!("Token endpoint unreachable: {}", e)))?;

        let token = read_token_response(response, "token endpoint").await?;
        Ok(CachedToken::new(token.access_token, token.expires_in))
    }
}

#[async_trait]
impl TokenSource for ServiceAccountTokenSource {
    async fn access_token(&self) -> Result<Option<String>, PubSubError> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref().filter(|c| c.is_fresh()) {
                return Ok(Some(cached.token.clone()));
            }
        }

        let mut cache = self.cache.write().await;
        if let Some(cached) = cache.as_ref().filter(|c| c.is_fresh()) {
            return Ok(Some(cached.token.clone()));
        }

        let fresh = self.fetch().await?;
        tracing::debug!(
            client_email = %self.key.client_email,
            expires_at = %fresh.expires_at,
            "Exchanged service account assertion for access token"
        );
        let token = fresh.token.clone();
        *cache = Some(fresh);
        Ok(Some(token))
    }
}
