//! Google service-account authentication.
//!
//! Mints a signed JWT from a service-account key file and exchanges it for
//! an OAuth2 access token, cached until shortly before it expires.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::debug;

const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";
const TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
/// Refresh this many seconds before the token expires.
const EXPIRY_MARGIN_SECS: u64 = 60;

#[derive(Clone)]
struct CachedToken {
    access_token: String,
    expires_at: u64,
}

#[derive(Clone, Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    #[serde(default)]
    token_uri: Option<String>,
}

/// Access-token source for one service account.
#[derive(Clone)]
pub struct ServiceAccountAuth {
    key: ServiceAccountKey,
    token_cache: Arc<Mutex<Option<CachedToken>>>,
}

impl ServiceAccountAuth {
    /// Load the service-account key JSON from `path`.
    pub fn from_key_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read service account key: {:?}", path))?;
        Self::from_key_json(&json)
    }

    pub fn from_key_json(json: &str) -> Result<Self> {
        let key: ServiceAccountKey =
            serde_json::from_str(json).context("Failed to parse service account key")?;
        Ok(Self {
            key,
            token_cache: Arc::new(Mutex::new(None)),
        })
    }

    pub fn client_email(&self) -> &str {
        &self.key.client_email
    }

    fn token_uri(&self) -> &str {
        self.key.token_uri.as_deref().unwrap_or(TOKEN_URI)
    }

    fn cached(&self, now: u64) -> Option<String> {
        let cache = self.token_cache.lock().unwrap_or_else(|e| e.into_inner());
        cache
            .as_ref()
            .filter(|t| now < t.expires_at.saturating_sub(EXPIRY_MARGIN_SECS))
            .map(|t| t.access_token.clone())
    }

    /// Get a valid access token, refreshing if expired.
    pub async fn access_token(&self, client: &reqwest::Client) -> Result<String> {
        let now = now_secs();
        if let Some(token) = self.cached(now) {
            return Ok(token);
        }

        let claims = serde_json::json!({
            "iss": self.key.client_email,
            "scope": CLOUD_PLATFORM_SCOPE,
            "aud": self.token_uri(),
            "iat": now,
            "exp": now + 3600,
        });

        let header = jsonwebtoken::Header::new(jsonwebtoken::Algorithm::RS256);
        let encoding_key = jsonwebtoken::EncodingKey::from_rsa_pem(self.key.private_key.as_bytes())
            .context("Invalid RSA private key in service account JSON")?;

        let jwt = jsonwebtoken::encode(&header, &claims, &encoding_key)
            .context("Failed to encode JWT")?;

        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: String,
            expires_in: u64,
        }

        let resp: TokenResponse = client
            .post(self.token_uri())
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", &jwt),
            ])
            .send()
            .await
            .context("Token exchange request failed")?
            .error_for_status()
            .context("Token exchange returned error")?
            .json()
            .await
            .context("Failed to parse token response")?;

        debug!(
            "Access token refreshed for {} (expires in {}s)",
            self.key.client_email, resp.expires_in
        );

        let token = resp.access_token.clone();
        {
            let mut cache = self.token_cache.lock().unwrap_or_else(|e| e.into_inner());
            *cache = Some(CachedToken {
                access_token: resp.access_token,
                expires_at: now + resp.expires_in,
            });
        }

        Ok(token)
    }
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
