//! On-disk OAuth token store with refresh-token grant.
//!
//! Tokens live in `tokens.json` inside the state directory, one entry per
//! provider. Access tokens are refreshed ahead of expiry; a provider with
//! no stored refresh token surfaces `AuthRequired` so the CLI can point at
//! the login flow.

use super::{ProviderError, ProviderResult};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Refresh this far before the recorded expiry.
const EXPIRY_SKEW_SECS: i64 = 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredToken {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl StoredToken {
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - Duration::seconds(EXPIRY_SKEW_SECS) > now
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TokenFile {
    #[serde(default)]
    providers: HashMap<String, StoredToken>,
}

/// Handle on `tokens.json`.
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            path: state_dir.join("tokens.json"),
        }
    }

    fn read_file(&self) -> ProviderResult<TokenFile> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(TokenFile::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn load(&self, provider: &str) -> ProviderResult<Option<StoredToken>> {
        Ok(self.read_file()?.providers.get(provider).cloned())
    }

    /// Write-through with the same temp-and-rename discipline as the state
    /// store; token loss on crash would force a re-login.
    pub fn save(&self, provider: &str, token: StoredToken) -> ProviderResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = self.read_file()?;
        file.providers.insert(provider.to_string(), token);

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(&file)?)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!(provider, path = %self.path.display(), "token saved");
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
    refresh_token: Option<String>,
}

/// Endpoint and client credentials for one provider's token grants.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
}

impl OAuthClient {
    async fn grant(
        &self,
        http: &reqwest::Client,
        params: &[(&str, &str)],
        fallback_refresh: Option<&str>,
    ) -> ProviderResult<StoredToken> {
        let response = http
            .post(&self.token_url)
            .form(params)
            .send()
            .await
            .map_err(|e| ProviderError::Token(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Token(format!(
                "token endpoint returned {status}: {body}"
            )));
        }

        let parsed: TokenResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Token(e.to_string()))?;

        let refresh_token = parsed
            .refresh_token
            .or_else(|| fallback_refresh.map(str::to_string))
            .ok_or_else(|| ProviderError::Token("no refresh token in response".to_string()))?;

        Ok(StoredToken {
            access_token: parsed.access_token,
            refresh_token,
            expires_at: Utc::now() + Duration::seconds(parsed.expires_in as i64),
        })
    }

    pub async fn refresh(
        &self,
        http: &reqwest::Client,
        refresh_token: &str,
    ) -> ProviderResult<StoredToken> {
        self.grant(
            http,
            &[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ],
            Some(refresh_token),
        )
        .await
    }

    pub async fn exchange_code(
        &self,
        http: &reqwest::Client,
        code: &str,
        redirect_uri: &str,
    ) -> ProviderResult<StoredToken> {
        self.grant(
            http,
            &[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", redirect_uri),
                ("grant_type", "authorization_code"),
            ],
            None,
        )
        .await
    }
}

/// Per-provider token cache backed by the store.
pub struct TokenManager {
    provider: String,
    store: TokenStore,
    oauth: OAuthClient,
    cached: tokio::sync::Mutex<Option<StoredToken>>,
}

impl TokenManager {
    pub fn new(provider: impl Into<String>, store: TokenStore, oauth: OAuthClient) -> Self {
        Self {
            provider: provider.into(),
            store,
            oauth,
            cached: tokio::sync::Mutex::new(None),
        }
    }

    /// A valid bearer token, refreshing through the OAuth client if needed.
    pub async fn bearer(&self, http: &reqwest::Client) -> ProviderResult<String> {
        let mut cached = self.cached.lock().await;
        let now = Utc::now();

        if let Some(token) = cached.as_ref() {
            if token.is_fresh(now) {
                return Ok(token.access_token.clone());
            }
        }

        let stored = match cached.clone() {
            Some(token) => token,
            None => self
                .store
                .load(&self.provider)?
                .ok_or_else(|| ProviderError::AuthRequired(self.provider.clone()))?,
        };

        if stored.is_fresh(now) {
            let access = stored.access_token.clone();
            *cached = Some(stored);
            return Ok(access);
        }

        info!(provider = %self.provider, "refreshing access token");
        let refreshed = self.oauth.refresh(http, &stored.refresh_token).await?;
        self.store.save(&self.provider, refreshed.clone())?;
        let access = refreshed.access_token.clone();
        *cached = Some(refreshed);
        Ok(access)
    }
}
