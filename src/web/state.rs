use std::sync::Arc;

use anyhow::{Context, Result};
use reqwest::Client;
use tracing::{info, warn};

use crate::{
    api::{ApiClient, ApiError, ErrorDetail},
    archive::{self, Archive},
    cache::{CacheStore, InMemoryCacheStore, RedisCacheStore},
    config::Settings,
    oidc::OidcClient,
    session::SessionStore,
};

/// Principal id under which the client-credentials token is cached.
const CLIENT_PRINCIPAL: &str = "client";

#[derive(Clone)]
pub struct AppState {
    settings: Arc<Settings>,
    api: ApiClient,
    oidc: Arc<OidcClient>,
    sessions: SessionStore,
    archive: Arc<dyn Archive>,
}

impl AppState {
    pub async fn new() -> Result<Self> {
        let settings = Settings::from_env()?;

        let cache: Arc<dyn CacheStore> = match &settings.cache_url {
            Some(url) => Arc::new(RedisCacheStore::connect(url).await?),
            None => {
                warn!("REDIS_URL not set; using an in-process session cache");
                Arc::new(InMemoryCacheStore::new())
            }
        };

        info!(api_url = %settings.api_url, catalog = %settings.catalog_id, "portal configured");
        Self::with_cache(settings, cache)
    }

    /// Assemble the state from explicit parts; `new()` and tests share this.
    pub fn with_cache(settings: Settings, cache: Arc<dyn CacheStore>) -> Result<Self> {
        let http = Client::new();
        let api = ApiClient::new(http.clone(), settings.api_url.clone());
        let oidc = OidcClient::new(
            http,
            settings.hydra_url.clone(),
            settings.client_id.clone(),
            settings.client_secret.clone(),
            settings.client_scope.clone(),
        );
        let sessions = SessionStore::new(cache, settings.client_id.clone());
        let archive = archive::from_url(&settings.archive_url)
            .context("failed to configure archive backend")?;

        Ok(Self {
            settings: Arc::new(settings),
            api,
            oidc: Arc::new(oidc),
            sessions,
            archive,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn oidc(&self) -> &OidcClient {
        &self.oidc
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn archive(&self) -> &Arc<dyn Archive> {
        &self.archive
    }

    /// Bearer token for API calls on behalf of a logged-in user. The cached
    /// token is refreshed transparently when expired; a missing token or a
    /// failed refresh surfaces as a 401 so the caller forces re-login.
    pub async fn user_token(&self, user_id: &str) -> Result<String, ApiError> {
        let token = self
            .sessions
            .fetch_token(user_id)
            .await
            .map_err(ApiError::unavailable)?;
        let Some(token) = token else {
            return Err(session_expired());
        };

        if !token.is_expired() {
            return Ok(token.access_token);
        }

        let Some(refresh_token) = token.refresh_token.clone() else {
            return Err(session_expired());
        };
        match self.oidc.refresh(&refresh_token).await {
            Ok(mut refreshed) => {
                // some providers rotate the refresh token, some omit it
                if refreshed.refresh_token.is_none() {
                    refreshed.refresh_token = Some(refresh_token);
                }
                self.sessions
                    .update_token(user_id, &refreshed)
                    .await
                    .map_err(ApiError::unavailable)?;
                Ok(refreshed.access_token)
            }
            Err(err) => {
                warn!(user_id, ?err, "token refresh failed");
                Err(session_expired())
            }
        }
    }

    /// Bearer token for anonymous catalog access, obtained with the client
    /// credentials grant and cached alongside user tokens.
    pub async fn client_token(&self) -> Result<String, ApiError> {
        if let Some(token) = self
            .sessions
            .fetch_token(CLIENT_PRINCIPAL)
            .await
            .map_err(ApiError::unavailable)?
        {
            if !token.is_expired() {
                return Ok(token.access_token);
            }
        }

        let token = self
            .oidc
            .client_credentials()
            .await
            .map_err(ApiError::unavailable)?;
        self.sessions
            .update_token(CLIENT_PRINCIPAL, &token)
            .await
            .map_err(ApiError::unavailable)?;
        Ok(token.access_token)
    }
}

fn session_expired() -> ApiError {
    ApiError::new(
        401,
        ErrorDetail::Message("Your session has expired.".to_string()),
    )
}
