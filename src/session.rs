use std::{collections::HashSet, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{cache::CacheStore, oidc::TokenSet};

pub const SESSION_TTL_DAYS: i64 = 7;

/// Window within which a login callback must present its state value.
const LOGIN_STATE_TTL: Duration = Duration::from_secs(300);
/// Window within which the provider's end-session callback must echo the
/// logout state value.
const LOGOUT_STATE_TTL: Duration = Duration::from_secs(10);

/// Snapshot of the logged-in user, cached at login from the provider's
/// identity claims.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LocalUser {
    pub id: String,
    pub name: String,
    pub email: String,
    pub active: bool,
    pub verified: bool,
    pub picture: Option<String>,
    pub role_ids: Vec<String>,
}

impl LocalUser {
    pub fn is_active(&self) -> bool {
        self.active && self.verified
    }
}

/// Per-user session state in the shared cache: OAuth2 token set, user
/// snapshot, permission set, session-cookie mapping, and the single-use
/// login/logout state values.
#[derive(Clone)]
pub struct SessionStore {
    cache: Arc<dyn CacheStore>,
    client_id: String,
}

impl SessionStore {
    pub fn new(cache: Arc<dyn CacheStore>, client_id: impl Into<String>) -> Self {
        Self {
            cache,
            client_id: client_id.into(),
        }
    }

    fn key(&self, user_id: &str, kind: &str) -> String {
        format!("{}.{}.{}", self.client_id, user_id, kind)
    }

    fn session_ttl() -> Duration {
        Duration::from_secs(SESSION_TTL_DAYS as u64 * 86_400)
    }

    /// Return the cached token set for a user, if any. Consumed before every
    /// API call made on the user's behalf.
    pub async fn fetch_token(&self, user_id: &str) -> Result<Option<TokenSet>> {
        let fields = self.cache.hash_get_all(&self.key(user_id, "token")).await?;
        Ok(TokenSet::from_fields(&fields))
    }

    /// Overwrite the cached token set, e.g. after a refresh.
    pub async fn update_token(&self, user_id: &str, token: &TokenSet) -> Result<()> {
        self.cache
            .hash_set(&self.key(user_id, "token"), &token.to_fields(), None)
            .await
    }

    pub async fn store_user(&self, user: &LocalUser) -> Result<()> {
        let serialized = serde_json::to_string(user).context("failed to serialize user snapshot")?;
        self.cache
            .set(&self.key(&user.id, "user"), &serialized, None)
            .await
    }

    pub async fn get_user(&self, user_id: &str) -> Result<Option<LocalUser>> {
        match self.cache.get(&self.key(user_id, "user")).await? {
            Some(serialized) => Ok(serde_json::from_str(&serialized).ok()),
            None => Ok(None),
        }
    }

    pub async fn store_permissions(&self, user_id: &str, scopes: &HashSet<String>) -> Result<()> {
        let serialized =
            serde_json::to_string(scopes).context("failed to serialize permission set")?;
        self.cache
            .set(&self.key(user_id, "permissions"), &serialized, None)
            .await
    }

    /// Return the cached permission set; absent or unreadable entries read
    /// as no permissions.
    pub async fn get_permissions(&self, user_id: &str) -> Result<HashSet<String>> {
        match self.cache.get(&self.key(user_id, "permissions")).await? {
            Some(serialized) => Ok(serde_json::from_str(&serialized).unwrap_or_default()),
            None => Ok(HashSet::new()),
        }
    }

    /// Establish the local session principal, returning the opaque token
    /// carried by the session cookie.
    pub async fn create_session(&self, user_id: &str) -> Result<String> {
        let token = Uuid::new_v4().to_string();
        self.cache
            .set(
                &format!("{}.session.{}", self.client_id, token),
                user_id,
                Some(Self::session_ttl()),
            )
            .await?;
        Ok(token)
    }

    pub async fn session_user_id(&self, session_token: &str) -> Result<Option<String>> {
        self.cache
            .get(&format!("{}.session.{}", self.client_id, session_token))
            .await
    }

    pub async fn delete_session(&self, session_token: &str) -> Result<()> {
        self.cache
            .delete(&format!("{}.session.{}", self.client_id, session_token))
            .await
    }

    /// Record the state value for an authorization redirect; the login
    /// callback must present it within [`LOGIN_STATE_TTL`].
    pub async fn set_login_state(&self, state: &str) -> Result<()> {
        self.cache
            .set(
                &format!("{}.authstate.{}", self.client_id, state),
                "1",
                Some(LOGIN_STATE_TTL),
            )
            .await
    }

    /// Consume a login state value; false if unknown or expired.
    pub async fn take_login_state(&self, state: &str) -> Result<bool> {
        let key = format!("{}.authstate.{}", self.client_id, state);
        match self.cache.get(&key).await? {
            Some(_) => {
                self.cache.delete(&key).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Record the single-use state value for a logout attempt.
    pub async fn set_logout_state(&self, user_id: &str, state: &str) -> Result<()> {
        self.cache
            .set(&self.key(user_id, "state"), state, Some(LOGOUT_STATE_TTL))
            .await
    }

    /// Consume the logout state value if it matches; a mismatched or expired
    /// value leaves the cached entry's session untouched and returns false.
    pub async fn take_logout_state(&self, user_id: &str, state: &str) -> Result<bool> {
        let key = self.key(user_id, "state");
        match self.cache.get(&key).await? {
            Some(cached) if cached == state => {
                self.cache.delete(&key).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Drop all cached state for a user: token set, snapshot and permissions.
    pub async fn clear_user(&self, user_id: &str) -> Result<()> {
        self.cache.delete(&self.key(user_id, "token")).await?;
        self.cache.delete(&self.key(user_id, "user")).await?;
        self.cache.delete(&self.key(user_id, "permissions")).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCacheStore;

    fn store() -> SessionStore {
        SessionStore::new(Arc::new(InMemoryCacheStore::new()), "portal")
    }

    fn token() -> TokenSet {
        TokenSet {
            access_token: "at".into(),
            token_type: "bearer".into(),
            refresh_token: Some("rt".into()),
            id_token: Some("idt".into()),
            scope: Some("openid package:read".into()),
            expires_at: Some(1_900_000_000),
        }
    }

    #[tokio::test]
    async fn token_store_round_trips() {
        let sessions = store();
        sessions.update_token("u1", &token()).await.unwrap();
        assert_eq!(sessions.fetch_token("u1").await.unwrap(), Some(token()));
    }

    #[tokio::test]
    async fn fetch_token_is_empty_for_unknown_user() {
        let sessions = store();
        assert_eq!(sessions.fetch_token("nobody").await.unwrap(), None);
    }

    #[tokio::test]
    async fn session_principal_survives_logout_state_mismatch() {
        let sessions = store();
        let session_token = sessions.create_session("u1").await.unwrap();
        sessions.set_logout_state("u1", "expected").await.unwrap();

        assert!(!sessions.take_logout_state("u1", "forged").await.unwrap());
        assert_eq!(
            sessions.session_user_id(&session_token).await.unwrap(),
            Some("u1".to_string())
        );
        // the genuine value is still there for the real callback
        assert!(sessions.take_logout_state("u1", "expected").await.unwrap());
    }

    #[tokio::test]
    async fn logout_state_is_single_use() {
        let sessions = store();
        sessions.set_logout_state("u1", "s").await.unwrap();
        assert!(sessions.take_logout_state("u1", "s").await.unwrap());
        assert!(!sessions.take_logout_state("u1", "s").await.unwrap());
    }

    #[tokio::test]
    async fn permissions_default_to_empty() {
        let sessions = store();
        assert!(sessions.get_permissions("u1").await.unwrap().is_empty());

        let scopes = HashSet::from(["package:read".to_string(), "package:write".to_string()]);
        sessions.store_permissions("u1", &scopes).await.unwrap();
        assert_eq!(sessions.get_permissions("u1").await.unwrap(), scopes);
    }

    #[tokio::test]
    async fn clear_user_removes_token_user_and_permissions() {
        let sessions = store();
        let user = LocalUser {
            id: "u1".into(),
            name: "Thandi".into(),
            email: "thandi@example.org".into(),
            active: true,
            verified: true,
            picture: None,
            role_ids: vec!["provider".into()],
        };
        sessions.update_token("u1", &token()).await.unwrap();
        sessions.store_user(&user).await.unwrap();
        sessions
            .store_permissions("u1", &HashSet::from(["package:read".to_string()]))
            .await
            .unwrap();

        sessions.clear_user("u1").await.unwrap();
        assert_eq!(sessions.fetch_token("u1").await.unwrap(), None);
        assert_eq!(sessions.get_user("u1").await.unwrap(), None);
        assert!(sessions.get_permissions("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn login_state_is_single_use() {
        let sessions = store();
        sessions.set_login_state("st").await.unwrap();
        assert!(sessions.take_login_state("st").await.unwrap());
        assert!(!sessions.take_login_state("st").await.unwrap());
    }
}
