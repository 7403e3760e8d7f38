use std::{collections::HashMap, time::Duration};

use anyhow::{Context, Result, anyhow, bail};
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::RwLock;
use url::Url;

/// Leeway applied when deciding whether a cached token is still usable.
const EXPIRY_SKEW: Duration = Duration::from_secs(30);

/// Whether an authorization redirect should land on the identity service's
/// login or signup screen.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AuthMode {
    Login,
    Signup,
}

impl AuthMode {
    fn as_str(&self) -> &'static str {
        match self {
            AuthMode::Login => "login",
            AuthMode::Signup => "signup",
        }
    }
}

/// OAuth2 token set as cached per user.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TokenSet {
    pub access_token: String,
    pub token_type: String,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
    pub scope: Option<String>,
    /// Unix timestamp after which the access token is no longer valid.
    pub expires_at: Option<i64>,
}

impl TokenSet {
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at - (EXPIRY_SKEW.as_secs() as i64) <= Utc::now().timestamp(),
            None => false,
        }
    }

    /// Flatten into hash fields for cache storage.
    pub fn to_fields(&self) -> Vec<(String, String)> {
        let mut fields = vec![
            ("access_token".to_string(), self.access_token.clone()),
            ("token_type".to_string(), self.token_type.clone()),
        ];
        if let Some(refresh_token) = &self.refresh_token {
            fields.push(("refresh_token".to_string(), refresh_token.clone()));
        }
        if let Some(id_token) = &self.id_token {
            fields.push(("id_token".to_string(), id_token.clone()));
        }
        if let Some(scope) = &self.scope {
            fields.push(("scope".to_string(), scope.clone()));
        }
        if let Some(expires_at) = self.expires_at {
            fields.push(("expires_at".to_string(), expires_at.to_string()));
        }
        fields
    }

    /// Rebuild from cached hash fields; `None` if no token is stored.
    pub fn from_fields(fields: &HashMap<String, String>) -> Option<Self> {
        let access_token = fields.get("access_token")?.clone();
        Some(Self {
            access_token,
            token_type: fields
                .get("token_type")
                .cloned()
                .unwrap_or_else(|| "bearer".to_string()),
            refresh_token: fields.get("refresh_token").cloned(),
            id_token: fields.get("id_token").cloned(),
            scope: fields.get("scope").cloned(),
            expires_at: fields.get("expires_at").and_then(|v| v.parse().ok()),
        })
    }
}

/// Identity claims returned by the provider's userinfo endpoint.
#[derive(Clone, Debug, Deserialize)]
pub struct UserClaims {
    pub sub: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default)]
    pub picture: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Clone, Debug, Deserialize)]
struct ProviderMetadata {
    authorization_endpoint: String,
    token_endpoint: String,
    userinfo_endpoint: String,
    #[serde(default)]
    end_session_endpoint: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    id_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

impl TokenResponse {
    fn into_token_set(self) -> TokenSet {
        TokenSet {
            access_token: self.access_token,
            token_type: self.token_type.unwrap_or_else(|| "bearer".to_string()),
            refresh_token: self.refresh_token,
            id_token: self.id_token,
            scope: self.scope,
            expires_at: self.expires_in.map(|secs| Utc::now().timestamp() + secs),
        }
    }
}

/// OAuth2/OIDC client for the external identity provider. Provider metadata
/// is discovered on first use and held for the process lifetime.
pub struct OidcClient {
    http: Client,
    issuer_url: String,
    client_id: String,
    client_secret: String,
    scope: Vec<String>,
    metadata: RwLock<Option<ProviderMetadata>>,
}

impl OidcClient {
    pub fn new(
        http: Client,
        issuer_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        scope: Vec<String>,
    ) -> Self {
        Self {
            http,
            issuer_url: issuer_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scope,
            metadata: RwLock::new(None),
        }
    }

    async fn metadata(&self) -> Result<ProviderMetadata> {
        if let Some(metadata) = self.metadata.read().await.as_ref() {
            return Ok(metadata.clone());
        }

        let url = format!("{}/.well-known/openid-configuration", self.issuer_url);
        let metadata: ProviderMetadata = self
            .http
            .get(&url)
            .send()
            .await
            .context("failed to reach identity provider discovery endpoint")?
            .error_for_status()
            .context("identity provider discovery request failed")?
            .json()
            .await
            .context("failed to parse identity provider metadata")?;

        let mut guard = self.metadata.write().await;
        *guard = Some(metadata.clone());
        Ok(metadata)
    }

    /// Build the authorization redirect URL for a login or signup attempt.
    pub async fn authorize_url(
        &self,
        redirect_uri: &str,
        state: &str,
        mode: AuthMode,
    ) -> Result<String> {
        let metadata = self.metadata().await?;
        let mut url = Url::parse(&metadata.authorization_endpoint)
            .context("invalid authorization endpoint")?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("scope", &self.scope.join(" "))
            .append_pair("state", state)
            .append_pair("mode", mode.as_str());
        Ok(url.into())
    }

    /// Exchange an authorization code for a token set.
    pub async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<TokenSet> {
        self.token_request(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
        ])
        .await
    }

    /// Obtain a fresh token set from a refresh token.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenSet> {
        self.token_request(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .await
    }

    /// Obtain a client-credentials token for anonymous catalog access.
    pub async fn client_credentials(&self) -> Result<TokenSet> {
        let scope = self
            .scope
            .iter()
            .filter(|s| *s != "openid" && *s != "offline")
            .cloned()
            .collect::<Vec<_>>()
            .join(" ");
        self.token_request(&[("grant_type", "client_credentials"), ("scope", &scope)])
            .await
    }

    async fn token_request(&self, params: &[(&str, &str)]) -> Result<TokenSet> {
        let metadata = self.metadata().await?;
        let response = self
            .http
            .post(&metadata.token_endpoint)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(params)
            .send()
            .await
            .context("failed to reach token endpoint")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("failed to read token endpoint response")?;
        if !status.is_success() {
            bail!("token endpoint returned {status}: {body}");
        }

        let token: TokenResponse = serde_json::from_str(&body)
            .map_err(|err| anyhow!("unexpected token endpoint payload: {err}"))?;
        Ok(token.into_token_set())
    }

    /// Fetch identity claims for an access token.
    pub async fn userinfo(&self, access_token: &str) -> Result<UserClaims> {
        let metadata = self.metadata().await?;
        let response = self
            .http
            .get(&metadata.userinfo_endpoint)
            .bearer_auth(access_token)
            .send()
            .await
            .context("failed to reach userinfo endpoint")?;

        let status = response.status();
        if !status.is_success() {
            bail!("userinfo endpoint returned {status}");
        }
        response
            .json()
            .await
            .context("failed to parse userinfo claims")
    }

    /// Build the provider's end-session URL for a logout attempt.
    pub async fn end_session_url(
        &self,
        id_token_hint: Option<&str>,
        post_logout_redirect_uri: &str,
        state: &str,
    ) -> Result<String> {
        let metadata = self.metadata().await?;
        let endpoint = metadata
            .end_session_endpoint
            .unwrap_or_else(|| format!("{}/oauth2/sessions/logout", self.issuer_url));

        let mut url = Url::parse(&endpoint).context("invalid end-session endpoint")?;
        {
            let mut pairs = url.query_pairs_mut();
            if let Some(id_token) = id_token_hint {
                pairs.append_pair("id_token_hint", id_token);
            }
            pairs
                .append_pair("post_logout_redirect_uri", post_logout_redirect_uri)
                .append_pair("state", state);
        }
        Ok(url.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn discovery_body(base: &str) -> serde_json::Value {
        json!({
            "authorization_endpoint": format!("{base}/oauth2/auth"),
            "token_endpoint": format!("{base}/oauth2/token"),
            "userinfo_endpoint": format!("{base}/userinfo"),
            "end_session_endpoint": format!("{base}/oauth2/sessions/logout"),
        })
    }

    async fn mock_provider() -> (MockServer, OidcClient) {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(discovery_body(&server.uri())))
            .mount(&server)
            .await;

        let client = OidcClient::new(
            Client::new(),
            server.uri(),
            "portal",
            "secret",
            vec!["openid".into(), "offline".into(), "package:read".into()],
        );
        (server, client)
    }

    #[test]
    fn token_set_round_trips_through_hash_fields() {
        let token = TokenSet {
            access_token: "at".into(),
            token_type: "bearer".into(),
            refresh_token: Some("rt".into()),
            id_token: Some("idt".into()),
            scope: Some("openid".into()),
            expires_at: Some(1_900_000_000),
        };
        let fields: HashMap<String, String> = token.to_fields().into_iter().collect();
        assert_eq!(TokenSet::from_fields(&fields), Some(token));
    }

    #[test]
    fn missing_access_token_yields_no_token_set() {
        let fields = HashMap::from([("token_type".to_string(), "bearer".to_string())]);
        assert_eq!(TokenSet::from_fields(&fields), None);
    }

    #[test]
    fn expiry_check_honours_skew() {
        let mut token = TokenSet {
            access_token: "at".into(),
            token_type: "bearer".into(),
            refresh_token: None,
            id_token: None,
            scope: None,
            expires_at: Some(Utc::now().timestamp() + 5),
        };
        assert!(token.is_expired());

        token.expires_at = Some(Utc::now().timestamp() + 3600);
        assert!(!token.is_expired());

        token.expires_at = None;
        assert!(!token.is_expired());
    }

    #[tokio::test]
    async fn authorize_url_carries_client_and_state() {
        let (_server, client) = mock_provider().await;
        let url = client
            .authorize_url("https://portal.example/oauth2/logged_in", "st-1", AuthMode::Signup)
            .await
            .unwrap();

        assert!(url.contains("response_type=code"));
        assert!(url.contains("client_id=portal"));
        assert!(url.contains("state=st-1"));
        assert!(url.contains("mode=signup"));
    }

    #[tokio::test]
    async fn code_exchange_parses_token_response() {
        let (server, client) = mock_provider().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "at-1",
                "token_type": "bearer",
                "expires_in": 3600,
                "refresh_token": "rt-1",
                "id_token": "idt-1",
            })))
            .mount(&server)
            .await;

        let token = client
            .exchange_code("abc", "https://portal.example/oauth2/logged_in")
            .await
            .unwrap();
        assert_eq!(token.access_token, "at-1");
        assert_eq!(token.refresh_token.as_deref(), Some("rt-1"));
        assert!(!token.is_expired());
    }

    #[tokio::test]
    async fn refresh_failure_surfaces_as_error() {
        let (server, client) = mock_provider().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": "invalid_grant",
            })))
            .mount(&server)
            .await;

        assert!(client.refresh("stale").await.is_err());
    }
}
