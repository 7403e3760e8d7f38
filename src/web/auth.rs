use std::collections::HashSet;

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use cookie::time::Duration as CookieDuration;
use serde::Deserialize;
use tracing::{error, warn};
use uuid::Uuid;

use crate::{
    api::{ApiError, ErrorDetail},
    oidc::AuthMode,
    scopes::Scope,
    session::{LocalUser, SESSION_TTL_DAYS},
    web::{
        AppState,
        flash::{self, FlashCategory},
    },
};

pub const SESSION_COOKIE: &str = "session";

/// The request principal: the cached user snapshot plus the permission set
/// loaded at login.
#[derive(Clone, Debug)]
pub struct CurrentUser {
    pub user: LocalUser,
    pub permissions: HashSet<String>,
}

impl CurrentUser {
    pub fn id(&self) -> &str {
        &self.user.id
    }

    pub fn has_scope(&self, scope: Scope) -> bool {
        self.permissions.contains(scope.as_str())
    }
}

/// Resolve the session cookie to a principal. Inactive or unverified users
/// read as anonymous.
pub async fn current_user(state: &AppState, jar: &CookieJar) -> Option<CurrentUser> {
    let cookie = jar.get(SESSION_COOKIE)?;

    let user_id = match state.sessions().session_user_id(cookie.value()).await {
        Ok(user_id) => user_id?,
        Err(err) => {
            error!(?err, "failed to resolve session principal");
            return None;
        }
    };
    let user = match state.sessions().get_user(&user_id).await {
        Ok(user) => user?,
        Err(err) => {
            error!(?err, "failed to load user snapshot");
            return None;
        }
    };
    if !user.is_active() {
        return None;
    }

    let permissions = match state.sessions().get_permissions(&user_id).await {
        Ok(permissions) => permissions,
        Err(err) => {
            error!(?err, "failed to load permission set");
            HashSet::new()
        }
    };

    Some(CurrentUser { user, permissions })
}

/// Gate for routes that need a live session; anonymous requests are sent
/// home with a hint instead of reaching the handler.
pub async fn require_user(state: &AppState, jar: &CookieJar) -> Result<CurrentUser, Response> {
    match current_user(state, jar).await {
        Some(current) => Ok(current),
        None => {
            let jar = flash::push(
                jar.clone(),
                FlashCategory::Info,
                "Please log in to access that page.",
            );
            Err((jar, Redirect::to("/")).into_response())
        }
    }
}

/// Gate for routes that additionally need an API permission scope.
pub async fn require_scope(
    state: &AppState,
    jar: &CookieJar,
    scope: Scope,
) -> Result<CurrentUser, Response> {
    let current = require_user(state, jar).await?;
    if !current.has_scope(scope) {
        let jar = flash::push(
            jar.clone(),
            FlashCategory::Warning,
            "You do not have permission to access that page.",
        );
        return Err((jar, Redirect::to("/")).into_response());
    }
    Ok(current)
}

/// Funnel an API error into the response policy: 401 forces re-login, 403
/// bounces with a permission warning, 503 reports a transient outage, 422
/// flattens into per-field messages, and anything else shows its detail.
/// `back` is the page the user is returned to where that is safe.
pub fn handle_api_error(jar: CookieJar, err: &ApiError, back: &str) -> Response {
    match err.status() {
        401 => {
            let jar = flash::push(
                jar,
                FlashCategory::Error,
                "Your session has expired. Please log in again to continue.",
            );
            (jar, Redirect::to("/oauth2/logout")).into_response()
        }
        403 => {
            let jar = flash::push(
                jar,
                FlashCategory::Warning,
                "You do not have permission to access that page.",
            );
            (jar, Redirect::to(back)).into_response()
        }
        503 => {
            let jar = flash::push(
                jar,
                FlashCategory::Error,
                "Service unavailable. Please try again in a few minutes.",
            );
            (jar, Redirect::to(back)).into_response()
        }
        status => {
            let jar = match err.detail() {
                ErrorDetail::Fields(fields) => {
                    fields.iter().fold(jar, |jar, (field, message)| {
                        flash::push(jar, FlashCategory::Error, format!("{field}: {message}"))
                    })
                }
                ErrorDetail::Message(message) => {
                    flash::push(jar, FlashCategory::Error, message.clone())
                }
            };
            // server errors go home rather than back, avoiding redirect loops
            let target = if status >= 500 { "/" } else { back };
            (jar, Redirect::to(target)).into_response()
        }
    }
}

#[derive(Deserialize, Default)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Initiate signup: redirect to the identity provider's authorization
/// endpoint in signup mode.
pub async fn signup(State(state): State<AppState>, jar: CookieJar) -> Response {
    start_auth(&state, jar, AuthMode::Signup).await
}

/// Initiate login.
pub async fn login(State(state): State<AppState>, jar: CookieJar) -> Response {
    start_auth(&state, jar, AuthMode::Login).await
}

async fn start_auth(state: &AppState, jar: CookieJar, mode: AuthMode) -> Response {
    let state_val = Uuid::new_v4().to_string();
    if let Err(err) = state.sessions().set_login_state(&state_val).await {
        error!(?err, "failed to record login state");
        return auth_unavailable(jar);
    }

    let redirect_uri = state.settings().login_redirect_uri();
    match state.oidc().authorize_url(&redirect_uri, &state_val, mode).await {
        Ok(url) => Redirect::to(&url).into_response(),
        Err(err) => {
            error!(?err, "failed to build authorization redirect");
            auth_unavailable(jar)
        }
    }
}

fn auth_unavailable(jar: CookieJar) -> Response {
    let jar = flash::push(
        jar,
        FlashCategory::Error,
        "Sign-in is currently unavailable. Please try again in a few minutes.",
    );
    (jar, Redirect::to("/")).into_response()
}

/// Callback from the identity provider after a successful authorization.
/// Exchanges the code, caches the token, user snapshot and permission set,
/// and establishes the local session principal.
pub async fn logged_in(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<CallbackQuery>,
) -> Response {
    if let Some(error) = &query.error {
        warn!(error, "authorization callback reported an error");
        let message = query
            .error_description
            .clone()
            .unwrap_or_else(|| "Login was not completed.".to_string());
        let jar = flash::push(jar, FlashCategory::Error, message);
        return (jar, Redirect::to("/")).into_response();
    }

    let state_ok = match &query.state {
        Some(state_val) => state
            .sessions()
            .take_login_state(state_val)
            .await
            .unwrap_or(false),
        None => false,
    };
    let (Some(code), true) = (&query.code, state_ok) else {
        let jar = flash::push(
            jar,
            FlashCategory::Error,
            "The login attempt could not be verified. Please try again.",
        );
        return (jar, Redirect::to("/")).into_response();
    };

    let redirect_uri = state.settings().login_redirect_uri();
    let token = match state.oidc().exchange_code(code, &redirect_uri).await {
        Ok(token) => token,
        Err(err) => {
            error!(?err, "authorization code exchange failed");
            return auth_unavailable(jar);
        }
    };
    let claims = match state.oidc().userinfo(&token.access_token).await {
        Ok(claims) => claims,
        Err(err) => {
            error!(?err, "userinfo request failed");
            return auth_unavailable(jar);
        }
    };

    let user = LocalUser {
        id: claims.sub,
        name: claims.name,
        email: claims.email,
        verified: claims.email_verified,
        picture: claims.picture,
        role_ids: claims.roles,
        // only active accounts get through the identity service
        active: true,
    };

    if let Err(err) = state.sessions().update_token(&user.id, &token).await {
        error!(?err, "failed to cache token set");
        return auth_unavailable(jar);
    }
    if let Err(err) = state.sessions().store_user(&user).await {
        error!(?err, "failed to cache user snapshot");
        return auth_unavailable(jar);
    }

    match state.api().get("/token/", &[], Some(&token.access_token)).await {
        Ok(payload) => {
            let scopes: HashSet<String> = payload["permissions"]
                .as_object()
                .map(|permissions| permissions.keys().cloned().collect())
                .unwrap_or_default();
            if let Err(err) = state.sessions().store_permissions(&user.id, &scopes).await {
                error!(?err, "failed to cache permission set");
            }
        }
        // the client and/or role does not require knowledge of permissions
        Err(err) if err.status() == 403 => {}
        Err(err) => {
            error!(%err, "failed to fetch permissions during login");
            return handle_api_error(jar, &err, "/");
        }
    }

    let session_token = match state.sessions().create_session(&user.id).await {
        Ok(session_token) => session_token,
        Err(err) => {
            error!(?err, "failed to create session");
            return auth_unavailable(jar);
        }
    };

    let jar = jar.add(session_cookie(session_token));
    (jar, Redirect::to("/")).into_response()
}

fn session_cookie(token: String) -> Cookie<'static> {
    let mut cookie = Cookie::new(SESSION_COOKIE, token);
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Lax);
    cookie.set_max_age(CookieDuration::days(SESSION_TTL_DAYS));
    cookie
}

/// Initiate logout: record a single-use state value and redirect to the
/// provider's end-session endpoint. Anonymous requests just go home.
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> Response {
    let Some(current) = current_user(&state, &jar).await else {
        return Redirect::to("/").into_response();
    };

    let id_token = match state.sessions().fetch_token(current.id()).await {
        Ok(token) => token.and_then(|token| token.id_token),
        Err(err) => {
            error!(?err, "failed to fetch token for logout");
            None
        }
    };

    let state_val = Uuid::new_v4().to_string();
    if let Err(err) = state.sessions().set_logout_state(current.id(), &state_val).await {
        error!(?err, "failed to record logout state");
        return Redirect::to("/").into_response();
    }

    let redirect_uri = state.settings().logout_redirect_uri();
    match state
        .oidc()
        .end_session_url(id_token.as_deref(), &redirect_uri, &state_val)
        .await
    {
        Ok(url) => Redirect::to(&url).into_response(),
        Err(err) => {
            error!(?err, "failed to build end-session redirect");
            Redirect::to("/").into_response()
        }
    }
}

/// Callback from the identity provider after its session has ended. The
/// echoed state value must match the one recorded by [`logout`]; otherwise
/// local session state is left untouched.
pub async fn logged_out(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<CallbackQuery>,
) -> Response {
    let Some(current) = current_user(&state, &jar).await else {
        return (jar, Redirect::to("/")).into_response();
    };

    let state_ok = match &query.state {
        Some(state_val) => state
            .sessions()
            .take_logout_state(current.id(), state_val)
            .await
            .unwrap_or(false),
        None => false,
    };
    if !state_ok {
        return (jar, Redirect::to("/")).into_response();
    }

    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        if let Err(err) = state.sessions().delete_session(cookie.value()).await {
            error!(?err, "failed to remove session during logout");
        }
    }
    if let Err(err) = state.sessions().clear_user(current.id()).await {
        error!(?err, "failed to clear cached session state");
    }

    let mut removal = Cookie::new(SESSION_COOKIE, "");
    removal.set_path("/");
    removal.set_http_only(true);
    removal.set_same_site(SameSite::Lax);
    removal.set_max_age(CookieDuration::seconds(0));
    let jar = jar.remove(removal);

    let jar = flash::push(jar, FlashCategory::Success, "You have been logged out.");
    (jar, Redirect::to("/")).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCacheStore;
    use crate::config::Settings;
    use std::sync::Arc;

    fn test_state() -> AppState {
        let settings = Settings {
            api_url: "http://api.local".to_string(),
            hydra_url: "http://hydra.local".to_string(),
            portal_url: "http://portal.local".to_string(),
            client_id: "portal".to_string(),
            client_secret: "secret".to_string(),
            client_scope: vec!["openid".to_string()],
            cache_url: None,
            catalog_id: "public".to_string(),
            archive_id: "default".to_string(),
            archive_url: "file:///tmp/portal-archive".to_string(),
            schema_id: "datacite-4.3".to_string(),
            catalog_facets: vec![],
            vocab_dir: "vocab".into(),
        };
        AppState::with_cache(settings, Arc::new(InMemoryCacheStore::new())).unwrap()
    }

    async fn login_as(state: &AppState, scopes: &[&str]) -> CookieJar {
        let user = LocalUser {
            id: "u1".into(),
            name: "Thandi".into(),
            email: "thandi@example.org".into(),
            active: true,
            verified: true,
            picture: None,
            role_ids: vec![],
        };
        state.sessions().store_user(&user).await.unwrap();
        state
            .sessions()
            .store_permissions("u1", &scopes.iter().map(|s| s.to_string()).collect())
            .await
            .unwrap();
        let token = state.sessions().create_session("u1").await.unwrap();
        CookieJar::new().add(Cookie::new(SESSION_COOKIE, token))
    }

    fn location_of(response: &Response) -> String {
        response
            .headers()
            .get("location")
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string()
    }

    #[tokio::test]
    async fn anonymous_requests_are_redirected_away() {
        let state = test_state();
        let jar = CookieJar::new();
        let denied = require_scope(&state, &jar, Scope::PackageRead)
            .await
            .unwrap_err();
        assert_eq!(location_of(&denied), "/");
    }

    #[tokio::test]
    async fn under_scoped_users_are_redirected_away() {
        let state = test_state();
        let jar = login_as(&state, &["package:read"]).await;

        assert!(require_scope(&state, &jar, Scope::PackageRead).await.is_ok());
        let denied = require_scope(&state, &jar, Scope::PackageWrite)
            .await
            .unwrap_err();
        assert_eq!(location_of(&denied), "/");
    }

    #[tokio::test]
    async fn stale_session_cookie_reads_as_anonymous() {
        let state = test_state();
        let jar = CookieJar::new().add(Cookie::new(SESSION_COOKIE, "not-a-session"));
        assert!(current_user(&state, &jar).await.is_none());
    }

    #[tokio::test]
    async fn unauthorized_api_error_forces_relogin() {
        let err = ApiError::new(401, ErrorDetail::Message("expired".into()));
        let response = handle_api_error(CookieJar::new(), &err, "/packages");
        assert_eq!(location_of(&response), "/oauth2/logout");
    }

    #[tokio::test]
    async fn validation_errors_bounce_back_to_the_caller_page() {
        let err = ApiError::new(
            422,
            ErrorDetail::Fields(vec![("title".into(), "field required".into())]),
        );
        let response = handle_api_error(CookieJar::new(), &err, "/packages/new");
        assert_eq!(location_of(&response), "/packages/new");
    }

    #[tokio::test]
    async fn server_errors_go_home_to_avoid_redirect_loops() {
        let err = ApiError::new(500, ErrorDetail::Message("boom".into()));
        let response = handle_api_error(CookieJar::new(), &err, "/packages/p1");
        assert_eq!(location_of(&response), "/");
    }
}
