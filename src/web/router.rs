use axum::{
    Router,
    http::{StatusCode, header},
    response::IntoResponse,
    routing::{get, post},
};

use crate::web::{AppState, archive, auth, catalog, home, package, vocabulary};

const ROBOTS_TXT_BODY: &str = include_str!("../../robots.txt");

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(home::home_page))
        .route("/healthz", get(healthz))
        .route("/robots.txt", get(robots_txt))
        .route("/oauth2/signup", get(auth::signup))
        .route("/oauth2/login", get(auth::login))
        .route("/oauth2/logged_in", get(auth::logged_in))
        .route("/oauth2/logout", get(auth::logout))
        .route("/oauth2/logged_out", get(auth::logged_out))
        .route("/catalog", get(catalog::index))
        .route("/catalog/search", post(catalog::search))
        // record ids may contain slashes (e.g. DOIs)
        .route("/catalog/*id", get(catalog::view))
        .route("/vocab/:id", get(vocabulary::vocabulary_json))
        .route("/packages", get(package::index))
        .route("/packages/new", get(package::new_page).post(package::create))
        .route("/packages/:id", get(package::detail))
        .route(
            "/packages/:id/edit",
            get(package::edit_page).post(package::update),
        )
        .route("/packages/:id/submit", post(package::submit))
        .route("/packages/:id/cancel", post(package::cancel))
        .route("/packages/:id/delete", post(package::delete))
        .route(
            "/packages/:id/tag/:kind",
            get(package::tag_page).post(package::tag_save),
        )
        .route(
            "/packages/:id/untag/:kind/:tag_instance_id",
            post(package::untag),
        )
        .route(
            "/packages/:id/institution",
            get(package::institution_page).post(package::institution_save),
        )
        .route("/packages/:id/upload", post(package::upload_file))
        .route("/packages/:id/upload-zip", post(package::upload_zip))
        .route(
            "/packages/:id/resource/:resource_id/delete",
            post(package::delete_resource),
        )
        .route("/archive", get(archive::index))
        .route("/archive/files/*path", get(archive::download))
        .with_state(state)
}

async fn robots_txt() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        ROBOTS_TXT_BODY,
    )
}

async fn healthz() -> impl IntoResponse {
    StatusCode::OK
}
