use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{Html, IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use serde_json::Value;
use tracing::error;

use crate::{
    api::models::Page,
    archive::ArchiveContent,
    scopes::Scope,
    web::{
        AppState, auth, filters, flash,
        templates::{PageLayout, escape_html, render_page, render_pagination},
    },
};

#[derive(Deserialize, Default)]
pub struct PageQuery {
    pub page: Option<u64>,
}

/// Listing of the archive's stored resources.
pub async fn index(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<PageQuery>,
) -> Response {
    let current = match auth::require_scope(&state, &jar, Scope::ArchiveRead).await {
        Ok(current) => current,
        Err(denied) => return denied,
    };
    let token = match state.user_token(current.id()).await {
        Ok(token) => token,
        Err(err) => return auth::handle_api_error(jar, &err, "/"),
    };

    let archive_id = &state.settings().archive_id;
    let page = query.page.unwrap_or(1);
    let resources = match state
        .api()
        .get(
            &format!("/archive/{archive_id}/resources"),
            &[("page", page.to_string())],
            Some(&token),
        )
        .await
    {
        Ok(value) => value,
        Err(err) => return auth::handle_api_error(jar, &err, "/"),
    };
    let resources: Page<Value> = match serde_json::from_value(resources) {
        Ok(page) => page,
        Err(err) => {
            error!(?err, "unexpected archive resources payload");
            let jar = flash::push(
                jar,
                flash::FlashCategory::Error,
                "The archive listing could not be read.",
            );
            return (jar, Redirect::to("/")).into_response();
        }
    };

    let rows: String = resources
        .items
        .iter()
        .map(|item| {
            let path = item["path"].as_str().unwrap_or_default();
            let filename = item["filename"].as_str().unwrap_or(path);
            let title = item["title"].as_str().unwrap_or("");
            let size = item["size"]
                .as_u64()
                .map(filters::format_bytes)
                .unwrap_or_default();
            let timestamp = item["timestamp"]
                .as_str()
                .map(filters::format_timestamp)
                .unwrap_or_default();
            format!(
                r#"<tr>
    <td><a href="/archive/files/{path}">{filename}</a></td>
    <td>{title}</td>
    <td>{size}</td>
    <td>{timestamp}</td>
</tr>"#,
                path = escape_html(path),
                filename = escape_html(filename),
                title = escape_html(title),
            )
        })
        .collect();

    let pagination = render_pagination("/archive", "", resources.page, resources.pages);
    let content = format!(
        r#"<section class="panel">
    <h2>Archive resources</h2>
    <p class="note">{total} stored resources.</p>
    <table>
        <tr><th>File</th><th>Title</th><th>Size</th><th>Stored</th></tr>
        {rows}
    </table>
    {pagination}
</section>"#,
        total = resources.total,
    );

    let (jar, flashes) = flash::take(jar);
    let html = render_page(PageLayout {
        title: "Archive - Research Data Catalog",
        heading: "Research Data Catalog",
        user: Some(&current.user),
        flashes: &flashes,
        content_html: content.into(),
    });
    (jar, Html(html)).into_response()
}

/// Deliver a stored file through the configured archive backend: either the
/// file's bytes with an attachment disposition, or a redirect for archives
/// with their own data-access front end.
pub async fn download(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(path): Path<String>,
) -> Response {
    let _current = match auth::require_scope(&state, &jar, Scope::ArchiveRead).await {
        Ok(current) => current,
        Err(denied) => return denied,
    };

    match state.archive().get(&path).await {
        Ok(ArchiveContent::Redirect(url)) => Redirect::to(&url).into_response(),
        Ok(ArchiveContent::File { bytes, filename }) => {
            let mut headers = HeaderMap::new();
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/octet-stream"),
            );
            let disposition = format!("attachment; filename=\"{filename}\"");
            match HeaderValue::from_str(&disposition) {
                Ok(value) => {
                    headers.insert(header::CONTENT_DISPOSITION, value);
                }
                Err(_) => {
                    headers.insert(
                        header::CONTENT_DISPOSITION,
                        HeaderValue::from_static("attachment"),
                    );
                }
            }
            (headers, bytes).into_response()
        }
        Err(err) => {
            error!(%err, file = %path, "archive download failed");
            StatusCode::NOT_FOUND.into_response()
        }
    }
}
