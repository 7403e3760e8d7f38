use axum::{
    extract::State,
    response::{Html, IntoResponse},
};
use axum_extra::extract::cookie::CookieJar;

use crate::web::{
    AppState, auth,
    flash,
    templates::{PageLayout, escape_html, render_page},
};

/// Landing page: catalog entry point for everyone, workspace links for
/// logged-in data providers.
pub async fn home_page(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    let current = auth::current_user(&state, &jar).await;
    let (jar, flashes) = flash::take(jar);

    let workspace = match &current {
        Some(current) => format!(
            r#"<section class="panel">
    <h2>Your workspace</h2>
    <p class="note">Welcome back, {name}. Manage your data submissions below.</p>
    <a class="btn primary" href="/packages">My packages</a>
    <a class="btn secondary" href="/archive">Archive resources</a>
</section>"#,
            name = escape_html(&current.user.name),
        ),
        None => r#"<section class="panel">
    <h2>Contribute data</h2>
    <p class="note">Data providers can log in to create packages, describe them with
    metadata tags, upload resource files, and submit them for publication.</p>
    <a class="btn primary" href="/oauth2/login">Log in</a>
    <a class="btn secondary" href="/oauth2/signup">Sign up</a>
</section>"#
            .to_string(),
    };

    let content = format!(
        r#"<section class="panel">
    <h2>Browse the catalog</h2>
    <p class="note">Search published research data by text, geographic extent and time period.</p>
    <a class="btn primary" href="/catalog">Search the catalog</a>
</section>
{workspace}"#,
    );

    let html = render_page(PageLayout {
        title: "Research Data Catalog",
        heading: "Research Data Catalog",
        user: current.as_ref().map(|c| &c.user),
        flashes: &flashes,
        content_html: content.into(),
    });

    (jar, Html(html))
}
