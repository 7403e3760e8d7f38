use axum::{
    extract::{Path, RawForm, RawQuery, State},
    response::{Html, IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use serde_json::Value;
use tracing::error;

use crate::{
    api::models::Page,
    forms::{CatalogSearchForm, FormErrors, parse_urlencoded, search::{SORT_RELEVANCE, SORT_TIMESTAMP}},
    web::{
        AppState, auth, filters, flash,
        templates::{PageLayout, escape_html, render_field_error, render_page, render_pagination},
    },
};

/// Published-catalog search page. Invalid search input re-renders the form
/// inline without contacting the backend.
pub async fn index(
    State(state): State<AppState>,
    jar: CookieJar,
    RawQuery(query): RawQuery,
) -> Response {
    let current = auth::current_user(&state, &jar).await;
    let fields = parse_urlencoded(query.as_deref().unwrap_or(""));
    let form = CatalogSearchForm::from_fields(&fields, &state.settings().catalog_facets);
    let errors = form.validate();

    let results = if errors.is_empty() {
        let token = match state.client_token().await {
            Ok(token) => token,
            Err(err) => return auth::handle_api_error(jar, &err, "/"),
        };
        let catalog_id = &state.settings().catalog_id;
        let value = match state
            .api()
            .get(
                &format!("/catalog/{catalog_id}/search"),
                &form.api_params(),
                Some(&token),
            )
            .await
        {
            Ok(value) => value,
            Err(err) => return auth::handle_api_error(jar, &err, "/"),
        };
        match serde_json::from_value::<Page<Value>>(value) {
            Ok(page) => Some(page),
            Err(err) => {
                error!(?err, "unexpected catalog search payload");
                None
            }
        }
    } else {
        None
    };

    let results_html = match &results {
        Some(page) => render_results(page, &form),
        None => String::new(),
    };
    let content = format!(
        "{form_html}\n{results_html}",
        form_html = render_search_form(&form, &errors, &state.settings().catalog_facets),
    );

    let (jar, flashes) = flash::take(jar);
    let html = render_page(PageLayout {
        title: "Catalog - Research Data Catalog",
        heading: "Research Data Catalog",
        user: current.as_ref().map(|c| &c.user),
        flashes: &flashes,
        content_html: content.into(),
    });
    (jar, Html(html)).into_response()
}

/// Normalize a posted search form into a bookmarkable GET request.
pub async fn search(State(state): State<AppState>, RawForm(body): RawForm) -> Redirect {
    let fields = parse_urlencoded(&String::from_utf8_lossy(&body));
    let form = CatalogSearchForm::from_fields(&fields, &state.settings().catalog_facets);
    let query = form.query_string();
    if query.is_empty() {
        Redirect::to("/catalog")
    } else {
        Redirect::to(&format!("/catalog?{query}"))
    }
}

/// Published record detail. Record ids may contain slashes (DOIs), hence the
/// wildcard route.
pub async fn view(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(id): Path<String>,
) -> Response {
    let current = auth::current_user(&state, &jar).await;
    let token = match state.client_token().await {
        Ok(token) => token,
        Err(err) => return auth::handle_api_error(jar, &err, "/catalog"),
    };

    let catalog_id = &state.settings().catalog_id;
    let record = match state
        .api()
        .get(&format!("/catalog/{catalog_id}/records/{id}"), &[], Some(&token))
        .await
    {
        Ok(record) => record,
        Err(err) => return auth::handle_api_error(jar, &err, "/catalog"),
    };

    let title = record_title(&record).unwrap_or_else(|| id.clone());
    // records without an explicit DOI may still carry one in their citation
    let doi = record["doi"]
        .as_str()
        .map(str::to_string)
        .or_else(|| {
            record["metadata"]["citation"]
                .as_str()
                .and_then(filters::extract_doi)
        })
        .map(|doi| {
            format!(
                r#"<p><strong>DOI:</strong> <a href="https://doi.org/{doi}">{doi}</a></p>"#,
                doi = escape_html(&doi),
            )
        })
        .unwrap_or_default();
    let timestamp = record["timestamp"]
        .as_str()
        .map(|ts| format!("<p class=\"meta\">Last updated {}</p>", filters::format_timestamp(ts)))
        .unwrap_or_default();

    let content = format!(
        r#"<section class="panel">
    <h2>{title}</h2>
    {doi}
    {timestamp}
    <h3>Metadata</h3>
    <pre class="metadata">{metadata}</pre>
</section>
<a class="btn secondary" href="/catalog">&larr; Back to search</a>"#,
        title = escape_html(&title),
        metadata = escape_html(&filters::format_json(&record["metadata"])),
    );

    let (jar, flashes) = flash::take(jar);
    let html = render_page(PageLayout {
        title: &format!("{title} - Research Data Catalog"),
        heading: "Research Data Catalog",
        user: current.as_ref().map(|c| &c.user),
        flashes: &flashes,
        content_html: content.into(),
    });
    (jar, Html(html)).into_response()
}

fn record_title(record: &Value) -> Option<String> {
    record["metadata"]["titles"][0]["title"]
        .as_str()
        .or_else(|| record["metadata"]["title"].as_str())
        .map(str::to_string)
}

fn render_results(page: &Page<Value>, form: &CatalogSearchForm) -> String {
    if page.items.is_empty() {
        return r#"<section class="panel"><p class="note">No matching records found.</p></section>"#
            .to_string();
    }

    let rows: String = page
        .items
        .iter()
        .map(|item| {
            let id = item["id"].as_str().unwrap_or_default();
            let title = record_title(item).unwrap_or_else(|| id.to_string());
            let abstract_text = item["metadata"]["abstracts"][0]["abstract"]
                .as_str()
                .map(|text| {
                    let short: String = text.chars().take(280).collect();
                    let ellipsis = if text.chars().count() > 280 { "…" } else { "" };
                    format!("<p class=\"note\">{}{ellipsis}</p>", escape_html(&short))
                })
                .unwrap_or_default();
            let timestamp = item["timestamp"]
                .as_str()
                .map(|ts| format!("<p class=\"meta\">{}</p>", filters::format_date(ts)))
                .unwrap_or_default();
            format!(
                r#"<div class="tag-card">
    <h3><a href="/catalog/{id}">{title}</a></h3>
    {abstract_text}
    {timestamp}
</div>"#,
                id = escape_html(id),
                title = escape_html(&title),
            )
        })
        .collect();

    let pagination = render_pagination("/catalog", &form.query_string(), page.page, page.pages);
    format!(
        r#"<section class="panel">
    <h2>{total} records</h2>
    {rows}
    {pagination}
</section>"#,
        total = page.total,
    )
}

fn render_search_form(form: &CatalogSearchForm, errors: &FormErrors, facets: &[String]) -> String {
    let text = |value: &Option<String>| value.clone().unwrap_or_default();
    let checked = |flag: bool| if flag { " checked" } else { "" };
    let selected = |sort: &str| if form.sort == sort { " selected" } else { "" };

    let facet_inputs: String = facets
        .iter()
        .map(|facet| {
            let fieldname = CatalogSearchForm::facet_fieldname(facet);
            let value = form
                .facets
                .iter()
                .find(|(name, _)| name == facet)
                .map(|(_, value)| value.clone())
                .unwrap_or_default();
            format!(
                r#"<label for="{fieldname}">{label}</label>
        <input type="text" id="{fieldname}" name="{fieldname}" value="{value}">"#,
                fieldname = escape_html(&fieldname),
                label = escape_html(facet),
                value = escape_html(&value),
            )
        })
        .collect();

    format!(
        r#"<section class="panel">
    <h2>Search the catalog</h2>
    <form method="post" action="/catalog/search">
        <label for="q">Search terms</label>
        <input type="text" id="q" name="q" value="{q}">
        {q_error}
        <label>Geographic extent (decimal degrees)</label>
        <input type="text" name="n" placeholder="North" value="{n}"> {n_error}
        <input type="text" name="s" placeholder="South" value="{s}"> {s_error}
        <input type="text" name="e" placeholder="East" value="{e}"> {e_error}
        <input type="text" name="w" placeholder="West" value="{w}"> {w_error}
        <label><input type="checkbox" name="exclusive_region"{exclusive_region}> Exclusive region</label>
        <label for="after">Start date</label>
        <input type="date" id="after" name="after" value="{after}">
        {after_error}
        <label for="before">End date</label>
        <input type="date" id="before" name="before" value="{before}">
        {before_error}
        <label><input type="checkbox" name="exclusive_interval"{exclusive_interval}> Exclusive interval</label>
        {facet_inputs}
        <label for="sort">Sort by</label>
        <select id="sort" name="sort">
            <option value="{sort_relevance}"{relevance_selected}>Relevance</option>
            <option value="{sort_timestamp}"{timestamp_selected}>Last updated</option>
        </select>
        <button type="submit">Search</button>
    </form>
</section>"#,
        q = escape_html(&text(&form.q)),
        q_error = render_field_error(errors, "q"),
        n = escape_html(&text(&form.north)),
        n_error = render_field_error(errors, "n"),
        s = escape_html(&text(&form.south)),
        s_error = render_field_error(errors, "s"),
        e = escape_html(&text(&form.east)),
        e_error = render_field_error(errors, "e"),
        w = escape_html(&text(&form.west)),
        w_error = render_field_error(errors, "w"),
        exclusive_region = checked(form.exclusive_region),
        after = escape_html(&text(&form.after)),
        after_error = render_field_error(errors, "after"),
        before = escape_html(&text(&form.before)),
        before_error = render_field_error(errors, "before"),
        exclusive_interval = checked(form.exclusive_interval),
        facet_inputs = facet_inputs,
        sort_relevance = SORT_RELEVANCE,
        relevance_selected = selected(SORT_RELEVANCE),
        sort_timestamp = SORT_TIMESTAMP,
        timestamp_selected = selected(SORT_TIMESTAMP),
    )
}
