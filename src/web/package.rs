use axum::{
    extract::{Multipart, Path, Query, RawForm, State},
    response::{Html, IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use tracing::error;

use crate::{
    api::{
        ApiError, FileUpload,
        models::{Keyword, Package, PackageTag, Page, Provider},
    },
    forms::{
        AbstractTagForm, ContributorTagForm, DateRangeTagForm, DoiTagForm, FieldMap,
        FileUploadForm, FormErrors, GeoLocationTagForm, InstitutionKeywordForm, LineageTagForm,
        PackageForm, SdgTagForm, ZipUploadForm, parse_urlencoded,
        tags::{AUTHOR_ROLES, CONTRIBUTOR_ROLES, SHAPE_BOX, SHAPE_POINT},
    },
    scopes::Scope,
    web::{
        AppState,
        auth::{self, CurrentUser},
        filters, flash,
        flash::FlashCategory,
        templates::{
            Button, ButtonTheme, PageLayout, escape_html, render_field_error, render_page,
            render_pagination,
        },
    },
};

use super::archive::PageQuery;

/// Per-tag editing surface: which tag id it writes, the scope it needs, and
/// how it appears in the UI.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TagKind {
    Doi,
    Geoloc,
    DateRange,
    Contributor,
    Sdg,
    Abstract,
    Lineage,
}

impl TagKind {
    pub fn from_segment(segment: &str) -> Option<Self> {
        match segment {
            "doi" => Some(TagKind::Doi),
            "geoloc" => Some(TagKind::Geoloc),
            "daterange" => Some(TagKind::DateRange),
            "contributor" => Some(TagKind::Contributor),
            "sdg" => Some(TagKind::Sdg),
            "abstract" => Some(TagKind::Abstract),
            "lineage" => Some(TagKind::Lineage),
            _ => None,
        }
    }

    pub fn segment(&self) -> &'static str {
        match self {
            TagKind::Doi => "doi",
            TagKind::Geoloc => "geoloc",
            TagKind::DateRange => "daterange",
            TagKind::Contributor => "contributor",
            TagKind::Sdg => "sdg",
            TagKind::Abstract => "abstract",
            TagKind::Lineage => "lineage",
        }
    }

    pub fn tag(&self) -> PackageTag {
        match self {
            TagKind::Doi => PackageTag::Doi,
            TagKind::Geoloc => PackageTag::Geolocation,
            TagKind::DateRange => PackageTag::DateRange,
            TagKind::Contributor => PackageTag::Contributor,
            TagKind::Sdg => PackageTag::Sdg,
            TagKind::Abstract => PackageTag::Abstract,
            TagKind::Lineage => PackageTag::Lineage,
        }
    }

    pub fn scope(&self) -> Scope {
        match self {
            TagKind::Doi => Scope::PackageDoi,
            TagKind::Sdg => Scope::PackageSdg,
            _ => Scope::PackageWrite,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TagKind::Doi => "DOI",
            TagKind::Geoloc => "Geographic Location",
            TagKind::DateRange => "Temporal Extent",
            TagKind::Contributor => "Contributor",
            TagKind::Sdg => "SDG",
            TagKind::Abstract => "Abstract",
            TagKind::Lineage => "Methods (Lineage)",
        }
    }

    /// Singleton tags are edited in place; multi tags always add an instance.
    pub fn is_singleton(&self) -> bool {
        !matches!(self, TagKind::Contributor | TagKind::Sdg)
    }

    fn anchor(&self) -> &'static str {
        match self {
            TagKind::Contributor => "contributors",
            TagKind::Sdg => "sdgs",
            _ => "overview",
        }
    }
}

fn detail_path(id: &str) -> String {
    format!("/packages/{id}")
}

fn detail_anchor(id: &str, anchor: &str) -> String {
    format!("/packages/{id}#{anchor}")
}

async fn load_package(state: &AppState, token: &str, id: &str) -> Result<Package, ApiError> {
    let value = state
        .api()
        .get(&format!("/package/{id}"), &[], Some(token))
        .await?;
    serde_json::from_value(value).map_err(|err| {
        error!(?err, package = id, "unexpected package payload");
        ApiError::unavailable(err)
    })
}

async fn provider_choices(state: &AppState, token: &str) -> Result<Vec<Provider>, ApiError> {
    let value = state
        .api()
        .get(
            "/provider/",
            &[("sort", "key".to_string()), ("size", "0".to_string())],
            Some(token),
        )
        .await?;
    let page: Page<Provider> = serde_json::from_value(value).map_err(ApiError::unavailable)?;
    Ok(page.items)
}

async fn institution_choices(state: &AppState, token: &str) -> Result<Vec<Keyword>, ApiError> {
    let value = state
        .api()
        .get(
            "/keyword/Institution/",
            &[
                ("size", "0".to_string()),
                ("include_proposed", "true".to_string()),
            ],
            Some(token),
        )
        .await?;
    let page: Page<Keyword> = serde_json::from_value(value).map_err(ApiError::unavailable)?;
    Ok(page.items)
}

/// Turn a tag instance's data object back into submitted-field form, for
/// pre-filling an edit page.
fn fieldmap_from_tag(data: &Value) -> FieldMap {
    let mut fields = FieldMap::new();
    if let Some(object) = data.as_object() {
        for (key, value) in object {
            let rendered = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(true) => "on".to_string(),
                _ => continue,
            };
            fields.entry(key.clone()).or_default().push(rendered);
        }
    }
    fields
}

// ---------------------------------------------------------------------------
// listing / create / edit
// ---------------------------------------------------------------------------

pub async fn index(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<PageQuery>,
) -> Response {
    let current = match auth::require_scope(&state, &jar, Scope::PackageRead).await {
        Ok(current) => current,
        Err(denied) => return denied,
    };
    let token = match state.user_token(current.id()).await {
        Ok(token) => token,
        Err(err) => return auth::handle_api_error(jar, &err, "/"),
    };

    let page = query.page.unwrap_or(1);
    let value = match state
        .api()
        .get("/package/", &[("page", page.to_string())], Some(&token))
        .await
    {
        Ok(value) => value,
        Err(err) => return auth::handle_api_error(jar, &err, "/"),
    };
    let packages: Page<Package> = match serde_json::from_value(value) {
        Ok(packages) => packages,
        Err(err) => {
            error!(?err, "unexpected package list payload");
            return auth::handle_api_error(jar, &ApiError::unavailable(err), "/");
        }
    };

    let rows: String = packages
        .items
        .iter()
        .map(|package| {
            format!(
                r#"<tr>
    <td><a href="{href}">{title}</a></td>
    <td>{status}</td>
    <td>{timestamp}</td>
</tr>"#,
                href = detail_path(&package.id),
                title = escape_html(&package.title),
                status = escape_html(package.status.as_deref().unwrap_or("pending")),
                timestamp = package
                    .timestamp
                    .as_deref()
                    .map(filters::format_timestamp)
                    .unwrap_or_default(),
            )
        })
        .collect();

    let create_btn = if current.has_scope(Scope::PackageWrite) {
        Button::link("Create package", "/packages/new", ButtonTheme::Success).render()
    } else {
        String::new()
    };
    let pagination = render_pagination("/packages", "", packages.page, packages.pages);
    let content = format!(
        r#"<section class="panel">
    <h2>Packages</h2>
    <p class="note">{total} packages.</p>
    {create_btn}
    <table>
        <tr><th>Title</th><th>Status</th><th>Last updated</th></tr>
        {rows}
    </table>
    {pagination}
</section>"#,
        total = packages.total,
    );

    render_user_page(jar, &current, "Packages", content)
}

fn render_user_page(
    jar: CookieJar,
    current: &CurrentUser,
    title: &str,
    content: String,
) -> Response {
    let (jar, flashes) = flash::take(jar);
    let html = render_page(PageLayout {
        title: &format!("{title} - Research Data Catalog"),
        heading: "Research Data Catalog",
        user: Some(&current.user),
        flashes: &flashes,
        content_html: content.into(),
    });
    (jar, Html(html)).into_response()
}

fn render_package_form(
    form: &PackageForm,
    errors: &FormErrors,
    providers: &[Provider],
    action: &str,
    heading: &str,
) -> String {
    let options: String = providers
        .iter()
        .map(|provider| {
            let selected = if form.provider_id.as_deref() == Some(provider.id.as_str()) {
                " selected"
            } else {
                ""
            };
            format!(
                r#"<option value="{id}"{selected}>{key} &mdash; {name}</option>"#,
                id = escape_html(&provider.id),
                key = escape_html(&provider.key),
                name = escape_html(&provider.name),
            )
        })
        .collect();

    format!(
        r#"<section class="panel">
    <h2>{heading}</h2>
    <form method="post" action="{action}">
        <label for="provider_id">Package provider</label>
        <select id="provider_id" name="provider_id" required>
            <option value="">(None)</option>
            {options}
        </select>
        {provider_error}
        <label for="title">Package title</label>
        <input type="text" id="title" name="title" value="{title}" required>
        {title_error}
        <button type="submit">Save</button>
    </form>
</section>"#,
        heading = escape_html(heading),
        action = escape_html(action),
        options = options,
        provider_error = render_field_error(errors, "provider_id"),
        title = escape_html(form.title.as_deref().unwrap_or("")),
        title_error = render_field_error(errors, "title"),
    )
}

pub async fn new_page(State(state): State<AppState>, jar: CookieJar) -> Response {
    let current = match auth::require_scope(&state, &jar, Scope::PackageWrite).await {
        Ok(current) => current,
        Err(denied) => return denied,
    };
    let token = match state.user_token(current.id()).await {
        Ok(token) => token,
        Err(err) => return auth::handle_api_error(jar, &err, "/packages"),
    };
    let providers = match provider_choices(&state, &token).await {
        Ok(providers) => providers,
        Err(err) => return auth::handle_api_error(jar, &err, "/packages"),
    };

    let content = render_package_form(
        &PackageForm::default(),
        &FormErrors::default(),
        &providers,
        "/packages/new",
        "Create package",
    );
    render_user_page(jar, &current, "Create package", content)
}

pub async fn create(
    State(state): State<AppState>,
    jar: CookieJar,
    RawForm(body): RawForm,
) -> Response {
    let current = match auth::require_scope(&state, &jar, Scope::PackageWrite).await {
        Ok(current) => current,
        Err(denied) => return denied,
    };
    let token = match state.user_token(current.id()).await {
        Ok(token) => token,
        Err(err) => return auth::handle_api_error(jar, &err, "/packages"),
    };

    let fields = parse_urlencoded(&String::from_utf8_lossy(&body));
    let form = PackageForm::from_fields(&fields);
    let errors = form.validate();

    if errors.is_empty() {
        let payload = json!({
            "title": form.title,
            "provider_id": form.provider_id,
            "schema_id": state.settings().schema_id,
        });
        match state.api().post("/package/", payload, Some(&token)).await {
            Ok(package) => {
                let id = package["id"].as_str().unwrap_or_default().to_string();
                let jar = flash::push(
                    jar,
                    FlashCategory::Success,
                    format!(
                        "Package {} has been created.",
                        form.title.as_deref().unwrap_or_default()
                    ),
                );
                return (jar, Redirect::to(&detail_path(&id))).into_response();
            }
            Err(err) => return auth::handle_api_error(jar, &err, "/packages/new"),
        }
    }

    let providers = match provider_choices(&state, &token).await {
        Ok(providers) => providers,
        Err(err) => return auth::handle_api_error(jar, &err, "/packages"),
    };
    let content =
        render_package_form(&form, &errors, &providers, "/packages/new", "Create package");
    render_user_page(jar, &current, "Create package", content)
}

pub async fn edit_page(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(id): Path<String>,
) -> Response {
    let current = match auth::require_scope(&state, &jar, Scope::PackageWrite).await {
        Ok(current) => current,
        Err(denied) => return denied,
    };
    let token = match state.user_token(current.id()).await {
        Ok(token) => token,
        Err(err) => return auth::handle_api_error(jar, &err, "/packages"),
    };
    let package = match load_package(&state, &token, &id).await {
        Ok(package) => package,
        Err(err) => return auth::handle_api_error(jar, &err, "/packages"),
    };
    let providers = match provider_choices(&state, &token).await {
        Ok(providers) => providers,
        Err(err) => return auth::handle_api_error(jar, &err, "/packages"),
    };

    let form = PackageForm {
        provider_id: Some(package.provider_id.clone()),
        title: Some(package.title.clone()),
    };
    let content = render_package_form(
        &form,
        &FormErrors::default(),
        &providers,
        &format!("/packages/{id}/edit"),
        &format!("Edit package: {}", package.title),
    );
    render_user_page(jar, &current, "Edit package", content)
}

pub async fn update(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(id): Path<String>,
    RawForm(body): RawForm,
) -> Response {
    let current = match auth::require_scope(&state, &jar, Scope::PackageWrite).await {
        Ok(current) => current,
        Err(denied) => return denied,
    };
    let token = match state.user_token(current.id()).await {
        Ok(token) => token,
        Err(err) => return auth::handle_api_error(jar, &err, "/packages"),
    };

    let fields = parse_urlencoded(&String::from_utf8_lossy(&body));
    let form = PackageForm::from_fields(&fields);
    let errors = form.validate();

    if errors.is_empty() {
        let payload = json!({
            "title": form.title,
            "provider_id": form.provider_id,
            "schema_id": state.settings().schema_id,
        });
        match state
            .api()
            .put(&format!("/package/{id}"), payload, Some(&token))
            .await
        {
            Ok(_) => {
                let jar = flash::push(
                    jar,
                    FlashCategory::Success,
                    format!(
                        "Package {} has been updated.",
                        form.title.as_deref().unwrap_or_default()
                    ),
                );
                return (jar, Redirect::to(&detail_path(&id))).into_response();
            }
            Err(err) => return auth::handle_api_error(jar, &err, &format!("/packages/{id}/edit")),
        }
    }

    let providers = match provider_choices(&state, &token).await {
        Ok(providers) => providers,
        Err(err) => return auth::handle_api_error(jar, &err, "/packages"),
    };
    let content = render_package_form(
        &form,
        &errors,
        &providers,
        &format!("/packages/{id}/edit"),
        "Edit package",
    );
    render_user_page(jar, &current, "Edit package", content)
}

// ---------------------------------------------------------------------------
// lifecycle actions
// ---------------------------------------------------------------------------

pub async fn submit(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(id): Path<String>,
) -> Response {
    let current = match auth::require_scope(&state, &jar, Scope::PackageWrite).await {
        Ok(current) => current,
        Err(denied) => return denied,
    };
    let token = match state.user_token(current.id()).await {
        Ok(token) => token,
        Err(err) => return auth::handle_api_error(jar, &err, "/packages"),
    };

    let package = match load_package(&state, &token, &id).await {
        Ok(package) => package,
        Err(err) => return auth::handle_api_error(jar, &err, "/packages"),
    };
    match state
        .api()
        .post(&format!("/package/{id}/submit"), json!({}), Some(&token))
        .await
    {
        Ok(_) => {
            let jar = flash::push(
                jar,
                FlashCategory::Success,
                format!("Package {} has been submitted.", package.title),
            );
            (jar, Redirect::to(&detail_path(&id))).into_response()
        }
        Err(err) => auth::handle_api_error(jar, &err, &detail_path(&id)),
    }
}

pub async fn cancel(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(id): Path<String>,
) -> Response {
    let current = match auth::require_scope(&state, &jar, Scope::PackageWrite).await {
        Ok(current) => current,
        Err(denied) => return denied,
    };
    let token = match state.user_token(current.id()).await {
        Ok(token) => token,
        Err(err) => return auth::handle_api_error(jar, &err, "/packages"),
    };

    match state
        .api()
        .post(&format!("/package/{id}/cancel"), json!({}), Some(&token))
        .await
    {
        Ok(_) => {
            let jar = flash::push(
                jar,
                FlashCategory::Success,
                "Package submission has been cancelled.",
            );
            (jar, Redirect::to(&detail_path(&id))).into_response()
        }
        Err(err) => auth::handle_api_error(jar, &err, &detail_path(&id)),
    }
}

pub async fn delete(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(id): Path<String>,
) -> Response {
    let current = match auth::require_scope(&state, &jar, Scope::PackageWrite).await {
        Ok(current) => current,
        Err(denied) => return denied,
    };
    let token = match state.user_token(current.id()).await {
        Ok(token) => token,
        Err(err) => return auth::handle_api_error(jar, &err, "/packages"),
    };

    let package = match load_package(&state, &token, &id).await {
        Ok(package) => package,
        Err(err) => return auth::handle_api_error(jar, &err, "/packages"),
    };
    match state
        .api()
        .delete(&format!("/package/admin/{id}"), Some(&token))
        .await
    {
        Ok(_) => {
            let jar = flash::push(
                jar,
                FlashCategory::Success,
                format!("Package {} has been deleted.", package.title),
            );
            (jar, Redirect::to("/packages")).into_response()
        }
        Err(err) => auth::handle_api_error(jar, &err, &detail_path(&id)),
    }
}

// ---------------------------------------------------------------------------
// detail page
// ---------------------------------------------------------------------------

pub async fn detail(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(id): Path<String>,
) -> Response {
    let current = match auth::require_scope(&state, &jar, Scope::PackageRead).await {
        Ok(current) => current,
        Err(denied) => return denied,
    };
    let token = match state.user_token(current.id()).await {
        Ok(token) => token,
        Err(err) => return auth::handle_api_error(jar, &err, "/packages"),
    };
    let package = match load_package(&state, &token, &id).await {
        Ok(package) => package,
        Err(err) => return auth::handle_api_error(jar, &err, "/packages"),
    };

    let title = package.title.clone();
    let content = render_detail(&package, &current);
    render_user_page(jar, &current, &title, content)
}

fn tag_button(package: &Package, kind: TagKind, current: &CurrentUser) -> String {
    if !current.has_scope(kind.scope()) {
        return String::new();
    }
    let exists = kind.is_singleton() && package.tag(kind.tag()).is_some();
    let label = if exists {
        format!("Edit {}", kind.label())
    } else {
        format!("Add {}", kind.label())
    };
    Button::link(
        &label,
        format!("/packages/{}/tag/{}", package.id, kind.segment()),
        if kind.is_singleton() {
            ButtonTheme::Primary
        } else {
            ButtonTheme::Success
        },
    )
    .render()
}

fn untag_button(package: &Package, kind: TagKind, instance_id: &str, current: &CurrentUser) -> String {
    if !current.has_scope(kind.scope()) {
        return String::new();
    }
    Button::post(
        "Remove",
        format!(
            "/packages/{}/untag/{}/{}",
            package.id,
            kind.segment(),
            instance_id
        ),
        ButtonTheme::Danger,
    )
    .with_prompt("Are you sure you want to remove this tag?")
    .render()
}

fn singleton_tag_card(
    package: &Package,
    kind: TagKind,
    current: &CurrentUser,
    body: impl Fn(&Value) -> String,
) -> String {
    let button = tag_button(package, kind, current);
    match package.tag(kind.tag()) {
        Some(instance) => {
            let meta = instance
                .timestamp
                .as_deref()
                .map(|ts| {
                    format!(
                        r#"<p class="meta">Set by {user}, {when}</p>"#,
                        user = escape_html(instance.user_name.as_deref().unwrap_or("unknown")),
                        when = filters::format_timestamp(ts),
                    )
                })
                .unwrap_or_default();
            format!(
                r#"<div class="tag-card">
    <strong>{label}</strong>
    {body}
    {meta}
    {button}
    {remove}
</div>"#,
                label = kind.label(),
                body = body(&instance.data),
                remove = untag_button(package, kind, &instance.id, current),
            )
        }
        None => format!(
            r#"<div class="tag-card">
    <strong>{label}</strong>
    <p class="note">Not set.</p>
    {button}
</div>"#,
            label = kind.label(),
        ),
    }
}

fn render_detail(package: &Package, current: &CurrentUser) -> String {
    let id = &package.id;
    let can_edit = current.has_scope(Scope::PackageWrite);

    let mut actions = String::new();
    if can_edit {
        actions.push_str(
            &Button::link("Edit", format!("/packages/{id}/edit"), ButtonTheme::Primary).render(),
        );
        actions.push_str(
            &Button::post("Submit", format!("/packages/{id}/submit"), ButtonTheme::Success)
                .with_prompt("Are you sure you want to submit the package?")
                .render(),
        );
        actions.push_str(
            &Button::post("Cancel", format!("/packages/{id}/cancel"), ButtonTheme::Warning)
                .with_prompt("Are you sure you want to cancel the package submission?")
                .render(),
        );
        actions.push_str(
            &Button::post("Delete", format!("/packages/{id}/delete"), ButtonTheme::Danger)
                .with_prompt("Are you sure you want to delete this package? This cannot be undone!")
                .render(),
        );
    }

    let doi_card = singleton_tag_card(package, TagKind::Doi, current, |data| {
        format!("<p>{}</p>", escape_html(data["doi"].as_str().unwrap_or("")))
    });
    let abstract_card = singleton_tag_card(package, TagKind::Abstract, current, |data| {
        format!(
            "<p class=\"note\">{}</p>",
            escape_html(data["abstract"].as_str().unwrap_or(""))
        )
    });
    let lineage_card = singleton_tag_card(package, TagKind::Lineage, current, |data| {
        format!(
            "<p class=\"note\">{}</p>",
            escape_html(data["lineage"].as_str().unwrap_or(""))
        )
    });
    let geoloc_card = singleton_tag_card(package, TagKind::Geoloc, current, |data| {
        let place = data["place"].as_str().unwrap_or("");
        if data["shape"].as_str() == Some(SHAPE_BOX) {
            format!(
                "<p>{place}: {s} to {n} (lat), {w} to {e} (lon)</p>",
                place = escape_html(place),
                n = data["north"],
                s = data["south"],
                e = data["east"],
                w = data["west"],
            )
        } else {
            format!(
                "<p>{place}: {n} (lat), {e} (lon)</p>",
                place = escape_html(place),
                n = data["north"],
                e = data["east"],
            )
        }
    });
    let daterange_card = singleton_tag_card(package, TagKind::DateRange, current, |data| {
        format!(
            "<p>{} to {}</p>",
            filters::format_date(data["start"].as_str().unwrap_or("")),
            filters::format_date(data["end"].as_str().unwrap_or("")),
        )
    });

    let contributor_rows: String = package
        .tags(PackageTag::Contributor)
        .iter()
        .map(|instance| {
            let data = &instance.data;
            format!(
                r#"<tr>
    <td>{name}</td>
    <td>{role}</td>
    <td>{orcid}</td>
    <td>{remove}</td>
</tr>"#,
                name = escape_html(data["name"].as_str().unwrap_or("")),
                role = escape_html(data["role"].as_str().unwrap_or("")),
                orcid = escape_html(data["orcid"].as_str().unwrap_or("")),
                remove = untag_button(package, TagKind::Contributor, &instance.id, current),
            )
        })
        .collect();

    let sdg_rows: String = package
        .tags(PackageTag::Sdg)
        .iter()
        .map(|instance| {
            format!(
                r#"<tr>
    <td>{keyword}</td>
    <td>{remove}</td>
</tr>"#,
                keyword = escape_html(instance.keyword.as_deref().unwrap_or("")),
                remove = untag_button(package, TagKind::Sdg, &instance.id, current),
            )
        })
        .collect();

    // the API returns a package's resources as a flat embedded list
    let resources = Page::from_items(package.resources.clone());
    let resource_rows: String = resources
        .items
        .iter()
        .map(|resource| {
            let remove = if can_edit {
                Button::post(
                    "Remove",
                    format!("/packages/{id}/resource/{}/delete", resource.id),
                    ButtonTheme::Danger,
                )
                .with_prompt("Are you sure you want to remove this resource?")
                .render()
            } else {
                String::new()
            };
            format!(
                r#"<tr>
    <td>{filename}</td>
    <td>{title}</td>
    <td>{description}</td>
    <td>{size}</td>
    <td>{added}</td>
    <td>{remove}</td>
</tr>"#,
                filename = escape_html(resource.filename.as_deref().unwrap_or("")),
                title = escape_html(resource.title.as_deref().unwrap_or("")),
                description = escape_html(resource.description.as_deref().unwrap_or("")),
                size = resource.size.map(filters::format_bytes).unwrap_or_default(),
                added = resource
                    .timestamp
                    .as_deref()
                    .map(filters::format_date)
                    .unwrap_or_default(),
            )
        })
        .collect();

    let upload_forms = if can_edit {
        format!(
            r#"<form method="post" action="/packages/{id}/upload" enctype="multipart/form-data">
        <label for="file">File upload</label>
        <input type="file" id="file" name="file" required>
        <label for="upload-title">Resource title</label>
        <input type="text" id="upload-title" name="title">
        <label for="upload-description">Resource description</label>
        <input type="text" id="upload-description" name="description">
        <input type="hidden" name="sha256" value="">
        <button type="submit">Upload file</button>
    </form>
    <form method="post" action="/packages/{id}/upload-zip" enctype="multipart/form-data">
        <label for="zip-file">Zip upload (contents are unpacked into the package)</label>
        <input type="file" id="zip-file" name="file" accept=".zip" required>
        <input type="hidden" name="sha256" value="">
        <button type="submit">Upload zip</button>
    </form>"#
        )
    } else {
        String::new()
    };

    let institution_btn = if current.has_scope(Scope::KeywordSuggest) {
        Button::link(
            "Add Institution",
            format!("/packages/{id}/institution"),
            ButtonTheme::Info,
        )
        .render()
    } else {
        String::new()
    };

    format!(
        r#"<section class="panel" id="overview">
    <h2>{title}</h2>
    <p class="note">Provider: {provider} &middot; Status: {status}</p>
    {actions}
    {doi_card}
    {abstract_card}
    {lineage_card}
    {geoloc_card}
    {daterange_card}
</section>
<section class="panel" id="contributors">
    <h2>Contributors</h2>
    <table>
        <tr><th>Name</th><th>Role</th><th>ORCID</th><th></th></tr>
        {contributor_rows}
    </table>
    {contrib_btn}
    {institution_btn}
</section>
<section class="panel" id="sdgs">
    <h2>Sustainable Development Goals</h2>
    <table>
        <tr><th>Goal / target / indicator</th><th></th></tr>
        {sdg_rows}
    </table>
    {sdg_btn}
</section>
<section class="panel" id="resources">
    <h2>Resources</h2>
    <p class="note">{resource_total} resources.</p>
    <table>
        <tr><th>File</th><th>Title</th><th>Description</th><th>Size</th><th>Added</th><th></th></tr>
        {resource_rows}
    </table>
    {upload_forms}
</section>"#,
        title = escape_html(&package.title),
        provider = escape_html(&package.provider_id),
        status = escape_html(package.status.as_deref().unwrap_or("pending")),
        contrib_btn = tag_button(package, TagKind::Contributor, current),
        sdg_btn = tag_button(package, TagKind::Sdg, current),
        resource_total = resources.total,
    )
}

// ---------------------------------------------------------------------------
// tag editing
// ---------------------------------------------------------------------------

pub async fn tag_page(
    State(state): State<AppState>,
    jar: CookieJar,
    Path((id, kind)): Path<(String, String)>,
) -> Response {
    let Some(kind) = TagKind::from_segment(&kind) else {
        return (axum::http::StatusCode::NOT_FOUND, "no such tag").into_response();
    };
    let current = match auth::require_scope(&state, &jar, kind.scope()).await {
        Ok(current) => current,
        Err(denied) => return denied,
    };
    let token = match state.user_token(current.id()).await {
        Ok(token) => token,
        Err(err) => return auth::handle_api_error(jar, &err, "/packages"),
    };
    let package = match load_package(&state, &token, &id).await {
        Ok(package) => package,
        Err(err) => return auth::handle_api_error(jar, &err, "/packages"),
    };

    // singleton tags pre-fill their edit form from the current instance
    let fields = if kind.is_singleton() {
        package
            .tag(kind.tag())
            .map(|instance| fieldmap_from_tag(&instance.data))
            .unwrap_or_default()
    } else {
        FieldMap::new()
    };

    let inner = match render_tag_fields(&state, &token, kind, &fields, &FormErrors::default()).await
    {
        Ok(inner) => inner,
        Err(err) => return auth::handle_api_error(jar, &err, &detail_path(&id)),
    };
    let content = tag_form_panel(&package, kind, &inner);
    render_user_page(jar, &current, kind.label(), content)
}

pub async fn tag_save(
    State(state): State<AppState>,
    jar: CookieJar,
    Path((id, kind)): Path<(String, String)>,
    RawForm(body): RawForm,
) -> Response {
    let Some(kind) = TagKind::from_segment(&kind) else {
        return (axum::http::StatusCode::NOT_FOUND, "no such tag").into_response();
    };
    let current = match auth::require_scope(&state, &jar, kind.scope()).await {
        Ok(current) => current,
        Err(denied) => return denied,
    };
    let token = match state.user_token(current.id()).await {
        Ok(token) => token,
        Err(err) => return auth::handle_api_error(jar, &err, "/packages"),
    };

    let fields = parse_urlencoded(&String::from_utf8_lossy(&body));
    let (errors, payload) = validate_tag(kind, &fields);

    if errors.is_empty() {
        match state
            .api()
            .post(&format!("/package/{id}/tag"), payload, Some(&token))
            .await
        {
            Ok(_) => {
                let jar = flash::push(
                    jar,
                    FlashCategory::Success,
                    format!("{} has been saved.", kind.label()),
                );
                return (jar, Redirect::to(&detail_anchor(&id, kind.anchor()))).into_response();
            }
            Err(err) => {
                let back = format!("/packages/{id}/tag/{}", kind.segment());
                return auth::handle_api_error(jar, &err, &back);
            }
        }
    }

    // invalid input: re-render the form inline with the submitted values
    let package = match load_package(&state, &token, &id).await {
        Ok(package) => package,
        Err(err) => return auth::handle_api_error(jar, &err, "/packages"),
    };
    let inner = match render_tag_fields(&state, &token, kind, &fields, &errors).await {
        Ok(inner) => inner,
        Err(err) => return auth::handle_api_error(jar, &err, &detail_path(&id)),
    };
    let content = tag_form_panel(&package, kind, &inner);
    render_user_page(jar, &current, kind.label(), content)
}

/// Validate the submitted fields for a tag kind and build the API payload
/// for `POST /package/{id}/tag`.
fn validate_tag(kind: TagKind, fields: &FieldMap) -> (FormErrors, Value) {
    let tag_id = kind.tag().as_str();
    match kind {
        TagKind::Doi => {
            let form = DoiTagForm::from_fields(fields);
            (form.validate(), json!({ "tag_id": tag_id, "data": form.payload() }))
        }
        TagKind::Geoloc => {
            let form = GeoLocationTagForm::from_fields(fields);
            (form.validate(), json!({ "tag_id": tag_id, "data": form.payload() }))
        }
        TagKind::DateRange => {
            let form = DateRangeTagForm::from_fields(fields);
            (form.validate(), json!({ "tag_id": tag_id, "data": form.payload() }))
        }
        TagKind::Contributor => {
            let form = ContributorTagForm::from_fields(fields);
            (form.validate(), json!({ "tag_id": tag_id, "data": form.payload() }))
        }
        TagKind::Sdg => {
            let form = SdgTagForm::from_fields(fields);
            let keyword = form.keyword().map(str::to_string);
            (
                form.validate(),
                json!({ "tag_id": tag_id, "keyword": keyword, "data": {} }),
            )
        }
        TagKind::Abstract => {
            let form = AbstractTagForm::from_fields(fields);
            (form.validate(), json!({ "tag_id": tag_id, "data": form.payload() }))
        }
        TagKind::Lineage => {
            let form = LineageTagForm::from_fields(fields);
            (form.validate(), json!({ "tag_id": tag_id, "data": form.payload() }))
        }
    }
}

fn tag_form_panel(package: &Package, kind: TagKind, inner: &str) -> String {
    format!(
        r#"<section class="panel">
    <h2>{label}: {title}</h2>
    <form method="post" action="/packages/{id}/tag/{segment}">
{inner}
        <button type="submit">Save</button>
    </form>
</section>
<a class="btn secondary" href="{back}">&larr; Back to package</a>"#,
        label = kind.label(),
        title = escape_html(&package.title),
        id = package.id,
        segment = kind.segment(),
        back = detail_path(&package.id),
    )
}

/// Render the kind-specific form fields, fetching select choices where the
/// form needs them.
async fn render_tag_fields(
    state: &AppState,
    token: &str,
    kind: TagKind,
    fields: &FieldMap,
    errors: &FormErrors,
) -> Result<String, ApiError> {
    let html = match kind {
        TagKind::Doi => {
            let form = DoiTagForm::from_fields(fields);
            format!(
                r#"        <label for="doi">DOI</label>
        <input type="text" id="doi" name="doi" value="{doi}" required>
        {doi_error}"#,
                doi = escape_html(form.doi.as_deref().unwrap_or("")),
                doi_error = render_field_error(errors, "doi"),
            )
        }
        TagKind::Geoloc => {
            let form = GeoLocationTagForm::from_fields(fields);
            let point_selected = if form.is_box() { "" } else { " selected" };
            let box_selected = if form.is_box() { " selected" } else { "" };
            format!(
                r#"        <label for="place">Place name</label>
        <input type="text" id="place" name="place" value="{place}" required>
        {place_error}
        <label for="shape">Shape</label>
        <select id="shape" name="shape">
            <option value="{point}"{point_selected}>Point</option>
            <option value="{box_}"{box_selected}>Bounding box</option>
        </select>
        <label for="north">North / latitude</label>
        <input type="text" id="north" name="north" value="{north}" required>
        {north_error}
        <label for="east">East / longitude</label>
        <input type="text" id="east" name="east" value="{east}" required>
        {east_error}
        <label for="south">South bound (box only)</label>
        <input type="text" id="south" name="south" value="{south}">
        {south_error}
        <label for="west">West bound (box only)</label>
        <input type="text" id="west" name="west" value="{west}">
        {west_error}"#,
                place = escape_html(form.place.as_deref().unwrap_or("")),
                place_error = render_field_error(errors, "place"),
                point = SHAPE_POINT,
                box_ = SHAPE_BOX,
                north = escape_html(form.north.as_deref().unwrap_or("")),
                north_error = render_field_error(errors, "north"),
                east = escape_html(form.east.as_deref().unwrap_or("")),
                east_error = render_field_error(errors, "east"),
                south = escape_html(form.south.as_deref().unwrap_or("")),
                south_error = render_field_error(errors, "south"),
                west = escape_html(form.west.as_deref().unwrap_or("")),
                west_error = render_field_error(errors, "west"),
            )
        }
        TagKind::DateRange => {
            let form = DateRangeTagForm::from_fields(fields);
            format!(
                r#"        <label for="start">Start date</label>
        <input type="date" id="start" name="start" value="{start}" required>
        {start_error}
        <label for="end">End date</label>
        <input type="date" id="end" name="end" value="{end}" required>
        {end_error}"#,
                start = escape_html(form.start.as_deref().unwrap_or("")),
                start_error = render_field_error(errors, "start"),
                end = escape_html(form.end.as_deref().unwrap_or("")),
                end_error = render_field_error(errors, "end"),
            )
        }
        TagKind::Contributor => {
            let form = ContributorTagForm::from_fields(fields);
            let institutions = institution_choices(state, token).await?;
            let affiliation_options: String = institutions
                .iter()
                .map(|keyword| {
                    let id = keyword.id.to_string();
                    let selected = if form.affiliations.contains(&id) {
                        " selected"
                    } else {
                        ""
                    };
                    let label = if keyword.is_proposed() {
                        format!("{} (pending verification)", keyword.key)
                    } else {
                        keyword.key.clone()
                    };
                    format!(
                        r#"<option value="{id}"{selected}>{label}</option>"#,
                        label = escape_html(&label),
                    )
                })
                .collect();
            let author_options: String = AUTHOR_ROLES
                .iter()
                .map(|role| {
                    let selected = if form.author_role.as_deref() == Some(*role) {
                        " selected"
                    } else {
                        ""
                    };
                    format!(r#"<option value="{role}"{selected}>{role}</option>"#)
                })
                .collect();
            let contributor_options: String = CONTRIBUTOR_ROLES
                .iter()
                .map(|role| {
                    let selected = if form.contributor_role.as_deref() == Some(*role) {
                        " selected"
                    } else {
                        ""
                    };
                    format!(r#"<option value="{role}"{selected}>{role}</option>"#)
                })
                .collect();
            let author_checked = if form.is_author { " checked" } else { "" };
            format!(
                r#"        <label for="name">Name</label>
        <input type="text" id="name" name="name" value="{name}" required>
        {name_error}
        <label for="orcid">ORCID</label>
        <input type="text" id="orcid" name="orcid" value="{orcid}" placeholder="0000-0000-0000-0000">
        {orcid_error}
        <label><input type="checkbox" name="is_author"{author_checked}> Cited author</label>
        <label for="author_role">Author role</label>
        <select id="author_role" name="author_role">
            <option value="">(None)</option>
            {author_options}
        </select>
        {author_role_error}
        <label for="contributor_role">Contributor role</label>
        <select id="contributor_role" name="contributor_role">
            <option value="">(None)</option>
            {contributor_options}
        </select>
        {contributor_role_error}
        <label for="contact_info">Contact info (point of contact only)</label>
        <input type="text" id="contact_info" name="contact_info" value="{contact_info}">
        <label for="affiliations">Affiliations</label>
        <select id="affiliations" name="affiliations" multiple>
            {affiliation_options}
        </select>
        {affiliations_error}"#,
                name = escape_html(form.name.as_deref().unwrap_or("")),
                name_error = render_field_error(errors, "name"),
                orcid = escape_html(form.orcid.as_deref().unwrap_or("")),
                orcid_error = render_field_error(errors, "orcid"),
                author_role_error = render_field_error(errors, "author_role"),
                contributor_role_error = render_field_error(errors, "contributor_role"),
                contact_info = escape_html(form.contact_info.as_deref().unwrap_or("")),
                affiliations_error = render_field_error(errors, "affiliations"),
            )
        }
        TagKind::Sdg => {
            let form = SdgTagForm::from_fields(fields);
            format!(
                r#"        <p class="note">Associate the package with a UN Sustainable Development Goal.
        Goals, targets and indicators are listed in the <a href="/vocab/sdg">SDG vocabulary</a>.</p>
        <label for="goal">Goal</label>
        <input type="text" id="goal" name="goal" value="{goal}" required>
        {goal_error}
        <label for="target">Target (optional)</label>
        <input type="text" id="target" name="target" value="{target}">
        <label for="indicator">Indicator (optional)</label>
        <input type="text" id="indicator" name="indicator" value="{indicator}">"#,
                goal = escape_html(form.goal.as_deref().unwrap_or("")),
                goal_error = render_field_error(errors, "goal"),
                target = escape_html(form.target.as_deref().unwrap_or("")),
                indicator = escape_html(form.indicator.as_deref().unwrap_or("")),
            )
        }
        TagKind::Abstract => {
            let form = AbstractTagForm::from_fields(fields);
            format!(
                r#"        <label for="abstract">Abstract</label>
        <textarea id="abstract" name="abstract" required>{text}</textarea>
        {error}"#,
                text = escape_html(form.abstract_text.as_deref().unwrap_or("")),
                error = render_field_error(errors, "abstract"),
            )
        }
        TagKind::Lineage => {
            let form = LineageTagForm::from_fields(fields);
            format!(
                r#"        <label for="lineage">Methods (lineage)</label>
        <textarea id="lineage" name="lineage" required>{text}</textarea>
        {error}"#,
                text = escape_html(form.lineage.as_deref().unwrap_or("")),
                error = render_field_error(errors, "lineage"),
            )
        }
    };
    Ok(html)
}

pub async fn untag(
    State(state): State<AppState>,
    jar: CookieJar,
    Path((id, kind, tag_instance_id)): Path<(String, String, String)>,
) -> Response {
    let Some(kind) = TagKind::from_segment(&kind) else {
        return (axum::http::StatusCode::NOT_FOUND, "no such tag").into_response();
    };
    let current = match auth::require_scope(&state, &jar, kind.scope()).await {
        Ok(current) => current,
        Err(denied) => return denied,
    };
    let token = match state.user_token(current.id()).await {
        Ok(token) => token,
        Err(err) => return auth::handle_api_error(jar, &err, "/packages"),
    };

    match state
        .api()
        .delete(&format!("/package/{id}/tag/{tag_instance_id}"), Some(&token))
        .await
    {
        Ok(_) => {
            let jar = flash::push(
                jar,
                FlashCategory::Success,
                format!("{} has been removed.", kind.label()),
            );
            (jar, Redirect::to(&detail_anchor(&id, kind.anchor()))).into_response()
        }
        Err(err) => auth::handle_api_error(jar, &err, &detail_path(&id)),
    }
}

// ---------------------------------------------------------------------------
// institution proposal
// ---------------------------------------------------------------------------

fn institution_form_panel(
    package_id: &str,
    form: &InstitutionKeywordForm,
    errors: &FormErrors,
) -> String {
    format!(
        r#"<section class="panel">
    <h2>Add an unlisted institution</h2>
    <p class="note">Propose an institution to the list of available contributor affiliations.
    Proposals are verified by a curator before publication.</p>
    <form method="post" action="/packages/{package_id}/institution">
        <label for="key">Full name of the institution</label>
        <input type="text" id="key" name="key" value="{key}" required>
        {key_error}
        <label for="abbr">Acronym or abbreviated form</label>
        <input type="text" id="abbr" name="abbr" value="{abbr}">
        <label for="ror">Research Organization Registry (ROR) identifier</label>
        <input type="text" id="ror" name="ror" value="{ror}" placeholder="e.g. 03rp50x72">
        {ror_error}
        <button type="submit">Propose</button>
    </form>
</section>
<a class="btn secondary" href="/packages/{package_id}#contributors">&larr; Back to package</a>"#,
        key = escape_html(form.key.as_deref().unwrap_or("")),
        key_error = render_field_error(errors, "key"),
        abbr = escape_html(form.abbr.as_deref().unwrap_or("")),
        ror = escape_html(form.ror.as_deref().unwrap_or("")),
        ror_error = render_field_error(errors, "ror"),
    )
}

pub async fn institution_page(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(id): Path<String>,
) -> Response {
    let current = match auth::require_scope(&state, &jar, Scope::KeywordSuggest).await {
        Ok(current) => current,
        Err(denied) => return denied,
    };
    let content = institution_form_panel(&id, &InstitutionKeywordForm::default(), &FormErrors::default());
    render_user_page(jar, &current, "Add institution", content)
}

pub async fn institution_save(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(id): Path<String>,
    RawForm(body): RawForm,
) -> Response {
    let current = match auth::require_scope(&state, &jar, Scope::KeywordSuggest).await {
        Ok(current) => current,
        Err(denied) => return denied,
    };
    let token = match state.user_token(current.id()).await {
        Ok(token) => token,
        Err(err) => return auth::handle_api_error(jar, &err, "/packages"),
    };

    let fields = parse_urlencoded(&String::from_utf8_lossy(&body));
    let form = InstitutionKeywordForm::from_fields(&fields);
    let errors = form.validate();

    if errors.is_empty() {
        match state
            .api()
            .post("/keyword/Institution/", form.payload(), Some(&token))
            .await
        {
            Ok(_) => {
                let jar = flash::push(
                    jar,
                    FlashCategory::Success,
                    format!(
                        "Institution {} has been proposed.",
                        form.key.as_deref().unwrap_or_default()
                    ),
                );
                return (jar, Redirect::to(&detail_anchor(&id, "contributors"))).into_response();
            }
            Err(err) => {
                let back = format!("/packages/{id}/institution");
                return auth::handle_api_error(jar, &err, &back);
            }
        }
    }

    let content = institution_form_panel(&id, &form, &errors);
    render_user_page(jar, &current, "Add institution", content)
}

// ---------------------------------------------------------------------------
// resource uploads
// ---------------------------------------------------------------------------

fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Drain a multipart submission into text fields and the (single) file part.
/// A file input submitted empty arrives with an empty filename and counts as
/// no file.
async fn read_upload(mut multipart: Multipart) -> Result<(FieldMap, Option<FileUpload>), String> {
    let mut fields = FieldMap::new();
    let mut file = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| format!("failed to parse the upload form: {err}"))?
    {
        let name = field.name().unwrap_or("").to_string();
        match field.file_name() {
            Some(filename) => {
                let filename = filename.to_string();
                let mimetype = field
                    .content_type()
                    .map(str::to_string)
                    .unwrap_or_else(|| mime::APPLICATION_OCTET_STREAM.to_string());
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|err| format!("failed to read the uploaded file: {err}"))?
                    .to_vec();
                if !filename.is_empty() {
                    file = Some(FileUpload {
                        filename,
                        mimetype,
                        bytes,
                    });
                }
            }
            None => {
                let value = field
                    .text()
                    .await
                    .map_err(|err| format!("failed to read field `{name}`: {err}"))?;
                fields.entry(name).or_default().push(value);
            }
        }
    }

    Ok((fields, file))
}

fn flash_form_errors(jar: CookieJar, errors: &FormErrors) -> CookieJar {
    errors.iter().fold(jar, |jar, (field, message)| {
        flash::push(jar, FlashCategory::Error, format!("{field}: {message}"))
    })
}

pub async fn upload_file(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Response {
    let current = match auth::require_scope(&state, &jar, Scope::PackageWrite).await {
        Ok(current) => current,
        Err(denied) => return denied,
    };
    let token = match state.user_token(current.id()).await {
        Ok(token) => token,
        Err(err) => return auth::handle_api_error(jar, &err, "/packages"),
    };

    let (fields, file) = match read_upload(multipart).await {
        Ok(parsed) => parsed,
        Err(message) => {
            let jar = flash::push(jar, FlashCategory::Error, message);
            return (jar, Redirect::to(&detail_anchor(&id, "resources"))).into_response();
        }
    };

    let form = FileUploadForm::from_fields(&fields);
    let mut errors = form.validate(file.as_ref().map(|f| f.filename.as_str()));

    let digest = file.as_ref().map(|f| sha256_hex(&f.bytes));
    if let (Some(claimed), Some(computed)) = (&form.sha256, &digest) {
        if !claimed.eq_ignore_ascii_case(computed) {
            errors.add("sha256", "The claimed digest does not match the uploaded file.");
        }
    }

    if !errors.is_empty() {
        let jar = flash_form_errors(jar, &errors);
        return (jar, Redirect::to(&detail_anchor(&id, "resources"))).into_response();
    }
    let (Some(file), Some(digest)) = (file, digest) else {
        // unreachable in practice: validate() requires the file part
        let jar = flash::push(jar, FlashCategory::Error, "file: Please select a file.");
        return (jar, Redirect::to(&detail_anchor(&id, "resources"))).into_response();
    };

    let package = match load_package(&state, &token, &id).await {
        Ok(package) => package,
        Err(err) => return auth::handle_api_error(jar, &err, "/packages"),
    };

    let filename = sanitize_filename::sanitize(&file.filename);
    let archive_id = &state.settings().archive_id;
    let mut params = vec![
        ("filename", filename.clone()),
        ("mimetype", file.mimetype.clone()),
        ("sha256", digest),
        ("package_id", id.clone()),
    ];
    if let Some(title) = &form.title {
        params.push(("title", title.clone()));
    }
    if let Some(description) = &form.description {
        params.push(("description", description.clone()));
    }

    let path = format!("/archive/{archive_id}/{}/{id}/", package.provider_id);
    match state.api().put_file(&path, file, &params, Some(&token)).await {
        Ok(_) => {
            let jar = flash::push(
                jar,
                FlashCategory::Success,
                format!("File {filename} has been uploaded."),
            );
            (jar, Redirect::to(&detail_anchor(&id, "resources"))).into_response()
        }
        Err(err) => auth::handle_api_error(jar, &err, &detail_path(&id)),
    }
}

pub async fn upload_zip(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Response {
    let current = match auth::require_scope(&state, &jar, Scope::PackageWrite).await {
        Ok(current) => current,
        Err(denied) => return denied,
    };
    let token = match state.user_token(current.id()).await {
        Ok(token) => token,
        Err(err) => return auth::handle_api_error(jar, &err, "/packages"),
    };

    let (fields, file) = match read_upload(multipart).await {
        Ok(parsed) => parsed,
        Err(message) => {
            let jar = flash::push(jar, FlashCategory::Error, message);
            return (jar, Redirect::to(&detail_anchor(&id, "resources"))).into_response();
        }
    };

    let form = ZipUploadForm::from_fields(&fields);
    let mut errors = form.validate(file.as_ref().map(|f| f.filename.as_str()));

    let digest = file.as_ref().map(|f| sha256_hex(&f.bytes));
    if let (Some(claimed), Some(computed)) = (&form.sha256, &digest) {
        if !claimed.eq_ignore_ascii_case(computed) {
            errors.add("sha256", "The claimed digest does not match the uploaded file.");
        }
    }

    if !errors.is_empty() {
        let jar = flash_form_errors(jar, &errors);
        return (jar, Redirect::to(&detail_anchor(&id, "resources"))).into_response();
    }
    let (Some(file), Some(digest)) = (file, digest) else {
        let jar = flash::push(jar, FlashCategory::Error, "file: Please select a file.");
        return (jar, Redirect::to(&detail_anchor(&id, "resources"))).into_response();
    };

    let package = match load_package(&state, &token, &id).await {
        Ok(package) => package,
        Err(err) => return auth::handle_api_error(jar, &err, "/packages"),
    };

    let filename = sanitize_filename::sanitize(&file.filename);
    let archive_id = &state.settings().archive_id;
    let params = vec![
        ("filename", filename.clone()),
        ("sha256", digest),
        ("package_id", id.clone()),
        ("unpack", "true".to_string()),
    ];

    let path = format!("/archive/{archive_id}/{}/{id}/", package.provider_id);
    match state.api().put_file(&path, file, &params, Some(&token)).await {
        Ok(_) => {
            let jar = flash::push(
                jar,
                FlashCategory::Success,
                format!("Zip file {filename} has been uploaded and unpacked."),
            );
            (jar, Redirect::to(&detail_anchor(&id, "resources"))).into_response()
        }
        Err(err) => auth::handle_api_error(jar, &err, &detail_path(&id)),
    }
}

pub async fn delete_resource(
    State(state): State<AppState>,
    jar: CookieJar,
    Path((id, resource_id)): Path<(String, String)>,
) -> Response {
    let current = match auth::require_scope(&state, &jar, Scope::PackageWrite).await {
        Ok(current) => current,
        Err(denied) => return denied,
    };
    let token = match state.user_token(current.id()).await {
        Ok(token) => token,
        Err(err) => return auth::handle_api_error(jar, &err, "/packages"),
    };

    match state
        .api()
        .delete(&format!("/package/{id}/resource/{resource_id}"), Some(&token))
        .await
    {
        Ok(_) => {
            let jar = flash::push(jar, FlashCategory::Success, "Resource has been removed.");
            (jar, Redirect::to(&detail_anchor(&id, "resources"))).into_response()
        }
        Err(err) => auth::handle_api_error(jar, &err, &detail_path(&id)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_kinds_round_trip_through_route_segments() {
        for kind in [
            TagKind::Doi,
            TagKind::Geoloc,
            TagKind::DateRange,
            TagKind::Contributor,
            TagKind::Sdg,
            TagKind::Abstract,
            TagKind::Lineage,
        ] {
            assert_eq!(TagKind::from_segment(kind.segment()), Some(kind));
        }
        assert_eq!(TagKind::from_segment("unknown"), None);
    }

    #[test]
    fn doi_and_sdg_tags_need_their_dedicated_scopes() {
        assert_eq!(TagKind::Doi.scope(), Scope::PackageDoi);
        assert_eq!(TagKind::Sdg.scope(), Scope::PackageSdg);
        assert_eq!(TagKind::Abstract.scope(), Scope::PackageWrite);
    }

    #[test]
    fn sdg_payload_carries_the_keyword_not_data() {
        let fields = parse_urlencoded("goal=SDG+14&target=14.1");
        let (errors, payload) = validate_tag(TagKind::Sdg, &fields);
        assert!(errors.is_empty());
        assert_eq!(payload["keyword"], "14.1");
        assert_eq!(payload["data"], json!({}));
    }

    #[test]
    fn geolocation_payload_nests_under_data() {
        let fields = parse_urlencoded("place=Agulhas&shape=point&north=-35.5&east=21.0");
        let (errors, payload) = validate_tag(TagKind::Geoloc, &fields);
        assert!(errors.is_empty());
        assert_eq!(payload["tag_id"], "Geolocation");
        assert_eq!(payload["data"]["north"], -35.5);
    }

    #[test]
    fn tag_prefill_restores_strings_numbers_and_flags() {
        let data = json!({
            "place": "Agulhas",
            "north": -35.5,
            "is_author": true,
            "ignored": {"nested": 1},
        });
        let fields = fieldmap_from_tag(&data);
        assert_eq!(fields["place"], vec!["Agulhas"]);
        assert_eq!(fields["north"], vec!["-35.5"]);
        assert_eq!(fields["is_author"], vec!["on"]);
        assert!(!fields.contains_key("ignored"));
    }

    #[test]
    fn digests_are_lowercase_hex() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
