use std::borrow::Cow;

use chrono::{Datelike, Utc};

use crate::{forms::FormErrors, session::LocalUser, web::flash::Flash};

const PAGE_BASE_STYLES: &str = r#"
        :root { color-scheme: light; }
        body { font-family: "Helvetica Neue", Arial, sans-serif; margin: 0; background: #f8fafc; color: #0f172a; }
        header { background: #ffffff; padding: 1.75rem 1.5rem; border-bottom: 1px solid #e2e8f0; }
        .header-bar { display: flex; justify-content: space-between; align-items: center; flex-wrap: wrap; gap: 1rem; }
        .header-bar h1 { margin: 0; font-size: 1.6rem; }
        .header-bar h1 a { color: inherit; text-decoration: none; }
        nav { display: flex; gap: 0.75rem; align-items: center; flex-wrap: wrap; }
        nav a { color: #1d4ed8; text-decoration: none; font-weight: 600; background: #e0f2fe; padding: 0.45rem 0.9rem; border-radius: 999px; border: 1px solid #bfdbfe; }
        nav a:hover { background: #bfdbfe; }
        nav span.whoami { color: #475569; font-size: 0.95rem; }
        main { padding: 2rem 1.5rem; max-width: 1040px; margin: 0 auto; box-sizing: border-box; }
        .panel { background: #ffffff; border-radius: 12px; border: 1px solid #e2e8f0; padding: 1.5rem; margin-bottom: 1.5rem; box-shadow: 0 18px 40px rgba(15, 23, 42, 0.08); }
        .panel h2 { margin-top: 0; }
        label { display: block; margin-top: 1rem; margin-bottom: 0.4rem; font-weight: 600; }
        input[type="text"], input[type="date"], input[type="number"], select, textarea { width: 100%; padding: 0.7rem; border-radius: 8px; border: 1px solid #cbd5f5; background: #f8fafc; color: #0f172a; box-sizing: border-box; }
        textarea { min-height: 8rem; }
        input:focus, select:focus, textarea:focus { outline: none; border-color: #2563eb; box-shadow: 0 0 0 3px rgba(37, 99, 235, 0.12); }
        .field-error { display: block; margin-top: 0.3rem; color: #b91c1c; font-size: 0.9rem; }
        button { padding: 0.75rem 1.2rem; border: none; border-radius: 8px; background: #2563eb; color: #ffffff; font-weight: 600; cursor: pointer; margin-top: 1.25rem; }
        button:hover { background: #1d4ed8; }
        form.inline { display: inline; }
        .btn { display: inline-block; margin: 0 0.35rem 0.35rem 0; padding: 0.5rem 0.95rem; border-radius: 8px; font-weight: 600; font-size: 0.92rem; border: none; cursor: pointer; text-decoration: none; }
        .btn.primary { background: #2563eb; color: #ffffff; }
        .btn.secondary { background: #e2e8f0; color: #0f172a; }
        .btn.success { background: #16a34a; color: #ffffff; }
        .btn.warning { background: #d97706; color: #ffffff; }
        .btn.danger { background: #dc2626; color: #ffffff; }
        .btn.info { background: #0ea5e9; color: #ffffff; }
        table { width: 100%; border-collapse: collapse; margin-top: 1rem; background: #ffffff; }
        th, td { padding: 0.7rem 0.9rem; border-bottom: 1px solid #e2e8f0; text-align: left; font-size: 0.95rem; }
        th { background: #f1f5f9; font-weight: 600; }
        .flash { padding: 0.9rem 1.2rem; border-radius: 10px; margin-bottom: 1rem; font-weight: 600; border: 1px solid transparent; }
        .flash.info { background: #e0f2fe; border-color: #bae6fd; color: #075985; }
        .flash.success { background: #ecfdf3; border-color: #bbf7d0; color: #166534; }
        .flash.warning { background: #fffbeb; border-color: #fde68a; color: #92400e; }
        .flash.error { background: #fef2f2; border-color: #fecaca; color: #b91c1c; }
        .tag-card { border: 1px solid #e2e8f0; border-radius: 10px; padding: 1rem 1.25rem; margin-top: 0.75rem; }
        .tag-card .meta { color: #64748b; font-size: 0.85rem; }
        .pagination { margin-top: 1.5rem; display: flex; gap: 0.5rem; align-items: center; }
        .pagination a { color: #1d4ed8; text-decoration: none; font-weight: 600; }
        pre.metadata { background: #0f172a; color: #e2e8f0; padding: 1rem; border-radius: 10px; overflow-x: auto; font-size: 0.85rem; }
        .note { color: #475569; font-size: 0.95rem; line-height: 1.6; }
        .app-footer { margin-top: 3rem; text-align: center; font-size: 0.85rem; color: #94a3b8; }
        @media (max-width: 768px) {
            main { padding: 1.5rem 1rem; }
            .header-bar { flex-direction: column; align-items: flex-start; }
        }
"#;

/// Theme names for action buttons.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ButtonTheme {
    Primary,
    Secondary,
    Info,
    Success,
    Warning,
    Danger,
}

impl ButtonTheme {
    fn css_class(&self) -> &'static str {
        match self {
            ButtonTheme::Primary => "primary",
            ButtonTheme::Secondary => "secondary",
            ButtonTheme::Info => "info",
            ButtonTheme::Success => "success",
            ButtonTheme::Warning => "warning",
            ButtonTheme::Danger => "danger",
        }
    }
}

/// A themed action rendered either as a link (GET pages) or a one-button
/// form (POST actions), optionally guarded by a confirmation prompt.
pub struct Button<'a> {
    pub label: &'a str,
    pub href: String,
    pub theme: ButtonTheme,
    pub post: bool,
    pub prompt: Option<&'a str>,
}

impl<'a> Button<'a> {
    pub fn link(label: &'a str, href: impl Into<String>, theme: ButtonTheme) -> Self {
        Self {
            label,
            href: href.into(),
            theme,
            post: false,
            prompt: None,
        }
    }

    pub fn post(label: &'a str, href: impl Into<String>, theme: ButtonTheme) -> Self {
        Self {
            label,
            href: href.into(),
            theme,
            post: true,
            prompt: None,
        }
    }

    pub fn with_prompt(mut self, prompt: &'a str) -> Self {
        self.prompt = Some(prompt);
        self
    }

    pub fn render(&self) -> String {
        if self.post {
            let confirm = self
                .prompt
                .map(|prompt| {
                    format!(
                        r#" onsubmit="return confirm('{}')""#,
                        escape_html(prompt).replace('\'', "\\'")
                    )
                })
                .unwrap_or_default();
            format!(
                r#"<form class="inline" method="post" action="{href}"{confirm}><button class="btn {theme}" type="submit">{label}</button></form>"#,
                href = escape_html(&self.href),
                theme = self.theme.css_class(),
                label = escape_html(self.label),
            )
        } else {
            format!(
                r#"<a class="btn {theme}" href="{href}">{label}</a>"#,
                theme = self.theme.css_class(),
                href = escape_html(&self.href),
                label = escape_html(self.label),
            )
        }
    }
}

pub struct PageLayout<'a> {
    pub title: &'a str,
    pub heading: &'a str,
    pub user: Option<&'a LocalUser>,
    pub flashes: &'a [Flash],
    pub content_html: Cow<'a, str>,
}

pub fn render_page(layout: PageLayout<'_>) -> String {
    let nav = match layout.user {
        Some(user) => format!(
            r#"<span class="whoami">Signed in as <strong>{name}</strong></span>
                <a href="/catalog">Catalog</a>
                <a href="/packages">Packages</a>
                <a href="/archive">Archive</a>
                <a href="/oauth2/logout">Log out</a>"#,
            name = escape_html(&user.name),
        ),
        None => r#"<a href="/catalog">Catalog</a>
                <a href="/oauth2/login">Log in</a>
                <a href="/oauth2/signup">Sign up</a>"#
            .to_string(),
    };

    let flashes = render_flashes(layout.flashes);
    let footer = render_footer();

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>{title}</title>
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <style>
{styles}
    </style>
</head>
<body>
    <header>
        <div class="header-bar">
            <h1><a href="/">{heading}</a></h1>
            <nav>
                {nav}
            </nav>
        </div>
    </header>
    <main>
        {flashes}
{content}
        {footer}
    </main>
</body>
</html>"#,
        title = escape_html(layout.title),
        styles = PAGE_BASE_STYLES,
        heading = escape_html(layout.heading),
        nav = nav,
        flashes = flashes,
        content = layout.content_html,
        footer = footer,
    )
}

pub fn render_flashes(flashes: &[Flash]) -> String {
    flashes
        .iter()
        .map(|flash| {
            format!(
                r#"<div class="flash {class}">{message}</div>"#,
                class = flash.category.css_class(),
                message = escape_html(&flash.message),
            )
        })
        .collect()
}

/// Inline error span for a form field; empty when the field is clean.
pub fn render_field_error(errors: &FormErrors, field: &str) -> String {
    errors
        .get(field)
        .map(|message| {
            format!(
                r#"<span class="field-error">{}</span>"#,
                escape_html(message)
            )
        })
        .unwrap_or_default()
}

/// Previous/next links for a paged listing. `query` carries the rest of the
/// request state, without a page parameter.
pub fn render_pagination(base_path: &str, query: &str, page: u64, pages: u64) -> String {
    if pages <= 1 {
        return String::new();
    }
    let sep = if query.is_empty() { "" } else { "&" };
    let mut parts = Vec::new();
    if page > 1 {
        parts.push(format!(
            r#"<a href="{base_path}?{query}{sep}page={}">&larr; Previous</a>"#,
            page - 1
        ));
    }
    parts.push(format!("<span>Page {page} of {pages}</span>"));
    if page < pages {
        parts.push(format!(
            r#"<a href="{base_path}?{query}{sep}page={}">Next &rarr;</a>"#,
            page + 1
        ));
    }
    format!(r#"<div class="pagination">{}</div>"#, parts.join("\n"))
}

pub fn render_footer() -> String {
    let current_year = Utc::now().year();
    format!(
        r#"<footer class="app-footer">© {year} Research Data Catalog</footer>"#,
        year = current_year
    )
}

pub fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::web::flash::FlashCategory;

    #[test]
    fn escape_html_covers_the_special_characters() {
        assert_eq!(
            escape_html(r#"<b title="a'&'b">"#),
            "&lt;b title=&quot;a&#39;&amp;&#39;b&quot;&gt;"
        );
    }

    #[test]
    fn field_errors_render_inline_and_escaped() {
        let mut errors = FormErrors::default();
        errors.add("doi", "Expecting <DOI>");
        assert_eq!(
            render_field_error(&errors, "doi"),
            r#"<span class="field-error">Expecting &lt;DOI&gt;</span>"#
        );
        assert_eq!(render_field_error(&errors, "title"), "");
    }

    #[test]
    fn post_buttons_render_as_forms_with_confirm() {
        let button = Button::post("Delete", "/packages/p1/delete", ButtonTheme::Danger)
            .with_prompt("Are you sure?");
        let html = button.render();
        assert!(html.contains(r#"action="/packages/p1/delete""#));
        assert!(html.contains("confirm("));
        assert!(html.contains("btn danger"));
    }

    #[test]
    fn pagination_renders_only_within_bounds() {
        assert_eq!(render_pagination("/packages", "", 1, 1), "");
        let html = render_pagination("/catalog", "q=kelp", 2, 3);
        assert!(html.contains("q=kelp&page=1"));
        assert!(html.contains("q=kelp&page=3"));
        assert!(html.contains("Page 2 of 3"));
    }

    #[test]
    fn flashes_render_with_category_classes() {
        let flashes = vec![Flash {
            category: FlashCategory::Warning,
            message: "You do not have permission to access that page.".to_string(),
        }];
        let html = render_flashes(&flashes);
        assert!(html.contains("flash warning"));
    }
}
