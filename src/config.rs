use std::{env, path::PathBuf};

use anyhow::{Context, Result};

/// Runtime settings, read once from the environment at startup.
#[derive(Clone, Debug)]
pub struct Settings {
    /// Base URL of the backend data API.
    pub api_url: String,
    /// Base URL of the Hydra identity provider.
    pub hydra_url: String,
    /// External base URL of this portal, used for OAuth2 redirect URIs.
    pub portal_url: String,
    pub client_id: String,
    pub client_secret: String,
    /// OAuth2 scope set requested at login.
    pub client_scope: Vec<String>,
    /// Redis connection URL; when unset, an in-process cache is used.
    pub cache_url: Option<String>,
    /// Catalog served on the public search pages.
    pub catalog_id: String,
    /// Archive that receives uploaded package resources.
    pub archive_id: String,
    /// URL of the archive storage backend reachable from this host.
    pub archive_url: String,
    /// Metadata schema assigned to new packages.
    pub schema_id: String,
    /// Facet names offered on the catalog search page.
    pub catalog_facets: Vec<String>,
    /// Directory holding static vocabulary JSON files.
    pub vocab_dir: PathBuf,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let api_url = require("API_URL")?;
        let hydra_url = require("HYDRA_URL")?;
        let portal_url = require("PORTAL_URL")?;
        let client_id = require("CLIENT_ID")?;
        let client_secret = require("CLIENT_SECRET")?;

        let client_scope = env::var("CLIENT_SCOPE")
            .unwrap_or_else(|_| "openid offline".to_string())
            .split_whitespace()
            .map(str::to_string)
            .collect();

        let catalog_facets = env::var("CATALOG_FACETS")
            .ok()
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|f| !f.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            api_url: trim_slash(api_url),
            hydra_url: trim_slash(hydra_url),
            portal_url: trim_slash(portal_url),
            client_id,
            client_secret,
            client_scope,
            cache_url: env::var("REDIS_URL").ok(),
            catalog_id: env::var("CATALOG_ID").unwrap_or_else(|_| "public".to_string()),
            archive_id: env::var("ARCHIVE_ID").unwrap_or_else(|_| "default".to_string()),
            archive_url: env::var("ARCHIVE_URL")
                .unwrap_or_else(|_| "file:///var/lib/catalog-portal/archive".to_string()),
            schema_id: env::var("SCHEMA_ID").unwrap_or_else(|_| "datacite-4.3".to_string()),
            catalog_facets,
            vocab_dir: env::var("VOCAB_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("vocab")),
        })
    }

    /// Redirect URI registered with the identity provider for login callbacks.
    pub fn login_redirect_uri(&self) -> String {
        format!("{}/oauth2/logged_in", self.portal_url)
    }

    /// Redirect URI registered for post-logout callbacks.
    pub fn logout_redirect_uri(&self) -> String {
        format!("{}/oauth2/logged_out", self.portal_url)
    }
}

fn require(name: &str) -> Result<String> {
    env::var(name).with_context(|| format!("{name} env var is missing"))
}

fn trim_slash(url: String) -> String {
    url.trim_end_matches('/').to_string()
}
