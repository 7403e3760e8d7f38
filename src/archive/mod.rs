mod filesystem;
mod nextcloud;
mod website;

use std::{fmt, sync::Arc};

use anyhow::{Context, Result};
use async_trait::async_trait;
use url::Url;

pub use filesystem::FilesystemArchive;
pub use nextcloud::NextcloudArchive;
pub use website::WebsiteArchive;

pub type ArchiveResult<T> = Result<T, ArchiveError>;

/// Error raised for any archive operation failure.
#[derive(Debug)]
pub struct ArchiveError {
    message: String,
}

impl ArchiveError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for ArchiveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ArchiveError {}

/// What an archive hands back for a download request: the file's bytes, or a
/// URL the client should be redirected to.
#[derive(Debug)]
pub enum ArchiveContent {
    File { bytes: Vec<u8>, filename: String },
    Redirect(String),
}

/// An archival storage backend addressed by paths relative to its root URL.
#[async_trait]
pub trait Archive: Send + Sync {
    /// Deliver the file at `path`, or a redirect to it.
    async fn get(&self, path: &str) -> ArchiveResult<ArchiveContent>;

    /// Store `bytes` at `path`, creating parent directories as needed.
    async fn put(&self, path: &str, bytes: &[u8]) -> ArchiveResult<()>;

    /// Unpack a zip's contents into the directory at `path`.
    async fn put_zip(&self, path: &str, bytes: &[u8]) -> ArchiveResult<()>;
}

/// Select a backend from the archive URL scheme: `file://` paths use the
/// local filesystem, `nextcloud://` a Nextcloud instance, and plain
/// http(s) URLs a website archive with its own data-access front end.
pub fn from_url(archive_url: &str) -> Result<Arc<dyn Archive>> {
    let url = Url::parse(archive_url).context("invalid archive URL")?;
    match url.scheme() {
        "file" => Ok(Arc::new(FilesystemArchive::new(url.path()))),
        "nextcloud" => Ok(Arc::new(NextcloudArchive::new(archive_url))),
        "http" | "https" => Ok(Arc::new(WebsiteArchive::new(archive_url))),
        other => anyhow::bail!("unsupported archive URL scheme: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn backend_selection_follows_the_url_scheme() {
        let archive = from_url("file:///tmp/archive").unwrap();
        assert!(archive.get("missing.txt").await.is_err());

        let archive = from_url("https://data.example.org/archive").unwrap();
        match archive.get("p1/data.csv").await.unwrap() {
            ArchiveContent::Redirect(url) => {
                assert_eq!(url, "https://data.example.org/archive/p1/data.csv");
            }
            other => panic!("expected redirect, got {other:?}"),
        }

        assert!(from_url("ftp://host/path").is_err());
    }
}
