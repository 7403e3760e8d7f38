use async_trait::async_trait;

use super::{Archive, ArchiveContent, ArchiveError, ArchiveResult};

/// Read-only archive with its own web interface for data access; downloads
/// redirect to the corresponding page.
pub struct WebsiteArchive {
    url: String,
}

impl WebsiteArchive {
    pub fn new(url: impl Into<String>) -> Self {
        let url: String = url.into();
        Self {
            url: url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Archive for WebsiteArchive {
    async fn get(&self, path: &str) -> ArchiveResult<ArchiveContent> {
        Ok(ArchiveContent::Redirect(format!(
            "{}/{}",
            self.url,
            path.trim_start_matches('/')
        )))
    }

    async fn put(&self, _path: &str, _bytes: &[u8]) -> ArchiveResult<()> {
        Err(ArchiveError::new("the website archive is read-only"))
    }

    async fn put_zip(&self, _path: &str, _bytes: &[u8]) -> ArchiveResult<()> {
        Err(ArchiveError::new("the website archive is read-only"))
    }
}
