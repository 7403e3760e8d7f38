use async_trait::async_trait;

use super::{Archive, ArchiveContent, ArchiveError, ArchiveResult};

/// Nextcloud-hosted archive. The WebDAV integration is not implemented yet;
/// every operation reports as unsupported so misconfiguration is visible
/// rather than silent.
pub struct NextcloudArchive {
    #[allow(dead_code)]
    url: String,
}

impl NextcloudArchive {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    fn unsupported(operation: &str) -> ArchiveError {
        ArchiveError::new(format!("{operation} is not supported by the Nextcloud archive"))
    }
}

#[async_trait]
impl Archive for NextcloudArchive {
    async fn get(&self, _path: &str) -> ArchiveResult<ArchiveContent> {
        Err(Self::unsupported("download"))
    }

    async fn put(&self, _path: &str, _bytes: &[u8]) -> ArchiveResult<()> {
        Err(Self::unsupported("upload"))
    }

    async fn put_zip(&self, _path: &str, _bytes: &[u8]) -> ArchiveResult<()> {
        Err(Self::unsupported("zip upload"))
    }
}
