use std::{
    io::{Cursor, Read},
    path::{Component, Path, PathBuf},
};

use async_trait::async_trait;
use zip::ZipArchive;

use super::{Archive, ArchiveContent, ArchiveError, ArchiveResult};

/// Archive rooted in a local directory (typically a mounted share).
pub struct FilesystemArchive {
    root: PathBuf,
}

impl FilesystemArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a relative archive path under the root, rejecting absolute
    /// paths and parent-directory traversal.
    fn resolve(&self, path: &str) -> ArchiveResult<PathBuf> {
        let relative = Path::new(path);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(ArchiveError::new(format!("illegal archive path: {path}")));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl Archive for FilesystemArchive {
    async fn get(&self, path: &str) -> ArchiveResult<ArchiveContent> {
        let full_path = self.resolve(path)?;
        let bytes = tokio::fs::read(&full_path)
            .await
            .map_err(|err| ArchiveError::new(format!("error reading file: {err}")))?;
        let filename = full_path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("download")
            .to_string();
        Ok(ArchiveContent::File { bytes, filename })
    }

    async fn put(&self, path: &str, bytes: &[u8]) -> ArchiveResult<()> {
        let full_path = self.resolve(path)?;
        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| ArchiveError::new(format!("error creating directory: {err}")))?;
        }
        tokio::fs::write(&full_path, bytes)
            .await
            .map_err(|err| ArchiveError::new(format!("error saving file: {err}")))
    }

    async fn put_zip(&self, path: &str, bytes: &[u8]) -> ArchiveResult<()> {
        let dest_dir = self.resolve(path)?;
        std::fs::create_dir_all(&dest_dir)
            .map_err(|err| ArchiveError::new(format!("error creating directory: {err}")))?;

        let mut zip = ZipArchive::new(Cursor::new(bytes))
            .map_err(|err| ArchiveError::new(format!("error opening zip: {err}")))?;

        for index in 0..zip.len() {
            let mut entry = zip
                .by_index(index)
                .map_err(|err| ArchiveError::new(format!("error reading zip entry: {err}")))?;

            // enclosed_name rejects absolute and parent-escaping entry names
            let Some(entry_path) = entry.enclosed_name() else {
                return Err(ArchiveError::new(format!(
                    "illegal zip entry name: {}",
                    entry.name()
                )));
            };
            let target = dest_dir.join(entry_path);

            if entry.is_dir() {
                std::fs::create_dir_all(&target)
                    .map_err(|err| ArchiveError::new(format!("error creating directory: {err}")))?;
                continue;
            }

            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|err| ArchiveError::new(format!("error creating directory: {err}")))?;
            }
            let mut contents = Vec::with_capacity(entry.size() as usize);
            entry
                .read_to_end(&mut contents)
                .map_err(|err| ArchiveError::new(format!("error unpacking zip entry: {err}")))?;
            std::fs::write(&target, contents)
                .map_err(|err| ArchiveError::new(format!("error saving file: {err}")))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn make_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut cursor);
            for (name, contents) in entries {
                writer
                    .start_file(*name, SimpleFileOptions::default())
                    .unwrap();
                writer.write_all(contents).unwrap();
            }
            writer.finish().unwrap();
        }
        cursor.into_inner()
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let archive = FilesystemArchive::new(dir.path());

        archive.put("prov-1/p1/data.csv", b"a,b\n").await.unwrap();
        match archive.get("prov-1/p1/data.csv").await.unwrap() {
            ArchiveContent::File { bytes, filename } => {
                assert_eq!(bytes, b"a,b\n");
                assert_eq!(filename, "data.csv");
            }
            other => panic!("expected file content, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn traversal_paths_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let archive = FilesystemArchive::new(dir.path());

        assert!(archive.put("../escape.txt", b"x").await.is_err());
        assert!(archive.get("/etc/passwd").await.is_err());
    }

    #[tokio::test]
    async fn zip_contents_unpack_under_the_target_directory() {
        let dir = tempfile::tempdir().unwrap();
        let archive = FilesystemArchive::new(dir.path());

        let bundle = make_zip(&[
            ("readme.txt", b"hello".as_slice()),
            ("sub/data.csv", b"1,2\n".as_slice()),
        ]);
        archive.put_zip("prov-1/p1", &bundle).await.unwrap();

        let readme = std::fs::read(dir.path().join("prov-1/p1/readme.txt")).unwrap();
        assert_eq!(readme, b"hello");
        let data = std::fs::read(dir.path().join("prov-1/p1/sub/data.csv")).unwrap();
        assert_eq!(data, b"1,2\n");
    }
}
