use std::path::{Path, PathBuf};

use async_trait::async_trait;
use docgraph_core::{build_subdir_path, CoreResult, NameStrategy, ObjectStorage, SaveOptions, SavedObject, StorageHealth};

use crate::error::StorageError;

/// Local filesystem `ObjectStorage` (§6), the reference backend the
/// teacher's own `LocalStorage` plays for its narrower `StorageBackend`
/// trait. Paths are always relative to `root` and never allowed to climb
/// out of it.
pub struct LocalObjectStorage {
    root: PathBuf,
}

impl LocalObjectStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, StorageError> {
        if path.split('/').any(|segment| segment == "..") {
            return Err(StorageError::PathTraversal(path.to_string()));
        }
        Ok(self.root.join(path))
    }
}

fn stem_and_ext(file_name: &str) -> (&str, &str) {
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, ext),
        _ => (file_name, "bin"),
    }
}

fn guess_mime_type(ext: &str) -> String {
    match ext.to_ascii_lowercase().as_str() {
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "json" => "application/json",
        "md" => "text/markdown",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
    .to_string()
}

#[async_trait]
impl ObjectStorage for LocalObjectStorage {
    async fn save(&self, bytes: &[u8], file_name: &str, opts: &SaveOptions) -> CoreResult<SavedObject> {
        let (stem, ext) = stem_and_ext(file_name);
        let now = chrono::Utc::now();
        let epoch_millis = now.timestamp_millis();

        let name = match opts.name_strategy {
            NameStrategy::Timestamp => format!("{stem}_{epoch_millis}"),
            NameStrategy::Uuid => format!("{stem}_{}", uuid::Uuid::new_v4()),
            NameStrategy::Original => stem.to_string(),
        };

        let relative_path = if opts.create_subdirs {
            build_subdir_path(now, &name, epoch_millis, ext)
        } else {
            format!("{name}.{ext}")
        };

        let full = self.resolve(&relative_path)?;
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, bytes).await?;

        Ok(SavedObject {
            id: uuid::Uuid::new_v4().to_string(),
            path: relative_path,
            file_name: format!("{name}.{ext}"),
            size: bytes.len() as u64,
            mime_type: guess_mime_type(ext),
        })
    }

    async fn get(&self, path: &str) -> CoreResult<Vec<u8>> {
        let full = self.resolve(path)?;
        Ok(tokio::fs::read(&full).await?)
    }

    async fn delete(&self, path: &str) -> CoreResult<()> {
        let full = self.resolve(path)?;
        match tokio::fs::remove_file(&full).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, path: &str) -> CoreResult<bool> {
        let full = self.resolve(path)?;
        Ok(tokio::fs::try_exists(&full).await.unwrap_or(false))
    }

    async fn health(&self) -> CoreResult<StorageHealth> {
        match tokio::fs::try_exists(&self.root).await {
            Ok(true) => Ok(StorageHealth { healthy: true, message: None }),
            Ok(false) => Ok(StorageHealth {
                healthy: false,
                message: Some(format!("root directory {} does not exist", self.root.display())),
            }),
            Err(e) => Ok(StorageHealth { healthy: false, message: Some(e.to_string()) }),
        }
    }
}

/// Pre-creates the root directory before first use (the CLI does this on
/// startup).
pub async fn ensure_root(root: &Path) -> std::io::Result<()> {
    tokio::fs::create_dir_all(root).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_then_get_round_trips_bytes() {
        let dir = std::env::temp_dir().join(format!("docgraph-storage-test-{}", uuid::Uuid::new_v4()));
        let storage = LocalObjectStorage::new(&dir);
        let saved = storage.save(b"hello", "report.pdf", &SaveOptions::default()).await.unwrap();
        assert_eq!(saved.mime_type, "application/pdf");
        let bytes = storage.get(&saved.path).await.unwrap();
        assert_eq!(bytes, b"hello");
        tokio::fs::remove_dir_all(&dir).await.ok();
    }

    #[tokio::test]
    async fn rejects_path_traversal() {
        let dir = std::env::temp_dir().join(format!("docgraph-storage-test-{}", uuid::Uuid::new_v4()));
        let storage = LocalObjectStorage::new(&dir);
        let err = storage.get("../secret").await;
        assert!(err.is_err());
    }
}
