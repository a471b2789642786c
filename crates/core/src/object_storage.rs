//! `ObjectStorage` — the external collaborator that owns multipart-upload
//! bytes on disk (§6). Out of scope for this crate: the concrete backend.
//! `docgraph-storage` ships a local-filesystem implementation, the same
//! role its `LocalStorage`/`NfsStorage`/`S3Storage` backends play for the
//! teacher's narrower `StorageBackend` trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CoreResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NameStrategy {
    Timestamp,
    Uuid,
    Original,
}

impl Default for NameStrategy {
    fn default() -> Self {
        Self::Timestamp
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SaveOptions {
    #[serde(default)]
    pub create_subdirs: bool,
    #[serde(default)]
    pub name_strategy: NameStrategy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedObject {
    pub id: String,
    pub path: String,
    pub file_name: String,
    pub size: u64,
    pub mime_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageHealth {
    pub healthy: bool,
    pub message: Option<String>,
}

/// External collaborator contract (§6). Path scheme when `create_subdirs`
/// is set: `YYYY/MM/DD/{name}_{epochMillis}.{ext}`.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn save(&self, bytes: &[u8], file_name: &str, opts: &SaveOptions) -> CoreResult<SavedObject>;
    async fn get(&self, path: &str) -> CoreResult<Vec<u8>>;
    async fn delete(&self, path: &str) -> CoreResult<()>;
    async fn exists(&self, path: &str) -> CoreResult<bool>;
    async fn health(&self) -> CoreResult<StorageHealth>;
}

/// Builds the `YYYY/MM/DD/{name}_{epochMillis}.{ext}` path scheme (§6),
/// shared by every `ObjectStorage` implementation so the layout stays
/// consistent across backends.
pub fn build_subdir_path(
    now: chrono::DateTime<chrono::Utc>,
    stem: &str,
    epoch_millis: i64,
    ext: &str,
) -> String {
    format!(
        "{}/{}/{}/{}_{}.{}",
        now.format("%Y"),
        now.format("%m"),
        now.format("%d"),
        stem,
        epoch_millis,
        ext,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn subdir_path_follows_date_scheme() {
        let now = chrono::Utc.with_ymd_and_hms(2026, 7, 28, 0, 0, 0).unwrap();
        let path = build_subdir_path(now, "report", 1_700_000_000_000, "pdf");
        assert_eq!(path, "2026/07/28/report_1700000000000.pdf");
    }
}
