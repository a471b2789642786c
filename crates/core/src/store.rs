//! `DocumentStore` — the narrow persistence interface the engine calls
//! (§6). Out of scope: the concrete PostgreSQL-backed implementation and
//! access control, both owned by the surrounding API layer. This crate
//! defines the contract; `docgraph-storage` ships reference
//! implementations the same way it ships `local`/`nfs`/`s3` backends for
//! its narrower `ObjectStorage`-adjacent concerns.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::document::{Document, DocumentStatus};
use crate::error::CoreResult;
use crate::graph::DocumentGraph;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentFilter {
    pub status: Option<DocumentStatus>,
    pub owner_user_id: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentListResult {
    pub items: Vec<Document>,
    pub total: usize,
    pub has_more: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentStats {
    pub total: usize,
    pub by_status: std::collections::HashMap<String, usize>,
    pub total_size: u64,
    pub recent_uploads: usize,
}

/// External collaborator contract (§6). Access control (the
/// `requester_user_id` checks) is delegated entirely to the implementation;
/// this crate never inspects it.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn create(&self, document: Document) -> CoreResult<()>;
    async fn get(&self, id: &str, requester_user_id: Option<&str>) -> CoreResult<Option<Document>>;
    async fn update(
        &self,
        id: &str,
        patch: serde_json::Map<String, serde_json::Value>,
        requester_user_id: Option<&str>,
    ) -> CoreResult<()>;
    async fn update_status(&self, id: &str, status: DocumentStatus, error_message: Option<&str>) -> CoreResult<()>;
    async fn store_graph(&self, id: &str, graph: DocumentGraph) -> CoreResult<()>;
    async fn store_summary(&self, id: &str, summary: &str) -> CoreResult<()>;
    async fn delete(&self, id: &str, requester_user_id: Option<&str>) -> CoreResult<bool>;
    async fn list(&self, filters: &DocumentFilter) -> CoreResult<DocumentListResult>;
    async fn stats(&self, user_id: Option<&str>) -> CoreResult<DocumentStats>;
}
