use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use docgraph_core::{
    CoreResult, Document, DocumentFilter, DocumentGraph, DocumentListResult, DocumentStats,
    DocumentStatus, DocumentStore, ObjectStorage, SaveOptions, SavedObject, StorageHealth,
};

use crate::error::StorageError;

/// In-memory `DocumentStore`, for tests and single-process demo runs (§10.4:
/// integration scenarios use fake collaborators rather than a real database).
#[derive(Default)]
pub struct InMemoryDocumentStore {
    documents: Mutex<HashMap<String, Document>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn create(&self, document: Document) -> CoreResult<()> {
        self.documents.lock().unwrap().insert(document.id.clone(), document);
        Ok(())
    }

    async fn get(&self, id: &str, _requester_user_id: Option<&str>) -> CoreResult<Option<Document>> {
        Ok(self.documents.lock().unwrap().get(id).cloned())
    }

    async fn update(
        &self,
        id: &str,
        patch: serde_json::Map<String, serde_json::Value>,
        _requester_user_id: Option<&str>,
    ) -> CoreResult<()> {
        let mut documents = self.documents.lock().unwrap();
        let doc = documents.get_mut(id).ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        doc.metadata.extend(patch);
        doc.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn update_status(&self, id: &str, status: DocumentStatus, error_message: Option<&str>) -> CoreResult<()> {
        let mut documents = self.documents.lock().unwrap();
        let doc = documents.get_mut(id).ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        doc.transition(status, chrono::Utc::now())
            .map_err(|e| docgraph_core::CoreError::Graph(e))?;
        if let Some(msg) = error_message {
            doc.metadata.insert("errorMessage".to_string(), serde_json::Value::String(msg.to_string()));
        }
        Ok(())
    }

    async fn store_graph(&self, id: &str, graph: DocumentGraph) -> CoreResult<()> {
        let mut documents = self.documents.lock().unwrap();
        let doc = documents.get_mut(id).ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        doc.graph = Some(graph);
        doc.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn store_summary(&self, id: &str, summary: &str) -> CoreResult<()> {
        let mut documents = self.documents.lock().unwrap();
        let doc = documents.get_mut(id).ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        doc.summary = Some(summary.to_string());
        doc.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn delete(&self, id: &str, _requester_user_id: Option<&str>) -> CoreResult<bool> {
        Ok(self.documents.lock().unwrap().remove(id).is_some())
    }

    async fn list(&self, filters: &DocumentFilter) -> CoreResult<DocumentListResult> {
        let documents = self.documents.lock().unwrap();
        let mut items: Vec<Document> = documents
            .values()
            .filter(|d| filters.status.is_none_or(|s| d.status == s))
            .cloned()
            .collect();
        items.sort_by_key(|d| d.created_at);
        let total = items.len();
        let offset = filters.offset.unwrap_or(0);
        let limit = filters.limit.unwrap_or(total);
        let page: Vec<Document> = items.into_iter().skip(offset).take(limit).collect();
        let has_more = offset + page.len() < total;
        Ok(DocumentListResult { items: page, total, has_more })
    }

    async fn stats(&self, _user_id: Option<&str>) -> CoreResult<DocumentStats> {
        let documents = self.documents.lock().unwrap();
        let mut by_status = HashMap::new();
        let mut total_size = 0u64;
        for doc in documents.values() {
            *by_status.entry(format!("{:?}", doc.status).to_lowercase()).or_insert(0usize) += 1;
            total_size += doc.byte_size;
        }
        Ok(DocumentStats {
            total: documents.len(),
            by_status,
            total_size,
            recent_uploads: documents.len(),
        })
    }
}

/// In-memory `ObjectStorage`, mirroring [`InMemoryDocumentStore`]'s role for
/// bytes rather than document records.
#[derive(Default)]
pub struct InMemoryObjectStorage {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryObjectStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ObjectStorage for InMemoryObjectStorage {
    async fn save(&self, bytes: &[u8], file_name: &str, opts: &SaveOptions) -> CoreResult<SavedObject> {
        let id = uuid::Uuid::new_v4().to_string();
        let path = if opts.create_subdirs {
            format!("mem/{id}_{file_name}")
        } else {
            format!("{id}_{file_name}")
        };
        self.objects.lock().unwrap().insert(path.clone(), bytes.to_vec());
        Ok(SavedObject {
            id,
            path,
            file_name: file_name.to_string(),
            size: bytes.len() as u64,
            mime_type: "application/octet-stream".to_string(),
        })
    }

    async fn get(&self, path: &str) -> CoreResult<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(path.to_string()).into())
    }

    async fn delete(&self, path: &str) -> CoreResult<()> {
        self.objects.lock().unwrap().remove(path);
        Ok(())
    }

    async fn exists(&self, path: &str) -> CoreResult<bool> {
        Ok(self.objects.lock().unwrap().contains_key(path))
    }

    async fn health(&self) -> CoreResult<StorageHealth> {
        Ok(StorageHealth { healthy: true, message: None })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_then_get_round_trips_document() {
        let store = InMemoryDocumentStore::new();
        let doc = Document::new("d1", "f.pdf", 10, "local://f.pdf");
        store.create(doc).await.unwrap();
        let fetched = store.get("d1", None).await.unwrap();
        assert!(fetched.is_some());
    }

    #[tokio::test]
    async fn update_status_rejects_transition_out_of_terminal() {
        let store = InMemoryDocumentStore::new();
        store.create(Document::new("d1", "f.pdf", 10, "local://f.pdf")).await.unwrap();
        store.update_status("d1", DocumentStatus::Completed, None).await.unwrap();
        let err = store.update_status("d1", DocumentStatus::Failed, Some("boom")).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn list_respects_status_filter_and_pagination() {
        let store = InMemoryDocumentStore::new();
        for i in 0..3 {
            store.create(Document::new(format!("d{i}"), "f.pdf", 10, "local://f.pdf")).await.unwrap();
        }
        let filter = DocumentFilter { limit: Some(2), ..Default::default() };
        let result = store.list(&filter).await.unwrap();
        assert_eq!(result.items.len(), 2);
        assert_eq!(result.total, 3);
        assert!(result.has_more);
    }

    #[tokio::test]
    async fn in_memory_object_storage_round_trips_bytes() {
        let storage = InMemoryObjectStorage::new();
        let saved = storage.save(b"hi", "a.txt", &SaveOptions::default()).await.unwrap();
        let bytes = storage.get(&saved.path).await.unwrap();
        assert_eq!(bytes, b"hi");
    }
}
