use docgraph_core::CoreError;

/// Storage-crate-local error taxonomy (§10.2). Mapped into [`CoreError`]
/// at every trait boundary since `ObjectStorage`/`DocumentStore` are
/// defined by `docgraph-core` in terms of `CoreResult`.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("path escapes storage root: {0}")]
    PathTraversal(String),

    #[error("document not found: {0}")]
    NotFound(String),
}

impl From<StorageError> for CoreError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::PathTraversal(p) => CoreError::Config(format!("rejected path '{p}'")),
            StorageError::NotFound(id) => CoreError::Graph(format!("document not found: {id}")),
        }
    }
}
