pub mod error;
pub mod local;
pub mod memory;

pub use error::StorageError;
pub use local::{ensure_root, LocalObjectStorage};
pub use memory::{InMemoryDocumentStore, InMemoryObjectStorage};
