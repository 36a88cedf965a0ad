//! Object storage for source images, plus direct-URL download.

pub mod fetch;
pub mod filesystem;
pub mod memory;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

pub use fetch::{FetchedObject, HttpSourceFetcher, SourceFetcher};
pub use filesystem::FilesystemObjectStore;
pub use memory::MemoryObjectStore;

/// Location of an object: a container (bucket) and a key within it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    pub container: String,
    pub key: String,
}

impl ObjectRef {
    pub fn new(container: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.container, self.key)
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn exists(&self, object: &ObjectRef) -> Result<bool, StorageError>;

    async fn get(&self, object: &ObjectRef) -> Result<Vec<u8>, StorageError>;

    async fn put(
        &self,
        object: &ObjectRef,
        content: &[u8],
        content_type: Option<&str>,
    ) -> Result<(), StorageError>;
}

/// Guesses a MIME type from the object key's extension.
pub fn guess_mime_type(key: &str) -> Option<String> {
    mime_guess::from_path(key).first().map(|m| m.to_string())
}
