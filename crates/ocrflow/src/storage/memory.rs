use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use super::{ObjectRef, ObjectStore};
use crate::error::StorageError;

/// In-memory object store for tests and dry runs.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<ObjectRef, StoredObject>>,
}

#[derive(Clone)]
struct StoredObject {
    content: Vec<u8>,
    content_type: Option<String>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an object without going through the async API.
    pub fn insert(&self, object: ObjectRef, content: &[u8]) {
        if let Ok(mut objects) = self.objects.write() {
            objects.insert(
                object,
                StoredObject {
                    content: content.to_vec(),
                    content_type: None,
                },
            );
        }
    }

    pub fn content_type(&self, object: &ObjectRef) -> Option<String> {
        self.objects
            .read()
            .ok()
            .and_then(|o| o.get(object).and_then(|s| s.content_type.clone()))
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn exists(&self, object: &ObjectRef) -> Result<bool, StorageError> {
        Ok(self
            .objects
            .read()
            .map(|o| o.contains_key(object))
            .unwrap_or(false))
    }

    async fn get(&self, object: &ObjectRef) -> Result<Vec<u8>, StorageError> {
        self.objects
            .read()
            .ok()
            .and_then(|o| o.get(object).map(|s| s.content.clone()))
            .ok_or_else(|| StorageError::NotFound(object.to_string()))
    }

    async fn put(
        &self,
        object: &ObjectRef,
        content: &[u8],
        content_type: Option<&str>,
    ) -> Result<(), StorageError> {
        if let Ok(mut objects) = self.objects.write() {
            objects.insert(
                object.clone(),
                StoredObject {
                    content: content.to_vec(),
                    content_type: content_type.map(str::to_string),
                },
            );
        }
        Ok(())
    }
}
