use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

use super::{ObjectRef, ObjectStore};
use crate::error::StorageError;

/// Object store laid out on disk as `<root>/<container>/<key>`.
pub struct FilesystemObjectStore {
    root: PathBuf,
}

impl FilesystemObjectStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps an object reference to a path below the root, rejecting anything
    /// that could escape it.
    fn resolve(&self, object: &ObjectRef) -> Result<PathBuf, StorageError> {
        validate_segment(&object.container, false)?;
        validate_segment(&object.key, true)?;
        Ok(self.root.join(&object.container).join(&object.key))
    }
}

fn validate_segment(value: &str, allow_nested: bool) -> Result<(), StorageError> {
    let invalid = |reason: &str| StorageError::InvalidKey {
        key: value.to_string(),
        reason: reason.to_string(),
    };

    if value.trim().is_empty() {
        return Err(invalid("empty"));
    }
    if value.contains('\\') {
        return Err(invalid("contains a backslash"));
    }
    let path = Path::new(value);
    if path.is_absolute() {
        return Err(invalid("absolute path"));
    }
    for component in path.components() {
        match component {
            Component::Normal(_) => {}
            Component::CurDir => {}
            _ => return Err(invalid("path traversal")),
        }
    }
    if !allow_nested && path.components().count() > 1 {
        return Err(invalid("container must be a single path segment"));
    }
    Ok(())
}

#[async_trait]
impl ObjectStore for FilesystemObjectStore {
    async fn exists(&self, object: &ObjectRef) -> Result<bool, StorageError> {
        let path = self.resolve(object)?;
        Ok(tokio::fs::metadata(&path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false))
    }

    async fn get(&self, object: &ObjectRef) -> Result<Vec<u8>, StorageError> {
        let path = self.resolve(object)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(object.to_string()))
            }
            Err(e) => Err(StorageError::ReadObject { path, source: e }),
        }
    }

    async fn put(
        &self,
        object: &ObjectRef,
        content: &[u8],
        _content_type: Option<&str>,
    ) -> Result<(), StorageError> {
        let path = self.resolve(object)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::CreateDirectory {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }

        // Write to a sibling temp file and rename so readers never see a partial object.
        let tmp = path.with_file_name(format!(
            ".{}.{}.tmp",
            path.file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            uuid::Uuid::new_v4()
        ));
        tokio::fs::write(&tmp, content)
            .await
            .map_err(|e| StorageError::WriteObject {
                path: tmp.clone(),
                source: e,
            })?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(StorageError::WriteObject { path, source: e });
        }

        Ok(())
    }
}
