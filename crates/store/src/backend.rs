use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mv_domain::error::StoreError;
use serde::Serialize;

use crate::edit::{ViewOutput, ViewRange};
use crate::path::VirtualPath;

/// Metadata for one stored file.
#[derive(Debug, Clone, Serialize)]
pub struct FileMeta {
    pub path: VirtualPath,
    pub size: u64,
    pub modified_at: DateTime<Utc>,
}

/// The six memory primitives plus the helpers the index and the outer
/// surfaces need.
///
/// Paths are raw client strings; every implementation validates them with
/// [`VirtualPath::parse`] before touching storage.  Mutators return the
/// normalized path(s) they changed.
#[async_trait]
pub trait MemoryBackend: Send + Sync {
    /// Short name for logs (`local`, `in_memory`).
    fn name(&self) -> &'static str;

    async fn view(&self, path: &str, range: Option<ViewRange>) -> Result<ViewOutput, StoreError>;

    /// Create or overwrite a file, creating parent directories.
    async fn create(&self, path: &str, file_text: &str) -> Result<VirtualPath, StoreError>;

    async fn str_replace(
        &self,
        path: &str,
        old_str: &str,
        new_str: &str,
    ) -> Result<VirtualPath, StoreError>;

    async fn insert(
        &self,
        path: &str,
        insert_line: i64,
        insert_text: &str,
    ) -> Result<VirtualPath, StoreError>;

    /// Delete a file or a whole directory subtree.
    async fn delete(&self, path: &str) -> Result<VirtualPath, StoreError>;

    /// Returns `(old, new)`.
    async fn rename(
        &self,
        old_path: &str,
        new_path: &str,
    ) -> Result<(VirtualPath, VirtualPath), StoreError>;

    /// Every visible file, sorted by path.
    async fn files(&self) -> Result<Vec<FileMeta>, StoreError>;

    /// Every visible directory below the root, sorted by path.
    async fn directories(&self) -> Result<Vec<VirtualPath>, StoreError>;

    async fn read(&self, path: &str) -> Result<String, StoreError>;

    async fn exists(&self, path: &str) -> Result<bool, StoreError>;

    /// Remove everything under the root, keeping the root itself.
    async fn clear(&self) -> Result<(), StoreError>;
}

pub(crate) fn forbid_root(vpath: &VirtualPath, action: &str) -> Result<(), StoreError> {
    if vpath.is_root() {
        return Err(StoreError::Forbidden(format!(
            "cannot {action} the /memories directory itself"
        )));
    }
    Ok(())
}
