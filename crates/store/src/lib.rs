//! Sandboxed memory store: virtual paths, the file-editing primitives, and
//! whole-store operations (search, organize, backup).

pub mod backend;
pub mod edit;
pub mod in_memory;
pub mod index;
pub mod local;
mod locks;
pub mod path;

use std::sync::Arc;

use mv_domain::config::{BackendKind, MemoryConfig};
use mv_domain::error::StoreError;

pub use backend::{FileMeta, MemoryBackend};
pub use edit::{DirEntry, ViewOutput, ViewRange};
pub use in_memory::InMemoryBackend;
pub use index::{MemoryArchive, MemoryIndex, OrganizeRule};
pub use local::LocalBackend;
pub use path::{PathResolver, VirtualPath, ROOT_PREFIX};

/// Build the backend selected by `memory.backend`.
pub fn open_backend(config: &MemoryConfig) -> Result<Arc<dyn MemoryBackend>, StoreError> {
    let backend: Arc<dyn MemoryBackend> = match config.backend {
        BackendKind::Local => Arc::new(LocalBackend::new(&config.root)?),
        BackendKind::InMemory => Arc::new(InMemoryBackend::new()),
    };
    tracing::info!(
        backend = backend.name(),
        root = %config.root.display(),
        "memory store opened"
    );
    Ok(backend)
}
