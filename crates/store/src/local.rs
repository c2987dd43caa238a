//! Filesystem backend: plain text files under the sandbox root.
//!
//! Writes go to a hidden temp sibling first (`.name.<uuid>.tmp`), are synced,
//! then renamed into place, so readers never observe a torn file.  Mutations
//! run on a spawned task while holding the per-path lock; if the caller's
//! future is dropped the edit still completes and the lock is released.

use std::future::Future;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mv_domain::error::StoreError;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::backend::{forbid_root, FileMeta, MemoryBackend};
use crate::edit::{self, DirEntry, ViewOutput, ViewRange};
use crate::locks::PathLocks;
use crate::path::{PathResolver, ResolvedPath, VirtualPath};

pub struct LocalBackend {
    inner: Arc<Inner>,
}

struct Inner {
    resolver: PathResolver,
    locks: PathLocks,
}

impl LocalBackend {
    pub fn new(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        Ok(Self {
            inner: Arc::new(Inner {
                resolver: PathResolver::new(root)?,
                locks: PathLocks::new(),
            }),
        })
    }

    pub fn root(&self) -> &Path {
        self.inner.resolver.root()
    }

    fn resolve(&self, raw: &str) -> Result<ResolvedPath, StoreError> {
        Ok(self.inner.resolver.resolve(raw)?)
    }

    /// Run a locked mutation to completion on its own task.
    async fn detached<T, Fut>(&self, label: &VirtualPath, fut: Fut) -> Result<T, StoreError>
    where
        T: Send + 'static,
        Fut: Future<Output = Result<T, StoreError>> + Send + 'static,
    {
        tokio::spawn(fut)
            .await
            .map_err(|e| StoreError::io(label, std::io::Error::other(e.to_string())))?
    }
}

// ── filesystem helpers ──────────────────────────────────────────────

async fn metadata_opt(r: &ResolvedPath) -> Result<Option<std::fs::Metadata>, StoreError> {
    match fs::metadata(&r.host).await {
        Ok(m) => Ok(Some(m)),
        Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory) => Ok(None),
        Err(e) => Err(StoreError::io(&r.vpath, e)),
    }
}

async fn read_text(r: &ResolvedPath) -> Result<String, StoreError> {
    match metadata_opt(r).await? {
        None => Err(StoreError::NotFound(r.vpath.to_string())),
        Some(m) if m.is_dir() => Err(StoreError::conflict(r.vpath.to_string(), "is a directory")),
        Some(_) => fs::read_to_string(&r.host)
            .await
            .map_err(|e| StoreError::io(&r.vpath, e)),
    }
}

/// Write via a uniquely named temp sibling, sync, then rename into place.
async fn atomic_write(r: &ResolvedPath, content: &str) -> Result<(), StoreError> {
    let io = |e: std::io::Error| StoreError::io(&r.vpath, e);

    let tmp_name = format!(
        ".{}.{}.tmp",
        r.host.file_name().unwrap_or_default().to_string_lossy(),
        uuid::Uuid::new_v4().as_simple()
    );
    let tmp_path = r.host.with_file_name(tmp_name);

    let mut file = fs::File::create(&tmp_path).await.map_err(io)?;
    let written = async {
        file.write_all(content.as_bytes()).await?;
        file.flush().await?;
        file.sync_data().await
    }
    .await;
    drop(file);

    if let Err(e) = written {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(io(e));
    }
    if let Err(e) = fs::rename(&tmp_path, &r.host).await {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(io(e));
    }
    Ok(())
}

impl Inner {
    /// A file sitting where a parent directory should be.
    async fn file_ancestor(&self, vpath: &VirtualPath) -> Result<Option<VirtualPath>, StoreError> {
        for ancestor in vpath.ancestors() {
            let host = self.resolver.locate(&ancestor)?;
            if let Ok(m) = fs::metadata(&host).await {
                if !m.is_dir() {
                    return Ok(Some(ancestor));
                }
            }
        }
        Ok(None)
    }

    async fn prepare_parent(&self, r: &ResolvedPath) -> Result<(), StoreError> {
        if let Some(blocker) = self.file_ancestor(&r.vpath).await? {
            return Err(StoreError::conflict(
                r.vpath.to_string(),
                format!("{blocker} is a file"),
            ));
        }
        if let Some(parent) = r.host.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::io(&r.vpath, e))?;
        }
        Ok(())
    }

    async fn create(self: Arc<Self>, r: ResolvedPath, text: String) -> Result<VirtualPath, StoreError> {
        let _guard = self.locks.lock(&r.vpath).await;
        if matches!(metadata_opt(&r).await?, Some(m) if m.is_dir()) {
            return Err(StoreError::conflict(r.vpath.to_string(), "is a directory"));
        }
        self.prepare_parent(&r).await?;
        atomic_write(&r, &text).await?;
        Ok(r.vpath)
    }

    async fn str_replace(
        self: Arc<Self>,
        r: ResolvedPath,
        old: String,
        new: String,
    ) -> Result<VirtualPath, StoreError> {
        let _guard = self.locks.lock(&r.vpath).await;
        let content = read_text(&r).await?;
        let updated = edit::replace_unique(&r.vpath, &content, &old, &new)?;
        atomic_write(&r, &updated).await?;
        Ok(r.vpath)
    }

    async fn insert(
        self: Arc<Self>,
        r: ResolvedPath,
        line: i64,
        text: String,
    ) -> Result<VirtualPath, StoreError> {
        let _guard = self.locks.lock(&r.vpath).await;
        let content = read_text(&r).await?;
        let updated = edit::insert_at(&r.vpath, &content, line, &text)?;
        atomic_write(&r, &updated).await?;
        Ok(r.vpath)
    }

    async fn delete(self: Arc<Self>, r: ResolvedPath) -> Result<VirtualPath, StoreError> {
        let _guard = self.locks.lock(&r.vpath).await;
        let removed = match metadata_opt(&r).await? {
            None => return Err(StoreError::NotFound(r.vpath.to_string())),
            Some(m) if m.is_dir() => fs::remove_dir_all(&r.host).await,
            Some(_) => fs::remove_file(&r.host).await,
        };
        removed.map_err(|e| StoreError::io(&r.vpath, e))?;
        Ok(r.vpath)
    }

    async fn rename(
        self: Arc<Self>,
        old: ResolvedPath,
        new: ResolvedPath,
    ) -> Result<(VirtualPath, VirtualPath), StoreError> {
        let _guards = self.locks.lock_pair(&old.vpath, &new.vpath).await;
        if metadata_opt(&old).await?.is_none() {
            return Err(StoreError::NotFound(old.vpath.to_string()));
        }
        if fs::symlink_metadata(&new.host).await.is_ok() {
            return Err(StoreError::conflict(
                new.vpath.to_string(),
                "destination already exists",
            ));
        }
        self.prepare_parent(&new).await?;
        fs::rename(&old.host, &new.host)
            .await
            .map_err(|e| StoreError::io(&old.vpath, e))?;
        Ok((old.vpath, new.vpath))
    }

    /// Depth-first walk of visible entries.
    async fn walk(&self) -> Result<(Vec<FileMeta>, Vec<VirtualPath>), StoreError> {
        let mut files = Vec::new();
        let mut dirs = Vec::new();
        let mut stack = vec![(VirtualPath::root(), self.resolver.root().to_path_buf())];

        while let Some((vdir, hdir)) = stack.pop() {
            let mut rd = match fs::read_dir(&hdir).await {
                Ok(rd) => rd,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(StoreError::io(&vdir, e)),
            };
            while let Some(entry) = rd.next_entry().await.map_err(|e| StoreError::io(&vdir, e))? {
                let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                    continue;
                };
                if name.starts_with('.') {
                    continue;
                }
                // Vanished between listing and stat.
                let Ok(meta) = entry.metadata().await else {
                    continue;
                };
                let vpath = vdir.child(&name);
                if meta.is_dir() {
                    dirs.push(vpath.clone());
                    stack.push((vpath, entry.path()));
                } else if meta.is_file() {
                    files.push(FileMeta {
                        path: vpath,
                        size: meta.len(),
                        modified_at: meta
                            .modified()
                            .map(DateTime::<Utc>::from)
                            .unwrap_or_else(|_| Utc::now()),
                    });
                }
            }
        }

        files.sort_by(|a, b| a.path.cmp(&b.path));
        dirs.sort();
        Ok((files, dirs))
    }
}

#[async_trait]
impl MemoryBackend for LocalBackend {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn view(&self, path: &str, range: Option<ViewRange>) -> Result<ViewOutput, StoreError> {
        let r = self.resolve(path)?;
        tracing::debug!(path = %r.vpath, "memory view");

        let meta = metadata_opt(&r)
            .await?
            .ok_or_else(|| StoreError::NotFound(r.vpath.to_string()))?;

        if !meta.is_dir() {
            let content = read_text(&r).await?;
            return edit::view_file(&r.vpath, content, range);
        }

        let mut rd = fs::read_dir(&r.host)
            .await
            .map_err(|e| StoreError::io(&r.vpath, e))?;
        let mut entries = Vec::new();
        while let Some(entry) = rd.next_entry().await.map_err(|e| StoreError::io(&r.vpath, e))? {
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            entries.push(DirEntry { name, is_dir });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(ViewOutput::Directory {
            path: r.vpath,
            entries,
        })
    }

    async fn create(&self, path: &str, file_text: &str) -> Result<VirtualPath, StoreError> {
        let r = self.resolve(path)?;
        forbid_root(&r.vpath, "overwrite")?;
        tracing::debug!(path = %r.vpath, bytes = file_text.len(), "memory create");
        let label = r.vpath.clone();
        let inner = self.inner.clone();
        self.detached(&label, inner.create(r, file_text.to_owned()))
            .await
    }

    async fn str_replace(
        &self,
        path: &str,
        old_str: &str,
        new_str: &str,
    ) -> Result<VirtualPath, StoreError> {
        let r = self.resolve(path)?;
        tracing::debug!(path = %r.vpath, "memory str_replace");
        let label = r.vpath.clone();
        let inner = self.inner.clone();
        self.detached(
            &label,
            inner.str_replace(r, old_str.to_owned(), new_str.to_owned()),
        )
        .await
    }

    async fn insert(
        &self,
        path: &str,
        insert_line: i64,
        insert_text: &str,
    ) -> Result<VirtualPath, StoreError> {
        let r = self.resolve(path)?;
        tracing::debug!(path = %r.vpath, insert_line, "memory insert");
        let label = r.vpath.clone();
        let inner = self.inner.clone();
        self.detached(&label, inner.insert(r, insert_line, insert_text.to_owned()))
            .await
    }

    async fn delete(&self, path: &str) -> Result<VirtualPath, StoreError> {
        let r = self.resolve(path)?;
        forbid_root(&r.vpath, "delete")?;
        tracing::debug!(path = %r.vpath, "memory delete");
        let label = r.vpath.clone();
        let inner = self.inner.clone();
        self.detached(&label, inner.delete(r)).await
    }

    async fn rename(
        &self,
        old_path: &str,
        new_path: &str,
    ) -> Result<(VirtualPath, VirtualPath), StoreError> {
        let old = self.resolve(old_path)?;
        let new = self.resolve(new_path)?;
        forbid_root(&old.vpath, "move")?;
        forbid_root(&new.vpath, "replace")?;
        if new.vpath != old.vpath && new.vpath.starts_with(&old.vpath) {
            return Err(StoreError::conflict(
                new.vpath.to_string(),
                "cannot move a directory into itself",
            ));
        }
        tracing::debug!(from = %old.vpath, to = %new.vpath, "memory rename");
        let label = old.vpath.clone();
        let inner = self.inner.clone();
        self.detached(&label, inner.rename(old, new)).await
    }

    async fn files(&self) -> Result<Vec<FileMeta>, StoreError> {
        Ok(self.inner.walk().await?.0)
    }

    async fn directories(&self) -> Result<Vec<VirtualPath>, StoreError> {
        Ok(self.inner.walk().await?.1)
    }

    async fn read(&self, path: &str) -> Result<String, StoreError> {
        let r = self.resolve(path)?;
        read_text(&r).await
    }

    async fn exists(&self, path: &str) -> Result<bool, StoreError> {
        let r = self.resolve(path)?;
        Ok(metadata_opt(&r).await?.is_some())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let root = VirtualPath::root();
        let mut rd = fs::read_dir(self.root())
            .await
            .map_err(|e| StoreError::io(&root, e))?;
        while let Some(entry) = rd.next_entry().await.map_err(|e| StoreError::io(&root, e))? {
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            let removed = if is_dir {
                fs::remove_dir_all(entry.path()).await
            } else {
                fs::remove_file(entry.path()).await
            };
            match removed {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(StoreError::io(&root, e)),
            }
        }
        tracing::info!(root = %self.root().display(), "memory store cleared");
        Ok(())
    }
}
