//! Map-backed store for tests and ephemeral deployments.
//!
//! One `RwLock` guards the whole tree; it is only held for the synchronous
//! edit, never across an `.await`.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mv_domain::error::StoreError;
use parking_lot::RwLock;

use crate::backend::{forbid_root, FileMeta, MemoryBackend};
use crate::edit::{self, DirEntry, ViewOutput, ViewRange};
use crate::path::VirtualPath;

struct MemFile {
    content: String,
    modified_at: DateTime<Utc>,
}

#[derive(Default)]
struct Tree {
    files: BTreeMap<VirtualPath, MemFile>,
    /// Explicit directories below the root.
    dirs: BTreeSet<VirtualPath>,
}

impl Tree {
    fn is_dir(&self, p: &VirtualPath) -> bool {
        p.is_root() || self.dirs.contains(p)
    }

    fn exists(&self, p: &VirtualPath) -> bool {
        self.is_dir(p) || self.files.contains_key(p)
    }

    /// Make sure every ancestor is (or can become) a directory.
    fn ensure_parents(&mut self, p: &VirtualPath) -> Result<(), StoreError> {
        if let Some(blocker) = p.ancestors().find(|a| self.files.contains_key(a)) {
            return Err(StoreError::conflict(p.to_string(), format!("{blocker} is a file")));
        }
        self.dirs.extend(p.ancestors());
        Ok(())
    }

    fn file_mut(&mut self, p: &VirtualPath) -> Result<&mut MemFile, StoreError> {
        if self.dirs.contains(p) {
            return Err(StoreError::conflict(p.to_string(), "is a directory"));
        }
        self.files
            .get_mut(p)
            .ok_or_else(|| StoreError::NotFound(p.to_string()))
    }
}

#[derive(Default)]
pub struct InMemoryBackend {
    tree: RwLock<Tree>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn edit_file<F>(&self, path: &str, f: F) -> Result<VirtualPath, StoreError>
    where
        F: FnOnce(&VirtualPath, &str) -> Result<String, StoreError>,
    {
        let vpath = VirtualPath::parse(path)?;
        let mut tree = self.tree.write();
        let file = tree.file_mut(&vpath)?;
        file.content = f(&vpath, &file.content)?;
        file.modified_at = Utc::now();
        Ok(vpath)
    }
}

#[async_trait]
impl MemoryBackend for InMemoryBackend {
    fn name(&self) -> &'static str {
        "in_memory"
    }

    async fn view(&self, path: &str, range: Option<ViewRange>) -> Result<ViewOutput, StoreError> {
        let vpath = VirtualPath::parse(path)?;
        let tree = self.tree.read();

        if let Some(file) = tree.files.get(&vpath) {
            return edit::view_file(&vpath, file.content.clone(), range);
        }
        if !tree.is_dir(&vpath) {
            return Err(StoreError::NotFound(vpath.to_string()));
        }

        let is_child = |p: &VirtualPath| p.parent().as_ref() == Some(&vpath) && !p.is_hidden();
        let mut entries: Vec<DirEntry> = tree
            .dirs
            .iter()
            .filter(|p| is_child(p))
            .map(|p| (p, true))
            .chain(tree.files.keys().filter(|p| is_child(p)).map(|p| (p, false)))
            .filter_map(|(p, is_dir)| {
                p.file_name().map(|name| DirEntry {
                    name: name.to_owned(),
                    is_dir,
                })
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(ViewOutput::Directory {
            path: vpath,
            entries,
        })
    }

    async fn create(&self, path: &str, file_text: &str) -> Result<VirtualPath, StoreError> {
        let vpath = VirtualPath::parse(path)?;
        forbid_root(&vpath, "overwrite")?;
        let mut tree = self.tree.write();
        if tree.dirs.contains(&vpath) {
            return Err(StoreError::conflict(vpath.to_string(), "is a directory"));
        }
        tree.ensure_parents(&vpath)?;
        tree.files.insert(
            vpath.clone(),
            MemFile {
                content: file_text.to_owned(),
                modified_at: Utc::now(),
            },
        );
        Ok(vpath)
    }

    async fn str_replace(
        &self,
        path: &str,
        old_str: &str,
        new_str: &str,
    ) -> Result<VirtualPath, StoreError> {
        self.edit_file(path, |p, content| {
            edit::replace_unique(p, content, old_str, new_str)
        })
    }

    async fn insert(
        &self,
        path: &str,
        insert_line: i64,
        insert_text: &str,
    ) -> Result<VirtualPath, StoreError> {
        self.edit_file(path, |p, content| {
            edit::insert_at(p, content, insert_line, insert_text)
        })
    }

    async fn delete(&self, path: &str) -> Result<VirtualPath, StoreError> {
        let vpath = VirtualPath::parse(path)?;
        forbid_root(&vpath, "delete")?;
        let mut tree = self.tree.write();
        if tree.files.remove(&vpath).is_some() {
            return Ok(vpath);
        }
        if !tree.dirs.contains(&vpath) {
            return Err(StoreError::NotFound(vpath.to_string()));
        }
        tree.files.retain(|p, _| !p.starts_with(&vpath));
        tree.dirs.retain(|p| !p.starts_with(&vpath));
        Ok(vpath)
    }

    async fn rename(
        &self,
        old_path: &str,
        new_path: &str,
    ) -> Result<(VirtualPath, VirtualPath), StoreError> {
        let old = VirtualPath::parse(old_path)?;
        let new = VirtualPath::parse(new_path)?;
        forbid_root(&old, "move")?;
        forbid_root(&new, "replace")?;
        if new != old && new.starts_with(&old) {
            return Err(StoreError::conflict(
                new.to_string(),
                "cannot move a directory into itself",
            ));
        }

        let mut tree = self.tree.write();
        if !tree.exists(&old) {
            return Err(StoreError::NotFound(old.to_string()));
        }
        if tree.exists(&new) {
            return Err(StoreError::conflict(new.to_string(), "destination already exists"));
        }
        tree.ensure_parents(&new)?;

        if let Some(file) = tree.files.remove(&old) {
            tree.files.insert(new.clone(), file);
            return Ok((old, new));
        }

        let moved_files: Vec<VirtualPath> = tree
            .files
            .keys()
            .filter(|p| p.starts_with(&old))
            .cloned()
            .collect();
        for p in moved_files {
            if let Some(file) = tree.files.remove(&p) {
                tree.files.insert(p.rebase(&old, &new), file);
            }
        }
        let moved_dirs: Vec<VirtualPath> = tree
            .dirs
            .iter()
            .filter(|p| p.starts_with(&old))
            .cloned()
            .collect();
        for p in moved_dirs {
            tree.dirs.remove(&p);
            tree.dirs.insert(p.rebase(&old, &new));
        }
        Ok((old, new))
    }

    async fn files(&self) -> Result<Vec<FileMeta>, StoreError> {
        let tree = self.tree.read();
        Ok(tree
            .files
            .iter()
            .filter(|(p, _)| !p.is_hidden())
            .map(|(p, f)| FileMeta {
                path: p.clone(),
                size: f.content.len() as u64,
                modified_at: f.modified_at,
            })
            .collect())
    }

    async fn directories(&self) -> Result<Vec<VirtualPath>, StoreError> {
        let tree = self.tree.read();
        Ok(tree.dirs.iter().filter(|p| !p.is_hidden()).cloned().collect())
    }

    async fn read(&self, path: &str) -> Result<String, StoreError> {
        let vpath = VirtualPath::parse(path)?;
        let tree = self.tree.read();
        if tree.is_dir(&vpath) {
            return Err(StoreError::conflict(vpath.to_string(), "is a directory"));
        }
        tree.files
            .get(&vpath)
            .map(|f| f.content.clone())
            .ok_or_else(|| StoreError::NotFound(vpath.to_string()))
    }

    async fn exists(&self, path: &str) -> Result<bool, StoreError> {
        let vpath = VirtualPath::parse(path)?;
        Ok(self.tree.read().exists(&vpath))
    }

    async fn clear(&self) -> Result<(), StoreError> {
        *self.tree.write() = Tree::default();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn directory_view_lists_implicit_parents() {
        let b = InMemoryBackend::new();
        b.create("/memories/a/b/c.txt", "c").await.unwrap();
        b.create("/memories/top.txt", "t").await.unwrap();

        let out = b.view("/memories", None).await.unwrap();
        assert_eq!(out.render(), "Directory: /memories\n- a/\n- top.txt");
        let out = b.view("/memories/a", None).await.unwrap();
        assert_eq!(out.render(), "Directory: /memories/a\n- b/");
    }

    #[tokio::test]
    async fn rename_directory_moves_subtree() {
        let b = InMemoryBackend::new();
        b.create("/memories/a/x.txt", "x").await.unwrap();
        b.create("/memories/a/deep/y.txt", "y").await.unwrap();
        b.rename("/memories/a", "/memories/z").await.unwrap();

        assert_eq!(b.read("/memories/z/deep/y.txt").await.unwrap(), "y");
        assert!(!b.exists("/memories/a").await.unwrap());
        assert!(b.exists("/memories/z/deep").await.unwrap());
    }

    #[tokio::test]
    async fn file_in_place_of_directory_is_conflict() {
        let b = InMemoryBackend::new();
        b.create("/memories/f", "x").await.unwrap();
        assert_eq!(b.create("/memories/f/g", "y").await.unwrap_err().kind(), "conflict");
    }

    #[tokio::test]
    async fn delete_directory_drops_descendants_only() {
        let b = InMemoryBackend::new();
        b.create("/memories/a/x.txt", "x").await.unwrap();
        b.create("/memories/ab.txt", "keep").await.unwrap();
        b.delete("/memories/a").await.unwrap();
        let files = b.files().await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path.to_string(), "/memories/ab.txt");
    }
}
