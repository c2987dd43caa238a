//! Virtual paths and their mapping onto the sandbox root.
//!
//! Every path the model or an API client hands us is a *virtual* path under
//! `/memories`.  Parsing is purely lexical and shared by every backend; only
//! [`PathResolver::locate`] touches the filesystem, and it does so to make
//! sure symlinks cannot lead outside the root.

use std::fmt;
use std::path::{Path, PathBuf};

use mv_domain::error::{PathError, StoreError};
use serde::{Serialize, Serializer};

/// Namespace prefix every virtual path starts with.
pub const ROOT_PREFIX: &str = "/memories";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// VirtualPath
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A normalized path inside the `/memories` namespace.
///
/// Never contains `..`, `.` or empty segments.  An empty segment list is the
/// root directory itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VirtualPath {
    segments: Vec<String>,
}

impl VirtualPath {
    pub fn root() -> Self {
        Self {
            segments: Vec::new(),
        }
    }

    /// Lexically validate and normalize a client-supplied path.
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        let decoded = urlencoding::decode(raw)
            .map_err(|_| PathError::malformed(raw, "not valid UTF-8 after percent-decoding"))?;

        if decoded.contains('\0') {
            return Err(PathError::malformed(raw, "contains a NUL byte"));
        }

        let rest = if decoded == ROOT_PREFIX {
            ""
        } else if let Some(rest) = decoded.strip_prefix("/memories/") {
            rest
        } else {
            return Err(PathError::malformed(
                raw,
                "paths must start with /memories",
            ));
        };

        let mut segments = Vec::new();
        for segment in rest.split('/') {
            match segment {
                "" | "." => continue,
                ".." => return Err(PathError::OutsideRoot(raw.to_owned())),
                s => segments.push(s.to_owned()),
            }
        }

        Ok(Self { segments })
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Path relative to `/memories`, e.g. `notes/user.md`.  Empty for the root.
    pub fn relative(&self) -> String {
        self.segments.join("/")
    }

    pub fn file_name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    pub fn parent(&self) -> Option<VirtualPath> {
        if self.is_root() {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Every proper ancestor below the root, outermost first.
    pub fn ancestors(&self) -> impl Iterator<Item = VirtualPath> + '_ {
        (1..self.segments.len()).map(|n| Self {
            segments: self.segments[..n].to_vec(),
        })
    }

    /// Append a single name taken from a directory listing.
    pub(crate) fn child(&self, name: &str) -> VirtualPath {
        let mut segments = self.segments.clone();
        segments.push(name.to_owned());
        Self { segments }
    }

    /// True when `self` equals `other` or lies beneath it.
    pub fn starts_with(&self, other: &VirtualPath) -> bool {
        self.segments.starts_with(&other.segments)
    }

    /// Move `self` from under `from` to under `to`.
    pub(crate) fn rebase(&self, from: &VirtualPath, to: &VirtualPath) -> VirtualPath {
        let mut segments = to.segments.clone();
        segments.extend_from_slice(&self.segments[from.segments.len()..]);
        Self { segments }
    }

    /// Dot-prefixed entries are hidden from listings.  The local backend
    /// stages writes in hidden temp files.
    pub fn is_hidden(&self) -> bool {
        self.segments.iter().any(|s| s.starts_with('.'))
    }
}

impl fmt::Display for VirtualPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(ROOT_PREFIX)?;
        for segment in &self.segments {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

impl Serialize for VirtualPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// PathResolver
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A virtual path together with its location on disk.
#[derive(Debug, Clone)]
pub struct ResolvedPath {
    pub vpath: VirtualPath,
    pub host: PathBuf,
}

/// Maps virtual paths onto a canonical sandbox root.
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
}

impl PathResolver {
    /// Create the root directory if needed and canonicalize it.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref();
        std::fs::create_dir_all(root).map_err(|e| StoreError::io(root.display(), e))?;
        let root = root
            .canonicalize()
            .map_err(|e| StoreError::io(root.display(), e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resolve(&self, raw: &str) -> Result<ResolvedPath, PathError> {
        let vpath = VirtualPath::parse(raw)?;
        let host = self.locate(&vpath)?;
        Ok(ResolvedPath { vpath, host })
    }

    /// Join `vpath` under the root and prove the result stays inside it.
    ///
    /// The longest existing ancestor is canonicalized so a symlink planted
    /// inside the sandbox cannot redirect a write elsewhere.
    pub fn locate(&self, vpath: &VirtualPath) -> Result<PathBuf, PathError> {
        let mut candidate = self.root.clone();
        for segment in vpath.segments() {
            candidate.push(segment);
        }

        let mut existing = candidate.as_path();
        let mut tail = Vec::new();
        while !existing.exists() {
            match (existing.parent(), existing.file_name()) {
                (Some(parent), Some(name)) => {
                    tail.push(name);
                    existing = parent;
                }
                _ => break,
            }
        }

        let mut resolved = existing
            .canonicalize()
            .map_err(|_| PathError::malformed(vpath.to_string(), "cannot be resolved"))?;
        for part in tail.into_iter().rev() {
            resolved.push(part);
        }

        if !resolved.starts_with(&self.root) {
            return Err(PathError::OutsideRoot(vpath.to_string()));
        }
        Ok(resolved)
    }
}
