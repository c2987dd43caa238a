//! Read-mostly views over the whole store: listing, search, summary,
//! rule-based reorganization, and backup/restore archives.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use mv_domain::error::StoreError;
use mv_domain::trace::TraceEvent;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::backend::{FileMeta, MemoryBackend};
use crate::edit::split_lines;
use crate::path::{VirtualPath, ROOT_PREFIX};

pub const ARCHIVE_FORMAT: &str = "memvault-archive";
pub const ARCHIVE_VERSION: u32 = 1;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Report types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize)]
pub struct LineMatch {
    pub line: usize,
    /// 1-based character column of the match start.
    pub column: usize,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub path: VirtualPath,
    pub match_count: usize,
    pub matches: Vec<LineMatch>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchReport {
    pub hits: Vec<SearchHit>,
    pub total_matches: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct MemorySummary {
    pub file_count: usize,
    pub total_bytes: u64,
    pub directory_count: usize,
    pub last_modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizeRule {
    /// Regex, anchored at the start of the path relative to `/memories`.
    pub pattern: String,
    pub destination: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Move {
    pub from: VirtualPath,
    pub to: VirtualPath,
}

#[derive(Debug, Clone, Serialize)]
pub struct Skipped {
    pub path: VirtualPath,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct OrganizeReport {
    pub dry_run: bool,
    pub moved: Vec<Move>,
    pub skipped: Vec<Skipped>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArchivedFile {
    pub path: String,
    pub content: String,
}

/// Whole-store snapshot.  Serialized as a single JSON document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryArchive {
    pub format: String,
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub files: Vec<ArchivedFile>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// MemoryIndex
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Clone)]
pub struct MemoryIndex {
    backend: Arc<dyn MemoryBackend>,
}

impl MemoryIndex {
    pub fn new(backend: Arc<dyn MemoryBackend>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &Arc<dyn MemoryBackend> {
        &self.backend
    }

    pub async fn list(&self) -> Result<Vec<FileMeta>, StoreError> {
        self.backend.files().await
    }

    /// Case-sensitive substring search.  `file_pattern` is a glob matched
    /// against the path relative to `/memories` (`*` also crosses `/`).
    pub async fn search(
        &self,
        term: &str,
        file_pattern: Option<&str>,
    ) -> Result<SearchReport, StoreError> {
        let pattern = file_pattern
            .map(glob::Pattern::new)
            .transpose()
            .map_err(|e| StoreError::InvalidArgument(format!("file_pattern: {e}")))?;

        let mut report = SearchReport::default();
        if term.is_empty() {
            return Ok(report);
        }

        for meta in self.backend.files().await? {
            if let Some(p) = &pattern {
                if !p.matches(&meta.path.relative()) {
                    continue;
                }
            }
            let content = match self.backend.read(&meta.path.to_string()).await {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!(path = %meta.path, error = %e, "skipping unreadable file in search");
                    continue;
                }
            };

            let matches: Vec<LineMatch> = split_lines(&content)
                .into_iter()
                .enumerate()
                .flat_map(|(i, line)| {
                    line.match_indices(term).map(move |(idx, _)| LineMatch {
                        line: i + 1,
                        column: line[..idx].chars().count() + 1,
                        text: line.to_owned(),
                    })
                })
                .collect();

            if !matches.is_empty() {
                report.total_matches += matches.len();
                report.hits.push(SearchHit {
                    path: meta.path,
                    match_count: matches.len(),
                    matches,
                });
            }
        }
        Ok(report)
    }

    pub async fn summary(&self) -> Result<MemorySummary, StoreError> {
        let files = self.backend.files().await?;
        let dirs = self.backend.directories().await?;
        Ok(MemorySummary {
            file_count: files.len(),
            total_bytes: files.iter().map(|f| f.size).sum(),
            directory_count: dirs.len(),
            last_modified: files.iter().map(|f| f.modified_at).max(),
        })
    }

    /// Move files into directories by regex rule.  First matching rule wins.
    pub async fn organize(
        &self,
        rules: &[OrganizeRule],
        dry_run: bool,
    ) -> Result<OrganizeReport, StoreError> {
        let mut compiled = Vec::with_capacity(rules.len());
        for rule in rules {
            let re = Regex::new(&format!("^(?:{})", rule.pattern)).map_err(|e| {
                StoreError::InvalidArgument(format!("pattern '{}': {e}", rule.pattern))
            })?;
            compiled.push((re, destination_dir(&rule.destination)?));
        }

        let mut report = OrganizeReport {
            dry_run,
            ..Default::default()
        };
        // Targets claimed earlier in this run, so a dry run reports the same
        // conflicts a real run would hit.
        let mut claimed = BTreeSet::new();

        for meta in self.backend.files().await? {
            let rel = meta.path.relative();
            let Some((_, dest)) = compiled.iter().find(|(re, _)| re.is_match(&rel)) else {
                continue;
            };
            let Some(name) = meta.path.file_name() else {
                continue;
            };
            let target = dest.child(name);
            if target == meta.path {
                continue;
            }

            if claimed.contains(&target) || self.backend.exists(&target.to_string()).await? {
                report.skipped.push(Skipped {
                    path: meta.path,
                    reason: format!("{target} already exists"),
                });
                continue;
            }

            if !dry_run {
                if let Err(e) = self
                    .backend
                    .rename(&meta.path.to_string(), &target.to_string())
                    .await
                {
                    report.skipped.push(Skipped {
                        path: meta.path,
                        reason: e.to_string(),
                    });
                    continue;
                }
            }
            claimed.insert(target.clone());
            report.moved.push(Move {
                from: meta.path,
                to: target,
            });
        }

        TraceEvent::MemoryOrganized {
            moved: report.moved.len(),
            skipped: report.skipped.len(),
            dry_run,
        }
        .emit();
        Ok(report)
    }

    pub async fn backup(&self) -> Result<MemoryArchive, StoreError> {
        let mut files = Vec::new();
        for meta in self.backend.files().await? {
            let path = meta.path.to_string();
            let content = self.backend.read(&path).await?;
            files.push(ArchivedFile { path, content });
        }
        Ok(MemoryArchive {
            format: ARCHIVE_FORMAT.into(),
            version: ARCHIVE_VERSION,
            created_at: Utc::now(),
            files,
        })
    }

    /// Replace the whole store with `archive`.
    ///
    /// The archive is fully validated before anything is touched.  If a
    /// write fails part way, the previous contents are written back and the
    /// original error is returned.
    pub async fn restore(&self, archive: &MemoryArchive) -> Result<usize, StoreError> {
        validate_archive(archive)?;

        let snapshot = self.backup().await?;
        self.backend.clear().await?;

        if let Err(e) = self.write_all(&archive.files).await {
            tracing::warn!(error = %e, "restore failed; rolling back");
            if let Err(rollback) = self.rollback(&snapshot).await {
                tracing::warn!(error = %rollback, "rollback after failed restore was incomplete");
            }
            return Err(e);
        }

        TraceEvent::MemoryRestored {
            files: archive.files.len(),
        }
        .emit();
        Ok(archive.files.len())
    }

    async fn write_all(&self, files: &[ArchivedFile]) -> Result<(), StoreError> {
        for file in files {
            self.backend.create(&file.path, &file.content).await?;
        }
        Ok(())
    }

    async fn rollback(&self, snapshot: &MemoryArchive) -> Result<(), StoreError> {
        self.backend.clear().await?;
        self.write_all(&snapshot.files).await
    }
}

/// Organize destinations may be given with or without the `/memories` prefix.
fn destination_dir(raw: &str) -> Result<VirtualPath, StoreError> {
    let trimmed = raw.trim();
    let vpath = if trimmed == ROOT_PREFIX || trimmed.starts_with("/memories/") {
        VirtualPath::parse(trimmed)?
    } else {
        VirtualPath::parse(&format!("{ROOT_PREFIX}/{}", trimmed.trim_start_matches('/')))?
    };
    Ok(vpath)
}

fn validate_archive(archive: &MemoryArchive) -> Result<(), StoreError> {
    if archive.format != ARCHIVE_FORMAT {
        return Err(StoreError::Archive(format!(
            "unknown format '{}'",
            archive.format
        )));
    }
    if archive.version != ARCHIVE_VERSION {
        return Err(StoreError::Archive(format!(
            "unsupported version {} (expected {ARCHIVE_VERSION})",
            archive.version
        )));
    }

    let mut seen = BTreeSet::new();
    for file in &archive.files {
        let vpath = VirtualPath::parse(&file.path)?;
        if vpath.is_root() {
            return Err(StoreError::Archive("archive entry names the root directory".into()));
        }
        if !seen.insert(vpath) {
            return Err(StoreError::Archive(format!("duplicate path {}", file.path)));
        }
    }

    // A file cannot also be the parent directory of another entry.
    for path in &seen {
        if let Some(ancestor) = path.ancestors().find(|a| seen.contains(a)) {
            return Err(StoreError::Archive(format!(
                "{ancestor} is both a file and a directory"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edit::{ViewOutput, ViewRange};
    use crate::in_memory::InMemoryBackend;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn seeded() -> MemoryIndex {
        let backend: Arc<dyn MemoryBackend> = Arc::new(InMemoryBackend::new());
        backend
            .create("/memories/user.md", "name: Ada\nlikes: tea, more tea\n")
            .await
            .unwrap();
        backend
            .create("/memories/projects/rust.md", "tea break at 3\n")
            .await
            .unwrap();
        backend
            .create("/memories/meeting_2024.txt", "standup notes\n")
            .await
            .unwrap();
        MemoryIndex::new(backend)
    }

    #[tokio::test]
    async fn search_reports_every_occurrence() {
        let index = seeded().await;
        let report = index.search("tea", None).await.unwrap();
        assert_eq!(report.total_matches, 3);

        let user = report
            .hits
            .iter()
            .find(|h| h.path.to_string() == "/memories/user.md")
            .unwrap();
        assert_eq!(user.match_count, 2);
        assert_eq!(user.matches[0].line, 2);
        assert_eq!(user.matches[0].column, 8);
        assert_eq!(user.matches[1].column, 18);
    }

    #[tokio::test]
    async fn search_honours_file_pattern() {
        let index = seeded().await;
        let report = index.search("tea", Some("projects/*")).await.unwrap();
        assert_eq!(report.hits.len(), 1);
        assert_eq!(report.hits[0].path.to_string(), "/memories/projects/rust.md");

        let err = index.search("tea", Some("[")).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_arguments");
    }

    #[tokio::test]
    async fn empty_term_has_no_hits() {
        let index = seeded().await;
        assert!(index.search("", None).await.unwrap().hits.is_empty());
    }

    #[tokio::test]
    async fn summary_counts_files_and_directories() {
        let index = seeded().await;
        let summary = index.summary().await.unwrap();
        assert_eq!(summary.file_count, 3);
        assert_eq!(summary.directory_count, 1);
        assert!(summary.last_modified.is_some());
    }

    #[tokio::test]
    async fn organize_moves_first_matching_rule() {
        let index = seeded().await;
        let rules = vec![
            OrganizeRule {
                pattern: r"meeting_\d+".into(),
                destination: "meetings".into(),
            },
            OrganizeRule {
                pattern: ".*".into(),
                destination: "/memories/misc".into(),
            },
        ];

        let dry = index.organize(&rules, true).await.unwrap();
        assert_eq!(dry.moved.len(), 3);
        assert!(index.backend().exists("/memories/meeting_2024.txt").await.unwrap());

        let report = index.organize(&rules, false).await.unwrap();
        assert_eq!(report.moved.len(), 3);
        assert!(index
            .backend()
            .exists("/memories/meetings/meeting_2024.txt")
            .await
            .unwrap());
        assert!(index.backend().exists("/memories/misc/rust.md").await.unwrap());
    }

    #[tokio::test]
    async fn organize_rejects_bad_pattern_before_moving() {
        let index = seeded().await;
        let rules = vec![
            OrganizeRule {
                pattern: ".*".into(),
                destination: "all".into(),
            },
            OrganizeRule {
                pattern: "(".into(),
                destination: "x".into(),
            },
        ];
        assert_eq!(
            index.organize(&rules, false).await.unwrap_err().kind(),
            "invalid_arguments"
        );
        assert!(index.backend().exists("/memories/user.md").await.unwrap());
    }

    #[tokio::test]
    async fn organize_destination_cannot_escape() {
        let index = seeded().await;
        let rules = vec![OrganizeRule {
            pattern: ".*".into(),
            destination: "../outside".into(),
        }];
        assert_eq!(
            index.organize(&rules, false).await.unwrap_err().kind(),
            "outside_root"
        );
    }

    #[tokio::test]
    async fn restore_validates_before_touching_storage() {
        let index = seeded().await;
        let mut archive = index.backup().await.unwrap();
        archive.files.push(ArchivedFile {
            path: "/memories/../escape".into(),
            content: "x".into(),
        });
        assert!(index.restore(&archive).await.is_err());
        assert_eq!(index.list().await.unwrap().len(), 3);

        let mut nested = index.backup().await.unwrap();
        nested.files.push(ArchivedFile {
            path: "/memories/user.md/child".into(),
            content: "x".into(),
        });
        assert_eq!(index.restore(&nested).await.unwrap_err().kind(), "invalid_archive");
    }

    /// Delegates to an in-memory store but fails the `fail_at`-th create.
    struct FailingCreates {
        inner: InMemoryBackend,
        creates: AtomicUsize,
        fail_at: usize,
    }

    #[async_trait::async_trait]
    impl MemoryBackend for FailingCreates {
        fn name(&self) -> &'static str {
            "failing"
        }
        async fn view(&self, path: &str, range: Option<ViewRange>) -> Result<ViewOutput, StoreError> {
            self.inner.view(path, range).await
        }
        async fn create(&self, path: &str, file_text: &str) -> Result<VirtualPath, StoreError> {
            let n = self.creates.fetch_add(1, Ordering::SeqCst) + 1;
            if n == self.fail_at {
                return Err(StoreError::io(path, std::io::Error::other("disk full")));
            }
            self.inner.create(path, file_text).await
        }
        async fn str_replace(&self, path: &str, old: &str, new: &str) -> Result<VirtualPath, StoreError> {
            self.inner.str_replace(path, old, new).await
        }
        async fn insert(&self, path: &str, line: i64, text: &str) -> Result<VirtualPath, StoreError> {
            self.inner.insert(path, line, text).await
        }
        async fn delete(&self, path: &str) -> Result<VirtualPath, StoreError> {
            self.inner.delete(path).await
        }
        async fn rename(&self, old: &str, new: &str) -> Result<(VirtualPath, VirtualPath), StoreError> {
            self.inner.rename(old, new).await
        }
        async fn files(&self) -> Result<Vec<FileMeta>, StoreError> {
            self.inner.files().await
        }
        async fn directories(&self) -> Result<Vec<VirtualPath>, StoreError> {
            self.inner.directories().await
        }
        async fn read(&self, path: &str) -> Result<String, StoreError> {
            self.inner.read(path).await
        }
        async fn exists(&self, path: &str) -> Result<bool, StoreError> {
            self.inner.exists(path).await
        }
        async fn clear(&self) -> Result<(), StoreError> {
            self.inner.clear().await
        }
    }

    #[tokio::test]
    async fn failed_restore_puts_previous_tree_back() {
        let inner = InMemoryBackend::new();
        inner.create("/memories/user.md", "name: Ada\n").await.unwrap();
        inner.create("/memories/projects/rust.md", "tea break\n").await.unwrap();
        let index = MemoryIndex::new(Arc::new(FailingCreates {
            inner,
            creates: AtomicUsize::new(0),
            fail_at: 2,
        }));
        let before = index.backup().await.unwrap();

        let archive = MemoryArchive {
            format: ARCHIVE_FORMAT.into(),
            version: ARCHIVE_VERSION,
            created_at: Utc::now(),
            files: vec![
                ArchivedFile {
                    path: "/memories/new/a.md".into(),
                    content: "a".into(),
                },
                ArchivedFile {
                    path: "/memories/new/b.md".into(),
                    content: "b".into(),
                },
            ],
        };
        let err = index.restore(&archive).await.unwrap_err();
        assert_eq!(err.kind(), "io");
        assert!(err.to_string().contains("/memories/new/b.md"));

        let after = index.backup().await.unwrap();
        let paths = |a: &MemoryArchive| -> Vec<(String, String)> {
            a.files.iter().map(|f| (f.path.clone(), f.content.clone())).collect()
        };
        assert_eq!(paths(&after), paths(&before));
        assert!(!index.backend().exists("/memories/new/a.md").await.unwrap());
    }

    #[tokio::test]
    async fn restore_replaces_tree() {
        let index = seeded().await;
        let archive = MemoryArchive {
            format: ARCHIVE_FORMAT.into(),
            version: ARCHIVE_VERSION,
            created_at: Utc::now(),
            files: vec![ArchivedFile {
                path: "/memories/only.md".into(),
                content: "solo".into(),
            }],
        };
        assert_eq!(index.restore(&archive).await.unwrap(), 1);
        let files = index.list().await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(index.backend().read("/memories/only.md").await.unwrap(), "solo");
    }
}
