//! Pure text edits shared by every backend.
//!
//! Lines are `\n`-separated and 1-based.  A single trailing newline ends the
//! last line rather than starting a new one, so `"a\nb\n"` has two lines.

use mv_domain::error::StoreError;
use serde::{Deserialize, Serialize};

use crate::path::VirtualPath;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// View types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Inclusive 1-based line range.  `end == -1` means "to the end of file".
/// On the wire it is a two-element array, `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[i64; 2]", into = "[i64; 2]")]
pub struct ViewRange {
    pub start: i64,
    pub end: i64,
}

impl From<[i64; 2]> for ViewRange {
    fn from([start, end]: [i64; 2]) -> Self {
        Self { start, end }
    }
}

impl From<ViewRange> for [i64; 2] {
    fn from(r: ViewRange) -> Self {
        [r.start, r.end]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ViewOutput {
    File {
        path: VirtualPath,
        /// Line number of the first line in `content`.
        start_line: usize,
        total_lines: usize,
        /// Exact stored text, or the selected lines joined by `\n`.
        content: String,
    },
    Directory {
        path: VirtualPath,
        entries: Vec<DirEntry>,
    },
}

impl ViewOutput {
    /// Text handed back to the model: numbered lines or a directory listing.
    pub fn render(&self) -> String {
        match self {
            ViewOutput::File {
                start_line,
                content,
                ..
            } => {
                let lines = split_lines(content);
                if lines.is_empty() {
                    return "(empty file)".into();
                }
                lines
                    .iter()
                    .enumerate()
                    .map(|(i, line)| format!("{:>4}: {line}", start_line + i))
                    .collect::<Vec<_>>()
                    .join("\n")
            }
            ViewOutput::Directory { path, entries } => {
                let mut out = format!("Directory: {path}");
                if entries.is_empty() {
                    out.push_str("\n(empty)");
                }
                for entry in entries {
                    out.push_str("\n- ");
                    out.push_str(&entry.name);
                    if entry.is_dir {
                        out.push('/');
                    }
                }
                out
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Edits
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub fn split_lines(content: &str) -> Vec<&str> {
    if content.is_empty() {
        return Vec::new();
    }
    let body = content.strip_suffix('\n').unwrap_or(content);
    body.split('\n').collect()
}

pub fn view_file(
    path: &VirtualPath,
    content: String,
    range: Option<ViewRange>,
) -> Result<ViewOutput, StoreError> {
    let lines = split_lines(&content);
    let total_lines = lines.len();

    let Some(range) = range else {
        return Ok(ViewOutput::File {
            path: path.clone(),
            start_line: 1,
            total_lines,
            content,
        });
    };

    let invalid = || StoreError::InvalidRange {
        path: path.to_string(),
        start: range.start,
        end: range.end,
        line_count: total_lines,
    };

    let count = total_lines as i64;
    if range.start < 1 || range.start > count {
        return Err(invalid());
    }
    let end = if range.end == -1 { count } else { range.end };
    if end < range.start || end > count {
        return Err(invalid());
    }

    let selected = lines[(range.start - 1) as usize..end as usize].join("\n");
    Ok(ViewOutput::File {
        path: path.clone(),
        start_line: range.start as usize,
        total_lines,
        content: selected,
    })
}

/// Replace the single occurrence of `old` in `content`.
pub fn replace_unique(
    path: &VirtualPath,
    content: &str,
    old: &str,
    new: &str,
) -> Result<String, StoreError> {
    if old.is_empty() {
        return Err(StoreError::AmbiguousMatch {
            path: path.to_string(),
            count: content.chars().count() + 1,
        });
    }
    match content.matches(old).count() {
        0 => Err(StoreError::NoMatch(path.to_string())),
        1 => Ok(content.replacen(old, new, 1)),
        count => Err(StoreError::AmbiguousMatch {
            path: path.to_string(),
            count,
        }),
    }
}

/// Insert `text` so that it starts at 1-based line `line`.
pub fn insert_at(
    path: &VirtualPath,
    content: &str,
    line: i64,
    text: &str,
) -> Result<String, StoreError> {
    let mut lines = split_lines(content);
    let max = lines.len() + 1;
    if line < 1 || line > max as i64 {
        return Err(StoreError::InvalidLine {
            path: path.to_string(),
            line,
            max,
        });
    }

    let text = text.strip_suffix('\n').unwrap_or(text);
    let at = (line - 1) as usize;
    lines.splice(at..at, text.split('\n'));

    let mut out = lines.join("\n");
    if content.ends_with('\n') || (content.is_empty() && !out.is_empty()) {
        out.push('\n');
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p() -> VirtualPath {
        VirtualPath::parse("/memories/t.txt").unwrap()
    }

    #[test]
    fn split_lines_counts_trailing_newline_once() {
        assert_eq!(split_lines(""), Vec::<&str>::new());
        assert_eq!(split_lines("a\nb\n"), vec!["a", "b"]);
        assert_eq!(split_lines("a\nb"), vec!["a", "b"]);
        assert_eq!(split_lines("a\n\n"), vec!["a", ""]);
    }

    #[test]
    fn view_range_to_end_of_file() {
        let out = view_file(&p(), "one\ntwo\nthree\n".into(), Some([2, -1].into())).unwrap();
        match &out {
            ViewOutput::File {
                start_line,
                total_lines,
                content,
                ..
            } => {
                assert_eq!(*start_line, 2);
                assert_eq!(*total_lines, 3);
                assert_eq!(content, "two\nthree");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(out.render(), "   2: two\n   3: three");
    }

    #[test]
    fn view_range_out_of_bounds_is_invalid() {
        for range in [[0, 1], [4, 4], [2, 1], [1, 9]] {
            let err = view_file(&p(), "a\nb\nc".into(), Some(range.into())).unwrap_err();
            assert_eq!(err.kind(), "invalid_range", "{range:?}");
        }
    }

    #[test]
    fn view_without_range_keeps_raw_text() {
        let out = view_file(&p(), "x\n".into(), None).unwrap();
        let ViewOutput::File { content, .. } = out else {
            panic!("expected file")
        };
        assert_eq!(content, "x\n");
    }

    #[test]
    fn replace_requires_exactly_one_match() {
        assert_eq!(
            replace_unique(&p(), "hello world", "world", "earth").unwrap(),
            "hello earth"
        );
        assert_eq!(
            replace_unique(&p(), "hello", "bye", "x").unwrap_err().kind(),
            "not_found"
        );
        let err = replace_unique(&p(), "a a", "a", "b").unwrap_err();
        assert!(matches!(err, StoreError::AmbiguousMatch { count: 2, .. }));
        assert_eq!(
            replace_unique(&p(), "abc", "", "x").unwrap_err().kind(),
            "ambiguous_match"
        );
    }

    #[test]
    fn replace_spans_lines() {
        assert_eq!(
            replace_unique(&p(), "a\nb\nc\n", "a\nb", "z").unwrap(),
            "z\nc\n"
        );
    }

    #[test]
    fn insert_positions() {
        let content = "a\nb\n";
        assert_eq!(insert_at(&p(), content, 1, "x").unwrap(), "x\na\nb\n");
        assert_eq!(insert_at(&p(), content, 2, "x\n").unwrap(), "a\nx\nb\n");
        assert_eq!(insert_at(&p(), content, 3, "x").unwrap(), "a\nb\nx\n");
        assert_eq!(insert_at(&p(), "a\nb", 3, "x").unwrap(), "a\nb\nx");
    }

    #[test]
    fn insert_out_of_range_is_invalid_line() {
        let err = insert_at(&p(), "a\nb\n", 4, "x").unwrap_err();
        assert!(matches!(err, StoreError::InvalidLine { line: 4, max: 3, .. }));
        assert_eq!(insert_at(&p(), "a", 0, "x").unwrap_err().kind(), "invalid_line");
    }

    #[test]
    fn insert_into_empty_file() {
        assert_eq!(insert_at(&p(), "", 1, "first\n").unwrap(), "first\n");
    }

    #[test]
    fn directory_render_marks_subdirectories() {
        let out = ViewOutput::Directory {
            path: VirtualPath::root(),
            entries: vec![
                DirEntry {
                    name: "notes".into(),
                    is_dir: true,
                },
                DirEntry {
                    name: "user.md".into(),
                    is_dir: false,
                },
            ],
        };
        assert_eq!(out.render(), "Directory: /memories\n- notes/\n- user.md");
    }
}
