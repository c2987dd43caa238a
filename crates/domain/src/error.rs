/// Shared error type used across all memvault crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("provider {provider}: {message}")]
    Provider { provider: String, message: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("config: {0}")]
    Config(String),

    #[error("auth: {0}")]
    Auth(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Path errors
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A client-supplied path could not be turned into a virtual path.
///
/// Messages only echo the raw input; they never say anything about the
/// filesystem outside the sandbox.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("malformed path '{path}': {reason}")]
    Malformed { path: String, reason: String },

    #[error("path '{0}' escapes the /memories directory")]
    OutsideRoot(String),
}

impl PathError {
    pub fn malformed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Malformed { .. } => "malformed_path",
            Self::OutsideRoot(_) => "outside_root",
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store errors
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Failures of the virtual file store and the memory index.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Path(#[from] PathError),

    #[error("path not found: {0}")]
    NotFound(String),

    #[error("{path}: {reason}")]
    Conflict { path: String, reason: String },

    #[error("text not found in {0}")]
    NoMatch(String),

    #[error("text appears {count} times in {path}; old_str must be unique")]
    AmbiguousMatch { path: String, count: usize },

    #[error("invalid view_range {start}..{end} for {path} ({line_count} lines)")]
    InvalidRange {
        path: String,
        start: i64,
        end: i64,
        line_count: usize,
    },

    #[error("invalid insert_line {line} for {path}; must be between 1 and {max}")]
    InvalidLine { path: String, line: i64, max: usize },

    #[error("{0}")]
    Forbidden(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("archive: {0}")]
    Archive(String),

    #[error("I/O on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    pub fn conflict(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Conflict {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn io(path: impl std::fmt::Display, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_string(),
            source,
        }
    }

    /// Stable machine-readable kind, used in tool-result error payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Path(e) => e.kind(),
            // A missing `old_str` reads as "not found" on the wire.
            Self::NotFound(_) | Self::NoMatch(_) => "not_found",
            Self::Conflict { .. } => "conflict",
            Self::AmbiguousMatch { .. } => "ambiguous_match",
            Self::InvalidRange { .. } => "invalid_range",
            Self::InvalidLine { .. } => "invalid_line",
            Self::Forbidden(_) => "forbidden",
            Self::InvalidArgument(_) => "invalid_arguments",
            Self::Archive(_) => "invalid_archive",
            Self::Io { .. } => "io",
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session / compaction errors
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("session {0} not found")]
    SessionNotFound(String),

    /// Another turn held the session longer than the lease timeout.
    #[error("session {0} is busy; retry later")]
    SessionBusy(String),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CompactionError {
    #[error("input token estimate unavailable")]
    EstimateUnavailable,
}
