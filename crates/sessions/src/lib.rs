//! Conversation sessions for memvault.
//!
//! Sessions are in-memory conversational handles: a transcript, the set of
//! memory files touched, and activity timestamps.  They are capped and
//! LRU-evicted by [`SessionManager`]; memory files always outlive them.
//! [`ContextCompactor`] trims old tool-use turns once a transcript grows
//! past the configured token budget.

pub mod compact;
pub mod manager;
pub mod session;

pub use compact::{estimate_tokens, CompactionReport, ContextCompactor};
pub use manager::{SessionInfo, SessionLease, SessionManager, SessionStats};
pub use session::{Session, ToolCallRecord, ToolOutcome, TranscriptEntry};
