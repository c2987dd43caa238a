//! Shared types for the memvault crates: error taxonomy, configuration,
//! provider-agnostic message/tool types and structured trace events.

pub mod config;
pub mod error;
pub mod tool;
pub mod trace;
