pub mod config;
pub mod memory;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// memvault: persistent file-based memory for a tool-calling assistant.
#[derive(Debug, Parser)]
#[command(name = "memvault", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the HTTP server (default when no subcommand is given).
    Serve,
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Operate on the configured memory store directly.
    #[command(subcommand)]
    Memory(MemoryCommand),
    /// Print version information.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

#[derive(Debug, Subcommand)]
pub enum MemoryCommand {
    /// Print a file with line numbers, or list a directory.
    View {
        /// Virtual path, e.g. /memories/notes.txt.
        #[arg(default_value = "/memories")]
        path: String,
        /// First line to show (1-based).
        #[arg(long)]
        start: Option<i64>,
        /// Last line to show; -1 for end of file.
        #[arg(long, requires = "start")]
        end: Option<i64>,
    },
    /// List every stored file with size and modification time.
    Files,
    /// Search file contents for a literal string.
    Search {
        query: String,
        /// Glob over paths relative to /memories, e.g. "notes/*.md".
        #[arg(long)]
        file_pattern: Option<String>,
    },
    /// Print file, directory and byte counts.
    Summary,
    /// Write a JSON archive of the whole store.
    Backup {
        /// Output file; stdout when omitted.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Replace the whole store with the contents of an archive.
    Restore {
        input: PathBuf,
    },
    /// Delete every file and directory in the store.
    Clear {
        /// Required; there is no undo.
        #[arg(long)]
        yes: bool,
    },
}

// ── Config loading helper ─────────────────────────────────────────────

/// Load the configuration from the path specified by `MEMVAULT_CONFIG` (or
/// `config.toml` by default).  Returns the parsed [`Config`] and the
/// path that was used.
///
/// A missing file is not an error; every section has defaults.
///
/// [`Config`]: mv_domain::config::Config
pub fn load_config() -> anyhow::Result<(mv_domain::config::Config, String)> {
    let config_path =
        std::env::var("MEMVAULT_CONFIG").unwrap_or_else(|_| "config.toml".into());

    let config = if std::path::Path::new(&config_path).exists() {
        let raw = std::fs::read_to_string(&config_path)
            .map_err(|e| anyhow::anyhow!("reading {config_path}: {e}"))?;
        toml::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("parsing {config_path}: {e}"))?
    } else {
        mv_domain::config::Config::default()
    };

    Ok((config, config_path))
}
