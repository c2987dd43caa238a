//! `memvault memory ...`: one-shot commands against the configured store.

use std::io::Write;

use anyhow::Context;
use mv_domain::config::Config;
use mv_store::{MemoryArchive, MemoryIndex, ViewRange};

use super::MemoryCommand;

pub async fn run(config: &Config, cmd: MemoryCommand) -> anyhow::Result<()> {
    let store = mv_store::open_backend(&config.memory).context("opening memory store")?;
    let index = MemoryIndex::new(store.clone());

    match cmd {
        MemoryCommand::View { path, start, end } => {
            let range = start.map(|start| ViewRange {
                start,
                end: end.unwrap_or(-1),
            });
            let out = store.view(&path, range).await?;
            println!("{}", out.render());
        }
        MemoryCommand::Files => {
            let files = index.list().await?;
            for f in &files {
                println!(
                    "{:>10}  {}  {}",
                    f.size,
                    f.modified_at.format("%Y-%m-%d %H:%M:%S"),
                    f.path
                );
            }
            println!("{} file(s)", files.len());
        }
        MemoryCommand::Search {
            query,
            file_pattern,
        } => {
            let report = index.search(&query, file_pattern.as_deref()).await?;
            for hit in &report.hits {
                for m in &hit.matches {
                    println!("{}:{}:{}: {}", hit.path, m.line, m.column, m.text);
                }
            }
            println!(
                "{} match(es) in {} file(s)",
                report.total_matches,
                report.hits.len()
            );
        }
        MemoryCommand::Summary => {
            let s = index.summary().await?;
            println!("files:        {}", s.file_count);
            println!("directories:  {}", s.directory_count);
            println!("total bytes:  {}", s.total_bytes);
            match s.last_modified {
                Some(t) => println!("last change:  {}", t.to_rfc3339()),
                None => println!("last change:  -"),
            }
        }
        MemoryCommand::Backup { output } => {
            let archive = index.backup().await?;
            let json = serde_json::to_string_pretty(&archive)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, json)
                        .with_context(|| format!("writing {}", path.display()))?;
                    eprintln!("{} file(s) written to {}", archive.files.len(), path.display());
                }
                None => {
                    let mut stdout = std::io::stdout().lock();
                    stdout.write_all(json.as_bytes())?;
                    stdout.write_all(b"\n")?;
                }
            }
        }
        MemoryCommand::Restore { input } => {
            let raw = std::fs::read_to_string(&input)
                .with_context(|| format!("reading {}", input.display()))?;
            let archive: MemoryArchive = serde_json::from_str(&raw)
                .with_context(|| format!("parsing {}", input.display()))?;
            let count = index.restore(&archive).await?;
            println!("restored {count} file(s)");
        }
        MemoryCommand::Clear { yes } => {
            if !yes {
                anyhow::bail!("refusing to clear the store without --yes");
            }
            store.clear().await?;
            println!("memory store cleared");
        }
    }
    Ok(())
}
