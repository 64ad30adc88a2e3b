//! Cache command - inspect and clear hook caches

use crate::cache::{compute_version_hash, read_document};
use crate::cli::args::{CacheAction, CacheArgs};
use crate::cli::commands::CommandContext;
use crate::error::{ModcacheError, ModcacheResult};
use chrono::{DateTime, Local};
use console::style;
use std::path::Path;
use tokio::fs;

/// Execute the cache command
pub async fn execute(args: CacheArgs, ctx: &CommandContext) -> ModcacheResult<()> {
    match args.action {
        CacheAction::Info => show_info(ctx).await,
        CacheAction::Clear { yes } => clear(ctx, yes).await,
    }
}

async fn show_info(ctx: &CommandContext) -> ModcacheResult<()> {
    let settings = &ctx.settings;
    let hash = compute_version_hash(&settings.project_dir, &settings.dependencies).await?;
    let namespace = settings.namespace(&hash);

    println!("Cache root: {}", settings.cache_root.display());
    println!("Namespace:  {}", namespace.display());
    let state = if settings.enabled {
        style("enabled").green()
    } else {
        style("disabled").dim()
    };
    println!("Caching:    {} ({} mode)", state, settings.mode);
    println!();

    if !namespace.is_dir() {
        println!("No cache for the current version hash.");
        return Ok(());
    }

    println!("{:<40} {:>8} {:<20}", "PLUGIN", "ENTRIES", "FLUSHED");
    println!("{}", "-".repeat(70));

    let mut documents = list_documents(&namespace).await?;
    documents.sort();
    for path in &documents {
        let entries = read_document(path).await.len();
        let flushed = fs::metadata(path)
            .await
            .and_then(|meta| meta.modified())
            .map(|time| DateTime::<Local>::from(time).format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|_| "-".to_string());
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();

        println!("{:<40} {:>8} {:<20}", name, entries, flushed);
    }

    println!();
    println!("Total: {} cache document(s)", documents.len());
    Ok(())
}

async fn list_documents(dir: &Path) -> ModcacheResult<Vec<std::path::PathBuf>> {
    let mut documents = vec![];
    let mut entries = fs::read_dir(dir)
        .await
        .map_err(|e| ModcacheError::io(format!("reading cache directory {}", dir.display()), e))?;

    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| ModcacheError::io("reading cache entry", e))?
    {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            documents.push(path);
        }
    }
    Ok(documents)
}

async fn clear(ctx: &CommandContext, yes: bool) -> ModcacheResult<()> {
    let root = &ctx.settings.cache_root;

    if !root.exists() {
        println!("Nothing to clear at {}", root.display());
        return Ok(());
    }

    if !yes {
        println!(
            "{} This removes every cache namespace under {}",
            style("[WARN]").yellow(),
            root.display()
        );
        println!("Re-run with --yes to confirm.");
        return Ok(());
    }

    fs::remove_dir_all(root)
        .await
        .map_err(|e| ModcacheError::io(format!("removing {}", root.display()), e))?;
    println!("{} Cleared {}", style("[OK]").green(), root.display());
    Ok(())
}
