//! Show store and sync status.

use anyhow::Result;
use cultura_sync_types::{Collection, EntityKind};
use std::path::Path;

use crate::config::Workspace;

/// Run the status command.
pub async fn run(data_dir: &Path) -> Result<()> {
    let workspace = Workspace::open(data_dir).await?;
    let store = &workspace.store;

    println!("=== cultura status ===");
    println!();
    println!("Data dir: {}", data_dir.display());
    println!();

    println!("Records:");
    for kind in EntityKind::ALL {
        let collection = kind.collection();
        println!("  {:<10} {}", collection.name(), store.count(collection).await?);
    }
    println!();

    let pending = store.count(Collection::SyncQueue).await?;
    let dead = store.count(Collection::DeadLetters).await?;
    println!("Sync:");
    println!("  Pending changes: {}", pending);
    println!("  Dead letters:    {}", dead);
    if let Some(next) = store.queue().await?.first() {
        println!(
            "  Next attempt:    {} ({} {}, {} retries)",
            next.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            next.operation,
            next.entity_type,
            next.retries
        );
    }
    println!();

    println!("Remote:");
    match &workspace.config.remote.base_url {
        Some(url) => println!("  Endpoint: {}", url),
        None => println!("  Endpoint: NOT CONFIGURED (use --mock to simulate one)"),
    }

    Ok(())
}
