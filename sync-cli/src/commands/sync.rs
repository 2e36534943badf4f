//! Replay queued changes and manage dead letters.

use anyhow::Result;
use cultura_sync_client::DrainOutcome;
use std::path::Path;

use crate::config::Workspace;

/// Run the sync command: come online once and wait for the drain.
pub async fn run(data_dir: &Path, mock: bool) -> Result<()> {
    let workspace = Workspace::open(data_dir).await?;
    let observer = workspace.observer(workspace.remote(mock)?);

    let pending = observer.refresh_pending().await?;
    if pending == 0 {
        println!("Nothing to sync.");
        return Ok(());
    }
    println!("Syncing {} pending change(s)...", pending);

    tracing::debug!(mock, "Coming online to drain the queue");
    let outcome = match observer.set_online(true) {
        Some(drain) => drain.await?,
        None => DrainOutcome::AlreadyRunning,
    };

    match outcome {
        DrainOutcome::Completed(report) => {
            println!();
            println!("  Replayed:      {}", report.succeeded);
            println!("  Failed:        {}", report.failed);
            println!("  Waiting:       {}", report.deferred);
            println!("  Dead-lettered: {}", report.dead_lettered);
            if report.store_errors > 0 {
                println!("  Store errors:  {}", report.store_errors);
            }
            println!();
            println!("Pending changes: {}", observer.status().pending_changes);
        }
        DrainOutcome::AlreadyRunning => println!("A sync is already running."),
    }

    Ok(())
}

/// Run the dead-letters command.
pub async fn dead_letters(data_dir: &Path, requeue: bool, purge: bool) -> Result<()> {
    let workspace = Workspace::open(data_dir).await?;
    let store = &workspace.store;

    if requeue {
        let n = store.requeue_dead_letters().await?;
        println!("Requeued {} dead letter(s)", n);
        return Ok(());
    }
    if purge {
        let n = store.purge_dead_letters().await?;
        println!("Purged {} dead letter(s)", n);
        return Ok(());
    }

    let letters = store.dead_letters().await?;
    if letters.is_empty() {
        println!("No dead letters.");
    }
    for letter in letters {
        println!(
            "{}  {} {}  {}  ({})",
            letter.buried_at.format("%Y-%m-%d %H:%M:%S"),
            letter.item.operation,
            letter.item.entity_type,
            letter.item.id,
            letter.reason
        );
    }
    Ok(())
}
