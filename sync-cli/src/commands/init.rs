//! Initialize a data directory.

use anyhow::{Context, Result};
use cultura_sync_client::{ClientConfig, CONFIG_FILE_NAME};
use std::path::Path;

use crate::config::Workspace;

/// Run the init command.
pub async fn run(data_dir: &Path, remote: Option<&str>) -> Result<()> {
    let config_path = data_dir.join(CONFIG_FILE_NAME);

    // Check if already initialized
    if config_path.exists() {
        anyhow::bail!(
            "Already initialized. Delete {} to reinitialize.",
            config_path.display()
        );
    }

    let mut config = ClientConfig::default();
    config.remote.base_url = remote.map(str::to_string);

    tokio::fs::write(&config_path, config.to_toml()?)
        .await
        .context("Failed to write configuration")?;

    // Creates the database and applies migrations.
    Workspace::open(data_dir).await?;

    println!("Initialized Cultura data directory");
    println!();
    println!("  Config:   {}", config_path.display());
    println!("  Database: {}", config.database_path(data_dir).display());
    match &config.remote.base_url {
        Some(url) => println!("  Remote:   {}", url),
        None => println!("  Remote:   (none, use --mock to simulate one)"),
    }
    println!();
    println!("Next steps:");
    println!("  1. Add something: cultura add event \"Feria\" --date 2024-05-01T10:00");
    println!("  2. Replay queued changes: cultura sync");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn init_writes_config_and_database() {
        let dir = tempdir().unwrap();
        run(dir.path(), Some("https://api.example.org")).await.unwrap();

        assert!(dir.path().join("cultura.db").exists());
        let config = ClientConfig::load(dir.path()).unwrap();
        assert_eq!(config.remote.base_url.as_deref(), Some("https://api.example.org"));
    }

    #[tokio::test]
    async fn init_twice_fails() {
        let dir = tempdir().unwrap();
        run(dir.path(), None).await.unwrap();
        assert!(run(dir.path(), None).await.is_err());
    }
}
