//! Data directory, configuration and component wiring for the CLI.

use anyhow::{Context, Result};
use cultura_sync_client::{
    ClientConfig, ConnectivityObserver, HttpRemote, LocalStore, MockRemote, RemoteEndpoint,
    SqliteStore, StateContainer, SyncQueueManager,
};
use std::path::Path;
use std::sync::Arc;

/// Everything a command needs, opened from one data directory.
pub struct Workspace {
    /// Loaded configuration (defaults if no `cultura.toml`).
    pub config: ClientConfig,
    /// The local store.
    pub store: Arc<dyn LocalStore>,
}

impl Workspace {
    /// Load the configuration and open the store in `data_dir`.
    pub async fn open(data_dir: &Path) -> Result<Self> {
        let config = ClientConfig::load(data_dir).context("Invalid configuration")?;
        let db_path = config.database_path(data_dir);
        tracing::debug!("Opening store at {}", db_path.display());
        let store = SqliteStore::new(&db_path)
            .await
            .with_context(|| format!("Failed to open store at {}", db_path.display()))?;

        Ok(Self {
            config,
            store: Arc::new(store),
        })
    }

    /// Hydrate the state container from the store.
    pub async fn container(&self) -> Result<StateContainer> {
        StateContainer::hydrate(self.store.clone())
            .await
            .context("Failed to load saved state")
    }

    /// Build the remote endpoint: the mock when `mock` is set, otherwise HTTP.
    pub fn remote(&self, mock: bool) -> Result<Arc<dyn RemoteEndpoint>> {
        if mock {
            return Ok(Arc::new(MockRemote::new()));
        }

        let base_url = self.config.remote.base_url.as_deref().context(
            "No remote configured. Set [remote] base_url in cultura.toml or pass --mock.",
        )?;
        let remote = HttpRemote::new(base_url, self.config.remote_timeout())
            .context("Invalid remote configuration")?;
        Ok(Arc::new(remote))
    }

    /// Build the connectivity observer around a queue manager.
    pub fn observer(&self, remote: Arc<dyn RemoteEndpoint>) -> ConnectivityObserver {
        let manager =
            SyncQueueManager::new(self.store.clone(), remote, self.config.backoff_policy());
        ConnectivityObserver::new(manager)
    }
}
