use crate::deletion::DeletionQueue;
use crate::file::FileRepository;
use crate::memory::InMemoryRepository;
use crate::mysql::{MySqlRepository, MySqlSettings};
use shortlink_core::{Repository, Result};
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Which backend to open, chosen once at startup.
#[derive(Debug, Clone)]
pub enum StorageConfig {
    InMemory,
    File { path: PathBuf },
    MySql { dsn: String, settings: MySqlSettings },
}

impl Display for StorageConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageConfig::InMemory => write!(f, "in-memory"),
            StorageConfig::File { path } => write!(f, "file ({})", path.display()),
            StorageConfig::MySql { .. } => write!(f, "mysql"),
        }
    }
}

/// An opened backend behind the shared contract.
pub struct Storage {
    repository: Arc<dyn Repository>,
    deletions: Option<DeletionQueue>,
}

impl Storage {
    /// Opens the backend described by `config`.
    pub async fn open(config: &StorageConfig) -> Result<Self> {
        let storage = match config {
            StorageConfig::InMemory => Self {
                repository: Arc::new(InMemoryRepository::new()),
                deletions: None,
            },
            StorageConfig::File { path } => Self {
                repository: Arc::new(FileRepository::open(path).await?),
                deletions: None,
            },
            StorageConfig::MySql { dsn, settings } => {
                let repository = MySqlRepository::connect_with(dsn, *settings).await?;
                let deletions = repository.deletion_queue().clone();
                Self {
                    repository: Arc::new(repository),
                    deletions: Some(deletions),
                }
            }
        };

        info!(backend = %config, "storage opened");
        Ok(storage)
    }

    pub fn repository(&self) -> Arc<dyn Repository> {
        Arc::clone(&self.repository)
    }

    /// Flushes and stops background work. A no-op for backends without any.
    pub async fn shutdown(&self) {
        if let Some(deletions) = &self.deletions {
            deletions.shutdown().await;
        }
    }
}
