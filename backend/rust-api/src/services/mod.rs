use std::sync::Arc;

use crate::config::{Config, KvBackend};
use crate::kv::{KvStore, MemoryKv, RedisKv};

pub mod attempt_store;
pub mod chart_service;

pub use attempt_store::{AttemptStore, AttemptStoreError};
pub use chart_service::{ChartDuration, ChartError};

pub struct AppState {
    pub config: Config,
    pub kv: Arc<dyn KvStore>,
}

impl AppState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let kv: Arc<dyn KvStore> = match config.kv_backend {
            KvBackend::Redis => {
                Arc::new(RedisKv::connect(&config.redis_uri, &config.kv_namespace).await?)
            }
            KvBackend::Memory => {
                tracing::warn!("Using in-memory key-value store; attempts are not persisted");
                Arc::new(MemoryKv::new())
            }
        };

        Ok(Self::with_kv(config, kv))
    }

    pub fn with_kv(config: Config, kv: Arc<dyn KvStore>) -> Self {
        Self { config, kv }
    }

    /// Store over the shared process-wide handle.
    pub fn attempt_store(&self) -> AttemptStore {
        AttemptStore::new(self.kv.clone())
    }
}
