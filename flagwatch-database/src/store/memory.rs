use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::model::flag_config::FlagConfig;
use crate::store::ConfigStore;

/// Volatile config table; every "persist" is just a counter bump.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    table: Mutex<HashMap<u64, FlagConfig>>,
    writes: AtomicUsize,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of mutations persisted so far, lazy defaults included.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn get(&self, guild_id: u64) -> anyhow::Result<FlagConfig> {
        let mut table = self.table.lock().await;
        let config = table.entry(guild_id).or_insert_with(|| {
            self.writes.fetch_add(1, Ordering::SeqCst);
            FlagConfig::default()
        });
        Ok(config.clone())
    }

    async fn set(&self, guild_id: u64, config: FlagConfig) -> anyhow::Result<()> {
        config.validate()?;
        self.table.lock().await.insert(guild_id, config);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
