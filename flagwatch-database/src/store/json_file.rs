use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::model::flag_config::FlagConfig;
use crate::store::ConfigStore;

/// Flat `{ guildId: FlagConfig }` table kept in memory and rewritten to disk
/// on every mutation.
///
/// The file is replaced by renaming a fully written sibling, so readers only
/// ever see a complete table. If a `set` fails to write, the in-memory value
/// stays applied for the rest of the process.
#[derive(Debug)]
pub struct JsonFileConfigStore {
    path: PathBuf,
    table: Mutex<BTreeMap<u64, FlagConfig>>,
}

impl JsonFileConfigStore {
    /// Load the table at `path`; a missing or empty file is an empty table.
    pub async fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let table = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => BTreeMap::new(),
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("failed to parse config table `{}`", path.display()))?,
            Err(source) if source.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => {
                return Err(source)
                    .with_context(|| format!("failed to read config table `{}`", path.display()));
            }
        };

        info!(path = %path.display(), guilds = table.len(), "Loaded flag config table.");

        Ok(Self {
            path,
            table: Mutex::new(table),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, table: &BTreeMap<u64, FlagConfig>) -> anyhow::Result<()> {
        let payload = serde_json::to_vec(table).context("failed to serialize config table")?;
        let staging = self.path.with_extension("json.tmp");

        tokio::fs::write(&staging, payload)
            .await
            .with_context(|| format!("failed to write `{}`", staging.display()))?;
        tokio::fs::rename(&staging, &self.path)
            .await
            .with_context(|| format!("failed to replace `{}`", self.path.display()))?;

        debug!(path = %self.path.display(), guilds = table.len(), "config table persisted");
        Ok(())
    }
}

#[async_trait]
impl ConfigStore for JsonFileConfigStore {
    async fn get(&self, guild_id: u64) -> anyhow::Result<FlagConfig> {
        let mut table = self.table.lock().await;
        if let Some(config) = table.get(&guild_id) {
            return Ok(config.clone());
        }

        // Unpersisted defaults are dropped so the next `get` writes them again.
        let defaults = FlagConfig::default();
        table.insert(guild_id, defaults.clone());
        if let Err(source) = self.persist(&table).await {
            table.remove(&guild_id);
            return Err(source);
        }
        Ok(defaults)
    }

    async fn set(&self, guild_id: u64, config: FlagConfig) -> anyhow::Result<()> {
        config.validate()?;
        let mut table = self.table.lock().await;
        table.insert(guild_id, config);
        self.persist(&table).await
    }
}
