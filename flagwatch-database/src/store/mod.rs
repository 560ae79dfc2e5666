//! The config store seam the moderation engine reads through.
//!
//! Three backends implement [`ConfigStore`]: PostgreSQL ([`crate::Database`]), a
//! flat JSON table on disk ([`JsonFileConfigStore`]) and a volatile map
//! ([`MemoryConfigStore`]). All of them materialize the defaults on the first
//! `get` for a guild and persist before returning from a mutation.

mod json_file;
mod memory;
mod postgres;

use async_trait::async_trait;

use crate::model::flag_config::FlagConfig;

pub use json_file::JsonFileConfigStore;
pub use memory::MemoryConfigStore;

#[async_trait]
pub trait ConfigStore: Send + Sync + std::fmt::Debug {
    /// Return the guild's config, creating and persisting the defaults if absent.
    async fn get(&self, guild_id: u64) -> anyhow::Result<FlagConfig>;

    /// Replace every field of the guild's config.
    async fn set(&self, guild_id: u64, config: FlagConfig) -> anyhow::Result<()>;

    /// Overwrite the guild's config with the defaults and return them.
    async fn reset(&self, guild_id: u64) -> anyhow::Result<FlagConfig> {
        let defaults = FlagConfig::default();
        self.set(guild_id, defaults.clone()).await?;
        Ok(defaults)
    }
}
