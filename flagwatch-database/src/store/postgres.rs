use async_trait::async_trait;

use crate::database::Database;
use crate::impls::flag_config::{get_flag_config, reset_flag_config, set_flag_config};
use crate::model::flag_config::FlagConfig;
use crate::store::ConfigStore;

#[async_trait]
impl ConfigStore for Database {
    async fn get(&self, guild_id: u64) -> anyhow::Result<FlagConfig> {
        get_flag_config(self, guild_id).await
    }

    async fn set(&self, guild_id: u64, config: FlagConfig) -> anyhow::Result<()> {
        set_flag_config(self, guild_id, &config).await
    }

    async fn reset(&self, guild_id: u64) -> anyhow::Result<FlagConfig> {
        reset_flag_config(self, guild_id).await
    }
}
