use anyhow::Context as _;

use flagwatch_utils::time::now_unix_secs;

use crate::cache::{CONFIG_CACHE_TTL, flag_config_key, invalidate_flag_config};
use crate::database::Database;
use crate::model::flag_config::{FlagConfig, FlagConfigRow};

/// Fetch a guild's flag config, materializing the defaults on first access.
pub async fn get_flag_config(db: &Database, guild_id: u64) -> anyhow::Result<FlagConfig> {
    let cache_key = flag_config_key(db.cache(), guild_id);
    db.cache()
        .get_or_load_json(&cache_key, CONFIG_CACHE_TTL, || async {
            let guild_id_i64 = i64::try_from(guild_id).context("guild_id out of i64 range")?;

            let row = sqlx::query_as::<_, FlagConfigRow>(
                "SELECT reaction_limit, timeout_duration_ms, timeout_role_id, whitelist_role_id \
                 FROM guild_flag_config WHERE guild_id = $1",
            )
            .bind(guild_id_i64)
            .fetch_optional(db.pool())
            .await?;

            match row {
                Some(row) => FlagConfig::try_from(row),
                None => insert_default_flag_config(db, guild_id_i64).await,
            }
        })
        .await
}

async fn insert_default_flag_config(db: &Database, guild_id_i64: i64) -> anyhow::Result<FlagConfig> {
    let defaults = FlagConfig::default();
    let row = to_row(&defaults)?;

    // A concurrent first access may have inserted already; keep whichever row won.
    sqlx::query(
        "INSERT INTO guild_flag_config \
         (guild_id, reaction_limit, timeout_duration_ms, timeout_role_id, whitelist_role_id, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         ON CONFLICT (guild_id) DO NOTHING",
    )
    .bind(guild_id_i64)
    .bind(row.reaction_limit)
    .bind(row.timeout_duration_ms)
    .bind(row.timeout_role_id)
    .bind(row.whitelist_role_id)
    .bind(updated_at()?)
    .execute(db.pool())
    .await?;

    let stored = sqlx::query_as::<_, FlagConfigRow>(
        "SELECT reaction_limit, timeout_duration_ms, timeout_role_id, whitelist_role_id \
         FROM guild_flag_config WHERE guild_id = $1",
    )
    .bind(guild_id_i64)
    .fetch_one(db.pool())
    .await?;

    FlagConfig::try_from(stored)
}

/// Replace all four fields of a guild's flag config.
pub async fn set_flag_config(
    db: &Database,
    guild_id: u64,
    config: &FlagConfig,
) -> anyhow::Result<()> {
    config.validate()?;
    let guild_id_i64 = i64::try_from(guild_id).context("guild_id out of i64 range")?;
    let row = to_row(config)?;

    sqlx::query(
        "INSERT INTO guild_flag_config \
         (guild_id, reaction_limit, timeout_duration_ms, timeout_role_id, whitelist_role_id, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         ON CONFLICT (guild_id) DO UPDATE SET \
         reaction_limit = EXCLUDED.reaction_limit, \
         timeout_duration_ms = EXCLUDED.timeout_duration_ms, \
         timeout_role_id = EXCLUDED.timeout_role_id, \
         whitelist_role_id = EXCLUDED.whitelist_role_id, \
         updated_at = EXCLUDED.updated_at",
    )
    .bind(guild_id_i64)
    .bind(row.reaction_limit)
    .bind(row.timeout_duration_ms)
    .bind(row.timeout_role_id)
    .bind(row.whitelist_role_id)
    .bind(updated_at()?)
    .execute(db.pool())
    .await?;

    invalidate_flag_config(db.cache(), guild_id).await;

    Ok(())
}

pub async fn reset_flag_config(db: &Database, guild_id: u64) -> anyhow::Result<FlagConfig> {
    let defaults = FlagConfig::default();
    set_flag_config(db, guild_id, &defaults).await?;
    Ok(defaults)
}

fn to_row(config: &FlagConfig) -> anyhow::Result<FlagConfigRow> {
    Ok(FlagConfigRow {
        reaction_limit: i32::try_from(config.reaction_limit)
            .context("reaction_limit out of i32 range")?,
        timeout_duration_ms: i64::try_from(config.timeout_duration_ms)
            .context("timeout_duration_ms out of i64 range")?,
        timeout_role_id: config
            .timeout_role
            .map(i64::try_from)
            .transpose()
            .context("timeout_role_id out of i64 range")?,
        whitelist_role_id: config
            .whitelist_role
            .map(i64::try_from)
            .transpose()
            .context("whitelist_role_id out of i64 range")?,
    })
}

fn updated_at() -> anyhow::Result<i64> {
    i64::try_from(now_unix_secs()).context("timestamp out of i64 range")
}
