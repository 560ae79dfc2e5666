use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

pub const DEFAULT_REACTION_LIMIT: u32 = 5;
pub const DEFAULT_TIMEOUT_DURATION: Duration = Duration::from_secs(30 * 60);

/// Per-guild moderation settings.
///
/// Serializes to the flat-table shape
/// `{ "reactionLimit", "timeoutDuration" (ms), "timeoutRole", "whitelistRole" }`
/// with role ids written as strings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagConfig {
    pub reaction_limit: u32,
    #[serde(rename = "timeoutDuration")]
    pub timeout_duration_ms: u64,
    #[serde(with = "snowflake", default)]
    pub timeout_role: Option<u64>,
    #[serde(with = "snowflake", default)]
    pub whitelist_role: Option<u64>,
}

impl Default for FlagConfig {
    fn default() -> Self {
        Self {
            reaction_limit: DEFAULT_REACTION_LIMIT,
            timeout_duration_ms: DEFAULT_TIMEOUT_DURATION.as_millis() as u64,
            timeout_role: None,
            whitelist_role: None,
        }
    }
}

impl FlagConfig {
    /// Build a config from the `setconfig` inputs, where the duration is given in minutes.
    pub fn from_minutes(
        reaction_limit: u32,
        duration_minutes: u64,
        timeout_role: Option<u64>,
        whitelist_role: Option<u64>,
    ) -> anyhow::Result<Self> {
        let timeout_duration_ms = duration_minutes
            .checked_mul(60 * 1000)
            .ok_or_else(|| anyhow::anyhow!("timeout duration overflows milliseconds"))?;

        let config = Self {
            reaction_limit,
            timeout_duration_ms,
            timeout_role,
            whitelist_role,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.reaction_limit >= 1, "reaction limit must be at least 1");
        anyhow::ensure!(
            self.timeout_duration_ms > 0,
            "timeout duration must be positive"
        );
        Ok(())
    }

    pub fn timeout_duration(&self) -> Duration {
        Duration::from_millis(self.timeout_duration_ms)
    }
}

/// Raw `guild_flag_config` row; ids are signed in PostgreSQL.
#[derive(Debug, Clone, FromRow)]
pub struct FlagConfigRow {
    pub reaction_limit: i32,
    pub timeout_duration_ms: i64,
    pub timeout_role_id: Option<i64>,
    pub whitelist_role_id: Option<i64>,
}

impl TryFrom<FlagConfigRow> for FlagConfig {
    type Error = anyhow::Error;

    fn try_from(row: FlagConfigRow) -> Result<Self, Self::Error> {
        use anyhow::Context as _;

        Ok(Self {
            reaction_limit: u32::try_from(row.reaction_limit)
                .context("reaction_limit out of u32 range")?,
            timeout_duration_ms: u64::try_from(row.timeout_duration_ms)
                .context("timeout_duration_ms out of u64 range")?,
            timeout_role: row
                .timeout_role_id
                .map(u64::try_from)
                .transpose()
                .context("timeout_role_id out of u64 range")?,
            whitelist_role: row
                .whitelist_role_id
                .map(u64::try_from)
                .transpose()
                .context("whitelist_role_id out of u64 range")?,
        })
    }
}

/// Optional snowflake ids as JSON strings, since they overflow JS numbers.
mod snowflake {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<u64>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(id) => serializer.serialize_str(&id.to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer)?
            .filter(|raw| !raw.is_empty())
            .map(|raw| raw.parse::<u64>().map_err(serde::de::Error::custom))
            .transpose()
    }
}
