use std::env;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::Context as _;

use flagwatch_engine::RetriggerPolicy;

const DEFAULT_CONFIG_FILE: &str = "configs.json";
const DEFAULT_REDIS_KEY_PREFIX: &str = "flagwatch:prod";

/// Where guild flag configs live.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfigBackend {
    Postgres { database_url: String },
    File { path: PathBuf },
    /// Lost on restart.
    Memory,
}

#[derive(Clone, Debug)]
pub struct Settings {
    pub token: Option<String>,
    /// Commands are registered in this guild only; globally when unset.
    pub guild_id: Option<u64>,
    pub backend: ConfigBackend,
    pub auto_run_migrations: bool,
    pub redis_enabled: bool,
    pub redis_url: Option<String>,
    pub redis_key_prefix: String,
    pub error_report_channel_id: Option<u64>,
    pub retrigger: RetriggerPolicy,
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };

        let database_url = var("DATABASE_URL");
        let backend = match var("CONFIG_BACKEND").map(|raw| raw.to_ascii_lowercase()) {
            Some(kind) if kind == "postgres" => ConfigBackend::Postgres {
                database_url: database_url
                    .context("CONFIG_BACKEND=postgres requires DATABASE_URL")?,
            },
            Some(kind) if kind == "file" => ConfigBackend::File {
                path: config_file(&var),
            },
            Some(kind) if kind == "memory" => ConfigBackend::Memory,
            Some(other) => {
                anyhow::bail!("unknown CONFIG_BACKEND `{other}` (expected postgres|file|memory)")
            }
            None => match database_url {
                Some(database_url) => ConfigBackend::Postgres { database_url },
                None => ConfigBackend::File {
                    path: config_file(&var),
                },
            },
        };

        Ok(Self {
            token: var("DISCORD_TOKEN"),
            guild_id: env_id(&var, "DISCORD_GUILD_ID")?,
            backend,
            auto_run_migrations: env_bool(&var, "AUTO_RUN_MIGRATIONS", true),
            redis_enabled: env_bool(&var, "REDIS_ENABLED", false),
            redis_url: var("REDIS_URL"),
            redis_key_prefix: var("REDIS_KEY_PREFIX")
                .unwrap_or_else(|| DEFAULT_REDIS_KEY_PREFIX.to_owned()),
            error_report_channel_id: env_id(&var, "ERROR_REPORT_CHANNEL_ID")?,
            retrigger: var("FLAG_RETRIGGER")
                .map(|raw| raw.parse::<RetriggerPolicy>())
                .transpose()?
                .unwrap_or_default(),
        })
    }
}

fn config_file(var: &impl Fn(&str) -> Option<String>) -> PathBuf {
    var("CONFIG_FILE")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

fn env_bool(var: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    match var(key) {
        Some(value) => matches!(
            value.to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        None => default,
    }
}

fn env_id(var: &impl Fn(&str) -> Option<String>, key: &str) -> anyhow::Result<Option<u64>> {
    var(key)
        .map(|raw| {
            raw.parse::<u64>()
                .with_context(|| format!("{key} must be a numeric Discord id"))
        })
        .transpose()
}

/// Use the configured token, or ask for one on the terminal.
pub async fn resolve_token(configured: Option<String>) -> anyhow::Result<String> {
    if let Some(token) = configured {
        return Ok(token);
    }

    let token = tokio::task::spawn_blocking(|| -> anyhow::Result<String> {
        let mut stdout = io::stdout();
        write!(stdout, "Enter your Discord bot token: ")?;
        stdout.flush()?;

        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        Ok(line.trim().to_owned())
    })
    .await??;

    anyhow::ensure!(!token.is_empty(), "no Discord token provided");
    Ok(token)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::PathBuf;

    use flagwatch_engine::RetriggerPolicy;

    use super::{ConfigBackend, Settings};

    fn settings(pairs: &[(&str, &str)]) -> anyhow::Result<Settings> {
        let vars = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect::<HashMap<_, _>>();
        Settings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_to_the_json_file() {
        let settings = settings(&[]).unwrap();

        assert_eq!(
            settings.backend,
            ConfigBackend::File {
                path: PathBuf::from("configs.json")
            }
        );
        assert_eq!(settings.token, None);
        assert_eq!(settings.guild_id, None);
        assert!(settings.auto_run_migrations);
        assert!(!settings.redis_enabled);
        assert_eq!(settings.redis_key_prefix, "flagwatch:prod");
        assert_eq!(settings.retrigger, RetriggerPolicy::Ignore);
    }

    #[test]
    fn database_url_selects_postgres() {
        let settings = settings(&[("DATABASE_URL", "postgres://localhost/flags")]).unwrap();

        assert_eq!(
            settings.backend,
            ConfigBackend::Postgres {
                database_url: "postgres://localhost/flags".to_owned()
            }
        );
    }

    #[test]
    fn explicit_backend_wins() {
        let settings = settings(&[
            ("DATABASE_URL", "postgres://localhost/flags"),
            ("CONFIG_BACKEND", "Memory"),
        ])
        .unwrap();
        assert_eq!(settings.backend, ConfigBackend::Memory);

        let settings = settings_with_file();
        assert_eq!(
            settings.backend,
            ConfigBackend::File {
                path: PathBuf::from("/var/lib/flagwatch/configs.json")
            }
        );
    }

    fn settings_with_file() -> Settings {
        settings(&[
            ("CONFIG_BACKEND", "file"),
            ("CONFIG_FILE", "/var/lib/flagwatch/configs.json"),
        ])
        .unwrap()
    }

    #[test]
    fn postgres_backend_needs_a_url() {
        assert!(settings(&[("CONFIG_BACKEND", "postgres")]).is_err());
        assert!(settings(&[("CONFIG_BACKEND", "sqlite")]).is_err());
    }

    #[test]
    fn parses_ids_flags_and_policy() {
        let settings = settings(&[
            ("DISCORD_TOKEN", " secret "),
            ("DISCORD_GUILD_ID", "123"),
            ("ERROR_REPORT_CHANNEL_ID", "456"),
            ("AUTO_RUN_MIGRATIONS", "off"),
            ("REDIS_ENABLED", "yes"),
            ("FLAG_RETRIGGER", "refresh"),
        ])
        .unwrap();

        assert_eq!(settings.token.as_deref(), Some("secret"));
        assert_eq!(settings.guild_id, Some(123));
        assert_eq!(settings.error_report_channel_id, Some(456));
        assert!(!settings.auto_run_migrations);
        assert!(settings.redis_enabled);
        assert_eq!(settings.retrigger, RetriggerPolicy::Refresh);
    }

    #[test]
    fn rejects_malformed_ids() {
        assert!(settings(&[("DISCORD_GUILD_ID", "my-server")]).is_err());
        assert!(settings(&[("FLAG_RETRIGGER", "extend")]).is_err());
    }
}
