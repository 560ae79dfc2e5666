use poise::serenity_prelude as serenity;

use flagwatch_database::FlagConfig;
use flagwatch_engine::SanctionRecord;
use flagwatch_utils::embed::field_embed;
use flagwatch_utils::formatting::{format_compact_duration, format_role, format_roles, truncate_chars};

/// Discord caps embed descriptions at 4096 characters.
const EMBED_DESCRIPTION_LIMIT: usize = 4096;

pub fn guild_only_message() -> &'static str {
    "This command only works in servers."
}

pub fn usage_message(usage: &str) -> String {
    format!("Usage: `{usage}`")
}

pub fn flag_config_embed(title: &str, config: &FlagConfig) -> serenity::CreateEmbed {
    field_embed(
        title,
        [
            ("Reaction Limit", config.reaction_limit.to_string()),
            (
                "Timeout Duration",
                format_compact_duration(config.timeout_duration().as_secs()),
            ),
            ("Timeout Role", format_role(config.timeout_role)),
            ("Whitelist Role", format_role(config.whitelist_role)),
        ],
    )
}

pub fn pending_description(pending: &[(u64, SanctionRecord)]) -> String {
    if pending.is_empty() {
        return "No flag sanctions are pending.".to_owned();
    }

    let lines = pending
        .iter()
        .map(|(user_id, record)| {
            let restores = if record.roles_swapped {
                format_roles(&record.original_roles)
            } else {
                "roles untouched".to_owned()
            };
            format!(
                "<@{user_id}> ends <t:{}:R> ({}) · {restores}",
                record.expires_at,
                format_compact_duration(record.duration.as_secs()),
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    truncate_chars(&lines, EMBED_DESCRIPTION_LIMIT)
}
