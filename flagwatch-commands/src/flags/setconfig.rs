use poise::serenity_prelude as serenity;
use tracing::info;

use crate::CommandMeta;
use crate::flags::embeds::{flag_config_embed, guild_only_message};
use flagwatch_core::{Context, Error};
use flagwatch_database::{ConfigStore, FlagConfig};
use flagwatch_utils::permissions::has_user_permission;

pub const META: CommandMeta = CommandMeta {
    name: "setconfig",
    desc: "Set the flag threshold, timeout length and roles for this server.",
    category: "flags",
    usage: "!setconfig <limit> <minutes> [timeout_role] [whitelist_role]",
};

pub const MAX_REACTION_LIMIT: u32 = 1_000;
/// Discord refuses timeouts longer than 28 days.
pub const MAX_TIMEOUT_MINUTES: u64 = 28 * 24 * 60;

#[poise::command(
    prefix_command,
    slash_command,
    category = "Flags",
    default_member_permissions = "MANAGE_GUILD"
)]
pub async fn setconfig(
    ctx: Context<'_>,
    #[description = "Number of ⚠️ reactions that trigger a timeout"] limit: u32,
    #[description = "Timeout duration in minutes"] duration: u64,
    #[description = "Role that replaces the member's roles while timed out"]
    timeoutrole: Option<serenity::Role>,
    #[description = "Members with this role are never flagged"]
    whitelistrole: Option<serenity::Role>,
) -> Result<(), Error> {
    let Some(guild_id) = ctx.guild_id() else {
        ctx.say(guild_only_message()).await?;
        return Ok(());
    };

    if !has_user_permission(
        ctx.http(),
        guild_id,
        ctx.author().id,
        serenity::Permissions::MANAGE_GUILD,
    )
    .await?
    {
        return Ok(());
    }

    if let Some(problem) = validate_inputs(limit, duration) {
        ctx.say(problem).await?;
        return Ok(());
    }

    let config = FlagConfig::from_minutes(
        limit,
        duration,
        timeoutrole.map(|role| role.id.get()),
        whitelistrole.map(|role| role.id.get()),
    )?;
    ctx.data().config.set(guild_id.get(), config.clone()).await?;

    info!(
        guild_id = guild_id.get(),
        author_id = ctx.author().id.get(),
        reaction_limit = config.reaction_limit,
        timeout_ms = config.timeout_duration_ms,
        "flag config updated"
    );

    ctx.send(
        poise::CreateReply::default()
            .content("Configuration updated.")
            .embed(flag_config_embed("Flag Configuration", &config)),
    )
    .await?;
    Ok(())
}

fn validate_inputs(limit: u32, minutes: u64) -> Option<String> {
    if !(1..=MAX_REACTION_LIMIT).contains(&limit) {
        return Some(format!(
            "The reaction limit must be between 1 and {MAX_REACTION_LIMIT}."
        ));
    }

    if !(1..=MAX_TIMEOUT_MINUTES).contains(&minutes) {
        return Some(format!(
            "The timeout duration must be between 1 and {MAX_TIMEOUT_MINUTES} minutes."
        ));
    }

    None
}
