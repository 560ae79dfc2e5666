use poise::serenity_prelude as serenity;
use tracing::info;

use crate::CommandMeta;
use crate::flags::embeds::guild_only_message;
use flagwatch_core::{Context, Error};
use flagwatch_database::ConfigStore;
use flagwatch_utils::permissions::has_user_permission;

pub const META: CommandMeta = CommandMeta {
    name: "resetconfig",
    desc: "Reset this server's flag settings to the defaults.",
    category: "flags",
    usage: "!resetconfig",
};

/// Pending sanctions keep running with the values they were applied with.
#[poise::command(
    prefix_command,
    slash_command,
    category = "Flags",
    default_member_permissions = "MANAGE_GUILD"
)]
pub async fn resetconfig(ctx: Context<'_>) -> Result<(), Error> {
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

    ctx.data().config.reset(guild_id.get()).await?;
    info!(
        guild_id = guild_id.get(),
        author_id = ctx.author().id.get(),
        "flag config reset"
    );

    ctx.say("Configuration settings have been reset to default values.")
        .await?;
    Ok(())
}
