use poise::serenity_prelude as serenity;

use crate::CommandMeta;
use crate::flags::embeds::{flag_config_embed, guild_only_message};
use flagwatch_core::{Context, Error};
use flagwatch_database::ConfigStore;
use flagwatch_utils::permissions::has_user_permission;

pub const META: CommandMeta = CommandMeta {
    name: "flagconfig",
    desc: "Show this server's flag settings.",
    category: "flags",
    usage: "!flagconfig",
};

#[poise::command(
    prefix_command,
    slash_command,
    category = "Flags",
    default_member_permissions = "MANAGE_GUILD"
)]
pub async fn flagconfig(ctx: Context<'_>) -> Result<(), Error> {
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

    let config = ctx.data().config.get(guild_id.get()).await?;
    ctx.send(poise::CreateReply::default().embed(flag_config_embed("Flag Configuration", &config)))
        .await?;
    Ok(())
}
