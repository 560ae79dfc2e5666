use poise::serenity_prelude as serenity;

use crate::CommandMeta;
use crate::flags::embeds::{guild_only_message, pending_description};
use flagwatch_core::{Context, Error};
use flagwatch_utils::embed::DEFAULT_EMBED_COLOR;
use flagwatch_utils::permissions::has_user_permission;

pub const META: CommandMeta = CommandMeta {
    name: "pending",
    desc: "List members whose flag timeout has not been lifted yet.",
    category: "flags",
    usage: "!pending",
};

#[poise::command(
    prefix_command,
    slash_command,
    category = "Flags",
    default_member_permissions = "MODERATE_MEMBERS"
)]
pub async fn pending(ctx: Context<'_>) -> Result<(), Error> {
    let Some(guild_id) = ctx.guild_id() else {
        ctx.say(guild_only_message()).await?;
        return Ok(());
    };

    if !has_user_permission(
        ctx.http(),
        guild_id,
        ctx.author().id,
        serenity::Permissions::MODERATE_MEMBERS,
    )
    .await?
    {
        return Ok(());
    }

    let pending = ctx.data().moderation.pending(guild_id.get()).await;
    let embed = serenity::CreateEmbed::new()
        .title(format!("Pending Flag Sanctions ({})", pending.len()))
        .color(DEFAULT_EMBED_COLOR)
        .description(pending_description(&pending));

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}
