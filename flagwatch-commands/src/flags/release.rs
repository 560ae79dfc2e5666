use poise::serenity_prelude as serenity;
use tracing::info;

use crate::CommandMeta;
use crate::flags::embeds::{guild_only_message, usage_message};
use flagwatch_core::{Context, Error};
use flagwatch_engine::ReleaseOutcome;
use flagwatch_utils::permissions::has_user_permission;

pub const META: CommandMeta = CommandMeta {
    name: "release",
    desc: "End a member's flag timeout early and give their roles back.",
    category: "flags",
    usage: "!release <user>",
};

#[poise::command(
    prefix_command,
    slash_command,
    category = "Flags",
    default_member_permissions = "MODERATE_MEMBERS"
)]
pub async fn release(
    ctx: Context<'_>,
    #[description = "The flagged member"] user: Option<serenity::User>,
) -> Result<(), Error> {
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

    let Some(user) = user else {
        ctx.say(usage_message(META.usage)).await?;
        return Ok(());
    };

    let outcome = ctx
        .data()
        .moderation
        .release(guild_id.get(), user.id.get())
        .await?;

    info!(
        guild_id = guild_id.get(),
        user_id = user.id.get(),
        author_id = ctx.author().id.get(),
        ?outcome,
        "release requested"
    );
    ctx.say(release_message(user.id.get(), outcome)).await?;
    Ok(())
}

fn release_message(user_id: u64, outcome: ReleaseOutcome) -> String {
    match outcome {
        ReleaseOutcome::NotSanctioned => {
            format!("<@{user_id}> has no pending flag timeout.")
        }
        ReleaseOutcome::Released {
            roles_restored: true,
        } => format!("Released <@{user_id}> and restored their roles."),
        ReleaseOutcome::Released {
            roles_restored: false,
        } => format!("Released <@{user_id}>."),
    }
}
