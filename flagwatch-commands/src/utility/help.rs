use poise::serenity_prelude as serenity;

use crate::utility::embeds::{grouped_help_description, unknown_command_message};
use crate::{COMMANDS, CommandMeta};
use flagwatch_core::{Context, Error};
use flagwatch_utils::COMMAND_PREFIX;
use flagwatch_utils::embed::DEFAULT_EMBED_COLOR;

pub const META: CommandMeta = CommandMeta {
    name: "help",
    desc: "Lists out all available commands, or shows how to use one.",
    category: "utility",
    usage: "!help [command]",
};

#[poise::command(prefix_command, slash_command, category = "Utility")]
pub async fn help(
    ctx: Context<'_>,
    #[description = "Command name"] command: Option<String>,
) -> Result<(), Error> {
    if let Some(raw_name) = command.as_deref().map(str::trim).filter(|raw| !raw.is_empty()) {
        let lookup = raw_name
            .trim_start_matches(COMMAND_PREFIX)
            .to_ascii_lowercase();
        let reply = match COMMANDS.iter().find(|command| command.name == lookup) {
            Some(command) => format!("{}\nUsage: `{}`", command.desc, command.usage),
            None => unknown_command_message(&lookup),
        };
        ctx.say(reply).await?;
        return Ok(());
    }

    let embed = serenity::CreateEmbed::new()
        .title("Available Commands")
        .color(DEFAULT_EMBED_COLOR)
        .description(grouped_help_description(&sorted_commands()));

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

fn sorted_commands() -> Vec<&'static CommandMeta> {
    let mut sorted = COMMANDS.iter().collect::<Vec<_>>();
    sorted.sort_unstable_by(|left, right| {
        left.category
            .cmp(right.category)
            .then_with(|| left.name.cmp(right.name))
    });
    sorted
}
