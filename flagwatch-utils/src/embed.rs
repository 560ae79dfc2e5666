use poise::serenity_prelude as serenity;

/// Default embed color used across the bot UI.
pub const DEFAULT_EMBED_COLOR: u32 = 0xD9_8C_1F;

/// Titled embed with the default color and a `**Field :** value` body.
pub fn field_embed<'a>(
    title: &str,
    fields: impl IntoIterator<Item = (&'a str, String)>,
) -> serenity::CreateEmbed {
    let description = fields
        .into_iter()
        .map(|(name, value)| format!("**{name} :** {value}"))
        .collect::<Vec<_>>()
        .join("\n");

    serenity::CreateEmbed::new()
        .title(title.to_owned())
        .color(DEFAULT_EMBED_COLOR)
        .description(description)
}
