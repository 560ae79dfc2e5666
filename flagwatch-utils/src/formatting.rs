/// Discord rejects messages longer than this many characters.
pub const DISCORD_MESSAGE_LIMIT: usize = 2000;

/// Format seconds into a compact human-readable duration (e.g. 59s, 10m, 1h 30m, 1d 2h).
pub fn format_compact_duration(total_seconds: u64) -> String {
    let units = [
        (total_seconds / 86_400, 'd'),
        ((total_seconds % 86_400) / 3_600, 'h'),
        ((total_seconds % 3_600) / 60, 'm'),
        (total_seconds % 60, 's'),
    ];

    let parts = units
        .iter()
        .filter(|(value, _)| *value > 0)
        .map(|(value, unit)| format!("{value}{unit}"))
        .collect::<Vec<_>>();

    if parts.is_empty() {
        "0s".to_owned()
    } else {
        parts.join(" ")
    }
}

/// Render an optional role as a mention, or `None`.
pub fn format_role(role_id: Option<u64>) -> String {
    match role_id {
        Some(id) => format!("<@&{id}>"),
        None => "None".to_owned(),
    }
}

/// Render a set of roles as mentions; an empty set is `No roles`.
pub fn format_roles<'a>(role_ids: impl IntoIterator<Item = &'a u64>) -> String {
    let mentions = role_ids
        .into_iter()
        .map(|id| format!("<@&{id}>"))
        .collect::<Vec<_>>();

    if mentions.is_empty() {
        "No roles".to_owned()
    } else {
        mentions.join(", ")
    }
}

/// Build the incident text posted to the error report channel.
///
/// The detail block is shortened so the whole message fits in one Discord
/// message, and fence markers inside it are defused.
pub fn format_incident_report(guild_label: &str, message: &str, detail: &str) -> String {
    let header = format!("Guild ID: {guild_label}\nError: {message}\nStack Trace:\n```");
    let footer = "```";
    let detail = detail.replace("```", "'''");

    let budget = DISCORD_MESSAGE_LIMIT.saturating_sub(header.chars().count() + footer.len());
    let detail = truncate_chars(&detail, budget);

    format!("{header}{detail}{footer}")
}

/// Cut `text` to at most `max_chars` characters, marking the cut with `…`.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_owned();
    }

    if max_chars == 0 {
        return String::new();
    }

    let mut truncated = text.chars().take(max_chars - 1).collect::<String>();
    truncated.push('…');
    truncated
}
