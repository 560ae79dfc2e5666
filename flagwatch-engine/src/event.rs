/// The marker reaction that counts as a flag.
pub const FLAG_EMOJI: &str = "\u{26A0}\u{FE0F}";

/// Whether a unicode reaction is the flag marker.
///
/// Some clients send the bare warning sign without the emoji variation
/// selector, so both spellings count.
pub fn is_flag_emoji(name: &str) -> bool {
    name.trim_end_matches('\u{FE0F}') == "\u{26A0}"
}

/// A normalized "member was flagged" signal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlagEvent {
    pub guild_id: u64,
    pub channel_id: u64,
    pub message_id: u64,
    /// Author of the flagged message, i.e. the member facing the sanction.
    pub target_user_id: u64,
    /// Current aggregate count of the flag reaction on the message.
    pub flag_count: u64,
    pub target_is_bot: bool,
    pub reactor_is_bot: bool,
}
