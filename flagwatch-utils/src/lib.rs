/// Generic embed builders shared across commands.
pub mod embed;
/// Shared formatting helpers (durations, role mentions, incident reports).
pub mod formatting;
/// Single source of truth for the message-command prefix.
pub const COMMAND_PREFIX: char = '!';
/// Permission helper utilities.
pub mod permissions;
/// Shared time helpers.
pub mod time;
