use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use poise::serenity_prelude as serenity;
use tracing::error;

use flagwatch_utils::formatting::format_incident_report;

/// Guild label used when a failure cannot be tied to a guild.
pub const UNKNOWN_TENANT: &str = "Unknown";

pub fn tenant_label(guild_id: Option<u64>) -> String {
    guild_id.map_or_else(|| UNKNOWN_TENANT.to_owned(), |id| id.to_string())
}

/// Best-effort destination for operational failures.
///
/// Implementations must never fail or panic: losing a report is acceptable,
/// disturbing the caller is not.
#[async_trait]
pub trait ErrorSink: Send + Sync + fmt::Debug {
    async fn report(&self, guild_id: Option<u64>, message: &str, detail: &str);

    /// Report an error with its full context chain as the detail.
    async fn report_error(&self, guild_id: Option<u64>, source: &anyhow::Error) {
        self.report(guild_id, &source.to_string(), &format!("{source:?}"))
            .await;
    }
}

/// Sink used when no report channel is configured: the local log only.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogErrorSink;

#[async_trait]
impl ErrorSink for LogErrorSink {
    async fn report(&self, guild_id: Option<u64>, message: &str, detail: &str) {
        error!(guild = %tenant_label(guild_id), error = message, detail, "incident");
    }
}

/// Forwards incident reports to a fixed administrative channel.
#[derive(Clone)]
pub struct DiscordErrorSink {
    http: Arc<serenity::Http>,
    channel_id: serenity::ChannelId,
}

impl DiscordErrorSink {
    pub fn new(http: Arc<serenity::Http>, channel_id: u64) -> Self {
        Self {
            http,
            channel_id: serenity::ChannelId::new(channel_id),
        }
    }
}

impl fmt::Debug for DiscordErrorSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscordErrorSink")
            .field("channel_id", &self.channel_id)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ErrorSink for DiscordErrorSink {
    async fn report(&self, guild_id: Option<u64>, message: &str, detail: &str) {
        let guild = tenant_label(guild_id);
        error!(%guild, error = message, "incident");

        let content = format_incident_report(&guild, message, detail);
        if let Err(source) = self
            .channel_id
            .send_message(
                self.http.as_ref(),
                serenity::CreateMessage::new().content(content),
            )
            .await
        {
            error!(?source, channel_id = %self.channel_id, "failed to forward error report");
        }
    }
}
