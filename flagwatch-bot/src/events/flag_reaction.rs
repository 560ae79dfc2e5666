use poise::serenity_prelude as serenity;
use tracing::{debug, warn};

use flagwatch_core::Data;
use flagwatch_engine::{ErrorSink, FlagEvent, is_flag_emoji};

/// Turn a ⚠️ reaction into a [`FlagEvent`] and hand it to the engine.
pub async fn handle_flag_reaction(
    ctx: &serenity::Context,
    data: &Data,
    reaction: &serenity::Reaction,
) {
    let Some(guild_id) = reaction.guild_id else {
        return;
    };

    if !is_flag_reaction(&reaction.emoji) {
        return;
    }

    if reactor_is_bot(ctx, data, guild_id.get(), reaction).await {
        debug!(guild_id = guild_id.get(), "ignoring flag placed by a bot");
        return;
    }

    // The gateway event only carries the reactor; author and totals live on the message.
    let message = match reaction
        .channel_id
        .message(&ctx.http, reaction.message_id)
        .await
    {
        Ok(message) => message,
        Err(source) => {
            report_failure(data, guild_id.get(), source, "failed to fetch flagged message").await;
            return;
        }
    };

    let event = FlagEvent {
        guild_id: guild_id.get(),
        channel_id: reaction.channel_id.get(),
        message_id: message.id.get(),
        target_user_id: message.author.id.get(),
        flag_count: flag_count(&message.reactions),
        target_is_bot: message.author.bot,
        reactor_is_bot: false,
    };

    data.moderation.handle_flag(&event).await;
}

fn is_flag_reaction(emoji: &serenity::ReactionType) -> bool {
    matches!(emoji, serenity::ReactionType::Unicode(name) if is_flag_emoji(name))
}

/// Both spellings of the marker count toward the same total.
fn flag_count(reactions: &[serenity::MessageReaction]) -> u64 {
    reactions
        .iter()
        .filter(|reaction| is_flag_reaction(&reaction.reaction_type))
        .map(|reaction| reaction.count)
        .sum()
}

async fn reactor_is_bot(
    ctx: &serenity::Context,
    data: &Data,
    guild_id: u64,
    reaction: &serenity::Reaction,
) -> bool {
    if let Some(member) = reaction.member.as_ref() {
        return member.user.bot;
    }

    let Some(user_id) = reaction.user_id else {
        return false;
    };

    match user_id.to_user(ctx).await {
        Ok(user) => user.bot,
        Err(source) => {
            report_failure(data, guild_id, source, "failed to resolve reacting user").await;
            false
        }
    }
}

async fn report_failure(data: &Data, guild_id: u64, source: serenity::Error, what: &'static str) {
    warn!(?source, guild_id, "{what}");
    let source = anyhow::Error::new(source).context(what);
    data.errors.report_error(Some(guild_id), &source).await;
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use poise::serenity_prelude as serenity;

    use flagwatch_core::Data;
    use flagwatch_database::MemoryConfigStore;
    use flagwatch_engine::{ErrorSink, ModerationEngine, RetriggerPolicy, SerenityGateway};

    use super::{is_flag_reaction, report_failure};

    #[derive(Debug, Default)]
    struct RecordingSink {
        reports: Mutex<Vec<(Option<u64>, String)>>,
    }

    #[async_trait]
    impl ErrorSink for RecordingSink {
        async fn report(&self, guild_id: Option<u64>, message: &str, _detail: &str) {
            self.reports
                .lock()
                .unwrap()
                .push((guild_id, message.to_owned()));
        }
    }

    #[tokio::test]
    async fn fetch_failures_reach_the_error_sink() {
        let sink = Arc::new(RecordingSink::default());
        let data = Data::new(ModerationEngine::new(
            Arc::new(MemoryConfigStore::new()),
            Arc::new(SerenityGateway::new(Arc::new(serenity::Http::new("")))),
            sink.clone(),
            RetriggerPolicy::Ignore,
        ));

        report_failure(
            &data,
            5,
            serenity::Error::Other("unknown message"),
            "failed to fetch flagged message",
        )
        .await;

        assert_eq!(
            *sink.reports.lock().unwrap(),
            vec![(Some(5), "failed to fetch flagged message".to_owned())]
        );
    }

    #[test]
    fn matches_both_marker_spellings() {
        assert!(is_flag_reaction(&serenity::ReactionType::Unicode(
            "\u{26A0}\u{FE0F}".to_owned()
        )));
        assert!(is_flag_reaction(&serenity::ReactionType::Unicode(
            "\u{26A0}".to_owned()
        )));
    }

    #[test]
    fn ignores_other_emoji() {
        assert!(!is_flag_reaction(&serenity::ReactionType::Unicode(
            "👍".to_owned()
        )));
        assert!(!is_flag_reaction(&serenity::ReactionType::Custom {
            animated: false,
            id: serenity::EmojiId::new(1),
            name: Some("warning".to_owned()),
        }));
    }
}
