mod events;
mod panic_report;
mod settings;

use std::sync::Arc;

use poise::serenity_prelude as serenity;
use tracing::{debug, error, info, warn};
use tracing_subscriber::Layer;
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use rustls::crypto::ring::default_provider;

use flagwatch_core::{Data, Error};
use flagwatch_database::{
    CacheService, ConfigStore, Database, JsonFileConfigStore, MemoryConfigStore,
};
use flagwatch_engine::{
    DiscordErrorSink, ErrorSink, LogErrorSink, ModerationEngine, SerenityGateway,
};

use settings::{ConfigBackend, Settings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let fmt_layer = tracing_subscriber::fmt::layer().with_filter(filter_fn(|metadata| {
        let target = metadata.target();

        let within_info_level = *metadata.level() <= tracing::Level::INFO;
        if !within_info_level {
            return false;
        }

        !(target.starts_with("serenity::gateway::bridge::shard_manager")
            || target.starts_with("serenity::gateway::bridge::shard_runner"))
    }));

    tracing_subscriber::registry().with(fmt_layer).init();

    default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls ring provider"))?;

    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let token = settings::resolve_token(settings.token.clone()).await?;
    let store = open_config_store(&settings).await?;
    info!(
        retrigger = ?settings.retrigger,
        error_channel = ?settings.error_report_channel_id,
        "Flag moderation configured."
    );

    let intents = serenity::GatewayIntents::GUILDS
        | serenity::GatewayIntents::GUILD_MESSAGES
        | serenity::GatewayIntents::GUILD_MESSAGE_REACTIONS
        | serenity::GatewayIntents::GUILD_MEMBERS;

    let guild_id = settings.guild_id;
    let error_report_channel_id = settings.error_report_channel_id;
    let retrigger = settings.retrigger;

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: flagwatch_commands::commands(),
            event_handler: |ctx, event, framework, data| {
                Box::pin(handle_event(ctx, event, framework, data))
            },
            on_error: |error| Box::pin(on_error(error)),
            prefix_options: poise::PrefixFrameworkOptions {
                prefix: Some(flagwatch_utils::COMMAND_PREFIX.to_string()),
                mention_as_prefix: false,
                ..Default::default()
            },
            ..Default::default()
        })
        .setup(move |ctx, ready, framework| {
            let store = Arc::clone(&store);
            Box::pin(async move {
                info!(user = %ready.user.name, "Flagwatch is online.");

                let http = Arc::clone(&ctx.http);
                let sink: Arc<dyn ErrorSink> = match error_report_channel_id {
                    Some(channel_id) => Arc::new(DiscordErrorSink::new(Arc::clone(&http), channel_id)),
                    None => {
                        warn!("ERROR_REPORT_CHANNEL_ID is not set; incidents are only logged.");
                        Arc::new(LogErrorSink)
                    }
                };
                panic_report::install(Arc::clone(&sink), tokio::runtime::Handle::current());

                let gateway = Arc::new(SerenityGateway::new(http));
                let moderation = ModerationEngine::new(store, gateway, sink, retrigger);

                match guild_id {
                    Some(guild_id) => {
                        poise::builtins::register_in_guild(
                            ctx,
                            &framework.options().commands,
                            serenity::GuildId::new(guild_id),
                        )
                        .await?;
                        info!(guild_id, "Commands registered in guild.");
                    }
                    None => {
                        poise::builtins::register_globally(ctx, &framework.options().commands)
                            .await?;
                        info!("Commands registered globally.");
                    }
                }

                Ok(Data::new(moderation))
            })
        })
        .build();

    info!("Flagwatch is connecting...");

    let mut client = serenity::ClientBuilder::new(token, intents)
        .framework(framework)
        .await?;

    client.start().await?;
    Ok(())
}

async fn open_config_store(settings: &Settings) -> anyhow::Result<Arc<dyn ConfigStore>> {
    match &settings.backend {
        ConfigBackend::Postgres { database_url } => {
            let cache = open_cache(settings).await;
            let db = Database::connect(database_url, cache).await?;

            if settings.auto_run_migrations {
                db.run_migrations().await?;
            } else {
                info!("Auto migrations disabled (set AUTO_RUN_MIGRATIONS=true to run at startup).");
            }

            Ok(Arc::new(db))
        }
        ConfigBackend::File { path } => {
            let store = JsonFileConfigStore::open(path.clone()).await?;
            Ok(Arc::new(store))
        }
        ConfigBackend::Memory => {
            warn!("Using the in-memory config store; settings are lost on restart.");
            Ok(Arc::new(MemoryConfigStore::new()))
        }
    }
}

async fn open_cache(settings: &Settings) -> CacheService {
    let prefix = settings.redis_key_prefix.clone();

    if !settings.redis_enabled {
        info!("Redis cache disabled (set REDIS_ENABLED=true to enable).");
        return CacheService::disabled(prefix);
    }

    let Some(redis_url) = settings.redis_url.as_deref() else {
        warn!(key_prefix = %prefix, "REDIS_ENABLED=true but REDIS_URL is missing; continuing with DB-only mode.");
        return CacheService::disabled(prefix);
    };

    let cache = match CacheService::redis(redis_url, prefix.clone()) {
        Ok(cache) => {
            info!(key_prefix = %prefix, "Redis cache enabled.");
            cache
        }
        Err(err) => {
            warn!(?err, key_prefix = %prefix, "Failed to initialize Redis cache; continuing with DB-only mode.");
            return CacheService::disabled(prefix);
        }
    };

    if let Err(err) = cache.ping().await {
        warn!(
            ?err,
            "Redis cache ping failed; cache operations will continue with fallback behavior."
        );
    } else {
        info!("Redis cache health check passed.");
    }

    cache
}

async fn on_error(error: poise::FrameworkError<'_, Data, Error>) {
    match error {
        poise::FrameworkError::Command { error, ctx, .. } => {
            error!(?error, command = %ctx.command().qualified_name, "command error");
            ctx.data()
                .errors
                .report_error(ctx.guild_id().map(|guild_id| guild_id.get()), &error)
                .await;

            let embed = serenity::CreateEmbed::new()
                .title("Command Error")
                .description("Something went wrong while running this command.")
                .color(flagwatch_utils::embed::DEFAULT_EMBED_COLOR);

            let _ = ctx
                .send(poise::CreateReply::default().ephemeral(true).embed(embed))
                .await;
        }
        poise::FrameworkError::ArgumentParse { ctx, input, .. } => {
            let usage = format!("Usage: `!{}`", ctx.command().qualified_name);
            let description = if let Some(input) = input {
                format!("Invalid argument: `{}`\n{}", input, usage)
            } else {
                format!("Missing required argument.\n{}", usage)
            };

            let _ = ctx.say(description).await;
        }
        poise::FrameworkError::EventHandler {
            error,
            event,
            framework,
            ..
        } => {
            error!(?error, event = event.snake_case_name(), "event handler error");
            framework
                .user_data
                .errors
                .report_error(event_guild_id(event), &error)
                .await;
        }
        poise::FrameworkError::UnknownCommand { .. } => {
            debug!("unknown command invocation");
        }
        other => {
            error!(?other, "framework error");
        }
    }
}

async fn handle_event(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    if let serenity::FullEvent::ReactionAdd { add_reaction } = event {
        events::flag_reaction::handle_flag_reaction(ctx, data, add_reaction).await;
    }

    Ok(())
}

/// Guild an event belongs to, for the events this bot listens to.
fn event_guild_id(event: &serenity::FullEvent) -> Option<u64> {
    let guild_id = match event {
        serenity::FullEvent::ReactionAdd { add_reaction } => add_reaction.guild_id,
        serenity::FullEvent::ReactionRemove { removed_reaction } => removed_reaction.guild_id,
        serenity::FullEvent::Message { new_message } => new_message.guild_id,
        serenity::FullEvent::GuildIntegrationsUpdate { guild_id } => Some(*guild_id),
        _ => None,
    };
    guild_id.map(|guild_id| guild_id.get())
}

#[cfg(test)]
mod tests {
    use poise::serenity_prelude as serenity;

    use super::event_guild_id;

    #[test]
    fn guild_scoped_events_carry_their_guild() {
        let event = serenity::FullEvent::GuildIntegrationsUpdate {
            guild_id: serenity::GuildId::new(42),
        };

        assert_eq!(event_guild_id(&event), Some(42));
    }

    #[test]
    fn other_events_have_no_guild() {
        let event = serenity::FullEvent::ReactionRemoveAll {
            channel_id: serenity::ChannelId::new(1),
            removed_from_message_id: serenity::MessageId::new(2),
        };

        assert_eq!(event_guild_id(&event), None);
    }
}
