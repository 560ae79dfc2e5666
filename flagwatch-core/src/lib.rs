use std::sync::Arc;

use flagwatch_database::ConfigStore;
use flagwatch_engine::{ErrorSink, ModerationEngine};

pub type Error = anyhow::Error;

#[derive(Clone, Debug)]
pub struct Data {
    pub config: Arc<dyn ConfigStore>,
    pub moderation: ModerationEngine,
    pub errors: Arc<dyn ErrorSink>,
}

impl Data {
    /// Commands and flag events share the engine's store and sink.
    pub fn new(moderation: ModerationEngine) -> Self {
        Self {
            config: Arc::clone(moderation.store()),
            errors: Arc::clone(moderation.sink()),
            moderation,
        }
    }
}

pub type Context<'a> = poise::Context<'a, Data, Error>;
