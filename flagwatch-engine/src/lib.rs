//! Reaction-driven moderation engine.
//!
//! A [`FlagEvent`] flows through [`ModerationEngine::handle_flag`]: the
//! guild's [`FlagConfig`](flagwatch_database::FlagConfig) is loaded, the
//! target is checked by the [`eligibility`] filter, the sanction is applied
//! through a [`MemberGateway`], and the [`ReversalScheduler`] restores the
//! captured roles once the timeout elapses. Failures go to an [`ErrorSink`].

pub mod eligibility;
pub mod engine;
pub mod error_sink;
pub mod event;
pub mod gateway;
pub mod locks;
pub mod scheduler;

#[cfg(test)]
mod test_support;

pub use eligibility::{Eligibility, eligible};
pub use engine::{FlagOutcome, ModerationEngine, ReleaseOutcome, RetriggerPolicy};
pub use error_sink::{DiscordErrorSink, ErrorSink, LogErrorSink, UNKNOWN_TENANT};
pub use event::{FLAG_EMOJI, FlagEvent, is_flag_emoji};
pub use gateway::{MemberGateway, MemberSnapshot, SerenityGateway};
pub use locks::{MemberLocks, SanctionKey};
pub use scheduler::{ReversalScheduler, ReversalState, SanctionRecord};
