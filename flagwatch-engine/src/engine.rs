use std::collections::BTreeSet;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Context as _;
use tracing::{debug, info, warn};

use flagwatch_database::{ConfigStore, FlagConfig};

use crate::eligibility::{self, Eligibility};
use crate::error_sink::ErrorSink;
use crate::event::FlagEvent;
use crate::gateway::{MemberGateway, MemberSnapshot};
use crate::locks::{MemberLocks, SanctionKey};
use crate::scheduler::{ReversalScheduler, SanctionRecord};

const RELEASE_REASON: &str = "Flag timeout released by a moderator";

/// What to do when a member who is already sanctioned is flagged again.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RetriggerPolicy {
    /// Leave the running sanction alone.
    #[default]
    Ignore,
    /// Re-apply the timeout and restart the reversal window, keeping the
    /// role snapshot from the first sanction.
    Refresh,
}

impl FromStr for RetriggerPolicy {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "ignore" => Ok(Self::Ignore),
            "refresh" => Ok(Self::Refresh),
            other => anyhow::bail!("unknown retrigger policy `{other}` (expected ignore|refresh)"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FlagOutcome {
    ReactorIsBot,
    ConfigUnavailable,
    BelowThreshold { count: u64, limit: u32 },
    TargetIsBot,
    MemberUnavailable,
    Whitelisted,
    AlreadySanctioned,
    Refreshed,
    Sanctioned { roles_swapped: bool },
    Failed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReleaseOutcome {
    NotSanctioned,
    Released { roles_restored: bool },
}

/// Turns flag events into sanctions and schedules their reversal.
#[derive(Clone, Debug)]
pub struct ModerationEngine {
    store: Arc<dyn ConfigStore>,
    gateway: Arc<dyn MemberGateway>,
    sink: Arc<dyn ErrorSink>,
    scheduler: ReversalScheduler,
    locks: Arc<MemberLocks>,
    retrigger: RetriggerPolicy,
}

impl ModerationEngine {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        gateway: Arc<dyn MemberGateway>,
        sink: Arc<dyn ErrorSink>,
        retrigger: RetriggerPolicy,
    ) -> Self {
        let locks = Arc::new(MemberLocks::new());
        let scheduler = ReversalScheduler::new(
            Arc::clone(&gateway),
            Arc::clone(&sink),
            Arc::clone(&locks),
        );

        Self {
            store,
            gateway,
            sink,
            scheduler,
            locks,
            retrigger,
        }
    }

    pub fn store(&self) -> &Arc<dyn ConfigStore> {
        &self.store
    }

    pub fn sink(&self) -> &Arc<dyn ErrorSink> {
        &self.sink
    }

    pub fn scheduler(&self) -> &ReversalScheduler {
        &self.scheduler
    }

    pub fn retrigger_policy(&self) -> RetriggerPolicy {
        self.retrigger
    }

    /// Evaluate one flag event and sanction the target if it crossed the threshold.
    pub async fn handle_flag(&self, event: &FlagEvent) -> FlagOutcome {
        let outcome = self.evaluate(event).await;
        debug!(
            guild_id = event.guild_id,
            message_id = event.message_id,
            user_id = event.target_user_id,
            flag_count = event.flag_count,
            ?outcome,
            "flag evaluated"
        );
        outcome
    }

    async fn evaluate(&self, event: &FlagEvent) -> FlagOutcome {
        if event.reactor_is_bot {
            return FlagOutcome::ReactorIsBot;
        }

        let config = match self.store.get(event.guild_id).await {
            Ok(config) => config,
            Err(source) => {
                let source = source.context("failed to load flag config");
                self.sink.report_error(Some(event.guild_id), &source).await;
                return FlagOutcome::ConfigUnavailable;
            }
        };

        if event.flag_count < u64::from(config.reaction_limit) {
            return FlagOutcome::BelowThreshold {
                count: event.flag_count,
                limit: config.reaction_limit,
            };
        }

        if event.target_is_bot {
            return FlagOutcome::TargetIsBot;
        }

        let key = SanctionKey::new(event.guild_id, event.target_user_id);
        let _guard = self.locks.lock(key).await;

        let member = match self
            .gateway
            .fetch_member(event.guild_id, event.target_user_id)
            .await
        {
            Ok(member) => member,
            Err(source) => {
                warn!(?source, ?key, "flagged member could not be resolved; dropping flag");
                return FlagOutcome::MemberUnavailable;
            }
        };

        match eligibility::check(&member, &config) {
            Eligibility::Eligible => {}
            Eligibility::Automated => return FlagOutcome::TargetIsBot,
            Eligibility::Whitelisted => return FlagOutcome::Whitelisted,
        }

        if let Some(pending) = self.scheduler.pending(key).await {
            return match self.retrigger {
                RetriggerPolicy::Ignore => FlagOutcome::AlreadySanctioned,
                RetriggerPolicy::Refresh => self.refresh(key, pending, &config, event).await,
            };
        }

        self.apply(key, member, &config, event).await
    }

    /// Snapshot, swap roles, time out, then register the reversal.
    ///
    /// Nothing is registered unless every platform call succeeded.
    async fn apply(
        &self,
        key: SanctionKey,
        member: MemberSnapshot,
        config: &FlagConfig,
        event: &FlagEvent,
    ) -> FlagOutcome {
        let reason = sanction_reason(event);
        let original_roles = member.roles;
        let duration = config.timeout_duration();

        let roles_swapped = match config.timeout_role {
            Some(timeout_role) => {
                let swapped = self
                    .gateway
                    .set_roles(key.guild_id, key.user_id, &BTreeSet::from([timeout_role]), &reason)
                    .await
                    .context("failed to apply timeout role");
                if let Err(source) = swapped {
                    self.sink.report_error(Some(key.guild_id), &source).await;
                    return FlagOutcome::Failed;
                }
                true
            }
            None => false,
        };

        let timed_out = self
            .gateway
            .apply_timeout(key.guild_id, key.user_id, duration, &reason)
            .await
            .context("failed to apply timeout");
        if let Err(source) = timed_out {
            self.sink.report_error(Some(key.guild_id), &source).await;
            if roles_swapped {
                self.roll_back_roles(key, &original_roles).await;
            }
            return FlagOutcome::Failed;
        }

        self.scheduler
            .schedule(key, SanctionRecord::new(original_roles, roles_swapped, duration))
            .await;

        info!(
            guild_id = key.guild_id,
            user_id = key.user_id,
            flag_count = event.flag_count,
            timeout_secs = duration.as_secs(),
            roles_swapped,
            "member sanctioned"
        );
        FlagOutcome::Sanctioned { roles_swapped }
    }

    async fn refresh(
        &self,
        key: SanctionKey,
        pending: SanctionRecord,
        config: &FlagConfig,
        event: &FlagEvent,
    ) -> FlagOutcome {
        let duration = config.timeout_duration();
        let timed_out = self
            .gateway
            .apply_timeout(key.guild_id, key.user_id, duration, &sanction_reason(event))
            .await
            .context("failed to refresh timeout");
        if let Err(source) = timed_out {
            self.sink.report_error(Some(key.guild_id), &source).await;
            return FlagOutcome::Failed;
        }

        self.scheduler
            .schedule(key, pending.renewed(duration))
            .await;

        info!(
            guild_id = key.guild_id,
            user_id = key.user_id,
            timeout_secs = duration.as_secs(),
            "sanction refreshed"
        );
        FlagOutcome::Refreshed
    }

    async fn roll_back_roles(&self, key: SanctionKey, original_roles: &BTreeSet<u64>) {
        let rolled_back = self
            .gateway
            .set_roles(
                key.guild_id,
                key.user_id,
                original_roles,
                "Flag timeout failed: restoring roles",
            )
            .await
            .context("failed to roll back timeout role");
        if let Err(source) = rolled_back {
            self.sink.report_error(Some(key.guild_id), &source).await;
        }
    }

    /// End a member's sanction now: restore their roles and lift the timeout.
    ///
    /// If the restoration fails the reversal is put back for the time left.
    pub async fn release(&self, guild_id: u64, user_id: u64) -> anyhow::Result<ReleaseOutcome> {
        let key = SanctionKey::new(guild_id, user_id);
        let _guard = self.locks.lock(key).await;

        let Some(record) = self.scheduler.cancel(key).await else {
            return Ok(ReleaseOutcome::NotSanctioned);
        };

        if record.roles_swapped {
            let restored = self
                .gateway
                .set_roles(guild_id, user_id, &record.original_roles, RELEASE_REASON)
                .await
                .context("failed to restore roles");
            if let Err(source) = restored {
                let remaining = record.remaining();
                self.scheduler
                    .schedule(key, SanctionRecord { duration: remaining, ..record })
                    .await;
                return Err(source);
            }
        }

        self.gateway
            .clear_timeout(guild_id, user_id, RELEASE_REASON)
            .await
            .context("failed to lift timeout")?;

        info!(guild_id, user_id, "sanction released early");
        Ok(ReleaseOutcome::Released {
            roles_restored: record.roles_swapped,
        })
    }

    /// Pending reversals in a guild as `(user_id, record)`, soonest first.
    pub async fn pending(&self, guild_id: u64) -> Vec<(u64, SanctionRecord)> {
        self.scheduler.pending_for_guild(guild_id).await
    }
}

fn sanction_reason(event: &FlagEvent) -> String {
    format!(
        "Flagged by {} warning reactions on message {}",
        event.flag_count, event.message_id
    )
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Arc;
    use std::time::Duration;

    use flagwatch_database::{ConfigStore, FlagConfig, MemoryConfigStore};

    use super::{FlagOutcome, ModerationEngine, ReleaseOutcome, RetriggerPolicy};
    use crate::event::FlagEvent;
    use crate::locks::SanctionKey;
    use crate::test_support::{FailingStore, FakeGateway, RecordingSink, settle};

    const GUILD: u64 = 100;
    const MEMBER: u64 = 7;
    const TIMEOUT_ROLE: u64 = 1;
    const WHITELIST_ROLE: u64 = 2;
    const TEN_MINUTES: Duration = Duration::from_secs(600);

    struct Harness {
        engine: ModerationEngine,
        store: Arc<MemoryConfigStore>,
        gateway: Arc<FakeGateway>,
        sink: Arc<RecordingSink>,
    }

    async fn harness(retrigger: RetriggerPolicy) -> Harness {
        let store = Arc::new(MemoryConfigStore::new());
        let gateway = Arc::new(FakeGateway::default());
        let sink = Arc::new(RecordingSink::default());
        let engine = ModerationEngine::new(store.clone(), gateway.clone(), sink.clone(), retrigger);

        store
            .set(
                GUILD,
                FlagConfig::from_minutes(3, 10, Some(TIMEOUT_ROLE), Some(WHITELIST_ROLE)).unwrap(),
            )
            .await
            .unwrap();
        gateway.add_member(GUILD, MEMBER, false, &[40, 41]);

        Harness {
            engine,
            store,
            gateway,
            sink,
        }
    }

    fn flag(count: u64) -> FlagEvent {
        FlagEvent {
            guild_id: GUILD,
            channel_id: 5,
            message_id: 6,
            target_user_id: MEMBER,
            flag_count: count,
            target_is_bot: false,
            reactor_is_bot: false,
        }
    }

    fn roles(ids: &[u64]) -> BTreeSet<u64> {
        ids.iter().copied().collect()
    }

    #[tokio::test(start_paused = true)]
    async fn sanction_swaps_roles_then_restores_them() {
        let h = harness(RetriggerPolicy::Ignore).await;

        let outcome = h.engine.handle_flag(&flag(3)).await;

        assert_eq!(outcome, FlagOutcome::Sanctioned { roles_swapped: true });
        assert_eq!(h.gateway.roles(GUILD, MEMBER), roles(&[TIMEOUT_ROLE]));
        assert_eq!(h.gateway.timeouts(), vec![(GUILD, MEMBER, TEN_MINUTES)]);

        tokio::time::sleep(TEN_MINUTES + Duration::from_secs(1)).await;
        settle().await;

        assert_eq!(h.gateway.roles(GUILD, MEMBER), roles(&[40, 41]));
        assert!(h.engine.scheduler().is_empty().await);
        assert!(h.sink.reports().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn below_threshold_has_no_side_effects() {
        let h = harness(RetriggerPolicy::Ignore).await;

        let outcome = h.engine.handle_flag(&flag(2)).await;

        assert_eq!(outcome, FlagOutcome::BelowThreshold { count: 2, limit: 3 });
        assert_eq!(h.gateway.role_writes(), 0);
        assert!(h.gateway.timeouts().is_empty());
        assert!(h.engine.scheduler().is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn whitelisted_member_is_left_alone() {
        let h = harness(RetriggerPolicy::Ignore).await;
        h.gateway.add_member(GUILD, MEMBER, false, &[WHITELIST_ROLE]);

        let outcome = h.engine.handle_flag(&flag(3)).await;

        assert_eq!(outcome, FlagOutcome::Whitelisted);
        assert_eq!(h.gateway.roles(GUILD, MEMBER), roles(&[WHITELIST_ROLE]));
        assert!(h.gateway.timeouts().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn bots_are_never_sanctioned() {
        let h = harness(RetriggerPolicy::Ignore).await;

        let flagged_bot = FlagEvent {
            target_is_bot: true,
            ..flag(50)
        };
        assert_eq!(h.engine.handle_flag(&flagged_bot).await, FlagOutcome::TargetIsBot);

        // The event may not know; the fetched member still does.
        h.gateway.add_member(GUILD, MEMBER, true, &[40]);
        assert_eq!(h.engine.handle_flag(&flag(50)).await, FlagOutcome::TargetIsBot);

        assert!(h.gateway.timeouts().is_empty());
        assert_eq!(h.gateway.role_writes(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn bot_reactions_do_not_trigger() {
        let h = harness(RetriggerPolicy::Ignore).await;
        let event = FlagEvent {
            reactor_is_bot: true,
            ..flag(3)
        };

        assert_eq!(h.engine.handle_flag(&event).await, FlagOutcome::ReactorIsBot);
        assert!(h.gateway.timeouts().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unconfigured_guild_uses_defaults() {
        let h = harness(RetriggerPolicy::Ignore).await;
        h.gateway.add_member(200, MEMBER, false, &[40]);
        let event = FlagEvent {
            guild_id: 200,
            ..flag(4)
        };

        assert_eq!(
            h.engine.handle_flag(&event).await,
            FlagOutcome::BelowThreshold { count: 4, limit: 5 }
        );
        assert_eq!(h.store.get(200).await.unwrap(), FlagConfig::default());

        let event = FlagEvent {
            guild_id: 200,
            ..flag(5)
        };
        assert_eq!(
            h.engine.handle_flag(&event).await,
            FlagOutcome::Sanctioned { roles_swapped: false }
        );
        assert_eq!(
            h.gateway.timeouts(),
            vec![(200, MEMBER, Duration::from_secs(30 * 60))]
        );
        assert_eq!(h.gateway.roles(200, MEMBER), roles(&[40]));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_triggers_produce_one_sanction() {
        let h = harness(RetriggerPolicy::Ignore).await;

        let first = {
            let engine = h.engine.clone();
            tokio::spawn(async move { engine.handle_flag(&flag(3)).await })
        };
        let second = {
            let engine = h.engine.clone();
            tokio::spawn(async move { engine.handle_flag(&flag(4)).await })
        };
        let mut outcomes = vec![first.await.unwrap(), second.await.unwrap()];
        outcomes.sort_by_key(|outcome| format!("{outcome:?}"));

        assert_eq!(
            outcomes,
            vec![
                FlagOutcome::AlreadySanctioned,
                FlagOutcome::Sanctioned { roles_swapped: true },
            ]
        );
        assert_eq!(h.gateway.timeouts().len(), 1);
        assert_eq!(h.engine.scheduler().len().await, 1);
        assert_eq!(
            h.engine
                .scheduler()
                .pending(SanctionKey::new(GUILD, MEMBER))
                .await
                .map(|record| record.original_roles),
            Some(roles(&[40, 41]))
        );

        tokio::time::sleep(TEN_MINUTES + Duration::from_secs(1)).await;
        settle().await;

        // One swap, one restoration.
        assert_eq!(h.gateway.role_writes(), 2);
        assert_eq!(h.gateway.roles(GUILD, MEMBER), roles(&[40, 41]));
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_policy_extends_with_the_first_snapshot() {
        let h = harness(RetriggerPolicy::Refresh).await;
        h.engine.handle_flag(&flag(3)).await;

        tokio::time::sleep(Duration::from_secs(5 * 60)).await;
        assert_eq!(h.engine.handle_flag(&flag(4)).await, FlagOutcome::Refreshed);
        assert_eq!(h.gateway.timeouts().len(), 2);

        // Past the first window, inside the refreshed one.
        tokio::time::sleep(Duration::from_secs(6 * 60)).await;
        settle().await;
        assert_eq!(h.gateway.roles(GUILD, MEMBER), roles(&[TIMEOUT_ROLE]));

        tokio::time::sleep(Duration::from_secs(5 * 60)).await;
        settle().await;
        assert_eq!(h.gateway.roles(GUILD, MEMBER), roles(&[40, 41]));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_role_swap_aborts_the_sanction() {
        let h = harness(RetriggerPolicy::Ignore).await;
        h.gateway.fail_role_writes(true);

        assert_eq!(h.engine.handle_flag(&flag(3)).await, FlagOutcome::Failed);

        assert!(h.gateway.timeouts().is_empty());
        assert!(h.engine.scheduler().is_empty().await);
        let reports = h.sink.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].guild_id, Some(GUILD));
        assert_eq!(reports[0].message, "failed to apply timeout role");
    }

    #[tokio::test(start_paused = true)]
    async fn failed_timeout_rolls_back_the_role_swap() {
        let h = harness(RetriggerPolicy::Ignore).await;
        h.gateway.fail_timeouts(true);

        assert_eq!(h.engine.handle_flag(&flag(3)).await, FlagOutcome::Failed);

        assert_eq!(h.gateway.roles(GUILD, MEMBER), roles(&[40, 41]));
        assert!(h.engine.scheduler().is_empty().await);
        assert_eq!(h.sink.reports().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unresolvable_member_is_dropped_without_a_report() {
        let h = harness(RetriggerPolicy::Ignore).await;
        h.gateway.fail_fetch(true);

        assert_eq!(
            h.engine.handle_flag(&flag(3)).await,
            FlagOutcome::MemberUnavailable
        );
        assert!(h.sink.reports().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn config_failure_is_reported() {
        let gateway = Arc::new(FakeGateway::default());
        let sink = Arc::new(RecordingSink::default());
        let engine = ModerationEngine::new(
            Arc::new(FailingStore),
            gateway.clone(),
            sink.clone(),
            RetriggerPolicy::Ignore,
        );

        assert_eq!(
            engine.handle_flag(&flag(3)).await,
            FlagOutcome::ConfigUnavailable
        );
        let reports = sink.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].message, "failed to load flag config");
        assert!(reports[0].detail.contains("config table unavailable"));
    }

    #[tokio::test(start_paused = true)]
    async fn release_restores_roles_and_lifts_the_timeout() {
        let h = harness(RetriggerPolicy::Ignore).await;
        h.engine.handle_flag(&flag(3)).await;

        let outcome = h.engine.release(GUILD, MEMBER).await.unwrap();

        assert_eq!(outcome, ReleaseOutcome::Released { roles_restored: true });
        assert_eq!(h.gateway.roles(GUILD, MEMBER), roles(&[40, 41]));
        assert_eq!(h.gateway.cleared(), vec![(GUILD, MEMBER)]);
        assert!(h.engine.pending(GUILD).await.is_empty());

        tokio::time::sleep(TEN_MINUTES * 2).await;
        settle().await;
        assert_eq!(h.gateway.role_writes(), 2);

        assert_eq!(
            h.engine.release(GUILD, MEMBER).await.unwrap(),
            ReleaseOutcome::NotSanctioned
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failed_release_keeps_the_reversal() {
        let h = harness(RetriggerPolicy::Ignore).await;
        h.engine.handle_flag(&flag(3)).await;
        h.gateway.fail_role_writes(true);

        assert!(h.engine.release(GUILD, MEMBER).await.is_err());

        assert_eq!(h.engine.pending(GUILD).await.len(), 1);
        assert!(h.gateway.cleared().is_empty());
    }

    #[test]
    fn retrigger_policy_parses() {
        assert_eq!("ignore".parse::<RetriggerPolicy>().unwrap(), RetriggerPolicy::Ignore);
        assert_eq!(" Refresh ".parse::<RetriggerPolicy>().unwrap(), RetriggerPolicy::Refresh);
        assert!("extend".parse::<RetriggerPolicy>().is_err());
    }
}
