use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::Context as _;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use flagwatch_utils::time::now_unix_secs;

use crate::error_sink::ErrorSink;
use crate::gateway::MemberGateway;
use crate::locks::{MemberLocks, SanctionKey};

const RESTORE_REASON: &str = "Flag timeout expired: restoring roles";

/// What the scheduler needs to undo one sanction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SanctionRecord {
    /// Role set captured right before the sanction.
    pub original_roles: BTreeSet<u64>,
    /// Whether the role set was replaced; if not, there is nothing to restore.
    pub roles_swapped: bool,
    pub applied_at: u64,
    pub expires_at: u64,
    pub duration: Duration,
}

impl SanctionRecord {
    pub fn new(original_roles: BTreeSet<u64>, roles_swapped: bool, duration: Duration) -> Self {
        let applied_at = now_unix_secs();
        Self {
            original_roles,
            roles_swapped,
            applied_at,
            expires_at: applied_at.saturating_add(duration.as_secs()),
            duration,
        }
    }

    /// The same snapshot with a fresh window starting now.
    pub fn renewed(&self, duration: Duration) -> Self {
        Self::new(self.original_roles.clone(), self.roles_swapped, duration)
    }

    /// Time left until `expires_at`, zero once it has passed.
    pub fn remaining(&self) -> Duration {
        Duration::from_secs(self.expires_at.saturating_sub(now_unix_secs()))
    }
}

/// Lifecycle of a pending reversal. `Removed` entries are no longer tracked.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReversalState {
    Scheduled,
    Fired,
    Removed,
}

struct Entry {
    ticket: u64,
    state: ReversalState,
    record: SanctionRecord,
    timer: JoinHandle<()>,
}

struct SchedulerInner {
    entries: Mutex<HashMap<SanctionKey, Entry>>,
    next_ticket: AtomicU64,
    gateway: Arc<dyn MemberGateway>,
    sink: Arc<dyn ErrorSink>,
    locks: Arc<MemberLocks>,
}

/// Volatile, per-member queue of delayed role restorations.
///
/// At most one entry exists per [`SanctionKey`]; scheduling again replaces
/// the entry and aborts its timer. Entries live only in memory.
#[derive(Clone)]
pub struct ReversalScheduler {
    inner: Arc<SchedulerInner>,
}

impl fmt::Debug for ReversalScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReversalScheduler")
            .field("gateway", &self.inner.gateway)
            .field("sink", &self.inner.sink)
            .finish_non_exhaustive()
    }
}

impl ReversalScheduler {
    pub fn new(
        gateway: Arc<dyn MemberGateway>,
        sink: Arc<dyn ErrorSink>,
        locks: Arc<MemberLocks>,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                entries: Mutex::new(HashMap::new()),
                next_ticket: AtomicU64::new(1),
                gateway,
                sink,
                locks,
            }),
        }
    }

    /// Track `record` for `key`, superseding any existing entry.
    ///
    /// Returns the superseded record, if there was one.
    pub async fn schedule(&self, key: SanctionKey, record: SanctionRecord) -> Option<SanctionRecord> {
        let ticket = self.inner.next_ticket.fetch_add(1, Ordering::Relaxed);
        let delay = record.duration;

        let mut entries = self.inner.entries.lock().await;
        let superseded = entries.remove(&key).map(|previous| {
            // A fired timer is mid-restoration; it finishes on its own and
            // its ticket no longer matches the new entry.
            if previous.state == ReversalState::Scheduled {
                previous.timer.abort();
            }
            debug!(
                ?key,
                ticket = previous.ticket,
                state = ?previous.state,
                "pending reversal superseded"
            );
            previous.record
        });

        let inner = Arc::clone(&self.inner);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.fire(key, ticket).await;
        });

        debug!(?key, ticket, expires_at = record.expires_at, "reversal scheduled");
        entries.insert(
            key,
            Entry {
                ticket,
                state: ReversalState::Scheduled,
                record,
                timer,
            },
        );

        superseded
    }

    /// Drop the entry for `key` without restoring anything.
    ///
    /// An entry that already fired is left to finish its restoration.
    pub async fn cancel(&self, key: SanctionKey) -> Option<SanctionRecord> {
        let mut entries = self.inner.entries.lock().await;
        if entries.get(&key)?.state != ReversalState::Scheduled {
            return None;
        }

        let entry = entries.remove(&key)?;
        entry.timer.abort();
        debug!(?key, ticket = entry.ticket, "reversal cancelled");
        Some(entry.record)
    }

    /// Current state of the entry for `key`; `None` once removed or never scheduled.
    pub async fn state(&self, key: SanctionKey) -> Option<ReversalState> {
        self.inner
            .entries
            .lock()
            .await
            .get(&key)
            .map(|entry| entry.state)
    }

    pub async fn pending(&self, key: SanctionKey) -> Option<SanctionRecord> {
        self.inner
            .entries
            .lock()
            .await
            .get(&key)
            .map(|entry| entry.record.clone())
    }

    /// Pending reversals in a guild as `(user_id, record)`, soonest first.
    pub async fn pending_for_guild(&self, guild_id: u64) -> Vec<(u64, SanctionRecord)> {
        let entries = self.inner.entries.lock().await;
        let mut pending = entries
            .iter()
            .filter(|(key, _)| key.guild_id == guild_id)
            .map(|(key, entry)| (key.user_id, entry.record.clone()))
            .collect::<Vec<_>>();
        pending.sort_by_key(|(user_id, record)| (record.expires_at, *user_id));
        pending
    }

    pub async fn len(&self) -> usize {
        self.inner.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl SchedulerInner {
    async fn fire(&self, key: SanctionKey, ticket: u64) {
        let _guard = self.locks.lock(key).await;

        let record = {
            let mut entries = self.entries.lock().await;
            match entries.get_mut(&key) {
                Some(entry) if entry.ticket == ticket => {
                    entry.state = ReversalState::Fired;
                    entry.record.clone()
                }
                _ => return,
            }
        };

        if record.roles_swapped {
            let restored = self
                .gateway
                .set_roles(key.guild_id, key.user_id, &record.original_roles, RESTORE_REASON)
                .await
                .with_context(|| format!("failed to restore roles for member {}", key.user_id));

            match restored {
                Ok(()) => info!(
                    guild_id = key.guild_id,
                    user_id = key.user_id,
                    roles = record.original_roles.len(),
                    "roles restored after flag timeout"
                ),
                Err(source) => {
                    warn!(?source, ?key, "role restoration failed; not retrying");
                    self.sink.report_error(Some(key.guild_id), &source).await;
                }
            }
        }

        let mut entries = self.entries.lock().await;
        if entries.get(&key).is_some_and(|entry| entry.ticket == ticket) {
            entries.remove(&key);
        }
        debug!(?key, ticket, state = ?ReversalState::Removed, "reversal finished");
    }
}
