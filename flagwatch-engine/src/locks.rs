use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Identifies one member of one guild.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SanctionKey {
    pub guild_id: u64,
    pub user_id: u64,
}

impl SanctionKey {
    pub fn new(guild_id: u64, user_id: u64) -> Self {
        Self { guild_id, user_id }
    }
}

/// One async mutex per member, created on demand.
///
/// Sanction application and reversal both hold the member's lock, so a role
/// snapshot can never observe a role set another sanction already swapped.
/// Idle locks are pruned whenever a new one is handed out.
#[derive(Debug, Default)]
pub struct MemberLocks {
    locks: Mutex<HashMap<SanctionKey, Arc<Mutex<()>>>>,
}

impl MemberLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: SanctionKey) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.retain(|held_key, lock| *held_key == key || Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(key).or_default())
        };
        lock.lock_owned().await
    }

    /// Number of lock slots currently tracked.
    pub async fn tracked(&self) -> usize {
        self.locks.lock().await.len()
    }
}
