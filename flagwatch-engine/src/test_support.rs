//! In-memory fakes for the engine's platform seams.

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use flagwatch_database::{ConfigStore, FlagConfig};

use crate::error_sink::ErrorSink;
use crate::gateway::{MemberGateway, MemberSnapshot};

/// Let spawned tasks run to their next real suspension point.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

#[derive(Debug, Default)]
struct GatewayState {
    members: HashMap<(u64, u64), MemberSnapshot>,
    role_writes: usize,
    timeouts: Vec<(u64, u64, Duration)>,
    cleared: Vec<(u64, u64)>,
    fail_fetch: bool,
    fail_role_writes: bool,
    fail_timeouts: bool,
}

/// Guild members held in memory. Every call yields once so concurrent
/// callers interleave the way real HTTP round trips would.
#[derive(Debug, Default)]
pub struct FakeGateway {
    state: Mutex<GatewayState>,
}

impl FakeGateway {
    pub fn add_member(&self, guild_id: u64, user_id: u64, is_bot: bool, roles: &[u64]) {
        self.state.lock().unwrap().members.insert(
            (guild_id, user_id),
            MemberSnapshot {
                user_id,
                is_bot,
                roles: roles.iter().copied().collect(),
            },
        );
    }

    pub fn roles(&self, guild_id: u64, user_id: u64) -> BTreeSet<u64> {
        self.state.lock().unwrap().members[&(guild_id, user_id)]
            .roles
            .clone()
    }

    pub fn role_writes(&self) -> usize {
        self.state.lock().unwrap().role_writes
    }

    pub fn timeouts(&self) -> Vec<(u64, u64, Duration)> {
        self.state.lock().unwrap().timeouts.clone()
    }

    pub fn cleared(&self) -> Vec<(u64, u64)> {
        self.state.lock().unwrap().cleared.clone()
    }

    pub fn fail_fetch(&self, fail: bool) {
        self.state.lock().unwrap().fail_fetch = fail;
    }

    pub fn fail_role_writes(&self, fail: bool) {
        self.state.lock().unwrap().fail_role_writes = fail;
    }

    pub fn fail_timeouts(&self, fail: bool) {
        self.state.lock().unwrap().fail_timeouts = fail;
    }
}

#[async_trait]
impl MemberGateway for FakeGateway {
    async fn fetch_member(&self, guild_id: u64, user_id: u64) -> anyhow::Result<MemberSnapshot> {
        tokio::task::yield_now().await;
        let state = self.state.lock().unwrap();
        anyhow::ensure!(!state.fail_fetch, "unknown member {user_id}");
        state
            .members
            .get(&(guild_id, user_id))
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("unknown member {user_id}"))
    }

    async fn set_roles(
        &self,
        guild_id: u64,
        user_id: u64,
        roles: &BTreeSet<u64>,
        _reason: &str,
    ) -> anyhow::Result<()> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock().unwrap();
        anyhow::ensure!(!state.fail_role_writes, "missing permissions");
        let member = state
            .members
            .get_mut(&(guild_id, user_id))
            .ok_or_else(|| anyhow::anyhow!("unknown member {user_id}"))?;
        member.roles = roles.clone();
        state.role_writes += 1;
        Ok(())
    }

    async fn apply_timeout(
        &self,
        guild_id: u64,
        user_id: u64,
        duration: Duration,
        _reason: &str,
    ) -> anyhow::Result<()> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock().unwrap();
        anyhow::ensure!(!state.fail_timeouts, "missing permissions");
        state.timeouts.push((guild_id, user_id, duration));
        Ok(())
    }

    async fn clear_timeout(
        &self,
        guild_id: u64,
        user_id: u64,
        _reason: &str,
    ) -> anyhow::Result<()> {
        tokio::task::yield_now().await;
        self.state.lock().unwrap().cleared.push((guild_id, user_id));
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Report {
    pub guild_id: Option<u64>,
    pub message: String,
    pub detail: String,
}

#[derive(Debug, Default)]
pub struct RecordingSink {
    reports: Mutex<Vec<Report>>,
}

impl RecordingSink {
    pub fn reports(&self) -> Vec<Report> {
        self.reports.lock().unwrap().clone()
    }
}

#[async_trait]
impl ErrorSink for RecordingSink {
    async fn report(&self, guild_id: Option<u64>, message: &str, detail: &str) {
        self.reports.lock().unwrap().push(Report {
            guild_id,
            message: message.to_owned(),
            detail: detail.to_owned(),
        });
    }
}

/// A config table whose storage is down.
#[derive(Debug, Default)]
pub struct FailingStore;

#[async_trait]
impl ConfigStore for FailingStore {
    async fn get(&self, _guild_id: u64) -> anyhow::Result<FlagConfig> {
        anyhow::bail!("config table unavailable")
    }

    async fn set(&self, _guild_id: u64, _config: FlagConfig) -> anyhow::Result<()> {
        anyhow::bail!("config table unavailable")
    }
}
