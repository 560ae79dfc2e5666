use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use poise::serenity_prelude as serenity;

use flagwatch_utils::time::unix_secs_after;

/// The parts of a guild member the engine decides on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemberSnapshot {
    pub user_id: u64,
    pub is_bot: bool,
    pub roles: BTreeSet<u64>,
}

/// Member and role mutations the engine needs from the platform.
#[async_trait]
pub trait MemberGateway: Send + Sync + fmt::Debug {
    async fn fetch_member(&self, guild_id: u64, user_id: u64) -> anyhow::Result<MemberSnapshot>;

    /// Replace the member's role set with exactly `roles`.
    async fn set_roles(
        &self,
        guild_id: u64,
        user_id: u64,
        roles: &BTreeSet<u64>,
        reason: &str,
    ) -> anyhow::Result<()>;

    /// Restrict the member from communicating for `duration`.
    async fn apply_timeout(
        &self,
        guild_id: u64,
        user_id: u64,
        duration: Duration,
        reason: &str,
    ) -> anyhow::Result<()>;

    async fn clear_timeout(&self, guild_id: u64, user_id: u64, reason: &str)
    -> anyhow::Result<()>;
}

/// [`MemberGateway`] over the Discord REST API.
#[derive(Clone)]
pub struct SerenityGateway {
    http: Arc<serenity::Http>,
}

impl SerenityGateway {
    pub fn new(http: Arc<serenity::Http>) -> Self {
        Self { http }
    }

    async fn edit(
        &self,
        guild_id: u64,
        user_id: u64,
        edit: serenity::EditMember<'_>,
    ) -> anyhow::Result<()> {
        serenity::GuildId::new(guild_id)
            .edit_member(self.http.as_ref(), serenity::UserId::new(user_id), edit)
            .await
            .map_err(|source| {
                let hint = if is_missing_permissions_error(&source) {
                    " (missing permissions; check role hierarchy)"
                } else {
                    ""
                };
                anyhow::Error::new(source)
                    .context(format!("failed to edit member {user_id}{hint}"))
            })?;
        Ok(())
    }
}

impl fmt::Debug for SerenityGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerenityGateway").finish_non_exhaustive()
    }
}

#[async_trait]
impl MemberGateway for SerenityGateway {
    async fn fetch_member(&self, guild_id: u64, user_id: u64) -> anyhow::Result<MemberSnapshot> {
        let member = serenity::GuildId::new(guild_id)
            .member(self.http.as_ref(), serenity::UserId::new(user_id))
            .await
            .with_context(|| format!("failed to fetch member {user_id}"))?;

        Ok(MemberSnapshot {
            user_id,
            is_bot: member.user.bot,
            roles: member.roles.iter().map(|role| role.get()).collect(),
        })
    }

    async fn set_roles(
        &self,
        guild_id: u64,
        user_id: u64,
        roles: &BTreeSet<u64>,
        reason: &str,
    ) -> anyhow::Result<()> {
        let edit = serenity::EditMember::new()
            .roles(roles.iter().map(|id| serenity::RoleId::new(*id)))
            .audit_log_reason(reason);
        self.edit(guild_id, user_id, edit).await
    }

    async fn apply_timeout(
        &self,
        guild_id: u64,
        user_id: u64,
        duration: Duration,
        reason: &str,
    ) -> anyhow::Result<()> {
        let until_unix = i64::try_from(unix_secs_after(duration))
            .context("timeout end out of i64 range")?;
        let until = serenity::Timestamp::from_unix_timestamp(until_unix)?;

        let edit = serenity::EditMember::new()
            .disable_communication_until_datetime(until)
            .audit_log_reason(reason);
        self.edit(guild_id, user_id, edit).await
    }

    async fn clear_timeout(
        &self,
        guild_id: u64,
        user_id: u64,
        reason: &str,
    ) -> anyhow::Result<()> {
        let edit = serenity::EditMember::new()
            .enable_communication()
            .audit_log_reason(reason);
        self.edit(guild_id, user_id, edit).await
    }
}

pub fn is_missing_permissions_error(source: &serenity::Error) -> bool {
    matches!(
        source,
        serenity::Error::Http(serenity::HttpError::UnsuccessfulRequest(response))
            if response.status_code.as_u16() == 403 || response.error.code == 50013
    )
}
