use flagwatch_database::FlagConfig;

use crate::gateway::MemberSnapshot;

/// Why a flagged member may or may not be sanctioned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    /// Bots and application accounts are never sanctioned.
    Automated,
    /// The member holds the guild's whitelist role.
    Whitelisted,
}

impl Eligibility {
    pub fn is_eligible(self) -> bool {
        self == Self::Eligible
    }
}

pub fn check(member: &MemberSnapshot, config: &FlagConfig) -> Eligibility {
    if member.is_bot {
        return Eligibility::Automated;
    }

    match config.whitelist_role {
        Some(role) if member.roles.contains(&role) => Eligibility::Whitelisted,
        _ => Eligibility::Eligible,
    }
}

pub fn eligible(member: &MemberSnapshot, config: &FlagConfig) -> bool {
    check(member, config).is_eligible()
}
