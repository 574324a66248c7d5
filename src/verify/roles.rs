//! Two-phase role mutation bounded by the agent's hierarchy rank.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::PlatformError;
use crate::platform::{Guild, Platform, RoleId};

/// Which phase a role belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Grant,
    Revoke,
}

/// What happened to each requested role.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MutationReport {
    pub granted: Vec<RoleId>,
    pub revoked: Vec<RoleId>,
    /// Roles left alone: unknown, out of rank, or already in the target state.
    pub skipped: Vec<RoleId>,
    pub failed: Vec<(RoleId, MutationKind)>,
}

impl MutationReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Applies grant and revoke sets on behalf of the agent.
pub struct RoleMutator {
    platform: Arc<dyn Platform>,
    agent_id: String,
    settle_delay: Duration,
}

impl RoleMutator {
    pub fn new(platform: Arc<dyn Platform>, agent_id: impl Into<String>, settle_delay: Duration) -> Self {
        Self {
            platform,
            agent_id: agent_id.into(),
            settle_delay,
        }
    }

    /// Grant every role in `grant`, wait, then revoke every role in `revoke`.
    ///
    /// Only roles strictly below the agent's highest role are touched.
    /// Individual failures are recorded and do not stop the remaining roles.
    /// Errors are returned only when the guild or a member record can't be
    /// loaded.
    pub async fn apply(
        &self,
        guild_id: &str,
        user_id: &str,
        grant: &BTreeSet<RoleId>,
        revoke: &BTreeSet<RoleId>,
        reason: &str,
    ) -> Result<MutationReport, PlatformError> {
        let mut report = MutationReport::default();
        if grant.is_empty() && revoke.is_empty() {
            return Ok(report);
        }

        let (guild, agent) = tokio::try_join!(
            self.platform.guild(guild_id),
            self.platform.member(guild_id, &self.agent_id),
        )?;
        let rank = guild.highest_position(&agent.roles);

        let member = self.platform.member(guild_id, user_id).await?;
        for role_id in grant {
            if member.has_role(role_id) || !self.may_touch(&guild, rank, role_id) {
                report.skipped.push(role_id.clone());
                continue;
            }
            match self
                .platform
                .add_member_role(guild_id, user_id, role_id, reason)
                .await
            {
                Ok(()) => report.granted.push(role_id.clone()),
                Err(e) => {
                    warn!(guild_id, user_id, role_id = %role_id, error = %e, "Role grant failed");
                    report.failed.push((role_id.clone(), MutationKind::Grant));
                }
            }
        }

        if revoke.is_empty() {
            return Ok(self.finish(guild_id, user_id, report));
        }

        tokio::time::sleep(self.settle_delay).await;
        let member = self.platform.member(guild_id, user_id).await?;

        for role_id in revoke {
            if !member.has_role(role_id) || !self.may_touch(&guild, rank, role_id) {
                report.skipped.push(role_id.clone());
                continue;
            }
            match self
                .platform
                .remove_member_role(guild_id, user_id, role_id, reason)
                .await
            {
                Ok(()) => report.revoked.push(role_id.clone()),
                Err(e) => {
                    warn!(guild_id, user_id, role_id = %role_id, error = %e, "Role revoke failed");
                    report.failed.push((role_id.clone(), MutationKind::Revoke));
                }
            }
        }

        Ok(self.finish(guild_id, user_id, report))
    }

    fn may_touch(&self, guild: &Guild, rank: i64, role_id: &str) -> bool {
        match guild.role(role_id) {
            Some(role) if rank > role.position => true,
            Some(role) => {
                debug!(role_id, position = role.position, rank, "Role outranks agent, skipping");
                false
            }
            None => {
                warn!(guild_id = %guild.id, role_id, "Configured role not found in guild");
                false
            }
        }
    }

    fn finish(&self, guild_id: &str, user_id: &str, report: MutationReport) -> MutationReport {
        info!(
            guild_id,
            user_id,
            granted = report.granted.len(),
            revoked = report.revoked.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "Role mutation complete"
        );
        report
    }
}
