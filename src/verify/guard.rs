//! Capability checks for the automation agent.

use std::sync::Arc;

use crate::error::PlatformError;
use crate::platform::{Permissions, Platform};

/// What the agent needs in the verification channel.
pub const VERIFICATION_CHANNEL_REQUIRED: Permissions = Permissions::from_bits(
    Permissions::VIEW_CHANNEL.bits()
        | Permissions::SEND_MESSAGES.bits()
        | Permissions::MANAGE_MESSAGES.bits()
        | Permissions::ADD_REACTIONS.bits(),
);

/// What the agent needs in the welcome channel.
pub const WELCOME_CHANNEL_REQUIRED: Permissions = Permissions::from_bits(
    Permissions::VIEW_CHANNEL.bits()
        | Permissions::SEND_MESSAGES.bits()
        | Permissions::EMBED_LINKS.bits()
        | Permissions::ATTACH_FILES.bits(),
);

/// Outcome of a capability query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionCheck {
    pub granted: bool,
    /// Missing capability names, in bit order.
    pub missing: Vec<&'static str>,
}

impl PermissionCheck {
    fn evaluate(effective: Permissions, required: Permissions) -> Self {
        let missing = effective.missing(required);
        Self {
            granted: missing.is_empty(),
            missing,
        }
    }
}

/// Read-only permission queries on behalf of one agent account.
pub struct PermissionGuard {
    platform: Arc<dyn Platform>,
    agent_id: String,
}

impl PermissionGuard {
    pub fn new(platform: Arc<dyn Platform>, agent_id: impl Into<String>) -> Self {
        Self {
            platform,
            agent_id: agent_id.into(),
        }
    }

    /// Channel-scoped check; overwrites on `channel_id` are honoured.
    pub async fn check(
        &self,
        guild_id: &str,
        channel_id: &str,
        required: Permissions,
    ) -> Result<PermissionCheck, PlatformError> {
        let effective = self
            .platform
            .channel_permissions(guild_id, channel_id, &self.agent_id)
            .await?;
        Ok(PermissionCheck::evaluate(effective, required))
    }

    /// Guild-scoped check, for capabilities that have no channel meaning.
    pub async fn check_guild(
        &self,
        guild_id: &str,
        required: Permissions,
    ) -> Result<PermissionCheck, PlatformError> {
        let effective = self
            .platform
            .guild_permissions(guild_id, &self.agent_id)
            .await?;
        Ok(PermissionCheck::evaluate(effective, required))
    }
}
