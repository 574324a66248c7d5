//! Per-guild verification policy record.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::platform::{ChannelId, GuildId, RoleId};

/// Verification settings for one guild.
///
/// Unset optional fields disable the corresponding check; they never make
/// it fail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationPolicy {
    pub guild_id: GuildId,
    pub auto_verify_enabled: bool,
    pub verification_channel_id: Option<ChannelId>,
    pub welcome_channel_id: Option<ChannelId>,
    /// `0` disables the role-count check.
    pub min_roles_required: u32,
    /// `None` and an empty list both skip the intro check.
    pub intro_channel_ids: Option<Vec<ChannelId>>,
    pub verification_phrase: Option<String>,
    pub roles_to_grant: BTreeSet<RoleId>,
    pub roles_to_revoke: BTreeSet<RoleId>,
    pub welcome_template: String,
    pub updated_at: DateTime<Utc>,
}

impl VerificationPolicy {
    /// A disabled policy with every optional field unset.
    pub fn new(guild_id: impl Into<GuildId>) -> Self {
        Self {
            guild_id: guild_id.into(),
            auto_verify_enabled: false,
            verification_channel_id: None,
            welcome_channel_id: None,
            min_roles_required: 0,
            intro_channel_ids: None,
            verification_phrase: None,
            roles_to_grant: BTreeSet::new(),
            roles_to_revoke: BTreeSet::new(),
            welcome_template: String::new(),
            updated_at: Utc::now(),
        }
    }

    /// Set the intro channels, dropping duplicates while keeping first-seen order.
    pub fn with_intro_channels<I, S>(mut self, channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ChannelId>,
    {
        self.intro_channel_ids = Some(dedup_ordered(channels.into_iter().map(Into::into)));
        self
    }

    /// Intro channels to scan, or `None` when the check is disabled.
    pub fn intro_channels(&self) -> Option<&[ChannelId]> {
        self.intro_channel_ids
            .as_deref()
            .filter(|channels| !channels.is_empty())
    }

    /// Whether an approval would touch any roles.
    pub fn mutates_roles(&self) -> bool {
        !self.roles_to_grant.is_empty() || !self.roles_to_revoke.is_empty()
    }
}

pub(crate) fn dedup_ordered(items: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}
