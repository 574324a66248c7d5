//! Chat platform boundary.
//!
//! Everything the verification core reads from or does to the external
//! platform goes through the [`Platform`] trait. [`DiscordRest`] is the
//! production implementation; tests use an in-memory fake.

pub mod discord;
#[cfg(test)]
pub mod fake;
pub mod permissions;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::PlatformError;

pub use discord::DiscordRest;
pub use permissions::Permissions;

pub type GuildId = String;
pub type ChannelId = String;
pub type MessageId = String;
pub type RoleId = String;
pub type UserId = String;

/// A platform account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformUser {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub bot: bool,
}

impl PlatformUser {
    /// Mention markup that renders as a link to the user.
    pub fn mention(&self) -> String {
        format!("<@{}>", self.id)
    }
}

/// A guild role with its hierarchy position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    pub position: i64,
    pub permissions: Permissions,
}

/// A guild as the core sees it.
#[derive(Debug, Clone)]
pub struct Guild {
    pub id: GuildId,
    pub name: String,
    pub owner_id: UserId,
    pub roles: Vec<Role>,
}

impl Guild {
    pub fn role(&self, id: &str) -> Option<&Role> {
        self.roles.iter().find(|r| r.id == id)
    }

    /// Highest hierarchy position among `role_ids`, falling back to `@everyone`.
    pub fn highest_position(&self, role_ids: &[RoleId]) -> i64 {
        role_ids
            .iter()
            .filter_map(|id| self.role(id))
            .map(|r| r.position)
            .max()
            .unwrap_or(0)
    }
}

/// A guild member. `roles` holds explicit roles only; `@everyone` is implicit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub user_id: UserId,
    pub roles: Vec<RoleId>,
}

impl Member {
    pub fn has_role(&self, role_id: &str) -> bool {
        self.roles.iter().any(|r| r == role_id)
    }
}

/// A message from channel history, reduced to what lookups need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryMessage {
    pub id: MessageId,
    pub author_id: UserId,
}

/// A newly created message that may be a verification attempt.
#[derive(Debug, Clone)]
pub struct CandidateMessage {
    pub id: MessageId,
    pub channel_id: ChannelId,
    pub guild_id: Option<GuildId>,
    pub author: PlatformUser,
    pub content: String,
}

/// Queries and mutations against the chat platform.
///
/// Implementations must not cache: every query reflects the platform's
/// current state, since the core relies on re-fetching to observe its own
/// writes.
#[async_trait]
pub trait Platform: Send + Sync {
    /// The account the automation agent is logged in as.
    async fn current_user(&self) -> Result<PlatformUser, PlatformError>;

    /// Guild metadata including its full role list.
    async fn guild(&self, guild_id: &str) -> Result<Guild, PlatformError>;

    /// Fresh member record.
    async fn member(&self, guild_id: &str, user_id: &str) -> Result<Member, PlatformError>;

    /// Effective permissions of `user_id` in one channel, overwrites applied.
    async fn channel_permissions(
        &self,
        guild_id: &str,
        channel_id: &str,
        user_id: &str,
    ) -> Result<Permissions, PlatformError>;

    /// Guild-level permissions of `user_id`, ignoring channel overwrites.
    async fn guild_permissions(
        &self,
        guild_id: &str,
        user_id: &str,
    ) -> Result<Permissions, PlatformError>;

    /// The channel's complete message history, newest first.
    async fn message_history(&self, channel_id: &str) -> Result<Vec<HistoryMessage>, PlatformError>;

    async fn add_reaction(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<(), PlatformError>;

    /// Remove the agent's own reaction.
    async fn remove_own_reaction(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<(), PlatformError>;

    /// Post a message, optionally as a reply. Returns the new message id.
    async fn send_message(
        &self,
        channel_id: &str,
        content: &str,
        reply_to: Option<&str>,
    ) -> Result<MessageId, PlatformError>;

    async fn delete_message(&self, channel_id: &str, message_id: &str) -> Result<(), PlatformError>;

    async fn add_member_role(
        &self,
        guild_id: &str,
        user_id: &str,
        role_id: &str,
        reason: &str,
    ) -> Result<(), PlatformError>;

    async fn remove_member_role(
        &self,
        guild_id: &str,
        user_id: &str,
        role_id: &str,
        reason: &str,
    ) -> Result<(), PlatformError>;
}
