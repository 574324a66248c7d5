//! In-memory [`Platform`] used by unit tests.
//!
//! Records every mutating call so tests can assert on side effects and
//! their order.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{Guild, HistoryMessage, Member, MessageId, Permissions, Platform, PlatformUser, Role};
use crate::error::PlatformError;

pub const GUILD: &str = "guild-1";
pub const AGENT: &str = "agent-1";

/// A side effect observed by the fake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    AddReaction { message: String, emoji: String },
    RemoveReaction { message: String, emoji: String },
    Send { id: String, channel: String, content: String, reply_to: Option<String> },
    Delete { channel: String, message: String },
    AddRole { user: String, role: String, reason: String },
    RemoveRole { user: String, role: String, reason: String },
}

#[derive(Default)]
struct State {
    guild_name: String,
    roles: Vec<Role>,
    members: HashMap<String, Vec<String>>,
    channel_perms: HashMap<String, Permissions>,
    guild_perms: Permissions,
    history: HashMap<String, Vec<HistoryMessage>>,
    history_fetches: HashMap<String, usize>,
    failing_history: HashSet<String>,
    failing_roles: HashSet<String>,
    /// Roles whose grant is not visible until the member is re-fetched.
    lagging_grants: bool,
    pending_grants: Vec<(String, String)>,
    deleted: HashSet<String>,
    next_id: u64,
    calls: Vec<Call>,
}

pub struct FakePlatform {
    state: Mutex<State>,
}

impl FakePlatform {
    /// A guild with the agent holding a top role at position 10.
    pub fn new() -> Self {
        let mut state = State {
            guild_name: "Test".into(),
            ..Default::default()
        };
        state.roles.push(role(GUILD, 0));
        state.roles.push(role("agent-role", 10));
        state.members.insert(AGENT.into(), vec!["agent-role".into()]);
        Self {
            state: Mutex::new(state),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    pub fn add_role(&self, id: &str, position: i64) {
        self.with(|s| s.roles.push(role(id, position)));
    }

    pub fn set_member(&self, user: &str, roles: &[&str]) {
        self.with(|s| {
            s.members
                .insert(user.into(), roles.iter().map(|r| r.to_string()).collect())
        });
    }

    pub fn member_roles(&self, user: &str) -> Vec<String> {
        self.with(|s| s.members.get(user).cloned().unwrap_or_default())
    }

    pub fn set_channel_permissions(&self, channel: &str, perms: Permissions) {
        self.with(|s| s.channel_perms.insert(channel.into(), perms));
    }

    pub fn set_guild_permissions(&self, perms: Permissions) {
        self.with(|s| s.guild_perms = perms);
    }

    pub fn add_history(&self, channel: &str, author: &str) {
        self.with(|s| {
            s.next_id += 1;
            let id = format!("hist-{}", s.next_id);
            s.history
                .entry(channel.into())
                .or_default()
                .push(HistoryMessage {
                    id,
                    author_id: author.into(),
                });
        });
    }

    pub fn fail_history(&self, channel: &str) {
        self.with(|s| s.failing_history.insert(channel.into()));
    }

    pub fn fail_role(&self, role: &str) {
        self.with(|s| s.failing_roles.insert(role.into()));
    }

    /// Grants land in a staging area that only a member re-fetch observes.
    pub fn lag_grants(&self) {
        self.with(|s| s.lagging_grants = true);
    }

    pub fn history_fetches(&self, channel: &str) -> usize {
        self.with(|s| s.history_fetches.get(channel).copied().unwrap_or(0))
    }

    pub fn calls(&self) -> Vec<Call> {
        self.with(|s| s.calls.clone())
    }

    pub fn is_deleted(&self, message: &str) -> bool {
        self.with(|s| s.deleted.contains(message))
    }

    pub fn sent(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Send { .. }))
            .collect()
    }
}

fn role(id: &str, position: i64) -> Role {
    Role {
        id: id.into(),
        name: id.into(),
        position,
        permissions: Permissions::empty(),
    }
}

fn not_found(resource: &str) -> PlatformError {
    PlatformError::NotFound {
        resource: resource.to_string(),
    }
}

#[async_trait]
impl Platform for FakePlatform {
    async fn current_user(&self) -> Result<PlatformUser, PlatformError> {
        Ok(PlatformUser {
            id: AGENT.into(),
            username: "gatekeeper".into(),
            bot: true,
        })
    }

    async fn guild(&self, guild_id: &str) -> Result<Guild, PlatformError> {
        if guild_id != GUILD {
            return Err(not_found(guild_id));
        }
        Ok(self.with(|s| Guild {
            id: GUILD.into(),
            name: s.guild_name.clone(),
            owner_id: "owner".into(),
            roles: s.roles.clone(),
        }))
    }

    async fn member(&self, _guild_id: &str, user_id: &str) -> Result<Member, PlatformError> {
        self.with(|s| {
            let pending: Vec<(String, String)> = s.pending_grants.drain(..).collect();
            for (user, role) in pending {
                s.members.entry(user).or_default().push(role);
            }
            s.members
                .get(user_id)
                .map(|roles| Member {
                    user_id: user_id.into(),
                    roles: roles.clone(),
                })
                .ok_or_else(|| not_found(user_id))
        })
    }

    async fn channel_permissions(
        &self,
        _guild_id: &str,
        channel_id: &str,
        _user_id: &str,
    ) -> Result<Permissions, PlatformError> {
        self.with(|s| s.channel_perms.get(channel_id).copied())
            .ok_or_else(|| not_found(channel_id))
    }

    async fn guild_permissions(
        &self,
        _guild_id: &str,
        _user_id: &str,
    ) -> Result<Permissions, PlatformError> {
        Ok(self.with(|s| s.guild_perms))
    }

    async fn message_history(&self, channel_id: &str) -> Result<Vec<HistoryMessage>, PlatformError> {
        self.with(|s| {
            *s.history_fetches.entry(channel_id.into()).or_default() += 1;
            if s.failing_history.contains(channel_id) {
                return Err(not_found(channel_id));
            }
            Ok(s.history.get(channel_id).cloned().unwrap_or_default())
        })
    }

    async fn add_reaction(
        &self,
        _channel_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<(), PlatformError> {
        self.with(|s| {
            s.calls.push(Call::AddReaction {
                message: message_id.into(),
                emoji: emoji.into(),
            })
        });
        Ok(())
    }

    async fn remove_own_reaction(
        &self,
        _channel_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<(), PlatformError> {
        self.with(|s| {
            s.calls.push(Call::RemoveReaction {
                message: message_id.into(),
                emoji: emoji.into(),
            })
        });
        Ok(())
    }

    async fn send_message(
        &self,
        channel_id: &str,
        content: &str,
        reply_to: Option<&str>,
    ) -> Result<MessageId, PlatformError> {
        Ok(self.with(|s| {
            s.next_id += 1;
            let id = format!("sent-{}", s.next_id);
            s.calls.push(Call::Send {
                id: id.clone(),
                channel: channel_id.into(),
                content: content.into(),
                reply_to: reply_to.map(String::from),
            });
            id
        }))
    }

    async fn delete_message(&self, channel_id: &str, message_id: &str) -> Result<(), PlatformError> {
        self.with(|s| {
            if !s.deleted.insert(message_id.into()) {
                return Err(not_found(message_id));
            }
            s.calls.push(Call::Delete {
                channel: channel_id.into(),
                message: message_id.into(),
            });
            Ok(())
        })
    }

    async fn add_member_role(
        &self,
        _guild_id: &str,
        user_id: &str,
        role_id: &str,
        reason: &str,
    ) -> Result<(), PlatformError> {
        self.with(|s| {
            if s.failing_roles.contains(role_id) {
                return Err(PlatformError::Api {
                    status: 500,
                    body: "boom".into(),
                });
            }
            s.calls.push(Call::AddRole {
                user: user_id.into(),
                role: role_id.into(),
                reason: reason.into(),
            });
            if s.lagging_grants {
                s.pending_grants.push((user_id.into(), role_id.into()));
            } else {
                s.members.entry(user_id.into()).or_default().push(role_id.into());
            }
            Ok(())
        })
    }

    async fn remove_member_role(
        &self,
        _guild_id: &str,
        user_id: &str,
        role_id: &str,
        reason: &str,
    ) -> Result<(), PlatformError> {
        self.with(|s| {
            if s.failing_roles.contains(role_id) {
                return Err(PlatformError::Api {
                    status: 500,
                    body: "boom".into(),
                });
            }
            s.calls.push(Call::RemoveRole {
                user: user_id.into(),
                role: role_id.into(),
                reason: reason.into(),
            });
            if let Some(roles) = s.members.get_mut(user_id) {
                roles.retain(|r| r != role_id);
            }
            Ok(())
        })
    }
}
