//! Discord REST implementation of [`Platform`].
//!
//! Talks to the v10 REST API with a bot token. No caching: every call hits
//! the API, which is what the verification core expects when it re-fetches
//! member state between role mutation phases.

use std::time::Duration;

use async_trait::async_trait;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::permissions::{self, MemberContext, OverwriteTarget, PermissionOverwrite};
use super::{Guild, HistoryMessage, Member, MessageId, Permissions, Platform, PlatformUser, Role};
use crate::config::DEFAULT_API_BASE;
use crate::error::PlatformError;

/// Discord caps message history pages at 100 entries.
const HISTORY_PAGE_SIZE: usize = 100;

/// Default cap on history pages per channel.
const DEFAULT_HISTORY_PAGE_LIMIT: usize = 100;

// ── Wire types ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct WireRole {
    id: String,
    name: String,
    position: i64,
    permissions: String,
}

#[derive(Debug, Deserialize)]
struct WireGuild {
    id: String,
    name: String,
    owner_id: String,
    #[serde(default)]
    roles: Vec<WireRole>,
}

#[derive(Debug, Deserialize)]
struct WireMember {
    #[serde(default)]
    user: Option<PlatformUser>,
    #[serde(default)]
    roles: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct WireOverwrite {
    id: String,
    #[serde(rename = "type")]
    kind: u8,
    allow: String,
    deny: String,
}

#[derive(Debug, Deserialize)]
struct WireChannel {
    #[serde(default)]
    guild_id: Option<String>,
    #[serde(default)]
    permission_overwrites: Vec<WireOverwrite>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    id: String,
    author: PlatformUser,
}

#[derive(Debug, Deserialize)]
struct RateLimitBody {
    retry_after: Option<f64>,
}

impl From<WireRole> for Role {
    fn from(role: WireRole) -> Self {
        Self {
            permissions: Permissions::parse(&role.permissions).unwrap_or_default(),
            id: role.id,
            name: role.name,
            position: role.position,
        }
    }
}

impl From<WireOverwrite> for PermissionOverwrite {
    fn from(o: WireOverwrite) -> Self {
        Self {
            target: if o.kind == 1 {
                OverwriteTarget::Member
            } else {
                OverwriteTarget::Role
            },
            allow: Permissions::parse(&o.allow).unwrap_or_default(),
            deny: Permissions::parse(&o.deny).unwrap_or_default(),
            id: o.id,
        }
    }
}

// ── Client ──────────────────────────────────────────────────────────

/// HTTP client for the Discord REST API.
pub struct DiscordRest {
    http: reqwest::Client,
    token: SecretString,
    base_url: String,
    history_page_limit: usize,
}

impl DiscordRest {
    pub fn new(token: SecretString) -> Self {
        Self::with_base_url(token, DEFAULT_API_BASE.to_string())
    }

    /// Create a client against a custom base URL (proxies, tests).
    pub fn with_base_url(token: SecretString, base_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            token,
            base_url: base_url.trim_end_matches('/').to_string(),
            history_page_limit: DEFAULT_HISTORY_PAGE_LIMIT,
        }
    }

    pub fn with_history_page_limit(mut self, pages: usize) -> Self {
        self.history_page_limit = pages.max(1);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{path}", self.base_url))
            .header("Authorization", format!("Bot {}", self.token.expose_secret()))
    }

    async fn send(&self, builder: RequestBuilder, resource: &str) -> Result<Response, PlatformError> {
        let resp = builder
            .send()
            .await
            .map_err(|e| PlatformError::Http(e.to_string()))?;
        check_status(resp, resource).await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        resource: &str,
    ) -> Result<T, PlatformError> {
        let resp = self.send(self.request(Method::GET, path), resource).await?;
        resp.json::<T>()
            .await
            .map_err(|e| PlatformError::InvalidResponse(format!("{resource}: {e}")))
    }

    async fn fetch_guild(&self, guild_id: &str) -> Result<WireGuild, PlatformError> {
        self.get_json(&format!("/guilds/{guild_id}"), &format!("guild {guild_id}"))
            .await
    }

    async fn fetch_member(&self, guild_id: &str, user_id: &str) -> Result<WireMember, PlatformError> {
        self.get_json(
            &format!("/guilds/{guild_id}/members/{user_id}"),
            &format!("member {user_id}"),
        )
        .await
    }

    async fn fetch_channel(&self, channel_id: &str) -> Result<WireChannel, PlatformError> {
        self.get_json(&format!("/channels/{channel_id}"), &format!("channel {channel_id}"))
            .await
    }

    fn reaction_path(channel_id: &str, message_id: &str, emoji: &str) -> String {
        format!(
            "/channels/{channel_id}/messages/{message_id}/reactions/{}/@me",
            encode_component(emoji)
        )
    }
}

/// Map a non-success response to a [`PlatformError`].
async fn check_status(resp: Response, resource: &str) -> Result<Response, PlatformError> {
    let status = resp.status();
    if status.is_success() {
        if resp
            .headers()
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            == Some("0")
        {
            debug!(resource = %resource, "Discord rate limit bucket exhausted");
        }
        return Ok(resp);
    }

    match status {
        StatusCode::NOT_FOUND => Err(PlatformError::NotFound {
            resource: resource.to_string(),
        }),
        StatusCode::FORBIDDEN => {
            let body = resp.text().await.unwrap_or_default();
            Err(PlatformError::Forbidden(format!("{resource}: {body}")))
        }
        StatusCode::TOO_MANY_REQUESTS => {
            let header_secs = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<f64>().ok());
            let body_secs = resp
                .json::<RateLimitBody>()
                .await
                .ok()
                .and_then(|b| b.retry_after);
            let retry_after = body_secs
                .or(header_secs)
                .map(|s| Duration::from_millis((s * 1000.0) as u64));
            warn!(resource = %resource, retry_after = ?retry_after, "Discord rate limited");
            Err(PlatformError::RateLimited { retry_after })
        }
        _ => {
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".into());
            Err(PlatformError::Api {
                status: status.as_u16(),
                body,
            })
        }
    }
}

/// Everything outside the RFC 3986 unreserved set.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Percent-encode an emoji path segment or audit-log reason header.
pub(crate) fn encode_component(raw: &str) -> String {
    utf8_percent_encode(raw, COMPONENT).to_string()
}

#[async_trait]
impl Platform for DiscordRest {
    async fn current_user(&self) -> Result<PlatformUser, PlatformError> {
        self.get_json("/users/@me", "current user").await
    }

    async fn guild(&self, guild_id: &str) -> Result<Guild, PlatformError> {
        let wire = self.fetch_guild(guild_id).await?;
        Ok(Guild {
            id: wire.id,
            name: wire.name,
            owner_id: wire.owner_id,
            roles: wire.roles.into_iter().map(Role::from).collect(),
        })
    }

    async fn member(&self, guild_id: &str, user_id: &str) -> Result<Member, PlatformError> {
        let wire = self.fetch_member(guild_id, user_id).await?;
        Ok(Member {
            user_id: wire.user.map(|u| u.id).unwrap_or_else(|| user_id.to_string()),
            roles: wire.roles,
        })
    }

    async fn channel_permissions(
        &self,
        guild_id: &str,
        channel_id: &str,
        user_id: &str,
    ) -> Result<Permissions, PlatformError> {
        let (guild, member, channel) = tokio::try_join!(
            self.guild(guild_id),
            self.member(guild_id, user_id),
            self.fetch_channel(channel_id),
        )?;

        if channel.guild_id.as_deref().is_some_and(|g| g != guild_id) {
            return Err(PlatformError::NotFound {
                resource: format!("channel {channel_id} in guild {guild_id}"),
            });
        }

        let role_permissions = member_role_permissions(&guild, &member);
        let ctx = MemberContext {
            guild_id,
            owner_id: &guild.owner_id,
            user_id,
            everyone: guild.role(guild_id).map(|r| r.permissions).unwrap_or_default(),
            role_permissions: &role_permissions,
        };
        let overwrites: Vec<PermissionOverwrite> = channel
            .permission_overwrites
            .into_iter()
            .map(PermissionOverwrite::from)
            .collect();
        Ok(permissions::channel_permissions(&ctx, &overwrites))
    }

    async fn guild_permissions(
        &self,
        guild_id: &str,
        user_id: &str,
    ) -> Result<Permissions, PlatformError> {
        let (guild, member) =
            tokio::try_join!(self.guild(guild_id), self.member(guild_id, user_id))?;
        let role_permissions = member_role_permissions(&guild, &member);
        let ctx = MemberContext {
            guild_id,
            owner_id: &guild.owner_id,
            user_id,
            everyone: guild.role(guild_id).map(|r| r.permissions).unwrap_or_default(),
            role_permissions: &role_permissions,
        };
        Ok(permissions::base_permissions(&ctx))
    }

    async fn message_history(&self, channel_id: &str) -> Result<Vec<HistoryMessage>, PlatformError> {
        let resource = format!("channel {channel_id} history");
        let mut history = Vec::new();
        let mut before: Option<String> = None;

        for page in 0..self.history_page_limit {
            let mut path = format!("/channels/{channel_id}/messages?limit={HISTORY_PAGE_SIZE}");
            if let Some(ref id) = before {
                path.push_str(&format!("&before={id}"));
            }
            let batch: Vec<WireMessage> = self.get_json(&path, &resource).await?;
            let len = batch.len();
            before = batch.last().map(|m| m.id.clone());
            history.extend(batch.into_iter().map(|m| HistoryMessage {
                id: m.id,
                author_id: m.author.id,
            }));

            if len < HISTORY_PAGE_SIZE {
                return Ok(history);
            }
            if page + 1 == self.history_page_limit {
                warn!(
                    channel_id = %channel_id,
                    pages = self.history_page_limit,
                    "History page limit reached, lookup truncated"
                );
            }
        }
        Ok(history)
    }

    async fn add_reaction(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<(), PlatformError> {
        let path = Self::reaction_path(channel_id, message_id, emoji);
        self.send(self.request(Method::PUT, &path), &format!("message {message_id}"))
            .await?;
        Ok(())
    }

    async fn remove_own_reaction(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<(), PlatformError> {
        let path = Self::reaction_path(channel_id, message_id, emoji);
        self.send(self.request(Method::DELETE, &path), &format!("reaction on {message_id}"))
            .await?;
        Ok(())
    }

    async fn send_message(
        &self,
        channel_id: &str,
        content: &str,
        reply_to: Option<&str>,
    ) -> Result<MessageId, PlatformError> {
        let mut body = serde_json::json!({ "content": content });
        if let Some(message_id) = reply_to {
            body["message_reference"] = serde_json::json!({
                "message_id": message_id,
                "fail_if_not_exists": false,
            });
        }

        debug!(channel_id = %channel_id, "Sending message");

        let resp = self
            .send(
                self.request(Method::POST, &format!("/channels/{channel_id}/messages"))
                    .json(&body),
                &format!("channel {channel_id}"),
            )
            .await?;

        #[derive(Deserialize)]
        struct Created {
            id: String,
        }
        let created: Created = resp
            .json()
            .await
            .map_err(|e| PlatformError::InvalidResponse(format!("created message: {e}")))?;
        Ok(created.id)
    }

    async fn delete_message(&self, channel_id: &str, message_id: &str) -> Result<(), PlatformError> {
        self.send(
            self.request(
                Method::DELETE,
                &format!("/channels/{channel_id}/messages/{message_id}"),
            ),
            &format!("message {message_id}"),
        )
        .await?;
        Ok(())
    }

    async fn add_member_role(
        &self,
        guild_id: &str,
        user_id: &str,
        role_id: &str,
        reason: &str,
    ) -> Result<(), PlatformError> {
        self.send(
            self.request(
                Method::PUT,
                &format!("/guilds/{guild_id}/members/{user_id}/roles/{role_id}"),
            )
            .header("X-Audit-Log-Reason", encode_component(reason)),
            &format!("role {role_id}"),
        )
        .await?;
        Ok(())
    }

    async fn remove_member_role(
        &self,
        guild_id: &str,
        user_id: &str,
        role_id: &str,
        reason: &str,
    ) -> Result<(), PlatformError> {
        self.send(
            self.request(
                Method::DELETE,
                &format!("/guilds/{guild_id}/members/{user_id}/roles/{role_id}"),
            )
            .header("X-Audit-Log-Reason", encode_component(reason)),
            &format!("role {role_id}"),
        )
        .await?;
        Ok(())
    }
}

/// Pair each of the member's roles with its guild permission bits.
fn member_role_permissions(guild: &Guild, member: &Member) -> Vec<(String, Permissions)> {
    member
        .roles
        .iter()
        .filter_map(|id| guild.role(id).map(|r| (id.clone(), r.permissions)))
        .collect()
}
