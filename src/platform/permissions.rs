//! Capability bitsets and channel-scoped effective permission computation.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign, Not};

use serde::{Deserialize, Serialize};

/// A set of platform capabilities, stored as Discord permission bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Permissions(u64);

impl Permissions {
    pub const CREATE_INSTANT_INVITE: Self = Self(1 << 0);
    pub const KICK_MEMBERS: Self = Self(1 << 1);
    pub const BAN_MEMBERS: Self = Self(1 << 2);
    pub const ADMINISTRATOR: Self = Self(1 << 3);
    pub const MANAGE_CHANNELS: Self = Self(1 << 4);
    pub const MANAGE_GUILD: Self = Self(1 << 5);
    pub const ADD_REACTIONS: Self = Self(1 << 6);
    pub const VIEW_CHANNEL: Self = Self(1 << 10);
    pub const SEND_MESSAGES: Self = Self(1 << 11);
    pub const MANAGE_MESSAGES: Self = Self(1 << 13);
    pub const EMBED_LINKS: Self = Self(1 << 14);
    pub const ATTACH_FILES: Self = Self(1 << 15);
    pub const READ_MESSAGE_HISTORY: Self = Self(1 << 16);
    pub const MENTION_EVERYONE: Self = Self(1 << 17);
    pub const MANAGE_ROLES: Self = Self(1 << 28);

    /// Every bit set.
    pub const ALL: Self = Self(u64::MAX);

    /// Names used when reporting missing capabilities, in ascending bit order.
    const NAMED: &'static [(Permissions, &'static str)] = &[
        (Self::CREATE_INSTANT_INVITE, "CREATE_INSTANT_INVITE"),
        (Self::KICK_MEMBERS, "KICK_MEMBERS"),
        (Self::BAN_MEMBERS, "BAN_MEMBERS"),
        (Self::ADMINISTRATOR, "ADMINISTRATOR"),
        (Self::MANAGE_CHANNELS, "MANAGE_CHANNELS"),
        (Self::MANAGE_GUILD, "MANAGE_GUILD"),
        (Self::ADD_REACTIONS, "ADD_REACTIONS"),
        (Self::VIEW_CHANNEL, "VIEW_CHANNEL"),
        (Self::SEND_MESSAGES, "SEND_MESSAGES"),
        (Self::MANAGE_MESSAGES, "MANAGE_MESSAGES"),
        (Self::EMBED_LINKS, "EMBED_LINKS"),
        (Self::ATTACH_FILES, "ATTACH_FILES"),
        (Self::READ_MESSAGE_HISTORY, "READ_MESSAGE_HISTORY"),
        (Self::MENTION_EVERYONE, "MENTION_EVERYONE"),
        (Self::MANAGE_ROLES, "MANAGE_ROLES"),
    ];

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Parse the decimal string form the Discord API uses for permission fields.
    pub fn parse(raw: &str) -> Option<Self> {
        raw.trim().parse::<u64>().ok().map(Self)
    }

    /// Capabilities in `required` that this set lacks, by name, in bit order.
    ///
    /// Bits without a registered name are reported as `UNKNOWN_PERMISSION`.
    pub fn missing(self, required: Self) -> Vec<&'static str> {
        let absent = required.0 & !self.0;
        if absent == 0 {
            return Vec::new();
        }
        let mut names = Vec::new();
        for bit in 0..64 {
            let flag = 1u64 << bit;
            if absent & flag == 0 {
                continue;
            }
            let name = Self::NAMED
                .iter()
                .find(|(p, _)| p.0 == flag)
                .map(|(_, n)| *n)
                .unwrap_or("UNKNOWN_PERMISSION");
            names.push(name);
        }
        names
    }
}

impl BitOr for Permissions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for Permissions {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Permissions {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl Not for Permissions {
    type Output = Self;

    fn not(self) -> Self {
        Self(!self.0)
    }
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who a channel permission overwrite applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverwriteTarget {
    Role,
    Member,
}

/// A channel-level allow/deny pair for one role or member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionOverwrite {
    pub id: String,
    pub target: OverwriteTarget,
    pub allow: Permissions,
    pub deny: Permissions,
}

/// Inputs needed to compute one member's permissions in one guild.
///
/// `role_permissions` pairs each of the member's explicit role ids with that
/// role's guild-level permission bits.
#[derive(Debug, Clone)]
pub struct MemberContext<'a> {
    pub guild_id: &'a str,
    pub owner_id: &'a str,
    pub user_id: &'a str,
    pub everyone: Permissions,
    pub role_permissions: &'a [(String, Permissions)],
}

/// Guild-scoped permissions: `@everyone` plus every member role.
pub fn base_permissions(ctx: &MemberContext<'_>) -> Permissions {
    if ctx.user_id == ctx.owner_id {
        return Permissions::ALL;
    }
    let mut perms = ctx.everyone;
    for (_, role_perms) in ctx.role_permissions {
        perms |= *role_perms;
    }
    if perms.contains(Permissions::ADMINISTRATOR) {
        return Permissions::ALL;
    }
    perms
}

/// Channel-scoped permissions: base permissions with the channel's overwrites applied.
///
/// Order: `@everyone` overwrite, then all role overwrites aggregated (deny
/// before allow), then the member's own overwrite.
pub fn channel_permissions(
    ctx: &MemberContext<'_>,
    overwrites: &[PermissionOverwrite],
) -> Permissions {
    let base = base_permissions(ctx);
    if base == Permissions::ALL {
        return base;
    }

    let mut perms = base;

    // The @everyone role shares its id with the guild.
    if let Some(everyone) = overwrites
        .iter()
        .find(|o| o.target == OverwriteTarget::Role && o.id == ctx.guild_id)
    {
        perms = (perms & !everyone.deny) | everyone.allow;
    }

    let mut allow = Permissions::empty();
    let mut deny = Permissions::empty();
    for overwrite in overwrites.iter().filter(|o| o.target == OverwriteTarget::Role) {
        if ctx.role_permissions.iter().any(|(id, _)| *id == overwrite.id) {
            allow |= overwrite.allow;
            deny |= overwrite.deny;
        }
    }
    perms = (perms & !deny) | allow;

    if let Some(member) = overwrites
        .iter()
        .find(|o| o.target == OverwriteTarget::Member && o.id == ctx.user_id)
    {
        perms = (perms & !member.deny) | member.allow;
    }

    perms
}
