//! Welcome message templating.

use crate::platform::PlatformUser;

/// Supported placeholders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    User,
    UserTag,
    UserId,
    Guild,
    GuildId,
}

impl Placeholder {
    pub const ALL: [Placeholder; 5] = [
        Placeholder::User,
        Placeholder::UserTag,
        Placeholder::UserId,
        Placeholder::Guild,
        Placeholder::GuildId,
    ];

    pub fn token(&self) -> &'static str {
        match self {
            Self::User => "{{user}}",
            Self::UserTag => "{{user.tag}}",
            Self::UserId => "{{user.id}}",
            Self::Guild => "{{guild}}",
            Self::GuildId => "{{guild.id}}",
        }
    }
}

/// Values available for substitution. `None` leaves the token untouched.
#[derive(Debug, Default, Clone)]
pub struct TemplateVars {
    pub user_mention: Option<String>,
    pub user_tag: Option<String>,
    pub user_id: Option<String>,
    pub guild_name: Option<String>,
    pub guild_id: Option<String>,
}

impl TemplateVars {
    pub fn for_member(user: &PlatformUser, guild_id: &str, guild_name: Option<String>) -> Self {
        Self {
            user_mention: Some(user.mention()),
            user_tag: Some(user.username.clone()),
            user_id: Some(user.id.clone()),
            guild_name,
            guild_id: Some(guild_id.to_string()),
        }
    }

    fn value(&self, placeholder: Placeholder) -> Option<&str> {
        match placeholder {
            Placeholder::User => self.user_mention.as_deref(),
            Placeholder::UserTag => self.user_tag.as_deref(),
            Placeholder::UserId => self.user_id.as_deref(),
            Placeholder::Guild => self.guild_name.as_deref(),
            Placeholder::GuildId => self.guild_id.as_deref(),
        }
    }
}

/// Substitute known placeholders in a single left-to-right pass.
///
/// Substituted values are never scanned again, so user-controlled text
/// such as a username cannot expand into another placeholder.
pub fn render(template: &str, vars: &TemplateVars) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let hit = Placeholder::ALL
            .iter()
            .find_map(|p| tail.strip_prefix(p.token()).map(|after| (*p, after)));
        match hit {
            Some((placeholder, after)) => {
                out.push_str(vars.value(placeholder).unwrap_or(placeholder.token()));
                rest = after;
            }
            None => {
                out.push_str("{{");
                rest = &tail[2..];
            }
        }
    }
    out.push_str(rest);
    out
}
