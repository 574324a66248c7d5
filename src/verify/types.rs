//! Shared types for the verification pipeline.

use std::fmt;
use std::time::Duration;

use uuid::Uuid;

use crate::platform::{CandidateMessage, ChannelId, GuildId, MessageId, UserId};

/// Feedback lifetime for capability problems the server staff must fix.
pub const STAFF_FEEDBACK_TTL: Duration = Duration::from_millis(7500);

/// Feedback lifetime for everything the candidate can act on.
pub const CANDIDATE_FEEDBACK_TTL: Duration = Duration::from_millis(5000);

/// Process lifecycle, passed in by whoever delivers events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Starting,
    Ready,
    ShuttingDown,
}

impl Lifecycle {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::ShuttingDown => "shutting_down",
        }
    }
}

/// Rejection taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The policy points at something unusable.
    ConfigurationDefect,
    /// The agent lacks a permission it needs.
    CapabilityMissing,
    /// The candidate does not meet a requirement.
    EligibilityFailure,
    /// A platform call failed; nothing is known about eligibility.
    TransientPlatformError,
}

/// Why a verification attempt was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    VerificationChannelPermissions { missing: Vec<&'static str> },
    WelcomeChannelPermissions { missing: Vec<&'static str> },
    WelcomeChannelUnavailable { channel_id: ChannelId },
    TooFewRoles { current: usize, required: u32 },
    IntroNotFound { channels: Vec<ChannelId> },
    PhraseMismatch,
    CannotManageRoles,
    PlatformUnavailable { step: Step },
}

impl RejectReason {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::VerificationChannelPermissions { .. }
            | Self::WelcomeChannelPermissions { .. }
            | Self::CannotManageRoles => FailureKind::CapabilityMissing,
            Self::WelcomeChannelUnavailable { .. } => FailureKind::ConfigurationDefect,
            Self::TooFewRoles { .. } | Self::IntroNotFound { .. } | Self::PhraseMismatch => {
                FailureKind::EligibilityFailure
            }
            Self::PlatformUnavailable { .. } => FailureKind::TransientPlatformError,
        }
    }

    /// How long the feedback reply stays up.
    pub fn ttl(&self) -> Duration {
        match self {
            Self::VerificationChannelPermissions { .. }
            | Self::WelcomeChannelPermissions { .. }
            | Self::WelcomeChannelUnavailable { .. } => STAFF_FEEDBACK_TTL,
            _ => CANDIDATE_FEEDBACK_TTL,
        }
    }

    /// Text posted back to the candidate.
    pub fn user_message(&self) -> String {
        match self {
            Self::VerificationChannelPermissions { missing } => format!(
                "`❌` I am missing one or more of the following permissions in this channel. \
                 Please inform server staff of this issue\n>>> ```{}```",
                missing.join("\n")
            ),
            Self::WelcomeChannelPermissions { missing } => format!(
                "`❌` I am missing one or more of the following permissions in the welcome channel. \
                 Please inform server staff of this issue\n>>> {}",
                missing.join("\n")
            ),
            Self::WelcomeChannelUnavailable { channel_id } => format!(
                "`❌` The configured welcome channel (<#{channel_id}>) cannot be found. \
                 Please inform server staff of this issue"
            ),
            Self::TooFewRoles { current, required } => format!(
                "`❌` You need {required} roles to verify, you currently have {current} roles"
            ),
            Self::IntroNotFound { channels } => format!(
                "`❌` You need an introduction posted in one of the following channels: {}",
                channels
                    .iter()
                    .map(|c| format!("<#{c}>"))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            Self::PhraseMismatch => "`❌` The password is incorrect".to_string(),
            Self::CannotManageRoles => {
                "`❌` I cannot modify roles. Please inform server staff of this issue".to_string()
            }
            Self::PlatformUnavailable { .. } => {
                "`❌` Something went wrong while checking your verification. Please try again"
                    .to_string()
            }
        }
    }
}

/// Named checks, evaluated in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    SendCapability,
    WelcomeCapability,
    RoleCount,
    IntroPresence,
    Phrase,
    RoleCapability,
}

impl Step {
    /// The fixed evaluation order.
    pub const ORDER: [Step; 6] = [
        Step::SendCapability,
        Step::WelcomeCapability,
        Step::RoleCount,
        Step::IntroPresence,
        Step::Phrase,
        Step::RoleCapability,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::SendCapability => "send_capability",
            Self::WelcomeCapability => "welcome_capability",
            Self::RoleCount => "role_count",
            Self::IntroPresence => "intro_presence",
            Self::Phrase => "phrase",
            Self::RoleCapability => "role_capability",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Result of one check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepResult {
    Continue,
    Reject(RejectReason),
}

/// Where an attempt ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Pending,
    Rejected(RejectReason),
    Approved,
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Rejected(_) => "rejected",
            Self::Approved => "approved",
        }
    }
}

/// The account the automation runs as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentIdentity {
    pub id: UserId,
    pub tag: String,
}

impl AgentIdentity {
    pub fn new(id: impl Into<UserId>, tag: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tag: tag.into(),
        }
    }

    /// Audit-log reason attached to every role mutation.
    pub fn audit_reason(&self) -> String {
        format!("Automatic verification by {} ({})", self.tag, self.id)
    }
}

/// One run of the pipeline for one candidate message.
#[derive(Debug, Clone)]
pub struct VerificationAttempt {
    pub id: Uuid,
    pub candidate_message_id: MessageId,
    pub author_id: UserId,
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub marker: String,
    pub outcome: Outcome,
}

impl VerificationAttempt {
    pub fn new(message: &CandidateMessage, guild_id: &str, marker: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            candidate_message_id: message.id.clone(),
            author_id: message.author.id.clone(),
            guild_id: guild_id.to_string(),
            channel_id: message.channel_id.clone(),
            marker: marker.to_string(),
            outcome: Outcome::Pending,
        }
    }
}
