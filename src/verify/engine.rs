//! Verification engine — runs the check pipeline for one candidate message.
//!
//! Flow:
//! 1. Preconditions (lifecycle, guild, policy, author, channel) → may ignore
//! 2. Marker placed on the candidate message
//! 3. Named checks in fixed order, first rejection wins
//! 4. Cleanup: reply + marker on rejection; roles, welcome, marker, delete on approval

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::PlatformError;
use crate::platform::{CandidateMessage, Permissions, Platform};
use crate::store::{PolicyStore, VerificationPolicy};
use crate::verify::feedback::FeedbackManager;
use crate::verify::guard::{PermissionGuard, VERIFICATION_CHANNEL_REQUIRED, WELCOME_CHANNEL_REQUIRED};
use crate::verify::intro::IntroLookup;
use crate::verify::roles::RoleMutator;
use crate::verify::template::{TemplateVars, render};
use crate::verify::types::{
    AgentIdentity, Lifecycle, Outcome, RejectReason, Step, StepResult, VerificationAttempt,
};

/// Gatekeeper for verification channels.
pub struct VerificationEngine {
    platform: Arc<dyn Platform>,
    policies: Arc<dyn PolicyStore>,
    agent: AgentIdentity,
    guard: PermissionGuard,
    intro: IntroLookup,
    roles: RoleMutator,
    feedback: FeedbackManager,
}

impl VerificationEngine {
    pub fn new(
        platform: Arc<dyn Platform>,
        policies: Arc<dyn PolicyStore>,
        agent: AgentIdentity,
        config: EngineConfig,
    ) -> Self {
        Self {
            guard: PermissionGuard::new(platform.clone(), agent.id.clone()),
            intro: IntroLookup::new(platform.clone()),
            roles: RoleMutator::new(platform.clone(), agent.id.clone(), config.settle_delay),
            feedback: FeedbackManager::new(platform.clone(), config.marker_emoji),
            platform,
            policies,
            agent,
        }
    }

    pub fn agent(&self) -> &AgentIdentity {
        &self.agent
    }

    /// Run the pipeline for a newly created message.
    ///
    /// Returns `None` when the message is not a verification attempt, in
    /// which case nothing visible happened.
    pub async fn on_candidate_message(
        &self,
        lifecycle: Lifecycle,
        message: &CandidateMessage,
    ) -> Option<Outcome> {
        if lifecycle != Lifecycle::Ready {
            debug!(lifecycle = lifecycle.label(), "Not ready, ignoring message");
            return None;
        }
        let guild_id = message.guild_id.as_deref()?;
        if message.author.id == self.agent.id || message.author.bot {
            return None;
        }

        let policy = match self.policies.get_policy(guild_id).await {
            Ok(Some(policy)) => policy,
            Ok(None) => return None,
            Err(e) => {
                warn!(guild_id, error = %e, "Policy lookup failed, treating as disabled");
                return None;
            }
        };
        if !policy.auto_verify_enabled
            || policy.verification_channel_id.as_deref() != Some(message.channel_id.as_str())
        {
            return None;
        }

        let mut attempt = VerificationAttempt::new(message, guild_id, self.feedback.marker());
        info!(
            attempt_id = %attempt.id,
            guild_id,
            author_id = %attempt.author_id,
            message_id = %attempt.candidate_message_id,
            "Verification attempt started"
        );

        self.feedback
            .place_marker(&attempt.channel_id, &attempt.candidate_message_id)
            .await;

        let mut verdict = StepResult::Continue;
        for step in Step::ORDER {
            verdict = self.run_step(step, &policy, message, guild_id).await;
            if let StepResult::Reject(reason) = &verdict {
                info!(
                    attempt_id = %attempt.id,
                    step = step.label(),
                    kind = ?reason.kind(),
                    "Verification rejected"
                );
                break;
            }
        }

        // Cleanup: every path ends here.
        attempt.outcome = match verdict {
            StepResult::Reject(reason) => {
                let _ = self
                    .feedback
                    .reject(
                        &attempt.channel_id,
                        &attempt.candidate_message_id,
                        &reason.user_message(),
                        reason.ttl(),
                    )
                    .await;
                self.feedback
                    .clear_marker(&attempt.channel_id, &attempt.candidate_message_id)
                    .await;
                Outcome::Rejected(reason)
            }
            StepResult::Continue => {
                self.approve(&policy, message, guild_id).await;
                self.feedback
                    .clear_marker(&attempt.channel_id, &attempt.candidate_message_id)
                    .await;
                if let Err(e) = self
                    .platform
                    .delete_message(&attempt.channel_id, &attempt.candidate_message_id)
                    .await
                {
                    warn!(attempt_id = %attempt.id, error = %e, "Failed to delete candidate message");
                }
                Outcome::Approved
            }
        };

        info!(
            attempt_id = %attempt.id,
            outcome = attempt.outcome.label(),
            "Verification attempt finished"
        );
        Some(attempt.outcome)
    }

    async fn run_step(
        &self,
        step: Step,
        policy: &VerificationPolicy,
        message: &CandidateMessage,
        guild_id: &str,
    ) -> StepResult {
        match self.evaluate(step, policy, message, guild_id).await {
            Ok(result) => result,
            Err(e) => {
                warn!(guild_id, step = step.label(), error = %e, "Platform query failed during check");
                StepResult::Reject(RejectReason::PlatformUnavailable { step })
            }
        }
    }

    async fn evaluate(
        &self,
        step: Step,
        policy: &VerificationPolicy,
        message: &CandidateMessage,
        guild_id: &str,
    ) -> Result<StepResult, PlatformError> {
        let result = match step {
            Step::SendCapability => {
                let check = self
                    .guard
                    .check(guild_id, &message.channel_id, VERIFICATION_CHANNEL_REQUIRED)
                    .await?;
                if check.granted {
                    StepResult::Continue
                } else {
                    StepResult::Reject(RejectReason::VerificationChannelPermissions {
                        missing: check.missing,
                    })
                }
            }

            Step::WelcomeCapability => {
                let Some(welcome_id) = &policy.welcome_channel_id else {
                    return Ok(StepResult::Continue);
                };
                match self
                    .guard
                    .check(guild_id, welcome_id, WELCOME_CHANNEL_REQUIRED)
                    .await
                {
                    Ok(check) if check.granted => StepResult::Continue,
                    Ok(check) => StepResult::Reject(RejectReason::WelcomeChannelPermissions {
                        missing: check.missing,
                    }),
                    Err(e) if e.is_not_found() => {
                        StepResult::Reject(RejectReason::WelcomeChannelUnavailable {
                            channel_id: welcome_id.clone(),
                        })
                    }
                    Err(e) => return Err(e),
                }
            }

            Step::RoleCount => {
                let required = policy.min_roles_required;
                if required == 0 {
                    return Ok(StepResult::Continue);
                }
                let member = self.platform.member(guild_id, &message.author.id).await?;
                // @everyone is held implicitly and never listed on the member.
                let current = 1 + member.roles.iter().filter(|r| *r != guild_id).count();
                if current >= required as usize {
                    StepResult::Continue
                } else {
                    StepResult::Reject(RejectReason::TooFewRoles { current, required })
                }
            }

            Step::IntroPresence => {
                let Some(channels) = policy.intro_channels() else {
                    return Ok(StepResult::Continue);
                };
                if self.intro.has_introduced(&message.author.id, channels).await {
                    StepResult::Continue
                } else {
                    StepResult::Reject(RejectReason::IntroNotFound {
                        channels: channels.to_vec(),
                    })
                }
            }

            Step::Phrase => match &policy.verification_phrase {
                Some(phrase) if message.content != *phrase => {
                    StepResult::Reject(RejectReason::PhraseMismatch)
                }
                _ => StepResult::Continue,
            },

            Step::RoleCapability => {
                if !policy.mutates_roles() {
                    return Ok(StepResult::Continue);
                }
                let check = self
                    .guard
                    .check_guild(guild_id, Permissions::MANAGE_ROLES)
                    .await?;
                if check.granted {
                    StepResult::Continue
                } else {
                    StepResult::Reject(RejectReason::CannotManageRoles)
                }
            }
        };
        Ok(result)
    }

    /// Role changes then the welcome post. Failures are logged only.
    async fn approve(&self, policy: &VerificationPolicy, message: &CandidateMessage, guild_id: &str) {
        if policy.mutates_roles() {
            match self
                .roles
                .apply(
                    guild_id,
                    &message.author.id,
                    &policy.roles_to_grant,
                    &policy.roles_to_revoke,
                    &self.agent.audit_reason(),
                )
                .await
            {
                Ok(report) if !report.is_clean() => {
                    warn!(guild_id, failed = ?report.failed, "Some role changes failed");
                }
                Ok(_) => {}
                Err(e) => warn!(guild_id, error = %e, "Role mutation aborted"),
            }
        }

        let Some(welcome_id) = &policy.welcome_channel_id else {
            return;
        };
        if policy.welcome_template.is_empty() {
            return;
        }

        let guild_name = match self.platform.guild(guild_id).await {
            Ok(guild) => Some(guild.name),
            Err(e) => {
                debug!(guild_id, error = %e, "Guild name unavailable for welcome message");
                None
            }
        };
        let vars = TemplateVars::for_member(&message.author, guild_id, guild_name);
        let text = render(&policy.welcome_template, &vars);

        if let Err(e) = self.platform.send_message(welcome_id, &text, None).await {
            warn!(guild_id, channel_id = %welcome_id, error = %e, "Failed to post welcome message");
        }
    }
}
