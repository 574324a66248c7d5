//! Automatic member verification.
//!
//! [`VerificationEngine`] owns the pipeline; the other modules are the
//! pieces it drives.

pub mod engine;
pub mod feedback;
pub mod guard;
pub mod intro;
pub mod roles;
pub mod template;
pub mod types;

pub use engine::VerificationEngine;
pub use types::{AgentIdentity, FailureKind, Lifecycle, Outcome, RejectReason, Step};
