//! `PolicyStore` trait — keyed access to per-guild verification policies.

use async_trait::async_trait;

use crate::error::DatabaseError;
use crate::store::policy::VerificationPolicy;

/// Backend-agnostic policy store. One record per guild.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Load the policy for a guild. `None` means verification is disabled there.
    async fn get_policy(&self, guild_id: &str) -> Result<Option<VerificationPolicy>, DatabaseError>;

    /// Insert or replace a guild's policy. Stamps `updated_at`.
    async fn put_policy(&self, policy: &VerificationPolicy) -> Result<(), DatabaseError>;

    /// Remove a guild's policy. Returns whether a record existed.
    async fn delete_policy(&self, guild_id: &str) -> Result<bool, DatabaseError>;
}
