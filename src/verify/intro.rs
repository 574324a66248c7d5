//! Introduction lookup across configured channels.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::platform::{ChannelId, Platform};

/// Searches intro channels for a message by a given author.
pub struct IntroLookup {
    platform: Arc<dyn Platform>,
}

impl IntroLookup {
    pub fn new(platform: Arc<dyn Platform>) -> Self {
        Self { platform }
    }

    /// True if `author_id` posted in any of `channel_ids`.
    ///
    /// Channels are scanned in order and the scan stops at the first hit.
    /// Every channel's history is fetched fresh. Channels that cannot be
    /// read are skipped.
    pub async fn has_introduced(&self, author_id: &str, channel_ids: &[ChannelId]) -> bool {
        for channel_id in channel_ids {
            let history = match self.platform.message_history(channel_id).await {
                Ok(history) => history,
                Err(e) => {
                    warn!(channel_id = %channel_id, error = %e, "Intro channel unavailable, skipping");
                    continue;
                }
            };

            if history.iter().any(|m| m.author_id == author_id) {
                debug!(channel_id = %channel_id, author_id, "Introduction found");
                return true;
            }
        }
        false
    }
}
