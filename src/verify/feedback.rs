//! Transient replies and the pending-state marker.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::platform::Platform;

/// Posts self-deleting replies and manages the marker reaction.
pub struct FeedbackManager {
    platform: Arc<dyn Platform>,
    marker: String,
}

impl FeedbackManager {
    pub fn new(platform: Arc<dyn Platform>, marker: impl Into<String>) -> Self {
        Self {
            platform,
            marker: marker.into(),
        }
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// Put the marker on a message. Failures are ignored.
    pub async fn place_marker(&self, channel_id: &str, message_id: &str) {
        if let Err(e) = self
            .platform
            .add_reaction(channel_id, message_id, &self.marker)
            .await
        {
            debug!(channel_id, message_id, error = %e, "Could not place marker");
        }
    }

    /// Take the agent's marker off a message. Failures are ignored.
    pub async fn clear_marker(&self, channel_id: &str, message_id: &str) {
        if let Err(e) = self
            .platform
            .remove_own_reaction(channel_id, message_id, &self.marker)
            .await
        {
            debug!(channel_id, message_id, error = %e, "Could not clear marker");
        }
    }

    /// Reply to `reply_to` with `text` and delete the reply after `ttl`.
    ///
    /// Returns the deletion timer, or `None` if the reply was never posted.
    pub async fn reject(
        &self,
        channel_id: &str,
        reply_to: &str,
        text: &str,
        ttl: Duration,
    ) -> Option<JoinHandle<()>> {
        let reply_id = match self
            .platform
            .send_message(channel_id, text, Some(reply_to))
            .await
        {
            Ok(id) => id,
            Err(e) => {
                warn!(channel_id, reply_to, error = %e, "Failed to post rejection reply");
                return None;
            }
        };

        let platform = Arc::clone(&self.platform);
        let channel_id = channel_id.to_string();
        Some(tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            if let Err(e) = platform.delete_message(&channel_id, &reply_id).await {
                debug!(channel_id = %channel_id, reply_id = %reply_id, error = %e, "Rejection reply already gone");
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::fake::{Call, FakePlatform};

    fn manager(fake: &Arc<FakePlatform>) -> FeedbackManager {
        FeedbackManager::new(fake.clone(), "⏳")
    }

    #[tokio::test(start_paused = true)]
    async fn reply_is_deleted_after_ttl() {
        let fake = Arc::new(FakePlatform::new());
        let handle = manager(&fake)
            .reject("verify", "m1", "nope", Duration::from_millis(5000))
            .await
            .unwrap();

        let sent = fake.sent();
        let Call::Send { id, reply_to, .. } = &sent[0] else {
            panic!("expected a send");
        };
        assert_eq!(reply_to.as_deref(), Some("m1"));

        tokio::time::sleep(Duration::from_millis(4999)).await;
        assert!(!fake.is_deleted(id));

        handle.await.unwrap();
        assert!(fake.is_deleted(id));
    }

    #[tokio::test(start_paused = true)]
    async fn deleting_missing_reply_is_silent() {
        let fake = Arc::new(FakePlatform::new());
        let handle = manager(&fake)
            .reject("verify", "m1", "nope", Duration::from_millis(10))
            .await
            .unwrap();
        let Call::Send { id, .. } = &fake.sent()[0] else {
            panic!("expected a send");
        };
        fake.delete_message("verify", id).await.unwrap();

        // Timer fires against an already-deleted message and must not panic.
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn marker_round_trip() {
        let fake = Arc::new(FakePlatform::new());
        let feedback = manager(&fake);
        feedback.place_marker("verify", "m1").await;
        feedback.clear_marker("verify", "m1").await;

        assert_eq!(
            fake.calls(),
            vec![
                Call::AddReaction {
                    message: "m1".into(),
                    emoji: "⏳".into()
                },
                Call::RemoveReaction {
                    message: "m1".into(),
                    emoji: "⏳".into()
                },
            ]
        );
    }
}
