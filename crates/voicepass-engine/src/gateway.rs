//! NATS-backed gateway: guild actions, the voice roster and announcements.
//!
//! The chat-platform bot lives on the other side of NATS. Guild actions and
//! roster scans are request/reply with a bounded timeout; announcements are
//! fire-and-forget publishes.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use voicepass_core::{GuildActions, RosterSource};
use voicepass_types::{ActionFailure, ActionReply, Announcement, ChannelId, GuildEffect, Notification, RosterEntry};

use crate::error::EngineError;
use crate::subjects::Subjects;

/// Connection to the platform gateway over NATS.
#[derive(Clone)]
pub struct NatsGateway {
    client: async_nats::Client,
    subjects: Arc<Subjects>,
    timeout: Duration,
}

impl NatsGateway {
    /// Connect to a NATS server.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Nats`] if the connection cannot be established.
    pub async fn connect(url: &str, subjects: Subjects, timeout: Duration) -> Result<Self, EngineError> {
        info!(url = url, "Connecting to NATS server");
        let client = async_nats::connect(url).await.map_err(|e| EngineError::Nats {
            message: format!("failed to connect to {url}: {e}"),
        })?;
        info!("NATS connection established");
        Ok(Self {
            client,
            subjects: Arc::new(subjects),
            timeout,
        })
    }

    /// The underlying client.
    pub const fn client(&self) -> &async_nats::Client {
        &self.client
    }

    /// The subject layout.
    pub fn subjects(&self) -> &Subjects {
        &self.subjects
    }

    /// Subscribe to `subject`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Nats`] if the subscription fails.
    pub async fn subscribe(&self, subject: &str) -> Result<async_nats::Subscriber, EngineError> {
        let subscriber = self
            .client
            .subscribe(subject.to_owned())
            .await
            .map_err(|e| EngineError::Nats {
                message: format!("failed to subscribe to {subject}: {e}"),
            })?;
        info!(subject = subject, "Subscribed");
        Ok(subscriber)
    }

    /// Flush all pending messages to the NATS server.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Nats`] if the flush fails.
    pub async fn flush(&self) -> Result<(), EngineError> {
        self.client.flush().await.map_err(|e| EngineError::Nats {
            message: format!("flush failed: {e}"),
        })
    }

    async fn request<T, R>(&self, subject: &str, body: &T) -> Result<R, ActionFailure>
    where
        T: Serialize + Sync,
        R: DeserializeOwned,
    {
        let payload = serde_json::to_vec(body)
            .map_err(|e| ActionFailure::Transport(format!("failed to serialize request: {e}")))?;
        let request = self.client.request(subject.to_owned(), payload.into());
        let message = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_elapsed| {
                ActionFailure::Transport(format!(
                    "no reply on {subject} within {}ms",
                    self.timeout.as_millis()
                ))
            })?
            .map_err(|e| ActionFailure::Transport(format!("request on {subject} failed: {e}")))?;
        serde_json::from_slice(&message.payload)
            .map_err(|e| ActionFailure::Transport(format!("malformed reply on {subject}: {e}")))
    }

    /// Forward queued notifications as announcements until every
    /// [`Announcer`](voicepass_core::Announcer) is dropped.
    pub fn spawn_announcer(
        &self,
        mut notifications: mpsc::Receiver<Notification>,
        channel_id: ChannelId,
    ) -> JoinHandle<()> {
        let client = self.client.clone();
        let subject = self.subjects.announce.clone();
        tokio::spawn(async move {
            while let Some(notification) = notifications.recv().await {
                publish_announcement(&client, &subject, Announcement {
                    channel_id,
                    notification,
                })
                .await;
            }
            debug!("Announcement forwarder stopped");
        })
    }
}

async fn publish_announcement(client: &async_nats::Client, subject: &str, announcement: Announcement) {
    let member_id = announcement.notification.member_id();
    let payload = match serde_json::to_vec(&announcement) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(member_id = %member_id, error = %e, "Failed to serialize announcement");
            return;
        }
    };
    if let Err(e) = client.publish(subject.to_owned(), payload.into()).await {
        warn!(subject = subject, member_id = %member_id, error = %e, "Failed to publish announcement");
    }
}

impl GuildActions for NatsGateway {
    async fn perform(&self, effect: &GuildEffect) -> Result<(), ActionFailure> {
        let reply: ActionReply = self.request(&self.subjects.actions, effect).await?;
        debug!(member_id = %effect.member_id(), effect = ?effect, ok = reply.failure.is_none(), "Guild action answered");
        reply.into_result()
    }
}

impl RosterSource for NatsGateway {
    async fn roster(&self) -> Result<Vec<RosterEntry>, ActionFailure> {
        self.request(&self.subjects.roster, &()).await
    }
}

impl std::fmt::Debug for NatsGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NatsGateway")
            .field("subjects", &self.subjects)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use voicepass_core::config::MessagingConfig;
    use voicepass_types::MemberId;

    use super::*;

    #[test]
    fn announcement_wire_shape() {
        let announcement = Announcement {
            channel_id: ChannelId(9),
            notification: Notification::LevelUp {
                member_id: MemberId(4),
                new_level: 2,
            },
        };
        let value = serde_json::to_value(&announcement).unwrap();
        assert_eq!(value["channel_id"], 9);
        let back: Announcement = serde_json::from_value(value).unwrap();
        assert_eq!(back, announcement);
    }

    // Requires a live NATS server (docker compose up -d).
    #[tokio::test]
    #[ignore = "requires live NATS server"]
    async fn roster_times_out_without_a_gateway() {
        let subjects = Subjects::new(&MessagingConfig::default());
        let gateway = NatsGateway::connect("nats://localhost:4222", subjects, Duration::from_millis(200))
            .await
            .unwrap();
        let result = gateway.roster().await;
        assert!(matches!(result, Err(ActionFailure::Transport(_))));
    }
}
