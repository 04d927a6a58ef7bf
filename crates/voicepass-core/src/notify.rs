//! Best-effort notification sink.
//!
//! Engines hand level-up and reward notifications to an [`Announcer`],
//! which queues them on a bounded channel drained by the transport. A full
//! or closed queue drops the notification with a warning; the profile write
//! that produced it is never rolled back.

use tokio::sync::mpsc;
use tracing::{debug, warn};
use voicepass_types::Notification;

/// Sending half of the notification queue.
#[derive(Debug, Clone)]
pub struct Announcer {
    tx: Option<mpsc::Sender<Notification>>,
}

impl Announcer {
    /// A connected announcer and the receiver the transport drains.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx: Some(tx) }, rx)
    }

    /// An announcer that discards everything.
    pub const fn disabled() -> Self {
        Self { tx: None }
    }

    /// Queue a notification without waiting. Returns whether it was queued.
    pub fn announce(&self, notification: Notification) -> bool {
        let Some(tx) = &self.tx else {
            debug!(member_id = %notification.member_id(), "Announcer disabled, dropping notification");
            return false;
        };
        let member_id = notification.member_id();
        match tx.try_send(notification) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(member_id = %member_id, "Announcement queue full, dropping notification");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!(member_id = %member_id, "Announcement queue closed, dropping notification");
                false
            }
        }
    }
}
