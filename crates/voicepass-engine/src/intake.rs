//! Subscription loops feeding the core.
//!
//! Presence events are applied one at a time in arrival order so a member's
//! open and close can never be reordered. Commands run concurrently, one
//! task per request. Every loop stops when the shutdown flag flips, which is
//! how the engine stops intake before draining.

use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt as _;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use voicepass_core::{GuildActions, RosterSource, Scheduler, Voicepass};
use voicepass_db::ProfileStore;
use voicepass_types::{CommandReply, CommandRequest, PresenceTransition};

/// Wait for the next message, or `None` once shutdown is requested or the
/// subscription ends.
async fn next_message(
    subscriber: &mut async_nats::Subscriber,
    shutdown: &mut watch::Receiver<bool>,
) -> Option<async_nats::Message> {
    if *shutdown.borrow() {
        return None;
    }
    tokio::select! {
        message = subscriber.next() => message,
        _ = shutdown.changed() => None,
    }
}

/// Apply presence transitions sequentially.
pub fn spawn_presence<S: ProfileStore>(
    mut subscriber: async_nats::Subscriber,
    scheduler: Arc<Scheduler<S>>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(message) = next_message(&mut subscriber, &mut shutdown).await {
            match serde_json::from_slice::<PresenceTransition>(&message.payload) {
                Ok(transition) => {
                    let action = scheduler.on_transition(&transition).await;
                    debug!(member_id = %transition.member.id, action = ?action, "Presence transition applied");
                }
                Err(e) => {
                    warn!(error = %e, "Failed to deserialize presence transition");
                }
            }
        }
        info!("Presence intake stopped");
    })
}

/// Run startup reconciliation on every gateway-ready signal. Only the first
/// successful scan opens sessions.
pub fn spawn_ready<S, R>(
    mut subscriber: async_nats::Subscriber,
    scheduler: Arc<Scheduler<S>>,
    roster: R,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()>
where
    S: ProfileStore,
    R: RosterSource + 'static,
{
    tokio::spawn(async move {
        while next_message(&mut subscriber, &mut shutdown).await.is_some() {
            reconcile(&scheduler, &roster).await;
        }
        info!("Gateway-ready listener stopped");
    })
}

/// One reconciliation attempt. Failures are logged; the guard stays open.
pub async fn reconcile<S: ProfileStore, R: RosterSource>(scheduler: &Scheduler<S>, roster: &R) {
    match scheduler.reconcile(roster, Utc::now()).await {
        Ok(Some(opened)) => info!(opened, "Sessions reconciled from roster"),
        Ok(None) => debug!("Gateway ready again, reconciliation already done"),
        Err(e) => warn!(error = %e, "Reconciliation failed, waiting for next ready signal"),
    }
}

/// Answer commands, one task per request.
pub fn spawn_commands<S, G>(
    mut subscriber: async_nats::Subscriber,
    voicepass: Arc<Voicepass<S, G>>,
    client: async_nats::Client,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()>
where
    S: ProfileStore,
    G: GuildActions + RosterSource,
{
    tokio::spawn(async move {
        let mut in_flight = tokio::task::JoinSet::new();
        while let Some(message) = next_message(&mut subscriber, &mut shutdown).await {
            let voicepass = Arc::clone(&voicepass);
            let client = client.clone();
            in_flight.spawn(async move {
                let reply = match serde_json::from_slice::<CommandRequest>(&message.payload) {
                    Ok(request) => voicepass.handle(request).await,
                    Err(e) => CommandReply::Error {
                        message: format!("malformed command: {e}"),
                    },
                };
                respond(&client, message.reply, &reply).await;
            });
            // Reap finished handlers so the set does not grow unbounded.
            while in_flight.try_join_next().is_some() {}
        }
        while in_flight.join_next().await.is_some() {}
        info!("Command intake stopped");
    })
}

async fn respond(
    client: &async_nats::Client,
    reply_to: Option<async_nats::Subject>,
    reply: &CommandReply,
) {
    let Some(reply_to) = reply_to else {
        debug!("Command without reply subject, reply dropped");
        return;
    };
    match serde_json::to_vec(reply) {
        Ok(payload) => {
            if let Err(e) = client.publish(reply_to, payload.into()).await {
                warn!(error = %e, "Failed to publish command reply");
            }
        }
        Err(e) => warn!(error = %e, "Failed to serialize command reply"),
    }
}
