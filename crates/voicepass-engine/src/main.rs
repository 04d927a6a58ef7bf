//! Engine binary for Voicepass.
//!
//! Wires the core engines to the profile store and to NATS, then runs
//! until SIGINT or SIGTERM, at which point it drains every open session
//! into the store before exiting.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `voicepass.yaml` (or the path given as the
//!    first argument)
//! 2. Initialize structured logging (tracing)
//! 3. Load the level table and item catalog
//! 4. Connect the profile store
//! 5. Connect to NATS
//! 6. Assemble the engines and start background loops
//! 7. Subscribe to presence, readiness and command subjects
//! 8. Attempt startup reconciliation
//!
//! # Shutdown Sequence
//!
//! 1. Stop intake (presence, readiness, commands)
//! 2. Stop the periodic flush and the deferred-action loop
//! 3. Run every pending deferred action
//! 4. Drain the ledger, retrying transient store failures
//! 5. Flush outstanding announcements and NATS messages

mod error;
mod gateway;
mod intake;
mod subjects;

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use voicepass_core::config::{LoggingConfig, StorageKind, VoicepassConfig};
use voicepass_core::{Announcer, Catalog, Voicepass};
use voicepass_db::{DragonflyProfileStore, MemoryProfileStore, ProfileBackend};
use voicepass_types::ChannelId;

use crate::error::EngineError;
use crate::gateway::NatsGateway;
use crate::subjects::Subjects;

/// Capacity of the announcement queue between the engines and NATS.
const ANNOUNCE_QUEUE: usize = 256;

/// Application entry point for the engine.
///
/// # Errors
///
/// Returns an error if any startup step fails. Failures after startup are
/// logged and do not stop the process.
#[tokio::main]
#[allow(clippy::too_many_lines)]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration.
    let config_path = std::env::args_os()
        .nth(1)
        .map_or_else(|| PathBuf::from("voicepass.yaml"), PathBuf::from);
    let config = VoicepassConfig::load_or_default(&config_path).map_err(EngineError::from)?;

    // 2. Initialize structured logging.
    init_tracing(&config.logging);
    info!(config = %config_path.display(), "voicepass-engine starting");
    info!(
        xp_per_minute = config.accrual.xp_per_minute,
        flush_interval_secs = config.accrual.flush_interval_secs,
        flush_concurrency = config.accrual.flush_concurrency,
        storage = ?config.infrastructure.storage,
        "Configuration loaded"
    );

    // 3. Load catalogs.
    let catalog = Arc::new(Catalog::load(&config.catalog).map_err(EngineError::from)?);
    let snapshot = catalog.snapshot();
    info!(
        levels = snapshot.levels.len(),
        items = snapshot.items.len(),
        "Catalog loaded"
    );
    drop(snapshot);

    // 4. Connect the profile store.
    let store = Arc::new(connect_store(&config).await?);
    info!(backend = store.kind(), "Profile store ready");

    // 5. Connect to NATS.
    let gateway = NatsGateway::connect(
        &config.infrastructure.nats_url,
        Subjects::new(&config.messaging),
        config.messaging.request_timeout(),
    )
    .await?;

    // 6. Assemble engines and background loops.
    let (announcer, notifications) = Announcer::channel(ANNOUNCE_QUEUE);
    let announce_handle =
        gateway.spawn_announcer(notifications, ChannelId(config.messaging.announce_channel_id));
    let voicepass = Arc::new(Voicepass::new(
        Arc::clone(&store),
        Arc::new(gateway.clone()),
        Arc::clone(&catalog),
        announcer,
        &config.accrual,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let flush_handle = Arc::clone(voicepass.scheduler()).spawn_periodic(shutdown_rx.clone());
    let deferred_handle =
        Arc::clone(voicepass.deferred()).spawn(config.accrual.deferred_tick(), shutdown_rx.clone());
    info!(
        flush_interval_secs = config.accrual.flush_interval_secs,
        deferred_tick_ms = config.accrual.deferred_tick_ms,
        "Background loops started"
    );

    // 7. Subscribe.
    let subjects = gateway.subjects().clone();
    let intake_handles = [
        intake::spawn_presence(
            gateway.subscribe(&subjects.presence).await?,
            Arc::clone(voicepass.scheduler()),
            shutdown_rx.clone(),
        ),
        intake::spawn_ready(
            gateway.subscribe(&subjects.ready).await?,
            Arc::clone(voicepass.scheduler()),
            gateway.clone(),
            shutdown_rx.clone(),
        ),
        intake::spawn_commands(
            gateway.subscribe(&subjects.commands).await?,
            Arc::clone(&voicepass),
            gateway.client().clone(),
            shutdown_rx,
        ),
    ];

    // 8. The gateway may already be up; if not, its ready signal retries.
    intake::reconcile(voicepass.scheduler(), &gateway).await;
    info!("voicepass-engine running");

    wait_for_shutdown().await?;
    info!("Shutdown requested, stopping intake");

    // Shutdown 1-2: stop intake and timers.
    if shutdown_tx.send(true).is_err() {
        warn!("All shutdown receivers already gone");
    }
    for handle in intake_handles {
        if let Err(e) = handle.await {
            warn!(error = %e, "Intake task ended abnormally");
        }
    }
    for handle in [flush_handle, deferred_handle] {
        if let Err(e) = handle.await {
            warn!(error = %e, "Background loop ended abnormally");
        }
    }

    // Shutdown 3: pending deferred actions (e.g. timed unmutes).
    let ran = voicepass.deferred().run_all().await;
    info!(ran, "Pending deferred actions executed");

    // Shutdown 4: drain.
    let report = voicepass.scheduler().drain(Utc::now()).await;
    if report.unsettled.is_empty() {
        info!(members = report.members, xp_credited = report.xp_credited, "All sessions settled");
    } else {
        error!(
            members = report.members,
            unsettled = ?report.unsettled,
            "Some session time could not be settled"
        );
    }

    // Shutdown 5: dropping the engines closes the announcement queue.
    drop(voicepass);
    if let Err(e) = announce_handle.await {
        warn!(error = %e, "Announcement forwarder ended abnormally");
    }
    if let Err(e) = gateway.flush().await {
        warn!(error = %e, "Final NATS flush failed");
    }

    info!("voicepass-engine shutdown complete");
    Ok(())
}

/// Install the tracing subscriber. `RUST_LOG` wins over the configured level.
fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Build the configured store backend.
async fn connect_store(config: &VoicepassConfig) -> Result<ProfileBackend, EngineError> {
    match config.infrastructure.storage {
        StorageKind::Memory => {
            warn!("Using in-memory profile store; profiles are lost on exit");
            Ok(ProfileBackend::Memory(MemoryProfileStore::new()))
        }
        StorageKind::Dragonfly => {
            let url = &config.infrastructure.dragonfly_url;
            info!(url = url, "Connecting to Dragonfly");
            let store = DragonflyProfileStore::connect(url, config.infrastructure.store_timeout()).await?;
            Ok(ProfileBackend::Dragonfly(store))
        }
    }
}

/// Resolve on SIGINT, or on SIGTERM where supported.
async fn wait_for_shutdown() -> Result<(), EngineError> {
    #[cfg(unix)]
    {
        let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result?,
            _ = terminate.recv() => info!("SIGTERM received"),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }
    Ok(())
}
