//! beacond — game-server list registry daemon.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{broadcast, mpsc, Semaphore};

use beacon_core::config::BeaconConfig;
use beacon_registry::clock::{SharedClock, SystemClock};
use beacon_registry::reconcile::ReconcilePolicy;
use beacon_registry::worker::WorkerContext;
use beacon_registry::{
    sweeper, AnnounceService, AnnounceWorker, BanList, ContinentLookup, MemoryStore, NoGeoip,
    PendingErrorTracker, Publisher, RecordStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = BeaconConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let config = BeaconConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        BeaconConfig::default()
    });
    tracing::info!(
        purge_time_secs = config.registry.purge_time_secs,
        max_concurrent_probes = config.probe.max_concurrent,
        list_path = %config.registry.list_path.display(),
        "beacond starting"
    );

    // Shared state
    let clock: SharedClock = Arc::new(SystemClock);
    let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
    let tracker = PendingErrorTracker::new(clock.clone());
    let bans = Arc::new(BanList::from_config(&config.bans));
    let publisher = Arc::new(Publisher::new(config.registry.list_path.clone())?);
    let geoip: Arc<dyn ContinentLookup> = Arc::new(NoGeoip);
    tracing::warn!(
        "continent lookup disabled, published records will carry no geo data; \
         inject a GeoIP-backed ContinentLookup to enable it"
    );

    // Announce queue and probe budget
    let (job_tx, job_rx) = mpsc::channel(config.probe.queue_depth);
    let probe_limit = Arc::new(Semaphore::new(config.probe.max_concurrent));

    let announces = AnnounceService::new(
        store.clone(),
        tracker.clone(),
        bans,
        publisher.clone(),
        clock.clone(),
        job_tx,
        config.registry.clone(),
    );

    // ── Shutdown channel ─────────────────────────────────────────────────────
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    // ── Spawn tasks ──────────────────────────────────────────────────────────

    let worker_ctx = WorkerContext {
        store: store.clone(),
        tracker: tracker.clone(),
        publisher: publisher.clone(),
        geoip: geoip.clone(),
        clock: clock.clone(),
        policy: ReconcilePolicy {
            popularity_factor: config.registry.popularity_factor,
        },
    };
    let worker_task = tokio::spawn(
        AnnounceWorker::new(
            worker_ctx,
            job_rx,
            probe_limit.clone(),
            shutdown_tx.subscribe(),
        )
        .run(),
    );

    let sweep_task = tokio::spawn(sweeper::sweep_loop(
        store.clone(),
        tracker.clone(),
        publisher.clone(),
        clock.clone(),
        config.registry.purge_time(),
        config.registry.sweep_interval(),
        shutdown_tx.subscribe(),
    ));

    let _reping_task = if config.registry.reping_interval_secs > 0 {
        Some(tokio::spawn(sweeper::reping_loop(
            store.clone(),
            publisher.clone(),
            clock.clone(),
            config.registry.reping_interval(),
            probe_limit,
            shutdown_tx.subscribe(),
        )))
    } else {
        tracing::info!("periodic re-probe disabled");
        None
    };

    let api_task = {
        let state = beacon_api::ApiState {
            announces,
            store,
            publisher,
            geoip,
            clock,
        };
        let bind_address = config.network.bind_address.clone();
        let port = config.network.port;
        tokio::spawn(async move {
            if let Err(e) = beacon_api::serve(state, &bind_address, port).await {
                tracing::error!(error = %e, "API server failed");
            }
        })
    };

    // ── Wait for exit ────────────────────────────────────────────────────────

    let mut shutdown_rx = shutdown_tx.subscribe();

    tokio::select! {
        _ = shutdown_rx.recv() => tracing::info!("shutting down"),
        r = worker_task        => tracing::error!("announce worker exited: {:?}", r),
        r = sweep_task         => tracing::error!("expiry sweeper exited: {:?}", r),
        r = api_task           => tracing::error!("API server exited: {:?}", r),
    }

    Ok(())
}
