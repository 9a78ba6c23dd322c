//! Periodic maintenance: expiring stale records and re-probing live ones.
//!
//! Both loops run independently of announce traffic and share the record
//! store with it; every mutation goes through the store, so the announce
//! path never sees a half-written record.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinSet;

use crate::clock::{Clock, SharedClock};
use crate::errors::PendingErrorTracker;
use crate::probe::{probe_endpoints, resolve_udp};
use crate::publish::Publisher;
use crate::record::Identity;
use crate::store::RecordStore;

/// One expiry pass. Returns how many records went offline.
///
/// A server that stopped announcing keeps its last data; it is marked
/// offline, not deleted, so history survives until a storage-level purge.
pub fn sweep_once(
    store: &dyn RecordStore,
    tracker: &PendingErrorTracker,
    clock: &dyn Clock,
    purge_time: Duration,
) -> usize {
    let now = clock.now_unix();
    let cutoff = now.saturating_sub(purge_time.as_secs());

    let stale: Vec<Identity> = store
        .online_records()
        .iter()
        .filter(|r| r.last_update < cutoff)
        .map(|r| r.identity())
        .collect();

    for identity in &stale {
        store.mark_offline(identity, now);
    }

    tracker.cleanup();
    stale.len()
}

/// Expiry loop. Republishes every pass so served uptimes stay current.
pub async fn sweep_loop(
    store: Arc<dyn RecordStore>,
    tracker: PendingErrorTracker,
    publisher: Arc<Publisher>,
    clock: SharedClock,
    purge_time: Duration,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("expiry sweeper shutting down");
                break;
            }
            _ = ticker.tick() => {
                let offlined = sweep_once(store.as_ref(), &tracker, clock.as_ref(), purge_time);
                if offlined > 0 {
                    tracing::info!(offlined, "stale servers marked offline");
                }
                if let Err(e) = publisher.publish(store.as_ref(), clock.now_unix()) {
                    tracing::error!(error = %e, "list publication failed");
                }
            }
        }
    }
}

/// One re-probe pass over every online record. Returns how many went
/// offline. Shares the probe concurrency budget with announce handling.
pub async fn reping_once(
    store: &dyn RecordStore,
    clock: &dyn Clock,
    limit: Arc<Semaphore>,
) -> usize {
    let mut tasks = JoinSet::new();
    for record in store.online_records() {
        let limit = limit.clone();
        tasks.spawn(async move {
            // A closed semaphore means shutdown; leave the record alone.
            let _permit = limit.acquire_owned().await.ok()?;
            let outcome = async {
                let endpoints = resolve_udp(&record.address, record.port).await?;
                probe_endpoints(&endpoints).await
            }
            .await;
            Some((record.identity(), outcome))
        });
    }

    let mut offlined = 0;
    while let Some(joined) = tasks.join_next().await {
        let Ok(Some((identity, outcome))) = joined else {
            continue;
        };
        match outcome {
            Ok(ping) => {
                if let Some(mut record) = store.find(&identity) {
                    record.ping = ping;
                    store.upsert(record);
                }
            }
            Err(e) => {
                tracing::info!(?identity, error = %e, "server went unreachable, delisting");
                store.mark_offline(&identity, clock.now_unix());
                offlined += 1;
            }
        }
    }
    offlined
}

/// Re-probe loop.
pub async fn reping_loop(
    store: Arc<dyn RecordStore>,
    publisher: Arc<Publisher>,
    clock: SharedClock,
    interval: Duration,
    limit: Arc<Semaphore>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // the immediate first tick would re-probe servers we just probed
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("re-probe loop shutting down");
                break;
            }
            _ = ticker.tick() => {
                let offlined = reping_once(store.as_ref(), clock.as_ref(), limit.clone()).await;
                if offlined > 0 {
                    tracing::info!(offlined, "unreachable servers marked offline");
                }
                if let Err(e) = publisher.publish(store.as_ref(), clock.now_unix()) {
                    tracing::error!(error = %e, "list publication failed");
                }
            }
        }
    }
}
