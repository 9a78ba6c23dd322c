//! Async announce finisher.
//!
//! The HTTP side answers immediately; everything slow (resolution,
//! address verification, the UDP probe) happens here, off the request
//! path. Only after the probe succeeds is the merged record committed and
//! the list republished; until then the previous state stays authoritative.
//! Failures never propagate: they are filed in the pending-error tracker
//! for the next announce of the same identity to pick up.

use std::net::IpAddr;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, Semaphore};

use beacon_core::schema::Announce;

use crate::clock::SharedClock;
use crate::errors::{PendingError, PendingErrorTracker};
use crate::geoip::ContinentLookup;
use crate::probe::{probe_endpoints, resolve_udp};
use crate::publish::Publisher;
use crate::reconcile::{merge, MergeContext, ReconcilePolicy};
use crate::store::RecordStore;
use crate::verify::{is_domain, verify_resolved, Verification};

/// One queued announce, past all synchronous checks.
#[derive(Debug, Clone)]
pub struct AnnounceJob {
    pub announce: Announce,
    pub announce_ip: IpAddr,
}

/// Everything the finisher needs. Cheap to clone into spawned tasks.
#[derive(Clone)]
pub struct WorkerContext {
    pub store: Arc<dyn RecordStore>,
    pub tracker: PendingErrorTracker,
    pub publisher: Arc<Publisher>,
    pub geoip: Arc<dyn ContinentLookup>,
    pub clock: SharedClock,
    pub policy: ReconcilePolicy,
}

/// Consumes the announce queue, capped by the shared probe semaphore.
/// Backpressure happens at the queue: when it fills up, the announce
/// endpoint refuses new work instead of growing tasks unbounded.
pub struct AnnounceWorker {
    ctx: WorkerContext,
    job_rx: mpsc::Receiver<AnnounceJob>,
    limit: Arc<Semaphore>,
    shutdown: broadcast::Receiver<()>,
}

impl AnnounceWorker {
    pub fn new(
        ctx: WorkerContext,
        job_rx: mpsc::Receiver<AnnounceJob>,
        limit: Arc<Semaphore>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            ctx,
            job_rx,
            limit,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("announce worker shutting down");
                    break;
                }
                job = self.job_rx.recv() => {
                    let Some(job) = job else { break };
                    let Ok(permit) = self.limit.clone().acquire_owned().await else {
                        break;
                    };
                    let ctx = self.ctx.clone();
                    tokio::spawn(async move {
                        finish_announce(&ctx, job).await;
                        drop(permit);
                    });
                }
            }
        }
    }
}

/// Run the slow half of one announce to completion.
pub async fn finish_announce(ctx: &WorkerContext, job: AnnounceJob) {
    let ann = &job.announce;
    let ip = job.announce_ip;
    let key = (ip, ann.address.clone(), ann.port);

    // Whatever happened last time, this request supersedes it. The entry
    // was already replayed into this request's response.
    ctx.tracker.remove(&key);

    let endpoints = match resolve_udp(&ann.address, ann.port).await {
        Ok(endpoints) => endpoints,
        Err(e) => {
            tracing::warn!(address = %ann.address, port = ann.port, error = %e, "resolution failed");
            ctx.tracker.put(
                key,
                PendingError::fail(format!("Unable to get address info for {}", ann.address)),
            );
            return;
        }
    };

    // Verify the claimed address actually belongs to the announcer. A
    // world id is secret, so an announce carrying one already proved
    // itself; plain endpoint identities have to resolve back.
    let mut address_warned = false;
    if ann.world_id.is_none() && ann.address != ip.to_string() {
        match verify_resolved(&endpoints, &ann.address, ip) {
            Verification::Verified | Verification::Tolerated => {}
            Verification::Warned(msg) => {
                tracing::warn!(address = %ann.address, announce_ip = %ip, "address mismatch tolerated for domain");
                ctx.tracker.put(key.clone(), PendingError::warn(msg));
                address_warned = true;
            }
            Verification::Rejected(msg) => {
                tracing::warn!(address = %ann.address, announce_ip = %ip, "address mismatch rejected");
                ctx.tracker.put(key, PendingError::fail(msg));
                return;
            }
        }
    }

    let geo_continent = endpoints
        .last()
        .and_then(|e| ctx.geoip.continent_code_for(e.ip()));

    let ping = match probe_endpoints(&endpoints).await {
        Ok(ping) => ping,
        Err(e) => {
            tracing::warn!(address = %ann.address, port = ann.port, error = %e, "probe failed");
            let mut msg = format!(
                "Server {} port {} did not respond to ping",
                ann.address, ann.port
            );
            if is_domain(&ann.address) {
                if let Some(first) = endpoints.first() {
                    msg.push_str(&format!(" (tried {})", first.ip()));
                }
            }
            ctx.tracker.put(key, PendingError::fail(msg));
            return;
        }
    };

    // Probe passed: merge against whatever is committed right now and
    // swap the record in atomically.
    let existing = ctx
        .store
        .find_for_announce(ann.world_id.as_deref(), &ann.address, ann.port);
    let now = ctx.clock.now_unix();
    let merge_ctx = MergeContext {
        announce_ip: ip,
        now,
        ping,
        geo_continent,
        address_warned,
    };
    let record = merge(existing.as_ref(), ann, &merge_ctx, ctx.policy);
    tracing::info!(
        address = %record.address,
        port = record.port,
        clients = record.clients,
        ping = record.ping,
        "announce committed"
    );
    ctx.store.upsert(record);

    if let Err(e) = ctx.publisher.publish(ctx.store.as_ref(), now) {
        tracing::error!(error = %e, "list publication failed");
    }
}
