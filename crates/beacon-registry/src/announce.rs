//! Synchronous half of announce handling.
//!
//! Everything that can be decided without touching the network happens
//! here, in request context: bans, payload limits, schema validation,
//! address screening, and the delete short-circuit. Surviving announces
//! are queued for the async finisher and answered "filed" right away,
//! with any prior failure for the same identity replayed alongside.

use std::net::IpAddr;
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use beacon_core::config::RegistryConfig;
use beacon_core::schema::{Action, Announce, DEFAULT_PORT};

use crate::ban::BanList;
use crate::clock::SharedClock;
use crate::errors::PendingErrorTracker;
use crate::geoip::canonical_ip;
use crate::publish::Publisher;
use crate::store::RecordStore;
use crate::verify::screen_address;
use crate::worker::AnnounceJob;

/// Transport-agnostic announce outcome. The HTTP layer maps `status`
/// straight onto the response code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnounceResponse {
    pub status: u16,
    pub body: String,
}

impl AnnounceResponse {
    fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// The announce front door.
#[derive(Clone)]
pub struct AnnounceService {
    store: Arc<dyn RecordStore>,
    tracker: PendingErrorTracker,
    bans: Arc<BanList>,
    publisher: Arc<Publisher>,
    clock: SharedClock,
    job_tx: mpsc::Sender<AnnounceJob>,
    config: RegistryConfig,
}

impl AnnounceService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn RecordStore>,
        tracker: PendingErrorTracker,
        bans: Arc<BanList>,
        publisher: Arc<Publisher>,
        clock: SharedClock,
        job_tx: mpsc::Sender<AnnounceJob>,
        config: RegistryConfig,
    ) -> Self {
        Self {
            store,
            tracker,
            bans,
            publisher,
            clock,
            job_tx,
            config,
        }
    }

    /// Process one raw announce payload.
    pub fn submit(&self, announce_ip: IpAddr, raw: &str) -> AnnounceResponse {
        let ip = canonical_ip(announce_ip);

        if self.bans.is_banned_ip(ip) {
            return AnnounceResponse::new(403, "Banned.");
        }

        if raw.len() > self.config.max_announce_bytes {
            return AnnounceResponse::new(413, "JSON data is too big.");
        }

        let value: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(e) => {
                return AnnounceResponse::new(400, format!("Failed to decode JSON: {e}"));
            }
        };
        let Value::Object(mut obj) = value else {
            return AnnounceResponse::new(400, "JSON data is not an object.");
        };

        let action = match Action::from_object(&obj) {
            Ok(action) => action,
            Err(e) => return AnnounceResponse::new(400, e.to_string()),
        };

        // The claimed address falls back to where the announce came from.
        let ip_str = ip.to_string();
        let address_empty = obj
            .get("address")
            .and_then(Value::as_str)
            .map(str::is_empty)
            .unwrap_or(obj.get("address").is_none());
        if address_empty {
            obj.insert("address".into(), Value::from(ip_str.clone()));
        }
        let address = obj
            .get("address")
            .and_then(Value::as_str)
            .unwrap_or(&ip_str)
            .to_string();
        let port = peek_port(&obj);

        if self.bans.is_banned_server(ip, &address, port) {
            return AnnounceResponse::new(403, "Banned.");
        }

        let world_id = obj
            .get("world_uuid")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_owned);

        let existing = self
            .store
            .find_for_announce(world_id.as_deref(), &address, port);

        // Deletes need none of the remaining fields and take effect
        // immediately: offline, republish, done.
        if action == Action::Delete {
            let Some(existing) = existing else {
                return AnnounceResponse::new(200, "Server not found.");
            };
            let now = self.clock.now_unix();
            self.store.mark_offline(&existing.identity(), now);
            if let Err(e) = self.publisher.publish(self.store.as_ref(), now) {
                tracing::error!(error = %e, "list publication failed");
            }
            tracing::info!(address = %existing.address, port = existing.port, "server delisted");
            return AnnounceResponse::new(200, "Removed from server list.");
        }

        let mut ann = match Announce::parse(obj) {
            Ok(ann) => ann,
            Err(e) => return AnnounceResponse::new(400, format!("Invalid JSON data: {e}")),
        };

        if ann.action == Action::Update && existing.is_none() {
            if self.config.allow_update_without_old {
                // Implicit start: start-only fields are backfilled from
                // this update payload, losing their real history.
                ann.action = Action::Start;
            } else {
                return AnnounceResponse::new(404, "Server to update not found.");
            }
        }

        // The address only needs screening when it is new to us: on every
        // start, and on an update that changed it.
        let address_changed = existing
            .as_ref()
            .map(|old| old.address != ann.address)
            .unwrap_or(true);
        if ann.action == Action::Start || address_changed {
            if let Err(e) = screen_address(&ann.address, self.config.reject_private_addresses) {
                return AnnounceResponse::new(400, e.help_text());
            }
        }

        let prior = self.tracker.get(&(ip, ann.address.clone(), ann.port));

        match self.job_tx.try_send(AnnounceJob {
            announce: ann,
            announce_ip: ip,
        }) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::warn!("announce queue full");
                return AnnounceResponse::new(
                    503,
                    "Too many announcements in flight, try again shortly.",
                );
            }
            Err(TrySendError::Closed(_)) => {
                return AnnounceResponse::new(500, "Registry is shutting down.");
            }
        }

        match prior {
            Some(prior) if prior.warning => AnnounceResponse::new(
                409,
                format!(
                    "Request has been filed and the previous one was successful, but take note:\n{}",
                    prior.message
                ),
            ),
            Some(prior) => AnnounceResponse::new(
                409,
                format!(
                    "Request has been filed, but the previous request encountered the following error:\n{}",
                    prior.message
                ),
            ),
            None => AnnounceResponse::new(202, "Request has been filed."),
        }
    }
}

/// Best-effort port peek for the ban check and record lookup, before the
/// schema has run. Accepts the legacy string form; anything unusable
/// falls back to the default (and the schema will reject it properly).
fn peek_port(obj: &Map<String, Value>) -> u16 {
    match obj.get("port") {
        Some(Value::Number(n)) => n
            .as_u64()
            .and_then(|p| u16::try_from(p).ok())
            .unwrap_or(DEFAULT_PORT),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(DEFAULT_PORT),
        _ => DEFAULT_PORT,
    }
}
