//! Merging an announce into tracked record state.
//!
//! Pure: given the prior record (if any), a validated announce, and the
//! probe results, produce the next record. Committing the result to the
//! store is the caller's job, so the previous state stays authoritative
//! until the probe has succeeded.

use std::net::IpAddr;

use beacon_core::schema::{Action, Announce};

use crate::record::ServerRecord;

/// Tunables for the merge.
#[derive(Debug, Clone, Copy)]
pub struct ReconcilePolicy {
    /// Weight of past player counts in the smoothed popularity, in [0, 1).
    pub popularity_factor: f64,
}

impl Default for ReconcilePolicy {
    fn default() -> Self {
        Self {
            popularity_factor: 0.9,
        }
    }
}

/// Probe-time facts merged alongside the announce itself.
#[derive(Debug, Clone)]
pub struct MergeContext {
    pub announce_ip: IpAddr,
    pub now: u64,
    /// Measured round-trip, seconds.
    pub ping: f64,
    pub geo_continent: Option<String>,
    /// The claimed address only passed verification with a warning.
    pub address_warned: bool,
}

/// Merge an announce into the prior record, or create a fresh one.
///
/// `action` must be start or update; deletes never reach the merge. An
/// update with no prior record is treated as a start (the service layer
/// gates whether that is allowed at all).
pub fn merge(
    existing: Option<&ServerRecord>,
    ann: &Announce,
    ctx: &MergeContext,
    policy: ReconcilePolicy,
) -> ServerRecord {
    debug_assert!(ann.action != Action::Delete);

    let num_clients = ann.clients;
    let initial = existing.is_none();

    let mut rec = match existing {
        Some(old) => old.clone(),
        None => fresh(ann, ctx),
    };

    if initial {
        // Cold start: no smoothing, the first observation is the average.
        rec.clients_top = num_clients;
        rec.popularity = num_clients as f64;
    } else {
        rec.clients_top = rec.clients_top.max(num_clients);
        let f = policy.popularity_factor;
        rec.popularity = rec.popularity * f + num_clients as f64 * (1.0 - f);
    }

    // Start-only fields: the announcing server only reports these in its
    // "start" payload, so an update must not clobber them.
    if initial || ann.action == Action::Start {
        rec.start_time = ctx.now;
        rec.mods = ann.mods.clone().unwrap_or_default();
        rec.mapgen = ann.mapgen.clone();
        rec.default_privs = ann.default_privs.clone();
        rec.is_dedicated = ann.dedicated;
        rec.rollback_enabled = ann.rollback;
        rec.can_see_far_names = ann.can_see_far_names;
    }

    rec.online = true;
    rec.address = ann.address.clone();
    rec.port = ann.port;
    rec.announce_ip = ctx.announce_ip;
    rec.server_id = ann.server_id.clone();
    rec.clients_list = ann.clients_list.clone().unwrap_or_default();
    rec.clients = num_clients;
    rec.clients_max = ann.clients_max;
    rec.game_time = ann.game_time;
    rec.lag = ann.lag;
    rec.ping = ctx.ping;
    rec.version = ann.version.clone();
    rec.proto_min = ann.proto_min;
    rec.proto_max = ann.proto_max;
    rec.game_id = ann.game_id.clone();
    rec.url = ann.url.clone();
    rec.name = ann.name.clone();
    rec.description = ann.description.clone();
    rec.geo_continent = ctx.geo_continent.clone();
    rec.creative = ann.creative;
    rec.damage_enabled = ann.damage;
    rec.pvp_enabled = ann.pvp;
    rec.password_required = ann.password;
    rec.last_update = ctx.now;

    if ctx.address_warned {
        rec.address_verification_required = true;
    }

    rec
}

/// A brand-new record. Creation-only fields are set here; everything else
/// is overwritten by the shared merge path.
fn fresh(ann: &Announce, ctx: &MergeContext) -> ServerRecord {
    ServerRecord {
        world_id: ann.world_id.clone(),
        online: true,
        address: ann.address.clone(),
        port: ann.port,
        announce_ip: ctx.announce_ip,
        server_id: None,
        clients_list: Vec::new(),
        clients: 0,
        clients_top: 0,
        clients_max: 0,
        first_seen: ctx.now,
        start_time: ctx.now,
        last_update: ctx.now,
        total_uptime: 0.0,
        down_time: None,
        game_time: 0,
        lag: None,
        ping: 0.0,
        mods: Vec::new(),
        version: String::new(),
        proto_min: 0,
        proto_max: 0,
        game_id: String::new(),
        mapgen: None,
        url: None,
        default_privs: None,
        name: String::new(),
        description: String::new(),
        popularity: 0.0,
        geo_continent: None,
        creative: false,
        is_dedicated: false,
        damage_enabled: false,
        pvp_enabled: false,
        password_required: false,
        rollback_enabled: false,
        can_see_far_names: false,
        address_verification_required: false,
    }
}

// ── Test fixtures ─────────────────────────────────────────────────────────────
