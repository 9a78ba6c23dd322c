//! Tracked state for one announced server.

use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// The key distinguishing one tracked server from another.
///
/// A world id is preferred: it is secret to the operator, so it cannot be
/// spoofed by someone else announcing the same endpoint. The endpoint pair
/// is the legacy fallback.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identity {
    World(String),
    Endpoint(String, u16),
}

/// One tracked server.
///
/// Accumulates across announce sessions: `first_seen`, `clients_top`,
/// `total_uptime`, and `popularity` survive restarts of the announcing
/// server, while `start_time` and the start-only fields are rebaselined on
/// every "start".
#[derive(Debug, Clone)]
pub struct ServerRecord {
    /// Secret world identifier, when the server announced one. Never
    /// published.
    pub world_id: Option<String>,

    pub online: bool,

    /// Operator-claimed connection address.
    pub address: String,
    pub port: u16,

    /// IP the announce actually arrived from.
    pub announce_ip: IpAddr,

    /// Name of the announcing server software.
    pub server_id: Option<String>,

    /// Player names as of the last update.
    pub clients_list: Vec<String>,
    /// Player count as of the last update (list length when a list was sent).
    pub clients: u32,
    /// Highest player count ever seen for this record.
    pub clients_top: u32,
    pub clients_max: u32,

    /// First announcement ever (unix secs).
    pub first_seen: u64,
    /// Start of the current announce session.
    pub start_time: u64,
    /// Most recent update.
    pub last_update: u64,
    /// Seconds this server has been seen online, across sessions.
    pub total_uptime: f64,
    /// Most recent online→offline transition.
    pub down_time: Option<u64>,

    /// Server-reported world age in seconds.
    pub game_time: u64,
    /// Server-reported loop lag.
    pub lag: Option<f64>,
    /// Measured round-trip time, seconds.
    pub ping: f64,

    pub mods: Vec<String>,
    pub version: String,
    pub proto_min: u32,
    pub proto_max: u32,
    pub game_id: String,
    pub mapgen: Option<String>,
    pub url: Option<String>,
    pub default_privs: Option<String>,
    pub name: String,
    pub description: String,

    /// Smoothed running average of the player count.
    pub popularity: f64,

    /// Two-letter continent code from the geo lookup.
    pub geo_continent: Option<String>,

    pub creative: bool,
    pub is_dedicated: bool,
    pub damage_enabled: bool,
    pub pvp_enabled: bool,
    pub password_required: bool,
    pub rollback_enabled: bool,
    pub can_see_far_names: bool,

    /// Sticky: set once the claimed address failed strict verification and
    /// was only soft-accepted. Later updates keep re-warning instead of
    /// silently trusting the address.
    pub address_verification_required: bool,
}

impl ServerRecord {
    pub fn identity(&self) -> Identity {
        match &self.world_id {
            Some(id) => Identity::World(id.clone()),
            None => Identity::Endpoint(self.address.clone(), self.port),
        }
    }

    /// Seconds of the current session.
    pub fn uptime(&self, now: u64) -> u64 {
        now.saturating_sub(self.start_time)
    }

    /// Transition to offline, folding the session into `total_uptime`.
    /// The record keeps its last known data until purged.
    pub fn mark_offline(&mut self, now: u64) {
        self.online = false;
        self.total_uptime += self.uptime(now) as f64;
        self.down_time = Some(now);
    }

    /// The public projection served in the published list.
    pub fn as_public_entry(&self, now: u64) -> PublicServerEntry {
        PublicServerEntry {
            address: self.address.clone(),
            can_see_far_names: self.can_see_far_names,
            clients: self.clients,
            clients_list: self.clients_list.clone(),
            clients_max: self.clients_max,
            clients_top: self.clients_top,
            creative: self.creative,
            damage: self.damage_enabled,
            dedicated: self.is_dedicated,
            description: self.description.clone(),
            game_time: self.game_time,
            gameid: self.game_id.clone(),
            geo_continent: self.geo_continent.clone(),
            lag: self.lag,
            mapgen: self.mapgen.clone(),
            mods: if self.mods.is_empty() {
                None
            } else {
                Some(self.mods.clone())
            },
            name: self.name.clone(),
            password: self.password_required,
            ping: self.ping,
            pop_v: self.popularity,
            port: self.port,
            privs: self.default_privs.clone(),
            proto_max: self.proto_max,
            proto_min: self.proto_min,
            pvp: self.pvp_enabled,
            rollback: self.rollback_enabled,
            server_id: self.server_id.clone(),
            uptime: self.uptime(now),
            url: self.url.clone(),
            version: self.version.clone(),
        }
    }
}

/// What clients browsing the list see. Field names are the legacy wire
/// names; the announcing IP and the world id stay private.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicServerEntry {
    pub address: String,
    pub can_see_far_names: bool,
    pub clients: u32,
    pub clients_list: Vec<String>,
    pub clients_max: u32,
    pub clients_top: u32,
    pub creative: bool,
    pub damage: bool,
    pub dedicated: bool,
    pub description: String,
    pub game_time: u64,
    pub gameid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geo_continent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lag: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mapgen: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mods: Option<Vec<String>>,
    pub name: String,
    pub password: bool,
    pub ping: f64,
    pub pop_v: f64,
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub privs: Option<String>,
    pub proto_max: u32,
    pub proto_min: u32,
    pub pvp: bool,
    pub rollback: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
    pub uptime: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub version: String,
}
