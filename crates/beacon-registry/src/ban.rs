//! Ban list — announcing IPs and servers refused at the door.

use std::collections::HashSet;
use std::net::IpAddr;

use beacon_core::config::BanConfig;

/// Immutable after startup; built from config.
#[derive(Debug, Default, Clone)]
pub struct BanList {
    ips: HashSet<String>,
    /// "host" or "host/port", hosts lowercase without trailing dot.
    servers: HashSet<String>,
}

impl BanList {
    pub fn from_config(config: &BanConfig) -> Self {
        Self {
            ips: config.ips.iter().map(|s| s.to_lowercase()).collect(),
            servers: config
                .servers
                .iter()
                .map(|s| s.to_lowercase())
                .collect(),
        }
    }

    pub fn is_banned_ip(&self, ip: IpAddr) -> bool {
        self.ips.contains(&ip.to_string())
    }

    /// Server-level ban check for an announce.
    ///
    /// Matches the announcing endpoint, and the claimed address both with
    /// and without the port. The claimed address is normalized the same
    /// way ban entries are.
    pub fn is_banned_server(&self, announce_ip: IpAddr, address: &str, port: u16) -> bool {
        if self.servers.contains(&format!("{announce_ip}/{port}")) {
            return true;
        }

        if address != announce_ip.to_string() {
            let normalized = address.to_lowercase();
            let normalized = normalized.trim_end_matches('.');
            if self.servers.contains(&format!("{normalized}/{port}"))
                || self.servers.contains(normalized)
            {
                return true;
            }
        }

        false
    }
}
