//! Ranking — turns a record into the score that orders the published list.
//!
//! Pure function of the record's fields and the current time; no hidden
//! state. The constants below are the tuning surface, keep them named.

use std::sync::LazyLock;

use regex::Regex;

use crate::record::ServerRecord;

// ── Tuning constants ──────────────────────────────────────────────────────────

/// Weight of a client whose name looks auto-generated.
pub const GUEST_CLIENT_WEIGHT: f64 = 1.0 / 8.0;

/// Fraction of advertised capacity above which additional clients subtract
/// points, to spread players across the fleet.
pub const LOAD_PENALTY_THRESHOLD: f64 = 0.80;

/// One age-bonus point per this many seconds of world age (30 days).
pub const AGE_BONUS_UNIT_SECS: f64 = 60.0 * 60.0 * 24.0 * 30.0;

/// Cap on the world-age bonus.
pub const AGE_BONUS_CAP: f64 = 8.0;

/// Popularity contributes at half weight.
pub const POPULARITY_WEIGHT: f64 = 0.5;

/// Cap on the popularity bonus.
pub const POPULARITY_BONUS_CAP: f64 = 4.0;

/// Advertised capacities above this smell like misconfiguration or
/// list-gaming.
pub const UNREALISTIC_CLIENTS_MAX: u32 = 200;

/// Flat penalty for an unrealistic capacity.
pub const UNREALISTIC_CLIENTS_MAX_PENALTY: f64 = 8.0;

/// Ping below this costs nothing.
pub const PING_PENALTY_THRESHOLD: f64 = 0.4;

/// Penalty per second of ping beyond the threshold.
pub const PING_PENALTY_PER_SEC: f64 = 8.0;

/// Window and maximum of the fresh-restart penalty: a server in its first
/// hour of uptime loses up to this many points, decaying linearly.
pub const RESTART_PENALTY_MAX: f64 = 8.0;
pub const RESTART_PENALTY_WINDOW_SECS: u64 = 60 * 60;

/// The restart penalty only applies when the preceding downtime exceeded
/// this; a server bouncing quickly is not double-penalized.
pub const RESTART_DOWNTIME_GRACE_SECS: u64 = 60 * 60;

/// A protocol range spanning from the legacy major version into the
/// current one signals a compat proxy rather than a vanilla server.
pub const LEGACY_PROTO_CEILING: u32 = 32;
pub const CURRENT_PROTO_FLOOR: u32 = 36;

/// Multiplicative discount for such spanning servers.
pub const PROTO_SPAN_FACTOR: f64 = 0.4;

/// Auto-generated guest names: capitalized word plus a numeric tail,
/// e.g. "Guest7312".
static GUEST_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z][a-z]{3,}[1-9][0-9]{2,3}$").unwrap());

// ── Scoring ───────────────────────────────────────────────────────────────────

/// Score a record. Higher sorts earlier.
pub fn score(rec: &ServerRecord, now: u64) -> f64 {
    let mut points = 0.0;

    // One point per client; guest-looking names count fractionally so a
    // bot farm of placeholder names cannot buy rank. When no player list
    // was announced, every client counts at full weight.
    if rec.clients_list.is_empty() {
        points += rec.clients as f64;
    } else {
        for name in &rec.clients_list {
            points += if GUEST_NAME_RE.is_match(name) {
                GUEST_CLIENT_WEIGHT
            } else {
                1.0
            };
        }
    }

    // Past 80% of capacity each client subtracts instead of adds.
    let cap = (rec.clients_max as f64 * LOAD_PENALTY_THRESHOLD).floor();
    if rec.clients as f64 > cap {
        points -= rec.clients as f64 - cap;
    }

    points += (rec.game_time as f64 / AGE_BONUS_UNIT_SECS).min(AGE_BONUS_CAP);

    points += (rec.popularity * POPULARITY_WEIGHT).min(POPULARITY_BONUS_CAP);

    if rec.clients_max > UNREALISTIC_CLIENTS_MAX {
        points -= UNREALISTIC_CLIENTS_MAX_PENALTY;
    }

    if rec.ping > PING_PENALTY_THRESHOLD {
        points -= (rec.ping - PING_PENALTY_THRESHOLD) * PING_PENALTY_PER_SEC;
    }

    let uptime = rec.uptime(now);
    if uptime < RESTART_PENALTY_WINDOW_SECS {
        let down_long_enough = match rec.down_time {
            Some(down) => rec.start_time.saturating_sub(down) > RESTART_DOWNTIME_GRACE_SECS,
            None => true,
        };
        if down_long_enough {
            let remaining = (RESTART_PENALTY_WINDOW_SECS - uptime) as f64
                / RESTART_PENALTY_WINDOW_SECS as f64;
            points -= remaining * RESTART_PENALTY_MAX;
        }
    }

    if rec.proto_min <= LEGACY_PROTO_CEILING && rec.proto_max > CURRENT_PROTO_FLOOR {
        points *= PROTO_SPAN_FACTOR;
    }

    points
}

/// Sort records best-first. The sort is stable, so equal scores keep their
/// input order.
pub fn sort_by_rank(records: &mut [ServerRecord], now: u64) {
    records.sort_by(|a, b| score(b, now).total_cmp(&score(a, now)));
}
