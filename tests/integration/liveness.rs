//! Ranking order, expiry sweeping, re-probing, and list invariants.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;

use beacon_registry::sweeper::{reping_once, sweep_once};
use beacon_registry::{Clock, RecordStore};

use crate::*;

#[tokio::test]
async fn lower_ping_ranks_higher_all_else_equal() {
    let game_a = fake_game_server().await;
    let game_b = fake_game_server().await;
    let mut h = Harness::new();

    let mut fast = start_payload(game_a.port());
    fast["name"] = "Fast".into();
    let mut slow = start_payload(game_b.port());
    slow["name"] = "Slow".into();

    h.submit(&fast.to_string());
    h.submit(&slow.to_string());
    h.drain().await;

    // Loopback probes both measured ~0; pin the pings to the scenario
    // values and republish.
    for (name, ping) in [("Fast", 0.05), ("Slow", 0.6)] {
        let mut rec = h
            .store
            .online_records()
            .into_iter()
            .find(|r| r.name == name)
            .unwrap();
        rec.ping = ping;
        h.store.upsert(rec);
    }
    h.publisher.publish(&h.store, h.clock.now_unix()).unwrap();

    let names: Vec<String> = h.list().list.iter().map(|e| e.name.clone()).collect();
    assert_eq!(names, vec!["Fast", "Slow"]);
}

#[tokio::test]
async fn sweeper_delists_silent_servers() {
    let game = fake_game_server().await;
    let mut h = Harness::new();

    h.submit(&start_payload(game.port()).to_string());
    h.drain().await;
    assert_eq!(h.list().total.servers, 1);

    // Quiet for longer than the purge window.
    h.clock.advance(400);
    let offlined = sweep_once(
        &h.store,
        &h.tracker,
        h.clock.as_ref(),
        Duration::from_secs(360),
    );
    assert_eq!(offlined, 1);
    h.publisher.publish(&h.store, h.clock.now_unix()).unwrap();

    let doc = h.list();
    assert_eq!(doc.total.servers, 0);
    assert!(doc.list.is_empty());

    // Offline, not gone: the record keeps its last data.
    assert_eq!(h.store.len(), 1);
    let rec = h.store.find_for_announce(None, LOOPBACK, game.port()).unwrap();
    assert!(!rec.online);
    assert_eq!(rec.name, "Integration Server");

    // A sweep right after changes nothing.
    let offlined = sweep_once(
        &h.store,
        &h.tracker,
        h.clock.as_ref(),
        Duration::from_secs(360),
    );
    assert_eq!(offlined, 0);
}

#[tokio::test]
async fn reping_delists_server_that_went_dark() {
    let game = fake_game_server().await;
    let silent = dead_port().await;
    let mut h = Harness::new();

    let mut payload = start_payload(game.port());
    payload["world_uuid"] = "01234567-89ab-cdef-0123-456789abcdef".into();
    h.submit(&payload.to_string());
    h.drain().await;
    assert_eq!(h.online_count(), 1);

    // The server process dies between re-probe passes: same identity,
    // endpoint no longer answering.
    let mut rec = h.store.online_records().pop().unwrap();
    rec.port = silent;
    h.store.upsert(rec);

    let offlined = reping_once(&h.store, h.clock.as_ref(), Arc::new(Semaphore::new(4))).await;
    assert_eq!(offlined, 1);
    assert_eq!(h.online_count(), 0);
}

#[tokio::test]
async fn total_max_never_decreases() {
    let game_a = fake_game_server().await;
    let game_b = fake_game_server().await;
    let mut h = Harness::new();

    let mut other = start_payload(game_b.port());
    other["name"] = "Other".into();
    h.submit(&start_payload(game_a.port()).to_string());
    h.submit(&other.to_string());
    h.drain().await;

    let doc = h.list();
    assert_eq!(doc.total_max.servers, 2);
    assert_eq!(doc.total_max.clients, 6);

    h.submit(&serde_json::json!({"action": "delete", "port": game_a.port()}).to_string());

    let doc = h.list();
    assert_eq!(doc.total.servers, 1);
    assert_eq!(doc.total_max.servers, 2, "all-time maximum must persist");
    assert_eq!(doc.total_max.clients, 6);
}

#[tokio::test]
async fn published_totals_match_online_records() {
    let game_a = fake_game_server().await;
    let game_b = fake_game_server().await;
    let mut h = Harness::new();

    let mut other = start_payload(game_b.port());
    other["name"] = "Other".into();
    other["clients_list"] = serde_json::json!(["x", "y"]);
    h.submit(&start_payload(game_a.port()).to_string());
    h.submit(&other.to_string());
    h.drain().await;

    let doc = h.list();
    let records = h.store.online_records();
    assert_eq!(doc.total.servers, records.len());
    assert_eq!(
        doc.total.clients,
        records.iter().map(|r| r.clients as u64).sum::<u64>()
    );
    assert_eq!(
        doc.list.iter().map(|e| e.clients_list.len()).sum::<usize>() as u64,
        doc.total.clients
    );
}
