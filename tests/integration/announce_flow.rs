//! End-to-end announce lifecycles: start, update, delete, migration, and
//! the deferred-error replay.

use beacon_registry::RecordStore;

use crate::*;

#[tokio::test]
async fn start_announce_commits_only_after_probe() {
    let game = fake_game_server().await;
    let mut h = Harness::new();

    let resp = h.submit(&start_payload(game.port()).to_string());
    assert_eq!(resp.status, 202);
    assert_eq!(resp.body, "Request has been filed.");

    // Until the probe confirms, the previous (empty) state is what readers
    // see.
    assert_eq!(h.online_count(), 0);

    h.drain().await;

    assert_eq!(h.online_count(), 1);
    let records = h.store.online_records();
    let rec = &records[0];
    assert_eq!(rec.address, LOOPBACK);
    assert_eq!(rec.clients, 3);
    assert_eq!(rec.clients_top, 3);
    assert_eq!(rec.popularity, 3.0);
    assert!(rec.ping > 0.0 && rec.ping < 1.0);

    let doc = h.list();
    assert_eq!(doc.total.servers, 1);
    assert_eq!(doc.total.clients, 3);
    assert_eq!(doc.list[0].name, "Integration Server");
}

#[tokio::test]
async fn update_merges_into_existing_record() {
    let game = fake_game_server().await;
    let mut h = Harness::new();

    h.submit(&start_payload(game.port()).to_string());
    h.drain().await;
    let started = h.store.online_records()[0].start_time;

    h.clock.advance(300);
    let mut update = start_payload(game.port());
    update["action"] = "update".into();
    update["clients_list"] = serde_json::json!(["alice", "bob", "carol", "dave", "erin"]);
    update.as_object_mut().unwrap().remove("mods");
    update.as_object_mut().unwrap().remove("mapgen");

    assert_eq!(h.submit(&update.to_string()).status, 202);
    h.drain().await;

    assert_eq!(h.online_count(), 1);
    let records = h.store.online_records();
    let rec = &records[0];
    assert_eq!(rec.clients, 5);
    assert_eq!(rec.clients_top, 5);
    // exponential smoothing from the cold-start value of 3
    assert!((rec.popularity - (3.0 * 0.9 + 5.0 * 0.1)).abs() < 1e-9);
    // start-only fields survive updates
    assert_eq!(rec.mods, vec!["tnt".to_string()]);
    assert_eq!(rec.mapgen.as_deref(), Some("v7"));
    assert_eq!(rec.start_time, started);
}

#[tokio::test]
async fn identical_updates_keep_the_same_rank_position() {
    let game_a = fake_game_server().await;
    let game_b = fake_game_server().await;
    let mut h = Harness::new();

    let mut big = start_payload(game_a.port());
    big["name"] = "Big".into();
    big["clients_list"] = serde_json::json!(["a", "b", "c", "d", "e", "f"]);
    let mut small = start_payload(game_b.port());
    small["name"] = "Small".into();
    small["clients_list"] = serde_json::json!(["z"]);

    h.submit(&big.to_string());
    h.submit(&small.to_string());
    h.drain().await;

    let mut update = small.clone();
    update["action"] = "update".into();
    for _ in 0..2 {
        h.submit(&update.to_string());
        h.drain().await;
        let listing = h.list();
        let names: Vec<&str> = listing.list.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Big", "Small"]);
    }
}

#[tokio::test]
async fn delete_delists_and_decrements_totals() {
    let game_a = fake_game_server().await;
    let game_b = fake_game_server().await;
    let mut h = Harness::new();

    let mut other = start_payload(game_b.port());
    other["name"] = "Other".into();
    h.submit(&start_payload(game_a.port()).to_string());
    h.submit(&other.to_string());
    h.drain().await;
    assert_eq!(h.list().total.servers, 2);

    let resp = h.submit(&serde_json::json!({"action": "delete", "port": game_a.port()}).to_string());
    assert_eq!(resp.status, 200);
    assert_eq!(resp.body, "Removed from server list.");

    let doc = h.list();
    assert_eq!(doc.total.servers, 1);
    assert!(doc.list.iter().all(|e| e.name == "Other"));
    // the record itself survives offline, data intact
    assert_eq!(h.store.len(), 2);
    assert_eq!(h.online_count(), 1);
}

#[tokio::test]
async fn world_id_migration_keeps_history() {
    let game_a = fake_game_server().await;
    let game_b = fake_game_server().await;
    let mut h = Harness::new();

    const WORLD: &str = "01234567-89ab-cdef-0123-456789abcdef";

    let mut first = start_payload(game_a.port());
    first["world_uuid"] = WORLD.into();
    h.submit(&first.to_string());
    h.drain().await;
    let first_seen = h.store.online_records()[0].first_seen;

    // Same world announces from a different network: new announce IP, new
    // endpoint. The world id vouches for it, so no address verification.
    h.clock.advance(600);
    let mut second = start_payload(game_b.port());
    second["world_uuid"] = WORLD.into();
    second["address"] = LOOPBACK.into();
    second["clients_list"] = serde_json::json!(["alice"]);
    let other_ip = "198.51.100.77".parse().unwrap();
    assert_eq!(h.submit_from(other_ip, &second.to_string()).status, 202);
    h.drain().await;

    let records = h.store.online_records();
    assert_eq!(records.len(), 1, "migration must not duplicate the record");
    let rec = &records[0];
    assert_eq!(rec.port, game_b.port());
    assert_eq!(rec.announce_ip, other_ip);
    assert_eq!(rec.start_time, 1_000_600);
    assert_eq!(rec.first_seen, first_seen);
    // second start wins but history survives
    assert_eq!(rec.clients_top, 3);
}

#[tokio::test]
async fn probe_failure_is_replayed_on_the_next_announce() {
    let silent = dead_port().await;
    let mut h = Harness::new();

    let resp = h.submit(&start_payload(silent).to_string());
    assert_eq!(resp.status, 202);
    h.drain().await;

    // Probe failed: nothing committed, failure filed for this identity.
    assert_eq!(h.online_count(), 0);

    let resp = h.submit(&start_payload(silent).to_string());
    assert_eq!(resp.status, 409);
    assert!(resp.body.contains("previous request encountered"));
    assert!(resp.body.contains("did not respond to ping"));

    // The replay happens exactly once per failure: the queued retry
    // removed the entry before probing again.
    h.drain().await;
    let resp = h.submit(&start_payload(silent).to_string());
    assert_eq!(resp.status, 409, "still failing, so a fresh error was filed");
}
