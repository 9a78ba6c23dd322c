//! Shared fixtures: a scripted loopback game server and a fully wired
//! engine with a manual clock.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use beacon_core::config::{BanConfig, RegistryConfig};
use beacon_core::wire::{PACKET_TYPE_ORIGINAL, PROTOCOL_ID};
use beacon_registry::clock::ManualClock;
use beacon_registry::publish::ListDocument;
use beacon_registry::reconcile::ReconcilePolicy;
use beacon_registry::worker::{finish_announce, AnnounceJob, WorkerContext};
use beacon_registry::{
    AnnounceResponse, AnnounceService, BanList, MemoryStore, NoGeoip, PendingErrorTracker,
    Publisher, RecordStore,
};

pub const LOOPBACK: &str = "127.0.0.1";

/// Spawn a minimal game server on loopback: answers every hello with a
/// peer-id assignment, forever.
pub async fn fake_game_server() -> SocketAddr {
    let socket = UdpSocket::bind((LOOPBACK, 0)).await.unwrap();
    let addr = socket.local_addr().unwrap();
    tokio::spawn(async move {
        let mut buf = [0u8; 64];
        while let Ok((len, peer)) = socket.recv_from(&mut buf).await {
            if len == 8 && buf[7] == PACKET_TYPE_ORIGINAL {
                let mut reply = [0u8; 14];
                reply[..4].copy_from_slice(&PROTOCOL_ID);
                reply[12] = 0x00;
                reply[13] = 0x2a;
                let _ = socket.send_to(&reply, peer).await;
            }
        }
    });
    addr
}

/// A loopback port with nothing listening on it.
pub async fn dead_port() -> u16 {
    let socket = UdpSocket::bind((LOOPBACK, 0)).await.unwrap();
    let port = socket.local_addr().unwrap().port();
    drop(socket);
    port
}

/// The whole engine, minus HTTP: service, store, tracker, publisher, and
/// an inline-drainable job queue.
pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub store: MemoryStore,
    pub tracker: PendingErrorTracker,
    pub publisher: Arc<Publisher>,
    pub service: AnnounceService,
    pub ctx: WorkerContext,
    job_rx: mpsc::Receiver<AnnounceJob>,
    _dir: tempfile::TempDir,
}

impl Harness {
    pub fn new() -> Self {
        // Loopback announces must survive the private-address screen.
        let config = RegistryConfig {
            reject_private_addresses: false,
            ..RegistryConfig::default()
        };

        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(1_000_000));
        let store = MemoryStore::new();
        let tracker = PendingErrorTracker::new(clock.clone());
        let publisher = Arc::new(Publisher::new(dir.path().join("list.json")).unwrap());
        let (job_tx, job_rx) = mpsc::channel(16);

        let service = AnnounceService::new(
            Arc::new(store.clone()),
            tracker.clone(),
            Arc::new(BanList::from_config(&BanConfig::default())),
            publisher.clone(),
            clock.clone(),
            job_tx,
            config,
        );

        let ctx = WorkerContext {
            store: Arc::new(store.clone()),
            tracker: tracker.clone(),
            publisher: publisher.clone(),
            geoip: Arc::new(NoGeoip),
            clock: clock.clone(),
            policy: ReconcilePolicy::default(),
        };

        Self {
            clock,
            store,
            tracker,
            publisher,
            service,
            ctx,
            job_rx,
            _dir: dir,
        }
    }

    pub fn submit(&self, raw: &str) -> AnnounceResponse {
        self.submit_from(LOOPBACK.parse().unwrap(), raw)
    }

    pub fn submit_from(&self, ip: IpAddr, raw: &str) -> AnnounceResponse {
        self.service.submit(ip, raw)
    }

    /// Run every queued job to completion, inline.
    pub async fn drain(&mut self) {
        while let Ok(job) = self.job_rx.try_recv() {
            finish_announce(&self.ctx, job).await;
        }
    }

    pub fn list(&self) -> ListDocument {
        serde_json::from_str(&self.publisher.snapshot()).unwrap()
    }

    pub fn online_count(&self) -> usize {
        self.store.online_records().len()
    }
}

/// A well-formed start announce for a loopback server.
pub fn start_payload(port: u16) -> serde_json::Value {
    serde_json::json!({
        "action": "start",
        "port": port,
        "clients": 3,
        "clients_list": ["alice", "bob", "carol"],
        "clients_max": 10,
        "uptime": 0,
        "game_time": 0,
        "version": "5.9.0",
        "proto_min": 37,
        "proto_max": 42,
        "gameid": "minetest",
        "mapgen": "v7",
        "mods": ["tnt"],
        "name": "Integration Server",
        "description": "Server used by the integration tests."
    })
}
