//! HTTP handlers — thin adapters between axum and the registry engine.

pub mod announce;
pub mod geoip;
pub mod list;

use std::sync::Arc;

use beacon_registry::clock::SharedClock;
use beacon_registry::{AnnounceService, ContinentLookup, Publisher, RecordStore};

#[derive(Clone)]
pub struct ApiState {
    pub announces: AnnounceService,
    pub store: Arc<dyn RecordStore>,
    pub publisher: Arc<Publisher>,
    pub geoip: Arc<dyn ContinentLookup>,
    pub clock: SharedClock,
}

// Re-export handler functions for use in router setup.
pub use announce::{handle_announce, handle_announce_query};
pub use geoip::handle_geoip;
pub use list::{handle_list, handle_server};
