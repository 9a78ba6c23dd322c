//! beacon-registry — the announcement reconciliation and ranking engine.
//!
//! Takes validated announces, verifies the claimed address, probes the
//! server over its UDP protocol, merges the result into tracked state,
//! and publishes a ranked list document.

pub mod announce;
pub mod ban;
pub mod clock;
pub mod errors;
pub mod geoip;
pub mod probe;
pub mod publish;
pub mod ranking;
pub mod reconcile;
pub mod record;
pub mod store;
pub mod sweeper;
pub mod verify;
pub mod worker;

pub use announce::{AnnounceResponse, AnnounceService};
pub use ban::BanList;
pub use clock::{Clock, ManualClock, SystemClock};
pub use errors::{PendingError, PendingErrorTracker};
pub use geoip::{ContinentLookup, NoGeoip};
pub use probe::ProbeError;
pub use publish::Publisher;
pub use record::{Identity, PublicServerEntry, ServerRecord};
pub use store::{MemoryStore, RecordStore};
pub use worker::{AnnounceJob, AnnounceWorker};
