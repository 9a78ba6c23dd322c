//! beacon integration test harness.
//!
//! These tests drive the real engine end to end: announces go through the
//! synchronous pipeline, the async finisher resolves and probes scripted
//! UDP game servers on loopback, and assertions read the published list
//! document back. Only the HTTP layer is bypassed.

mod infra;

mod announce_flow;
mod liveness;

pub use infra::*;
