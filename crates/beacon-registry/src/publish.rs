//! Published-list snapshot.
//!
//! Whenever the record set or ranks change, the whole document is rebuilt:
//! ranked public entries plus running totals and all-time maxima. The file
//! is written tmp-then-rename so a client fetching mid-write never sees a
//! truncated document, and an in-memory copy backs the HTTP endpoint.

use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::ranking;
use crate::record::PublicServerEntry;
use crate::store::RecordStore;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Totals {
    pub servers: usize,
    pub clients: u64,
}

/// The exact shape served to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListDocument {
    pub total: Totals,
    pub total_max: Totals,
    pub list: Vec<PublicServerEntry>,
}

struct PublishState {
    max_servers: usize,
    max_clients: u64,
    snapshot: Arc<String>,
}

/// Owns the list file and the in-memory copy of it.
///
/// All publication goes through one mutex, so concurrent regenerations
/// cannot interleave their writes.
pub struct Publisher {
    path: PathBuf,
    state: Mutex<PublishState>,
}

impl Publisher {
    /// Reload all-time maxima and the last snapshot from an existing list
    /// file, if any.
    pub fn new(path: PathBuf) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }

        let mut state = PublishState {
            max_servers: 0,
            max_clients: 0,
            snapshot: Arc::new(empty_document()),
        };

        match fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str::<ListDocument>(&text) {
                Ok(doc) => {
                    state.max_servers = doc.total_max.servers;
                    state.max_clients = doc.total_max.clients;
                    state.snapshot = Arc::new(text);
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e,
                        "existing list file unreadable, starting fresh");
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
        }

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// Rebuild and swap in the document from the store's online records.
    pub fn publish(&self, store: &dyn RecordStore, now: u64) -> anyhow::Result<ListDocument> {
        let mut records = store.online_records();
        ranking::sort_by_rank(&mut records, now);

        let clients: u64 = records.iter().map(|r| r.clients as u64).sum();
        let list: Vec<PublicServerEntry> =
            records.iter().map(|r| r.as_public_entry(now)).collect();

        let mut state = self.state.lock().unwrap();
        state.max_servers = state.max_servers.max(list.len());
        state.max_clients = state.max_clients.max(clients);

        let doc = ListDocument {
            total: Totals {
                servers: list.len(),
                clients,
            },
            total_max: Totals {
                servers: state.max_servers,
                clients: state.max_clients,
            },
            list,
        };

        let text = serde_json::to_string(&doc).context("serializing list document")?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, &text).with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("renaming into {}", self.path.display()))?;

        state.snapshot = Arc::new(text);
        tracing::debug!(
            servers = doc.total.servers,
            clients = doc.total.clients,
            "list published"
        );
        Ok(doc)
    }

    /// The current document text, as last published.
    pub fn snapshot(&self) -> Arc<String> {
        self.state.lock().unwrap().snapshot.clone()
    }
}

fn empty_document() -> String {
    serde_json::to_string(&ListDocument {
        total: Totals::default(),
        total_max: Totals::default(),
        list: Vec::new(),
    })
    .unwrap()
}
