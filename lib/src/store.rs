use crate::types::{Block, UtxoSet};
use serde::{Deserialize, Serialize};
use std::io::Result as IoResult;
use std::sync::Mutex;

/// The single persisted document: the full chain plus the UTXO
/// projection and the time it was written.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ChainSnapshot {
    pub chain: Vec<Block>,
    pub utxo_set: UtxoSet,
    pub timestamp: i64,
}

/// Durable storage seam for the chain state.
///
/// The node binary supplies the JSON-file implementation; tests use
/// [`MemoryStore`]. Save failures are the caller's to log — a failed
/// write must not abort the append that produced the snapshot.
pub trait ChainStore: Send + Sync {
    fn save(&self, snapshot: &ChainSnapshot) -> IoResult<()>;
    fn load(&self) -> IoResult<Option<ChainSnapshot>>;
}

/// In-memory store for tests and ephemeral nodes.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Option<ChainSnapshot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }
}

impl ChainStore for MemoryStore {
    fn save(&self, snapshot: &ChainSnapshot) -> IoResult<()> {
        *self.inner.lock().expect("BUG: snapshot lock poisoned") = Some(snapshot.clone());
        Ok(())
    }

    fn load(&self) -> IoResult<Option<ChainSnapshot>> {
        Ok(self
            .inner
            .lock()
            .expect("BUG: snapshot lock poisoned")
            .clone())
    }
}
