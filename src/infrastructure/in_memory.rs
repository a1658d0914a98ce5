use crate::domain::ports::{Batch, RecordStore, Snapshot, SnapshotFeed};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{Mutex, watch};

/// A thread-safe in-memory record store.
///
/// The current snapshot lives in a `watch` channel; writers serialize on a
/// mutex so preconditions are checked against the state they replace.
/// Ideal for testing or single-station use where persistence is not required.
#[derive(Clone)]
pub struct InMemoryStore {
    state: Arc<watch::Sender<Arc<Snapshot>>>,
    write_gate: Arc<Mutex<()>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::with_snapshot(Snapshot::default())
    }
}

impl InMemoryStore {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with `snapshot`.
    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        let (state, _) = watch::channel(Arc::new(snapshot));
        Self {
            state: Arc::new(state),
            write_gate: Arc::new(Mutex::new(())),
        }
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn snapshot(&self) -> Result<Arc<Snapshot>> {
        Ok(self.state.borrow().clone())
    }

    fn subscribe(&self) -> SnapshotFeed {
        SnapshotFeed::new(self.state.subscribe())
    }

    async fn transact(&self, batch: Batch) -> Result<()> {
        let _guard = self.write_gate.lock().await;
        let current = self.state.borrow().clone();
        let next = current.apply(&batch)?;
        self.state.send_replace(Arc::new(next));
        Ok(())
    }
}
