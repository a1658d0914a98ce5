use crate::domain::ports::{Batch, Mutation, RecordStore, Snapshot, SnapshotFeed};
use crate::error::{CafeError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteBatch};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, watch};

/// Column Family for purchases, keyed by purchase id.
pub const CF_PURCHASES: &str = "purchases";
/// Column Family for check-in sessions, keyed by check-in id.
pub const CF_CHECK_INS: &str = "check_ins";
/// Column Family for users, keyed by user id.
pub const CF_USERS: &str = "users";

/// A persistent store implementation using RocksDB.
///
/// Each collection lives in its own Column Family as JSON values. A batch is
/// written with a single `WriteBatch`, so its records land together or not
/// at all. The full snapshot is loaded once at open and kept current after
/// every write.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDbStore {
    db: Arc<DB>,
    state: Arc<watch::Sender<Arc<Snapshot>>>,
    write_gate: Arc<Mutex<()>>,
}

impl RocksDbStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that the required column families exist.
    ///
    /// # Arguments
    ///
    /// * `path` - The filesystem path where the database will be stored.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = [CF_PURCHASES, CF_CHECK_INS, CF_USERS]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        let mut snapshot = Snapshot {
            purchases: load_all(&db, CF_PURCHASES)?,
            check_ins: load_all(&db, CF_CHECK_INS)?,
            users: load_all(&db, CF_USERS)?,
        };
        snapshot
            .purchases
            .sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
        snapshot
            .check_ins
            .sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));

        let (state, _) = watch::channel(Arc::new(snapshot));
        Ok(Self {
            db: Arc::new(db),
            state: Arc::new(state),
            write_gate: Arc::new(Mutex::new(())),
        })
    }

    fn put<T: Serialize>(
        &self,
        write_batch: &mut WriteBatch,
        cf_name: &str,
        key: &str,
        value: &T,
    ) -> Result<()> {
        let cf = self.db.cf_handle(cf_name).ok_or_else(|| missing_cf(cf_name))?;
        let bytes = serde_json::to_vec(value).map_err(|e| {
            CafeError::WriteFailure(Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Serialization error: {}", e),
            )))
        })?;
        write_batch.put_cf(&cf, key.as_bytes(), bytes);
        Ok(())
    }
}

fn missing_cf(name: &str) -> CafeError {
    CafeError::WriteFailure(Box::new(std::io::Error::other(format!(
        "{} column family not found",
        name
    ))))
}

fn load_all<T: DeserializeOwned>(db: &DB, cf_name: &str) -> Result<Vec<T>> {
    let handle = db.cf_handle(cf_name).ok_or_else(|| missing_cf(cf_name))?;

    let mut records = Vec::new();
    for item in db.iterator_cf(&handle, IteratorMode::Start) {
        let (_key, value) = item?;
        let record = serde_json::from_slice(&value).map_err(|e| {
            CafeError::IoError(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Failed to deserialize {} record: {}", cf_name, e),
            ))
        })?;
        records.push(record);
    }
    Ok(records)
}

#[async_trait]
impl RecordStore for RocksDbStore {
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

        let mut write_batch = WriteBatch::default();
        for mutation in batch.mutations() {
            match mutation {
                Mutation::PutPurchase(p) => {
                    self.put(&mut write_batch, CF_PURCHASES, p.id.as_str(), p)?
                }
                Mutation::PutCheckIn(c) => {
                    self.put(&mut write_batch, CF_CHECK_INS, c.id.as_str(), c)?
                }
                Mutation::PutUser(u) => self.put(&mut write_batch, CF_USERS, u.id.as_str(), u)?,
            }
        }
        self.db.write(write_batch)?;

        self.state.send_replace(Arc::new(next));
        Ok(())
    }
}
