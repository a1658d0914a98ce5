use super::check_in::CheckIn;
use super::ids::{CheckInId, GuestId, PurchaseId, QrToken, ServiceId};
use super::purchase::{Purchase, PurchaseStatus};
use super::user::User;
use crate::error::{CafeError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

/// Full copy of every collection the engine reads.
///
/// Records are kept ordered by creation time. Lookups are linear scans;
/// there are no secondary indices.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub purchases: Vec<Purchase>,
    pub check_ins: Vec<CheckIn>,
    pub users: Vec<User>,
}

impl Snapshot {
    pub fn purchase(&self, id: &PurchaseId) -> Option<&Purchase> {
        self.purchases.iter().find(|p| &p.id == id)
    }

    pub fn purchase_by_token(&self, token: &QrToken) -> Option<&Purchase> {
        self.purchases.iter().find(|p| &p.qr_code == token)
    }

    pub fn check_in(&self, id: &CheckInId) -> Option<&CheckIn> {
        self.check_ins.iter().find(|c| &c.id == id)
    }

    /// Most recently opened session of `purchase` that is still active.
    pub fn active_check_in(&self, purchase: &PurchaseId) -> Option<&CheckIn> {
        self.check_ins
            .iter()
            .rev()
            .find(|c| &c.purchase_id == purchase && c.is_active)
    }

    pub fn user(&self, id: &GuestId) -> Option<&User> {
        self.users.iter().find(|u| &u.id == id)
    }

    /// Checks every precondition of `batch` and returns the state after its
    /// writes. Nothing is applied if any precondition fails.
    pub fn apply(&self, batch: &Batch) -> Result<Snapshot> {
        for precondition in &batch.preconditions {
            self.verify(precondition)?;
        }

        let mut next = self.clone();
        for mutation in &batch.mutations {
            match mutation {
                Mutation::PutPurchase(purchase) => {
                    upsert(&mut next.purchases, purchase.clone(), |p| &p.id);
                    next.purchases.sort_by(|a, b| {
                        (a.created_at, &a.id).cmp(&(b.created_at, &b.id))
                    });
                }
                Mutation::PutCheckIn(check_in) => {
                    upsert(&mut next.check_ins, check_in.clone(), |c| &c.id);
                    next.check_ins.sort_by(|a, b| {
                        (a.created_at, &a.id).cmp(&(b.created_at, &b.id))
                    });
                }
                Mutation::PutUser(user) => upsert(&mut next.users, user.clone(), |u| &u.id),
            }
        }
        Ok(next)
    }

    fn verify(&self, precondition: &Precondition) -> Result<()> {
        match precondition {
            Precondition::PurchaseStatus { id, status } => {
                match self.purchase(id) {
                    Some(current) if current.status == *status => Ok(()),
                    _ => Err(CafeError::Conflict(format!("purchase {id}"))),
                }
            }
            Precondition::PurchaseUnchanged(expected) => match self.purchase(&expected.id) {
                Some(current) if current == expected => Ok(()),
                _ => Err(CafeError::Conflict(format!("purchase {}", expected.id))),
            },
            Precondition::CheckInUnchanged(expected) => match self.check_in(&expected.id) {
                Some(current) if current == expected => Ok(()),
                _ => Err(CafeError::Conflict(format!("check-in {}", expected.id))),
            },
            Precondition::TokenUnused { token, owner } => {
                let taken = self
                    .purchases
                    .iter()
                    .any(|p| &p.qr_code == token && &p.id != owner);
                if taken {
                    Err(CafeError::DuplicateToken(token.clone()))
                } else {
                    Ok(())
                }
            }
            Precondition::NoPaidPurchase { guest, service, at } => {
                let held = self.purchases.iter().any(|p| {
                    &p.guest_id == guest
                        && &p.service_id == service
                        && p.effective_status(*at) == PurchaseStatus::Paid
                });
                if held {
                    Err(CafeError::ServiceAlreadyActive {
                        guest: guest.clone(),
                        service: service.clone(),
                    })
                } else {
                    Ok(())
                }
            }
            Precondition::NoActiveCheckIn { purchase } => {
                if self.active_check_in(purchase).is_some() {
                    Err(CafeError::SessionAlreadyActive(purchase.clone()))
                } else {
                    Ok(())
                }
            }
        }
    }
}

fn upsert<T, K: PartialEq>(records: &mut Vec<T>, record: T, key: impl Fn(&T) -> &K) {
    match records.iter().position(|r| key(r) == key(&record)) {
        Some(index) => records[index] = record,
        None => records.push(record),
    }
}

/// Condition a store re-checks under its write lock before applying a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum Precondition {
    /// The purchase exists and its stored status is `status`.
    PurchaseStatus { id: PurchaseId, status: PurchaseStatus },
    /// The stored purchase is exactly this record.
    PurchaseUnchanged(Purchase),
    /// The stored check-in is exactly this record.
    CheckInUnchanged(CheckIn),
    /// No purchase other than `owner` carries `token`.
    TokenUnused { token: QrToken, owner: PurchaseId },
    /// `guest` holds no purchase of `service` that is `paid` at `at`.
    NoPaidPurchase {
        guest: GuestId,
        service: ServiceId,
        at: DateTime<Utc>,
    },
    /// The purchase has no active check-in.
    NoActiveCheckIn { purchase: PurchaseId },
}

/// Whole-record write.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    PutPurchase(Purchase),
    PutCheckIn(CheckIn),
    PutUser(User),
}

/// Writes applied together or not at all.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    preconditions: Vec<Precondition>,
    mutations: Vec<Mutation>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require(mut self, precondition: Precondition) -> Self {
        self.preconditions.push(precondition);
        self
    }

    pub fn put_purchase(mut self, purchase: Purchase) -> Self {
        self.mutations.push(Mutation::PutPurchase(purchase));
        self
    }

    pub fn put_check_in(mut self, check_in: CheckIn) -> Self {
        self.mutations.push(Mutation::PutCheckIn(check_in));
        self
    }

    pub fn put_user(mut self, user: User) -> Self {
        self.mutations.push(Mutation::PutUser(user));
        self
    }

    pub fn mutations(&self) -> &[Mutation] {
        &self.mutations
    }
}

/// Subscription to store snapshots.
///
/// Every applied batch publishes a new full snapshot; intermediate ones may be
/// skipped by slow readers, the latest is never lost.
#[derive(Debug)]
pub struct SnapshotFeed {
    current: Arc<Snapshot>,
    receiver: watch::Receiver<Arc<Snapshot>>,
}

impl SnapshotFeed {
    pub fn new(mut receiver: watch::Receiver<Arc<Snapshot>>) -> Self {
        let current = receiver.borrow_and_update().clone();
        Self { current, receiver }
    }

    /// Snapshot seen by the last `new`/`changed` call.
    pub fn current(&self) -> &Arc<Snapshot> {
        &self.current
    }

    /// Waits for the next published snapshot.
    /// Returns `None` once the store has been dropped.
    pub async fn changed(&mut self) -> Option<Arc<Snapshot>> {
        self.receiver.changed().await.ok()?;
        let snapshot = self.receiver.borrow_and_update().clone();
        self.current = snapshot.clone();
        Some(snapshot)
    }

    /// Stream that yields the latest snapshot first, then one per change.
    pub fn into_stream(self) -> WatchStream<Arc<Snapshot>> {
        WatchStream::new(self.receiver)
    }
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn snapshot(&self) -> Result<Arc<Snapshot>>;
    fn subscribe(&self) -> SnapshotFeed;
    async fn transact(&self, batch: Batch) -> Result<()>;
}

pub type RecordStoreBox = Box<dyn RecordStore>;
