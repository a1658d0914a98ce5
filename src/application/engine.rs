use crate::application::command::Command;
use crate::config::EngineConfig;
use crate::domain::ids::{PurchaseId, QrToken, payment_reference};
use crate::domain::ports::{Batch, Precondition, RecordStoreBox, Snapshot, SnapshotFeed};
use crate::domain::purchase::{NewPurchase, Purchase, PurchaseStatus};
use crate::domain::user::User;
use crate::error::{CafeError, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

/// The decision layer between staff actions and the record store.
///
/// `CafeEngine` holds no state of its own. Every operation reads a fresh
/// snapshot, decides on the transition, and submits one guarded batch, so
/// the store stays authoritative and a stale read fails the write instead of
/// overwriting a newer one.
pub struct CafeEngine {
    store: RecordStoreBox,
    config: EngineConfig,
}

impl CafeEngine {
    /// Creates a new `CafeEngine` instance.
    ///
    /// # Arguments
    ///
    /// * `store` - The record store holding purchases, check-ins and users.
    /// * `config` - Engine tunables.
    pub fn new(store: RecordStoreBox, config: EngineConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub async fn snapshot(&self) -> Result<Arc<Snapshot>> {
        self.store.snapshot().await
    }

    /// Live view of the store, one full snapshot per applied write.
    pub fn subscribe(&self) -> SnapshotFeed {
        self.store.subscribe()
    }

    pub async fn register_guest(&self, user: User) -> Result<()> {
        debug!(guest = %user.id, "registering guest");
        self.commit(Batch::new().put_user(user)).await
    }

    /// Records a completed sale; the purchase starts out `paid`.
    pub async fn sell(&self, order: NewPurchase, now: DateTime<Utc>) -> Result<Purchase> {
        self.open_purchase(order, PurchaseStatus::Paid, now).await
    }

    /// Records a sale whose payment is still in flight (`pending`).
    pub async fn reserve(&self, order: NewPurchase, now: DateTime<Utc>) -> Result<Purchase> {
        self.open_purchase(order, PurchaseStatus::Pending, now).await
    }

    async fn open_purchase(
        &self,
        mut order: NewPurchase,
        status: PurchaseStatus,
        now: DateTime<Utc>,
    ) -> Result<Purchase> {
        if order.amount.is_sign_negative() {
            return Err(CafeError::ValidationError(
                "Amount must not be negative".to_string(),
            ));
        }

        let prefix = &self.config.qr_prefix;
        let qr_code = order
            .qr_code
            .take()
            .unwrap_or_else(|| QrToken::generate(prefix, now));
        let purchase = Purchase::new(
            PurchaseId::generate(),
            order,
            qr_code,
            payment_reference(prefix, now),
            status,
            now,
        );

        let mut batch = Batch::new().require(Precondition::TokenUnused {
            token: purchase.qr_code.clone(),
            owner: purchase.id.clone(),
        });
        // A guest holds at most one live pass per service.
        if !purchase.service_type.is_one_off() {
            batch = batch.require(Precondition::NoPaidPurchase {
                guest: purchase.guest_id.clone(),
                service: purchase.service_id.clone(),
                at: now,
            });
        }
        self.commit(batch.put_purchase(purchase.clone())).await?;

        debug!(purchase = %purchase.id, code = %purchase.qr_code, %status, "purchase recorded");
        Ok(purchase)
    }

    /// Marks a pending purchase as paid once the payment provider confirms.
    pub async fn confirm_payment(&self, code: &str, now: DateTime<Utc>) -> Result<Purchase> {
        let stored = self.lookup(code).await?;
        let mut purchase = stored.clone();
        purchase.confirm_payment(now)?;

        let batch = Batch::new()
            .require(Precondition::PurchaseUnchanged(stored))
            .put_purchase(purchase.clone());
        self.commit(batch).await?;

        debug!(purchase = %purchase.id, "payment confirmed");
        Ok(purchase)
    }

    /// Applies one staff action.
    pub async fn process_command(&self, command: Command) -> Result<()> {
        match command {
            Command::Guest(user) => self.register_guest(user).await,
            Command::Sell { order, at } => self.sell(order, at).await.map(drop),
            Command::Reserve { order, at } => self.reserve(order, at).await.map(drop),
            Command::Confirm { code, at } => self.confirm_payment(code.as_str(), at).await.map(drop),
            Command::Redeem { code, at } => self.redeem(code.as_str(), at).await.map(drop),
            Command::Pause { code, at } => {
                let session = self.active_session(code.as_str()).await?;
                self.pause(&session.id, at).await.map(drop)
            }
            Command::Resume { code, at } => {
                let session = self.active_session(code.as_str()).await?;
                self.resume(&session.id, at).await.map(drop)
            }
            Command::CheckOut { code, at } => {
                let session = self.active_session(code.as_str()).await?;
                self.check_out(&session.id, at).await.map(drop)
            }
        }
    }

    pub(crate) async fn commit(&self, batch: Batch) -> Result<()> {
        self.store.transact(batch).await
    }
}
