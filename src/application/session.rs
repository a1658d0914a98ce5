use crate::application::engine::CafeEngine;
use crate::domain::check_in::CheckIn;
use crate::domain::ids::{CheckInId, QrToken};
use crate::domain::ports::{Batch, Precondition, Snapshot};
use crate::domain::purchase::Purchase;
use crate::error::{CafeError, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

/// Fresh reads a check-out gets when racing other sessions of its pass.
pub const CHECK_OUT_ATTEMPTS: usize = 3;

/// A closed session, plus the purchase when its pass progress moved.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckOut {
    pub check_in: CheckIn,
    pub purchase: Option<Purchase>,
}

impl CafeEngine {
    /// The active session opened against the purchase with QR `code`.
    pub async fn active_session(&self, code: &str) -> Result<CheckIn> {
        let purchase = self.lookup(code).await?;
        let snapshot = self.snapshot().await?;
        snapshot
            .active_check_in(&purchase.id)
            .cloned()
            .ok_or_else(|| CafeError::NotFound {
                kind: "active session",
                key: code.trim().to_string(),
            })
    }

    pub async fn pause(&self, id: &CheckInId, now: DateTime<Utc>) -> Result<CheckIn> {
        let (_, stored) = self.load_session(id).await?;
        let mut session = stored.clone();
        session.pause(now)?;

        self.commit(
            Batch::new()
                .require(Precondition::CheckInUnchanged(stored))
                .put_check_in(session.clone()),
        )
        .await?;

        debug!(check_in = %id, "session paused");
        Ok(session)
    }

    pub async fn resume(&self, id: &CheckInId, now: DateTime<Utc>) -> Result<CheckIn> {
        let (_, stored) = self.load_session(id).await?;
        let mut session = stored.clone();
        session.resume(now)?;

        self.commit(
            Batch::new()
                .require(Precondition::CheckInUnchanged(stored))
                .put_check_in(session.clone()),
        )
        .await?;

        debug!(check_in = %id, paused_ms = session.total_paused.num_milliseconds(), "session resumed");
        Ok(session)
    }

    /// Closes a running or paused session.
    ///
    /// For a multi-day pass the same batch counts the visit and, on the last
    /// day-unit, consumes the purchase. If the pass can no longer be counted
    /// against, nothing is written.
    ///
    /// Other sessions of the same pass may close concurrently. When the pass
    /// moved under this write, the check-out is decided again from a fresh
    /// read, up to [`CHECK_OUT_ATTEMPTS`] times.
    pub async fn check_out(&self, id: &CheckInId, now: DateTime<Utc>) -> Result<CheckOut> {
        let mut attempt = 1;
        loop {
            match self.try_check_out(id, now).await {
                Err(CafeError::Conflict(record)) if attempt < CHECK_OUT_ATTEMPTS => {
                    debug!(check_in = %id, attempt, %record, "check-out raced, retrying");
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn try_check_out(&self, id: &CheckInId, now: DateTime<Utc>) -> Result<CheckOut> {
        let (snapshot, stored) = self.load_session(id).await?;
        let mut session = stored.clone();
        session.check_out(now)?;

        let mut batch = Batch::new().require(Precondition::CheckInUnchanged(stored));

        let mut advanced = None;
        if let Some(prior) = snapshot.purchase(&session.purchase_id) {
            let mut purchase = prior.clone();
            if purchase.record_visit(now)? {
                batch = batch
                    .require(Precondition::PurchaseUnchanged(prior.clone()))
                    .put_purchase(purchase.clone());
                advanced = Some(purchase);
            }
        }

        self.commit(batch.put_check_in(session.clone())).await?;

        debug!(
            check_in = %id,
            elapsed_s = session.elapsed(now).num_seconds(),
            progress = ?advanced.as_ref().and_then(|p| p.progress),
            "session closed"
        );
        Ok(CheckOut {
            check_in: session,
            purchase: advanced,
        })
    }

    /// Convenience for callers that hold a QR code rather than a session id.
    pub async fn check_out_by_code(&self, code: &QrToken, now: DateTime<Utc>) -> Result<CheckOut> {
        let session = self.active_session(code.as_str()).await?;
        self.check_out(&session.id, now).await
    }

    async fn load_session(&self, id: &CheckInId) -> Result<(Arc<Snapshot>, CheckIn)> {
        let snapshot = self.snapshot().await?;
        let session = snapshot
            .check_in(id)
            .cloned()
            .ok_or_else(|| CafeError::NotFound {
                kind: "check-in",
                key: id.to_string(),
            })?;
        Ok((snapshot, session))
    }
}
