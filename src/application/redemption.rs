//! QR voucher validation and redemption.
//!
//! Redemption is the only path from `paid` to consumption of a one-off, and
//! its write is guarded on the purchase record it was decided from.

use crate::application::engine::CafeEngine;
use crate::domain::check_in::CheckIn;
use crate::domain::ids::{CheckInId, QrToken};
use crate::domain::ports::{Batch, Precondition};
use crate::domain::purchase::{Purchase, PurchaseStatus};
use crate::domain::user::User;
use crate::error::{CafeError, Result};
use chrono::{DateTime, Utc};
use tracing::debug;

/// Whether a scanned purchase may be redeemed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Eligible,
    /// Consumed or expired; shown read-only.
    AlreadyUsed(PurchaseStatus),
    /// Payment still in flight; shown read-only.
    PaymentPending,
}

/// What the validation screen shows after a scan.
#[derive(Debug, Clone, PartialEq)]
pub struct Validation {
    pub purchase: Purchase,
    pub guest: Option<User>,
    pub verdict: Verdict,
}

impl Validation {
    pub fn is_eligible(&self) -> bool {
        self.verdict == Verdict::Eligible
    }
}

/// Result of a successful redemption.
#[derive(Debug, Clone, PartialEq)]
pub enum Redemption {
    /// A one-off service was used up.
    Consumed(Purchase),
    /// A time-based service started a new session.
    CheckedIn(CheckIn),
}

impl CafeEngine {
    /// Finds the purchase whose QR code exactly matches `code` (trimmed).
    pub async fn lookup(&self, code: &str) -> Result<Purchase> {
        let token = parse_code(code)?;
        let snapshot = self.snapshot().await?;
        snapshot
            .purchase_by_token(&token)
            .cloned()
            .ok_or_else(|| not_found(&token))
    }

    /// Classifies a scanned code without changing anything.
    ///
    /// Used and pending purchases are still returned, with their guest, so
    /// staff can see why the voucher is refused.
    pub async fn validate(&self, code: &str, now: DateTime<Utc>) -> Result<Validation> {
        let token = parse_code(code)?;
        let snapshot = self.snapshot().await?;
        let purchase = snapshot
            .purchase_by_token(&token)
            .cloned()
            .ok_or_else(|| not_found(&token))?;

        let verdict = match purchase.effective_status(now) {
            PurchaseStatus::Paid => Verdict::Eligible,
            PurchaseStatus::Pending => Verdict::PaymentPending,
            status => Verdict::AlreadyUsed(status),
        };
        let guest = snapshot.user(&purchase.guest_id).cloned();

        Ok(Validation {
            purchase,
            guest,
            verdict,
        })
    }

    /// Redeems a voucher: consumes a one-off purchase, or opens a session for
    /// any time-based one.
    ///
    /// The status is re-read here rather than trusted from an earlier
    /// [`validate`](Self::validate), since another station may have redeemed
    /// the code in between.
    pub async fn redeem(&self, code: &str, now: DateTime<Utc>) -> Result<Redemption> {
        let token = parse_code(code)?;
        let snapshot = self.snapshot().await?;
        let purchase = snapshot
            .purchase_by_token(&token)
            .ok_or_else(|| not_found(&token))?;
        purchase.ensure_redeemable(now)?;

        if purchase.service_type.is_one_off() {
            let mut consumed = purchase.clone();
            consumed.consume(now)?;
            let batch = Batch::new()
                .require(Precondition::PurchaseUnchanged(purchase.clone()))
                .put_purchase(consumed.clone());
            self.commit(batch).await?;

            debug!(purchase = %consumed.id, "one-off service consumed");
            return Ok(Redemption::Consumed(consumed));
        }

        // The purchase itself is not written; a concurrent check-out may move
        // its progress without invalidating this session.
        let mut batch = Batch::new().require(Precondition::PurchaseStatus {
            id: purchase.id.clone(),
            status: PurchaseStatus::Paid,
        });
        if self.config().single_active_check_in {
            if snapshot.active_check_in(&purchase.id).is_some() {
                return Err(CafeError::SessionAlreadyActive(purchase.id.clone()));
            }
            batch = batch.require(Precondition::NoActiveCheckIn {
                purchase: purchase.id.clone(),
            });
        }

        let check_in = CheckIn::open(
            CheckInId::generate(),
            purchase.guest_id.clone(),
            purchase.id.clone(),
            now,
        );
        self.commit(batch.put_check_in(check_in.clone())).await?;

        debug!(purchase = %purchase.id, check_in = %check_in.id, "session started");
        Ok(Redemption::CheckedIn(check_in))
    }
}

fn parse_code(code: &str) -> Result<QrToken> {
    QrToken::parse(code).ok_or_else(|| CafeError::ValidationError("Please enter a code".to_string()))
}

fn not_found(token: &QrToken) -> CafeError {
    CafeError::NotFound {
        kind: "purchase",
        key: token.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::engine::tests::{at, engine, order};
    use crate::config::EngineConfig;
    use crate::domain::check_in::SessionState;
    use crate::domain::ids::GuestId;
    use crate::domain::purchase::ServiceType;
    use crate::infrastructure::in_memory::InMemoryStore;
    use chrono::TimeDelta;

    #[tokio::test]
    async fn test_one_off_redeemed_exactly_once() {
        let engine = engine();
        engine.sell(order(ServiceType::OneOff, "T1"), at(0)).await.unwrap();

        let first = engine.redeem("T1", at(10)).await.unwrap();
        let Redemption::Consumed(purchase) = first else {
            panic!("expected consumption");
        };
        assert_eq!(purchase.status, PurchaseStatus::Consumed);
        assert_eq!(purchase.consumed_at, Some(at(10)));

        let second = engine.redeem("T1", at(20)).await;
        assert!(matches!(
            second,
            Err(CafeError::AlreadyConsumed(PurchaseStatus::Consumed))
        ));

        let snapshot = engine.snapshot().await.unwrap();
        assert_eq!(snapshot.purchases[0].consumed_at, Some(at(10)));
        assert!(snapshot.check_ins.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_and_blank_codes() {
        let engine = engine();
        assert!(matches!(
            engine.redeem("NOPE", at(0)).await,
            Err(CafeError::NotFound { kind: "purchase", .. })
        ));
        assert!(matches!(
            engine.validate("   ", at(0)).await,
            Err(CafeError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_manual_entry_is_trimmed() {
        let engine = engine();
        engine.sell(order(ServiceType::OneOff, "T1"), at(0)).await.unwrap();
        let validation = engine.validate("  T1\t", at(1)).await.unwrap();
        assert!(validation.is_eligible());
    }

    #[tokio::test]
    async fn test_validate_shows_used_purchase_with_guest() {
        let engine = engine();
        engine
            .register_guest(User::guest(GuestId::from("g1"), "Ada", "ada@example.com"))
            .await
            .unwrap();
        engine.sell(order(ServiceType::OneOff, "T1"), at(0)).await.unwrap();
        engine.redeem("T1", at(1)).await.unwrap();

        let validation = engine.validate("T1", at(2)).await.unwrap();
        assert_eq!(validation.verdict, Verdict::AlreadyUsed(PurchaseStatus::Consumed));
        assert_eq!(
            validation.guest.as_ref().map(|g| g.name.as_str()),
            Some("Ada")
        );
        assert!(!validation.is_eligible());
    }

    #[tokio::test]
    async fn test_pending_purchase_is_display_only() {
        let engine = engine();
        engine
            .reserve(order(ServiceType::OneOff, "T1"), at(0))
            .await
            .unwrap();

        let validation = engine.validate("T1", at(1)).await.unwrap();
        assert_eq!(validation.verdict, Verdict::PaymentPending);
        assert!(validation.guest.is_none());
        assert!(matches!(
            engine.redeem("T1", at(1)).await,
            Err(CafeError::NotYetPayable)
        ));
        assert_eq!(
            engine.snapshot().await.unwrap().purchases[0].status,
            PurchaseStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_expired_voucher_rejected_without_rewriting_status() {
        let engine = engine();
        let mut weekly = order(ServiceType::Weekly, "T1");
        weekly.valid_until = Some(at(0) + TimeDelta::days(7));
        engine.sell(weekly, at(0)).await.unwrap();

        let late = at(0) + TimeDelta::days(8);
        let validation = engine.validate("T1", late).await.unwrap();
        assert_eq!(validation.verdict, Verdict::AlreadyUsed(PurchaseStatus::Expired));
        assert!(matches!(
            engine.redeem("T1", late).await,
            Err(CafeError::AlreadyConsumed(PurchaseStatus::Expired))
        ));
        assert_eq!(
            engine.snapshot().await.unwrap().purchases[0].status,
            PurchaseStatus::Paid
        );
    }

    #[tokio::test]
    async fn test_time_based_redemption_opens_session() {
        let engine = engine();
        let purchase = engine
            .sell(order(ServiceType::Weekly, "T1"), at(0))
            .await
            .unwrap();

        let Redemption::CheckedIn(session) = engine.redeem("T1", at(5)).await.unwrap() else {
            panic!("expected a session");
        };
        assert_eq!(session.purchase_id, purchase.id);
        assert_eq!(session.guest_id, purchase.guest_id);
        assert_eq!(session.checked_in_at, at(5));
        assert_eq!(session.state(), SessionState::Running);

        // The pass stays paid; progress moves only at checkout.
        let snapshot = engine.snapshot().await.unwrap();
        assert_eq!(snapshot.purchases[0].status, PurchaseStatus::Paid);
        assert_eq!(snapshot.purchases[0].progress.map(|p| p.used), Some(0));
    }

    #[tokio::test]
    async fn test_second_concurrent_session_allowed_by_default() {
        let engine = engine();
        engine.sell(order(ServiceType::Daily, "T1"), at(0)).await.unwrap();
        engine.redeem("T1", at(1)).await.unwrap();
        engine.redeem("T1", at(2)).await.unwrap();

        let snapshot = engine.snapshot().await.unwrap();
        assert_eq!(snapshot.check_ins.iter().filter(|c| c.is_active).count(), 2);
    }

    #[tokio::test]
    async fn test_single_active_session_guard() {
        let config = EngineConfig {
            single_active_check_in: true,
            ..EngineConfig::default()
        };
        let engine = CafeEngine::new(Box::new(InMemoryStore::new()), config);
        engine.sell(order(ServiceType::Daily, "T1"), at(0)).await.unwrap();
        engine.redeem("T1", at(1)).await.unwrap();

        assert!(matches!(
            engine.redeem("T1", at(2)).await,
            Err(CafeError::SessionAlreadyActive(_))
        ));
        assert_eq!(engine.snapshot().await.unwrap().check_ins.len(), 1);
    }

    #[tokio::test]
    async fn test_racing_stations_consume_once() {
        let engine = engine();
        engine.sell(order(ServiceType::OneOff, "T1"), at(0)).await.unwrap();

        let (a, b) = tokio::join!(engine.redeem("T1", at(1)), engine.redeem("T1", at(1)));
        let successes = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
        assert_eq!(successes, 1);

        let loser = if a.is_ok() { b } else { a };
        assert!(matches!(
            loser,
            Err(CafeError::Conflict(_)) | Err(CafeError::AlreadyConsumed(_))
        ));
    }
}
