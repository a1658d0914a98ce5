use crate::domain::ids::{GuestId, PurchaseId, QrToken, ServiceId};
use crate::error::{CafeError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceType {
    OneOff,
    Daily,
    Weekly,
    Monthly,
    FixedTime,
}

impl ServiceType {
    pub fn is_one_off(self) -> bool {
        self == Self::OneOff
    }

    /// Number of day-units granted when the service is sold.
    pub fn allotment(self) -> u32 {
        match self {
            Self::Weekly => 7,
            Self::Monthly => 30,
            _ => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::OneOff => "one-off",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::FixedTime => "fixed-time",
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a purchase: `pending -> paid -> consumed | expired`.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum PurchaseStatus {
    Pending,
    Paid,
    Consumed,
    Expired,
}

impl PurchaseStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Consumed => "consumed",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for PurchaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Day-unit counters of a multi-day pass. `used <= total` always holds.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
pub struct Progress {
    pub used: u32,
    pub total: u32,
}

impl Progress {
    pub fn new(total: u32) -> Self {
        Self { used: 0, total }
    }

    pub fn is_multi_day(&self) -> bool {
        self.total > 1
    }

    pub fn is_exhausted(&self) -> bool {
        self.used >= self.total
    }
}

/// Input for selling a service to a guest.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPurchase {
    pub guest: GuestId,
    pub service_id: ServiceId,
    pub service_name: String,
    pub service_type: ServiceType,
    pub amount: Decimal,
    /// Pre-printed voucher code; generated when absent.
    pub qr_code: Option<QrToken>,
    pub valid_until: Option<DateTime<Utc>>,
}

/// A guest's entitlement to a service.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Purchase {
    pub id: PurchaseId,
    pub guest_id: GuestId,
    pub service_id: ServiceId,
    pub service_name: String,
    pub service_type: ServiceType,
    pub amount: Decimal,
    pub payment_reference: String,
    pub qr_code: QrToken,
    pub status: PurchaseStatus,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub consumed_at: Option<DateTime<Utc>>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub valid_until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub progress: Option<Progress>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl Purchase {
    pub fn new(
        id: PurchaseId,
        order: NewPurchase,
        qr_code: QrToken,
        payment_reference: String,
        status: PurchaseStatus,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            guest_id: order.guest,
            service_id: order.service_id,
            service_name: order.service_name,
            service_type: order.service_type,
            amount: order.amount,
            payment_reference,
            qr_code,
            status,
            consumed_at: None,
            valid_until: order.valid_until,
            progress: Some(Progress::new(order.service_type.allotment())),
            created_at: now,
        }
    }

    /// Expiry is evaluated on read; the stored status is never rewritten by it.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            PurchaseStatus::Expired => true,
            PurchaseStatus::Pending | PurchaseStatus::Paid => {
                self.valid_until.is_some_and(|deadline| deadline <= now)
            }
            PurchaseStatus::Consumed => false,
        }
    }

    pub fn effective_status(&self, now: DateTime<Utc>) -> PurchaseStatus {
        if self.is_expired(now) {
            PurchaseStatus::Expired
        } else {
            self.status
        }
    }

    /// Fails unless the purchase is `paid` at `now`.
    pub fn ensure_redeemable(&self, now: DateTime<Utc>) -> Result<()> {
        match self.effective_status(now) {
            PurchaseStatus::Paid => Ok(()),
            PurchaseStatus::Pending => Err(CafeError::NotYetPayable),
            status => Err(CafeError::AlreadyConsumed(status)),
        }
    }

    /// Settles a pending payment (`pending -> paid`).
    pub fn confirm_payment(&mut self, now: DateTime<Utc>) -> Result<()> {
        match self.effective_status(now) {
            PurchaseStatus::Pending => {
                self.status = PurchaseStatus::Paid;
                Ok(())
            }
            PurchaseStatus::Paid => Err(CafeError::InvalidPurchaseTransition {
                action: "confirm payment for",
                status: PurchaseStatus::Paid,
            }),
            status => Err(CafeError::AlreadyConsumed(status)),
        }
    }

    /// Uses up a one-off purchase.
    pub fn consume(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.ensure_redeemable(now)?;
        self.status = PurchaseStatus::Consumed;
        self.consumed_at = Some(now);
        Ok(())
    }

    /// Counts one finished visit against a multi-day pass.
    ///
    /// Guards on the stored status rather than the effective one so that a
    /// pass lapsing mid-visit does not strand the open session. Returns
    /// whether the counters moved.
    pub fn record_visit(&mut self, now: DateTime<Utc>) -> Result<bool> {
        let Some(progress) = self.progress.as_mut().filter(|p| p.is_multi_day()) else {
            return Ok(false);
        };

        match self.status {
            PurchaseStatus::Paid if !progress.is_exhausted() => {}
            PurchaseStatus::Paid => return Err(CafeError::AlreadyConsumed(PurchaseStatus::Consumed)),
            PurchaseStatus::Pending => return Err(CafeError::NotYetPayable),
            status => return Err(CafeError::AlreadyConsumed(status)),
        }

        progress.used += 1;
        if progress.is_exhausted() {
            self.status = PurchaseStatus::Consumed;
            self.consumed_at = Some(now);
        }
        Ok(true)
    }
}
