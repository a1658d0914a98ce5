use crate::domain::ports::Snapshot;
use crate::domain::purchase::PurchaseStatus;
use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ServiceRevenue {
    pub purchases: usize,
    pub revenue: Decimal,
}

/// Dashboard figures derived from a snapshot.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RevenueSummary {
    /// Sum over every purchase whose payment went through.
    pub total_revenue: Decimal,
    pub purchases: usize,
    pub consumed: usize,
    pub active_sessions: usize,
    /// Mean active time of closed sessions; zero when there are none.
    pub average_session: TimeDelta,
    pub by_service: BTreeMap<String, ServiceRevenue>,
    pub by_day: BTreeMap<NaiveDate, Decimal>,
}

/// Recomputes the dashboard from scratch; there is no incremental state.
pub fn summarize(snapshot: &Snapshot, now: DateTime<Utc>) -> RevenueSummary {
    let mut summary = RevenueSummary::default();

    for purchase in &snapshot.purchases {
        if purchase.status == PurchaseStatus::Pending {
            continue;
        }
        summary.purchases += 1;
        summary.total_revenue += purchase.amount;
        if purchase.effective_status(now) == PurchaseStatus::Consumed {
            summary.consumed += 1;
        }

        let service = summary
            .by_service
            .entry(purchase.service_name.clone())
            .or_default();
        service.purchases += 1;
        service.revenue += purchase.amount;

        *summary
            .by_day
            .entry(purchase.created_at.date_naive())
            .or_default() += purchase.amount;
    }

    let mut closed = 0i32;
    let mut active_total = TimeDelta::zero();
    for check_in in &snapshot.check_ins {
        if check_in.is_active {
            summary.active_sessions += 1;
        } else {
            closed += 1;
            active_total += check_in.elapsed(now);
        }
    }
    if closed > 0 {
        summary.average_session = active_total / closed;
    }

    summary
}
