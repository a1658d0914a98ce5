use crate::application::analytics::RevenueSummary;
use crate::domain::check_in::{SessionState, format_hms};
use crate::domain::ports::Snapshot;
use crate::domain::purchase::{PurchaseStatus, ServiceType};
use crate::error::Result;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;

const PURCHASE_HEADER: [&str; 9] = [
    "token",
    "guest",
    "service",
    "service_type",
    "amount",
    "status",
    "progress_used",
    "progress_total",
    "consumed_at",
];
const CHECK_IN_HEADER: [&str; 7] = [
    "token",
    "guest",
    "state",
    "check_in",
    "check_out",
    "paused_ms",
    "elapsed",
];
const REVENUE_HEADER: [&str; 3] = ["service", "purchases", "revenue"];

#[derive(Serialize)]
struct PurchaseRow<'a> {
    token: &'a str,
    guest: &'a str,
    service: &'a str,
    service_type: ServiceType,
    amount: Decimal,
    status: PurchaseStatus,
    progress_used: Option<u32>,
    progress_total: Option<u32>,
    consumed_at: Option<i64>,
}

#[derive(Serialize)]
struct CheckInRow<'a> {
    token: &'a str,
    guest: &'a str,
    state: SessionState,
    check_in: i64,
    check_out: Option<i64>,
    paused_ms: i64,
    elapsed: String,
}

#[derive(Serialize)]
struct RevenueRow<'a> {
    service: &'a str,
    purchases: usize,
    revenue: Decimal,
}

/// Writes end-of-run reports as CSV.
///
/// The header row is always written, even for an empty report. Amounts are
/// normalized, so `1500.00` prints as `1500`.
pub struct ReportWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> ReportWriter<W> {
    pub fn new(sink: W) -> Self {
        let writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(sink);
        Self { writer }
    }

    /// One row per purchase, with status as seen at `now`.
    pub fn write_purchases(&mut self, snapshot: &Snapshot, now: DateTime<Utc>) -> Result<()> {
        self.writer.write_record(PURCHASE_HEADER)?;
        for purchase in &snapshot.purchases {
            self.writer.serialize(PurchaseRow {
                token: purchase.qr_code.as_str(),
                guest: purchase.guest_id.as_str(),
                service: &purchase.service_name,
                service_type: purchase.service_type,
                amount: purchase.amount.normalize(),
                status: purchase.effective_status(now),
                progress_used: purchase.progress.map(|p| p.used),
                progress_total: purchase.progress.map(|p| p.total),
                consumed_at: purchase.consumed_at.map(|t| t.timestamp_millis()),
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }

    /// One row per session; running sessions are measured up to `now`.
    pub fn write_check_ins(&mut self, snapshot: &Snapshot, now: DateTime<Utc>) -> Result<()> {
        self.writer.write_record(CHECK_IN_HEADER)?;
        for check_in in &snapshot.check_ins {
            let token = snapshot
                .purchase(&check_in.purchase_id)
                .map(|p| p.qr_code.as_str())
                .unwrap_or(check_in.purchase_id.as_str());
            self.writer.serialize(CheckInRow {
                token,
                guest: check_in.guest_id.as_str(),
                state: check_in.state(),
                check_in: check_in.checked_in_at.timestamp_millis(),
                check_out: check_in.checked_out_at.map(|t| t.timestamp_millis()),
                paused_ms: check_in.total_paused.num_milliseconds(),
                elapsed: format_hms(check_in.elapsed(now)),
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }

    /// Revenue per service, followed by a `TOTAL` row.
    pub fn write_revenue(&mut self, summary: &RevenueSummary) -> Result<()> {
        self.writer.write_record(REVENUE_HEADER)?;
        for (service, revenue) in &summary.by_service {
            self.writer.serialize(RevenueRow {
                service,
                purchases: revenue.purchases,
                revenue: revenue.revenue.normalize(),
            })?;
        }
        self.writer.serialize(RevenueRow {
            service: "TOTAL",
            purchases: summary.purchases,
            revenue: summary.total_revenue.normalize(),
        })?;
        self.writer.flush()?;
        Ok(())
    }
}
