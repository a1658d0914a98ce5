//! Application layer containing the core business logic orchestration.
//!
//! This module defines the `CafeEngine`, which turns staff actions (sales,
//! voucher redemption, session pause/resume/checkout) into guarded writes
//! against a record store, plus the read-side helpers built on its snapshots:
//! the live session ticker and revenue analytics.

pub mod analytics;
pub mod command;
pub mod engine;
pub mod redemption;
pub mod session;
pub mod ticker;
