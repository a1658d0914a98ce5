//! Records, identifiers and the store port.
//!
//! State transitions live on the records themselves as plain functions of
//! `now`; nothing in this layer performs I/O.

pub mod check_in;
pub mod clock;
pub mod ids;
pub mod ports;
pub mod purchase;
pub mod user;
