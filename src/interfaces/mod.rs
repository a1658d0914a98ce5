//! Edges of the system: CSV replay input, CSV reports, and the QR scanner.

pub mod csv;
pub mod scanner;
