use crate::domain::check_in::SessionState;
use crate::domain::ids::{GuestId, PurchaseId, QrToken, ServiceId};
use crate::domain::purchase::PurchaseStatus;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CafeError {
    #[error("no matching {kind} found for {key}")]
    NotFound { kind: &'static str, key: String },
    #[error("this service has already been {0}; it cannot be used again")]
    AlreadyConsumed(PurchaseStatus),
    #[error("payment has not been completed for this purchase")]
    NotYetPayable,
    #[error("cannot {action} a session that is {state}")]
    InvalidTransition {
        action: &'static str,
        state: SessionState,
    },
    #[error("cannot {action} a purchase that is {status}")]
    InvalidPurchaseTransition {
        action: &'static str,
        status: PurchaseStatus,
    },
    #[error("purchase {0} already has an active session")]
    SessionAlreadyActive(PurchaseId),
    #[error("guest {guest} already has an active purchase of service {service}; wait until it expires")]
    ServiceAlreadyActive { guest: GuestId, service: ServiceId },
    #[error("QR code {0} is already assigned to another purchase")]
    DuplicateToken(QrToken),
    #[error("{0} changed before the write was applied")]
    Conflict(String),
    #[error("write failed: {0}")]
    WriteFailure(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("configuration error: {0}")]
    ConfigError(Box<figment::Error>),
    #[cfg(feature = "storage-rocksdb")]
    #[error("RocksDB error: {0}")]
    StorageError(#[from] rocksdb::Error),
}

impl From<figment::Error> for CafeError {
    fn from(err: figment::Error) -> Self {
        Self::ConfigError(Box::new(err))
    }
}

impl CafeError {
    /// Whether re-invoking the same action may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::WriteFailure(_) | Self::Conflict(_) | Self::IoError(_) => true,
            #[cfg(feature = "storage-rocksdb")]
            Self::StorageError(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, CafeError>;
