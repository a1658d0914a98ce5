use crate::domain::ids::QrToken;
use crate::domain::purchase::NewPurchase;
use crate::domain::user::User;
use chrono::{DateTime, Utc};

/// A staff action, stamped with the instant it was taken.
///
/// Session actions address the active check-in of the purchase whose QR
/// code is given, which is how a front desk finds a running session.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Guest(User),
    Sell { order: NewPurchase, at: DateTime<Utc> },
    Reserve { order: NewPurchase, at: DateTime<Utc> },
    Confirm { code: QrToken, at: DateTime<Utc> },
    Redeem { code: QrToken, at: DateTime<Utc> },
    Pause { code: QrToken, at: DateTime<Utc> },
    Resume { code: QrToken, at: DateTime<Utc> },
    CheckOut { code: QrToken, at: DateTime<Utc> },
}

impl Command {
    /// When the action was taken. Guest registration carries no time.
    pub fn at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Guest(_) => None,
            Self::Sell { at, .. } | Self::Reserve { at, .. } => Some(*at),
            Self::Confirm { at, .. }
            | Self::Redeem { at, .. }
            | Self::Pause { at, .. }
            | Self::Resume { at, .. }
            | Self::CheckOut { at, .. } => Some(*at),
        }
    }
}
