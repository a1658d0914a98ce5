use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const TOKEN_SUFFIX_LEN: usize = 11;
const REFERENCE_SUFFIX_LEN: usize = 7;

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Generates a fresh random id.
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

opaque_id!(
    /// Identifies a purchase record.
    PurchaseId
);
opaque_id!(
    /// Identifies a check-in session record.
    CheckInId
);
opaque_id!(
    /// Identifies a user (usually a guest).
    GuestId
);
opaque_id!(
    /// Identifies an entry of the service catalogue.
    ServiceId
);

fn random_base36(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| char::from(BASE36[rng.gen_range(0..BASE36.len())]))
        .collect()
}

/// The printable code encoded into a purchase's QR symbol.
///
/// The same string is accepted when typed by hand, so it is kept short and
/// made only of characters that survive manual entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QrToken(String);

impl QrToken {
    /// Generates `<prefix>-<epoch ms>-<random base36>`.
    pub fn generate(prefix: &str, now: DateTime<Utc>) -> Self {
        Self(format!(
            "{}-{}-{}",
            prefix,
            now.timestamp_millis(),
            random_base36(TOKEN_SUFFIX_LEN)
        ))
    }

    /// Normalizes scanned or typed input. Returns `None` for blank input.
    pub fn parse(input: &str) -> Option<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QrToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Generates a payment reference in the `<prefix>-<epoch ms>-<RANDOM>` form.
pub fn payment_reference(prefix: &str, now: DateTime<Utc>) -> String {
    format!(
        "{}-{}-{}",
        prefix,
        now.timestamp_millis(),
        random_base36(REFERENCE_SUFFIX_LEN).to_uppercase()
    )
}
