use crate::domain::ids::{CheckInId, GuestId, PurchaseId};
use crate::error::{CafeError, Result};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Derived state of a check-in session.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Running,
    Paused,
    Closed,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One timed occupancy session against a purchase.
///
/// While `is_active` holds the session is either running (`paused_at` unset)
/// or paused (`paused_at` set). Closing clears `paused_at` and sets
/// `checked_out_at`. `total_paused` only ever grows.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CheckIn {
    pub id: CheckInId,
    pub guest_id: GuestId,
    pub purchase_id: PurchaseId,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub checked_in_at: DateTime<Utc>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub paused_at: Option<DateTime<Utc>>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub checked_out_at: Option<DateTime<Utc>>,
    #[serde(with = "millis")]
    pub total_paused: TimeDelta,
    pub is_active: bool,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl CheckIn {
    /// Starts a running session at `now`.
    pub fn open(id: CheckInId, guest_id: GuestId, purchase_id: PurchaseId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            guest_id,
            purchase_id,
            checked_in_at: now,
            paused_at: None,
            checked_out_at: None,
            total_paused: TimeDelta::zero(),
            is_active: true,
            created_at: now,
        }
    }

    pub fn state(&self) -> SessionState {
        match (self.is_active, self.paused_at) {
            (false, _) => SessionState::Closed,
            (true, Some(_)) => SessionState::Paused,
            (true, None) => SessionState::Running,
        }
    }

    /// Active (non-paused) time at `now`, never negative.
    ///
    /// Frozen at the pause instant while paused and at checkout once closed.
    pub fn elapsed(&self, now: DateTime<Utc>) -> TimeDelta {
        let until = match self.state() {
            SessionState::Paused => self.paused_at.unwrap_or(now),
            SessionState::Running => now,
            SessionState::Closed => self.checked_out_at.unwrap_or(self.checked_in_at),
        };
        (until - self.checked_in_at - self.total_paused).max(TimeDelta::zero())
    }

    pub fn pause(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.require(SessionState::Running, "pause")?;
        self.paused_at = Some(now);
        Ok(())
    }

    /// Ends the open pause, adding its length to `total_paused`.
    ///
    /// Only a paused session can resume. A session with no pause instant is
    /// running, so resuming it is an invalid transition rather than a
    /// zero-length pause.
    pub fn resume(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.require(SessionState::Paused, "resume")?;
        self.fold_pause(now);
        Ok(())
    }

    /// Closes the session, folding any open pause into the paused total.
    pub fn check_out(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.state() == SessionState::Closed {
            return Err(CafeError::InvalidTransition {
                action: "check out",
                state: SessionState::Closed,
            });
        }
        self.fold_pause(now);
        self.checked_out_at = Some(now);
        self.is_active = false;
        Ok(())
    }

    fn require(&self, expected: SessionState, action: &'static str) -> Result<()> {
        let state = self.state();
        if state == expected {
            Ok(())
        } else {
            Err(CafeError::InvalidTransition { action, state })
        }
    }

    fn fold_pause(&mut self, now: DateTime<Utc>) {
        // A missing pause instant or a clock that went backwards counts as zero.
        let pause = now - self.paused_at.take().unwrap_or(now);
        self.total_paused += pause.max(TimeDelta::zero());
    }
}

/// Renders a duration as `HH:MM:SS`; hours are not wrapped at a day.
pub fn format_hms(duration: TimeDelta) -> String {
    let seconds = duration.num_seconds().max(0);
    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}

/// Serializes a `TimeDelta` as whole milliseconds.
pub(crate) mod millis {
    use chrono::TimeDelta;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S>(value: &TimeDelta, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_i64(value.num_milliseconds())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<TimeDelta, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = i64::deserialize(deserializer)?;
        TimeDelta::try_milliseconds(ms)
            .ok_or_else(|| D::Error::custom(format!("duration out of range: {ms}ms")))
    }
}
