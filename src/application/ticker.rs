//! Live elapsed-time display for a single session.
//!
//! Runs a background tokio task that recomputes the session's elapsed time
//! every period while it is running. Pausing or closing the session, dropping
//! the ticker, or calling [`SessionTicker::stop`] ends the task.

use crate::application::engine::CafeEngine;
use crate::domain::check_in::SessionState;
use crate::domain::clock::Clock;
use crate::domain::ids::CheckInId;
use crate::domain::ports::SnapshotFeed;
use chrono::TimeDelta;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// One refresh of the displayed timer.
#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    pub check_in: CheckInId,
    pub state: SessionState,
    pub elapsed: TimeDelta,
}

pub struct SessionTicker {
    rx: mpsc::UnboundedReceiver<Tick>,
    cancel: CancellationToken,
}

impl SessionTicker {
    /// Starts ticking for `check_in`.
    ///
    /// Emits a tick immediately and then one per `period` while the session
    /// runs. A paused or closed session gets exactly one frozen tick. An
    /// unknown session ends the stream without a tick.
    pub fn spawn(
        mut feed: SnapshotFeed,
        check_in: CheckInId,
        clock: Arc<dyn Clock>,
        period: Duration,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately.
            interval.tick().await;

            let Some(mut session) = feed.current().check_in(&check_in).cloned() else {
                return;
            };
            'ticking: loop {
                let state = session.state();
                let tick = Tick {
                    check_in: check_in.clone(),
                    state,
                    elapsed: session.elapsed(clock.now()),
                };
                trace!(check_in = %check_in, ?state, "tick");
                if tx.send(tick).is_err() || state != SessionState::Running {
                    break;
                }

                // Writes to other records do not move this timer.
                loop {
                    tokio::select! {
                        _ = task_cancel.cancelled() => break 'ticking,
                        _ = interval.tick() => break,
                        changed = feed.changed() => {
                            let Some(snapshot) = changed else {
                                break 'ticking;
                            };
                            match snapshot.check_in(&check_in) {
                                Some(updated) if *updated != session => {
                                    session = updated.clone();
                                    break;
                                }
                                Some(_) => {}
                                None => break 'ticking,
                            }
                        }
                    }
                }
            }
        });

        Self { rx, cancel }
    }

    /// Receives the next tick. Returns `None` once the ticker has stopped.
    pub async fn next(&mut self) -> Option<Tick> {
        self.rx.recv().await
    }

    /// Signals the background task to stop.
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

impl Drop for SessionTicker {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl CafeEngine {
    /// Live timer for a session, refreshed at the configured tick interval.
    pub fn watch_session(&self, check_in: CheckInId, clock: Arc<dyn Clock>) -> SessionTicker {
        SessionTicker::spawn(self.subscribe(), check_in, clock, self.config().tick_interval())
    }
}
