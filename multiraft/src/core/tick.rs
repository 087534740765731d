//! The logical-time pulse.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::base::stopper::Stopper;

pub(crate) struct Tick;

impl Tick {
    /// Spawn the tick worker. Ticks are delivered with `try_send`: when the
    /// coordinator falls behind, pending ticks coalesce instead of queueing
    /// up a burst of elections.
    pub(crate) fn spawn(
        interval: Duration,
        tx: mpsc::Sender<()>,
        stopper: &Stopper,
    ) {
        let mut stop_rx = stopper.should_stop();

        stopper.run_worker(async move {
            if *stop_rx.borrow() {
                return;
            }

            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = stop_rx.changed() => {
                        debug!("tick worker stopping");
                        return;
                    }
                    _ = ticker.tick() => {
                        match tx.try_send(()) {
                            Ok(()) => {}
                            Err(mpsc::error::TrySendError::Full(())) => {
                                // Coordinator is busy; this tick coalesces
                                // into the queued one.
                            }
                            Err(mpsc::error::TrySendError::Closed(())) => {
                                return;
                            }
                        }
                    }
                }
            }
        });
    }
}
