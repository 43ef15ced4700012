//! Expired-note sweep.
//!
//! Reads already treat expired notes as absent; this task reclaims their
//! rows. Stale cache entries for swept notes are evicted lazily on the next
//! read.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use crate::notes::NoteStore;

/// Totals over the lifetime of one sweep task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub runs: u64,
    pub removed: u64,
    pub errors: u64,
}

/// Sweep every `every` until `shutdown_rx` reports `true`.
///
/// The first sweep runs immediately.
pub async fn expiry_sweep_task(
    notes: Arc<NoteStore>,
    every: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> SweepSummary {
    let mut summary = SweepSummary::default();
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(interval_secs = every.as_secs(), "Expiry sweep task started");

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                summary.runs += 1;
                match notes.sweep_expired().await {
                    Ok(removed) => summary.removed += removed,
                    Err(e) => {
                        summary.errors += 1;
                        tracing::warn!(error = %e, "Expiry sweep failed");
                    }
                }
            }
        }
    }

    tracing::info!(
        runs = summary.runs,
        removed = summary.removed,
        errors = summary.errors,
        "Expiry sweep task stopped"
    );
    summary
}
