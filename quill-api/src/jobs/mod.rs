//! Background Jobs
//!
//! - `expiry_sweep`: deletes notes whose `expires_at` has passed
//!
//! Jobs are spawned at startup and stop when the shared shutdown signal
//! flips to `true`:
//!
//! ```ignore
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! tokio::spawn(expiry_sweep_task(state.notes.clone(), interval, shutdown_rx));
//! let _ = shutdown_tx.send(true);
//! ```

pub mod expiry_sweep;

pub use expiry_sweep::{expiry_sweep_task, SweepSummary};
