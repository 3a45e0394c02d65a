//! Fixed-delay cycle driver.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use tracing::{debug, info};

use crate::core::Autoscaler;

/// Runs [`Autoscaler::run_cycle`] on a dedicated thread.
///
/// The first cycle starts immediately. Each following cycle starts
/// `interval` after the previous one returned, so cycles never overlap.
pub struct CycleTimer {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
    cycles: Arc<AtomicU64>,
}

impl CycleTimer {
    /// Spawn the driver thread.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the thread cannot be spawned.
    pub fn start(autoscaler: Arc<Autoscaler>, interval: Duration) -> std::io::Result<Self> {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let cycles = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&cycles);

        let handle = thread::Builder::new()
            .name("autoscale-timer".into())
            .spawn(move || {
                info!(interval_ms = interval.as_millis(), "Cycle timer started");
                loop {
                    let report = autoscaler.run_cycle();
                    counter.fetch_add(1, Ordering::SeqCst);
                    debug!(cycle_id = %report.cycle_id, "Cycle finished");
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                info!("Cycle timer stopped");
            })?;

        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
            cycles,
        })
    }

    /// Cycles completed so far.
    #[must_use]
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::SeqCst)
    }

    /// Stop scheduling and wait for an in-flight cycle to finish.
    pub fn stop(mut self) {
        self.signal();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    fn signal(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.try_send(());
        }
    }
}

impl Drop for CycleTimer {
    fn drop(&mut self) {
        // Signal only; the thread exits after its current cycle.
        self.signal();
    }
}
