//! Wall-clock deadline for a single guest call.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

use crate::WasmEngine;

/// Timer thread racing a guest call to its deadline.
///
/// Whichever side first claims the shared `finished` flag decides the
/// outcome. A call that returns at the boundary is never reported as a
/// timeout, and a fired watchdog never lets the call count as completed.
///
/// Dropping the watchdog disarms it and joins the thread.
pub struct Watchdog {
    finished: Arc<AtomicBool>,
    fired: Arc<AtomicBool>,
    cancel: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Watchdog {
    /// Start the timer. After `max_time` the engine's epoch is bumped,
    /// interrupting whatever guest code is running on it.
    pub fn arm(engine: &WasmEngine, max_time: Duration) -> Self {
        let finished = Arc::new(AtomicBool::new(false));
        let fired = Arc::new(AtomicBool::new(false));
        let (cancel, cancelled) = mpsc::channel::<()>();

        let handle = {
            let engine = engine.clone();
            let finished = Arc::clone(&finished);
            let fired = Arc::clone(&fired);

            thread::spawn(move || {
                if let Err(RecvTimeoutError::Timeout) = cancelled.recv_timeout(max_time) {
                    if !finished.swap(true, Ordering::SeqCst) {
                        fired.store(true, Ordering::SeqCst);
                        engine.increment_epoch();
                        warn!(max_time_ms = max_time.as_millis(), "Watchdog fired");
                    }
                }
            })
        };

        Self {
            finished,
            fired,
            cancel: Some(cancel),
            handle: Some(handle),
        }
    }

    /// Mark the call finished and stop the timer.
    ///
    /// Returns `true` if the deadline had already been claimed by the timer.
    pub fn disarm(&mut self) -> bool {
        let won_by_call = !self.finished.swap(true, Ordering::SeqCst);

        // A send error only means the timer thread already exited.
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                debug!("Watchdog thread panicked");
            }
        }

        !won_by_call && self.fired.load(Ordering::SeqCst)
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.disarm();
    }
}

impl std::fmt::Debug for Watchdog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watchdog")
            .field("finished", &self.finished.load(Ordering::SeqCst))
            .field("fired", &self.fired.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}
