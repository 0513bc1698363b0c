//! Stop and clear-plots signals between the interactive side and the loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

/// Sending half, held by whoever controls the station
#[derive(Debug)]
pub struct ControlHandle {
    stop: watch::Sender<bool>,
    clear: Arc<AtomicBool>,
}

/// Receiving half, passed into [`Station::run`](super::Station::run)
#[derive(Debug, Clone)]
pub struct StationControl {
    stop: watch::Receiver<bool>,
    clear: Arc<AtomicBool>,
}

/// Create a connected handle/control pair
pub fn channel() -> (ControlHandle, StationControl) {
    let (stop_tx, stop_rx) = watch::channel(false);
    let clear = Arc::new(AtomicBool::new(false));
    (
        ControlHandle {
            stop: stop_tx,
            clear: Arc::clone(&clear),
        },
        StationControl {
            stop: stop_rx,
            clear,
        },
    )
}

impl ControlHandle {
    /// Ask the loop to stop after its current iteration.
    pub fn stop(&self) {
        self.stop.send_replace(true);
    }

    /// Ask the loop to empty its plot windows.
    pub fn clear_plots(&self) {
        self.clear.store(true, Ordering::SeqCst);
    }
}

impl StationControl {
    pub fn should_stop(&self) -> bool {
        *self.stop.borrow()
    }

    /// Whether a clear was requested; resets the request.
    pub fn take_clear(&self) -> bool {
        self.clear.swap(false, Ordering::SeqCst)
    }
}
