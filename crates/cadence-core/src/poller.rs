//! Cancellable progress poll timer.
//!
//! One poller per playback session. Dropping or cancelling it wakes the
//! poll thread, which exits instead of ticking again. Cancel never joins:
//! the thread may be waiting on the controller that is cancelling it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub(crate) struct ProgressPoller {
    cancelled: Arc<AtomicBool>,
    wake: Option<mpsc::Sender<()>>,
    #[cfg_attr(not(test), allow(dead_code))]
    handle: Option<JoinHandle<()>>,
}

impl ProgressPoller {
    /// Tick immediately, then every `interval` until cancelled or `tick`
    /// returns false.
    pub(crate) fn spawn<F>(interval: Duration, tick: F) -> Self
    where
        F: Fn() -> bool + Send + 'static,
    {
        let cancelled = Arc::new(AtomicBool::new(false));
        let (wake_tx, wake_rx) = mpsc::channel::<()>();
        let flag = Arc::clone(&cancelled);

        let handle = thread::Builder::new()
            .name("cadence-poll".into())
            .spawn(move || loop {
                if flag.load(Ordering::SeqCst) || !tick() {
                    break;
                }
                match wake_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            });

        let handle = match handle {
            Ok(handle) => Some(handle),
            Err(e) => {
                log::error!("cadence: failed to spawn progress poller: {}", e);
                None
            }
        };

        Self {
            cancelled,
            wake: Some(wake_tx),
            handle,
        }
    }

    pub(crate) fn cancel(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.wake.take();
    }

    #[cfg(test)]
    pub(crate) fn is_finished(&self) -> bool {
        self.handle.as_ref().map(|h| h.is_finished()).unwrap_or(true)
    }
}

impl Drop for ProgressPoller {
    fn drop(&mut self) {
        self.cancel();
    }
}
