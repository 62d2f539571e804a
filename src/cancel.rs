//! Cooperative cancellation of running workers.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
        mpsc::{self, RecvTimeoutError},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

/// Shared running flag. Workers check it at every pass boundary.
///
/// Clones refer to the same flag. A fresh token is running; once cancelled
/// it stays cancelled.
#[derive(Debug, Clone)]
pub struct CancelToken {
    running: Arc<AtomicBool>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Asks every worker holding this token to stop after its current pass.
    #[inline]
    pub fn cancel(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }
}

/// Background deadline that cancels a [`CancelToken`] when it expires.
///
/// Call [`Supervisor::dismiss`] once the run is over; dropping the
/// supervisor dismisses it as well.
pub struct Supervisor {
    dismiss: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Supervisor {
    /// Starts a thread that cancels `token` after `deadline`.
    pub fn spawn(token: CancelToken, deadline: Duration) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::channel::<()>();

        let handle = thread::Builder::new()
            .name("supervisor".into())
            .spawn(move || match rx.recv_timeout(deadline) {
                Err(RecvTimeoutError::Timeout) => {
                    tracing::info!(?deadline, "deadline reached, cancelling workers");
                    token.cancel();
                }
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    tracing::trace!("supervisor dismissed");
                }
            })?;

        Ok(Self {
            dismiss: Some(tx),
            handle: Some(handle),
        })
    }

    /// Stops the deadline without cancelling and waits for the thread.
    pub fn dismiss(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        // Dropping the sender wakes the supervisor with `Disconnected`.
        self.dismiss.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.shutdown();
    }
}
