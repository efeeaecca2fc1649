//! Dedicated OS threads running their own single-threaded tokio runtime.
//!
//! A thread is stopped cooperatively: `cancel` flips a watch flag that the
//! running future observes at its next suspension point. `stop` then waits a
//! bounded grace period for the thread to exit and detaches it otherwise.

use std::future::Future;
use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, warn};

/// Cooperative cancellation flag handed to the thread's future.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    /// Returns true once cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves when cancellation is requested.
    pub async fn cancelled(&mut self) {
        if self.rx.wait_for(|cancelled| *cancelled).await.is_err() {
            // Owner is gone without cancelling; nobody can cancel any more.
            std::future::pending::<()>().await;
        }
    }
}

/// How a thread ended after `stop`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Exited within the grace period.
    Clean,
    /// Still running after the grace period; detached.
    Forced,
}

/// Sends on drop so the owner learns about exits, panics included.
struct ExitGuard(std_mpsc::Sender<()>);

impl Drop for ExitGuard {
    fn drop(&mut self) {
        let _ = self.0.send(());
    }
}

/// Handle to a dedicated thread driving one future to completion.
pub struct IsolatedThread {
    name: String,
    cancel_tx: watch::Sender<bool>,
    exited_rx: std_mpsc::Receiver<()>,
    handle: Option<JoinHandle<()>>,
}

impl IsolatedThread {
    /// Spawns a named thread that builds a current-thread runtime and runs
    /// the future produced by `task`.
    ///
    /// # Errors
    /// Returns error if the OS refuses to create the thread.
    pub fn spawn<F, Fut>(name: impl Into<String>, task: F) -> std::io::Result<Self>
    where
        F: FnOnce(CancelSignal) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + 'static,
    {
        let name = name.into();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (exited_tx, exited_rx) = std_mpsc::channel();
        let thread_name = name.clone();

        let handle = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                let _exit = ExitGuard(exited_tx);
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        error!(thread = %thread_name, error = %e, "Failed to build runtime");
                        return;
                    }
                };
                runtime.block_on(task(CancelSignal { rx: cancel_rx }));
                debug!(thread = %thread_name, "Isolated thread finished");
            })?;

        Ok(Self {
            name,
            cancel_tx,
            exited_rx,
            handle: Some(handle),
        })
    }

    /// Requests cooperative cancellation without waiting.
    pub fn cancel(&self) {
        self.cancel_tx.send_replace(true);
    }

    /// Returns true once the thread has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Cancels, then waits up to `grace` for the thread to exit.
    pub fn stop(mut self, grace: Duration) -> StopOutcome {
        self.cancel();
        self.join_within(grace)
    }

    /// Waits up to `grace` for the thread to exit on its own.
    pub fn join_within(&mut self, grace: Duration) -> StopOutcome {
        let Some(handle) = self.handle.take() else {
            return StopOutcome::Clean;
        };

        match self.exited_rx.recv_timeout(grace) {
            Ok(()) | Err(std_mpsc::RecvTimeoutError::Disconnected) => {
                if handle.join().is_err() {
                    warn!(thread = %self.name, "Isolated thread panicked");
                }
                StopOutcome::Clean
            }
            Err(std_mpsc::RecvTimeoutError::Timeout) => {
                warn!(
                    thread = %self.name,
                    grace_ms = grace.as_millis(),
                    "Thread ignored cancellation, detaching it"
                );
                drop(handle);
                StopOutcome::Forced
            }
        }
    }
}

impl Drop for IsolatedThread {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for IsolatedThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IsolatedThread")
            .field("name", &self.name)
            .field("finished", &self.is_finished())
            .finish_non_exhaustive()
    }
}
