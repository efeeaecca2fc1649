//! Single-operation worker running on an isolated thread.
//!
//! A `TaskWorker` owns at most one running operation. Starting a new one
//! cancels and joins the previous first. Every operation ends with exactly one
//! [`WorkerEvent`] on the worker's channel, tagged with the [`Ticket`] that
//! `run` returned, so callers can drop results of superseded requests with an
//! [`ActiveRequest`].

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use super::isolated::{IsolatedThread, StopOutcome};
use crate::domain::errors::{FetchError, FetchResult};

/// Default time a cancelled operation gets to wind down.
pub const DEFAULT_GRACE: Duration = Duration::from_secs(2);

/// Identifies one `run` call of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ticket(u64);

/// Terminal result of an operation.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerOutcome<T> {
    /// The operation returned a value.
    Success(T),
    /// The operation failed, was cancelled, or panicked.
    Failure(FetchError),
}

impl<T> From<FetchResult<T>> for WorkerOutcome<T> {
    fn from(result: FetchResult<T>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(e) => Self::Failure(e),
        }
    }
}

/// Result delivered to the initiating thread.
#[derive(Debug, Clone)]
pub struct WorkerEvent<T> {
    /// Ticket of the `run` call this result belongs to.
    pub ticket: Ticket,
    /// What happened.
    pub outcome: WorkerOutcome<T>,
}

/// Extracts the message of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

/// Runs one asynchronous operation at a time on its own thread.
pub struct TaskWorker<T> {
    name: String,
    grace: Duration,
    event_tx: mpsc::UnboundedSender<WorkerEvent<T>>,
    active: Option<(Ticket, IsolatedThread)>,
    next_ticket: u64,
}

impl<T: Send + 'static> TaskWorker<T> {
    /// Creates a worker and the receiver its results arrive on.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        grace: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<WorkerEvent<T>>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let worker = Self {
            name: name.into(),
            grace,
            event_tx,
            active: None,
            next_ticket: 0,
        };
        (worker, event_rx)
    }

    /// Starts `operation`, cancelling and joining any operation still running.
    ///
    /// The operation future is built on the worker thread, so it need not be
    /// `Send`. Failure to start is itself delivered as a failure event.
    pub fn run<F, Fut>(&mut self, operation: F) -> Ticket
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = FetchResult<T>> + 'static,
    {
        self.cancel();

        self.next_ticket += 1;
        let ticket = Ticket(self.next_ticket);
        let event_tx = self.event_tx.clone();
        let thread_name = format!("{}-{}", self.name, ticket.0);

        let spawned = IsolatedThread::spawn(thread_name.clone(), move |mut cancel| async move {
            let guarded = AssertUnwindSafe(async move { operation().await }).catch_unwind();

            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => WorkerOutcome::Failure(FetchError::Cancelled),
                result = guarded => match result {
                    Ok(result) => WorkerOutcome::from(result),
                    Err(panic_info) => {
                        let panic_msg = panic_message(panic_info.as_ref());
                        error!(panic = %panic_msg, "Worker operation panicked");
                        WorkerOutcome::Failure(FetchError::internal(format!(
                            "operation panicked: {panic_msg}"
                        )))
                    }
                },
            };

            if let WorkerOutcome::Failure(e) = &outcome {
                debug!(ticket = ticket.0, error = %e, "Worker operation failed");
            }
            let _ = event_tx.send(WorkerEvent { ticket, outcome });
        });

        match spawned {
            Ok(thread) => {
                debug!(thread = %thread_name, "Started worker operation");
                self.active = Some((ticket, thread));
            }
            Err(e) => {
                error!(thread = %thread_name, error = %e, "Failed to spawn worker thread");
                let _ = self.event_tx.send(WorkerEvent {
                    ticket,
                    outcome: WorkerOutcome::Failure(FetchError::internal(format!(
                        "failed to spawn worker thread: {e}"
                    ))),
                });
            }
        }

        ticket
    }

    /// Cancels the running operation and waits for its thread.
    ///
    /// Returns `None` when nothing was running.
    pub fn cancel(&mut self) -> Option<StopOutcome> {
        let (ticket, thread) = self.active.take()?;
        let outcome = thread.stop(self.grace);
        if outcome == StopOutcome::Forced {
            warn!(worker = %self.name, ticket = ticket.0, "Worker forcibly abandoned");
        } else {
            debug!(worker = %self.name, ticket = ticket.0, "Worker cancelled");
        }
        Some(outcome)
    }

    /// Returns true while an operation is still executing.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|(_, thread)| !thread.is_finished())
    }
}

impl<T> std::fmt::Debug for TaskWorker<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskWorker")
            .field("name", &self.name)
            .field("grace", &self.grace)
            .finish_non_exhaustive()
    }
}

/// Tracks which request a caller still cares about.
#[derive(Debug, Default)]
pub struct ActiveRequest {
    current: Option<Ticket>,
}

impl ActiveRequest {
    /// Creates a guard with no request in flight.
    #[must_use]
    pub const fn new() -> Self {
        Self { current: None }
    }

    /// Marks `ticket` as the only request whose result may be applied.
    pub fn begin(&mut self, ticket: Ticket) {
        self.current = Some(ticket);
    }

    /// Returns true if `ticket` is the current request.
    #[must_use]
    pub fn is_current(&self, ticket: Ticket) -> bool {
        self.current == Some(ticket)
    }

    /// Consumes the current request if `ticket` matches it.
    ///
    /// Returns false for stale tickets, whose results must be dropped.
    pub fn accept(&mut self, ticket: Ticket) -> bool {
        if self.is_current(ticket) {
            self.current = None;
            true
        } else {
            false
        }
    }

    /// Forgets the current request.
    pub fn clear(&mut self) {
        self.current = None;
    }

    /// Returns true while a request is awaiting its result.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.current.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn recv<T>(rx: &mut mpsc::UnboundedReceiver<WorkerEvent<T>>) -> WorkerEvent<T> {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            match rx.try_recv() {
                Ok(event) => return event,
                Err(mpsc::error::TryRecvError::Empty) if Instant::now() < deadline => {
                    std::thread::sleep(Duration::from_millis(5));
                }
                Err(e) => panic!("no worker event: {e}"),
            }
        }
    }

    #[test]
    fn test_success_is_delivered() {
        let (mut worker, mut rx) = TaskWorker::new("test", DEFAULT_GRACE);
        let ticket = worker.run(|| async { Ok(42) });

        let event = recv(&mut rx);
        assert_eq!(event.ticket, ticket);
        assert_eq!(event.outcome, WorkerOutcome::Success(42));
    }

    #[test]
    fn test_failure_is_delivered() {
        let (mut worker, mut rx) = TaskWorker::<u32>::new("test", DEFAULT_GRACE);
        worker.run(|| async { Err(FetchError::timeout("metadata lookup")) });

        let event = recv(&mut rx);
        assert_eq!(
            event.outcome,
            WorkerOutcome::Failure(FetchError::timeout("metadata lookup"))
        );
    }

    #[test]
    fn test_panic_becomes_failure() {
        let (mut worker, mut rx) = TaskWorker::<u32>::new("test", DEFAULT_GRACE);
        worker.run(|| async {
            let missing: Option<u32> = None;
            Ok(missing.expect("boom"))
        });

        let event = recv(&mut rx);
        match event.outcome {
            WorkerOutcome::Failure(FetchError::Internal { message }) => {
                assert!(message.contains("boom"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_runs_off_the_calling_thread() {
        let caller = std::thread::current().id();
        let (mut worker, mut rx) = TaskWorker::new("test", DEFAULT_GRACE);
        worker.run(move || async move { Ok(std::thread::current().id() != caller) });

        assert_eq!(recv(&mut rx).outcome, WorkerOutcome::Success(true));
    }

    #[test]
    fn test_cancel_interrupts_at_suspension_point() {
        let (mut worker, mut rx) = TaskWorker::<u32>::new("test", DEFAULT_GRACE);
        worker.run(|| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(1)
        });

        let started = Instant::now();
        assert_eq!(worker.cancel(), Some(StopOutcome::Clean));
        assert!(started.elapsed() < DEFAULT_GRACE);
        assert!(!worker.is_running());
        assert_eq!(
            recv(&mut rx).outcome,
            WorkerOutcome::Failure(FetchError::Cancelled)
        );
    }

    #[test]
    fn test_blocking_operation_is_abandoned_after_grace() {
        let (mut worker, _rx) = TaskWorker::<u32>::new("test", Duration::from_millis(50));
        worker.run(|| async {
            std::thread::sleep(Duration::from_millis(500));
            Ok(1)
        });

        assert_eq!(worker.cancel(), Some(StopOutcome::Forced));
        assert!(!worker.is_running());
    }

    #[test]
    fn test_superseded_result_is_dropped() {
        let (mut worker, mut rx) = TaskWorker::new("test", DEFAULT_GRACE);
        let mut active = ActiveRequest::new();

        let first = worker.run(|| async {
            tokio::time::sleep(Duration::from_millis(300)).await;
            Ok("A")
        });
        active.begin(first);

        let second = worker.run(|| async { Ok("B") });
        active.begin(second);

        let mut applied = Vec::new();
        for _ in 0..2 {
            let event = recv(&mut rx);
            if active.accept(event.ticket)
                && let WorkerOutcome::Success(value) = event.outcome
            {
                applied.push(value);
            }
        }

        assert_eq!(applied, vec!["B"]);
        assert!(!active.is_pending());
    }

    #[test]
    fn test_active_request_guard() {
        let mut active = ActiveRequest::new();
        let a = Ticket(1);
        let b = Ticket(2);

        active.begin(a);
        active.begin(b);
        assert!(!active.accept(a));
        assert!(active.is_current(b));
        assert!(active.accept(b));
        assert!(!active.accept(b));
    }
}
