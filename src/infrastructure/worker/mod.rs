//! Isolated execution of asynchronous operations.

pub mod isolated;
pub mod task_worker;

pub use isolated::{CancelSignal, IsolatedThread, StopOutcome};
pub use task_worker::{ActiveRequest, DEFAULT_GRACE, TaskWorker, Ticket, WorkerEvent, WorkerOutcome};
pub(crate) use task_worker::panic_message;
