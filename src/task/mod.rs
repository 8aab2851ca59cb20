//! Task queues and ports.
//!
//! A [`TaskQueue`] lets two pipeline threads exchange a fixed number of
//! reusable [`TaskToken`]s. Token availability is the only backpressure;
//! bulk data rides in each token's attachment bag.

pub mod port;
pub mod queue;

pub use port::{PollTimeout, PortDirection, TaskPort};
pub use queue::{TaskQueue, TaskToken, MAX_TASK_QUEUE_DEPTH};

use crate::attachment::AttachmentError;
use thiserror::Error;

/// Errors returned by task queue operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("No task available")]
    Empty,

    #[error("Timed out waiting for a task")]
    Timeout,

    #[error("Task queue closed")]
    Closed,

    #[error("Task from queue {token_queue} cannot be enqueued on queue {queue}")]
    ForeignToken { token_queue: u64, queue: u64 },

    #[error("Task queue overfilled")]
    Overflow,

    #[error("Invalid task queue capacity {0}")]
    InvalidCapacity(usize),

    #[error("Attachment error: {0}")]
    Attachment(#[from] AttachmentError),
}
