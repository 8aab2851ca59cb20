//! Task ports: the two directions of a `TaskQueue`.
//!
//! Each blocking wait selects on the token channel and the queue's close
//! channel together, so a `close()` issued after a waiter started blocking
//! still wakes it.

use super::queue::{QueueShared, TaskToken};
use super::TaskError;
use crossbeam_channel::{select, Select, TryRecvError, TrySendError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Which side of the queue a port serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortDirection {
    /// Hands out idle tokens to the producer; enqueued tokens become ready.
    Input,
    /// Hands out ready tokens to the consumer; enqueued tokens become idle.
    Output,
}

impl PortDirection {
    pub fn paired(self) -> Self {
        match self {
            PortDirection::Input => PortDirection::Output,
            PortDirection::Output => PortDirection::Input,
        }
    }
}

/// How long a port operation may wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollTimeout {
    NonBlock,
    Block,
    Timeout(Duration),
}

impl PollTimeout {
    pub const fn millis(ms: u64) -> Self {
        PollTimeout::Timeout(Duration::from_millis(ms))
    }
}

/// One direction of a task queue. Cheap to clone; every clone talks to the
/// same queue.
#[derive(Clone)]
pub struct TaskPort {
    shared: Arc<QueueShared>,
    direction: PortDirection,
}

impl TaskPort {
    pub(crate) fn new(shared: Arc<QueueShared>, direction: PortDirection) -> Self {
        Self { shared, direction }
    }

    pub fn direction(&self) -> PortDirection {
        self.direction
    }

    pub fn queue_id(&self) -> u64 {
        self.shared.id
    }

    /// Take a token without blocking.
    pub fn dequeue(&self) -> Result<TaskToken, TaskError> {
        if self.shared.is_closed() {
            return Err(TaskError::Closed);
        }
        match self.shared.source(self.direction).try_recv() {
            Ok(token) => Ok(token),
            Err(TryRecvError::Empty) => Err(TaskError::Empty),
            Err(TryRecvError::Disconnected) => Err(TaskError::Closed),
        }
    }

    /// Take a token, waiting according to `timeout`.
    pub fn dequeue_timeout(&self, timeout: PollTimeout) -> Result<TaskToken, TaskError> {
        if self.shared.is_closed() {
            return Err(TaskError::Closed);
        }

        let source = self.shared.source(self.direction);
        let close = &self.shared.close_rx;
        match timeout {
            PollTimeout::NonBlock => self.dequeue(),
            PollTimeout::Block => select! {
                recv(source) -> token => token.map_err(|_| TaskError::Closed),
                recv(close) -> _ => Err(TaskError::Closed),
            },
            PollTimeout::Timeout(duration) => select! {
                recv(source) -> token => token.map_err(|_| TaskError::Closed),
                recv(close) -> _ => Err(TaskError::Closed),
                default(duration) => Err(TaskError::Timeout),
            },
        }
    }

    /// Wait until a token is available without taking it.
    pub fn poll(&self, timeout: PollTimeout) -> Result<(), TaskError> {
        if self.shared.is_closed() {
            return Err(TaskError::Closed);
        }

        let mut sel = Select::new();
        let data = sel.recv(self.shared.source(self.direction));
        sel.recv(&self.shared.close_rx);

        let ready = match timeout {
            PollTimeout::NonBlock => sel.try_ready().map_err(|_| TaskError::Empty)?,
            PollTimeout::Block => sel.ready(),
            PollTimeout::Timeout(duration) => {
                sel.ready_timeout(duration).map_err(|_| TaskError::Timeout)?
            }
        };

        if ready == data && !self.shared.source(self.direction).is_empty() {
            Ok(())
        } else if self.shared.is_closed() {
            Err(TaskError::Closed)
        } else {
            // Another waiter took the token between wake-up and check.
            Err(TaskError::Empty)
        }
    }

    /// Hand a token to the paired port, waking one of its waiters.
    pub fn enqueue(&self, token: TaskToken) -> Result<(), TaskError> {
        if token.queue_id() != self.shared.id {
            tracing::error!(
                task = ?token.index(),
                "task from queue {} enqueued on queue {}",
                token.queue_id(),
                self.shared.id
            );
            return Err(TaskError::ForeignToken {
                token_queue: token.queue_id(),
                queue: self.shared.id,
            });
        }

        match self.shared.sink(self.direction).try_send(token) {
            Ok(()) => Ok(()),
            // Only `capacity` tokens exist, so a full channel means the loop
            // has been corrupted.
            Err(TrySendError::Full(token)) => {
                tracing::error!(task = ?token.index(), "task queue {} overfilled", self.shared.id);
                Err(TaskError::Overflow)
            }
            Err(TrySendError::Disconnected(_)) => Err(TaskError::Closed),
        }
    }
}

impl std::fmt::Debug for TaskPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskPort")
            .field("queue", &self.shared.id)
            .field("direction", &self.direction)
            .finish()
    }
}
