//! Bounded queue of recyclable task tokens.
//!
//! A queue of capacity C creates C tokens up front. Tokens then circulate:
//!
//! ```text
//!            Input port                          Output port
//!  idle ──dequeue──► producer ──enqueue──► ready ──dequeue──► consumer
//!   ▲                                                             │
//!   └──────────────────────────────enqueue────────────────────────┘
//! ```
//!
//! Holding a `TaskToken` is exclusive access to its attachment bag.

use super::port::{PortDirection, TaskPort};
use super::TaskError;
use crate::attachment::{AttachmentBag, AttachmentRegistry};
use crate::id::TaskIndex;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

/// Upper bound on tokens per queue.
pub const MAX_TASK_QUEUE_DEPTH: usize = 16;

static NEXT_QUEUE_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) struct TaskRecord {
    index: TaskIndex,
    bag: AttachmentBag,
}

impl Drop for TaskRecord {
    fn drop(&mut self) {
        self.bag.release();
    }
}

/// A reusable task handle carrying one attachment bag.
///
/// Tokens are never cloned. A token dropped outside its queue returns to the
/// queue's idle side so the closed loop keeps its size.
pub struct TaskToken {
    record: Arc<TaskRecord>,
    queue_id: u64,
    home: Weak<QueueShared>,
}

impl TaskToken {
    pub fn index(&self) -> TaskIndex {
        self.record.index
    }

    pub fn bag(&self) -> &AttachmentBag {
        &self.record.bag
    }

    pub fn queue_id(&self) -> u64 {
        self.queue_id
    }

    fn duplicate(&self) -> TaskToken {
        TaskToken {
            record: self.record.clone(),
            queue_id: self.queue_id,
            home: self.home.clone(),
        }
    }
}

impl Drop for TaskToken {
    fn drop(&mut self) {
        let Some(home) = self.home.upgrade() else {
            return;
        };
        tracing::warn!(
            task = ?self.record.index,
            queue = self.queue_id,
            "task token dropped outside its queue, recycling"
        );
        let _ = self.record.bag.clear();
        if let Err(e) = home.idle_tx.try_send(self.duplicate()) {
            // Detach so the rejected duplicate does not recycle itself again.
            let mut orphan = e.into_inner();
            orphan.home = Weak::new();
        }
    }
}

impl std::fmt::Debug for TaskToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskToken")
            .field("index", &self.record.index)
            .field("queue", &self.queue_id)
            .field("bag", &self.record.bag.id())
            .finish()
    }
}

pub(crate) struct QueueShared {
    pub(crate) id: u64,
    pub(crate) capacity: usize,
    pub(crate) idle_tx: Sender<TaskToken>,
    pub(crate) idle_rx: Receiver<TaskToken>,
    pub(crate) ready_tx: Sender<TaskToken>,
    pub(crate) ready_rx: Receiver<TaskToken>,
    close_tx: Mutex<Option<Sender<()>>>,
    pub(crate) close_rx: Receiver<()>,
    closed: AtomicBool,
}

impl QueueShared {
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Channel a port hands tokens out from.
    pub(crate) fn source(&self, direction: PortDirection) -> &Receiver<TaskToken> {
        match direction {
            PortDirection::Input => &self.idle_rx,
            PortDirection::Output => &self.ready_rx,
        }
    }

    /// Channel a port sends enqueued tokens to.
    pub(crate) fn sink(&self, direction: PortDirection) -> &Sender<TaskToken> {
        match direction {
            PortDirection::Input => &self.ready_tx,
            PortDirection::Output => &self.idle_tx,
        }
    }
}

/// Closed loop of `capacity` tokens exposing an input and an output port.
pub struct TaskQueue {
    shared: Arc<QueueShared>,
}

impl TaskQueue {
    /// Create the queue and its tokens, one attachment bag per token.
    pub fn new(capacity: usize, registry: &AttachmentRegistry) -> Result<Self, TaskError> {
        if capacity == 0 || capacity > MAX_TASK_QUEUE_DEPTH {
            return Err(TaskError::InvalidCapacity(capacity));
        }

        let (idle_tx, idle_rx) = bounded(capacity);
        let (ready_tx, ready_rx) = bounded(capacity);
        let (close_tx, close_rx) = bounded(0);
        let shared = Arc::new(QueueShared {
            id: NEXT_QUEUE_ID.fetch_add(1, Ordering::Relaxed),
            capacity,
            idle_tx,
            idle_rx,
            ready_tx,
            ready_rx,
            close_tx: Mutex::new(Some(close_tx)),
            close_rx,
            closed: AtomicBool::new(false),
        });

        for i in 0..capacity {
            let bag = registry.acquire(Some("task"), Some("task_queue"))?;
            let token = TaskToken {
                record: Arc::new(TaskRecord {
                    index: TaskIndex(i as u32),
                    bag,
                }),
                queue_id: shared.id,
                home: Arc::downgrade(&shared),
            };
            shared
                .idle_tx
                .try_send(token)
                .map_err(|_| TaskError::InvalidCapacity(capacity))?;
        }

        tracing::debug!(queue = shared.id, "task queue created with {} tokens", capacity);
        Ok(Self { shared })
    }

    pub fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn port(&self, direction: PortDirection) -> TaskPort {
        TaskPort::new(self.shared.clone(), direction)
    }

    pub fn input_port(&self) -> TaskPort {
        self.port(PortDirection::Input)
    }

    pub fn output_port(&self) -> TaskPort {
        self.port(PortDirection::Output)
    }

    /// Tokens waiting at a port.
    pub fn pending(&self, direction: PortDirection) -> usize {
        self.shared.source(direction).len()
    }

    /// Wake every blocked waiter on both ports. Further dequeues report
    /// `Closed`; enqueues still succeed so in-flight tokens can be returned.
    pub fn close(&self) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let sender = self
            .shared
            .close_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(sender);
        tracing::debug!(queue = self.shared.id, "task queue closed");
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Remove every token currently waiting at a port.
    pub fn drain(&self, direction: PortDirection) -> Vec<TaskToken> {
        self.shared.source(direction).try_iter().collect()
    }

    /// Clear a token's bag and put it back on the idle side.
    pub fn recycle(&self, token: TaskToken) -> Result<(), TaskError> {
        let _ = token.bag().clear();
        self.port(PortDirection::Output).enqueue(token)
    }
}

impl Drop for TaskQueue {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueue")
            .field("id", &self.shared.id)
            .field("capacity", &self.shared.capacity)
            .field("idle", &self.shared.idle_rx.len())
            .field("ready", &self.shared.ready_rx.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}
