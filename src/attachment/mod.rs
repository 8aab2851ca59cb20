//! Typed per-task attachments.
//!
//! Pipeline stages pass frame/packet handles and small scalars to each other
//! through an [`AttachmentBag`] carried by the task token, instead of
//! allocating per-frame messages.
//!
//! # Design
//!
//! - **Static catalog**: every [`AttachmentKey`] declares one [`ValueKind`];
//!   mismatched types fail with [`AttachmentError::InvalidKey`].
//! - **Lock-free mailboxes**: one CAS per `set`/`get`, at-most-once delivery.
//! - **Explicit registry**: [`AttachmentRegistry`] is owned by the runtime
//!   session and reports leaked bags at teardown.

pub mod bag;
pub mod key;
pub mod registry;

pub use bag::{AttachmentBag, Release, SlotState};
pub use key::{AttachmentKey, AttachmentType, AttachmentValue, ValueKind};
pub use registry::{AttachmentRegistry, LeakReport, LeakedBag};

use crate::id::BagId;
use thiserror::Error;

/// Errors returned by attachment operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AttachmentError {
    #[error("Key '{key}' holds {expected:?} values, not {actual:?}")]
    InvalidKey {
        key: AttachmentKey,
        expected: ValueKind,
        actual: ValueKind,
    },

    #[error("Key '{0}' has no value ready")]
    NotReady(AttachmentKey),

    #[error("Attachment bag {0} was already released")]
    BagReleased(BagId),

    #[error("Attachment registry has been torn down")]
    RegistryFinished,
}
