//! Pipeline-specific error types.

use crate::attachment::AttachmentError;
use crate::media::CodecType;
use crate::slots::SlotError;
use crate::task::TaskError;
use thiserror::Error;

/// Errors that can occur within the decode pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Stage {stage} error: {message}")]
    Stage { stage: &'static str, message: String },

    #[error("Parser error: {0}")]
    Parser(String),

    #[error("HAL error: {0}")]
    Hal(String),

    #[error("No HAL backend registered for {0:?}")]
    UnsupportedCodec(CodecType),

    #[error("Attachment error: {0}")]
    Attachment(#[from] AttachmentError),

    #[error("Slot error: {0}")]
    Slot(#[from] SlotError),

    #[error("Task error: {0}")]
    Task(#[from] TaskError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Channel send error")]
    ChannelSend,

    #[error("Channel receive error")]
    ChannelRecv,

    #[error("Pipeline not active")]
    NotActive,
}

impl PipelineError {
    /// Resource exhaustion that clears once another stage makes progress.
    pub fn is_backpressure(&self) -> bool {
        matches!(
            self,
            PipelineError::Slot(SlotError::NoFreeSlot)
                | PipelineError::Task(TaskError::Empty)
                | PipelineError::Attachment(AttachmentError::NotReady(_))
        )
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
