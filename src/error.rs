//! Error handling for the VPU runtime
//!
//! Each component owns a `thiserror` enum; this module folds them into one
//! [`RuntimeError`] for callers that drive the whole runtime.

use crate::attachment::AttachmentError;
use crate::pipeline::PipelineError;
use crate::slots::SlotError;
use crate::task::TaskError;
use thiserror::Error;

/// Main error type for runtime operations
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Attachment bag or registry failures
    #[error("Attachment error: {0}")]
    Attachment(#[from] AttachmentError),

    /// Buffer slot table failures
    #[error("Slot error: {0}")]
    Slot(#[from] SlotError),

    /// Task queue failures
    #[error("Task error: {0}")]
    Task(#[from] TaskError),

    /// Decode pipeline failures
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// Timeout errors
    #[error("Timeout: {0}")]
    Timeout(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<RuntimeError>,
    },
}

impl RuntimeError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        RuntimeError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Innermost error, skipping context wrappers
    pub fn root(&self) -> &RuntimeError {
        match self {
            RuntimeError::WithContext { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Result type alias for runtime operations
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<RuntimeError>,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.into().with_context(f()))
    }
}
