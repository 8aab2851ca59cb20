//! # vpu-runtime: buffer and task plumbing for video codec pipelines
//!
//! The runtime coordinates a bitstream parser, a hardware codec backend and a
//! display consumer that share a bounded pool of large frame buffers. It moves
//! small handles between threads; pixel data stays where the hardware put it.
//!
//! ## Architecture
//!
//! - **Attachments**: per-task typed mailboxes with at-most-once delivery,
//!   tracked by an explicit registry that reports leaks at teardown
//! - **Slots**: a fixed table of frame buffers with independent hold flags
//!   and named FIFO queues
//! - **Tasks**: a closed loop of reusable task tokens between two stages
//! - **Pipeline**: parser and hardware stage threads wired through the above
//!
//! ## Example
//!
//! ```ignore
//! use vpu_runtime::{config::RuntimeConfig, media::Packet, pipeline::DecodePipeline};
//! use std::time::Duration;
//!
//! let pipeline = DecodePipeline::new(RuntimeConfig::default())?;
//! pipeline.send_packet(Packet::new(vec![0u8; 1024], 0))?;
//! if let Some(frame) = pipeline.next_frame(Duration::from_millis(100)) {
//!     println!("decoded pts {}", frame.pts());
//! } // dropping the frame hands its buffer back
//! let stats = pipeline.shutdown();
//! ```

pub mod attachment;
pub mod config;
pub mod error;
pub mod id;
pub mod logging;
pub mod media;
pub mod pipeline;
pub mod slots;
pub mod task;

// Re-export commonly used types
pub use attachment::{AttachmentBag, AttachmentKey, AttachmentRegistry};
pub use config::RuntimeConfig;
pub use error::{Result, ResultExt, RuntimeError};
pub use id::{BagId, SlotIndex, TaskIndex};
pub use media::{CodecType, FrameDescriptor, Packet};
pub use pipeline::{DecodePipeline, DisplayFrame, PipelineBuilder};
pub use slots::{BufferSlotTable, HoldFlags, SlotQueue};
pub use task::{PollTimeout, PortDirection, TaskPort, TaskQueue, TaskToken};
