//! Two-stage decode pipeline.
//!
//! Packets flow through a parser stage and a hardware stage, each on its own
//! thread, connected by a [`TaskQueue`](crate::task::TaskQueue). Decoded
//! pictures come out of the slot table's display queue.
//!
//! # Architecture
//!
//! ```text
//! [Parser] ──task──► [HalBackend] ──slot──► DisplayFrame
//! ```
//!
//! # Design
//!
//! - **Trait seams**: [`Parser`] and [`HalBackend`] are the only codec- and
//!   hardware-specific parts; [`synthetic`] provides stand-ins.
//! - **Registry dispatch**: [`HalRegistry`] maps a codec to a backend factory.
//! - **Dedicated threads**: stages block on task ports, shutdown closes the
//!   queue to wake them.

pub mod bridge;
pub mod error;
pub mod executor;
pub mod hal_registry;
pub mod stage;
pub mod synthetic;

pub use bridge::{DisplayFrame, PipelineStats};
pub use error::{PipelineError, PipelineResult};
pub use executor::{DecodePipeline, PipelineBuilder};
pub use hal_registry::{HalFactory, HalRegistry};
pub use stage::{HalBackend, Parser};
pub use synthetic::{SyntheticHal, SyntheticParser};
