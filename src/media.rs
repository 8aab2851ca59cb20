//! Media descriptors exchanged between pipeline stages.
//!
//! Everything here is small and cheap to move: frame descriptors and buffer
//! handles are `Copy`, packets share their payload through an `Arc`. Bulk
//! pixel data never travels through these types, only the handles to it.

use crate::id::SlotIndex;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Maximum number of reference pictures a single task can name.
pub const MAX_REFS: usize = 16;

/// Codec families a HAL backend can be registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecType {
    H264,
    H265,
    Vp9,
    Av1,
    Mjpeg,
}

impl CodecType {
    pub const ALL: &'static [CodecType] = &[
        CodecType::H264,
        CodecType::H265,
        CodecType::Vp9,
        CodecType::Av1,
        CodecType::Mjpeg,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CodecType::H264 => "h264",
            CodecType::H265 => "h265",
            CodecType::Vp9 => "vp9",
            CodecType::Av1 => "av1",
            CodecType::Mjpeg => "mjpeg",
        }
    }
}

/// Raw frame layouts the slot table knows how to size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameFormat {
    #[default]
    Yuv420Sp,
    Yuv420Sp10Bit,
    Yuv422Sp,
    Yuv444Sp,
}

impl FrameFormat {
    pub fn bit_depth(self) -> u32 {
        match self {
            FrameFormat::Yuv420Sp10Bit => 10,
            _ => 8,
        }
    }

    /// Chroma plane size relative to luma, as `(numerator, denominator)`.
    pub fn chroma_ratio(self) -> (usize, usize) {
        match self {
            FrameFormat::Yuv420Sp | FrameFormat::Yuv420Sp10Bit => (1, 2),
            FrameFormat::Yuv422Sp => (1, 1),
            FrameFormat::Yuv444Sp => (2, 1),
        }
    }
}

/// Metadata for one decoded picture living in a buffer slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FrameDescriptor {
    pub width: u32,
    pub height: u32,
    pub hor_stride: u32,
    pub ver_stride: u32,
    pub format: FrameFormat,
    pub pts: i64,
    /// Slot holding the pixel data, `SlotIndex::INVALID` when detached.
    pub slot: SlotIndex,
    /// Non-zero when decoding this picture hit an error.
    pub errinfo: u32,
    pub discard: bool,
    pub eos: bool,
}

impl FrameDescriptor {
    pub fn new(width: u32, height: u32, format: FrameFormat) -> Self {
        Self {
            width,
            height,
            hor_stride: width,
            ver_stride: height,
            format,
            slot: SlotIndex::INVALID,
            ..Default::default()
        }
    }

    pub fn with_pts(mut self, pts: i64) -> Self {
        self.pts = pts;
        self
    }

    pub fn is_errored(&self) -> bool {
        self.errinfo != 0
    }
}

/// Compressed input unit handed to the parser.
#[derive(Debug, Clone)]
pub struct Packet {
    data: Arc<[u8]>,
    pub pts: i64,
    pub dts: i64,
    pub eos: bool,
}

impl Packet {
    pub fn new(data: impl Into<Arc<[u8]>>, pts: i64) -> Self {
        Self {
            data: data.into(),
            pts,
            dts: pts,
            eos: false,
        }
    }

    /// An empty packet that only carries the end-of-stream marker.
    pub fn eos() -> Self {
        Self {
            eos: true,
            ..Self::new(Vec::<u8>::new(), 0)
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Opaque handle to a buffer owned by an external allocator backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaBuffer {
    pub handle: u64,
    pub size: usize,
}

impl MediaBuffer {
    pub fn new(handle: u64, size: usize) -> Self {
        Self { handle, size }
    }
}

/// Fixed-capacity list of reference slots. Never heap-allocated.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct RefList {
    slots: [SlotIndex; MAX_REFS],
    len: u8,
}

impl Default for RefList {
    fn default() -> Self {
        Self {
            slots: [SlotIndex::INVALID; MAX_REFS],
            len: 0,
        }
    }
}

impl RefList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a reference. Returns `false` if full.
    pub fn push(&mut self, slot: SlotIndex) -> bool {
        if self.len as usize >= MAX_REFS {
            return false;
        }
        self.slots[self.len as usize] = slot;
        self.len += 1;
        true
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[SlotIndex] {
        &self.slots[..self.len as usize]
    }
}

impl std::fmt::Debug for RefList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.as_slice()).finish()
    }
}

bitflags! {
    /// Completion status written back by the hardware stage.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct HalStatus: u32 {
        const DONE = 1 << 0;
        const ERROR = 1 << 1;
        const TIMEOUT = 1 << 2;
        const BUFFER_OVERFLOW = 1 << 3;
        const REFERENCE_MISSING = 1 << 4;
    }
}

impl HalStatus {
    pub fn is_failure(self) -> bool {
        self.intersects(Self::ERROR | Self::TIMEOUT | Self::BUFFER_OVERFLOW)
    }
}
