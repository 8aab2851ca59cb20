//! Stream geometry and the buffer size it implies.

use crate::media::FrameFormat;
use serde::{Deserialize, Serialize};

/// Luma row alignment in bytes.
pub const HOR_ALIGN: u32 = 16;
/// Plane height alignment in lines.
pub const VER_ALIGN: u32 = 16;

#[inline]
pub fn align_up(value: u32, align: u32) -> u32 {
    debug_assert!(align.is_power_of_two());
    (value + align - 1) & !(align - 1)
}

/// Negotiated picture layout shared by every slot of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameInfo {
    pub width: u32,
    pub height: u32,
    pub format: FrameFormat,
    pub hor_stride: u32,
    pub ver_stride: u32,
    pub buffer_size: usize,
}

impl FrameInfo {
    /// Derive strides and buffer size from the display size.
    pub fn new(width: u32, height: u32, format: FrameFormat) -> Self {
        let row_bytes = (width * format.bit_depth()).div_ceil(8);
        let hor_stride = align_up(row_bytes, HOR_ALIGN);
        let ver_stride = align_up(height, VER_ALIGN);
        let luma = hor_stride as usize * ver_stride as usize;
        let (num, den) = format.chroma_ratio();

        Self {
            width,
            height,
            format,
            hor_stride,
            ver_stride,
            buffer_size: luma + luma * num / den,
        }
    }
}
