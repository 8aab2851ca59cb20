//! The static key catalog and the typed values it admits.
//!
//! Every `AttachmentKey` declares exactly one `ValueKind`. A `set` or `get`
//! with a Rust type whose kind differs from the declared one is rejected
//! before any slot state is touched.

use crate::id::SlotIndex;
use crate::media::{FrameDescriptor, HalStatus, MediaBuffer, Packet, RefList};
use std::fmt;

/// Declared type of a catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    S32,
    S64,
    Frame,
    Packet,
    Buffer,
    Slot,
    Refs,
    Status,
}

/// Generates the key enum together with its catalog table so the two can
/// never drift apart.
macro_rules! attachment_keys {
    ($($variant:ident => ($name:literal, $kind:ident)),+ $(,)?) => {
        /// Named entry of the attachment catalog.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum AttachmentKey {
            $($variant),+
        }

        impl AttachmentKey {
            /// Every key, in slot order.
            pub const ALL: &'static [AttachmentKey] = &[$(AttachmentKey::$variant),+];

            /// Number of mailboxes each bag carries.
            pub const COUNT: usize = Self::ALL.len();

            pub const fn name(self) -> &'static str {
                match self {
                    $(AttachmentKey::$variant => $name),+
                }
            }

            pub const fn kind(self) -> ValueKind {
                match self {
                    $(AttachmentKey::$variant => ValueKind::$kind),+
                }
            }
        }
    };
}

attachment_keys! {
    InputFrame => ("input_frame", Frame),
    OutputFrame => ("output_frame", Frame),
    InputPacket => ("input_packet", Packet),
    OutputPacket => ("output_packet", Packet),
    MotionInfo => ("motion_info", Buffer),
    HdrInfo => ("hdr_info", Buffer),
    UserData => ("user_data", Buffer),
    OutputSlot => ("output_slot", Slot),
    ReferenceSlots => ("reference_slots", Refs),
    HardwareStatus => ("hal_status", Status),
    ErrorFlags => ("error_flags", S32),
    EndOfStream => ("end_of_stream", S32),
    BitstreamLength => ("bitstream_length", S64),
    Pts => ("pts", S64),
    InputIdrRequest => ("input_idr_request", S32),
    OutputIntra => ("output_intra", S32),
    TemporalId => ("temporal_id", S32),
    LongRefIndex => ("long_ref_index", S32),
    AverageQp => ("average_qp", S32),
    InputBlock => ("input_block", S32),
    OutputBlock => ("output_block", S32),
}

impl AttachmentKey {
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for AttachmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A value stored in a mailbox. One variant per `ValueKind`.
#[derive(Debug, Clone)]
pub enum AttachmentValue {
    S32(i32),
    S64(i64),
    Frame(FrameDescriptor),
    Packet(Packet),
    Buffer(MediaBuffer),
    Slot(SlotIndex),
    Refs(RefList),
    Status(HalStatus),
}

impl AttachmentValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            AttachmentValue::S32(_) => ValueKind::S32,
            AttachmentValue::S64(_) => ValueKind::S64,
            AttachmentValue::Frame(_) => ValueKind::Frame,
            AttachmentValue::Packet(_) => ValueKind::Packet,
            AttachmentValue::Buffer(_) => ValueKind::Buffer,
            AttachmentValue::Slot(_) => ValueKind::Slot,
            AttachmentValue::Refs(_) => ValueKind::Refs,
            AttachmentValue::Status(_) => ValueKind::Status,
        }
    }
}

/// Rust types that may be stored under a catalog key.
pub trait AttachmentType: Sized + Send + 'static {
    const KIND: ValueKind;

    fn into_value(self) -> AttachmentValue;

    fn from_value(value: AttachmentValue) -> Option<Self>;
}

macro_rules! impl_attachment_type {
    ($($ty:ty => $variant:ident),+ $(,)?) => {
        $(
            impl AttachmentType for $ty {
                const KIND: ValueKind = ValueKind::$variant;

                #[inline]
                fn into_value(self) -> AttachmentValue {
                    AttachmentValue::$variant(self)
                }

                #[inline]
                fn from_value(value: AttachmentValue) -> Option<Self> {
                    match value {
                        AttachmentValue::$variant(v) => Some(v),
                        _ => None,
                    }
                }
            }
        )+
    };
}

impl_attachment_type! {
    i32 => S32,
    i64 => S64,
    FrameDescriptor => Frame,
    Packet => Packet,
    MediaBuffer => Buffer,
    SlotIndex => Slot,
    RefList => Refs,
    HalStatus => Status,
}
