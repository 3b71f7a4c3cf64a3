use bitflags::bitflags;
#[cfg(feature = "dashi-serde")]
use serde::{Deserialize, Serialize};

bitflags! {
    /// How a buffer may be bound. A buffer with no usage bits is rejected.
    #[repr(C)]
    #[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "dashi-serde", derive(Serialize, Deserialize))]
    pub struct BufferUsage: u32 {
        const VERTEX         = 0x1;
        const INDEX          = 0x2;
        const UNIFORM        = 0x4;
        const STORAGE        = 0x8;
        const INDIRECT       = 0x10;
        const DYNAMIC        = 0x20;
        const CPU_ACCESSIBLE = 0x40;
    }
}

bitflags! {
    #[repr(C)]
    #[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "dashi-serde", derive(Serialize, Deserialize))]
    pub struct TextureUsage: u32 {
        const TRANSFER_SRC  = 0x1;
        const TRANSFER_DST  = 0x2;
        const SAMPLED       = 0x4;
        const STORAGE       = 0x8;
        /// Color or depth-stencil attachment, decided by the format.
        const RENDER_TARGET = 0x10;
    }
}

bitflags! {
    /// Aspects cleared by a depth-stencil clear.
    #[repr(C)]
    #[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "dashi-serde", derive(Serialize, Deserialize))]
    pub struct ClearFlags: u32 {
        const DEPTH   = 0x1;
        const STENCIL = 0x2;
    }
}

bitflags! {
    #[repr(C)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "dashi-serde", derive(Serialize, Deserialize))]
    pub struct ColorWriteMask: u32 {
        const RED   = 0x1;
        const GREEN = 0x2;
        const BLUE  = 0x4;
        const ALPHA = 0x8;
        const ALL   = Self::RED.bits() | Self::GREEN.bits() | Self::BLUE.bits() | Self::ALPHA.bits();
    }
}

impl Default for ColorWriteMask {
    fn default() -> Self {
        ColorWriteMask::ALL
    }
}
