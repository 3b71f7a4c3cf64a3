#[cfg(feature = "dashi-serde")]
use serde::{Deserialize, Serialize};

/// Texel formats understood by every backend.
#[repr(u32)]
#[derive(Default, Hash, Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "dashi-serde", derive(Serialize, Deserialize))]
pub enum PixelFormat {
    Undefined,
    // 8-bit
    R8Unorm,
    R8Snorm,
    R8Uint,
    R8Sint,
    // 16-bit
    R16Unorm,
    R16Snorm,
    R16Uint,
    R16Sint,
    R16Float,
    RG8Unorm,
    RG8Snorm,
    RG8Uint,
    RG8Sint,
    // 32-bit
    R32Uint,
    R32Sint,
    R32Float,
    RG16Unorm,
    RG16Snorm,
    RG16Uint,
    RG16Sint,
    RG16Float,
    #[default]
    RGBA8Unorm,
    RGBA8UnormSrgb,
    RGBA8Snorm,
    RGBA8Uint,
    RGBA8Sint,
    BGRA8Unorm,
    BGRA8UnormSrgb,
    RGB10A2Unorm,
    RG11B10Float,
    // 64-bit
    RG32Uint,
    RG32Sint,
    RG32Float,
    RGBA16Unorm,
    RGBA16Snorm,
    RGBA16Uint,
    RGBA16Sint,
    RGBA16Float,
    // 128-bit
    RGBA32Uint,
    RGBA32Sint,
    RGBA32Float,
    // Depth / stencil
    D16Unorm,
    D24UnormS8Uint,
    D32Float,
    D32FloatS8Uint,
    S8Uint,
    // Block compressed
    BC1RGBAUnorm,
    BC1RGBAUnormSrgb,
    BC3RGBAUnorm,
    BC3RGBAUnormSrgb,
    BC4RUnorm,
    BC5RGUnorm,
    BC7RGBAUnorm,
    BC7RGBAUnormSrgb,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatKind {
    Unorm,
    UnormSrgb,
    Snorm,
    Uint,
    Sint,
    Float,
    DepthStencil,
}

/// Static description of one [`PixelFormat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatInfo {
    pub kind: FormatKind,
    /// Bytes per texel, or per 4x4 block for compressed formats.
    pub block_bytes: u32,
    pub block_extent: u32,
    pub depth: bool,
    pub stencil: bool,
}

const fn color(kind: FormatKind, block_bytes: u32) -> FormatInfo {
    FormatInfo {
        kind,
        block_bytes,
        block_extent: 1,
        depth: false,
        stencil: false,
    }
}

const fn depth_stencil(block_bytes: u32, depth: bool, stencil: bool) -> FormatInfo {
    FormatInfo {
        kind: FormatKind::DepthStencil,
        block_bytes,
        block_extent: 1,
        depth,
        stencil,
    }
}

const fn compressed(kind: FormatKind, block_bytes: u32) -> FormatInfo {
    FormatInfo {
        kind,
        block_bytes,
        block_extent: 4,
        depth: false,
        stencil: false,
    }
}

impl PixelFormat {
    pub const fn info(self) -> FormatInfo {
        use FormatKind::*;
        use PixelFormat as F;
        match self {
            F::Undefined => color(Unorm, 0),
            F::R8Unorm => color(Unorm, 1),
            F::R8Snorm => color(Snorm, 1),
            F::R8Uint => color(Uint, 1),
            F::R8Sint => color(Sint, 1),
            F::R16Unorm | F::RG8Unorm => color(Unorm, 2),
            F::R16Snorm | F::RG8Snorm => color(Snorm, 2),
            F::R16Uint | F::RG8Uint => color(Uint, 2),
            F::R16Sint | F::RG8Sint => color(Sint, 2),
            F::R16Float => color(Float, 2),
            F::R32Uint | F::RG16Uint | F::RGBA8Uint => color(Uint, 4),
            F::R32Sint | F::RG16Sint | F::RGBA8Sint => color(Sint, 4),
            F::R32Float | F::RG16Float | F::RG11B10Float => color(Float, 4),
            F::RG16Unorm | F::RGBA8Unorm | F::BGRA8Unorm | F::RGB10A2Unorm => color(Unorm, 4),
            F::RG16Snorm | F::RGBA8Snorm => color(Snorm, 4),
            F::RGBA8UnormSrgb | F::BGRA8UnormSrgb => color(UnormSrgb, 4),
            F::RG32Uint | F::RGBA16Uint => color(Uint, 8),
            F::RG32Sint | F::RGBA16Sint => color(Sint, 8),
            F::RG32Float | F::RGBA16Float => color(Float, 8),
            F::RGBA16Unorm => color(Unorm, 8),
            F::RGBA16Snorm => color(Snorm, 8),
            F::RGBA32Uint => color(Uint, 16),
            F::RGBA32Sint => color(Sint, 16),
            F::RGBA32Float => color(Float, 16),
            F::D16Unorm => depth_stencil(2, true, false),
            F::D24UnormS8Uint => depth_stencil(4, true, true),
            F::D32Float => depth_stencil(4, true, false),
            F::D32FloatS8Uint => depth_stencil(8, true, true),
            F::S8Uint => depth_stencil(1, false, true),
            F::BC1RGBAUnorm | F::BC4RUnorm => compressed(Unorm, 8),
            F::BC1RGBAUnormSrgb => compressed(UnormSrgb, 8),
            F::BC3RGBAUnorm | F::BC5RGUnorm | F::BC7RGBAUnorm => compressed(Unorm, 16),
            F::BC3RGBAUnormSrgb | F::BC7RGBAUnormSrgb => compressed(UnormSrgb, 16),
        }
    }

    /// True for every format that can back a depth-stencil attachment,
    /// including stencil-only ones.
    pub const fn is_depth_stencil(self) -> bool {
        matches!(self.info().kind, FormatKind::DepthStencil)
    }

    pub const fn has_depth(self) -> bool {
        self.info().depth
    }

    pub const fn has_stencil(self) -> bool {
        self.info().stencil
    }

    pub const fn is_compressed(self) -> bool {
        self.info().block_extent > 1
    }

    pub const fn is_srgb(self) -> bool {
        matches!(self.info().kind, FormatKind::UnormSrgb)
    }

    /// Size in bytes of a `width` x `height` image in this format.
    pub fn image_size(self, width: u32, height: u32) -> u64 {
        let info = self.info();
        let bw = width.div_ceil(info.block_extent) as u64;
        let bh = height.div_ceil(info.block_extent) as u64;
        bw * bh * info.block_bytes as u64
    }
}
