use ash::vk;

use crate::gpu::driver::types::{BufferUsage, ColorWriteMask, TextureUsage};
use crate::gpu::format::PixelFormat;
use crate::gpu::structs::*;
use crate::gpu::view_cache::{ViewDimension, ViewKind};

impl From<PixelFormat> for vk::Format {
    fn from(format: PixelFormat) -> Self {
        use PixelFormat as F;
        match format {
            F::Undefined => vk::Format::UNDEFINED,
            F::R8Unorm => vk::Format::R8_UNORM,
            F::R8Snorm => vk::Format::R8_SNORM,
            F::R8Uint => vk::Format::R8_UINT,
            F::R8Sint => vk::Format::R8_SINT,
            F::R16Unorm => vk::Format::R16_UNORM,
            F::R16Snorm => vk::Format::R16_SNORM,
            F::R16Uint => vk::Format::R16_UINT,
            F::R16Sint => vk::Format::R16_SINT,
            F::R16Float => vk::Format::R16_SFLOAT,
            F::RG8Unorm => vk::Format::R8G8_UNORM,
            F::RG8Snorm => vk::Format::R8G8_SNORM,
            F::RG8Uint => vk::Format::R8G8_UINT,
            F::RG8Sint => vk::Format::R8G8_SINT,
            F::R32Uint => vk::Format::R32_UINT,
            F::R32Sint => vk::Format::R32_SINT,
            F::R32Float => vk::Format::R32_SFLOAT,
            F::RG16Unorm => vk::Format::R16G16_UNORM,
            F::RG16Snorm => vk::Format::R16G16_SNORM,
            F::RG16Uint => vk::Format::R16G16_UINT,
            F::RG16Sint => vk::Format::R16G16_SINT,
            F::RG16Float => vk::Format::R16G16_SFLOAT,
            F::RGBA8Unorm => vk::Format::R8G8B8A8_UNORM,
            F::RGBA8UnormSrgb => vk::Format::R8G8B8A8_SRGB,
            F::RGBA8Snorm => vk::Format::R8G8B8A8_SNORM,
            F::RGBA8Uint => vk::Format::R8G8B8A8_UINT,
            F::RGBA8Sint => vk::Format::R8G8B8A8_SINT,
            F::BGRA8Unorm => vk::Format::B8G8R8A8_UNORM,
            F::BGRA8UnormSrgb => vk::Format::B8G8R8A8_SRGB,
            F::RGB10A2Unorm => vk::Format::A2B10G10R10_UNORM_PACK32,
            F::RG11B10Float => vk::Format::B10G11R11_UFLOAT_PACK32,
            F::RG32Uint => vk::Format::R32G32_UINT,
            F::RG32Sint => vk::Format::R32G32_SINT,
            F::RG32Float => vk::Format::R32G32_SFLOAT,
            F::RGBA16Unorm => vk::Format::R16G16B16A16_UNORM,
            F::RGBA16Snorm => vk::Format::R16G16B16A16_SNORM,
            F::RGBA16Uint => vk::Format::R16G16B16A16_UINT,
            F::RGBA16Sint => vk::Format::R16G16B16A16_SINT,
            F::RGBA16Float => vk::Format::R16G16B16A16_SFLOAT,
            F::RGBA32Uint => vk::Format::R32G32B32A32_UINT,
            F::RGBA32Sint => vk::Format::R32G32B32A32_SINT,
            F::RGBA32Float => vk::Format::R32G32B32A32_SFLOAT,
            F::D16Unorm => vk::Format::D16_UNORM,
            F::D24UnormS8Uint => vk::Format::D24_UNORM_S8_UINT,
            F::D32Float => vk::Format::D32_SFLOAT,
            F::D32FloatS8Uint => vk::Format::D32_SFLOAT_S8_UINT,
            F::S8Uint => vk::Format::S8_UINT,
            F::BC1RGBAUnorm => vk::Format::BC1_RGBA_UNORM_BLOCK,
            F::BC1RGBAUnormSrgb => vk::Format::BC1_RGBA_SRGB_BLOCK,
            F::BC3RGBAUnorm => vk::Format::BC3_UNORM_BLOCK,
            F::BC3RGBAUnormSrgb => vk::Format::BC3_SRGB_BLOCK,
            F::BC4RUnorm => vk::Format::BC4_UNORM_BLOCK,
            F::BC5RGUnorm => vk::Format::BC5_UNORM_BLOCK,
            F::BC7RGBAUnorm => vk::Format::BC7_UNORM_BLOCK,
            F::BC7RGBAUnormSrgb => vk::Format::BC7_SRGB_BLOCK,
        }
    }
}

/// Inverse of the table above for the formats a surface can report.
pub(super) fn surface_format(format: vk::Format) -> Option<PixelFormat> {
    match format {
        vk::Format::B8G8R8A8_UNORM => Some(PixelFormat::BGRA8Unorm),
        vk::Format::B8G8R8A8_SRGB => Some(PixelFormat::BGRA8UnormSrgb),
        vk::Format::R8G8B8A8_UNORM => Some(PixelFormat::RGBA8Unorm),
        vk::Format::R8G8B8A8_SRGB => Some(PixelFormat::RGBA8UnormSrgb),
        vk::Format::A2B10G10R10_UNORM_PACK32 => Some(PixelFormat::RGB10A2Unorm),
        vk::Format::R16G16B16A16_SFLOAT => Some(PixelFormat::RGBA16Float),
        _ => None,
    }
}

pub(super) fn aspect(format: PixelFormat) -> vk::ImageAspectFlags {
    let mut flags = vk::ImageAspectFlags::empty();
    if format.has_depth() {
        flags |= vk::ImageAspectFlags::DEPTH;
    }
    if format.has_stencil() {
        flags |= vk::ImageAspectFlags::STENCIL;
    }
    if flags.is_empty() {
        vk::ImageAspectFlags::COLOR
    } else {
        flags
    }
}

/// Shader-resource views of depth-stencil textures sample depth only.
pub(super) fn view_aspect(kind: ViewKind, format: PixelFormat) -> vk::ImageAspectFlags {
    match kind {
        ViewKind::ShaderResource if format.has_depth() => vk::ImageAspectFlags::DEPTH,
        _ => aspect(format),
    }
}

impl From<SampleCount> for vk::SampleCountFlags {
    fn from(samples: SampleCount) -> Self {
        match samples {
            SampleCount::S1 => vk::SampleCountFlags::TYPE_1,
            SampleCount::S2 => vk::SampleCountFlags::TYPE_2,
            SampleCount::S4 => vk::SampleCountFlags::TYPE_4,
            SampleCount::S8 => vk::SampleCountFlags::TYPE_8,
            SampleCount::S16 => vk::SampleCountFlags::TYPE_16,
            SampleCount::S32 => vk::SampleCountFlags::TYPE_32,
        }
    }
}

impl From<TextureType> for vk::ImageType {
    fn from(ty: TextureType) -> Self {
        match ty {
            TextureType::Type1D => vk::ImageType::TYPE_1D,
            TextureType::Type2D | TextureType::TypeCube => vk::ImageType::TYPE_2D,
            TextureType::Type3D => vk::ImageType::TYPE_3D,
        }
    }
}

impl From<ViewDimension> for vk::ImageViewType {
    fn from(dim: ViewDimension) -> Self {
        match dim {
            ViewDimension::Texture1D => vk::ImageViewType::TYPE_1D,
            ViewDimension::Texture1DArray => vk::ImageViewType::TYPE_1D_ARRAY,
            ViewDimension::Texture2D | ViewDimension::Texture2DMS => vk::ImageViewType::TYPE_2D,
            ViewDimension::Texture2DArray | ViewDimension::Texture2DMSArray => {
                vk::ImageViewType::TYPE_2D_ARRAY
            }
            ViewDimension::Texture3D => vk::ImageViewType::TYPE_3D,
            ViewDimension::TextureCube => vk::ImageViewType::CUBE,
            ViewDimension::TextureCubeArray => vk::ImageViewType::CUBE_ARRAY,
        }
    }
}

pub(super) fn texture_usage(usage: TextureUsage, format: PixelFormat) -> vk::ImageUsageFlags {
    // Uploads and clears go through transfers, so every image may be a
    // transfer destination.
    let mut flags = vk::ImageUsageFlags::TRANSFER_DST;
    if usage.contains(TextureUsage::TRANSFER_SRC) {
        flags |= vk::ImageUsageFlags::TRANSFER_SRC;
    }
    if usage.contains(TextureUsage::SAMPLED) {
        flags |= vk::ImageUsageFlags::SAMPLED;
    }
    if usage.contains(TextureUsage::STORAGE) {
        flags |= vk::ImageUsageFlags::STORAGE;
    }
    if usage.contains(TextureUsage::RENDER_TARGET) {
        flags |= if format.is_depth_stencil() {
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT
        } else {
            vk::ImageUsageFlags::COLOR_ATTACHMENT
        };
    }
    flags
}

pub(super) fn buffer_usage(usage: BufferUsage) -> vk::BufferUsageFlags {
    let mut flags = vk::BufferUsageFlags::TRANSFER_DST | vk::BufferUsageFlags::TRANSFER_SRC;
    if usage.contains(BufferUsage::VERTEX) {
        flags |= vk::BufferUsageFlags::VERTEX_BUFFER;
    }
    if usage.contains(BufferUsage::INDEX) {
        flags |= vk::BufferUsageFlags::INDEX_BUFFER;
    }
    if usage.contains(BufferUsage::UNIFORM) {
        flags |= vk::BufferUsageFlags::UNIFORM_BUFFER;
    }
    if usage.contains(BufferUsage::STORAGE) {
        flags |= vk::BufferUsageFlags::STORAGE_BUFFER;
    }
    if usage.contains(BufferUsage::INDIRECT) {
        flags |= vk::BufferUsageFlags::INDIRECT_BUFFER;
    }
    flags
}

impl From<FilterMode> for vk::Filter {
    fn from(filter: FilterMode) -> Self {
        match filter {
            FilterMode::Nearest => vk::Filter::NEAREST,
            FilterMode::Linear => vk::Filter::LINEAR,
        }
    }
}

impl From<FilterMode> for vk::SamplerMipmapMode {
    fn from(filter: FilterMode) -> Self {
        match filter {
            FilterMode::Nearest => vk::SamplerMipmapMode::NEAREST,
            FilterMode::Linear => vk::SamplerMipmapMode::LINEAR,
        }
    }
}

impl From<AddressMode> for vk::SamplerAddressMode {
    fn from(mode: AddressMode) -> Self {
        match mode {
            AddressMode::Repeat => vk::SamplerAddressMode::REPEAT,
            AddressMode::MirrorRepeat => vk::SamplerAddressMode::MIRRORED_REPEAT,
            AddressMode::ClampToEdge => vk::SamplerAddressMode::CLAMP_TO_EDGE,
            AddressMode::ClampToBorder => vk::SamplerAddressMode::CLAMP_TO_BORDER,
            AddressMode::MirrorClampToEdge => vk::SamplerAddressMode::MIRROR_CLAMP_TO_EDGE,
        }
    }
}

impl From<BorderColor> for vk::BorderColor {
    fn from(color: BorderColor) -> Self {
        match color {
            BorderColor::TransparentBlack => vk::BorderColor::FLOAT_TRANSPARENT_BLACK,
            BorderColor::OpaqueBlack => vk::BorderColor::FLOAT_OPAQUE_BLACK,
            BorderColor::OpaqueWhite => vk::BorderColor::FLOAT_OPAQUE_WHITE,
        }
    }
}

impl From<CompareFunction> for vk::CompareOp {
    fn from(func: CompareFunction) -> Self {
        match func {
            CompareFunction::Never => vk::CompareOp::NEVER,
            CompareFunction::Less => vk::CompareOp::LESS,
            CompareFunction::Equal => vk::CompareOp::EQUAL,
            CompareFunction::LessEqual => vk::CompareOp::LESS_OR_EQUAL,
            CompareFunction::Greater => vk::CompareOp::GREATER,
            CompareFunction::NotEqual => vk::CompareOp::NOT_EQUAL,
            CompareFunction::GreaterEqual => vk::CompareOp::GREATER_OR_EQUAL,
            CompareFunction::Always => vk::CompareOp::ALWAYS,
        }
    }
}

impl From<StencilOperation> for vk::StencilOp {
    fn from(op: StencilOperation) -> Self {
        match op {
            StencilOperation::Keep => vk::StencilOp::KEEP,
            StencilOperation::Zero => vk::StencilOp::ZERO,
            StencilOperation::Replace => vk::StencilOp::REPLACE,
            StencilOperation::IncrementClamp => vk::StencilOp::INCREMENT_AND_CLAMP,
            StencilOperation::DecrementClamp => vk::StencilOp::DECREMENT_AND_CLAMP,
            StencilOperation::Invert => vk::StencilOp::INVERT,
            StencilOperation::IncrementWrap => vk::StencilOp::INCREMENT_AND_WRAP,
            StencilOperation::DecrementWrap => vk::StencilOp::DECREMENT_AND_WRAP,
        }
    }
}

pub(super) fn stencil_face(face: &StencilFaceState, read_mask: u8, write_mask: u8) -> vk::StencilOpState {
    vk::StencilOpState {
        fail_op: face.fail_op.into(),
        pass_op: face.pass_op.into(),
        depth_fail_op: face.depth_fail_op.into(),
        compare_op: face.compare.into(),
        compare_mask: read_mask as u32,
        write_mask: write_mask as u32,
        // Dynamic.
        reference: 0,
    }
}

impl From<CullMode> for vk::CullModeFlags {
    fn from(mode: CullMode) -> Self {
        match mode {
            CullMode::None => vk::CullModeFlags::NONE,
            CullMode::Front => vk::CullModeFlags::FRONT,
            CullMode::Back => vk::CullModeFlags::BACK,
        }
    }
}

impl From<FrontFace> for vk::FrontFace {
    fn from(face: FrontFace) -> Self {
        match face {
            FrontFace::CounterClockwise => vk::FrontFace::COUNTER_CLOCKWISE,
            FrontFace::Clockwise => vk::FrontFace::CLOCKWISE,
        }
    }
}

impl From<FillMode> for vk::PolygonMode {
    fn from(mode: FillMode) -> Self {
        match mode {
            FillMode::Solid => vk::PolygonMode::FILL,
            FillMode::Wireframe => vk::PolygonMode::LINE,
        }
    }
}

impl From<BlendFactor> for vk::BlendFactor {
    fn from(factor: BlendFactor) -> Self {
        match factor {
            BlendFactor::Zero => vk::BlendFactor::ZERO,
            BlendFactor::One => vk::BlendFactor::ONE,
            BlendFactor::SrcColor => vk::BlendFactor::SRC_COLOR,
            BlendFactor::OneMinusSrcColor => vk::BlendFactor::ONE_MINUS_SRC_COLOR,
            BlendFactor::SrcAlpha => vk::BlendFactor::SRC_ALPHA,
            BlendFactor::OneMinusSrcAlpha => vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
            BlendFactor::DstColor => vk::BlendFactor::DST_COLOR,
            BlendFactor::OneMinusDstColor => vk::BlendFactor::ONE_MINUS_DST_COLOR,
            BlendFactor::DstAlpha => vk::BlendFactor::DST_ALPHA,
            BlendFactor::OneMinusDstAlpha => vk::BlendFactor::ONE_MINUS_DST_ALPHA,
            BlendFactor::SrcAlphaSaturated => vk::BlendFactor::SRC_ALPHA_SATURATE,
            BlendFactor::BlendColor => vk::BlendFactor::CONSTANT_COLOR,
            BlendFactor::OneMinusBlendColor => vk::BlendFactor::ONE_MINUS_CONSTANT_COLOR,
        }
    }
}

impl From<BlendOperation> for vk::BlendOp {
    fn from(op: BlendOperation) -> Self {
        match op {
            BlendOperation::Add => vk::BlendOp::ADD,
            BlendOperation::Subtract => vk::BlendOp::SUBTRACT,
            BlendOperation::ReverseSubtract => vk::BlendOp::REVERSE_SUBTRACT,
            BlendOperation::Min => vk::BlendOp::MIN,
            BlendOperation::Max => vk::BlendOp::MAX,
        }
    }
}

impl From<ColorWriteMask> for vk::ColorComponentFlags {
    fn from(mask: ColorWriteMask) -> Self {
        let mut flags = vk::ColorComponentFlags::empty();
        if mask.contains(ColorWriteMask::RED) {
            flags |= vk::ColorComponentFlags::R;
        }
        if mask.contains(ColorWriteMask::GREEN) {
            flags |= vk::ColorComponentFlags::G;
        }
        if mask.contains(ColorWriteMask::BLUE) {
            flags |= vk::ColorComponentFlags::B;
        }
        if mask.contains(ColorWriteMask::ALPHA) {
            flags |= vk::ColorComponentFlags::A;
        }
        flags
    }
}

impl From<&RenderTargetBlendState> for vk::PipelineColorBlendAttachmentState {
    fn from(state: &RenderTargetBlendState) -> Self {
        vk::PipelineColorBlendAttachmentState {
            blend_enable: state.blend_enable as vk::Bool32,
            src_color_blend_factor: state.src_color.into(),
            dst_color_blend_factor: state.dst_color.into(),
            color_blend_op: state.color_op.into(),
            src_alpha_blend_factor: state.src_alpha.into(),
            dst_alpha_blend_factor: state.dst_alpha.into(),
            alpha_blend_op: state.alpha_op.into(),
            color_write_mask: state.write_mask.into(),
        }
    }
}

impl From<PrimitiveTopology> for vk::PrimitiveTopology {
    fn from(topology: PrimitiveTopology) -> Self {
        match topology {
            PrimitiveTopology::PointList => vk::PrimitiveTopology::POINT_LIST,
            PrimitiveTopology::LineList => vk::PrimitiveTopology::LINE_LIST,
            PrimitiveTopology::LineStrip => vk::PrimitiveTopology::LINE_STRIP,
            PrimitiveTopology::TriangleList => vk::PrimitiveTopology::TRIANGLE_LIST,
            PrimitiveTopology::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
            PrimitiveTopology::LineListWithAdjacency => vk::PrimitiveTopology::LINE_LIST_WITH_ADJACENCY,
            PrimitiveTopology::LineStripWithAdjacency => vk::PrimitiveTopology::LINE_STRIP_WITH_ADJACENCY,
            PrimitiveTopology::TriangleListWithAdjacency => {
                vk::PrimitiveTopology::TRIANGLE_LIST_WITH_ADJACENCY
            }
            PrimitiveTopology::TriangleStripWithAdjacency => {
                vk::PrimitiveTopology::TRIANGLE_STRIP_WITH_ADJACENCY
            }
            PrimitiveTopology::PatchList => vk::PrimitiveTopology::PATCH_LIST,
        }
    }
}

impl From<VertexFormat> for vk::Format {
    fn from(format: VertexFormat) -> Self {
        match format {
            VertexFormat::Float => vk::Format::R32_SFLOAT,
            VertexFormat::Float2 => vk::Format::R32G32_SFLOAT,
            VertexFormat::Float3 => vk::Format::R32G32B32_SFLOAT,
            VertexFormat::Float4 => vk::Format::R32G32B32A32_SFLOAT,
            VertexFormat::Byte4 => vk::Format::R8G8B8A8_SINT,
            VertexFormat::Byte4N => vk::Format::R8G8B8A8_SNORM,
            VertexFormat::UByte4 => vk::Format::R8G8B8A8_UINT,
            VertexFormat::UByte4N => vk::Format::R8G8B8A8_UNORM,
            VertexFormat::Short2 => vk::Format::R16G16_SINT,
            VertexFormat::Short2N => vk::Format::R16G16_SNORM,
            VertexFormat::Short4 => vk::Format::R16G16B16A16_SINT,
            VertexFormat::Short4N => vk::Format::R16G16B16A16_SNORM,
            VertexFormat::UInt => vk::Format::R32_UINT,
            VertexFormat::UInt2 => vk::Format::R32G32_UINT,
            VertexFormat::UInt4 => vk::Format::R32G32B32A32_UINT,
        }
    }
}

impl From<VertexInputRate> for vk::VertexInputRate {
    fn from(rate: VertexInputRate) -> Self {
        match rate {
            VertexInputRate::Vertex => vk::VertexInputRate::VERTEX,
            VertexInputRate::Instance => vk::VertexInputRate::INSTANCE,
        }
    }
}

impl From<IndexType> for vk::IndexType {
    fn from(ty: IndexType) -> Self {
        match ty {
            IndexType::UInt16 => vk::IndexType::UINT16,
            IndexType::UInt32 => vk::IndexType::UINT32,
        }
    }
}

impl From<&Viewport> for vk::Viewport {
    fn from(vp: &Viewport) -> Self {
        vk::Viewport {
            x: vp.x,
            y: vp.y,
            width: vp.width,
            height: vp.height,
            min_depth: vp.min_depth,
            max_depth: vp.max_depth,
        }
    }
}

impl From<&Rect> for vk::Rect2D {
    fn from(rect: &Rect) -> Self {
        vk::Rect2D {
            offset: vk::Offset2D { x: rect.x, y: rect.y },
            extent: vk::Extent2D {
                width: rect.width,
                height: rect.height,
            },
        }
    }
}

impl From<ShaderStage> for vk::ShaderStageFlags {
    fn from(stage: ShaderStage) -> Self {
        match stage {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
            ShaderStage::Compute => vk::ShaderStageFlags::COMPUTE,
        }
    }
}
