use std::hash::{Hash, Hasher};

use bytemuck::{Pod, Zeroable};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
#[cfg(feature = "dashi-serde")]
use serde::{Deserialize, Serialize};

use super::backend::Backend;
use super::driver::types::{BufferUsage, ColorWriteMask, TextureUsage};
use super::format::PixelFormat;
use super::resources::{BlendState, DepthStencilState, RasterizerState, Shader, Texture};
use crate::utils::Handle;

pub const MAX_VERTEX_BUFFER_BINDINGS: usize = 4;
pub const MAX_VERTEX_ATTRIBUTES: usize = 16;
pub const MAX_COLOR_ATTACHMENTS: usize = 8;
pub const MAX_VIEWPORTS_AND_SCISSORS: usize = 16;
pub const MAX_INFLIGHT_FRAMES: u32 = 4;
pub const DEFAULT_INFLIGHT_FRAMES: u32 = 3;
pub const MAX_TEXTURE_ARRAY_LAYERS: u32 = 2048;

/// Sentinel for "every remaining mip level / array layer" in view ranges.
pub const REMAINING: u32 = u32::MAX;

//===----------------------------------------------------------------------===//
// Device
//===----------------------------------------------------------------------===//

#[repr(C)]
#[derive(Default, Hash, Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "dashi-serde", derive(Serialize, Deserialize))]
pub enum PowerPreference {
    #[default]
    Default,
    LowPower,
    HighPerformance,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "dashi-serde", derive(Serialize, Deserialize))]
pub struct DeviceDescriptor {
    pub backend: Backend,
    pub validation: bool,
    pub max_inflight_frames: u32,
    pub application_name: String,
    pub power_preference: PowerPreference,
}

impl Default for DeviceDescriptor {
    fn default() -> Self {
        Self {
            backend: Backend::Default,
            validation: cfg!(debug_assertions),
            max_inflight_frames: DEFAULT_INFLIGHT_FRAMES,
            application_name: "dashi".to_string(),
            power_preference: PowerPreference::Default,
        }
    }
}

impl DeviceDescriptor {
    pub fn with_backend(backend: Backend) -> Self {
        Self {
            backend,
            ..Default::default()
        }
    }

    /// Applies `DASHI_VALIDATION` and `DASHI_BACKEND` on top of `self`.
    /// Unparseable values are ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var("DASHI_VALIDATION") {
            match value.trim() {
                "1" | "true" | "on" => self.validation = true,
                "0" | "false" | "off" => self.validation = false,
                other => log::warn!("ignoring DASHI_VALIDATION={other}"),
            }
        }

        if let Ok(value) = std::env::var("DASHI_BACKEND") {
            match value.parse::<Backend>() {
                Ok(backend) => self.backend = backend,
                Err(_) => log::warn!("ignoring DASHI_BACKEND={value}"),
            }
        }

        self.max_inflight_frames = self.max_inflight_frames.clamp(1, MAX_INFLIGHT_FRAMES);
    }
}

/// Hardware limits, captured once when the device is created.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "dashi-serde", derive(Serialize, Deserialize))]
pub struct DeviceLimits {
    pub max_texture_dimension_1d: u32,
    pub max_texture_dimension_2d: u32,
    pub max_texture_dimension_3d: u32,
    pub max_texture_dimension_cube: u32,
    pub max_texture_array_layers: u32,
    pub max_color_attachments: u32,
    pub max_vertex_buffers: u32,
    pub max_vertex_attributes: u32,
    pub max_viewports: u32,
    pub max_sampler_anisotropy: u32,
    pub min_uniform_buffer_offset_alignment: u32,
    pub max_compute_workgroup_count: [u32; 3],
    pub min_swap_chain_images: u32,
    pub max_swap_chain_images: u32,
}

impl Default for DeviceLimits {
    fn default() -> Self {
        Self {
            max_texture_dimension_1d: 16384,
            max_texture_dimension_2d: 16384,
            max_texture_dimension_3d: 2048,
            max_texture_dimension_cube: 16384,
            max_texture_array_layers: MAX_TEXTURE_ARRAY_LAYERS,
            max_color_attachments: MAX_COLOR_ATTACHMENTS as u32,
            max_vertex_buffers: MAX_VERTEX_BUFFER_BINDINGS as u32,
            max_vertex_attributes: MAX_VERTEX_ATTRIBUTES as u32,
            max_viewports: MAX_VIEWPORTS_AND_SCISSORS as u32,
            max_sampler_anisotropy: 16,
            min_uniform_buffer_offset_alignment: 256,
            max_compute_workgroup_count: [65535; 3],
            min_swap_chain_images: 2,
            max_swap_chain_images: 16,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "dashi-serde", derive(Serialize, Deserialize))]
pub struct DeviceFeatures {
    pub independent_blend: bool,
    pub geometry_shader: bool,
    pub tessellation_shader: bool,
    pub multi_viewport: bool,
    pub texture_cube_array: bool,
    pub sampler_anisotropy: bool,
    pub depth_clamp: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceLostReason {
    Removed,
    Reset,
}

/// Passed to the device-lost callback after the backend has been rebuilt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviceLostInfo {
    pub reason: DeviceLostReason,
    /// Incremented by every recovery; starts at 0.
    pub epoch: u64,
}

//===----------------------------------------------------------------------===//
// Buffers
//===----------------------------------------------------------------------===//

#[repr(C)]
#[derive(Default, Hash, Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "dashi-serde", derive(Serialize, Deserialize))]
pub enum IndexType {
    #[default]
    UInt16,
    UInt32,
}

impl IndexType {
    pub fn size(self) -> u32 {
        match self {
            IndexType::UInt16 => 2,
            IndexType::UInt32 => 4,
        }
    }
}

#[derive(Default, Hash, Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "dashi-serde", derive(Serialize, Deserialize))]
pub struct BufferDescriptor {
    pub usage: BufferUsage,
    pub element_count: u64,
    /// Byte stride of one element.
    pub element_size: u32,
}

impl BufferDescriptor {
    pub fn new(usage: BufferUsage, element_count: u64, element_size: u32) -> Self {
        Self {
            usage,
            element_count,
            element_size,
        }
    }

    pub fn size(&self) -> u64 {
        self.element_count * self.element_size as u64
    }
}

//===----------------------------------------------------------------------===//
// Textures
//===----------------------------------------------------------------------===//

#[repr(C)]
#[derive(Default, Hash, Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "dashi-serde", derive(Serialize, Deserialize))]
pub enum TextureType {
    Type1D,
    #[default]
    Type2D,
    Type3D,
    TypeCube,
}

#[repr(u32)]
#[derive(Default, Hash, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "dashi-serde", derive(Serialize, Deserialize))]
pub enum SampleCount {
    #[default]
    S1 = 1,
    S2 = 2,
    S4 = 4,
    S8 = 8,
    S16 = 16,
    S32 = 32,
}

impl SampleCount {
    pub fn count(self) -> u32 {
        self as u32
    }
}

#[derive(Hash, Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "dashi-serde", derive(Serialize, Deserialize))]
pub struct TextureDescriptor {
    pub texture_type: TextureType,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    /// 0 requests the full chain down to 1x1.
    pub mip_levels: u32,
    /// Number of layers; for cube textures, the number of cubes.
    pub array_layers: u32,
    pub format: PixelFormat,
    pub usage: TextureUsage,
    pub sample_count: SampleCount,
}

impl Default for TextureDescriptor {
    fn default() -> Self {
        Self {
            texture_type: TextureType::Type2D,
            width: 1,
            height: 1,
            depth: 1,
            mip_levels: 1,
            array_layers: 1,
            format: PixelFormat::RGBA8Unorm,
            usage: TextureUsage::SAMPLED,
            sample_count: SampleCount::S1,
        }
    }
}

impl TextureDescriptor {
    pub fn texture_2d(
        width: u32,
        height: u32,
        mip_levels: u32,
        array_layers: u32,
        format: PixelFormat,
        usage: TextureUsage,
    ) -> Self {
        Self {
            texture_type: TextureType::Type2D,
            width,
            height,
            mip_levels,
            array_layers,
            format,
            usage,
            ..Default::default()
        }
    }

    pub fn texture_cube(
        size: u32,
        mip_levels: u32,
        array_layers: u32,
        format: PixelFormat,
        usage: TextureUsage,
    ) -> Self {
        Self {
            texture_type: TextureType::TypeCube,
            width: size,
            height: size,
            mip_levels,
            array_layers,
            format,
            usage,
            ..Default::default()
        }
    }

    pub fn texture_3d(
        width: u32,
        height: u32,
        depth: u32,
        mip_levels: u32,
        format: PixelFormat,
        usage: TextureUsage,
    ) -> Self {
        Self {
            texture_type: TextureType::Type3D,
            width,
            height,
            depth,
            mip_levels,
            format,
            usage,
            ..Default::default()
        }
    }

    /// Single-mip attachment, sampled as well so it can be read back in a
    /// later pass.
    pub fn render_target(
        width: u32,
        height: u32,
        format: PixelFormat,
        sample_count: SampleCount,
    ) -> Self {
        Self {
            texture_type: TextureType::Type2D,
            width,
            height,
            format,
            usage: TextureUsage::RENDER_TARGET | TextureUsage::SAMPLED,
            sample_count,
            ..Default::default()
        }
    }

    /// Number of levels in a full mip chain for this size.
    pub fn full_mip_count(&self) -> u32 {
        let largest = self.width.max(self.height).max(match self.texture_type {
            TextureType::Type3D => self.depth,
            _ => 1,
        });
        32 - largest.max(1).leading_zeros()
    }

    /// Layers the native image is created with; cube textures carry six per cube.
    pub fn native_layers(&self) -> u32 {
        match self.texture_type {
            TextureType::TypeCube => self.array_layers * 6,
            _ => self.array_layers,
        }
    }

    pub fn mip_width(&self, level: u32) -> u32 {
        (self.width >> level).max(1)
    }

    pub fn mip_height(&self, level: u32) -> u32 {
        (self.height >> level).max(1)
    }

    pub fn mip_depth(&self, level: u32) -> u32 {
        (self.depth >> level).max(1)
    }
}

//===----------------------------------------------------------------------===//
// Samplers
//===----------------------------------------------------------------------===//

#[repr(C)]
#[derive(Default, Hash, Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "dashi-serde", derive(Serialize, Deserialize))]
pub enum FilterMode {
    #[default]
    Nearest,
    Linear,
}

#[repr(C)]
#[derive(Default, Hash, Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "dashi-serde", derive(Serialize, Deserialize))]
pub enum AddressMode {
    #[default]
    Repeat,
    MirrorRepeat,
    ClampToEdge,
    ClampToBorder,
    MirrorClampToEdge,
}

#[repr(C)]
#[derive(Default, Hash, Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "dashi-serde", derive(Serialize, Deserialize))]
pub enum BorderColor {
    #[default]
    TransparentBlack,
    OpaqueBlack,
    OpaqueWhite,
}

#[repr(C)]
#[derive(Default, Hash, Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "dashi-serde", derive(Serialize, Deserialize))]
pub enum CompareFunction {
    #[default]
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "dashi-serde", derive(Serialize, Deserialize))]
pub struct SamplerDescriptor {
    pub min_filter: FilterMode,
    pub mag_filter: FilterMode,
    pub mip_filter: FilterMode,
    pub address_mode_u: AddressMode,
    pub address_mode_v: AddressMode,
    pub address_mode_w: AddressMode,
    pub compare_function: CompareFunction,
    pub max_anisotropy: u32,
    pub lod_min_clamp: f32,
    pub lod_max_clamp: f32,
    pub border_color: BorderColor,
}

impl Default for SamplerDescriptor {
    fn default() -> Self {
        Self {
            min_filter: FilterMode::Nearest,
            mag_filter: FilterMode::Nearest,
            mip_filter: FilterMode::Nearest,
            address_mode_u: AddressMode::Repeat,
            address_mode_v: AddressMode::Repeat,
            address_mode_w: AddressMode::Repeat,
            compare_function: CompareFunction::Never,
            max_anisotropy: 1,
            lod_min_clamp: 0.0,
            lod_max_clamp: f32::MAX,
            border_color: BorderColor::TransparentBlack,
        }
    }
}

impl SamplerDescriptor {
    pub fn point_clamp() -> Self {
        Self {
            address_mode_u: AddressMode::ClampToEdge,
            address_mode_v: AddressMode::ClampToEdge,
            address_mode_w: AddressMode::ClampToEdge,
            ..Default::default()
        }
    }

    pub fn linear_clamp() -> Self {
        Self {
            min_filter: FilterMode::Linear,
            mag_filter: FilterMode::Linear,
            mip_filter: FilterMode::Linear,
            ..Self::point_clamp()
        }
    }
}

//===----------------------------------------------------------------------===//
// Framebuffers and render passes
//===----------------------------------------------------------------------===//

#[derive(Default, Hash, Clone, Copy, Debug, PartialEq, Eq)]
pub struct FramebufferAttachment {
    pub texture: Handle<Texture>,
    /// Mip level rendered to.
    pub level: u32,
    /// Array layer (cube index for cube textures, depth slice for 3D).
    pub slice: u32,
}

impl FramebufferAttachment {
    pub fn new(texture: Handle<Texture>) -> Self {
        Self {
            texture,
            level: 0,
            slice: 0,
        }
    }
}

#[derive(Default, Clone, Debug, PartialEq, Eq)]
pub struct FramebufferDescriptor {
    pub color_attachments: Vec<FramebufferAttachment>,
    pub depth_stencil_attachment: Option<FramebufferAttachment>,
}

#[repr(C)]
#[derive(Default, Hash, Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "dashi-serde", derive(Serialize, Deserialize))]
pub enum LoadAction {
    DontCare,
    Load,
    #[default]
    Clear,
}

#[repr(C)]
#[derive(Default, Hash, Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "dashi-serde", derive(Serialize, Deserialize))]
pub enum StoreAction {
    DontCare,
    #[default]
    Store,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
#[cfg_attr(feature = "dashi-serde", derive(Serialize, Deserialize))]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub const BLACK: Color = Color::new(0.0, 0.0, 0.0, 1.0);
    pub const TRANSPARENT: Color = Color::new(0.0, 0.0, 0.0, 0.0);

    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::BLACK
    }
}

#[derive(Default, Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "dashi-serde", derive(Serialize, Deserialize))]
pub struct ColorAttachmentAction {
    pub load_action: LoadAction,
    pub store_action: StoreAction,
    pub clear_color: Color,
}

#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "dashi-serde", derive(Serialize, Deserialize))]
pub struct DepthStencilAttachmentAction {
    pub depth_load_action: LoadAction,
    pub depth_store_action: StoreAction,
    pub stencil_load_action: LoadAction,
    pub stencil_store_action: StoreAction,
    pub clear_depth: f32,
    pub clear_stencil: u8,
}

impl Default for DepthStencilAttachmentAction {
    fn default() -> Self {
        Self {
            depth_load_action: LoadAction::Clear,
            depth_store_action: StoreAction::Store,
            stencil_load_action: LoadAction::DontCare,
            stencil_store_action: StoreAction::DontCare,
            clear_depth: 1.0,
            clear_stencil: 0,
        }
    }
}

#[derive(Default, Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "dashi-serde", derive(Serialize, Deserialize))]
pub struct RenderPassBeginDescriptor {
    pub colors: [ColorAttachmentAction; MAX_COLOR_ATTACHMENTS],
    pub depth_stencil: DepthStencilAttachmentAction,
    /// Requested render area; 0 uses the framebuffer's size.
    pub render_target_width: u32,
    pub render_target_height: u32,
}

#[repr(C)]
#[derive(Default, Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
#[cfg_attr(feature = "dashi-serde", derive(Serialize, Deserialize))]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    pub fn from_size(width: u32, height: u32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: width as f32,
            height: height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

#[repr(C)]
#[derive(Default, Hash, Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
#[cfg_attr(feature = "dashi-serde", derive(Serialize, Deserialize))]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn from_size(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }
}

//===----------------------------------------------------------------------===//
// Vertex input
//===----------------------------------------------------------------------===//

#[repr(C)]
#[derive(Default, Hash, Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "dashi-serde", derive(Serialize, Deserialize))]
pub enum PrimitiveTopology {
    PointList,
    LineList,
    LineStrip,
    #[default]
    TriangleList,
    TriangleStrip,
    LineListWithAdjacency,
    LineStripWithAdjacency,
    TriangleListWithAdjacency,
    TriangleStripWithAdjacency,
    PatchList,
}

#[repr(C)]
#[derive(Default, Hash, Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "dashi-serde", derive(Serialize, Deserialize))]
pub enum VertexInputRate {
    #[default]
    Vertex,
    Instance,
}

#[repr(C)]
#[derive(Default, Hash, Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "dashi-serde", derive(Serialize, Deserialize))]
pub enum VertexFormat {
    #[default]
    Float,
    Float2,
    Float3,
    Float4,
    Byte4,
    Byte4N,
    UByte4,
    UByte4N,
    Short2,
    Short2N,
    Short4,
    Short4N,
    UInt,
    UInt2,
    UInt4,
}

impl VertexFormat {
    pub fn size(self) -> u32 {
        match self {
            VertexFormat::Float | VertexFormat::UInt => 4,
            VertexFormat::Float2 | VertexFormat::UInt2 => 8,
            VertexFormat::Float3 => 12,
            VertexFormat::Float4 | VertexFormat::UInt4 => 16,
            VertexFormat::Byte4
            | VertexFormat::Byte4N
            | VertexFormat::UByte4
            | VertexFormat::UByte4N
            | VertexFormat::Short2
            | VertexFormat::Short2N => 4,
            VertexFormat::Short4 | VertexFormat::Short4N => 8,
        }
    }
}

/// One attribute read by the vertex shader.
#[derive(Default, Hash, Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "dashi-serde", derive(Serialize, Deserialize))]
pub struct VertexAttribute {
    pub format: VertexFormat,
    pub buffer_slot: u32,
    /// Byte offset inside the vertex. When every attribute of a pipeline
    /// leaves this at 0, offsets are packed in declaration order.
    pub offset: u32,
    pub shader_location: u32,
}

//===----------------------------------------------------------------------===//
// Shaders and pipeline state
//===----------------------------------------------------------------------===//

#[repr(C)]
#[derive(Default, Hash, Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "dashi-serde", derive(Serialize, Deserialize))]
pub enum ShaderStage {
    #[default]
    Vertex,
    Fragment,
    Compute,
}

/// Opaque shader blob tagged with its stage.
#[derive(Default, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "dashi-serde", derive(Serialize, Deserialize))]
pub struct ShaderDescriptor {
    pub stage: ShaderStage,
    pub code: Vec<u8>,
    pub entry_point: String,
}

impl ShaderDescriptor {
    pub fn new(stage: ShaderStage, code: Vec<u8>) -> Self {
        Self {
            stage,
            code,
            entry_point: "main".to_string(),
        }
    }
}

#[repr(C)]
#[derive(Default, Hash, Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "dashi-serde", derive(Serialize, Deserialize))]
pub enum CullMode {
    None,
    Front,
    #[default]
    Back,
}

#[repr(C)]
#[derive(Default, Hash, Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "dashi-serde", derive(Serialize, Deserialize))]
pub enum FrontFace {
    #[default]
    CounterClockwise,
    Clockwise,
}

#[repr(C)]
#[derive(Default, Hash, Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "dashi-serde", derive(Serialize, Deserialize))]
pub enum FillMode {
    #[default]
    Solid,
    Wireframe,
}

#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "dashi-serde", derive(Serialize, Deserialize))]
pub struct RasterizerStateDescriptor {
    pub fill_mode: FillMode,
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
    pub depth_bias: i32,
    pub depth_bias_slope_scale: f32,
    pub depth_bias_clamp: f32,
    pub depth_clip_enable: bool,
}

impl Default for RasterizerStateDescriptor {
    fn default() -> Self {
        Self {
            fill_mode: FillMode::Solid,
            cull_mode: CullMode::Back,
            front_face: FrontFace::CounterClockwise,
            depth_bias: 0,
            depth_bias_slope_scale: 0.0,
            depth_bias_clamp: 0.0,
            depth_clip_enable: true,
        }
    }
}

impl RasterizerStateDescriptor {
    fn key(&self) -> (FillMode, CullMode, FrontFace, i32, u32, u32, bool) {
        (
            self.fill_mode,
            self.cull_mode,
            self.front_face,
            self.depth_bias,
            self.depth_bias_slope_scale.to_bits(),
            self.depth_bias_clamp.to_bits(),
            self.depth_clip_enable,
        )
    }
}

// Bitwise float comparison so the descriptor can key the state cache.
impl PartialEq for RasterizerStateDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for RasterizerStateDescriptor {}

impl Hash for RasterizerStateDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

#[repr(C)]
#[derive(Default, Hash, Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "dashi-serde", derive(Serialize, Deserialize))]
pub enum StencilOperation {
    #[default]
    Keep,
    Zero,
    Replace,
    IncrementClamp,
    DecrementClamp,
    Invert,
    IncrementWrap,
    DecrementWrap,
}

#[derive(Hash, Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "dashi-serde", derive(Serialize, Deserialize))]
pub struct StencilFaceState {
    pub compare: CompareFunction,
    pub fail_op: StencilOperation,
    pub depth_fail_op: StencilOperation,
    pub pass_op: StencilOperation,
}

impl Default for StencilFaceState {
    fn default() -> Self {
        Self {
            compare: CompareFunction::Always,
            fail_op: StencilOperation::Keep,
            depth_fail_op: StencilOperation::Keep,
            pass_op: StencilOperation::Keep,
        }
    }
}

#[derive(Hash, Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "dashi-serde", derive(Serialize, Deserialize))]
pub struct DepthStencilStateDescriptor {
    pub depth_test_enable: bool,
    pub depth_write_enable: bool,
    pub depth_compare: CompareFunction,
    pub stencil_enable: bool,
    pub stencil_read_mask: u8,
    pub stencil_write_mask: u8,
    pub front: StencilFaceState,
    pub back: StencilFaceState,
}

impl Default for DepthStencilStateDescriptor {
    fn default() -> Self {
        Self {
            depth_test_enable: true,
            depth_write_enable: true,
            depth_compare: CompareFunction::Less,
            stencil_enable: false,
            stencil_read_mask: 0xff,
            stencil_write_mask: 0xff,
            front: StencilFaceState::default(),
            back: StencilFaceState::default(),
        }
    }
}

#[repr(C)]
#[derive(Default, Hash, Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "dashi-serde", derive(Serialize, Deserialize))]
pub enum BlendFactor {
    Zero,
    #[default]
    One,
    SrcColor,
    OneMinusSrcColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstColor,
    OneMinusDstColor,
    DstAlpha,
    OneMinusDstAlpha,
    SrcAlphaSaturated,
    BlendColor,
    OneMinusBlendColor,
}

#[repr(C)]
#[derive(Default, Hash, Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "dashi-serde", derive(Serialize, Deserialize))]
pub enum BlendOperation {
    #[default]
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

#[derive(Hash, Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "dashi-serde", derive(Serialize, Deserialize))]
pub struct RenderTargetBlendState {
    pub blend_enable: bool,
    pub src_color: BlendFactor,
    pub dst_color: BlendFactor,
    pub color_op: BlendOperation,
    pub src_alpha: BlendFactor,
    pub dst_alpha: BlendFactor,
    pub alpha_op: BlendOperation,
    pub write_mask: ColorWriteMask,
}

impl Default for RenderTargetBlendState {
    fn default() -> Self {
        Self {
            blend_enable: false,
            src_color: BlendFactor::One,
            dst_color: BlendFactor::Zero,
            color_op: BlendOperation::Add,
            src_alpha: BlendFactor::One,
            dst_alpha: BlendFactor::Zero,
            alpha_op: BlendOperation::Add,
            write_mask: ColorWriteMask::ALL,
        }
    }
}

impl RenderTargetBlendState {
    pub fn alpha_blending() -> Self {
        Self {
            blend_enable: true,
            src_color: BlendFactor::SrcAlpha,
            dst_color: BlendFactor::OneMinusSrcAlpha,
            src_alpha: BlendFactor::One,
            dst_alpha: BlendFactor::OneMinusSrcAlpha,
            ..Default::default()
        }
    }
}

#[derive(Default, Hash, Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "dashi-serde", derive(Serialize, Deserialize))]
pub struct BlendStateDescriptor {
    pub alpha_to_coverage: bool,
    /// When false every attachment uses `render_targets[0]`.
    pub independent_blend: bool,
    pub render_targets: [RenderTargetBlendState; MAX_COLOR_ATTACHMENTS],
}

/// Graphics pipeline: shaders, vertex layout and fixed-function state.
/// State handles left as `None` use the device defaults.
#[derive(Default, Clone, Debug, PartialEq)]
pub struct RenderPipelineDescriptor {
    pub vertex_shader: Handle<Shader>,
    pub fragment_shader: Option<Handle<Shader>>,
    pub vertex_attributes: Vec<VertexAttribute>,
    pub primitive_topology: PrimitiveTopology,
    /// Only read for `PrimitiveTopology::PatchList`.
    pub patch_control_points: u32,
    pub rasterizer_state: Option<Handle<RasterizerState>>,
    pub depth_stencil_state: Option<Handle<DepthStencilState>>,
    pub blend_state: Option<Handle<BlendState>>,
    pub color_formats: Vec<PixelFormat>,
    pub depth_stencil_format: Option<PixelFormat>,
    pub sample_count: SampleCount,
}

#[derive(Default, Clone, Debug, PartialEq)]
pub struct ComputePipelineDescriptor {
    pub shader: Handle<Shader>,
}

//===----------------------------------------------------------------------===//
// Swap chain
//===----------------------------------------------------------------------===//

/// Where presented images go. Window handles come from the caller's
/// windowing layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SurfaceSource {
    /// No window; only the `Empty` backend accepts it.
    Headless,
    Window {
        window: RawWindowHandle,
        display: RawDisplayHandle,
    },
}

// SAFETY: the handles are plain identifiers owned by the caller's window,
// which must outlive the swap chain. They are only dereferenced by the
// native surface-creation call.
unsafe impl Send for SurfaceSource {}
unsafe impl Sync for SurfaceSource {}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwapChainDescriptor {
    pub surface: SurfaceSource,
    pub width: u32,
    pub height: u32,
    /// Clamped to what the surface supports.
    pub buffer_count: u32,
    pub color_format: PixelFormat,
    pub depth_stencil_format: Option<PixelFormat>,
    pub vsync: bool,
}

impl Default for SwapChainDescriptor {
    fn default() -> Self {
        Self {
            surface: SurfaceSource::Headless,
            width: 1280,
            height: 720,
            buffer_count: 3,
            color_format: PixelFormat::BGRA8Unorm,
            depth_stencil_format: None,
            vsync: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_mip_chain() {
        let desc = TextureDescriptor::texture_2d(
            256,
            64,
            0,
            1,
            PixelFormat::RGBA8Unorm,
            TextureUsage::SAMPLED,
        );
        assert_eq!(desc.full_mip_count(), 9);
        assert_eq!(TextureDescriptor::default().full_mip_count(), 1);
        assert_eq!(
            TextureDescriptor::texture_3d(4, 4, 32, 0, PixelFormat::R8Unorm, TextureUsage::SAMPLED)
                .full_mip_count(),
            6
        );
    }

    #[test]
    fn cube_layers_are_multiplied() {
        let cube =
            TextureDescriptor::texture_cube(64, 1, 2, PixelFormat::RGBA8Unorm, TextureUsage::SAMPLED);
        assert_eq!(cube.native_layers(), 12);
    }

    #[test]
    fn sampler_defaults() {
        let s = SamplerDescriptor::default();
        assert_eq!(s.address_mode_u, AddressMode::Repeat);
        assert_eq!(s.min_filter, FilterMode::Nearest);
        assert_eq!(s.max_anisotropy, 1);
        assert_eq!(s.lod_max_clamp, f32::MAX);
        assert_eq!(s.compare_function, CompareFunction::Never);
    }

    #[test]
    fn rasterizer_descriptor_hashes_floats_bitwise() {
        use std::collections::HashSet;
        let a = RasterizerStateDescriptor::default();
        let mut b = a;
        b.depth_bias_slope_scale = 1.5;
        let set: HashSet<_> = [a, a, b].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn vertex_format_sizes() {
        assert_eq!(VertexFormat::Float3.size(), 12);
        assert_eq!(VertexFormat::UByte4N.size(), 4);
        assert_eq!(VertexFormat::Short4N.size(), 8);
    }
}
