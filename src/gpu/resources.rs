//! Records the device keeps for every live resource. The public handle
//! types are `Handle<Buffer>`, `Handle<Texture>` and so on; the records
//! themselves are only reachable through the device.

use smallvec::SmallVec;

use super::format::PixelFormat;
use super::structs::*;
use super::view_cache::{ViewCache, ViewDimension, ViewKey, ViewKind};
use crate::utils::Handle;

pub struct Buffer {
    pub(crate) desc: BufferDescriptor,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum TextureOwner {
    User,
    /// Back buffer or depth buffer wrapped by the swap chain.
    SwapChain,
}

pub struct Texture {
    pub(crate) desc: TextureDescriptor,
    pub(crate) views: ViewCache,
    pub(crate) owner: TextureOwner,
}

pub struct TextureView {
    pub(crate) texture: Handle<Texture>,
    pub(crate) kind: ViewKind,
    pub(crate) key: ViewKey,
    pub(crate) dimension: ViewDimension,
}

#[cfg(test)]
impl TextureView {
    pub(crate) fn placeholder() -> Self {
        Self {
            texture: Handle::null(),
            kind: ViewKind::ShaderResource,
            key: ViewKey {
                base_mip: 0,
                mip_count: 1,
                base_layer: 0,
                layer_count: 1,
            },
            dimension: ViewDimension::Texture2D,
        }
    }
}

/// Public summary of a cached view.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextureViewInfo {
    pub texture: Handle<Texture>,
    pub kind: ViewKind,
    pub key: ViewKey,
    pub dimension: ViewDimension,
}

impl From<&TextureView> for TextureViewInfo {
    fn from(v: &TextureView) -> Self {
        Self {
            texture: v.texture,
            kind: v.kind,
            key: v.key,
            dimension: v.dimension,
        }
    }
}

pub struct Sampler {
    pub(crate) desc: SamplerDescriptor,
    pub(crate) device_owned: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct AttachmentTarget {
    pub(crate) texture: Handle<Texture>,
    pub(crate) view: Handle<TextureView>,
    pub(crate) format: PixelFormat,
}

#[derive(Clone, Debug)]
pub struct Framebuffer {
    pub(crate) colors: SmallVec<[AttachmentTarget; MAX_COLOR_ATTACHMENTS]>,
    pub(crate) depth_stencil: Option<AttachmentTarget>,
    pub(crate) width: u32,
    pub(crate) height: u32,
}

pub struct Shader {
    pub(crate) stage: ShaderStage,
}

#[derive(Clone, Debug)]
pub struct RenderPipeline {
    pub(crate) vertex_shader: Handle<Shader>,
    pub(crate) fragment_shader: Option<Handle<Shader>>,
    pub(crate) attributes: SmallVec<[VertexAttribute; MAX_VERTEX_ATTRIBUTES]>,
    pub(crate) topology: PrimitiveTopology,
    pub(crate) patch_control_points: u32,
    pub(crate) rasterizer: Handle<RasterizerState>,
    pub(crate) depth_stencil: Handle<DepthStencilState>,
    pub(crate) blend: Handle<BlendState>,
}

pub struct ComputePipeline {
    pub(crate) shader: Handle<Shader>,
}

pub struct RasterizerState {
    pub(crate) desc: RasterizerStateDescriptor,
}

pub struct DepthStencilState {
    pub(crate) desc: DepthStencilStateDescriptor,
}

pub struct BlendState {
    pub(crate) desc: BlendStateDescriptor,
}

/// Native vertex-input object built at flush time from a pipeline's
/// attributes and the bound per-slot strides.
pub struct InputLayout {
    pub(crate) desc: InputLayoutDesc,
}

/// One resolved attribute of an input layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct InputElement {
    pub format: VertexFormat,
    pub shader_location: u32,
    pub buffer_slot: u32,
    pub offset: u32,
    pub input_rate: VertexInputRate,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct InputSlot {
    pub stride: u32,
    pub input_rate: VertexInputRate,
}

/// Full description of an input layout; doubles as its cache key.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct InputLayoutDesc {
    pub vertex_shader: Handle<Shader>,
    pub elements: SmallVec<[InputElement; MAX_VERTEX_ATTRIBUTES]>,
    pub slots: [InputSlot; MAX_VERTEX_BUFFER_BINDINGS],
}

/// Kind of resource a native call was made for; used for fault injection
/// and error messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Buffer,
    Texture,
    TextureView,
    Sampler,
    Shader,
    RasterizerState,
    DepthStencilState,
    BlendState,
    InputLayout,
    RenderPipeline,
    ComputePipeline,
    SwapChain,
}
