//! The graphics layer: devices, command contexts, resources and the native
//! backends behind them.
//!
//! ```ignore
//! use dashi_hal::*;
//!
//! let mut device = Device::create(&DeviceDescriptor::with_backend(Backend::Empty))?;
//! let vb = device.create_buffer_from(BufferUsage::VERTEX, &[0.0f32; 9])?;
//! let ctx = device.immediate_context()?;
//! ctx.set_vertex_buffer(0, Some(vb), 0, 12, VertexInputRate::Vertex);
//! ```

pub mod backend;
pub mod context;
pub mod device;
pub mod driver;
pub mod empty;
pub mod error;
pub mod format;
mod frame;
pub mod native;
mod registry;
pub mod resources;
pub mod structs;
pub mod swapchain;
mod validate;
pub mod view_cache;
#[cfg(feature = "dashi-vulkan")]
pub mod vulkan;

pub use backend::{available_backends, default_fallback_list, is_backend_supported, Backend};
pub use context::{CommandContext, ContextState};
pub use device::{Device, DeviceLostCallback};
pub use driver::state::{IndexBufferBinding, VertexBufferBinding};
pub use driver::types::*;
pub use empty::{EmptyDevice, EmptyFault, NativeCall};
pub use error::{GPUError, Result};
pub use format::PixelFormat;
pub use native::{PresentStatus, SwapChainInfo};
pub use resources::{
    BlendState, Buffer, ComputePipeline, DepthStencilState, Framebuffer, InputElement,
    InputLayout, InputLayoutDesc, InputSlot, RasterizerState, RenderPipeline, ResourceKind,
    Sampler, Shader, Texture, TextureView, TextureViewInfo,
};
pub use structs::*;
pub use swapchain::{SwapChain, SwapChainState};
pub use view_cache::{TextureViewRange, ViewDimension, ViewKey, ViewKind};
