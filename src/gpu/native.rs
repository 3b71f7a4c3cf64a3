//! The native layer: one enum variant per compiled-in backend.
//!
//! The variant is picked once when the device is created. Command contexts
//! hold the matching [`NativeCommands`] variant directly, so recording never
//! goes through a trait object.

use super::backend::Backend;
use super::driver::state::{IndexBufferBinding, VertexBufferBinding};
use super::driver::types::ClearFlags;
use super::empty::{EmptyCommands, EmptyDevice};
use super::error::{GPUError, Result};
use super::format::PixelFormat;
use super::resources::*;
use super::structs::*;
use super::view_cache::NativeViewDesc;
#[cfg(feature = "dashi-vulkan")]
use super::vulkan::{VulkanCommands, VulkanDevice};
use crate::utils::Handle;

/// Result of a present that did not fail outright.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentStatus {
    Presented,
    /// The surface changed under the chain; it must be resized.
    OutOfDate,
    DeviceLost(DeviceLostReason),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResizeOutcome {
    Resized,
    /// The native chain could not be resized in place and must be rebuilt.
    ChainLost,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwapChainInfo {
    pub image_count: u32,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

/// Everything a backend needs to build a graphics pipeline, with state
/// handles already resolved to their descriptors.
#[derive(Clone, Debug)]
pub struct RenderPipelineInfo<'a> {
    pub vertex_shader: Handle<Shader>,
    pub fragment_shader: Option<Handle<Shader>>,
    pub attributes: &'a [VertexAttribute],
    pub topology: PrimitiveTopology,
    pub patch_control_points: u32,
    pub rasterizer: &'a RasterizerStateDescriptor,
    pub depth_stencil: &'a DepthStencilStateDescriptor,
    pub blend: &'a BlendStateDescriptor,
    pub color_formats: &'a [PixelFormat],
    pub depth_stencil_format: Option<PixelFormat>,
    pub sample_count: SampleCount,
}

pub enum NativeDevice {
    Empty(EmptyDevice),
    #[cfg(feature = "dashi-vulkan")]
    Vulkan(VulkanDevice),
}

pub enum NativeCommands {
    Empty(EmptyCommands),
    #[cfg(feature = "dashi-vulkan")]
    Vulkan(VulkanCommands),
}

macro_rules! dispatch {
    ($kind:ident, $value:expr, $inner:ident => $body:expr) => {
        match $value {
            $kind::Empty($inner) => $body,
            #[cfg(feature = "dashi-vulkan")]
            $kind::Vulkan($inner) => $body,
        }
    };
}

impl NativeDevice {
    pub(crate) fn create(backend: Backend, desc: &DeviceDescriptor) -> Result<Self> {
        match backend {
            Backend::Empty => Ok(NativeDevice::Empty(EmptyDevice::new())),
            #[cfg(feature = "dashi-vulkan")]
            Backend::Vulkan => Ok(NativeDevice::Vulkan(VulkanDevice::new(desc)?)),
            other => {
                let _ = desc;
                Err(GPUError::BackendUnsupported(other))
            }
        }
    }

    /// Builds a fresh device of the same backend to replace this lost one.
    pub(crate) fn recreate(&self, desc: &DeviceDescriptor) -> Result<Self> {
        match self {
            NativeDevice::Empty(d) => {
                let _ = desc;
                Ok(NativeDevice::Empty(d.recreate()?))
            }
            #[cfg(feature = "dashi-vulkan")]
            NativeDevice::Vulkan(_) => Ok(NativeDevice::Vulkan(VulkanDevice::new(desc)?)),
        }
    }

    pub fn limits(&self) -> DeviceLimits {
        dispatch!(NativeDevice, self, d => d.limits())
    }

    pub fn features(&self) -> DeviceFeatures {
        dispatch!(NativeDevice, self, d => d.features())
    }

    pub fn create_buffer(
        &self,
        buffer: Handle<Buffer>,
        desc: &BufferDescriptor,
        initial_data: Option<&[u8]>,
    ) -> Result<()> {
        dispatch!(NativeDevice, self, d => d.create_buffer(buffer, desc, initial_data))
    }

    pub fn destroy_buffer(&self, buffer: Handle<Buffer>) {
        dispatch!(NativeDevice, self, d => d.destroy_buffer(buffer))
    }

    pub fn create_texture(
        &self,
        texture: Handle<Texture>,
        desc: &TextureDescriptor,
        initial_data: Option<&[u8]>,
    ) -> Result<()> {
        dispatch!(NativeDevice, self, d => d.create_texture(texture, desc, initial_data))
    }

    pub fn destroy_texture(&self, texture: Handle<Texture>) {
        dispatch!(NativeDevice, self, d => d.destroy_texture(texture))
    }

    pub fn create_texture_view(
        &self,
        view: Handle<TextureView>,
        texture: Handle<Texture>,
        desc: &NativeViewDesc,
    ) -> Result<()> {
        dispatch!(NativeDevice, self, d => d.create_texture_view(view, texture, desc))
    }

    pub fn destroy_texture_view(&self, view: Handle<TextureView>) {
        dispatch!(NativeDevice, self, d => d.destroy_texture_view(view))
    }

    pub fn create_sampler(&self, sampler: Handle<Sampler>, desc: &SamplerDescriptor) -> Result<()> {
        dispatch!(NativeDevice, self, d => d.create_sampler(sampler, desc))
    }

    pub fn destroy_sampler(&self, sampler: Handle<Sampler>) {
        dispatch!(NativeDevice, self, d => d.destroy_sampler(sampler))
    }

    pub fn create_shader(&self, shader: Handle<Shader>, desc: &ShaderDescriptor) -> Result<()> {
        dispatch!(NativeDevice, self, d => d.create_shader(shader, desc))
    }

    pub fn destroy_shader(&self, shader: Handle<Shader>) {
        dispatch!(NativeDevice, self, d => d.destroy_shader(shader))
    }

    pub fn create_rasterizer_state(
        &self,
        state: Handle<RasterizerState>,
        desc: &RasterizerStateDescriptor,
    ) -> Result<()> {
        dispatch!(NativeDevice, self, d => d.create_rasterizer_state(state, desc))
    }

    pub fn destroy_rasterizer_state(&self, state: Handle<RasterizerState>) {
        dispatch!(NativeDevice, self, d => d.destroy_rasterizer_state(state))
    }

    pub fn create_depth_stencil_state(
        &self,
        state: Handle<DepthStencilState>,
        desc: &DepthStencilStateDescriptor,
    ) -> Result<()> {
        dispatch!(NativeDevice, self, d => d.create_depth_stencil_state(state, desc))
    }

    pub fn destroy_depth_stencil_state(&self, state: Handle<DepthStencilState>) {
        dispatch!(NativeDevice, self, d => d.destroy_depth_stencil_state(state))
    }

    pub fn create_blend_state(&self, state: Handle<BlendState>, desc: &BlendStateDescriptor) -> Result<()> {
        dispatch!(NativeDevice, self, d => d.create_blend_state(state, desc))
    }

    pub fn destroy_blend_state(&self, state: Handle<BlendState>) {
        dispatch!(NativeDevice, self, d => d.destroy_blend_state(state))
    }

    pub fn create_input_layout(&self, layout: Handle<InputLayout>, desc: &InputLayoutDesc) -> Result<()> {
        dispatch!(NativeDevice, self, d => d.create_input_layout(layout, desc))
    }

    pub fn destroy_input_layout(&self, layout: Handle<InputLayout>) {
        dispatch!(NativeDevice, self, d => d.destroy_input_layout(layout))
    }

    pub fn create_render_pipeline(
        &self,
        pipeline: Handle<RenderPipeline>,
        info: &RenderPipelineInfo<'_>,
    ) -> Result<()> {
        dispatch!(NativeDevice, self, d => d.create_render_pipeline(pipeline, info))
    }

    pub fn destroy_render_pipeline(&self, pipeline: Handle<RenderPipeline>) {
        dispatch!(NativeDevice, self, d => d.destroy_render_pipeline(pipeline))
    }

    pub fn create_compute_pipeline(
        &self,
        pipeline: Handle<ComputePipeline>,
        shader: Handle<Shader>,
    ) -> Result<()> {
        dispatch!(NativeDevice, self, d => d.create_compute_pipeline(pipeline, shader))
    }

    pub fn destroy_compute_pipeline(&self, pipeline: Handle<ComputePipeline>) {
        dispatch!(NativeDevice, self, d => d.destroy_compute_pipeline(pipeline))
    }

    pub fn create_swap_chain(&self, desc: &SwapChainDescriptor, image_count: u32) -> Result<SwapChainInfo> {
        dispatch!(NativeDevice, self, d => d.create_swap_chain(desc, image_count))
    }

    pub fn resize_swap_chain(&self, width: u32, height: u32) -> Result<ResizeOutcome> {
        dispatch!(NativeDevice, self, d => d.resize_swap_chain(width, height))
    }

    /// Replaces a lost chain. The old native chain is released only once
    /// the new one exists; on failure it is left as it was.
    pub fn recreate_swap_chain(&self, desc: &SwapChainDescriptor, image_count: u32) -> Result<SwapChainInfo> {
        dispatch!(NativeDevice, self, d => d.recreate_swap_chain(desc, image_count))
    }

    pub fn destroy_swap_chain(&self) {
        dispatch!(NativeDevice, self, d => d.destroy_swap_chain())
    }

    pub fn swap_chain_info(&self) -> Option<SwapChainInfo> {
        dispatch!(NativeDevice, self, d => d.swap_chain_info())
    }

    /// Associates `texture` with native image `index` of the chain.
    pub fn wrap_back_buffer(&self, texture: Handle<Texture>, index: u32) -> Result<()> {
        dispatch!(NativeDevice, self, d => d.wrap_back_buffer(texture, index))
    }

    pub fn release_back_buffer(&self, texture: Handle<Texture>) {
        dispatch!(NativeDevice, self, d => d.release_back_buffer(texture))
    }

    pub fn acquire_next_image(&self) -> Result<u32> {
        dispatch!(NativeDevice, self, d => d.acquire_next_image())
    }

    pub fn present(&self, image: u32) -> Result<PresentStatus> {
        dispatch!(NativeDevice, self, d => d.present(image))
    }

    pub fn create_commands(&self) -> Result<NativeCommands> {
        match self {
            NativeDevice::Empty(d) => Ok(NativeCommands::Empty(d.create_commands())),
            #[cfg(feature = "dashi-vulkan")]
            NativeDevice::Vulkan(d) => Ok(NativeCommands::Vulkan(d.create_commands()?)),
        }
    }

    pub fn wait_idle(&self) -> Result<()> {
        dispatch!(NativeDevice, self, d => d.wait_idle())
    }

    pub fn shutdown(&self) {
        dispatch!(NativeDevice, self, d => d.shutdown())
    }
}

impl NativeCommands {
    pub fn set_render_targets(
        &mut self,
        colors: &[Handle<TextureView>],
        depth_stencil: Option<Handle<TextureView>>,
        width: u32,
        height: u32,
    ) -> Result<()> {
        dispatch!(NativeCommands, self, c => c.set_render_targets(colors, depth_stencil, width, height))
    }

    pub fn clear_render_target(&mut self, index: u32, view: Handle<TextureView>, color: Color) -> Result<()> {
        dispatch!(NativeCommands, self, c => c.clear_render_target(index, view, color))
    }

    pub fn clear_depth_stencil(
        &mut self,
        view: Handle<TextureView>,
        flags: ClearFlags,
        depth: f32,
        stencil: u8,
    ) -> Result<()> {
        dispatch!(NativeCommands, self, c => c.clear_depth_stencil(view, flags, depth, stencil))
    }

    pub fn set_viewports(&mut self, viewports: &[Viewport]) -> Result<()> {
        dispatch!(NativeCommands, self, c => c.set_viewports(viewports))
    }

    pub fn set_scissors(&mut self, scissors: &[Rect]) -> Result<()> {
        dispatch!(NativeCommands, self, c => c.set_scissors(scissors))
    }

    /// Binds `bindings` to consecutive slots starting at `first_slot` in one call.
    pub fn set_vertex_buffers(&mut self, first_slot: u32, bindings: &[VertexBufferBinding]) -> Result<()> {
        dispatch!(NativeCommands, self, c => c.set_vertex_buffers(first_slot, bindings))
    }

    pub fn set_index_buffer(&mut self, binding: Option<IndexBufferBinding>) -> Result<()> {
        dispatch!(NativeCommands, self, c => c.set_index_buffer(binding))
    }

    pub fn set_input_layout(&mut self, layout: Option<Handle<InputLayout>>) -> Result<()> {
        dispatch!(NativeCommands, self, c => c.set_input_layout(layout))
    }

    pub fn set_primitive_topology(&mut self, topology: PrimitiveTopology, patch_control_points: u32) -> Result<()> {
        dispatch!(NativeCommands, self, c => c.set_primitive_topology(topology, patch_control_points))
    }

    pub fn set_render_pipeline(&mut self, pipeline: Handle<RenderPipeline>) -> Result<()> {
        dispatch!(NativeCommands, self, c => c.set_render_pipeline(pipeline))
    }

    pub fn set_compute_pipeline(&mut self, pipeline: Handle<ComputePipeline>) -> Result<()> {
        dispatch!(NativeCommands, self, c => c.set_compute_pipeline(pipeline))
    }

    pub fn set_rasterizer_state(&mut self, state: Handle<RasterizerState>) -> Result<()> {
        dispatch!(NativeCommands, self, c => c.set_rasterizer_state(state))
    }

    pub fn set_depth_stencil_state(&mut self, state: Handle<DepthStencilState>) -> Result<()> {
        dispatch!(NativeCommands, self, c => c.set_depth_stencil_state(state))
    }

    pub fn set_blend_state(&mut self, state: Handle<BlendState>) -> Result<()> {
        dispatch!(NativeCommands, self, c => c.set_blend_state(state))
    }

    pub fn set_stencil_reference(&mut self, reference: u32) -> Result<()> {
        dispatch!(NativeCommands, self, c => c.set_stencil_reference(reference))
    }

    pub fn set_blend_constants(&mut self, color: [f32; 4]) -> Result<()> {
        dispatch!(NativeCommands, self, c => c.set_blend_constants(color))
    }

    pub fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) -> Result<()> {
        dispatch!(NativeCommands, self, c => c.draw(vertex_count, instance_count, first_vertex, first_instance))
    }

    pub fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        base_vertex: i32,
        first_instance: u32,
    ) -> Result<()> {
        dispatch!(NativeCommands, self, c => c.draw_indexed(index_count, instance_count, first_index, base_vertex, first_instance))
    }

    pub fn dispatch(&mut self, x: u32, y: u32, z: u32) -> Result<()> {
        dispatch!(NativeCommands, self, c => c.dispatch(x, y, z))
    }

    /// Submits everything recorded so far; `fence` retires when it completes.
    pub fn submit(&mut self, fence: u64) -> Result<()> {
        dispatch!(NativeCommands, self, c => c.submit(fence))
    }

    pub fn wait(&mut self, fence: u64) -> Result<()> {
        dispatch!(NativeCommands, self, c => c.wait(fence))
    }
}
