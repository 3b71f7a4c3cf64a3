//! A backend with no GPU behind it.
//!
//! Every native call is appended to an ordered log instead of reaching a
//! driver, and failures can be queued up front with [`EmptyDevice::inject`].
//! Submitted work retires immediately.

use std::sync::Arc;

use parking_lot::Mutex;

use super::driver::state::{IndexBufferBinding, VertexBufferBinding};
use super::driver::types::ClearFlags;
use super::error::{GPUError, Result};
use super::native::{PresentStatus, RenderPipelineInfo, ResizeOutcome, SwapChainInfo};
use super::resources::*;
use super::structs::*;
use super::view_cache::NativeViewDesc;
use crate::utils::Handle;

/// One recorded native call.
#[derive(Clone, Debug, PartialEq)]
pub enum NativeCall {
    CreateBuffer {
        buffer: Handle<Buffer>,
        size: u64,
        initial_data: Option<Vec<u8>>,
    },
    DestroyBuffer(Handle<Buffer>),
    CreateTexture {
        texture: Handle<Texture>,
        desc: TextureDescriptor,
        has_initial_data: bool,
    },
    DestroyTexture(Handle<Texture>),
    CreateTextureView {
        view: Handle<TextureView>,
        texture: Handle<Texture>,
        desc: NativeViewDesc,
    },
    DestroyTextureView(Handle<TextureView>),
    CreateSampler(Handle<Sampler>),
    DestroySampler(Handle<Sampler>),
    CreateShader {
        shader: Handle<Shader>,
        stage: ShaderStage,
    },
    DestroyShader(Handle<Shader>),
    CreateRasterizerState(Handle<RasterizerState>),
    DestroyRasterizerState(Handle<RasterizerState>),
    CreateDepthStencilState(Handle<DepthStencilState>),
    DestroyDepthStencilState(Handle<DepthStencilState>),
    CreateBlendState(Handle<BlendState>),
    DestroyBlendState(Handle<BlendState>),
    CreateInputLayout {
        layout: Handle<InputLayout>,
        desc: InputLayoutDesc,
    },
    DestroyInputLayout(Handle<InputLayout>),
    CreateRenderPipeline(Handle<RenderPipeline>),
    DestroyRenderPipeline(Handle<RenderPipeline>),
    CreateComputePipeline(Handle<ComputePipeline>),
    DestroyComputePipeline(Handle<ComputePipeline>),

    CreateSwapChain {
        width: u32,
        height: u32,
        image_count: u32,
    },
    ResizeSwapChain {
        width: u32,
        height: u32,
    },
    DestroySwapChain,
    WrapBackBuffer {
        texture: Handle<Texture>,
        index: u32,
    },
    ReleaseBackBuffer(Handle<Texture>),
    AcquireNextImage(u32),
    Present(u32),
    WaitIdle,
    Shutdown,
    /// A replacement device was built from this lost one.
    Recreate,

    SetRenderTargets {
        colors: Vec<Handle<TextureView>>,
        depth_stencil: Option<Handle<TextureView>>,
        width: u32,
        height: u32,
    },
    ClearRenderTarget {
        index: u32,
        view: Handle<TextureView>,
        color: Color,
    },
    ClearDepthStencil {
        view: Handle<TextureView>,
        flags: ClearFlags,
        depth: f32,
        stencil: u8,
    },
    SetViewports(Vec<Viewport>),
    SetScissors(Vec<Rect>),
    SetVertexBuffers {
        first_slot: u32,
        bindings: Vec<VertexBufferBinding>,
    },
    SetIndexBuffer(Option<IndexBufferBinding>),
    SetInputLayout(Option<Handle<InputLayout>>),
    SetPrimitiveTopology {
        topology: PrimitiveTopology,
        patch_control_points: u32,
    },
    SetRenderPipeline(Handle<RenderPipeline>),
    SetComputePipeline(Handle<ComputePipeline>),
    SetRasterizerState(Handle<RasterizerState>),
    SetDepthStencilState(Handle<DepthStencilState>),
    SetBlendState(Handle<BlendState>),
    SetStencilReference(u32),
    SetBlendConstants([f32; 4]),
    Draw {
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    },
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        base_vertex: i32,
        first_instance: u32,
    },
    Dispatch {
        x: u32,
        y: u32,
        z: u32,
    },
    Submit {
        fence: u64,
    },
    Wait {
        fence: u64,
    },
}

/// A failure queued for the next matching native call. Each fault fires once.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmptyFault {
    /// The next creation call for this kind fails as if out of memory.
    FailNextCreation(ResourceKind),
    PresentDeviceRemoved,
    PresentDeviceReset,
    PresentOutOfDate,
    PresentFailure,
    /// The next in-place resize reports the old chain unusable.
    ResizeChainLost,
    FailNextSubmit,
    /// The next attachment clear fails.
    FailNextClear,
    /// The next rebuild after device loss fails as if no adapter were left.
    FailNextRecreate,
}

#[derive(Default)]
struct EmptyState {
    calls: Vec<NativeCall>,
    faults: Vec<EmptyFault>,
    swap_chain: Option<SwapChainInfo>,
    next_image: u32,
    completed_fence: u64,
}

impl EmptyState {
    fn record(&mut self, call: NativeCall) {
        log::trace!("empty: {call:?}");
        self.calls.push(call);
    }

    fn take_fault(&mut self, fault: EmptyFault) -> bool {
        match self.faults.iter().position(|f| *f == fault) {
            Some(idx) => {
                self.faults.remove(idx);
                true
            }
            None => false,
        }
    }

    fn create(&mut self, kind: ResourceKind, call: NativeCall) -> Result<()> {
        if self.take_fault(EmptyFault::FailNextCreation(kind)) {
            return Err(GPUError::creation(format!("injected {kind:?} creation failure")));
        }
        self.record(call);
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct EmptyDevice {
    state: Arc<Mutex<EmptyState>>,
}

impl EmptyDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the call log.
    pub fn calls(&self) -> Vec<NativeCall> {
        self.state.lock().calls.clone()
    }

    pub fn take_calls(&self) -> Vec<NativeCall> {
        std::mem::take(&mut self.state.lock().calls)
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    pub fn count(&self, pred: impl Fn(&NativeCall) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|c| pred(c)).count()
    }

    pub fn inject(&self, fault: EmptyFault) {
        self.state.lock().faults.push(fault);
    }

    pub(crate) fn recreate(&self) -> Result<EmptyDevice> {
        let mut state = self.state.lock();
        if state.take_fault(EmptyFault::FailNextRecreate) {
            return Err(GPUError::creation("injected device recreation failure"));
        }
        state.record(NativeCall::Recreate);
        Ok(EmptyDevice::new())
    }

    pub fn completed_fence(&self) -> u64 {
        self.state.lock().completed_fence
    }

    pub(crate) fn limits(&self) -> DeviceLimits {
        DeviceLimits::default()
    }

    pub(crate) fn features(&self) -> DeviceFeatures {
        DeviceFeatures {
            independent_blend: true,
            geometry_shader: true,
            tessellation_shader: true,
            multi_viewport: true,
            texture_cube_array: true,
            sampler_anisotropy: true,
            depth_clamp: true,
        }
    }

    pub(crate) fn create_buffer(
        &self,
        buffer: Handle<Buffer>,
        desc: &BufferDescriptor,
        initial_data: Option<&[u8]>,
    ) -> Result<()> {
        self.state.lock().create(
            ResourceKind::Buffer,
            NativeCall::CreateBuffer {
                buffer,
                size: desc.size(),
                initial_data: initial_data.map(<[u8]>::to_vec),
            },
        )
    }

    pub(crate) fn destroy_buffer(&self, buffer: Handle<Buffer>) {
        self.state.lock().record(NativeCall::DestroyBuffer(buffer));
    }

    pub(crate) fn create_texture(
        &self,
        texture: Handle<Texture>,
        desc: &TextureDescriptor,
        initial_data: Option<&[u8]>,
    ) -> Result<()> {
        self.state.lock().create(
            ResourceKind::Texture,
            NativeCall::CreateTexture {
                texture,
                desc: *desc,
                has_initial_data: initial_data.is_some(),
            },
        )
    }

    pub(crate) fn destroy_texture(&self, texture: Handle<Texture>) {
        self.state.lock().record(NativeCall::DestroyTexture(texture));
    }

    pub(crate) fn create_texture_view(
        &self,
        view: Handle<TextureView>,
        texture: Handle<Texture>,
        desc: &NativeViewDesc,
    ) -> Result<()> {
        self.state.lock().create(
            ResourceKind::TextureView,
            NativeCall::CreateTextureView {
                view,
                texture,
                desc: *desc,
            },
        )
    }

    pub(crate) fn destroy_texture_view(&self, view: Handle<TextureView>) {
        self.state.lock().record(NativeCall::DestroyTextureView(view));
    }

    pub(crate) fn create_sampler(&self, sampler: Handle<Sampler>, _desc: &SamplerDescriptor) -> Result<()> {
        self.state
            .lock()
            .create(ResourceKind::Sampler, NativeCall::CreateSampler(sampler))
    }

    pub(crate) fn destroy_sampler(&self, sampler: Handle<Sampler>) {
        self.state.lock().record(NativeCall::DestroySampler(sampler));
    }

    pub(crate) fn create_shader(&self, shader: Handle<Shader>, desc: &ShaderDescriptor) -> Result<()> {
        self.state.lock().create(
            ResourceKind::Shader,
            NativeCall::CreateShader {
                shader,
                stage: desc.stage,
            },
        )
    }

    pub(crate) fn destroy_shader(&self, shader: Handle<Shader>) {
        self.state.lock().record(NativeCall::DestroyShader(shader));
    }

    pub(crate) fn create_rasterizer_state(
        &self,
        state: Handle<RasterizerState>,
        _desc: &RasterizerStateDescriptor,
    ) -> Result<()> {
        self.state
            .lock()
            .create(ResourceKind::RasterizerState, NativeCall::CreateRasterizerState(state))
    }

    pub(crate) fn destroy_rasterizer_state(&self, state: Handle<RasterizerState>) {
        self.state.lock().record(NativeCall::DestroyRasterizerState(state));
    }

    pub(crate) fn create_depth_stencil_state(
        &self,
        state: Handle<DepthStencilState>,
        _desc: &DepthStencilStateDescriptor,
    ) -> Result<()> {
        self.state.lock().create(
            ResourceKind::DepthStencilState,
            NativeCall::CreateDepthStencilState(state),
        )
    }

    pub(crate) fn destroy_depth_stencil_state(&self, state: Handle<DepthStencilState>) {
        self.state.lock().record(NativeCall::DestroyDepthStencilState(state));
    }

    pub(crate) fn create_blend_state(&self, state: Handle<BlendState>, _desc: &BlendStateDescriptor) -> Result<()> {
        self.state
            .lock()
            .create(ResourceKind::BlendState, NativeCall::CreateBlendState(state))
    }

    pub(crate) fn destroy_blend_state(&self, state: Handle<BlendState>) {
        self.state.lock().record(NativeCall::DestroyBlendState(state));
    }

    pub(crate) fn create_input_layout(&self, layout: Handle<InputLayout>, desc: &InputLayoutDesc) -> Result<()> {
        self.state.lock().create(
            ResourceKind::InputLayout,
            NativeCall::CreateInputLayout {
                layout,
                desc: desc.clone(),
            },
        )
    }

    pub(crate) fn destroy_input_layout(&self, layout: Handle<InputLayout>) {
        self.state.lock().record(NativeCall::DestroyInputLayout(layout));
    }

    pub(crate) fn create_render_pipeline(
        &self,
        pipeline: Handle<RenderPipeline>,
        _info: &RenderPipelineInfo<'_>,
    ) -> Result<()> {
        self.state
            .lock()
            .create(ResourceKind::RenderPipeline, NativeCall::CreateRenderPipeline(pipeline))
    }

    pub(crate) fn destroy_render_pipeline(&self, pipeline: Handle<RenderPipeline>) {
        self.state.lock().record(NativeCall::DestroyRenderPipeline(pipeline));
    }

    pub(crate) fn create_compute_pipeline(
        &self,
        pipeline: Handle<ComputePipeline>,
        _shader: Handle<Shader>,
    ) -> Result<()> {
        self.state
            .lock()
            .create(ResourceKind::ComputePipeline, NativeCall::CreateComputePipeline(pipeline))
    }

    pub(crate) fn destroy_compute_pipeline(&self, pipeline: Handle<ComputePipeline>) {
        self.state.lock().record(NativeCall::DestroyComputePipeline(pipeline));
    }

    pub(crate) fn create_swap_chain(&self, desc: &SwapChainDescriptor, image_count: u32) -> Result<SwapChainInfo> {
        let mut state = self.state.lock();
        state.create(
            ResourceKind::SwapChain,
            NativeCall::CreateSwapChain {
                width: desc.width,
                height: desc.height,
                image_count,
            },
        )?;
        let info = SwapChainInfo {
            image_count,
            width: desc.width,
            height: desc.height,
            format: desc.color_format,
        };
        state.swap_chain = Some(info);
        state.next_image = 0;
        Ok(info)
    }

    pub(crate) fn resize_swap_chain(&self, width: u32, height: u32) -> Result<ResizeOutcome> {
        let mut state = self.state.lock();
        state.record(NativeCall::ResizeSwapChain { width, height });
        if state.take_fault(EmptyFault::ResizeChainLost) {
            return Ok(ResizeOutcome::ChainLost);
        }
        let state = &mut *state;
        match state.swap_chain.as_mut() {
            Some(info) => {
                info.width = width;
                info.height = height;
                state.next_image = 0;
                Ok(ResizeOutcome::Resized)
            }
            None => Ok(ResizeOutcome::ChainLost),
        }
    }

    pub(crate) fn recreate_swap_chain(&self, desc: &SwapChainDescriptor, image_count: u32) -> Result<SwapChainInfo> {
        let mut state = self.state.lock();
        state.create(
            ResourceKind::SwapChain,
            NativeCall::CreateSwapChain {
                width: desc.width,
                height: desc.height,
                image_count,
            },
        )?;
        let info = SwapChainInfo {
            image_count,
            width: desc.width,
            height: desc.height,
            format: desc.color_format,
        };
        if state.swap_chain.replace(info).is_some() {
            state.record(NativeCall::DestroySwapChain);
        }
        state.next_image = 0;
        Ok(info)
    }

    pub(crate) fn destroy_swap_chain(&self) {
        let mut state = self.state.lock();
        if state.swap_chain.take().is_some() {
            state.record(NativeCall::DestroySwapChain);
        }
    }

    pub(crate) fn swap_chain_info(&self) -> Option<SwapChainInfo> {
        self.state.lock().swap_chain
    }

    pub(crate) fn wrap_back_buffer(&self, texture: Handle<Texture>, index: u32) -> Result<()> {
        self.state
            .lock()
            .record(NativeCall::WrapBackBuffer { texture, index });
        Ok(())
    }

    pub(crate) fn release_back_buffer(&self, texture: Handle<Texture>) {
        self.state.lock().record(NativeCall::ReleaseBackBuffer(texture));
    }

    pub(crate) fn acquire_next_image(&self) -> Result<u32> {
        let mut state = self.state.lock();
        let count = match state.swap_chain {
            Some(info) => info.image_count.max(1),
            None => return Err(GPUError::InvalidState("no swap chain to acquire from")),
        };
        let image = state.next_image;
        state.next_image = (image + 1) % count;
        state.record(NativeCall::AcquireNextImage(image));
        Ok(image)
    }

    pub(crate) fn present(&self, image: u32) -> Result<PresentStatus> {
        let mut state = self.state.lock();
        state.record(NativeCall::Present(image));
        if state.take_fault(EmptyFault::PresentDeviceRemoved) {
            return Ok(PresentStatus::DeviceLost(DeviceLostReason::Removed));
        }
        if state.take_fault(EmptyFault::PresentDeviceReset) {
            return Ok(PresentStatus::DeviceLost(DeviceLostReason::Reset));
        }
        if state.take_fault(EmptyFault::PresentOutOfDate) {
            return Ok(PresentStatus::OutOfDate);
        }
        if state.take_fault(EmptyFault::PresentFailure) {
            return Err(GPUError::native("injected present failure"));
        }
        Ok(PresentStatus::Presented)
    }

    pub(crate) fn create_commands(&self) -> EmptyCommands {
        EmptyCommands {
            state: Arc::clone(&self.state),
        }
    }

    pub(crate) fn wait_idle(&self) -> Result<()> {
        self.state.lock().record(NativeCall::WaitIdle);
        Ok(())
    }

    pub(crate) fn shutdown(&self) {
        let mut state = self.state.lock();
        state.swap_chain = None;
        state.record(NativeCall::Shutdown);
    }
}

/// Recorder half of the empty backend; shares the device's call log.
pub struct EmptyCommands {
    state: Arc<Mutex<EmptyState>>,
}

impl EmptyCommands {
    fn record(&mut self, call: NativeCall) -> Result<()> {
        self.state.lock().record(call);
        Ok(())
    }

    pub(crate) fn set_render_targets(
        &mut self,
        colors: &[Handle<TextureView>],
        depth_stencil: Option<Handle<TextureView>>,
        width: u32,
        height: u32,
    ) -> Result<()> {
        self.record(NativeCall::SetRenderTargets {
            colors: colors.to_vec(),
            depth_stencil,
            width,
            height,
        })
    }

    pub(crate) fn clear_render_target(&mut self, index: u32, view: Handle<TextureView>, color: Color) -> Result<()> {
        self.record_clear(NativeCall::ClearRenderTarget { index, view, color })
    }

    pub(crate) fn clear_depth_stencil(
        &mut self,
        view: Handle<TextureView>,
        flags: ClearFlags,
        depth: f32,
        stencil: u8,
    ) -> Result<()> {
        self.record_clear(NativeCall::ClearDepthStencil {
            view,
            flags,
            depth,
            stencil,
        })
    }

    fn record_clear(&mut self, call: NativeCall) -> Result<()> {
        let mut state = self.state.lock();
        if state.take_fault(EmptyFault::FailNextClear) {
            return Err(GPUError::native("injected clear failure"));
        }
        state.record(call);
        Ok(())
    }

    pub(crate) fn set_viewports(&mut self, viewports: &[Viewport]) -> Result<()> {
        self.record(NativeCall::SetViewports(viewports.to_vec()))
    }

    pub(crate) fn set_scissors(&mut self, scissors: &[Rect]) -> Result<()> {
        self.record(NativeCall::SetScissors(scissors.to_vec()))
    }

    pub(crate) fn set_vertex_buffers(&mut self, first_slot: u32, bindings: &[VertexBufferBinding]) -> Result<()> {
        self.record(NativeCall::SetVertexBuffers {
            first_slot,
            bindings: bindings.to_vec(),
        })
    }

    pub(crate) fn set_index_buffer(&mut self, binding: Option<IndexBufferBinding>) -> Result<()> {
        self.record(NativeCall::SetIndexBuffer(binding))
    }

    pub(crate) fn set_input_layout(&mut self, layout: Option<Handle<InputLayout>>) -> Result<()> {
        self.record(NativeCall::SetInputLayout(layout))
    }

    pub(crate) fn set_primitive_topology(&mut self, topology: PrimitiveTopology, patch_control_points: u32) -> Result<()> {
        self.record(NativeCall::SetPrimitiveTopology {
            topology,
            patch_control_points,
        })
    }

    pub(crate) fn set_render_pipeline(&mut self, pipeline: Handle<RenderPipeline>) -> Result<()> {
        self.record(NativeCall::SetRenderPipeline(pipeline))
    }

    pub(crate) fn set_compute_pipeline(&mut self, pipeline: Handle<ComputePipeline>) -> Result<()> {
        self.record(NativeCall::SetComputePipeline(pipeline))
    }

    pub(crate) fn set_rasterizer_state(&mut self, state: Handle<RasterizerState>) -> Result<()> {
        self.record(NativeCall::SetRasterizerState(state))
    }

    pub(crate) fn set_depth_stencil_state(&mut self, state: Handle<DepthStencilState>) -> Result<()> {
        self.record(NativeCall::SetDepthStencilState(state))
    }

    pub(crate) fn set_blend_state(&mut self, state: Handle<BlendState>) -> Result<()> {
        self.record(NativeCall::SetBlendState(state))
    }

    pub(crate) fn set_stencil_reference(&mut self, reference: u32) -> Result<()> {
        self.record(NativeCall::SetStencilReference(reference))
    }

    pub(crate) fn set_blend_constants(&mut self, color: [f32; 4]) -> Result<()> {
        self.record(NativeCall::SetBlendConstants(color))
    }

    pub(crate) fn draw(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) -> Result<()> {
        self.record(NativeCall::Draw {
            vertex_count,
            instance_count,
            first_vertex,
            first_instance,
        })
    }

    pub(crate) fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        base_vertex: i32,
        first_instance: u32,
    ) -> Result<()> {
        self.record(NativeCall::DrawIndexed {
            index_count,
            instance_count,
            first_index,
            base_vertex,
            first_instance,
        })
    }

    pub(crate) fn dispatch(&mut self, x: u32, y: u32, z: u32) -> Result<()> {
        self.record(NativeCall::Dispatch { x, y, z })
    }

    pub(crate) fn submit(&mut self, fence: u64) -> Result<()> {
        let mut state = self.state.lock();
        if state.take_fault(EmptyFault::FailNextSubmit) {
            return Err(GPUError::native("injected submit failure"));
        }
        state.record(NativeCall::Submit { fence });
        state.completed_fence = state.completed_fence.max(fence);
        Ok(())
    }

    pub(crate) fn wait(&mut self, fence: u64) -> Result<()> {
        self.record(NativeCall::Wait { fence })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn faults_fire_once() {
        let device = EmptyDevice::new();
        device.inject(EmptyFault::FailNextCreation(ResourceKind::Sampler));

        let sampler = Handle::null();
        let desc = SamplerDescriptor::default();
        assert!(matches!(
            device.create_sampler(sampler, &desc),
            Err(GPUError::ResourceCreationFailed(_))
        ));
        assert!(device.calls().is_empty());
        assert!(device.create_sampler(sampler, &desc).is_ok());
        assert_eq!(device.calls(), vec![NativeCall::CreateSampler(sampler)]);
    }

    #[test]
    fn faults_only_match_their_kind() {
        let device = EmptyDevice::new();
        device.inject(EmptyFault::FailNextCreation(ResourceKind::Texture));
        assert!(device
            .create_sampler(Handle::null(), &SamplerDescriptor::default())
            .is_ok());
        assert!(device
            .create_texture(Handle::null(), &TextureDescriptor::default(), None)
            .is_err());
    }

    #[test]
    fn commands_share_the_device_log() {
        let device = EmptyDevice::new();
        let mut cmds = device.create_commands();
        cmds.draw(3, 1, 0, 0).unwrap();
        cmds.submit(1).unwrap();
        assert_eq!(device.completed_fence(), 1);
        assert_eq!(device.take_calls().len(), 2);
        assert!(device.calls().is_empty());
    }

    #[test]
    fn images_are_acquired_round_robin() {
        let device = EmptyDevice::new();
        assert!(device.acquire_next_image().is_err());
        let desc = SwapChainDescriptor::default();
        device.create_swap_chain(&desc, 2).unwrap();
        let order: Vec<_> = (0..3).map(|_| device.acquire_next_image().unwrap()).collect();
        assert_eq!(order, vec![0, 1, 0]);
    }

    #[test]
    fn present_faults_map_to_status() {
        let device = EmptyDevice::new();
        device.inject(EmptyFault::PresentDeviceReset);
        device.inject(EmptyFault::PresentFailure);
        assert_eq!(
            device.present(0),
            Ok(PresentStatus::DeviceLost(DeviceLostReason::Reset))
        );
        assert!(matches!(device.present(0), Err(GPUError::NativeFailure(_))));
        assert_eq!(device.present(0), Ok(PresentStatus::Presented));
    }
}
