use std::sync::Arc;

use bytemuck::Pod;
use parking_lot::Mutex;

use super::backend::{resolve_backend, Backend};
use super::context::CommandContext;
use super::driver::types::BufferUsage;
use super::empty::EmptyDevice;
use super::error::{GPUError, Result};
use super::native::{NativeDevice, PresentStatus};
use super::registry::{DeviceShared, ResourceRegistry};
use super::resources::*;
use super::structs::*;
use super::swapchain::{SwapChain, SwapChainState};
use super::view_cache::{TextureViewRange, ViewKind};
use crate::utils::Handle;

pub type DeviceLostCallback = Box<dyn FnMut(&DeviceLostInfo) + Send>;

/// Objects every device creates for itself.
#[derive(Clone, Copy)]
struct DeviceDefaults {
    point_clamp: Handle<Sampler>,
    linear_clamp: Handle<Sampler>,
    rasterizer: Handle<RasterizerState>,
    depth_stencil: Handle<DepthStencilState>,
    blend: Handle<BlendState>,
}

/// The top-level factory. Owns the backend, every tracked resource, the
/// immediate command context and the swap chain.
///
/// Creation and destruction take `&self` and may run from any thread.
/// Frame, swap-chain and device-loss handling take `&mut self`.
pub struct Device {
    shared: Arc<DeviceShared>,
    descriptor: DeviceDescriptor,
    immediate: Option<CommandContext>,
    swap_chain: SwapChain,
    defaults: DeviceDefaults,
    device_lost_callback: Mutex<Option<DeviceLostCallback>>,
    epoch: u64,
    /// Whether a pending recovery has to bring the swap chain back.
    restore_swap_chain: bool,
    shut_down: bool,
}

impl Device {
    /// Creates a device on the descriptor's backend, or on the first
    /// supported entry of the platform fallback list for `Backend::Default`.
    ///
    /// `DASHI_BACKEND` and `DASHI_VALIDATION` override the descriptor.
    pub fn create(desc: &DeviceDescriptor) -> Result<Self> {
        let mut descriptor = desc.clone();
        descriptor.apply_env_overrides();
        let backend = resolve_backend(descriptor.backend)?;
        log::info!(
            "creating {backend} device for '{}' (validation: {})",
            descriptor.application_name,
            descriptor.validation
        );

        let native = NativeDevice::create(backend, &descriptor)?;
        let registry = ResourceRegistry::new(descriptor.max_inflight_frames);
        let shared = Arc::new(DeviceShared::new(
            backend,
            descriptor.validation,
            native,
            registry,
        ));
        let (defaults, immediate) = Self::init_defaults(&shared)?;

        Ok(Self {
            shared,
            descriptor,
            immediate: Some(immediate),
            swap_chain: SwapChain::default(),
            defaults,
            device_lost_callback: Mutex::new(None),
            epoch: 0,
            restore_swap_chain: false,
            shut_down: false,
        })
    }

    fn init_defaults(shared: &Arc<DeviceShared>) -> Result<(DeviceDefaults, CommandContext)> {
        let defaults = DeviceDefaults {
            point_clamp: shared.create_sampler(&SamplerDescriptor::point_clamp(), true)?,
            linear_clamp: shared.create_sampler(&SamplerDescriptor::linear_clamp(), true)?,
            rasterizer: shared.create_rasterizer_state(&Default::default())?,
            depth_stencil: shared.create_depth_stencil_state(&Default::default())?,
            blend: shared.create_blend_state(&Default::default())?,
        };
        let immediate = CommandContext::new(shared.clone())?;
        Ok((defaults, immediate))
    }

    pub fn backend(&self) -> Backend {
        self.shared.backend
    }

    pub fn validation_enabled(&self) -> bool {
        self.shared.validation
    }

    pub fn limits(&self) -> DeviceLimits {
        self.shared.limits
    }

    pub fn features(&self) -> DeviceFeatures {
        self.shared.features
    }

    /// The descriptor the device was created from, after env overrides.
    pub fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    /// Number of recoveries from device loss so far.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// The recording log of the `Empty` backend; `None` on real backends.
    pub fn empty_backend(&self) -> Option<&EmptyDevice> {
        match &self.shared.native {
            NativeDevice::Empty(d) => Some(d),
            #[cfg(feature = "dashi-vulkan")]
            _ => None,
        }
    }

    //===------------------------------------------------------------------===//
    // Contexts
    //===------------------------------------------------------------------===//

    pub fn immediate_context(&mut self) -> Result<&mut CommandContext> {
        if self.shut_down {
            return Err(GPUError::InvalidState("device has been shut down"));
        }
        self.immediate.as_mut().ok_or(GPUError::DeviceLost)
    }

    /// Creates an additional context for recording on another thread.
    pub fn create_context(&self) -> Result<CommandContext> {
        CommandContext::new(self.shared.clone())
    }

    //===------------------------------------------------------------------===//
    // Resources
    //===------------------------------------------------------------------===//

    pub fn create_buffer(
        &self,
        desc: &BufferDescriptor,
        initial_data: Option<&[u8]>,
    ) -> Result<Handle<Buffer>> {
        self.shared.create_buffer(desc, initial_data)
    }

    /// Creates a buffer sized and seeded from `data`.
    pub fn create_buffer_from<T: Pod>(&self, usage: BufferUsage, data: &[T]) -> Result<Handle<Buffer>> {
        let desc = BufferDescriptor::new(
            usage,
            data.len() as u64,
            std::mem::size_of::<T>() as u32,
        );
        self.shared
            .create_buffer(&desc, Some(bytemuck::cast_slice(data)))
    }

    pub fn create_texture(
        &self,
        desc: &TextureDescriptor,
        initial_data: Option<&[u8]>,
    ) -> Result<Handle<Texture>> {
        self.shared
            .create_texture(desc, initial_data, TextureOwner::User)
    }

    pub fn create_sampler(&self, desc: &SamplerDescriptor) -> Result<Handle<Sampler>> {
        self.shared.create_sampler(desc, false)
    }

    pub fn default_point_sampler(&self) -> Handle<Sampler> {
        self.defaults.point_clamp
    }

    pub fn default_linear_sampler(&self) -> Handle<Sampler> {
        self.defaults.linear_clamp
    }

    pub fn create_framebuffer(&self, desc: &FramebufferDescriptor) -> Result<Handle<Framebuffer>> {
        self.shared.create_framebuffer(desc)
    }

    pub fn create_shader(&self, desc: &ShaderDescriptor) -> Result<Handle<Shader>> {
        self.shared.create_shader(desc)
    }

    /// Identical descriptors return the same handle.
    pub fn create_rasterizer_state(
        &self,
        desc: &RasterizerStateDescriptor,
    ) -> Result<Handle<RasterizerState>> {
        self.shared.create_rasterizer_state(desc)
    }

    pub fn create_depth_stencil_state(
        &self,
        desc: &DepthStencilStateDescriptor,
    ) -> Result<Handle<DepthStencilState>> {
        self.shared.create_depth_stencil_state(desc)
    }

    pub fn create_blend_state(&self, desc: &BlendStateDescriptor) -> Result<Handle<BlendState>> {
        self.shared.create_blend_state(desc)
    }

    /// Missing state handles fall back to the device defaults.
    pub fn create_render_pipeline(
        &self,
        desc: &RenderPipelineDescriptor,
    ) -> Result<Handle<RenderPipeline>> {
        self.shared.create_render_pipeline(
            desc,
            desc.rasterizer_state.unwrap_or(self.defaults.rasterizer),
            desc.depth_stencil_state.unwrap_or(self.defaults.depth_stencil),
            desc.blend_state.unwrap_or(self.defaults.blend),
        )
    }

    pub fn create_compute_pipeline(
        &self,
        desc: &ComputePipelineDescriptor,
    ) -> Result<Handle<ComputePipeline>> {
        self.shared.create_compute_pipeline(desc)
    }

    //===------------------------------------------------------------------===//
    // Views
    //===------------------------------------------------------------------===//

    /// Returns the cached view of `texture` for `kind` over `range`,
    /// creating it on first request.
    pub fn texture_view(
        &self,
        texture: Handle<Texture>,
        kind: ViewKind,
        range: &TextureViewRange,
    ) -> Result<Handle<TextureView>> {
        self.shared.texture_view(texture, kind, range)
    }

    pub fn shader_resource_view(
        &self,
        texture: Handle<Texture>,
        range: &TextureViewRange,
    ) -> Result<Handle<TextureView>> {
        self.texture_view(texture, ViewKind::ShaderResource, range)
    }

    pub fn render_target_view(
        &self,
        texture: Handle<Texture>,
        range: &TextureViewRange,
    ) -> Result<Handle<TextureView>> {
        self.texture_view(texture, ViewKind::RenderTarget, range)
    }

    pub fn depth_stencil_view(
        &self,
        texture: Handle<Texture>,
        range: &TextureViewRange,
    ) -> Result<Handle<TextureView>> {
        self.texture_view(texture, ViewKind::DepthStencil, range)
    }

    pub fn unordered_access_view(
        &self,
        texture: Handle<Texture>,
        range: &TextureViewRange,
    ) -> Result<Handle<TextureView>> {
        self.texture_view(texture, ViewKind::UnorderedAccess, range)
    }

    pub fn texture_view_info(&self, view: Handle<TextureView>) -> Option<TextureViewInfo> {
        self.shared.texture_view_info(view)
    }

    //===------------------------------------------------------------------===//
    // Destruction
    //===------------------------------------------------------------------===//

    pub fn destroy_buffer(&self, buffer: Handle<Buffer>) -> Result<()> {
        self.shared.destroy_buffer(buffer)
    }

    /// Destroys the texture together with every view cached for it.
    pub fn destroy_texture(&self, texture: Handle<Texture>) -> Result<()> {
        self.shared.destroy_texture(texture)
    }

    pub fn destroy_sampler(&self, sampler: Handle<Sampler>) -> Result<()> {
        self.shared.destroy_sampler(sampler)
    }

    pub fn destroy_framebuffer(&self, framebuffer: Handle<Framebuffer>) -> Result<()> {
        self.shared.destroy_framebuffer(framebuffer)
    }

    pub fn destroy_shader(&self, shader: Handle<Shader>) -> Result<()> {
        self.shared.destroy_shader(shader)
    }

    pub fn destroy_render_pipeline(&self, pipeline: Handle<RenderPipeline>) -> Result<()> {
        self.shared.destroy_render_pipeline(pipeline)
    }

    pub fn destroy_compute_pipeline(&self, pipeline: Handle<ComputePipeline>) -> Result<()> {
        self.shared.destroy_compute_pipeline(pipeline)
    }

    //===------------------------------------------------------------------===//
    // Queries
    //===------------------------------------------------------------------===//

    pub fn texture_descriptor(&self, texture: Handle<Texture>) -> Option<TextureDescriptor> {
        self.shared.registry.lock().textures.get_ref(texture).map(|t| t.desc)
    }

    pub fn buffer_descriptor(&self, buffer: Handle<Buffer>) -> Option<BufferDescriptor> {
        self.shared.registry.lock().buffers.get_ref(buffer).map(|b| b.desc)
    }

    /// User resources created and not yet destroyed.
    pub fn live_resource_count(&self) -> usize {
        self.shared.registry.lock().live_user_resources()
    }

    /// Native teardowns still waiting in the frame ring.
    pub fn pending_destructions(&self) -> usize {
        self.shared.registry.lock().frames.pending()
    }

    pub fn frame_index(&self) -> u64 {
        self.shared.registry.lock().frames.frame_index()
    }

    pub fn wait_idle(&self) -> Result<()> {
        self.shared.native.wait_idle()
    }

    //===------------------------------------------------------------------===//
    // Frames
    //===------------------------------------------------------------------===//

    /// Moves to the next in-flight slot, waits for its last submission and
    /// runs the destructions queued there, then acquires a back buffer.
    pub fn begin_frame(&mut self) -> Result<()> {
        let (fence, released) = self.shared.registry.lock().frames.advance();

        let waited = self
            .immediate_context()
            .and_then(|ctx| ctx.wait_for(fence));
        if let Err(err) = waited {
            let mut reg = self.shared.registry.lock();
            for release in released {
                reg.frames.defer(release);
            }
            return Err(err);
        }
        for release in released {
            release.release(&self.shared.native);
        }

        if self.swap_chain.needs_resize() {
            let (width, height) = self.swap_chain.size();
            self.swap_chain.resize(&self.shared, width, height)?;
        }
        if self.swap_chain.is_configured() {
            self.swap_chain.acquire(&self.shared)?;
        }
        Ok(())
    }

    /// Submits the immediate context, retires the slot on that submission
    /// and presents when a swap chain is configured. Device loss reported
    /// by the present is recovered from here.
    pub fn end_frame(&mut self) -> Result<()> {
        let fence = self.immediate_context()?.flush(false)?;
        self.shared.registry.lock().frames.set_retire_fence(fence);

        if !self.swap_chain.is_configured() {
            return Ok(());
        }
        match self.swap_chain.present(&self.shared)? {
            PresentStatus::DeviceLost(reason) => self.handle_device_lost(reason),
            PresentStatus::Presented | PresentStatus::OutOfDate => Ok(()),
        }
    }

    pub fn present(&mut self) -> Result<()> {
        self.end_frame()
    }

    //===------------------------------------------------------------------===//
    // Swap chain
    //===------------------------------------------------------------------===//

    pub fn configure_swap_chain(&mut self, desc: &SwapChainDescriptor) -> Result<()> {
        self.swap_chain.configure(&self.shared, desc)
    }

    pub fn resize_swap_chain(&mut self, width: u32, height: u32) -> Result<()> {
        self.swap_chain.resize(&self.shared, width, height)
    }

    pub fn swap_chain(&self) -> &SwapChain {
        &self.swap_chain
    }

    //===------------------------------------------------------------------===//
    // Device loss
    //===------------------------------------------------------------------===//

    pub fn set_device_lost_callback(&mut self, callback: DeviceLostCallback) {
        *self.device_lost_callback.lock() = Some(callback);
    }

    /// Rebuilds the backend after a device-removed or device-reset signal.
    ///
    /// Every tracked resource is forgotten; outstanding handles turn stale
    /// and are never handed out again. Contexts created before the loss keep
    /// failing with [`GPUError::DeviceLost`].
    ///
    /// If the rebuild fails the device stays lost: calls that need the
    /// backend return [`GPUError::DeviceLost`] and the next call here
    /// retries the rebuild.
    pub fn handle_device_lost(&mut self, reason: DeviceLostReason) -> Result<()> {
        if self.shut_down {
            return Ok(());
        }
        if self.shared.is_lost() {
            log::info!("retrying {} device recreation", self.shared.backend);
        } else {
            log::warn!("{} device lost ({reason:?}), recreating", self.shared.backend);
            self.release_lost_device();
        }

        let backend = self.shared.backend;
        let native = self.shared.native.recreate(&self.descriptor).map_err(|err| {
            log::error!("recreating {backend} device failed: {err}");
            err
        })?;
        let inflight = self.descriptor.max_inflight_frames;
        let registry = std::mem::replace(
            &mut *self.shared.registry.lock(),
            ResourceRegistry::new(inflight),
        );
        let shared = Arc::new(DeviceShared::new(
            backend,
            self.descriptor.validation,
            native,
            registry,
        ));
        let (defaults, immediate) = match Self::init_defaults(&shared) {
            Ok(built) => built,
            Err(err) => {
                log::error!("recreating {backend} device defaults failed: {err}");
                let mut registry = std::mem::replace(
                    &mut *shared.registry.lock(),
                    ResourceRegistry::new(inflight),
                );
                registry.forget_all();
                *self.shared.registry.lock() = registry;
                shared.mark_lost();
                shared.native.shutdown();
                return Err(err);
            }
        };
        self.shared = shared;
        self.defaults = defaults;
        self.immediate = Some(immediate);

        if std::mem::take(&mut self.restore_swap_chain) {
            if let Some(desc) = self.swap_chain.descriptor().copied() {
                self.swap_chain.configure(&self.shared, &desc)?;
            }
        }

        self.epoch += 1;
        let info = DeviceLostInfo {
            reason,
            epoch: self.epoch,
        };
        log::info!("{backend} device recovered, epoch {}", self.epoch);
        if let Some(callback) = self.device_lost_callback.lock().as_mut() {
            callback(&info);
        }
        Ok(())
    }

    /// Tears down the lost backend and forgets what was tracked on it. The
    /// forgotten registry stays with the lost state until a rebuild takes it.
    fn release_lost_device(&mut self) {
        self.shared.mark_lost();
        self.immediate = None;
        self.shared.registry.lock().forget_all();
        self.shared.native.destroy_swap_chain();
        self.shared.native.shutdown();

        self.restore_swap_chain = self.swap_chain.state() == SwapChainState::Configured;
        self.swap_chain.forget();
    }

    //===------------------------------------------------------------------===//
    // Shutdown
    //===------------------------------------------------------------------===//

    /// Tears everything down, leaked resources included. Safe to call more
    /// than once; also runs on drop.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        if self.shared.is_lost() {
            // A failed recovery already released the backend.
            self.immediate = None;
            log::info!("{} device shut down while lost", self.shared.backend);
            return;
        }

        if let Err(err) = self.shared.native.wait_idle() {
            log::warn!("wait for idle during shutdown failed: {err}");
        }
        self.shared.drain_deferred();
        self.swap_chain.destroy(&self.shared);

        let leaked = self.shared.destroy_all();
        if leaked > 0 {
            log::warn!("shutdown destroyed {leaked} leaked resources");
        }

        self.immediate = None;
        self.shared.mark_lost();
        self.shared.native.shutdown();
        log::info!("{} device shut down", self.shared.backend);
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        self.shutdown();
    }
}
