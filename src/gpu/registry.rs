//! The tracked-resource set and the state every context of a device shares.
//!
//! Creation follows one shape throughout: validate the descriptor, reserve a
//! handle, run the native create, and release the handle again if the native
//! call fails. The registry lock is held across the native call so a
//! half-created resource is never visible to another thread.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use smallvec::SmallVec;

use super::backend::Backend;
use super::error::{GPUError, Result};
use super::frame::{DeferredRelease, FrameRing};
use super::native::{NativeDevice, RenderPipelineInfo};
use super::resources::*;
use super::structs::*;
use super::validate;
use super::view_cache::{native_view_desc, normalize, validate_kind, TextureViewRange, ViewKind};
use crate::utils::{Handle, Pool};

pub(crate) struct ResourceRegistry {
    pub(crate) buffers: Pool<Buffer>,
    pub(crate) textures: Pool<Texture>,
    pub(crate) views: Pool<TextureView>,
    pub(crate) samplers: Pool<Sampler>,
    pub(crate) framebuffers: Pool<Framebuffer>,
    pub(crate) shaders: Pool<Shader>,
    pub(crate) render_pipelines: Pool<RenderPipeline>,
    pub(crate) compute_pipelines: Pool<ComputePipeline>,
    pub(crate) rasterizer_states: Pool<RasterizerState>,
    pub(crate) depth_stencil_states: Pool<DepthStencilState>,
    pub(crate) blend_states: Pool<BlendState>,
    pub(crate) input_layouts: Pool<InputLayout>,

    rasterizer_cache: HashMap<RasterizerStateDescriptor, Handle<RasterizerState>>,
    depth_stencil_cache: HashMap<DepthStencilStateDescriptor, Handle<DepthStencilState>>,
    blend_cache: HashMap<BlendStateDescriptor, Handle<BlendState>>,
    input_layout_cache: HashMap<InputLayoutDesc, Handle<InputLayout>>,

    pub(crate) frames: FrameRing,
}

impl ResourceRegistry {
    pub(crate) fn new(inflight_frames: u32) -> Self {
        Self {
            buffers: Pool::default(),
            textures: Pool::default(),
            views: Pool::default(),
            samplers: Pool::new(16),
            framebuffers: Pool::new(16),
            shaders: Pool::new(32),
            render_pipelines: Pool::new(32),
            compute_pipelines: Pool::new(16),
            rasterizer_states: Pool::new(8),
            depth_stencil_states: Pool::new(8),
            blend_states: Pool::new(8),
            input_layouts: Pool::new(16),
            rasterizer_cache: HashMap::new(),
            depth_stencil_cache: HashMap::new(),
            blend_cache: HashMap::new(),
            input_layout_cache: HashMap::new(),
            frames: FrameRing::new(inflight_frames),
        }
    }

    /// Resources a caller created and has not destroyed yet. Device-owned
    /// samplers, state objects, input layouts, views and swap-chain textures
    /// are not counted.
    pub(crate) fn live_user_resources(&self) -> usize {
        let mut user_textures = 0;
        self.textures.for_each_occupied(|_, t| {
            if t.owner == TextureOwner::User {
                user_textures += 1;
            }
        });
        let mut user_samplers = 0;
        self.samplers.for_each_occupied(|_, s| {
            if !s.device_owned {
                user_samplers += 1;
            }
        });

        self.buffers.len()
            + user_textures
            + user_samplers
            + self.framebuffers.len()
            + self.shaders.len()
            + self.render_pipelines.len()
            + self.compute_pipelines.len()
    }

    /// Drops every record without touching the native layer. Generations
    /// are bumped, so every outstanding handle turns stale.
    pub(crate) fn forget_all(&mut self) {
        self.buffers.drain();
        self.textures.drain();
        self.views.drain();
        self.samplers.drain();
        self.framebuffers.drain();
        self.shaders.drain();
        self.render_pipelines.drain();
        self.compute_pipelines.drain();
        self.rasterizer_states.drain();
        self.depth_stencil_states.drain();
        self.blend_states.drain();
        self.input_layouts.drain();
        self.rasterizer_cache.clear();
        self.depth_stencil_cache.clear();
        self.blend_cache.clear();
        self.input_layout_cache.clear();
        self.frames = FrameRing::new(self.frames.len() as u32);
    }
}

fn track<T>(
    pool: &mut Pool<T>,
    record: T,
    what: &'static str,
    create: impl FnOnce(Handle<T>) -> Result<()>,
) -> Result<Handle<T>> {
    let handle = pool
        .insert(record)
        .ok_or_else(|| GPUError::creation(format!("{what} pool exhausted")))?;
    if let Err(err) = create(handle) {
        pool.release(handle);
        log::error!("{what} creation failed: {err}");
        return Err(err);
    }
    Ok(handle)
}

/// State shared by a device and every command context created from it.
pub(crate) struct DeviceShared {
    pub(crate) backend: Backend,
    pub(crate) validation: bool,
    pub(crate) native: NativeDevice,
    pub(crate) registry: Mutex<ResourceRegistry>,
    pub(crate) limits: DeviceLimits,
    pub(crate) features: DeviceFeatures,
    lost: AtomicBool,
}

impl DeviceShared {
    pub(crate) fn new(
        backend: Backend,
        validation: bool,
        native: NativeDevice,
        registry: ResourceRegistry,
    ) -> Self {
        Self {
            backend,
            validation,
            limits: native.limits(),
            features: native.features(),
            native,
            registry: Mutex::new(registry),
            lost: AtomicBool::new(false),
        }
    }

    pub(crate) fn is_lost(&self) -> bool {
        self.lost.load(Ordering::Acquire)
    }

    pub(crate) fn mark_lost(&self) {
        self.lost.store(true, Ordering::Release);
    }

    pub(crate) fn ensure_alive(&self) -> Result<()> {
        if self.is_lost() {
            return Err(GPUError::DeviceLost);
        }
        Ok(())
    }

    //===------------------------------------------------------------------===//
    // Creation
    //===------------------------------------------------------------------===//

    pub(crate) fn create_buffer(
        &self,
        desc: &BufferDescriptor,
        initial_data: Option<&[u8]>,
    ) -> Result<Handle<Buffer>> {
        validate::buffer(desc, initial_data)?;
        self.ensure_alive()?;
        let mut reg = self.registry.lock();
        track(&mut reg.buffers, Buffer { desc: *desc }, "buffer", |h| {
            self.native.create_buffer(h, desc, initial_data)
        })
    }

    pub(crate) fn create_texture(
        &self,
        desc: &TextureDescriptor,
        initial_data: Option<&[u8]>,
        owner: TextureOwner,
    ) -> Result<Handle<Texture>> {
        let desc = validate::texture(desc, &self.limits)?;
        self.ensure_alive()?;
        let mut reg = self.registry.lock();
        let record = Texture {
            desc,
            views: Default::default(),
            owner,
        };
        track(&mut reg.textures, record, "texture", |h| {
            self.native.create_texture(h, &desc, initial_data)
        })
    }

    pub(crate) fn texture_view(
        &self,
        texture: Handle<Texture>,
        kind: ViewKind,
        range: &TextureViewRange,
    ) -> Result<Handle<TextureView>> {
        self.ensure_alive()?;
        let mut reg = self.registry.lock();
        self.texture_view_locked(&mut reg, texture, kind, range)
    }

    fn texture_view_locked(
        &self,
        reg: &mut ResourceRegistry,
        texture: Handle<Texture>,
        kind: ViewKind,
        range: &TextureViewRange,
    ) -> Result<Handle<TextureView>> {
        let tex = reg
            .textures
            .get_ref(texture)
            .ok_or(GPUError::InvalidHandle("texture"))?;
        validate_kind(kind, &tex.desc)?;
        let key = normalize(kind, &tex.desc, range);
        if let Some(view) = tex.views.get(kind, &key) {
            return Ok(view);
        }

        let native_desc = native_view_desc(kind, &tex.desc, &key);
        log::debug!("view cache miss: {kind:?} {key:?} on {texture:?}");
        let record = TextureView {
            texture,
            kind,
            key,
            dimension: native_desc.dimension,
        };
        let view = track(&mut reg.views, record, "texture view", |h| {
            self.native.create_texture_view(h, texture, &native_desc)
        })?;
        if let Some(tex) = reg.textures.get_mut_ref(texture) {
            tex.views.insert(kind, key, view);
        }
        Ok(view)
    }

    pub(crate) fn texture_view_info(&self, view: Handle<TextureView>) -> Option<TextureViewInfo> {
        self.registry.lock().views.get_ref(view).map(TextureViewInfo::from)
    }

    pub(crate) fn create_sampler(
        &self,
        desc: &SamplerDescriptor,
        device_owned: bool,
    ) -> Result<Handle<Sampler>> {
        validate::sampler(desc)?;
        self.ensure_alive()?;
        let mut reg = self.registry.lock();
        let record = Sampler {
            desc: *desc,
            device_owned,
        };
        track(&mut reg.samplers, record, "sampler", |h| {
            self.native.create_sampler(h, desc)
        })
    }

    pub(crate) fn create_framebuffer(&self, desc: &FramebufferDescriptor) -> Result<Handle<Framebuffer>> {
        if desc.color_attachments.is_empty() && desc.depth_stencil_attachment.is_none() {
            return Err(GPUError::invalid("framebuffer has no attachments"));
        }
        if desc.color_attachments.len() > MAX_COLOR_ATTACHMENTS {
            return Err(GPUError::invalid(format!(
                "{} color attachments, at most {MAX_COLOR_ATTACHMENTS}",
                desc.color_attachments.len()
            )));
        }
        self.ensure_alive()?;

        let mut reg = self.registry.lock();
        let mut extent = None;
        let mut colors = SmallVec::new();
        for att in &desc.color_attachments {
            colors.push(self.attachment_target(&mut reg, att, false, &mut extent)?);
        }
        let depth_stencil = match &desc.depth_stencil_attachment {
            Some(att) => Some(self.attachment_target(&mut reg, att, true, &mut extent)?),
            None => None,
        };
        let (width, height) = extent.unwrap_or_default();

        let record = Framebuffer {
            colors,
            depth_stencil,
            width,
            height,
        };
        track(&mut reg.framebuffers, record, "framebuffer", |_| Ok(()))
    }

    fn attachment_target(
        &self,
        reg: &mut ResourceRegistry,
        att: &FramebufferAttachment,
        depth: bool,
        extent: &mut Option<(u32, u32)>,
    ) -> Result<AttachmentTarget> {
        let tex = reg
            .textures
            .get_ref(att.texture)
            .ok_or(GPUError::InvalidHandle("framebuffer attachment texture"))?;
        let size = validate::attachment(&tex.desc, att, depth)?;
        let format = tex.desc.format;
        match extent {
            Some(first) if *first != size => {
                return Err(GPUError::invalid(format!(
                    "attachment extent {size:?} does not match {first:?}"
                )))
            }
            Some(_) => {}
            None => *extent = Some(size),
        }

        let kind = if depth {
            ViewKind::DepthStencil
        } else {
            ViewKind::RenderTarget
        };
        let view = self.texture_view_locked(
            reg,
            att.texture,
            kind,
            &TextureViewRange::single(att.level, att.slice),
        )?;
        Ok(AttachmentTarget {
            texture: att.texture,
            view,
            format,
        })
    }

    /// Snapshot of a framebuffer for binding, after checking that every
    /// texture it references is still alive.
    pub(crate) fn framebuffer_targets(&self, framebuffer: Handle<Framebuffer>) -> Result<Framebuffer> {
        let reg = self.registry.lock();
        let fb = reg
            .framebuffers
            .get_ref(framebuffer)
            .ok_or(GPUError::InvalidHandle("framebuffer"))?;
        let all_live = fb
            .colors
            .iter()
            .chain(fb.depth_stencil.iter())
            .all(|t| reg.textures.is_live(t.texture) && reg.views.is_live(t.view));
        if !all_live {
            return Err(GPUError::InvalidHandle("framebuffer attachment texture"));
        }
        Ok(fb.clone())
    }

    pub(crate) fn create_shader(&self, desc: &ShaderDescriptor) -> Result<Handle<Shader>> {
        validate::shader(desc)?;
        self.ensure_alive()?;
        let mut reg = self.registry.lock();
        track(&mut reg.shaders, Shader { stage: desc.stage }, "shader", |h| {
            self.native.create_shader(h, desc)
        })
    }

    pub(crate) fn create_rasterizer_state(
        &self,
        desc: &RasterizerStateDescriptor,
    ) -> Result<Handle<RasterizerState>> {
        self.ensure_alive()?;
        let mut reg = self.registry.lock();
        if let Some(state) = reg.rasterizer_cache.get(desc) {
            return Ok(*state);
        }
        let state = track(
            &mut reg.rasterizer_states,
            RasterizerState { desc: *desc },
            "rasterizer state",
            |h| self.native.create_rasterizer_state(h, desc),
        )?;
        reg.rasterizer_cache.insert(*desc, state);
        Ok(state)
    }

    pub(crate) fn create_depth_stencil_state(
        &self,
        desc: &DepthStencilStateDescriptor,
    ) -> Result<Handle<DepthStencilState>> {
        self.ensure_alive()?;
        let mut reg = self.registry.lock();
        if let Some(state) = reg.depth_stencil_cache.get(desc) {
            return Ok(*state);
        }
        let state = track(
            &mut reg.depth_stencil_states,
            DepthStencilState { desc: *desc },
            "depth-stencil state",
            |h| self.native.create_depth_stencil_state(h, desc),
        )?;
        reg.depth_stencil_cache.insert(*desc, state);
        Ok(state)
    }

    pub(crate) fn create_blend_state(&self, desc: &BlendStateDescriptor) -> Result<Handle<BlendState>> {
        if desc.independent_blend && !self.features.independent_blend {
            return Err(GPUError::invalid(
                "independent blend requested but the device does not support it",
            ));
        }
        self.ensure_alive()?;
        let mut reg = self.registry.lock();
        if let Some(state) = reg.blend_cache.get(desc) {
            return Ok(*state);
        }
        let state = track(
            &mut reg.blend_states,
            BlendState { desc: *desc },
            "blend state",
            |h| self.native.create_blend_state(h, desc),
        )?;
        reg.blend_cache.insert(*desc, state);
        Ok(state)
    }

    /// Returns the cached native layout for `desc`, creating it on first use.
    pub(crate) fn input_layout(&self, desc: &InputLayoutDesc) -> Result<Handle<InputLayout>> {
        self.ensure_alive()?;
        let mut reg = self.registry.lock();
        if let Some(layout) = reg.input_layout_cache.get(desc) {
            return Ok(*layout);
        }
        let layout = track(
            &mut reg.input_layouts,
            InputLayout { desc: desc.clone() },
            "input layout",
            |h| self.native.create_input_layout(h, desc),
        )?;
        reg.input_layout_cache.insert(desc.clone(), layout);
        Ok(layout)
    }

    fn shader_of_stage(
        reg: &ResourceRegistry,
        shader: Handle<Shader>,
        stage: ShaderStage,
    ) -> Result<()> {
        let record = reg
            .shaders
            .get_ref(shader)
            .ok_or(GPUError::InvalidHandle("shader"))?;
        if record.stage != stage {
            return Err(GPUError::invalid(format!(
                "expected a {stage:?} shader, got {:?}",
                record.stage
            )));
        }
        Ok(())
    }

    pub(crate) fn create_render_pipeline(
        &self,
        desc: &RenderPipelineDescriptor,
        rasterizer: Handle<RasterizerState>,
        depth_stencil: Handle<DepthStencilState>,
        blend: Handle<BlendState>,
    ) -> Result<Handle<RenderPipeline>> {
        validate::render_pipeline(desc)?;
        self.ensure_alive()?;

        let mut reg = self.registry.lock();
        Self::shader_of_stage(&reg, desc.vertex_shader, ShaderStage::Vertex)?;
        if let Some(fs) = desc.fragment_shader {
            Self::shader_of_stage(&reg, fs, ShaderStage::Fragment)?;
        }
        let raster_desc = reg
            .rasterizer_states
            .get_ref(rasterizer)
            .map(|s| s.desc)
            .ok_or(GPUError::InvalidHandle("rasterizer state"))?;
        let ds_desc = reg
            .depth_stencil_states
            .get_ref(depth_stencil)
            .map(|s| s.desc)
            .ok_or(GPUError::InvalidHandle("depth-stencil state"))?;
        let blend_desc = reg
            .blend_states
            .get_ref(blend)
            .map(|s| s.desc)
            .ok_or(GPUError::InvalidHandle("blend state"))?;

        let info = RenderPipelineInfo {
            vertex_shader: desc.vertex_shader,
            fragment_shader: desc.fragment_shader,
            attributes: &desc.vertex_attributes,
            topology: desc.primitive_topology,
            patch_control_points: desc.patch_control_points,
            rasterizer: &raster_desc,
            depth_stencil: &ds_desc,
            blend: &blend_desc,
            color_formats: &desc.color_formats,
            depth_stencil_format: desc.depth_stencil_format,
            sample_count: desc.sample_count,
        };
        let record = RenderPipeline {
            vertex_shader: desc.vertex_shader,
            fragment_shader: desc.fragment_shader,
            attributes: desc.vertex_attributes.iter().copied().collect(),
            topology: desc.primitive_topology,
            patch_control_points: desc.patch_control_points,
            rasterizer,
            depth_stencil,
            blend,
        };
        track(&mut reg.render_pipelines, record, "render pipeline", |h| {
            self.native.create_render_pipeline(h, &info)
        })
    }

    pub(crate) fn create_compute_pipeline(
        &self,
        desc: &ComputePipelineDescriptor,
    ) -> Result<Handle<ComputePipeline>> {
        self.ensure_alive()?;
        let mut reg = self.registry.lock();
        Self::shader_of_stage(&reg, desc.shader, ShaderStage::Compute)?;
        let record = ComputePipeline { shader: desc.shader };
        track(&mut reg.compute_pipelines, record, "compute pipeline", |h| {
            self.native.create_compute_pipeline(h, desc.shader)
        })
    }

    pub(crate) fn render_pipeline(&self, pipeline: Handle<RenderPipeline>) -> Option<RenderPipeline> {
        self.registry.lock().render_pipelines.get_ref(pipeline).cloned()
    }

    pub(crate) fn is_compute_pipeline_live(&self, pipeline: Handle<ComputePipeline>) -> bool {
        self.registry.lock().compute_pipelines.is_live(pipeline)
    }

    //===------------------------------------------------------------------===//
    // Destruction
    //===------------------------------------------------------------------===//

    pub(crate) fn destroy_buffer(&self, buffer: Handle<Buffer>) -> Result<()> {
        let mut reg = self.registry.lock();
        reg.buffers
            .release(buffer)
            .ok_or(GPUError::InvalidHandle("buffer"))?;
        reg.frames.defer(DeferredRelease::Buffer(buffer));
        Ok(())
    }

    pub(crate) fn destroy_texture(&self, texture: Handle<Texture>) -> Result<()> {
        let mut reg = self.registry.lock();
        match reg.textures.get_ref(texture).map(|t| t.owner) {
            None => return Err(GPUError::InvalidHandle("texture")),
            Some(TextureOwner::SwapChain) => {
                return Err(GPUError::InvalidHandle("swap-chain texture"))
            }
            Some(TextureOwner::User) => {}
        }
        let Some(mut record) = reg.textures.release(texture) else {
            return Err(GPUError::InvalidHandle("texture"));
        };
        for view in record.views.clear() {
            if reg.views.release(view).is_some() {
                reg.frames.defer(DeferredRelease::TextureView(view));
            }
        }
        reg.frames.defer(DeferredRelease::Texture(texture));
        Ok(())
    }

    pub(crate) fn destroy_sampler(&self, sampler: Handle<Sampler>) -> Result<()> {
        let mut reg = self.registry.lock();
        match reg.samplers.get_ref(sampler) {
            None => return Err(GPUError::InvalidHandle("sampler")),
            Some(s) if s.device_owned => return Err(GPUError::InvalidHandle("device-owned sampler")),
            Some(_) => {}
        }
        reg.samplers.release(sampler);
        reg.frames.defer(DeferredRelease::Sampler(sampler));
        Ok(())
    }

    pub(crate) fn destroy_framebuffer(&self, framebuffer: Handle<Framebuffer>) -> Result<()> {
        self.registry
            .lock()
            .framebuffers
            .release(framebuffer)
            .map(|_| ())
            .ok_or(GPUError::InvalidHandle("framebuffer"))
    }

    pub(crate) fn destroy_shader(&self, shader: Handle<Shader>) -> Result<()> {
        let mut reg = self.registry.lock();
        reg.shaders
            .release(shader)
            .ok_or(GPUError::InvalidHandle("shader"))?;
        reg.frames.defer(DeferredRelease::Shader(shader));
        Ok(())
    }

    pub(crate) fn destroy_render_pipeline(&self, pipeline: Handle<RenderPipeline>) -> Result<()> {
        let mut reg = self.registry.lock();
        reg.render_pipelines
            .release(pipeline)
            .ok_or(GPUError::InvalidHandle("render pipeline"))?;
        reg.frames.defer(DeferredRelease::RenderPipeline(pipeline));
        Ok(())
    }

    pub(crate) fn destroy_compute_pipeline(&self, pipeline: Handle<ComputePipeline>) -> Result<()> {
        let mut reg = self.registry.lock();
        reg.compute_pipelines
            .release(pipeline)
            .ok_or(GPUError::InvalidHandle("compute pipeline"))?;
        reg.frames.defer(DeferredRelease::ComputePipeline(pipeline));
        Ok(())
    }

    //===------------------------------------------------------------------===//
    // Swap-chain images
    //===------------------------------------------------------------------===//

    pub(crate) fn wrap_back_buffer(&self, desc: TextureDescriptor, index: u32) -> Result<Handle<Texture>> {
        let mut reg = self.registry.lock();
        let record = Texture {
            desc,
            views: Default::default(),
            owner: TextureOwner::SwapChain,
        };
        track(&mut reg.textures, record, "back buffer", |h| {
            self.native.wrap_back_buffer(h, index)
        })
    }

    /// Immediately tears down a swap-chain texture and its cached views.
    /// Callers make sure the GPU is idle first.
    pub(crate) fn release_swap_chain_texture(&self, texture: Handle<Texture>, back_buffer: bool) {
        let mut reg = self.registry.lock();
        let Some(mut record) = reg.textures.release(texture) else {
            return;
        };
        for view in record.views.clear() {
            if reg.views.release(view).is_some() {
                self.native.destroy_texture_view(view);
            }
        }
        if back_buffer {
            self.native.release_back_buffer(texture);
        } else {
            self.native.destroy_texture(texture);
        }
    }

    //===------------------------------------------------------------------===//
    // Teardown
    //===------------------------------------------------------------------===//

    /// Runs every deferred release still queued in the frame ring.
    pub(crate) fn drain_deferred(&self) {
        let released = self.registry.lock().frames.drain_all();
        for release in released {
            release.release(&self.native);
        }
    }

    /// Destroys every tracked resource. Returns how many of them were user
    /// resources the caller never destroyed.
    pub(crate) fn destroy_all(&self) -> usize {
        let mut reg = self.registry.lock();
        let native = &self.native;
        let mut leaked = 0;

        for (h, _) in reg.render_pipelines.drain() {
            leaked += 1;
            native.destroy_render_pipeline(h);
        }
        for (h, _) in reg.compute_pipelines.drain() {
            leaked += 1;
            native.destroy_compute_pipeline(h);
        }
        for (h, _) in reg.shaders.drain() {
            leaked += 1;
            native.destroy_shader(h);
        }
        leaked += reg.framebuffers.drain().len();

        for (h, mut texture) in reg.textures.drain() {
            for view in texture.views.clear() {
                if reg.views.release(view).is_some() {
                    native.destroy_texture_view(view);
                }
            }
            match texture.owner {
                TextureOwner::User => {
                    leaked += 1;
                    native.destroy_texture(h);
                }
                TextureOwner::SwapChain => native.release_back_buffer(h),
            }
        }
        for (h, _) in reg.views.drain() {
            native.destroy_texture_view(h);
        }
        for (h, _) in reg.buffers.drain() {
            leaked += 1;
            native.destroy_buffer(h);
        }
        for (h, sampler) in reg.samplers.drain() {
            if !sampler.device_owned {
                leaked += 1;
            }
            native.destroy_sampler(h);
        }

        for (h, _) in reg.input_layouts.drain() {
            native.destroy_input_layout(h);
        }
        for (h, _) in reg.rasterizer_states.drain() {
            native.destroy_rasterizer_state(h);
        }
        for (h, _) in reg.depth_stencil_states.drain() {
            native.destroy_depth_stencil_state(h);
        }
        for (h, _) in reg.blend_states.drain() {
            native.destroy_blend_state(h);
        }
        reg.rasterizer_cache.clear();
        reg.depth_stencil_cache.clear();
        reg.blend_cache.clear();
        reg.input_layout_cache.clear();

        leaked
    }
}
