use std::collections::VecDeque;
use std::sync::Arc;

use ash::vk;
use log::warn;
use smallvec::SmallVec;

use super::error::creation;
use super::{image_barrier, Inner, VariantKey, VkView};
use crate::gpu::driver::state::{IndexBufferBinding, VertexBufferBinding};
use crate::gpu::driver::types::ClearFlags;
use crate::gpu::error::{GPUError, Result};
use crate::gpu::resources::*;
use crate::gpu::structs::*;
use crate::utils::Handle;

struct Targets {
    colors: SmallVec<[VkView; MAX_COLOR_ATTACHMENTS]>,
    depth_stencil: Option<VkView>,
    extent: vk::Extent2D,
}

impl Targets {
    fn area(&self) -> vk::Rect2D {
        vk::Rect2D {
            offset: vk::Offset2D::default(),
            extent: self.extent,
        }
    }
}

fn attachment(view: &VkView) -> vk::RenderingAttachmentInfo {
    // Clears are recorded explicitly, so every pass loads and stores.
    vk::RenderingAttachmentInfo::builder()
        .image_view(view.raw)
        .image_layout(vk::ImageLayout::GENERAL)
        .load_op(vk::AttachmentLoadOp::LOAD)
        .store_op(vk::AttachmentStoreOp::STORE)
        .build()
}

/// Recorder half of the Vulkan backend.
///
/// Keeps a copy of the state it was given so a fresh command buffer can be
/// brought back to the same point after every submit, and a timeline
/// semaphore whose value is the crate's fence value.
pub struct VulkanCommands {
    inner: Arc<Inner>,
    pool: vk::CommandPool,
    cmd: vk::CommandBuffer,
    timeline: vk::Semaphore,
    last_submitted: u64,
    in_flight: VecDeque<(u64, vk::CommandBuffer)>,
    free: Vec<vk::CommandBuffer>,

    targets: Option<Targets>,
    rendering: bool,
    viewports: SmallVec<[vk::Viewport; MAX_VIEWPORTS_AND_SCISSORS]>,
    scissors: SmallVec<[vk::Rect2D; MAX_VIEWPORTS_AND_SCISSORS]>,
    vertex_buffers: Option<[(vk::Buffer, vk::DeviceSize); MAX_VERTEX_BUFFER_BINDINGS]>,
    index_buffer: Option<(vk::Buffer, vk::DeviceSize, vk::IndexType)>,
    input_layout: Option<Handle<InputLayout>>,
    topology: PrimitiveTopology,
    pipeline: Option<Handle<RenderPipeline>>,
    bound_graphics: vk::Pipeline,
    bound_compute: vk::Pipeline,
    stencil_reference: u32,
    blend_constants: [f32; 4],
}

impl VulkanCommands {
    pub(super) fn new(inner: Arc<Inner>) -> Result<Self> {
        let device = &inner.device;
        let pool = unsafe {
            device.create_command_pool(
                &vk::CommandPoolCreateInfo::builder()
                    .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
                    .queue_family_index(inner.queue_family),
                None,
            )
        }
        .map_err(creation("command pool"))?;

        let mut timeline_type = vk::SemaphoreTypeCreateInfo::builder()
            .semaphore_type(vk::SemaphoreType::TIMELINE)
            .initial_value(0)
            .build();
        let timeline = match unsafe {
            device.create_semaphore(
                &vk::SemaphoreCreateInfo::builder().push_next(&mut timeline_type),
                None,
            )
        } {
            Ok(semaphore) => semaphore,
            Err(res) => {
                unsafe { device.destroy_command_pool(pool, None) };
                return Err(creation("timeline semaphore")(res));
            }
        };

        let mut commands = Self {
            inner,
            pool,
            cmd: vk::CommandBuffer::null(),
            timeline,
            last_submitted: 0,
            in_flight: VecDeque::new(),
            free: Vec::new(),
            targets: None,
            rendering: false,
            viewports: SmallVec::new(),
            scissors: SmallVec::new(),
            vertex_buffers: None,
            index_buffer: None,
            input_layout: None,
            topology: PrimitiveTopology::default(),
            pipeline: None,
            bound_graphics: vk::Pipeline::null(),
            bound_compute: vk::Pipeline::null(),
            stencil_reference: 0,
            blend_constants: [0.0; 4],
        };
        // Dropping `commands` releases the pool and the semaphore.
        commands.restart()?;
        Ok(commands)
    }

    fn device(&self) -> &ash::Device {
        &self.inner.device
    }

    /// Moves command buffers whose submission retired back to the free list.
    fn recycle(&mut self) {
        let completed = match unsafe { self.inner.device.get_semaphore_counter_value(self.timeline) } {
            Ok(value) => value,
            Err(_) => return,
        };
        while let Some(&(fence, cmd)) = self.in_flight.front() {
            if fence > completed {
                break;
            }
            self.in_flight.pop_front();
            self.free.push(cmd);
        }
    }

    /// Starts a new command buffer and replays the cached state into it.
    fn restart(&mut self) -> Result<()> {
        self.recycle();
        let cmd = match self.free.pop() {
            Some(cmd) => cmd,
            None => unsafe {
                self.device().allocate_command_buffers(
                    &vk::CommandBufferAllocateInfo::builder()
                        .command_pool(self.pool)
                        .level(vk::CommandBufferLevel::PRIMARY)
                        .command_buffer_count(1),
                )
            }
            .map_err(creation("command buffer"))?
            .into_iter()
            .next()
            .ok_or_else(|| GPUError::creation("driver returned no command buffer"))?,
        };
        unsafe {
            self.device().begin_command_buffer(
                cmd,
                &vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT),
            )
        }?;
        self.cmd = cmd;
        self.bound_graphics = vk::Pipeline::null();

        let device = &self.inner.device;
        unsafe {
            if !self.viewports.is_empty() {
                device.cmd_set_viewport_with_count(cmd, &self.viewports);
            }
            if !self.scissors.is_empty() {
                device.cmd_set_scissor_with_count(cmd, &self.scissors);
            }
            device.cmd_set_stencil_reference(cmd, vk::StencilFaceFlags::FRONT_AND_BACK, self.stencil_reference);
            device.cmd_set_blend_constants(cmd, &self.blend_constants);
            if let Some(slots) = &self.vertex_buffers {
                let buffers: SmallVec<[vk::Buffer; MAX_VERTEX_BUFFER_BINDINGS]> =
                    slots.iter().map(|(buffer, _)| *buffer).collect();
                let offsets: SmallVec<[vk::DeviceSize; MAX_VERTEX_BUFFER_BINDINGS]> =
                    slots.iter().map(|(_, offset)| *offset).collect();
                device.cmd_bind_vertex_buffers(cmd, 0, &buffers, &offsets);
            }
            if let Some((buffer, offset, index_type)) = self.index_buffer {
                device.cmd_bind_index_buffer(cmd, buffer, offset, index_type);
            }
            if self.bound_compute != vk::Pipeline::null() {
                device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::COMPUTE, self.bound_compute);
            }
        }
        if self.targets.is_some() {
            self.begin_rendering();
        }
        Ok(())
    }

    fn begin_rendering(&mut self) {
        let Some(targets) = &self.targets else {
            return;
        };
        let colors: SmallVec<[vk::RenderingAttachmentInfo; MAX_COLOR_ATTACHMENTS]> =
            targets.colors.iter().map(attachment).collect();
        let depth = targets
            .depth_stencil
            .filter(|view| view.format.has_depth())
            .map(|view| attachment(&view));
        let stencil = targets
            .depth_stencil
            .filter(|view| view.format.has_stencil())
            .map(|view| attachment(&view));

        let mut info = vk::RenderingInfo::builder()
            .render_area(targets.area())
            .layer_count(1)
            .color_attachments(&colors);
        if let Some(depth) = depth.as_ref() {
            info = info.depth_attachment(depth);
        }
        if let Some(stencil) = stencil.as_ref() {
            info = info.stencil_attachment(stencil);
        }
        unsafe { self.inner.device.cmd_begin_rendering(self.cmd, &info) };
        self.rendering = true;
    }

    fn end_rendering(&mut self) {
        if self.rendering {
            unsafe { self.inner.device.cmd_end_rendering(self.cmd) };
            self.rendering = false;
        }
    }

    pub(crate) fn set_render_targets(
        &mut self,
        colors: &[Handle<TextureView>],
        depth_stencil: Option<Handle<TextureView>>,
        width: u32,
        height: u32,
    ) -> Result<()> {
        self.end_rendering();
        if colors.is_empty() && depth_stencil.is_none() {
            self.targets = None;
            return Ok(());
        }

        let targets = {
            let objects = self.inner.objects.lock();
            Targets {
                colors: colors
                    .iter()
                    .map(|view| objects.view(*view))
                    .collect::<Result<_>>()?,
                depth_stencil: depth_stencil.map(|view| objects.view(view)).transpose()?,
                extent: vk::Extent2D { width, height },
            }
        };
        for view in &targets.colors {
            if let Some(image) = self.inner.claim_back_buffer(view.texture) {
                image_barrier(
                    &self.inner.device,
                    self.cmd,
                    image,
                    vk::ImageAspectFlags::COLOR,
                    vk::ImageLayout::UNDEFINED,
                    vk::ImageLayout::GENERAL,
                );
            }
        }
        self.targets = Some(targets);
        self.begin_rendering();
        Ok(())
    }

    pub(crate) fn clear_render_target(&mut self, index: u32, view: Handle<TextureView>, color: Color) -> Result<()> {
        let value = vk::ClearColorValue {
            float32: color.to_array(),
        };
        if let (true, Some(targets)) = (self.rendering, &self.targets) {
            if (index as usize) < targets.colors.len() {
                let clear = vk::ClearAttachment {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    color_attachment: index,
                    clear_value: vk::ClearValue { color: value },
                };
                let rect = vk::ClearRect {
                    rect: targets.area(),
                    base_array_layer: 0,
                    layer_count: 1,
                };
                unsafe { self.device().cmd_clear_attachments(self.cmd, &[clear], &[rect]) };
                return Ok(());
            }
        }

        let target = self.inner.objects.lock().view(view)?;
        self.end_rendering();
        unsafe {
            self.device().cmd_clear_color_image(
                self.cmd,
                target.image,
                vk::ImageLayout::GENERAL,
                &value,
                &[target.range],
            )
        };
        if self.targets.is_some() {
            self.begin_rendering();
        }
        Ok(())
    }

    pub(crate) fn clear_depth_stencil(
        &mut self,
        view: Handle<TextureView>,
        flags: ClearFlags,
        depth: f32,
        stencil: u8,
    ) -> Result<()> {
        let target = self.inner.objects.lock().view(view)?;
        let mut aspect = vk::ImageAspectFlags::empty();
        if flags.contains(ClearFlags::DEPTH) {
            aspect |= target.aspect & vk::ImageAspectFlags::DEPTH;
        }
        if flags.contains(ClearFlags::STENCIL) {
            aspect |= target.aspect & vk::ImageAspectFlags::STENCIL;
        }
        if aspect.is_empty() {
            return Ok(());
        }
        let value = vk::ClearDepthStencilValue {
            depth,
            stencil: stencil as u32,
        };

        if let (true, Some(targets)) = (self.rendering, &self.targets) {
            if targets.depth_stencil.map(|ds| ds.raw) == Some(target.raw) {
                let clear = vk::ClearAttachment {
                    aspect_mask: aspect,
                    color_attachment: 0,
                    clear_value: vk::ClearValue { depth_stencil: value },
                };
                let rect = vk::ClearRect {
                    rect: targets.area(),
                    base_array_layer: 0,
                    layer_count: 1,
                };
                unsafe { self.device().cmd_clear_attachments(self.cmd, &[clear], &[rect]) };
                return Ok(());
            }
        }

        self.end_rendering();
        let range = vk::ImageSubresourceRange {
            aspect_mask: aspect,
            ..target.range
        };
        unsafe {
            self.device().cmd_clear_depth_stencil_image(
                self.cmd,
                target.image,
                vk::ImageLayout::GENERAL,
                &value,
                &[range],
            )
        };
        if self.targets.is_some() {
            self.begin_rendering();
        }
        Ok(())
    }

    pub(crate) fn set_viewports(&mut self, viewports: &[Viewport]) -> Result<()> {
        self.viewports = viewports.iter().map(vk::Viewport::from).collect();
        unsafe { self.device().cmd_set_viewport_with_count(self.cmd, &self.viewports) };
        Ok(())
    }

    pub(crate) fn set_scissors(&mut self, scissors: &[Rect]) -> Result<()> {
        self.scissors = scissors.iter().map(vk::Rect2D::from).collect();
        unsafe { self.device().cmd_set_scissor_with_count(self.cmd, &self.scissors) };
        Ok(())
    }

    pub(crate) fn set_vertex_buffers(&mut self, first_slot: u32, bindings: &[VertexBufferBinding]) -> Result<()> {
        let null = self.inner.null_vertex_buffer;
        let mut resolved: SmallVec<[(vk::Buffer, vk::DeviceSize); MAX_VERTEX_BUFFER_BINDINGS]> = SmallVec::new();
        {
            let objects = self.inner.objects.lock();
            for binding in bindings {
                resolved.push(match binding.buffer {
                    Some(buffer) => (objects.buffer(buffer)?, binding.offset),
                    None => (null, 0),
                });
            }
        }

        let slots = self
            .vertex_buffers
            .get_or_insert([(null, 0); MAX_VERTEX_BUFFER_BINDINGS]);
        for (i, entry) in resolved.iter().enumerate() {
            if let Some(slot) = slots.get_mut(first_slot as usize + i) {
                *slot = *entry;
            }
        }

        let buffers: SmallVec<[vk::Buffer; MAX_VERTEX_BUFFER_BINDINGS]> = resolved.iter().map(|r| r.0).collect();
        let offsets: SmallVec<[vk::DeviceSize; MAX_VERTEX_BUFFER_BINDINGS]> = resolved.iter().map(|r| r.1).collect();
        unsafe {
            self.device()
                .cmd_bind_vertex_buffers(self.cmd, first_slot, &buffers, &offsets)
        };
        Ok(())
    }

    pub(crate) fn set_index_buffer(&mut self, binding: Option<IndexBufferBinding>) -> Result<()> {
        let Some(binding) = binding else {
            // Vulkan has no unbind; indexed draws are rejected before they
            // reach the backend.
            self.index_buffer = None;
            return Ok(());
        };
        let buffer = self.inner.objects.lock().buffer(binding.buffer)?;
        let index_type = vk::IndexType::from(binding.index_type);
        self.index_buffer = Some((buffer, binding.offset, index_type));
        unsafe {
            self.device()
                .cmd_bind_index_buffer(self.cmd, buffer, binding.offset, index_type)
        };
        Ok(())
    }

    pub(crate) fn set_input_layout(&mut self, layout: Option<Handle<InputLayout>>) -> Result<()> {
        self.input_layout = layout;
        Ok(())
    }

    /// The patch size is baked into the pipeline.
    pub(crate) fn set_primitive_topology(&mut self, topology: PrimitiveTopology, _patch_control_points: u32) -> Result<()> {
        self.topology = topology;
        Ok(())
    }

    pub(crate) fn set_render_pipeline(&mut self, pipeline: Handle<RenderPipeline>) -> Result<()> {
        self.pipeline = Some(pipeline);
        Ok(())
    }

    pub(crate) fn set_compute_pipeline(&mut self, pipeline: Handle<ComputePipeline>) -> Result<()> {
        let raw = self.inner.objects.lock().compute_pipeline(pipeline)?;
        unsafe {
            self.device()
                .cmd_bind_pipeline(self.cmd, vk::PipelineBindPoint::COMPUTE, raw)
        };
        self.bound_compute = raw;
        Ok(())
    }

    // Fixed-function state objects are folded into the pipeline when it is
    // created, so binding them records nothing.

    pub(crate) fn set_rasterizer_state(&mut self, _state: Handle<RasterizerState>) -> Result<()> {
        Ok(())
    }

    pub(crate) fn set_depth_stencil_state(&mut self, _state: Handle<DepthStencilState>) -> Result<()> {
        Ok(())
    }

    pub(crate) fn set_blend_state(&mut self, _state: Handle<BlendState>) -> Result<()> {
        Ok(())
    }

    pub(crate) fn set_stencil_reference(&mut self, reference: u32) -> Result<()> {
        self.stencil_reference = reference;
        unsafe {
            self.device()
                .cmd_set_stencil_reference(self.cmd, vk::StencilFaceFlags::FRONT_AND_BACK, reference)
        };
        Ok(())
    }

    pub(crate) fn set_blend_constants(&mut self, color: [f32; 4]) -> Result<()> {
        self.blend_constants = color;
        unsafe { self.device().cmd_set_blend_constants(self.cmd, &color) };
        Ok(())
    }

    fn bind_graphics(&mut self) -> Result<()> {
        let pipeline = self
            .pipeline
            .ok_or(GPUError::InvalidState("draw without a render pipeline"))?;
        let variant = self.inner.pipeline_variant(VariantKey {
            pipeline,
            layout: self.input_layout,
            topology: self.topology,
        })?;
        if variant != self.bound_graphics {
            unsafe {
                self.device()
                    .cmd_bind_pipeline(self.cmd, vk::PipelineBindPoint::GRAPHICS, variant)
            };
            self.bound_graphics = variant;
        }
        Ok(())
    }

    pub(crate) fn draw(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) -> Result<()> {
        self.bind_graphics()?;
        unsafe {
            self.device()
                .cmd_draw(self.cmd, vertex_count, instance_count, first_vertex, first_instance)
        };
        Ok(())
    }

    pub(crate) fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        base_vertex: i32,
        first_instance: u32,
    ) -> Result<()> {
        self.bind_graphics()?;
        unsafe {
            self.device().cmd_draw_indexed(
                self.cmd,
                index_count,
                instance_count,
                first_index,
                base_vertex,
                first_instance,
            )
        };
        Ok(())
    }

    pub(crate) fn dispatch(&mut self, x: u32, y: u32, z: u32) -> Result<()> {
        unsafe { self.device().cmd_dispatch(self.cmd, x, y, z) };
        Ok(())
    }

    pub(crate) fn submit(&mut self, fence: u64) -> Result<()> {
        self.end_rendering();
        let cmd = self.cmd;
        let submitted = self.submit_buffer(cmd, fence);
        match submitted {
            Ok(()) => {
                self.in_flight.push_back((fence, cmd));
                self.last_submitted = fence;
            }
            Err(_) => self.free.push(cmd),
        }
        self.restart()?;
        submitted
    }

    fn submit_buffer(&self, cmd: vk::CommandBuffer, fence: u64) -> Result<()> {
        let device = &self.inner.device;
        unsafe { device.end_command_buffer(cmd) }?;

        // The first submit after an acquire waits for the image.
        let waits: SmallVec<[vk::Semaphore; 1]> = self.inner.take_acquire_wait().into_iter().collect();
        let wait_values: SmallVec<[u64; 1]> = waits.iter().map(|_| 0).collect();
        let wait_stages: SmallVec<[vk::PipelineStageFlags; 1]> =
            waits.iter().map(|_| vk::PipelineStageFlags::ALL_COMMANDS).collect();
        let signals = [self.timeline];
        let signal_values = [fence];
        let cmds = [cmd];

        let mut timeline = vk::TimelineSemaphoreSubmitInfo::builder()
            .wait_semaphore_values(&wait_values)
            .signal_semaphore_values(&signal_values)
            .build();
        let submit = vk::SubmitInfo::builder()
            .wait_semaphores(&waits)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&cmds)
            .signal_semaphores(&signals)
            .push_next(&mut timeline)
            .build();

        let queue = self.inner.queue.lock();
        unsafe { device.queue_submit(*queue, &[submit], vk::Fence::null()) }?;
        Ok(())
    }

    pub(crate) fn wait(&mut self, fence: u64) -> Result<()> {
        let semaphores = [self.timeline];
        let values = [fence];
        unsafe {
            self.device().wait_semaphores(
                &vk::SemaphoreWaitInfo::builder()
                    .semaphores(&semaphores)
                    .values(&values),
                u64::MAX,
            )
        }?;
        self.recycle();
        Ok(())
    }
}

impl Drop for VulkanCommands {
    fn drop(&mut self) {
        if self.last_submitted > 0 {
            if let Err(err) = self.wait(self.last_submitted) {
                warn!("command context dropped with unfinished work: {err}");
            }
        }
        unsafe {
            self.inner.device.destroy_semaphore(self.timeline, None);
            // Frees every command buffer allocated from it.
            self.inner.device.destroy_command_pool(self.pool, None);
        }
    }
}
