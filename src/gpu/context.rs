//! Command contexts: the state machine that turns a stream of setters into
//! the minimal set of native calls.
//!
//! Setters only touch local tracked state and never fail. Everything is
//! pushed to the native recorder by [`CommandContext::flush_render_state`],
//! which every draw runs first. A category's dirty flag is cleared only once
//! its native call went through, so a failed flush can simply be retried.

use std::sync::Arc;

use smallvec::SmallVec;

use super::driver::state::{
    build_input_layout, IndexBufferBinding, LastApplied, Tracked, VertexBufferBinding,
    VertexBufferState,
};
use super::driver::types::ClearFlags;
use super::error::{GPUError, Result};
use super::native::NativeCommands;
use super::registry::DeviceShared;
use super::resources::*;
use super::structs::*;
use crate::utils::Handle;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ContextState {
    #[default]
    Idle,
    InRenderPass,
}

/// Records commands against one device.
///
/// A context is `Send` but not `Sync`: record from one thread at a time.
/// Contexts created before a device loss keep failing with
/// [`GPUError::DeviceLost`]; create new ones from the recovered device.
pub struct CommandContext {
    shared: Arc<DeviceShared>,
    native: NativeCommands,
    state: ContextState,
    attachment_count: u32,

    pipeline: Option<Handle<RenderPipeline>>,
    /// Snapshot of the bound pipeline, taken at `set_pipeline`.
    bound: Option<RenderPipeline>,
    compute_pipeline: Option<Handle<ComputePipeline>>,

    vertex_buffers: VertexBufferState,
    index_buffer: Tracked<Option<IndexBufferBinding>>,
    topology: Tracked<PrimitiveTopology>,
    viewports: Tracked<SmallVec<[Viewport; MAX_VIEWPORTS_AND_SCISSORS]>>,
    scissors: Tracked<SmallVec<[Rect; MAX_VIEWPORTS_AND_SCISSORS]>>,
    stencil_reference: Tracked<u32>,
    blend_color: Tracked<[f32; 4]>,

    applied_pipeline: LastApplied<Handle<RenderPipeline>>,
    applied_compute: LastApplied<Handle<ComputePipeline>>,
    applied_layout: LastApplied<Handle<InputLayout>>,
    applied_rasterizer: LastApplied<Handle<RasterizerState>>,
    applied_depth_stencil: LastApplied<Handle<DepthStencilState>>,
    applied_blend: LastApplied<Handle<BlendState>>,

    fence: u64,
}

impl CommandContext {
    pub(crate) fn new(shared: Arc<DeviceShared>) -> Result<Self> {
        shared.ensure_alive()?;
        let native = shared.native.create_commands()?;

        let mut topology = Tracked::new(PrimitiveTopology::default());
        let mut stencil_reference = Tracked::new(0);
        let mut blend_color = Tracked::new([0.0; 4]);
        // Native defaults are unknown until the first flush pushes ours.
        topology.invalidate();
        stencil_reference.invalidate();
        blend_color.invalidate();

        Ok(Self {
            shared,
            native,
            state: ContextState::Idle,
            attachment_count: 0,
            pipeline: None,
            bound: None,
            compute_pipeline: None,
            vertex_buffers: VertexBufferState::default(),
            index_buffer: Tracked::new(None),
            topology,
            viewports: Tracked::new(SmallVec::new()),
            scissors: Tracked::new(SmallVec::new()),
            stencil_reference,
            blend_color,
            applied_pipeline: LastApplied::default(),
            applied_compute: LastApplied::default(),
            applied_layout: LastApplied::default(),
            applied_rasterizer: LastApplied::default(),
            applied_depth_stencil: LastApplied::default(),
            applied_blend: LastApplied::default(),
            fence: 0,
        })
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    /// Color plus depth-stencil attachments bound by the active render pass.
    pub fn attachment_count(&self) -> u32 {
        self.attachment_count
    }

    /// Last fence value returned by [`CommandContext::flush`].
    pub fn fence_value(&self) -> u64 {
        self.fence
    }

    pub fn pipeline(&self) -> Option<Handle<RenderPipeline>> {
        self.pipeline
    }

    pub fn vertex_buffer(&self, slot: usize) -> Option<&VertexBufferBinding> {
        (slot < MAX_VERTEX_BUFFER_BINDINGS).then(|| self.vertex_buffers.binding(slot))
    }

    pub fn dirty_vertex_slots(&self) -> u32 {
        self.vertex_buffers.dirty_slots()
    }

    pub fn is_input_layout_dirty(&self) -> bool {
        self.vertex_buffers.is_layout_dirty()
    }

    pub fn primitive_topology(&self) -> PrimitiveTopology {
        *self.topology.get()
    }

    pub fn viewports(&self) -> &[Viewport] {
        self.viewports.get()
    }

    pub fn scissors(&self) -> &[Rect] {
        self.scissors.get()
    }

    fn check_alive(&self) -> Result<()> {
        self.shared.ensure_alive()
    }

    //===------------------------------------------------------------------===//
    // Setters
    //===------------------------------------------------------------------===//

    pub fn set_pipeline(&mut self, pipeline: Handle<RenderPipeline>) {
        if self.pipeline == Some(pipeline) {
            return;
        }
        let snapshot = self.shared.render_pipeline(pipeline);
        if let Some(next) = &snapshot {
            let layout_changed = match &self.bound {
                Some(prev) => {
                    prev.attributes != next.attributes || prev.vertex_shader != next.vertex_shader
                }
                None => true,
            };
            if layout_changed {
                self.vertex_buffers.invalidate_layout();
            }
            let control_points_changed = next.topology == PrimitiveTopology::PatchList
                && self.bound.as_ref().map(|prev| prev.patch_control_points)
                    != Some(next.patch_control_points);
            if !self.topology.set(next.topology) && control_points_changed {
                // Same topology, but the control-point count is applied with it.
                self.topology.invalidate();
            }
        }
        self.pipeline = Some(pipeline);
        self.bound = snapshot;
    }

    pub fn set_vertex_buffer(
        &mut self,
        slot: u32,
        buffer: Option<Handle<Buffer>>,
        offset: u64,
        stride: u32,
        input_rate: VertexInputRate,
    ) {
        let slot = slot as usize;
        if slot >= MAX_VERTEX_BUFFER_BINDINGS {
            log::warn!("vertex buffer slot {slot} ignored, only {MAX_VERTEX_BUFFER_BINDINGS} slots exist");
            return;
        }
        self.vertex_buffers.set(
            slot,
            VertexBufferBinding {
                buffer,
                offset,
                stride,
                input_rate,
            },
        );
    }

    pub fn set_index_buffer(&mut self, buffer: Handle<Buffer>, offset: u64, index_type: IndexType) {
        self.index_buffer.set(Some(IndexBufferBinding {
            buffer,
            offset,
            index_type,
        }));
    }

    /// Overrides the bound pipeline's topology until the next pipeline change.
    pub fn set_primitive_topology(&mut self, topology: PrimitiveTopology) {
        self.topology.set(topology);
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.set_viewports(&[viewport]);
    }

    /// Extra viewports past the sixteenth are dropped.
    pub fn set_viewports(&mut self, viewports: &[Viewport]) {
        let count = viewports.len().min(MAX_VIEWPORTS_AND_SCISSORS);
        self.viewports.set(SmallVec::from_slice(&viewports[..count]));
    }

    pub fn set_scissor(&mut self, scissor: Rect) {
        self.set_scissors(&[scissor]);
    }

    pub fn set_scissors(&mut self, scissors: &[Rect]) {
        let count = scissors.len().min(MAX_VIEWPORTS_AND_SCISSORS);
        self.scissors.set(SmallVec::from_slice(&scissors[..count]));
    }

    pub fn set_stencil_reference(&mut self, reference: u32) {
        self.stencil_reference.set(reference);
    }

    pub fn set_blend_color(&mut self, color: [f32; 4]) {
        self.blend_color.set(color);
    }

    pub fn set_compute_pipeline(&mut self, pipeline: Handle<ComputePipeline>) {
        self.compute_pipeline = Some(pipeline);
    }

    //===------------------------------------------------------------------===//
    // Flush
    //===------------------------------------------------------------------===//

    /// Pushes every dirty category to the native recorder.
    ///
    /// Order: viewports and scissors, vertex-buffer runs, input layout,
    /// pipeline and its state objects, topology, stencil reference, blend
    /// color, index buffer.
    pub fn flush_render_state(&mut self) -> Result<()> {
        self.check_alive()?;

        if self.viewports.is_dirty() {
            self.native.set_viewports(self.viewports.get())?;
            self.viewports.clear();
        }
        if self.scissors.is_dirty() {
            self.native.set_scissors(self.scissors.get())?;
            self.scissors.clear();
        }

        for (first, count) in self.vertex_buffers.dirty_ranges() {
            let start = first as usize;
            let run = &self.vertex_buffers.bindings()[start..start + count as usize];
            self.native.set_vertex_buffers(first, run)?;
            self.vertex_buffers.clear_slots(first, count);
        }

        let Some(bound) = &self.bound else {
            if self.pipeline.is_some() {
                return Err(GPUError::InvalidHandle("render pipeline"));
            }
            return self.flush_fixed_state();
        };

        if self.vertex_buffers.is_layout_dirty() {
            let desc = build_input_layout(
                bound.vertex_shader,
                &bound.attributes,
                self.vertex_buffers.bindings(),
            );
            let layout = self.shared.input_layout(&desc)?;
            if self.applied_layout.differs(layout) {
                self.native.set_input_layout(Some(layout))?;
                self.applied_layout.record(layout);
            }
            self.vertex_buffers.clear_layout();
        }

        if let Some(pipeline) = self.pipeline {
            if self.applied_pipeline.differs(pipeline) {
                if !self.shared.registry.lock().render_pipelines.is_live(pipeline) {
                    return Err(GPUError::InvalidHandle("render pipeline"));
                }
                self.native.set_render_pipeline(pipeline)?;
                self.applied_pipeline.record(pipeline);
            }
        }
        if self.applied_rasterizer.differs(bound.rasterizer) {
            self.native.set_rasterizer_state(bound.rasterizer)?;
            self.applied_rasterizer.record(bound.rasterizer);
        }
        if self.applied_depth_stencil.differs(bound.depth_stencil) {
            self.native.set_depth_stencil_state(bound.depth_stencil)?;
            self.applied_depth_stencil.record(bound.depth_stencil);
        }
        if self.applied_blend.differs(bound.blend) {
            self.native.set_blend_state(bound.blend)?;
            self.applied_blend.record(bound.blend);
        }

        self.flush_fixed_state()
    }

    fn flush_fixed_state(&mut self) -> Result<()> {
        if self.topology.is_dirty() {
            let topology = *self.topology.get();
            let patch_control_points = match (&self.bound, topology) {
                (Some(bound), PrimitiveTopology::PatchList) => bound.patch_control_points,
                _ => 0,
            };
            self.native.set_primitive_topology(topology, patch_control_points)?;
            self.topology.clear();
        }
        if self.stencil_reference.is_dirty() {
            self.native.set_stencil_reference(*self.stencil_reference.get())?;
            self.stencil_reference.clear();
        }
        if self.blend_color.is_dirty() {
            self.native.set_blend_constants(*self.blend_color.get())?;
            self.blend_color.clear();
        }
        if self.index_buffer.is_dirty() {
            self.native.set_index_buffer(*self.index_buffer.get())?;
            self.index_buffer.clear();
        }
        Ok(())
    }

    //===------------------------------------------------------------------===//
    // Draw and dispatch
    //===------------------------------------------------------------------===//

    fn check_draw(&self) -> Result<()> {
        if self.state != ContextState::InRenderPass {
            return Err(GPUError::InvalidState("draw outside a render pass"));
        }
        if self.pipeline.is_none() {
            return Err(GPUError::InvalidState("draw without a bound pipeline"));
        }
        Ok(())
    }

    pub fn draw(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) -> Result<()> {
        self.check_draw()?;
        if vertex_count == 0 || instance_count == 0 {
            return Ok(());
        }
        self.flush_render_state()?;
        self.native
            .draw(vertex_count, instance_count, first_vertex, first_instance)
    }

    pub fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        base_vertex: i32,
        first_instance: u32,
    ) -> Result<()> {
        self.check_draw()?;
        if self.index_buffer.get().is_none() {
            return Err(GPUError::InvalidState("indexed draw without an index buffer"));
        }
        if index_count == 0 || instance_count == 0 {
            return Ok(());
        }
        self.flush_render_state()?;
        self.native.draw_indexed(
            index_count,
            instance_count,
            first_index,
            base_vertex,
            first_instance,
        )
    }

    pub fn dispatch(&mut self, x: u32, y: u32, z: u32) -> Result<()> {
        if self.state != ContextState::Idle {
            return Err(GPUError::InvalidState("dispatch inside a render pass"));
        }
        let pipeline = self
            .compute_pipeline
            .ok_or(GPUError::InvalidState("dispatch without a compute pipeline"))?;
        if x == 0 || y == 0 || z == 0 {
            return Ok(());
        }
        self.check_alive()?;
        if self.applied_compute.differs(pipeline) {
            if !self.shared.is_compute_pipeline_live(pipeline) {
                return Err(GPUError::InvalidHandle("compute pipeline"));
            }
            self.native.set_compute_pipeline(pipeline)?;
            self.applied_compute.record(pipeline);
        }
        self.native.dispatch(x, y, z)
    }

    //===------------------------------------------------------------------===//
    // Render passes
    //===------------------------------------------------------------------===//

    pub fn begin_render_pass(
        &mut self,
        framebuffer: Handle<Framebuffer>,
        desc: &RenderPassBeginDescriptor,
    ) -> Result<()> {
        if self.state != ContextState::Idle {
            return Err(GPUError::InvalidState("render pass already active"));
        }
        self.check_alive()?;
        let fb = self.shared.framebuffer_targets(framebuffer)?;

        let mut ds_flags = ClearFlags::empty();
        if let Some(ds) = &fb.depth_stencil {
            let action = &desc.depth_stencil;
            if action.depth_load_action == LoadAction::Clear && ds.format.has_depth() {
                ds_flags |= ClearFlags::DEPTH;
            }
            if action.stencil_load_action == LoadAction::Clear {
                if ds.format.has_stencil() {
                    ds_flags |= ClearFlags::STENCIL;
                } else if self.shared.validation {
                    return Err(GPUError::validation(format!(
                        "stencil clear requested on {:?}, which has no stencil aspect",
                        ds.format
                    )));
                } else {
                    log::warn!(
                        "dropping stencil clear on {:?}, which has no stencil aspect",
                        ds.format
                    );
                }
            }
        }

        let colors: SmallVec<[Handle<TextureView>; MAX_COLOR_ATTACHMENTS]> =
            fb.colors.iter().map(|target| target.view).collect();
        let depth_view = fb.depth_stencil.map(|target| target.view);
        self.native
            .set_render_targets(&colors, depth_view, fb.width, fb.height)?;
        if let Err(err) = self.clear_attachments(&fb, desc, ds_flags) {
            // No targets stay bound for a pass that never began.
            if let Err(unbind) = self.native.set_render_targets(&[], None, 0, 0) {
                log::error!("unbinding render targets after a failed clear: {unbind}");
            }
            return Err(err);
        }

        let pick = |requested: u32, native: u32| {
            if requested == 0 {
                native
            } else {
                requested.min(native)
            }
        };
        let width = pick(desc.render_target_width, fb.width);
        let height = pick(desc.render_target_height, fb.height);
        self.set_viewport(Viewport::from_size(width, height));
        self.set_scissor(Rect::from_size(width, height));

        self.state = ContextState::InRenderPass;
        self.attachment_count = colors.len() as u32 + depth_view.is_some() as u32;
        Ok(())
    }

    fn clear_attachments(
        &mut self,
        fb: &Framebuffer,
        desc: &RenderPassBeginDescriptor,
        ds_flags: ClearFlags,
    ) -> Result<()> {
        for (index, (target, action)) in fb.colors.iter().zip(desc.colors.iter()).enumerate() {
            if action.load_action == LoadAction::Clear {
                self.native
                    .clear_render_target(index as u32, target.view, action.clear_color)?;
            }
        }
        if let Some(target) = &fb.depth_stencil {
            if !ds_flags.is_empty() {
                self.native.clear_depth_stencil(
                    target.view,
                    ds_flags,
                    desc.depth_stencil.clear_depth,
                    desc.depth_stencil.clear_stencil,
                )?;
            }
        }
        Ok(())
    }

    pub fn end_render_pass(&mut self) -> Result<()> {
        if self.state != ContextState::InRenderPass {
            return Err(GPUError::InvalidState("no render pass to end"));
        }
        self.check_alive()?;
        self.native.set_render_targets(&[], None, 0, 0)?;
        self.state = ContextState::Idle;
        self.attachment_count = 0;
        Ok(())
    }

    //===------------------------------------------------------------------===//
    // Submission
    //===------------------------------------------------------------------===//

    /// Submits everything recorded so far and returns the fence value that
    /// retires with it. With `wait`, blocks until it has.
    pub fn flush(&mut self, wait: bool) -> Result<u64> {
        self.check_alive()?;
        let fence = self.fence + 1;
        self.native.submit(fence)?;
        self.fence = fence;
        if wait {
            self.native.wait(fence)?;
        }
        Ok(fence)
    }

    pub(crate) fn wait_for(&mut self, fence: u64) -> Result<()> {
        if fence == 0 {
            return Ok(());
        }
        self.native.wait(fence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::backend::Backend;
    use crate::gpu::empty::NativeCall;
    use crate::gpu::native::NativeDevice;
    use crate::gpu::registry::ResourceRegistry;

    fn shared() -> Arc<DeviceShared> {
        let desc = DeviceDescriptor::with_backend(Backend::Empty);
        let native = NativeDevice::create(Backend::Empty, &desc).unwrap();
        Arc::new(DeviceShared::new(
            Backend::Empty,
            false,
            native,
            ResourceRegistry::new(3),
        ))
    }

    fn calls(shared: &DeviceShared) -> Vec<NativeCall> {
        match &shared.native {
            NativeDevice::Empty(d) => d.take_calls(),
            #[allow(unreachable_patterns)]
            _ => unreachable!(),
        }
    }

    #[test]
    fn fixed_state_is_pushed_once() {
        let shared = shared();
        let mut ctx = CommandContext::new(shared.clone()).unwrap();
        ctx.flush_render_state().unwrap();
        let first = calls(&shared);
        assert!(first
            .iter()
            .any(|c| matches!(c, NativeCall::SetPrimitiveTopology { .. })));
        assert!(first
            .iter()
            .any(|c| matches!(c, NativeCall::SetStencilReference(0))));

        ctx.flush_render_state().unwrap();
        assert!(calls(&shared).is_empty());
    }

    #[test]
    fn topology_dedup_ignores_equal_values() {
        let shared = shared();
        let mut ctx = CommandContext::new(shared.clone()).unwrap();
        ctx.flush_render_state().unwrap();
        calls(&shared);

        ctx.set_primitive_topology(PrimitiveTopology::TriangleList);
        ctx.flush_render_state().unwrap();
        assert!(calls(&shared).is_empty());

        ctx.set_primitive_topology(PrimitiveTopology::LineList);
        ctx.flush_render_state().unwrap();
        assert_eq!(
            calls(&shared),
            vec![NativeCall::SetPrimitiveTopology {
                topology: PrimitiveTopology::LineList,
                patch_control_points: 0,
            }]
        );
    }

    #[test]
    fn lost_device_fails_native_calls() {
        let shared = shared();
        let mut ctx = CommandContext::new(shared.clone()).unwrap();
        shared.mark_lost();
        assert_eq!(ctx.flush(false), Err(GPUError::DeviceLost));
        assert_eq!(ctx.flush_render_state(), Err(GPUError::DeviceLost));
        ctx.set_viewport(Viewport::from_size(4, 4));
        assert_eq!(ctx.viewports().len(), 1);
    }
}
