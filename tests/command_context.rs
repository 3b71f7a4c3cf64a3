mod common;

use common::*;
use dashi_hal::*;

fn vertex_runs(calls: &[NativeCall]) -> Vec<(u32, usize)> {
    calls
        .iter()
        .filter_map(|c| match c {
            NativeCall::SetVertexBuffers { first_slot, bindings } => Some((*first_slot, bindings.len())),
            _ => None,
        })
        .collect()
}

#[test]
fn second_flush_emits_nothing() {
    let device = empty_device();
    let pipeline = position_pipeline(&device);
    let vb = vertex_buffer(&device);
    let mut ctx = device.create_context().unwrap();

    ctx.set_pipeline(pipeline);
    ctx.set_vertex_buffer(0, Some(vb), 0, 12, VertexInputRate::Vertex);
    ctx.set_viewport(Viewport::from_size(64, 64));
    calls(&device);

    ctx.flush_render_state().unwrap();
    let first = calls(&device);
    assert!(first.contains(&NativeCall::SetRenderPipeline(pipeline)));
    assert!(first.iter().any(|c| matches!(c, NativeCall::SetInputLayout(Some(_)))));
    assert_eq!(vertex_runs(&first), vec![(0, 1)]);
    assert!(first.contains(&NativeCall::SetViewports(vec![Viewport::from_size(64, 64)])));

    ctx.flush_render_state().unwrap();
    assert!(calls(&device).is_empty());
}

#[test]
fn equal_setters_do_not_dirty() {
    let device = empty_device();
    let mut ctx = device.create_context().unwrap();
    let viewport = Viewport::from_size(128, 32);

    ctx.set_viewport(viewport);
    ctx.set_viewport(viewport);
    calls(&device);
    ctx.flush_render_state().unwrap();
    let pushed = calls(&device);
    assert_eq!(
        pushed
            .iter()
            .filter(|c| matches!(c, NativeCall::SetViewports(_)))
            .count(),
        1
    );

    ctx.set_viewport(viewport);
    ctx.set_stencil_reference(0);
    ctx.set_blend_color([0.0; 4]);
    ctx.set_primitive_topology(PrimitiveTopology::TriangleList);
    ctx.flush_render_state().unwrap();
    assert!(calls(&device).is_empty());

    ctx.set_stencil_reference(7);
    ctx.flush_render_state().unwrap();
    assert_eq!(calls(&device), vec![NativeCall::SetStencilReference(7)]);
}

#[test]
fn stride_change_rebuilds_layout_without_rebinding() {
    let device = empty_device();
    let pipeline = position_pipeline(&device);
    let vb = vertex_buffer(&device);
    let mut ctx = device.create_context().unwrap();

    ctx.set_pipeline(pipeline);
    ctx.set_vertex_buffer(0, Some(vb), 0, 12, VertexInputRate::Vertex);
    ctx.flush_render_state().unwrap();
    let first_layout = calls(&device)
        .into_iter()
        .find_map(|c| match c {
            NativeCall::SetInputLayout(layout) => layout,
            _ => None,
        })
        .unwrap();

    ctx.set_vertex_buffer(0, Some(vb), 0, 24, VertexInputRate::Vertex);
    assert_eq!(ctx.dirty_vertex_slots(), 0);
    assert!(ctx.is_input_layout_dirty());
    ctx.flush_render_state().unwrap();
    let pushed = calls(&device);
    assert!(vertex_runs(&pushed).is_empty());
    assert!(pushed
        .iter()
        .any(|c| matches!(c, NativeCall::CreateInputLayout { .. })));
    assert!(pushed
        .iter()
        .any(|c| matches!(c, NativeCall::SetInputLayout(Some(l)) if *l != first_layout)));

    // Going back reuses the cached layout.
    ctx.set_vertex_buffer(0, Some(vb), 0, 12, VertexInputRate::Vertex);
    ctx.flush_render_state().unwrap();
    assert_eq!(calls(&device), vec![NativeCall::SetInputLayout(Some(first_layout))]);
}

#[test]
fn offset_change_rebinds_only_the_slot() {
    let device = empty_device();
    let pipeline = position_pipeline(&device);
    let vb = vertex_buffer(&device);
    let mut ctx = device.create_context().unwrap();

    ctx.set_pipeline(pipeline);
    ctx.set_vertex_buffer(0, Some(vb), 0, 12, VertexInputRate::Vertex);
    ctx.flush_render_state().unwrap();
    calls(&device);

    ctx.set_vertex_buffer(0, Some(vb), 12, 12, VertexInputRate::Vertex);
    assert!(!ctx.is_input_layout_dirty());
    ctx.flush_render_state().unwrap();
    let pushed = calls(&device);
    assert_eq!(vertex_runs(&pushed), vec![(0, 1)]);
    assert!(!pushed
        .iter()
        .any(|c| matches!(c, NativeCall::SetInputLayout(_))));
}

#[test]
fn dirty_slots_flush_as_contiguous_runs() {
    let device = empty_device();
    let buffers: Vec<_> = (0..3).map(|_| vertex_buffer(&device)).collect();
    let mut ctx = device.create_context().unwrap();

    ctx.set_vertex_buffer(0, Some(buffers[0]), 0, 12, VertexInputRate::Vertex);
    ctx.set_vertex_buffer(1, Some(buffers[1]), 0, 12, VertexInputRate::Vertex);
    ctx.set_vertex_buffer(3, Some(buffers[2]), 0, 16, VertexInputRate::Instance);
    assert_eq!(ctx.dirty_vertex_slots(), 0b1011);

    calls(&device);
    ctx.flush_render_state().unwrap();
    assert_eq!(vertex_runs(&calls(&device)), vec![(0, 2), (3, 1)]);
    assert_eq!(ctx.dirty_vertex_slots(), 0);
}

#[test]
fn out_of_range_vertex_slot_is_ignored() {
    let device = empty_device();
    let vb = vertex_buffer(&device);
    let mut ctx = device.create_context().unwrap();
    ctx.set_vertex_buffer(MAX_VERTEX_BUFFER_BINDINGS as u32, Some(vb), 0, 12, VertexInputRate::Vertex);
    assert_eq!(ctx.dirty_vertex_slots(), 0);
    assert!(ctx.vertex_buffer(MAX_VERTEX_BUFFER_BINDINGS).is_none());
}

#[test]
fn failed_layout_creation_keeps_flag_dirty() {
    let device = empty_device();
    let pipeline = position_pipeline(&device);
    let vb = vertex_buffer(&device);
    let mut ctx = device.create_context().unwrap();
    ctx.set_pipeline(pipeline);
    ctx.set_vertex_buffer(0, Some(vb), 0, 12, VertexInputRate::Vertex);

    backend(&device).inject(EmptyFault::FailNextCreation(ResourceKind::InputLayout));
    let err = ctx.flush_render_state().unwrap_err();
    assert!(matches!(err, GPUError::ResourceCreationFailed(_)));
    assert!(ctx.is_input_layout_dirty());

    ctx.flush_render_state().unwrap();
    assert!(!ctx.is_input_layout_dirty());
}

#[test]
fn destroyed_pipeline_fails_the_flush() {
    let device = empty_device();
    let pipeline = position_pipeline(&device);
    device.destroy_render_pipeline(pipeline).unwrap();

    let mut ctx = device.create_context().unwrap();
    ctx.set_pipeline(pipeline);
    assert_eq!(
        ctx.flush_render_state(),
        Err(GPUError::InvalidHandle("render pipeline"))
    );
}

#[test]
fn render_pass_transitions() {
    let device = empty_device();
    let pipeline = position_pipeline(&device);
    let fb = framebuffer(&device, 32, 32, Some(PixelFormat::D24UnormS8Uint));
    let mut ctx = device.create_context().unwrap();

    assert!(matches!(ctx.draw(3, 1, 0, 0), Err(GPUError::InvalidState(_))));
    assert!(matches!(ctx.end_render_pass(), Err(GPUError::InvalidState(_))));

    ctx.begin_render_pass(fb, &RenderPassBeginDescriptor::default()).unwrap();
    assert_eq!(ctx.state(), ContextState::InRenderPass);
    assert_eq!(ctx.attachment_count(), 2);
    assert_eq!(ctx.viewports(), &[Viewport::from_size(32, 32)]);
    assert_eq!(ctx.scissors(), &[Rect::from_size(32, 32)]);

    assert!(matches!(
        ctx.begin_render_pass(fb, &RenderPassBeginDescriptor::default()),
        Err(GPUError::InvalidState(_))
    ));
    assert!(matches!(ctx.draw(3, 1, 0, 0), Err(GPUError::InvalidState(_))));
    ctx.set_pipeline(pipeline);
    assert!(matches!(
        ctx.draw_indexed(3, 1, 0, 0, 0),
        Err(GPUError::InvalidState(_))
    ));

    ctx.end_render_pass().unwrap();
    assert_eq!(ctx.state(), ContextState::Idle);
    assert_eq!(ctx.attachment_count(), 0);
    let last = calls(&device).pop();
    assert_eq!(
        last,
        Some(NativeCall::SetRenderTargets {
            colors: vec![],
            depth_stencil: None,
            width: 0,
            height: 0,
        })
    );
}

#[test]
fn begin_clears_requested_attachments() {
    let device = empty_device();
    let fb = framebuffer(&device, 16, 16, Some(PixelFormat::D24UnormS8Uint));
    let mut ctx = device.create_context().unwrap();

    let mut desc = RenderPassBeginDescriptor::default();
    desc.colors[0].clear_color = Color::new(1.0, 1.0, 1.0, 1.0);
    desc.depth_stencil.stencil_load_action = LoadAction::Clear;
    desc.depth_stencil.clear_stencil = 3;
    desc.render_target_width = 8;
    calls(&device);
    ctx.begin_render_pass(fb, &desc).unwrap();

    let pushed = calls(&device);
    assert!(matches!(pushed[0], NativeCall::SetRenderTargets { width: 16, height: 16, .. }));
    assert!(pushed.iter().any(|c| matches!(
        c,
        NativeCall::ClearRenderTarget { index: 0, color, .. } if *color == Color::new(1.0, 1.0, 1.0, 1.0)
    )));
    assert!(pushed.iter().any(|c| matches!(
        c,
        NativeCall::ClearDepthStencil { flags, stencil: 3, .. } if *flags == ClearFlags::DEPTH | ClearFlags::STENCIL
    )));
    assert_eq!(ctx.viewports(), &[Viewport::from_size(8, 16)]);
}

#[test]
fn failed_clear_leaves_no_targets_bound() {
    let device = empty_device();
    let fb = framebuffer(&device, 16, 16, Some(PixelFormat::D24UnormS8Uint));
    let mut ctx = device.create_context().unwrap();
    backend(&device).inject(EmptyFault::FailNextClear);
    calls(&device);

    let err = ctx
        .begin_render_pass(fb, &RenderPassBeginDescriptor::default())
        .unwrap_err();
    assert!(matches!(err, GPUError::NativeFailure(_)));
    assert_eq!(ctx.state(), ContextState::Idle);
    assert_eq!(ctx.attachment_count(), 0);
    assert_eq!(
        calls(&device).last(),
        Some(&NativeCall::SetRenderTargets {
            colors: vec![],
            depth_stencil: None,
            width: 0,
            height: 0,
        })
    );

    ctx.begin_render_pass(fb, &RenderPassBeginDescriptor::default())
        .unwrap();
    assert_eq!(ctx.state(), ContextState::InRenderPass);
}

#[test]
fn stencil_clear_without_stencil_fails_under_validation() {
    let device = device_with_validation(true);
    let fb = framebuffer(&device, 16, 16, Some(PixelFormat::D32Float));
    let mut ctx = device.create_context().unwrap();

    let mut desc = RenderPassBeginDescriptor::default();
    desc.depth_stencil.stencil_load_action = LoadAction::Clear;
    let err = ctx.begin_render_pass(fb, &desc).unwrap_err();
    assert!(matches!(err, GPUError::ValidationError(_)));
    assert_eq!(ctx.state(), ContextState::Idle);
}

#[test]
fn stencil_clear_without_stencil_is_dropped_otherwise() {
    let device = device_with_validation(false);
    let fb = framebuffer(&device, 16, 16, Some(PixelFormat::D32Float));
    let mut ctx = device.create_context().unwrap();

    let mut desc = RenderPassBeginDescriptor::default();
    desc.depth_stencil.stencil_load_action = LoadAction::Clear;
    calls(&device);
    ctx.begin_render_pass(fb, &desc).unwrap();
    assert_eq!(ctx.state(), ContextState::InRenderPass);

    let clears: Vec<_> = calls(&device)
        .into_iter()
        .filter_map(|c| match c {
            NativeCall::ClearDepthStencil { flags, .. } => Some(flags),
            _ => None,
        })
        .collect();
    assert_eq!(clears, vec![ClearFlags::DEPTH]);
}

#[test]
fn draws_flush_state_first() {
    let device = empty_device();
    let pipeline = position_pipeline(&device);
    let vb = vertex_buffer(&device);
    let fb = framebuffer(&device, 16, 16, None);
    let mut ctx = device.create_context().unwrap();

    ctx.begin_render_pass(fb, &RenderPassBeginDescriptor::default()).unwrap();
    ctx.set_pipeline(pipeline);
    ctx.set_vertex_buffer(0, Some(vb), 0, 12, VertexInputRate::Vertex);
    calls(&device);

    ctx.draw(3, 1, 0, 0).unwrap();
    let pushed = calls(&device);
    assert!(pushed.contains(&NativeCall::SetRenderPipeline(pipeline)));
    assert_eq!(
        pushed.last(),
        Some(&NativeCall::Draw {
            vertex_count: 3,
            instance_count: 1,
            first_vertex: 0,
            first_instance: 0,
        })
    );

    ctx.draw(0, 1, 0, 0).unwrap();
    ctx.draw(3, 0, 0, 0).unwrap();
    assert!(calls(&device).is_empty());

    let ib = device
        .create_buffer_from(BufferUsage::INDEX, &[0u16, 1, 2])
        .unwrap();
    ctx.set_index_buffer(ib, 0, IndexType::UInt16);
    ctx.draw_indexed(3, 1, 0, 0, 0).unwrap();
    let pushed = calls(&device);
    assert_eq!(pushed.len(), 2);
    assert!(matches!(pushed[0], NativeCall::SetIndexBuffer(Some(_))));
}

#[test]
fn compute_pipeline_is_bound_once() {
    let device = empty_device();
    let cs = shader(&device, ShaderStage::Compute);
    let pipeline = device
        .create_compute_pipeline(&ComputePipelineDescriptor { shader: cs })
        .unwrap();
    let mut ctx = device.create_context().unwrap();

    assert!(matches!(ctx.dispatch(1, 1, 1), Err(GPUError::InvalidState(_))));
    ctx.set_compute_pipeline(pipeline);
    calls(&device);
    ctx.dispatch(8, 8, 1).unwrap();
    ctx.dispatch(4, 1, 1).unwrap();
    ctx.dispatch(0, 1, 1).unwrap();
    assert_eq!(
        calls(&device),
        vec![
            NativeCall::SetComputePipeline(pipeline),
            NativeCall::Dispatch { x: 8, y: 8, z: 1 },
            NativeCall::Dispatch { x: 4, y: 1, z: 1 },
        ]
    );

    let fb = framebuffer(&device, 8, 8, None);
    ctx.begin_render_pass(fb, &RenderPassBeginDescriptor::default()).unwrap();
    assert!(matches!(ctx.dispatch(1, 1, 1), Err(GPUError::InvalidState(_))));
}

#[test]
fn flush_signals_increasing_fences() {
    let device = empty_device();
    let mut ctx = device.create_context().unwrap();
    calls(&device);

    assert_eq!(ctx.flush(false).unwrap(), 1);
    assert_eq!(ctx.flush(true).unwrap(), 2);
    assert_eq!(ctx.fence_value(), 2);
    assert_eq!(
        calls(&device),
        vec![
            NativeCall::Submit { fence: 1 },
            NativeCall::Submit { fence: 2 },
            NativeCall::Wait { fence: 2 },
        ]
    );
    assert_eq!(backend(&device).completed_fence(), 2);
}

#[test]
fn failed_submit_keeps_the_fence() {
    let device = empty_device();
    let mut ctx = device.create_context().unwrap();
    backend(&device).inject(EmptyFault::FailNextSubmit);
    assert!(ctx.flush(false).is_err());
    assert_eq!(ctx.fence_value(), 0);
    assert_eq!(ctx.flush(false).unwrap(), 1);
}

#[test]
fn patch_pipelines_reapply_their_control_points() {
    let device = empty_device();
    let vs = shader(&device, ShaderStage::Vertex);
    let patch_pipeline = |control_points: u32| {
        device
            .create_render_pipeline(&RenderPipelineDescriptor {
                vertex_shader: vs,
                vertex_attributes: vec![VertexAttribute {
                    format: VertexFormat::Float3,
                    buffer_slot: 0,
                    offset: 0,
                    shader_location: 0,
                }],
                primitive_topology: PrimitiveTopology::PatchList,
                patch_control_points: control_points,
                color_formats: vec![PixelFormat::RGBA8Unorm],
                ..Default::default()
            })
            .unwrap()
    };
    let triangles = patch_pipeline(3);
    let quads = patch_pipeline(4);
    let also_quads = patch_pipeline(4);
    let vb = vertex_buffer(&device);
    let fb = framebuffer(&device, 16, 16, None);
    let mut ctx = device.create_context().unwrap();

    ctx.begin_render_pass(fb, &RenderPassBeginDescriptor::default()).unwrap();
    ctx.set_vertex_buffer(0, Some(vb), 0, 12, VertexInputRate::Vertex);
    calls(&device);
    for pipeline in [triangles, quads, also_quads, triangles] {
        ctx.set_pipeline(pipeline);
        ctx.draw(3, 1, 0, 0).unwrap();
    }

    let applied: Vec<_> = calls(&device)
        .into_iter()
        .filter_map(|c| match c {
            NativeCall::SetPrimitiveTopology {
                topology: PrimitiveTopology::PatchList,
                patch_control_points,
            } => Some(patch_control_points),
            _ => None,
        })
        .collect();
    assert_eq!(applied, vec![3, 4, 3]);
}
