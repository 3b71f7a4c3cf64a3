mod common;

use common::*;
use dashi_hal::*;

fn count(calls: &[NativeCall], pred: impl Fn(&NativeCall) -> bool) -> usize {
    calls.iter().filter(|c| pred(c)).count()
}

fn configured(desc: &SwapChainDescriptor) -> Device {
    let mut device = empty_device();
    device.configure_swap_chain(desc).unwrap();
    device
}

#[test]
fn configure_wraps_every_back_buffer() {
    let mut device = empty_device();
    calls(&device);
    device.configure_swap_chain(&SwapChainDescriptor::default()).unwrap();

    let swap_chain = device.swap_chain();
    assert_eq!(swap_chain.state(), SwapChainState::Configured);
    assert_eq!(swap_chain.size(), (1280, 720));
    assert_eq!(swap_chain.back_buffer_count(), 3);
    assert!(swap_chain.depth_stencil_texture().is_none());

    let log = calls(&device);
    assert_eq!(
        log[0],
        NativeCall::CreateSwapChain {
            width: 1280,
            height: 720,
            image_count: 3,
        }
    );
    assert_eq!(count(&log, |c| matches!(c, NativeCall::WrapBackBuffer { .. })), 3);

    let back_buffer = device.swap_chain().back_buffer_texture(0).unwrap();
    let desc = device.texture_descriptor(back_buffer).unwrap();
    assert_eq!(desc.format, PixelFormat::BGRA8Unorm);
    assert!(desc.usage.contains(TextureUsage::RENDER_TARGET));
}

#[test]
fn buffer_count_is_clamped() {
    let device = configured(&SwapChainDescriptor {
        buffer_count: 1,
        ..Default::default()
    });
    assert_eq!(device.swap_chain().back_buffer_count(), 2);
}

#[test]
fn invalid_descriptors_are_rejected() {
    let mut device = empty_device();
    for desc in [
        SwapChainDescriptor {
            width: 0,
            ..Default::default()
        },
        SwapChainDescriptor {
            color_format: PixelFormat::D32Float,
            ..Default::default()
        },
        SwapChainDescriptor {
            depth_stencil_format: Some(PixelFormat::RGBA8Unorm),
            ..Default::default()
        },
    ] {
        assert!(matches!(
            device.configure_swap_chain(&desc),
            Err(GPUError::InvalidDescriptor(_))
        ));
    }
    assert_eq!(device.swap_chain().state(), SwapChainState::Uninitialized);
    assert!(matches!(
        device.resize_swap_chain(640, 480),
        Err(GPUError::InvalidState(_))
    ));
}

#[test]
fn resize_to_the_current_size_is_a_no_op() {
    let mut device = configured(&SwapChainDescriptor::default());
    calls(&device);
    device.resize_swap_chain(1280, 720).unwrap();
    device.resize_swap_chain(1280, 720).unwrap();
    assert!(calls(&device).is_empty());
}

#[test]
fn resize_rewraps_back_buffers() {
    let mut device = configured(&SwapChainDescriptor::default());
    let old: Vec<_> = (0..3)
        .map(|i| device.swap_chain().back_buffer_texture(i).unwrap())
        .collect();
    calls(&device);

    device.resize_swap_chain(800, 600).unwrap();
    let log = calls(&device);
    assert_eq!(
        count(&log, |c| matches!(c, NativeCall::ResizeSwapChain { width: 800, height: 600 })),
        1
    );
    assert_eq!(count(&log, |c| matches!(c, NativeCall::ReleaseBackBuffer(_))), 3);
    assert_eq!(count(&log, |c| matches!(c, NativeCall::WrapBackBuffer { .. })), 3);
    assert_eq!(device.swap_chain().size(), (800, 600));

    for texture in old {
        assert!(device.texture_descriptor(texture).is_none());
    }
    let current = device.swap_chain().back_buffer_texture(0).unwrap();
    assert_eq!(device.texture_descriptor(current).unwrap().width, 800);

    assert!(matches!(
        device.resize_swap_chain(0, 600),
        Err(GPUError::InvalidDescriptor(_))
    ));
}

#[test]
fn lost_chain_is_recreated_on_resize() {
    let mut device = configured(&SwapChainDescriptor::default());
    backend(&device).inject(EmptyFault::ResizeChainLost);
    calls(&device);

    device.resize_swap_chain(640, 480).unwrap();
    let log = calls(&device);
    let created = log.iter().position(|c| {
        *c == NativeCall::CreateSwapChain {
            width: 640,
            height: 480,
            image_count: 3,
        }
    });
    let released = log.iter().position(|c| *c == NativeCall::DestroySwapChain);
    assert!(created.is_some() && released.is_some());
    assert!(created < released, "old chain released before its replacement existed");
    assert_eq!(device.swap_chain().size(), (640, 480));
    assert_eq!(device.swap_chain().back_buffer_count(), 3);
}

#[test]
fn failed_recreation_keeps_the_old_chain() {
    let mut device = configured(&SwapChainDescriptor::default());
    backend(&device).inject(EmptyFault::ResizeChainLost);
    backend(&device).inject(EmptyFault::FailNextCreation(ResourceKind::SwapChain));
    calls(&device);

    assert!(matches!(
        device.resize_swap_chain(640, 480),
        Err(GPUError::ResourceCreationFailed(_))
    ));
    assert!(!calls(&device).contains(&NativeCall::DestroySwapChain));
}

#[test]
fn same_chain_with_new_size_resizes_in_place() {
    let mut device = configured(&SwapChainDescriptor::default());
    calls(&device);
    device
        .configure_swap_chain(&SwapChainDescriptor {
            width: 1024,
            height: 768,
            ..Default::default()
        })
        .unwrap();
    let log = calls(&device);
    assert_eq!(count(&log, |c| matches!(c, NativeCall::CreateSwapChain { .. })), 0);
    assert_eq!(count(&log, |c| matches!(c, NativeCall::ResizeSwapChain { .. })), 1);
}

#[test]
fn images_are_acquired_in_turn() {
    let mut device = configured(&SwapChainDescriptor::default());
    let mut order = Vec::new();
    for _ in 0..4 {
        device.begin_frame().unwrap();
        order.push(device.swap_chain().current_back_buffer_index());
        device.end_frame().unwrap();
    }
    assert_eq!(order, vec![0, 1, 2, 0]);
    assert_eq!(
        count(&calls(&device), |c| matches!(c, NativeCall::Present(_))),
        4
    );
}

#[test]
fn out_of_date_present_resizes_next_frame() {
    let mut device = configured(&SwapChainDescriptor::default());
    backend(&device).inject(EmptyFault::PresentOutOfDate);
    device.begin_frame().unwrap();
    device.end_frame().unwrap();
    assert!(device.swap_chain().needs_resize());

    calls(&device);
    device.begin_frame().unwrap();
    assert!(!device.swap_chain().needs_resize());
    assert!(calls(&device).contains(&NativeCall::ResizeSwapChain {
        width: 1280,
        height: 720,
    }));
}

#[test]
fn back_buffers_cannot_be_destroyed_by_the_caller() {
    let device = configured(&SwapChainDescriptor::default());
    let back_buffer = device.swap_chain().current_back_buffer().unwrap();
    assert_eq!(
        device.destroy_texture(back_buffer),
        Err(GPUError::InvalidHandle("swap-chain texture"))
    );
}

#[test]
fn back_buffer_renders_with_depth() {
    let mut device = configured(&SwapChainDescriptor {
        depth_stencil_format: Some(PixelFormat::D24UnormS8Uint),
        ..Default::default()
    });
    let depth = device.swap_chain().depth_stencil_texture().unwrap();
    assert_eq!(
        device.texture_descriptor(depth).unwrap().format,
        PixelFormat::D24UnormS8Uint
    );

    device.begin_frame().unwrap();
    let color = device.swap_chain().current_back_buffer().unwrap();
    let framebuffer = device
        .create_framebuffer(&FramebufferDescriptor {
            color_attachments: vec![FramebufferAttachment::new(color)],
            depth_stencil_attachment: Some(FramebufferAttachment::new(depth)),
        })
        .unwrap();
    let ctx = device.immediate_context().unwrap();
    ctx.begin_render_pass(framebuffer, &RenderPassBeginDescriptor::default())
        .unwrap();
    assert_eq!(ctx.attachment_count(), 2);
    ctx.end_render_pass().unwrap();
    device.end_frame().unwrap();
}

#[test]
fn shutdown_releases_the_chain() {
    let mut device = configured(&SwapChainDescriptor::default());
    calls(&device);
    device.shutdown();
    let log = calls(&device);
    assert_eq!(count(&log, |c| matches!(c, NativeCall::ReleaseBackBuffer(_))), 3);
    assert_eq!(count(&log, |c| *c == NativeCall::DestroySwapChain), 1);
    assert_eq!(device.swap_chain().state(), SwapChainState::Destroyed);
}
