mod common;

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::*;
use dashi_hal::*;

#[test]
fn zero_sized_texture_is_rejected_before_the_backend() {
    let device = empty_device();
    calls(&device);
    let desc = TextureDescriptor::texture_2d(0, 64, 1, 1, PixelFormat::RGBA8Unorm, TextureUsage::SAMPLED);
    assert!(matches!(
        device.create_texture(&desc, None),
        Err(GPUError::InvalidDescriptor(_))
    ));
    assert!(calls(&device).is_empty());
    assert_eq!(device.live_resource_count(), 0);
}

#[test]
fn failed_native_creation_tracks_nothing() {
    let device = empty_device();
    backend(&device).inject(EmptyFault::FailNextCreation(ResourceKind::Buffer));
    let desc = BufferDescriptor::new(BufferUsage::UNIFORM, 4, 16);
    assert!(matches!(
        device.create_buffer(&desc, None),
        Err(GPUError::ResourceCreationFailed(_))
    ));
    assert_eq!(device.live_resource_count(), 0);

    let buffer = device.create_buffer(&desc, None).unwrap();
    assert_eq!(device.buffer_descriptor(buffer), Some(desc));
}

#[test]
fn zero_mips_resolve_to_the_full_chain() {
    let device = empty_device();
    let texture = device
        .create_texture(
            &TextureDescriptor::texture_2d(256, 64, 0, 1, PixelFormat::RGBA8Unorm, TextureUsage::SAMPLED),
            None,
        )
        .unwrap();
    assert_eq!(device.texture_descriptor(texture).unwrap().mip_levels, 9);
}

#[test]
fn initial_data_reaches_the_backend() {
    let device = empty_device();
    let buffer = device
        .create_buffer_from(BufferUsage::UNIFORM, &[1u32, 2, 3, 4])
        .unwrap();
    let uploaded = calls(&device).into_iter().find_map(|c| match c {
        NativeCall::CreateBuffer { buffer: b, size, initial_data } if b == buffer => Some((size, initial_data)),
        _ => None,
    });
    let (size, data) = uploaded.unwrap();
    assert_eq!(size, 16);
    assert_eq!(data.map(|d| d.len()), Some(16));
}

#[test]
fn destruction_waits_for_the_slot_to_come_around() {
    init_logging();
    let mut device = Device::create(&DeviceDescriptor {
        max_inflight_frames: 2,
        ..empty_descriptor(true)
    })
    .unwrap();
    let buffer = vertex_buffer(&device);

    device.begin_frame().unwrap();
    device.destroy_buffer(buffer).unwrap();
    assert_eq!(device.buffer_descriptor(buffer), None);
    assert_eq!(device.destroy_buffer(buffer), Err(GPUError::InvalidHandle("buffer")));
    assert_eq!(device.pending_destructions(), 1);
    device.end_frame().unwrap();

    let destroyed = |device: &Device| backend(device).count(|c| *c == NativeCall::DestroyBuffer(buffer));
    device.begin_frame().unwrap();
    assert_eq!(destroyed(&device), 0);
    device.end_frame().unwrap();

    device.begin_frame().unwrap();
    assert_eq!(destroyed(&device), 1);
    assert_eq!(device.pending_destructions(), 0);
    device.end_frame().unwrap();
    assert_eq!(device.frame_index(), 3);
}

#[test]
fn frame_waits_on_the_slot_fence() {
    let mut device = empty_device();
    device.begin_frame().unwrap();
    device.end_frame().unwrap();
    let fence = device.immediate_context().unwrap().fence_value();
    assert_eq!(fence, 1);

    calls(&device);
    // Three slots: the first slot's fence is waited on the third advance.
    device.begin_frame().unwrap();
    device.end_frame().unwrap();
    device.begin_frame().unwrap();
    device.end_frame().unwrap();
    device.begin_frame().unwrap();
    assert!(calls(&device).contains(&NativeCall::Wait { fence }));
}

#[test]
fn shutdown_destroys_leaked_resources() {
    let mut device = empty_device();
    let buffer = vertex_buffer(&device);
    let texture = device
        .create_texture(
            &TextureDescriptor::texture_2d(8, 8, 1, 1, PixelFormat::RGBA8Unorm, TextureUsage::SAMPLED),
            None,
        )
        .unwrap();
    let view = device.shader_resource_view(texture, &TextureViewRange::whole()).unwrap();
    let dropped = vertex_buffer(&device);
    device.destroy_buffer(dropped).unwrap();
    assert_eq!(device.live_resource_count(), 2);

    device.shutdown();
    let log = calls(&device);
    for expected in [
        NativeCall::DestroyBuffer(buffer),
        NativeCall::DestroyBuffer(dropped),
        NativeCall::DestroyTexture(texture),
        NativeCall::DestroyTextureView(view),
        NativeCall::Shutdown,
    ] {
        assert_eq!(log.iter().filter(|c| **c == expected).count(), 1, "{expected:?}");
    }
    assert_eq!(device.live_resource_count(), 0);
    assert_eq!(device.create_buffer_from(BufferUsage::VERTEX, &[0u8; 4]), Err(GPUError::DeviceLost));
    assert!(device.immediate_context().is_err());

    device.shutdown();
    assert!(calls(&device).is_empty());
}

#[test]
fn device_loss_recovers_once() {
    let mut device = empty_device();
    device
        .configure_swap_chain(&SwapChainDescriptor {
            width: 320,
            height: 240,
            ..Default::default()
        })
        .unwrap();
    let stale = vertex_buffer(&device);
    let mut old_context = device.create_context().unwrap();

    let fired = Arc::new(AtomicUsize::new(0));
    let seen = fired.clone();
    device.set_device_lost_callback(Box::new(move |info| {
        assert_eq!(info.reason, DeviceLostReason::Removed);
        assert_eq!(info.epoch, 1);
        seen.fetch_add(1, Ordering::SeqCst);
    }));

    backend(&device).inject(EmptyFault::PresentDeviceRemoved);
    device.begin_frame().unwrap();
    device.end_frame().unwrap();

    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert_eq!(device.epoch(), 1);
    assert_eq!(device.buffer_descriptor(stale), None);
    assert_eq!(device.swap_chain().state(), SwapChainState::Configured);
    assert_eq!(device.swap_chain().size(), (320, 240));

    let fresh = vertex_buffer(&device);
    assert_ne!(fresh, stale);
    assert_eq!(device.destroy_buffer(stale), Err(GPUError::InvalidHandle("buffer")));

    assert_eq!(old_context.flush(false), Err(GPUError::DeviceLost));

    device.begin_frame().unwrap();
    device.end_frame().unwrap();
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[test]
fn failed_recovery_is_retried() {
    let mut device = empty_device();
    device
        .configure_swap_chain(&SwapChainDescriptor {
            width: 320,
            height: 240,
            ..Default::default()
        })
        .unwrap();
    let stale = vertex_buffer(&device);
    let fired = Arc::new(AtomicUsize::new(0));
    let seen = fired.clone();
    device.set_device_lost_callback(Box::new(move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
    }));

    let lost = backend(&device).clone();
    lost.inject(EmptyFault::PresentDeviceRemoved);
    lost.inject(EmptyFault::FailNextRecreate);
    device.begin_frame().unwrap();
    assert!(matches!(
        device.end_frame(),
        Err(GPUError::ResourceCreationFailed(_))
    ));

    assert_eq!(fired.load(Ordering::SeqCst), 0);
    assert_eq!(device.epoch(), 0);
    assert_eq!(device.immediate_context().err(), Some(GPUError::DeviceLost));
    assert_eq!(
        device.create_buffer_from(BufferUsage::VERTEX, &[0u8; 4]),
        Err(GPUError::DeviceLost)
    );
    assert_eq!(device.begin_frame(), Err(GPUError::DeviceLost));
    assert_eq!(device.swap_chain().state(), SwapChainState::Uninitialized);

    device.handle_device_lost(DeviceLostReason::Removed).unwrap();
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert_eq!(device.epoch(), 1);
    assert_eq!(device.buffer_descriptor(stale), None);
    assert_eq!(device.swap_chain().state(), SwapChainState::Configured);
    assert_eq!(device.swap_chain().size(), (320, 240));
    assert_ne!(vertex_buffer(&device), stale);
    device.begin_frame().unwrap();
    device.end_frame().unwrap();

    assert_eq!(lost.count(|c| *c == NativeCall::Recreate), 1);
    drop(device);
    assert_eq!(lost.count(|c| *c == NativeCall::Shutdown), 1);
}

#[test]
fn shutdown_while_lost_releases_the_backend_once() {
    let mut device = empty_device();
    device.configure_swap_chain(&SwapChainDescriptor::default()).unwrap();
    let lost = backend(&device).clone();
    lost.inject(EmptyFault::PresentDeviceRemoved);
    lost.inject(EmptyFault::FailNextRecreate);
    device.begin_frame().unwrap();
    assert!(device.end_frame().is_err());

    device.shutdown();
    assert_eq!(lost.count(|c| *c == NativeCall::Shutdown), 1);
    assert_eq!(lost.count(|c| *c == NativeCall::DestroySwapChain), 1);
    assert!(matches!(
        device.immediate_context(),
        Err(GPUError::InvalidState(_))
    ));
}

#[test]
fn device_reset_is_reported_with_its_reason() {
    let mut device = empty_device();
    device.configure_swap_chain(&SwapChainDescriptor::default()).unwrap();

    let reasons = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = reasons.clone();
    device.set_device_lost_callback(Box::new(move |info| sink.lock().push(info.reason)));

    backend(&device).inject(EmptyFault::PresentDeviceReset);
    device.begin_frame().unwrap();
    device.present().unwrap();
    assert_eq!(*reasons.lock(), vec![DeviceLostReason::Reset]);
}

#[test]
fn present_failure_is_not_device_loss() {
    let mut device = empty_device();
    device.configure_swap_chain(&SwapChainDescriptor::default()).unwrap();
    backend(&device).inject(EmptyFault::PresentFailure);
    device.begin_frame().unwrap();
    assert!(matches!(device.end_frame(), Err(GPUError::NativeFailure(_))));
    assert_eq!(device.epoch(), 0);
}

#[test]
fn resources_can_be_created_from_many_threads() {
    let device = empty_device();
    let handles: Vec<Handle<Buffer>> = std::thread::scope(|scope| {
        let workers: Vec<_> = (0..4)
            .map(|_| {
                scope.spawn(|| {
                    (0..16)
                        .map(|_| vertex_buffer(&device))
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        workers
            .into_iter()
            .flat_map(|w| w.join().unwrap())
            .collect()
    });

    let unique: HashSet<_> = handles.iter().copied().collect();
    assert_eq!(unique.len(), 64);
    assert_eq!(device.live_resource_count(), 64);

    std::thread::scope(|scope| {
        for chunk in handles.chunks(16) {
            let device = &device;
            scope.spawn(move || {
                for buffer in chunk {
                    device.destroy_buffer(*buffer).unwrap();
                }
            });
        }
    });
    assert_eq!(device.live_resource_count(), 0);
    assert_eq!(device.pending_destructions(), 64);
}

#[test]
fn contexts_record_on_other_threads() {
    let device = empty_device();
    let vb = vertex_buffer(&device);
    let mut ctx = device.create_context().unwrap();
    let fence = std::thread::spawn(move || {
        ctx.set_vertex_buffer(0, Some(vb), 0, 12, VertexInputRate::Vertex);
        ctx.flush_render_state().unwrap();
        ctx.flush(true).unwrap()
    })
    .join()
    .unwrap();
    assert_eq!(fence, 1);
    assert_eq!(backend(&device).completed_fence(), 1);
}
