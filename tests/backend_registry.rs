mod common;

use common::*;
use dashi_hal::*;

#[test]
fn empty_backend_is_listed_and_creatable() {
    assert!(is_backend_supported(Backend::Empty));
    assert!(available_backends().contains(&Backend::Empty));

    let device = empty_device();
    assert_eq!(device.backend(), Backend::Empty);
    assert!(device.empty_backend().is_some());
}

#[test]
fn unsupported_backend_is_reported_by_name() {
    init_logging();
    for backend in [Backend::D3D11, Backend::D3D12, Backend::Metal, Backend::OpenGL] {
        assert!(!is_backend_supported(backend));
        assert_eq!(
            Device::create(&DeviceDescriptor::with_backend(backend)).err(),
            Some(GPUError::BackendUnsupported(backend))
        );
    }
}

#[test]
#[cfg(not(feature = "dashi-vulkan"))]
fn default_does_not_fall_back_to_empty() {
    init_logging();
    assert_eq!(
        Device::create(&DeviceDescriptor::default()).err(),
        Some(GPUError::BackendUnsupported(Backend::Default))
    );
}

#[test]
fn fallback_candidates_are_real_backends() {
    let candidates = default_fallback_list();
    assert!(!candidates.is_empty());
    assert!(!candidates.contains(&Backend::Empty));
    for backend in available_backends() {
        assert_ne!(*backend, Backend::Default);
        assert!(is_backend_supported(*backend));
    }
}

#[test]
fn names_parse_and_display() {
    assert_eq!("d3d12".parse::<Backend>().unwrap(), Backend::D3D12);
    assert_eq!("EMPTY".parse::<Backend>().unwrap(), Backend::Empty);
    assert_eq!(Backend::Vulkan.to_string(), "vulkan");
    assert!("directx9".parse::<Backend>().is_err());
}

#[test]
fn devices_on_the_same_backend_are_independent() {
    let a = empty_device();
    let b = empty_device();
    let buffer = vertex_buffer(&a);
    assert!(b.buffer_descriptor(buffer).is_none());
    assert_eq!(a.live_resource_count(), 1);
    assert_eq!(b.live_resource_count(), 0);
}
