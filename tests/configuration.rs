mod common;

use common::*;
use dashi_hal::*;
use serial_test::serial;

const VARS: [&str; 2] = ["DASHI_BACKEND", "DASHI_VALIDATION"];

/// Runs `f` with the given variables set and restores the previous
/// environment afterwards.
fn with_env<R>(vars: &[(&str, &str)], f: impl FnOnce() -> R) -> R {
    let saved: Vec<_> = VARS.iter().map(|k| (*k, std::env::var(k).ok())).collect();
    for key in VARS {
        std::env::remove_var(key);
    }
    for (key, value) in vars {
        std::env::set_var(key, value);
    }
    let result = f();
    for (key, value) in saved {
        match value {
            Some(v) => std::env::set_var(key, v),
            None => std::env::remove_var(key),
        }
    }
    result
}

#[test]
#[serial]
fn backend_variable_overrides_the_descriptor() {
    init_logging();
    let device = with_env(&[("DASHI_BACKEND", "empty")], || {
        Device::create(&DeviceDescriptor::with_backend(Backend::D3D12))
    })
    .unwrap();
    assert_eq!(device.backend(), Backend::Empty);
    assert_eq!(device.descriptor().backend, Backend::Empty);
}

#[test]
#[serial]
fn unknown_backend_name_is_ignored() {
    init_logging();
    let device = with_env(&[("DASHI_BACKEND", "glide")], || {
        Device::create(&empty_descriptor(true))
    })
    .unwrap();
    assert_eq!(device.backend(), Backend::Empty);
}

#[test]
#[serial]
fn validation_variable_accepts_common_spellings() {
    init_logging();
    for (value, expected) in [("0", false), ("off", false), ("1", true), ("true", true)] {
        let device = with_env(&[("DASHI_VALIDATION", value)], || {
            Device::create(&empty_descriptor(!expected))
        })
        .unwrap();
        assert_eq!(device.validation_enabled(), expected, "DASHI_VALIDATION={value}");
    }

    let device = with_env(&[("DASHI_VALIDATION", "maybe")], || {
        Device::create(&empty_descriptor(true))
    })
    .unwrap();
    assert!(device.validation_enabled());
}

#[test]
#[serial]
fn inflight_frames_are_clamped() {
    for (requested, expected) in [(0, 1), (2, 2), (99, MAX_INFLIGHT_FRAMES)] {
        let desc = with_env(&[], || {
            let mut desc = DeviceDescriptor {
                max_inflight_frames: requested,
                ..empty_descriptor(true)
            };
            desc.apply_env_overrides();
            desc
        });
        assert_eq!(desc.max_inflight_frames, expected);
    }
}

#[test]
#[serial]
fn overrides_leave_the_caller_descriptor_untouched() {
    init_logging();
    let desc = empty_descriptor(true);
    let device = with_env(&[("DASHI_VALIDATION", "0")], || Device::create(&desc)).unwrap();
    assert!(desc.validation);
    assert!(!device.descriptor().validation);
}
