mod common;

use common::*;
use dashi_hal::*;

fn view_creations(device: &Device) -> usize {
    backend(device).count(|c| matches!(c, NativeCall::CreateTextureView { .. }))
}

fn sampled_texture(device: &Device, mips: u32, layers: u32) -> Handle<Texture> {
    device
        .create_texture(
            &TextureDescriptor::texture_2d(
                64,
                64,
                mips,
                layers,
                PixelFormat::RGBA8Unorm,
                TextureUsage::SAMPLED | TextureUsage::RENDER_TARGET | TextureUsage::STORAGE,
            ),
            None,
        )
        .unwrap()
}

#[test]
fn repeated_requests_share_one_view() {
    let device = empty_device();
    let texture = sampled_texture(&device, 4, 1);

    let a = device.shader_resource_view(texture, &TextureViewRange::whole()).unwrap();
    let b = device.shader_resource_view(texture, &TextureViewRange::whole()).unwrap();
    assert_eq!(a, b);
    assert_eq!(view_creations(&device), 1);

    let info = device.texture_view_info(a).unwrap();
    assert_eq!(info.texture, texture);
    assert_eq!(info.kind, ViewKind::ShaderResource);
    assert_eq!(info.key.mip_count, 4);
    assert_eq!(info.key.layer_count, 1);
}

#[test]
fn equivalent_ranges_hit_the_same_entry() {
    let device = empty_device();
    let texture = sampled_texture(&device, 4, 2);

    let whole = device.shader_resource_view(texture, &TextureViewRange::whole()).unwrap();
    let explicit = device
        .shader_resource_view(texture, &TextureViewRange::new(0, 4, 0, 2))
        .unwrap();
    let oversized = device
        .shader_resource_view(texture, &TextureViewRange::new(0, 40, 0, 9))
        .unwrap();
    assert_eq!(whole, explicit);
    assert_eq!(whole, oversized);
    assert_eq!(view_creations(&device), 1);

    let tail = device
        .shader_resource_view(texture, &TextureViewRange::new(2, REMAINING, 1, REMAINING))
        .unwrap();
    assert_ne!(tail, whole);
    let key = device.texture_view_info(tail).unwrap().key;
    assert_eq!((key.base_mip, key.mip_count), (2, 2));
    assert_eq!((key.base_layer, key.layer_count), (1, 1));
}

#[test]
fn kinds_are_cached_separately() {
    let device = empty_device();
    let texture = sampled_texture(&device, 1, 1);
    let range = TextureViewRange::single(0, 0);

    let srv = device.shader_resource_view(texture, &range).unwrap();
    let rtv = device.render_target_view(texture, &range).unwrap();
    let uav = device.unordered_access_view(texture, &range).unwrap();
    assert_ne!(srv, rtv);
    assert_ne!(rtv, uav);
    assert_eq!(device.render_target_view(texture, &range).unwrap(), rtv);
    assert_eq!(view_creations(&device), 3);
}

#[test]
fn attachment_views_clamp_to_one_mip() {
    let device = empty_device();
    let texture = sampled_texture(&device, 4, 1);
    let rtv = device
        .render_target_view(texture, &TextureViewRange::whole())
        .unwrap();
    assert_eq!(device.texture_view_info(rtv).unwrap().key.mip_count, 1);
}

#[test]
fn wrong_usage_or_role_is_rejected() {
    let device = empty_device();
    let sampled_only = device
        .create_texture(
            &TextureDescriptor::texture_2d(16, 16, 1, 1, PixelFormat::RGBA8Unorm, TextureUsage::SAMPLED),
            None,
        )
        .unwrap();
    assert!(matches!(
        device.render_target_view(sampled_only, &TextureViewRange::whole()),
        Err(GPUError::ValidationError(_))
    ));
    assert!(matches!(
        device.depth_stencil_view(sampled_only, &TextureViewRange::whole()),
        Err(GPUError::ValidationError(_))
    ));
    assert_eq!(view_creations(&device), 0);
}

#[test]
fn destroying_a_texture_drops_its_views() {
    let device = empty_device();
    let texture = sampled_texture(&device, 4, 1);
    let srv = device.shader_resource_view(texture, &TextureViewRange::whole()).unwrap();
    let rtv = device.render_target_view(texture, &TextureViewRange::whole()).unwrap();

    device.destroy_texture(texture).unwrap();
    assert!(device.texture_view_info(srv).is_none());
    assert!(device.texture_view_info(rtv).is_none());
    assert_eq!(device.pending_destructions(), 3);
    assert_eq!(
        device.shader_resource_view(texture, &TextureViewRange::whole()),
        Err(GPUError::InvalidHandle("texture"))
    );
}

#[test]
fn cube_views_cover_six_faces_per_cube() {
    let device = empty_device();
    let cube = device
        .create_texture(
            &TextureDescriptor::texture_cube(32, 1, 2, PixelFormat::RGBA8Unorm, TextureUsage::SAMPLED),
            None,
        )
        .unwrap();
    let srv = device.shader_resource_view(cube, &TextureViewRange::whole()).unwrap();
    let info = device.texture_view_info(srv).unwrap();
    assert_eq!(info.dimension, ViewDimension::TextureCubeArray);
    assert_eq!(info.key.layer_count, 2);

    let native_layers = backend(&device).calls().into_iter().find_map(|c| match c {
        NativeCall::CreateTextureView { view, desc, .. } if view == srv => Some(desc.layer_count),
        _ => None,
    });
    assert_eq!(native_layers, Some(12));
}

#[test]
fn one_cube_of_a_cube_array_is_a_plain_cube_view() {
    let device = empty_device();
    let cubes = device
        .create_texture(
            &TextureDescriptor::texture_cube(32, 1, 2, PixelFormat::RGBA8Unorm, TextureUsage::SAMPLED),
            None,
        )
        .unwrap();
    let second = device
        .shader_resource_view(cubes, &TextureViewRange::new(0, REMAINING, 1, 1))
        .unwrap();
    let info = device.texture_view_info(second).unwrap();
    assert_eq!(info.dimension, ViewDimension::TextureCube);
    assert_eq!((info.key.base_layer, info.key.layer_count), (1, 1));

    let native = backend(&device).calls().into_iter().find_map(|c| match c {
        NativeCall::CreateTextureView { view, desc, .. } if view == second => {
            Some((desc.base_layer, desc.layer_count))
        }
        _ => None,
    });
    assert_eq!(native, Some((6, 6)));
}
