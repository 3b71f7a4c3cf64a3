#![allow(dead_code)]

use dashi_hal::*;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn empty_descriptor(validation: bool) -> DeviceDescriptor {
    DeviceDescriptor {
        validation,
        ..DeviceDescriptor::with_backend(Backend::Empty)
    }
}

/// An `Empty`-backend device with validation on.
pub fn empty_device() -> Device {
    device_with_validation(true)
}

pub fn device_with_validation(validation: bool) -> Device {
    init_logging();
    Device::create(&empty_descriptor(validation)).expect("empty backend is always available")
}

pub fn backend(device: &Device) -> &EmptyDevice {
    device
        .empty_backend()
        .expect("device was created on the empty backend")
}

/// Drains the native call log.
pub fn calls(device: &Device) -> Vec<NativeCall> {
    backend(device).take_calls()
}

pub fn shader(device: &Device, stage: ShaderStage) -> Handle<Shader> {
    device
        .create_shader(&ShaderDescriptor::new(stage, vec![0x03, 0x02, 0x23, 0x07]))
        .unwrap()
}

/// A pipeline reading one `Float3` position from slot 0.
pub fn position_pipeline(device: &Device) -> Handle<RenderPipeline> {
    let vs = shader(device, ShaderStage::Vertex);
    let fs = shader(device, ShaderStage::Fragment);
    device
        .create_render_pipeline(&RenderPipelineDescriptor {
            vertex_shader: vs,
            fragment_shader: Some(fs),
            vertex_attributes: vec![VertexAttribute {
                format: VertexFormat::Float3,
                buffer_slot: 0,
                offset: 0,
                shader_location: 0,
            }],
            color_formats: vec![PixelFormat::RGBA8Unorm],
            ..Default::default()
        })
        .unwrap()
}

pub fn vertex_buffer(device: &Device) -> Handle<Buffer> {
    device
        .create_buffer_from(BufferUsage::VERTEX, &[0.0f32; 9])
        .unwrap()
}

/// A color target plus an optional depth target, wrapped in a framebuffer.
pub fn framebuffer(
    device: &Device,
    width: u32,
    height: u32,
    depth_format: Option<PixelFormat>,
) -> Handle<Framebuffer> {
    let color = device
        .create_texture(
            &TextureDescriptor::render_target(width, height, PixelFormat::RGBA8Unorm, SampleCount::S1),
            None,
        )
        .unwrap();
    let depth = depth_format.map(|format| {
        device
            .create_texture(
                &TextureDescriptor::render_target(width, height, format, SampleCount::S1),
                None,
            )
            .unwrap()
    });
    device
        .create_framebuffer(&FramebufferDescriptor {
            color_attachments: vec![FramebufferAttachment::new(color)],
            depth_stencil_attachment: depth.map(FramebufferAttachment::new),
        })
        .unwrap()
}
