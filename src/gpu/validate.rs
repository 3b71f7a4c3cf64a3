//! Descriptor checks that run before anything reaches the native layer.

use super::driver::types::TextureUsage;
use super::error::{GPUError, Result};
use super::format::PixelFormat;
use super::structs::*;

pub(crate) fn buffer(desc: &BufferDescriptor, initial_data: Option<&[u8]>) -> Result<()> {
    if desc.usage.is_empty() {
        return Err(GPUError::invalid("buffer usage is empty"));
    }
    if desc.element_count == 0 || desc.element_size == 0 {
        return Err(GPUError::invalid(format!(
            "buffer has zero size ({} elements of {} bytes)",
            desc.element_count, desc.element_size
        )));
    }
    if let Some(data) = initial_data {
        if data.len() as u64 > desc.size() {
            return Err(GPUError::invalid(format!(
                "initial data is {} bytes, buffer holds {}",
                data.len(),
                desc.size()
            )));
        }
    }
    Ok(())
}

fn max_dimension(ty: TextureType, limits: &DeviceLimits) -> u32 {
    match ty {
        TextureType::Type1D => limits.max_texture_dimension_1d,
        TextureType::Type2D => limits.max_texture_dimension_2d,
        TextureType::Type3D => limits.max_texture_dimension_3d,
        TextureType::TypeCube => limits.max_texture_dimension_cube,
    }
}

/// Validates `desc` and returns it with `mip_levels = 0` resolved to the
/// full chain.
pub(crate) fn texture(desc: &TextureDescriptor, limits: &DeviceLimits) -> Result<TextureDescriptor> {
    if desc.width == 0 || desc.height == 0 || desc.depth == 0 {
        return Err(GPUError::invalid(format!(
            "texture extent {}x{}x{} has a zero dimension",
            desc.width, desc.height, desc.depth
        )));
    }
    if desc.array_layers == 0 || desc.array_layers > MAX_TEXTURE_ARRAY_LAYERS {
        return Err(GPUError::invalid(format!(
            "texture array size {} is outside 1..={MAX_TEXTURE_ARRAY_LAYERS}",
            desc.array_layers
        )));
    }
    if desc.format == PixelFormat::Undefined {
        return Err(GPUError::invalid("texture format is undefined"));
    }
    if desc.usage.is_empty() {
        return Err(GPUError::invalid("texture usage is empty"));
    }
    if desc.format.is_depth_stencil() && desc.usage.contains(TextureUsage::STORAGE) {
        return Err(GPUError::invalid(format!(
            "depth format {:?} cannot be used as a storage texture",
            desc.format
        )));
    }

    let largest = match desc.texture_type {
        TextureType::Type1D => {
            if desc.height != 1 || desc.depth != 1 {
                return Err(GPUError::invalid("1D textures must have height and depth 1"));
            }
            desc.width
        }
        TextureType::Type2D => {
            if desc.depth != 1 {
                return Err(GPUError::invalid("2D textures must have depth 1"));
            }
            desc.width.max(desc.height)
        }
        TextureType::TypeCube => {
            if desc.width != desc.height || desc.depth != 1 {
                return Err(GPUError::invalid("cube faces must be square with depth 1"));
            }
            desc.width
        }
        TextureType::Type3D => {
            if desc.array_layers != 1 {
                return Err(GPUError::invalid("3D textures cannot be arrays"));
            }
            desc.width.max(desc.height).max(desc.depth)
        }
    };
    let max = max_dimension(desc.texture_type, limits);
    if largest > max {
        return Err(GPUError::invalid(format!(
            "{:?} texture dimension {largest} exceeds device limit {max}",
            desc.texture_type
        )));
    }
    if desc.array_layers > limits.max_texture_array_layers {
        return Err(GPUError::invalid(format!(
            "texture array size {} exceeds device limit {}",
            desc.array_layers, limits.max_texture_array_layers
        )));
    }

    let full_chain = desc.full_mip_count();
    let mip_levels = match desc.mip_levels {
        0 => full_chain,
        n if n > full_chain => {
            return Err(GPUError::invalid(format!(
                "{n} mip levels requested, a {}x{} texture has at most {full_chain}",
                desc.width, desc.height
            )))
        }
        n => n,
    };

    if desc.sample_count != SampleCount::S1 {
        if desc.texture_type != TextureType::Type2D {
            return Err(GPUError::invalid("only 2D textures can be multisampled"));
        }
        if mip_levels > 1 {
            return Err(GPUError::invalid("multisampled textures cannot have mips"));
        }
    }

    Ok(TextureDescriptor {
        mip_levels,
        ..*desc
    })
}

pub(crate) fn sampler(desc: &SamplerDescriptor) -> Result<()> {
    if desc.max_anisotropy == 0 || desc.max_anisotropy > 16 {
        return Err(GPUError::invalid(format!(
            "max anisotropy {} is outside 1..=16",
            desc.max_anisotropy
        )));
    }
    if desc.lod_min_clamp > desc.lod_max_clamp {
        return Err(GPUError::invalid(format!(
            "lod range {}..{} is inverted",
            desc.lod_min_clamp, desc.lod_max_clamp
        )));
    }
    Ok(())
}

pub(crate) fn shader(desc: &ShaderDescriptor) -> Result<()> {
    if desc.code.is_empty() {
        return Err(GPUError::invalid("shader code is empty"));
    }
    if desc.entry_point.is_empty() {
        return Err(GPUError::invalid("shader entry point is empty"));
    }
    Ok(())
}

/// Checks one framebuffer attachment against its texture and returns the
/// attachment's extent at the selected mip.
pub(crate) fn attachment(
    desc: &TextureDescriptor,
    att: &FramebufferAttachment,
    depth: bool,
) -> Result<(u32, u32)> {
    if att.level >= desc.mip_levels {
        return Err(GPUError::invalid(format!(
            "attachment level {} is beyond the texture's {} mips",
            att.level, desc.mip_levels
        )));
    }
    let slices = match desc.texture_type {
        TextureType::Type3D => desc.depth,
        _ => desc.array_layers,
    };
    if att.slice >= slices {
        return Err(GPUError::invalid(format!(
            "attachment slice {} is beyond the texture's {slices} slices",
            att.slice
        )));
    }
    if depth != desc.format.is_depth_stencil() {
        let role = if depth { "depth-stencil" } else { "color" };
        return Err(GPUError::validation(format!(
            "{:?} cannot be bound as a {role} attachment",
            desc.format
        )));
    }
    if !desc.usage.contains(TextureUsage::RENDER_TARGET) {
        return Err(GPUError::validation(
            "attachment texture was created without RENDER_TARGET usage",
        ));
    }
    Ok((desc.mip_width(att.level), desc.mip_height(att.level)))
}

pub(crate) fn render_pipeline(desc: &RenderPipelineDescriptor) -> Result<()> {
    if desc.vertex_attributes.len() > MAX_VERTEX_ATTRIBUTES {
        return Err(GPUError::invalid(format!(
            "{} vertex attributes, at most {MAX_VERTEX_ATTRIBUTES} are supported",
            desc.vertex_attributes.len()
        )));
    }
    if let Some(attr) = desc
        .vertex_attributes
        .iter()
        .find(|a| a.buffer_slot as usize >= MAX_VERTEX_BUFFER_BINDINGS)
    {
        return Err(GPUError::invalid(format!(
            "vertex attribute at location {} reads slot {}, only {MAX_VERTEX_BUFFER_BINDINGS} exist",
            attr.shader_location, attr.buffer_slot
        )));
    }
    if desc.color_formats.len() > MAX_COLOR_ATTACHMENTS {
        return Err(GPUError::invalid(format!(
            "{} color formats, at most {MAX_COLOR_ATTACHMENTS} attachments",
            desc.color_formats.len()
        )));
    }
    if let Some(format) = desc.color_formats.iter().find(|f| f.is_depth_stencil()) {
        return Err(GPUError::invalid(format!("{format:?} is not a color format")));
    }
    if let Some(format) = desc.depth_stencil_format {
        if !format.is_depth_stencil() {
            return Err(GPUError::invalid(format!("{format:?} is not a depth format")));
        }
    }
    if desc.primitive_topology == PrimitiveTopology::PatchList
        && !(1..=32).contains(&desc.patch_control_points)
    {
        return Err(GPUError::invalid(format!(
            "patch lists need 1..=32 control points, got {}",
            desc.patch_control_points
        )));
    }
    Ok(())
}

pub(crate) fn swap_chain(desc: &SwapChainDescriptor) -> Result<()> {
    if desc.width == 0 || desc.height == 0 {
        return Err(GPUError::invalid(format!(
            "swap chain extent {}x{} has a zero dimension",
            desc.width, desc.height
        )));
    }
    if desc.color_format.is_depth_stencil() || desc.color_format == PixelFormat::Undefined {
        return Err(GPUError::invalid(format!(
            "{:?} cannot be a back-buffer format",
            desc.color_format
        )));
    }
    if let Some(format) = desc.depth_stencil_format {
        if !format.is_depth_stencil() {
            return Err(GPUError::invalid(format!("{format:?} is not a depth format")));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::driver::types::BufferUsage;

    #[test]
    fn buffers_need_usage_and_size() {
        let ok = BufferDescriptor::new(BufferUsage::VERTEX, 4, 16);
        assert!(buffer(&ok, Some(&[0u8; 64])).is_ok());
        assert!(buffer(&ok, Some(&[0u8; 65])).is_err());
        assert!(buffer(&BufferDescriptor::new(BufferUsage::empty(), 4, 16), None).is_err());
        assert!(buffer(&BufferDescriptor::new(BufferUsage::INDEX, 0, 2), None).is_err());
        assert!(buffer(&BufferDescriptor::new(BufferUsage::INDEX, 8, 0), None).is_err());
    }

    #[test]
    fn zero_mips_resolve_to_full_chain() {
        let desc = TextureDescriptor::texture_2d(
            64,
            16,
            0,
            1,
            PixelFormat::RGBA8Unorm,
            TextureUsage::SAMPLED,
        );
        let resolved = texture(&desc, &DeviceLimits::default()).unwrap();
        assert_eq!(resolved.mip_levels, 7);
    }

    #[test]
    fn texture_rejections() {
        let limits = DeviceLimits::default();
        let base = TextureDescriptor::texture_2d(
            128,
            128,
            1,
            1,
            PixelFormat::RGBA8Unorm,
            TextureUsage::SAMPLED,
        );
        let cases = [
            TextureDescriptor { width: 0, ..base },
            TextureDescriptor { array_layers: 0, ..base },
            TextureDescriptor { array_layers: 2049, ..base },
            TextureDescriptor { format: PixelFormat::Undefined, ..base },
            TextureDescriptor { width: 32768, ..base },
            TextureDescriptor { mip_levels: 9, ..base },
            TextureDescriptor {
                sample_count: SampleCount::S4,
                mip_levels: 2,
                ..base
            },
            TextureDescriptor {
                format: PixelFormat::D32Float,
                usage: TextureUsage::STORAGE,
                ..base
            },
        ];
        for case in cases {
            assert!(
                matches!(texture(&case, &limits), Err(GPUError::InvalidDescriptor(_))),
                "{case:?} was accepted"
            );
        }
    }

    #[test]
    fn sampler_ranges() {
        assert!(sampler(&SamplerDescriptor::default()).is_ok());
        let aniso = SamplerDescriptor {
            max_anisotropy: 0,
            ..Default::default()
        };
        assert!(sampler(&aniso).is_err());
        let lod = SamplerDescriptor {
            lod_min_clamp: 4.0,
            lod_max_clamp: 1.0,
            ..Default::default()
        };
        assert!(sampler(&lod).is_err());
    }

    #[test]
    fn attachment_roles() {
        let depth = TextureDescriptor::render_target(64, 32, PixelFormat::D24UnormS8Uint, SampleCount::S1);
        let att = FramebufferAttachment::default();
        assert_eq!(attachment(&depth, &att, true).unwrap(), (64, 32));
        assert!(matches!(
            attachment(&depth, &att, false),
            Err(GPUError::ValidationError(_))
        ));

        let sampled_only = TextureDescriptor::texture_2d(
            64,
            64,
            1,
            1,
            PixelFormat::RGBA8Unorm,
            TextureUsage::SAMPLED,
        );
        assert!(matches!(
            attachment(&sampled_only, &att, false),
            Err(GPUError::ValidationError(_))
        ));

        let level = FramebufferAttachment { level: 1, ..att };
        assert!(matches!(
            attachment(&depth, &level, true),
            Err(GPUError::InvalidDescriptor(_))
        ));
    }

    #[test]
    fn pipeline_attribute_limits() {
        let mut desc = RenderPipelineDescriptor::default();
        desc.vertex_attributes.push(VertexAttribute {
            buffer_slot: 4,
            ..Default::default()
        });
        assert!(render_pipeline(&desc).is_err());

        desc.vertex_attributes = vec![VertexAttribute::default(); 17];
        assert!(render_pipeline(&desc).is_err());

        desc.vertex_attributes.truncate(2);
        desc.primitive_topology = PrimitiveTopology::PatchList;
        assert!(render_pipeline(&desc).is_err());
        desc.patch_control_points = 3;
        assert!(render_pipeline(&desc).is_ok());
    }
}
