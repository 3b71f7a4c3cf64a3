//! Per-texture memoization of derived views.
//!
//! A request is first normalized against the texture's real mip and layer
//! counts, so a range spelled with [`REMAINING`] and the same range spelled
//! with explicit counts land on one cache entry.

use std::collections::HashMap;

use super::driver::types::TextureUsage;
use super::error::{GPUError, Result};
use super::format::PixelFormat;
use super::resources::TextureView;
use super::structs::{TextureDescriptor, TextureType, REMAINING};
use crate::utils::Handle;

#[repr(u32)]
#[derive(Hash, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViewKind {
    ShaderResource,
    RenderTarget,
    DepthStencil,
    UnorderedAccess,
}

impl ViewKind {
    pub const ALL: [ViewKind; 4] = [
        ViewKind::ShaderResource,
        ViewKind::RenderTarget,
        ViewKind::DepthStencil,
        ViewKind::UnorderedAccess,
    ];

    fn index(self) -> usize {
        self as usize
    }

    /// Attachment and storage views address a single mip.
    fn single_mip(self) -> bool {
        !matches!(self, ViewKind::ShaderResource)
    }
}

/// Sub-resource range as requested by the caller. Counts may be
/// [`REMAINING`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureViewRange {
    pub base_mip: u32,
    pub mip_count: u32,
    pub base_layer: u32,
    pub layer_count: u32,
}

impl Default for TextureViewRange {
    fn default() -> Self {
        Self::whole()
    }
}

impl TextureViewRange {
    pub fn new(base_mip: u32, mip_count: u32, base_layer: u32, layer_count: u32) -> Self {
        Self {
            base_mip,
            mip_count,
            base_layer,
            layer_count,
        }
    }

    pub fn whole() -> Self {
        Self::new(0, REMAINING, 0, REMAINING)
    }

    /// One mip of one layer; the range framebuffer attachments use.
    pub fn single(level: u32, layer: u32) -> Self {
        Self::new(level, 1, layer, 1)
    }
}

/// Normalized range, the cache key. Every field is an explicit in-bounds
/// value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ViewKey {
    pub base_mip: u32,
    pub mip_count: u32,
    pub base_layer: u32,
    pub layer_count: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ViewDimension {
    Texture1D,
    Texture1DArray,
    Texture2D,
    Texture2DArray,
    Texture2DMS,
    Texture2DMSArray,
    Texture3D,
    TextureCube,
    TextureCubeArray,
}

/// What the backend needs to build one native view. Layer values are in
/// native layers: cube faces for cube textures, depth slices for 3D
/// attachment and storage views.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NativeViewDesc {
    pub kind: ViewKind,
    pub format: PixelFormat,
    pub dimension: ViewDimension,
    pub base_mip: u32,
    pub mip_count: u32,
    pub base_layer: u32,
    pub layer_count: u32,
}

/// Layers addressable by `kind` at `mip`. For 3D textures, attachment and
/// storage views walk depth slices; shader-resource views see one volume.
fn layer_bound(kind: ViewKind, desc: &TextureDescriptor, mip: u32) -> u32 {
    match desc.texture_type {
        TextureType::Type3D if kind.single_mip() => desc.mip_depth(mip),
        TextureType::Type3D => 1,
        _ => desc.array_layers.max(1),
    }
}

fn resolve_count(requested: u32, available: u32) -> u32 {
    if requested == REMAINING {
        available
    } else {
        requested.clamp(1, available)
    }
}

/// Clamps and resolves `range` against the texture it targets.
pub fn normalize(kind: ViewKind, desc: &TextureDescriptor, range: &TextureViewRange) -> ViewKey {
    let mips = desc.mip_levels.max(1);
    let base_mip = range.base_mip.min(mips - 1);
    let mip_count = if kind.single_mip() {
        1
    } else {
        resolve_count(range.mip_count, mips - base_mip)
    };

    let layers = layer_bound(kind, desc, base_mip);
    let base_layer = range.base_layer.min(layers - 1);
    let layer_count = resolve_count(range.layer_count, layers - base_layer);

    ViewKey {
        base_mip,
        mip_count,
        base_layer,
        layer_count,
    }
}

/// Cube shader-resource views are arrays only when they cover more than one
/// cube; other types follow the texture's layer count.
pub fn view_dimension(kind: ViewKind, desc: &TextureDescriptor, key: &ViewKey) -> ViewDimension {
    let arrayed = desc.array_layers > 1;
    let multisampled = desc.sample_count.count() > 1;
    match desc.texture_type {
        TextureType::Type1D if arrayed => ViewDimension::Texture1DArray,
        TextureType::Type1D => ViewDimension::Texture1D,
        TextureType::Type2D => match (multisampled, arrayed) {
            (true, true) => ViewDimension::Texture2DMSArray,
            (true, false) => ViewDimension::Texture2DMS,
            (false, true) => ViewDimension::Texture2DArray,
            (false, false) => ViewDimension::Texture2D,
        },
        TextureType::Type3D => ViewDimension::Texture3D,
        TextureType::TypeCube => match kind {
            ViewKind::ShaderResource if key.layer_count > 1 => ViewDimension::TextureCubeArray,
            ViewKind::ShaderResource => ViewDimension::TextureCube,
            _ if multisampled => ViewDimension::Texture2DMSArray,
            _ => ViewDimension::Texture2DArray,
        },
    }
}

pub fn native_view_desc(kind: ViewKind, desc: &TextureDescriptor, key: &ViewKey) -> NativeViewDesc {
    let faces = match desc.texture_type {
        TextureType::TypeCube => 6,
        _ => 1,
    };

    NativeViewDesc {
        kind,
        format: desc.format,
        dimension: view_dimension(kind, desc, key),
        base_mip: key.base_mip,
        mip_count: key.mip_count,
        base_layer: key.base_layer * faces,
        layer_count: key.layer_count * faces,
    }
}

/// Checks that `desc` can be viewed as `kind` at all.
pub fn validate_kind(kind: ViewKind, desc: &TextureDescriptor) -> Result<()> {
    let (required, what) = match kind {
        ViewKind::ShaderResource => (TextureUsage::SAMPLED, "sampled"),
        ViewKind::RenderTarget | ViewKind::DepthStencil => {
            (TextureUsage::RENDER_TARGET, "render-target")
        }
        ViewKind::UnorderedAccess => (TextureUsage::STORAGE, "storage"),
    };
    if !desc.usage.contains(required) {
        return Err(GPUError::validation(format!(
            "{kind:?} view needs {what} usage, texture has {:?}",
            desc.usage
        )));
    }

    let depth = desc.format.is_depth_stencil();
    match kind {
        ViewKind::RenderTarget if depth => Err(GPUError::validation(format!(
            "depth format {:?} cannot be a render-target view",
            desc.format
        ))),
        ViewKind::DepthStencil if !depth => Err(GPUError::validation(format!(
            "color format {:?} cannot be a depth-stencil view",
            desc.format
        ))),
        ViewKind::DepthStencil if desc.texture_type == TextureType::Type3D => Err(
            GPUError::validation("3D textures have no depth-stencil views"),
        ),
        _ => Ok(()),
    }
}

/// Views created from one texture, one map per [`ViewKind`].
#[derive(Default, Debug)]
pub struct ViewCache {
    maps: [HashMap<ViewKey, Handle<TextureView>>; 4],
}

impl ViewCache {
    pub fn get(&self, kind: ViewKind, key: &ViewKey) -> Option<Handle<TextureView>> {
        self.maps[kind.index()].get(key).copied()
    }

    pub fn insert(&mut self, kind: ViewKind, key: ViewKey, view: Handle<TextureView>) {
        self.maps[kind.index()].insert(key, view);
    }

    pub fn len(&self) -> usize {
        self.maps.iter().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.iter().all(HashMap::is_empty)
    }

    /// Empties every map at once and returns the views that were cached.
    pub fn clear(&mut self) -> Vec<Handle<TextureView>> {
        let mut out = Vec::with_capacity(self.len());
        for map in &mut self.maps {
            out.extend(map.drain().map(|(_, v)| v));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::structs::SampleCount;

    fn tex_2d(mips: u32, layers: u32) -> TextureDescriptor {
        TextureDescriptor::texture_2d(
            256,
            256,
            mips,
            layers,
            PixelFormat::RGBA8Unorm,
            TextureUsage::SAMPLED | TextureUsage::RENDER_TARGET | TextureUsage::STORAGE,
        )
    }

    #[test]
    fn sentinel_and_explicit_ranges_share_a_key() {
        let desc = tex_2d(4, 3);
        let a = normalize(ViewKind::ShaderResource, &desc, &TextureViewRange::whole());
        let b = normalize(
            ViewKind::ShaderResource,
            &desc,
            &TextureViewRange::new(0, 4, 0, 3),
        );
        assert_eq!(a, b);
        assert_eq!(a, ViewKey { base_mip: 0, mip_count: 4, base_layer: 0, layer_count: 3 });
    }

    #[test]
    fn out_of_range_requests_are_clamped() {
        let desc = tex_2d(4, 3);
        let key = normalize(
            ViewKind::ShaderResource,
            &desc,
            &TextureViewRange::new(9, 9, 7, 9),
        );
        assert_eq!(key, ViewKey { base_mip: 3, mip_count: 1, base_layer: 2, layer_count: 1 });

        let key = normalize(
            ViewKind::ShaderResource,
            &desc,
            &TextureViewRange::new(1, 10, 1, REMAINING),
        );
        assert_eq!(key, ViewKey { base_mip: 1, mip_count: 3, base_layer: 1, layer_count: 2 });
    }

    #[test]
    fn attachment_views_cover_one_mip() {
        let desc = tex_2d(4, 1);
        let key = normalize(ViewKind::RenderTarget, &desc, &TextureViewRange::whole());
        assert_eq!(key.mip_count, 1);
        assert_eq!(key.layer_count, 1);
    }

    #[test]
    fn three_d_attachments_walk_depth_slices() {
        let desc = TextureDescriptor::texture_3d(
            32,
            32,
            8,
            2,
            PixelFormat::RGBA8Unorm,
            TextureUsage::SAMPLED | TextureUsage::RENDER_TARGET,
        );
        let rtv = normalize(ViewKind::RenderTarget, &desc, &TextureViewRange::single(1, 5));
        // mip 1 has 4 slices
        assert_eq!(rtv, ViewKey { base_mip: 1, mip_count: 1, base_layer: 3, layer_count: 1 });

        let srv = normalize(ViewKind::ShaderResource, &desc, &TextureViewRange::whole());
        assert_eq!(srv.layer_count, 1);
        assert_eq!(view_dimension(ViewKind::ShaderResource, &desc, &srv), ViewDimension::Texture3D);
    }

    #[test]
    fn dimensions_follow_texture_type() {
        let key = ViewKey { base_mip: 0, mip_count: 1, base_layer: 0, layer_count: 1 };
        let mut desc = tex_2d(1, 1);
        assert_eq!(view_dimension(ViewKind::ShaderResource, &desc, &key), ViewDimension::Texture2D);
        desc.array_layers = 4;
        assert_eq!(view_dimension(ViewKind::ShaderResource, &desc, &key), ViewDimension::Texture2DArray);
        desc.sample_count = SampleCount::S4;
        assert_eq!(view_dimension(ViewKind::RenderTarget, &desc, &key), ViewDimension::Texture2DMSArray);
        desc.array_layers = 1;
        assert_eq!(view_dimension(ViewKind::RenderTarget, &desc, &key), ViewDimension::Texture2DMS);

        let mut line = desc;
        line.texture_type = TextureType::Type1D;
        line.sample_count = SampleCount::S1;
        assert_eq!(view_dimension(ViewKind::ShaderResource, &line, &key), ViewDimension::Texture1D);
        line.array_layers = 2;
        assert_eq!(view_dimension(ViewKind::ShaderResource, &line, &key), ViewDimension::Texture1DArray);
    }

    #[test]
    fn cube_views_multiply_layers_by_six() {
        let desc = TextureDescriptor::texture_cube(
            64,
            1,
            2,
            PixelFormat::RGBA8Unorm,
            TextureUsage::SAMPLED | TextureUsage::RENDER_TARGET,
        );
        let key = normalize(ViewKind::ShaderResource, &desc, &TextureViewRange::new(0, 1, 1, 1));
        let native = native_view_desc(ViewKind::ShaderResource, &desc, &key);
        assert_eq!(native.dimension, ViewDimension::TextureCube);
        assert_eq!((native.base_layer, native.layer_count), (6, 6));

        let both = normalize(ViewKind::ShaderResource, &desc, &TextureViewRange::whole());
        let native = native_view_desc(ViewKind::ShaderResource, &desc, &both);
        assert_eq!(native.dimension, ViewDimension::TextureCubeArray);
        assert_eq!((native.base_layer, native.layer_count), (0, 12));

        let rtv_key = normalize(ViewKind::RenderTarget, &desc, &TextureViewRange::single(0, 0));
        let rtv = native_view_desc(ViewKind::RenderTarget, &desc, &rtv_key);
        assert_eq!(rtv.dimension, ViewDimension::Texture2DArray);
        assert_eq!(rtv.layer_count, 6);

        let single = TextureDescriptor { array_layers: 1, ..desc };
        let single_key = normalize(ViewKind::ShaderResource, &single, &TextureViewRange::whole());
        assert_eq!(
            view_dimension(ViewKind::ShaderResource, &single, &single_key),
            ViewDimension::TextureCube
        );
    }

    #[test]
    fn kind_validation() {
        let color = tex_2d(1, 1);
        assert!(validate_kind(ViewKind::RenderTarget, &color).is_ok());
        assert!(matches!(
            validate_kind(ViewKind::DepthStencil, &color),
            Err(GPUError::ValidationError(_))
        ));

        let depth = TextureDescriptor::render_target(64, 64, PixelFormat::D32Float, SampleCount::S1);
        assert!(validate_kind(ViewKind::DepthStencil, &depth).is_ok());
        assert!(validate_kind(ViewKind::RenderTarget, &depth).is_err());
        assert!(validate_kind(ViewKind::UnorderedAccess, &depth).is_err());
    }

    #[test]
    fn clear_is_wholesale() {
        let mut cache = ViewCache::default();
        let key = ViewKey { base_mip: 0, mip_count: 1, base_layer: 0, layer_count: 1 };
        let mut pool = crate::utils::Pool::<TextureView>::new(4);
        let view = pool
            .insert(TextureView::placeholder())
            .unwrap();
        cache.insert(ViewKind::ShaderResource, key, view);
        cache.insert(ViewKind::RenderTarget, key, view);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.clear().len(), 2);
        assert!(cache.is_empty());
        assert!(cache.get(ViewKind::ShaderResource, &key).is_none());
    }
}
