//! Vulkan backend.
//!
//! Needs Vulkan 1.3: attachments are bound with dynamic rendering and
//! every command context retires its submissions on a timeline semaphore.
//! Images other than back buffers stay in `GENERAL` layout for their whole
//! lifetime, so no layout tracking is needed outside the swap chain.

mod commands;
mod conversions;
mod error;
mod swapchain;

pub use commands::VulkanCommands;

use std::collections::HashMap;
use std::ffi::{c_char, c_void, CStr, CString};
use std::io::Cursor;
use std::mem::ManuallyDrop;
use std::sync::Arc;

use ash::extensions::{ext::DebugUtils, khr};
use ash::vk;
use log::{debug, error, info, trace, warn};
use parking_lot::Mutex;
use smallvec::SmallVec;
use vk_mem::Alloc;

use self::conversions::{aspect, buffer_usage, stencil_face, texture_usage, view_aspect};
use self::error::creation;
use self::swapchain::VulkanSwapChain;
use super::backend::Backend;
use super::error::{GPUError, Result};
use super::format::PixelFormat;
use super::native::{PresentStatus, RenderPipelineInfo, ResizeOutcome, SwapChainInfo};
use super::resources::*;
use super::structs::*;
use super::view_cache::NativeViewDesc;
use crate::utils::Handle;

const VALIDATION_LAYER: &[u8] = b"VK_LAYER_KHRONOS_validation\0";

/// Size of the buffer bound to vertex slots that have no buffer.
const NULL_VERTEX_BUFFER_SIZE: u64 = 256;

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    ty: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut c_void,
) -> vk::Bool32 {
    if data.is_null() || unsafe { (*data).p_message.is_null() } {
        return vk::FALSE;
    }
    let message = unsafe { CStr::from_ptr((*data).p_message) }.to_string_lossy();
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        error!("[vulkan {ty:?}] {message}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        warn!("[vulkan {ty:?}] {message}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        debug!("[vulkan {ty:?}] {message}");
    } else {
        trace!("[vulkan {ty:?}] {message}");
    }
    vk::FALSE
}

/// True when a Vulkan 1.3 loader and at least one physical device exist.
pub fn probe() -> bool {
    let entry = match unsafe { ash::Entry::load() } {
        Ok(entry) => entry,
        Err(err) => {
            debug!("vulkan loader unavailable: {err}");
            return false;
        }
    };
    let app = vk::ApplicationInfo::builder().api_version(vk::API_VERSION_1_3);
    let create = vk::InstanceCreateInfo::builder().application_info(&app);
    let instance = match unsafe { entry.create_instance(&create, None) } {
        Ok(instance) => instance,
        Err(err) => {
            debug!("vulkan instance creation failed while probing: {err}");
            return false;
        }
    };
    let found = unsafe { instance.enumerate_physical_devices() }
        .map(|devices| !devices.is_empty())
        .unwrap_or(false);
    unsafe { instance.destroy_instance(None) };
    found
}

pub(super) struct VkBuffer {
    raw: vk::Buffer,
    alloc: vk_mem::Allocation,
}

pub(super) struct VkTexture {
    raw: vk::Image,
    /// `None` for swap-chain images, which the chain owns.
    alloc: Option<vk_mem::Allocation>,
    desc: TextureDescriptor,
}

#[derive(Clone, Copy)]
pub(super) struct VkView {
    pub(super) raw: vk::ImageView,
    pub(super) texture: Handle<Texture>,
    pub(super) format: PixelFormat,
    pub(super) aspect: vk::ImageAspectFlags,
    pub(super) range: vk::ImageSubresourceRange,
    pub(super) image: vk::Image,
}

struct VkShader {
    module: vk::ShaderModule,
    entry: CString,
}

impl VkShader {
    fn stage(&self, stage: vk::ShaderStageFlags) -> vk::PipelineShaderStageCreateInfo {
        vk::PipelineShaderStageCreateInfo::builder()
            .stage(stage)
            .module(self.module)
            .name(&self.entry)
            .build()
    }
}

/// Everything needed to bake a pipeline once the input layout and the
/// topology used at draw time are known.
struct VkRenderPipeline {
    vertex_shader: Handle<Shader>,
    fragment_shader: Option<Handle<Shader>>,
    patch_control_points: u32,
    rasterizer: RasterizerStateDescriptor,
    depth_stencil: DepthStencilStateDescriptor,
    blend: BlendStateDescriptor,
    color_formats: SmallVec<[PixelFormat; MAX_COLOR_ATTACHMENTS]>,
    depth_stencil_format: Option<PixelFormat>,
    sample_count: SampleCount,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(super) struct VariantKey {
    pub(super) pipeline: Handle<RenderPipeline>,
    pub(super) layout: Option<Handle<InputLayout>>,
    pub(super) topology: PrimitiveTopology,
}

#[derive(Default)]
pub(super) struct Objects {
    buffers: HashMap<Handle<Buffer>, VkBuffer>,
    textures: HashMap<Handle<Texture>, VkTexture>,
    views: HashMap<Handle<TextureView>, VkView>,
    samplers: HashMap<Handle<Sampler>, vk::Sampler>,
    shaders: HashMap<Handle<Shader>, VkShader>,
    // Fixed-function state is baked into pipelines; the handles only name
    // descriptors.
    rasterizer_states: HashMap<Handle<RasterizerState>, RasterizerStateDescriptor>,
    depth_stencil_states: HashMap<Handle<DepthStencilState>, DepthStencilStateDescriptor>,
    blend_states: HashMap<Handle<BlendState>, BlendStateDescriptor>,
    input_layouts: HashMap<Handle<InputLayout>, InputLayoutDesc>,
    render_pipelines: HashMap<Handle<RenderPipeline>, VkRenderPipeline>,
    variants: HashMap<VariantKey, vk::Pipeline>,
    compute_pipelines: HashMap<Handle<ComputePipeline>, vk::Pipeline>,
}

impl Objects {
    pub(super) fn buffer(&self, buffer: Handle<Buffer>) -> Result<vk::Buffer> {
        self.buffers
            .get(&buffer)
            .map(|b| b.raw)
            .ok_or(GPUError::InvalidHandle("buffer"))
    }

    pub(super) fn view(&self, view: Handle<TextureView>) -> Result<VkView> {
        self.views
            .get(&view)
            .copied()
            .ok_or(GPUError::InvalidHandle("texture view"))
    }

    pub(super) fn compute_pipeline(&self, pipeline: Handle<ComputePipeline>) -> Result<vk::Pipeline> {
        self.compute_pipelines
            .get(&pipeline)
            .copied()
            .ok_or(GPUError::InvalidHandle("compute pipeline"))
    }
}

struct UploadPool {
    pool: vk::CommandPool,
    fence: vk::Fence,
}

pub(super) struct Inner {
    pub(super) entry: ash::Entry,
    pub(super) instance: ash::Instance,
    pub(super) pdevice: vk::PhysicalDevice,
    pub(super) device: ash::Device,
    pub(super) queue_family: u32,
    pub(super) queue: Mutex<vk::Queue>,
    allocator: ManuallyDrop<vk_mem::Allocator>,
    debug: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
    pub(super) surface_loader: khr::Surface,
    swapchain_loader: Option<khr::Swapchain>,
    limits: DeviceLimits,
    features: DeviceFeatures,
    pipeline_layout: vk::PipelineLayout,
    pub(super) null_vertex_buffer: vk::Buffer,
    null_vertex_alloc: Mutex<Option<vk_mem::Allocation>>,
    upload: Mutex<UploadPool>,
    pub(super) objects: Mutex<Objects>,
    pub(super) swap_chain: Mutex<Option<VulkanSwapChain>>,
}

fn instance_extensions(entry: &ash::Entry, validation: bool) -> Result<(Vec<*const c_char>, bool)> {
    let available = entry.enumerate_instance_extension_properties(None)?;
    let has = |name: &CStr| {
        available
            .iter()
            .any(|prop| unsafe { CStr::from_ptr(prop.extension_name.as_ptr()) } == name)
    };

    let mut names = Vec::new();
    if has(khr::Surface::name()) {
        names.push(khr::Surface::name().as_ptr());
        // Every platform surface the loader knows; the window decides which
        // one is used when a swap chain is configured.
        for platform in [
            khr::XlibSurface::name(),
            khr::XcbSurface::name(),
            khr::WaylandSurface::name(),
            khr::Win32Surface::name(),
            khr::AndroidSurface::name(),
            ash::extensions::ext::MetalSurface::name(),
        ] {
            if has(platform) {
                names.push(platform.as_ptr());
            }
        }
    }

    let debug_utils = validation && has(DebugUtils::name());
    if debug_utils {
        names.push(DebugUtils::name().as_ptr());
    }
    Ok((names, debug_utils))
}

fn pick_physical_device(
    instance: &ash::Instance,
    preference: PowerPreference,
) -> Result<(vk::PhysicalDevice, u32)> {
    let wanted = match preference {
        PowerPreference::LowPower => vk::PhysicalDeviceType::INTEGRATED_GPU,
        PowerPreference::HighPerformance | PowerPreference::Default => vk::PhysicalDeviceType::DISCRETE_GPU,
    };

    let mut best: Option<(u32, vk::PhysicalDevice, u32)> = None;
    for pdevice in unsafe { instance.enumerate_physical_devices()? } {
        let props = unsafe { instance.get_physical_device_properties(pdevice) };
        if props.api_version < vk::API_VERSION_1_3 {
            continue;
        }
        let families = unsafe { instance.get_physical_device_queue_family_properties(pdevice) };
        let Some(family) = families.iter().position(|f| {
            f.queue_flags
                .contains(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE)
        }) else {
            continue;
        };

        let score = if props.device_type == wanted {
            3
        } else if props.device_type == vk::PhysicalDeviceType::DISCRETE_GPU
            || props.device_type == vk::PhysicalDeviceType::INTEGRATED_GPU
        {
            2
        } else {
            1
        };
        if best.map_or(true, |(s, _, _)| score > s) {
            best = Some((score, pdevice, family as u32));
        }
    }

    best.map(|(_, pdevice, family)| (pdevice, family))
        .ok_or(GPUError::BackendUnsupported(Backend::Vulkan))
}

fn capture_limits(limits: &vk::PhysicalDeviceLimits) -> DeviceLimits {
    let defaults = DeviceLimits::default();
    DeviceLimits {
        max_texture_dimension_1d: limits.max_image_dimension1_d,
        max_texture_dimension_2d: limits.max_image_dimension2_d,
        max_texture_dimension_3d: limits.max_image_dimension3_d,
        max_texture_dimension_cube: limits.max_image_dimension_cube,
        max_texture_array_layers: limits.max_image_array_layers.min(MAX_TEXTURE_ARRAY_LAYERS),
        max_color_attachments: limits.max_color_attachments.min(MAX_COLOR_ATTACHMENTS as u32),
        max_vertex_buffers: limits
            .max_vertex_input_bindings
            .min(MAX_VERTEX_BUFFER_BINDINGS as u32),
        max_vertex_attributes: limits
            .max_vertex_input_attributes
            .min(MAX_VERTEX_ATTRIBUTES as u32),
        max_viewports: limits.max_viewports.min(MAX_VIEWPORTS_AND_SCISSORS as u32),
        max_sampler_anisotropy: limits.max_sampler_anisotropy as u32,
        min_uniform_buffer_offset_alignment: limits.min_uniform_buffer_offset_alignment as u32,
        max_compute_workgroup_count: limits.max_compute_work_group_count,
        ..defaults
    }
}

fn vertex_input(
    desc: &InputLayoutDesc,
) -> (
    SmallVec<[vk::VertexInputBindingDescription; MAX_VERTEX_BUFFER_BINDINGS]>,
    SmallVec<[vk::VertexInputAttributeDescription; MAX_VERTEX_ATTRIBUTES]>,
) {
    let mut used = 0u32;
    let attributes = desc
        .elements
        .iter()
        .map(|element| {
            used |= 1 << element.buffer_slot;
            vk::VertexInputAttributeDescription {
                location: element.shader_location,
                binding: element.buffer_slot,
                format: element.format.into(),
                offset: element.offset,
            }
        })
        .collect();
    let bindings = desc
        .slots
        .iter()
        .enumerate()
        .filter(|(slot, _)| used & (1 << slot) != 0)
        .map(|(slot, input)| vk::VertexInputBindingDescription {
            binding: slot as u32,
            stride: input.stride,
            input_rate: input.input_rate.into(),
        })
        .collect();
    (bindings, attributes)
}

/// Full-resource barrier between two layouts.
pub(super) fn image_barrier(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    aspect: vk::ImageAspectFlags,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) {
    let barrier = vk::ImageMemoryBarrier::builder()
        .src_access_mask(vk::AccessFlags::MEMORY_WRITE)
        .dst_access_mask(vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE)
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: aspect,
            base_mip_level: 0,
            level_count: vk::REMAINING_MIP_LEVELS,
            base_array_layer: 0,
            layer_count: vk::REMAINING_ARRAY_LAYERS,
        })
        .build();
    unsafe {
        device.cmd_pipeline_barrier(
            cmd,
            vk::PipelineStageFlags::ALL_COMMANDS,
            vk::PipelineStageFlags::ALL_COMMANDS,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier],
        )
    };
}

impl Inner {
    fn new(desc: &DeviceDescriptor) -> Result<Self> {
        let entry = unsafe { ash::Entry::load() }?;

        let app_name = CString::new(desc.application_name.clone()).unwrap_or_default();
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .engine_name(&app_name)
            .api_version(vk::API_VERSION_1_3);

        let (extensions, debug_utils) = instance_extensions(&entry, desc.validation)?;
        let mut layers = Vec::new();
        if desc.validation {
            let available = entry.enumerate_instance_layer_properties()?;
            let found = available.iter().any(|prop| {
                unsafe { CStr::from_ptr(prop.layer_name.as_ptr()) }.to_bytes_with_nul() == VALIDATION_LAYER
            });
            if found {
                layers.push(VALIDATION_LAYER.as_ptr() as *const c_char);
            } else {
                warn!("validation requested but VK_LAYER_KHRONOS_validation is not installed");
            }
        }

        let instance = unsafe {
            entry.create_instance(
                &vk::InstanceCreateInfo::builder()
                    .application_info(&app_info)
                    .enabled_extension_names(&extensions)
                    .enabled_layer_names(&layers),
                None,
            )
        }
        .map_err(creation("vulkan instance"))?;

        let debug = if debug_utils {
            let loader = DebugUtils::new(&entry, &instance);
            let info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
                .message_severity(
                    vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                        | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                        | vk::DebugUtilsMessageSeverityFlagsEXT::INFO,
                )
                .message_type(
                    vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                        | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                        | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
                )
                .pfn_user_callback(Some(debug_callback));
            match unsafe { loader.create_debug_utils_messenger(&info, None) } {
                Ok(messenger) => Some((loader, messenger)),
                Err(err) => {
                    warn!("failed to install the vulkan debug messenger: {err}");
                    None
                }
            }
        } else {
            None
        };

        // Until `Inner` exists a failure has to tear the instance down here.
        let mut inner = match Self::with_instance(entry, instance.clone(), debug, desc) {
            Ok(inner) => inner,
            Err((err, debug)) => {
                unsafe {
                    if let Some((loader, messenger)) = debug {
                        loader.destroy_debug_utils_messenger(messenger, None);
                    }
                    instance.destroy_instance(None);
                }
                return Err(err);
            }
        };
        // From here on dropping `inner` releases whatever was made.
        inner.create_device_objects()?;
        Ok(inner)
    }

    #[allow(clippy::type_complexity)]
    fn with_instance(
        entry: ash::Entry,
        instance: ash::Instance,
        debug: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
        desc: &DeviceDescriptor,
    ) -> std::result::Result<Self, (GPUError, Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>)> {
        let (pdevice, queue_family) = match pick_physical_device(&instance, desc.power_preference) {
            Ok(found) => found,
            Err(err) => return Err((err, debug)),
        };
        let props = unsafe { instance.get_physical_device_properties(pdevice) };
        let name = unsafe { CStr::from_ptr(props.device_name.as_ptr()) }.to_string_lossy();
        info!("vulkan device: {name} ({:?})", props.device_type);

        let mut supported12 = vk::PhysicalDeviceVulkan12Features::default();
        let mut supported13 = vk::PhysicalDeviceVulkan13Features::default();
        let mut supported = vk::PhysicalDeviceFeatures2::builder()
            .push_next(&mut supported12)
            .push_next(&mut supported13)
            .build();
        unsafe { instance.get_physical_device_features2(pdevice, &mut supported) };
        if supported12.timeline_semaphore == vk::FALSE || supported13.dynamic_rendering == vk::FALSE {
            warn!("{name} lacks timeline semaphores or dynamic rendering");
            return Err((GPUError::BackendUnsupported(Backend::Vulkan), debug));
        }
        let base = supported.features;

        let features = DeviceFeatures {
            independent_blend: base.independent_blend == vk::TRUE,
            geometry_shader: base.geometry_shader == vk::TRUE,
            tessellation_shader: base.tessellation_shader == vk::TRUE,
            multi_viewport: base.multi_viewport == vk::TRUE,
            texture_cube_array: base.image_cube_array == vk::TRUE,
            sampler_anisotropy: base.sampler_anisotropy == vk::TRUE,
            depth_clamp: base.depth_clamp == vk::TRUE,
        };
        let enabled = vk::PhysicalDeviceFeatures {
            independent_blend: base.independent_blend,
            geometry_shader: base.geometry_shader,
            tessellation_shader: base.tessellation_shader,
            multi_viewport: base.multi_viewport,
            image_cube_array: base.image_cube_array,
            sampler_anisotropy: base.sampler_anisotropy,
            depth_clamp: base.depth_clamp,
            fill_mode_non_solid: base.fill_mode_non_solid,
            ..Default::default()
        };
        let mut enabled12 = vk::PhysicalDeviceVulkan12Features::builder()
            .timeline_semaphore(true)
            .build();
        let mut enabled13 = vk::PhysicalDeviceVulkan13Features::builder()
            .dynamic_rendering(true)
            .build();

        let device_extensions = match unsafe { instance.enumerate_device_extension_properties(pdevice) } {
            Ok(exts) => exts,
            Err(err) => return Err((err.into(), debug)),
        };
        let has_swapchain = device_extensions
            .iter()
            .any(|prop| unsafe { CStr::from_ptr(prop.extension_name.as_ptr()) } == khr::Swapchain::name());
        let mut extensions = Vec::new();
        if has_swapchain {
            extensions.push(khr::Swapchain::name().as_ptr());
        }

        let priorities = [1.0];
        let queue_info = [vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(queue_family)
            .queue_priorities(&priorities)
            .build()];
        let device = match unsafe {
            instance.create_device(
                pdevice,
                &vk::DeviceCreateInfo::builder()
                    .queue_create_infos(&queue_info)
                    .enabled_extension_names(&extensions)
                    .enabled_features(&enabled)
                    .push_next(&mut enabled12)
                    .push_next(&mut enabled13),
                None,
            )
        } {
            Ok(device) => device,
            Err(res) => return Err((creation("vulkan device")(res), debug)),
        };

        let allocator = match vk_mem::Allocator::new(vk_mem::AllocatorCreateInfo::new(&instance, &device, pdevice)) {
            Ok(allocator) => allocator,
            Err(res) => {
                unsafe { device.destroy_device(None) };
                return Err((creation("memory allocator")(res), debug));
            }
        };

        let queue = unsafe { device.get_device_queue(queue_family, 0) };
        let surface_loader = khr::Surface::new(&entry, &instance);
        let swapchain_loader = has_swapchain.then(|| khr::Swapchain::new(&instance, &device));

        Ok(Inner {
            entry,
            instance,
            pdevice,
            device,
            queue_family,
            queue: Mutex::new(queue),
            allocator: ManuallyDrop::new(allocator),
            debug,
            surface_loader,
            swapchain_loader,
            limits: capture_limits(&props.limits),
            features,
            pipeline_layout: vk::PipelineLayout::null(),
            null_vertex_buffer: vk::Buffer::null(),
            null_vertex_alloc: Mutex::new(None),
            upload: Mutex::new(UploadPool {
                pool: vk::CommandPool::null(),
                fence: vk::Fence::null(),
            }),
            objects: Mutex::new(Objects::default()),
            swap_chain: Mutex::new(None),
        })
    }

    fn create_device_objects(&mut self) -> Result<()> {
        unsafe {
            self.pipeline_layout = self
                .device
                .create_pipeline_layout(&vk::PipelineLayoutCreateInfo::default(), None)
                .map_err(creation("pipeline layout"))?;

            let upload = self.upload.get_mut();
            upload.pool = self
                .device
                .create_command_pool(
                    &vk::CommandPoolCreateInfo::builder()
                        .flags(vk::CommandPoolCreateFlags::TRANSIENT)
                        .queue_family_index(self.queue_family),
                    None,
                )
                .map_err(creation("upload command pool"))?;
            upload.fence = self
                .device
                .create_fence(&vk::FenceCreateInfo::default(), None)
                .map_err(creation("upload fence"))?;

            let (buffer, alloc) = self
                .allocator
                .create_buffer(
                    &vk::BufferCreateInfo::builder()
                        .size(NULL_VERTEX_BUFFER_SIZE)
                        .usage(vk::BufferUsageFlags::VERTEX_BUFFER)
                        .sharing_mode(vk::SharingMode::EXCLUSIVE),
                    &vk_mem::AllocationCreateInfo {
                        usage: vk_mem::MemoryUsage::Auto,
                        ..Default::default()
                    },
                )
                .map_err(creation("null vertex buffer"))?;
            self.null_vertex_buffer = buffer;
            *self.null_vertex_alloc.get_mut() = Some(alloc);
        }
        Ok(())
    }

    pub(super) fn swapchain_loader(&self) -> Result<&khr::Swapchain> {
        self.swapchain_loader
            .as_ref()
            .ok_or_else(|| GPUError::creation("device does not support VK_KHR_swapchain"))
    }

    /// Records `record` into a throw-away command buffer and waits for it.
    fn one_shot(&self, record: impl FnOnce(&ash::Device, vk::CommandBuffer)) -> Result<()> {
        let upload = self.upload.lock();
        unsafe {
            self.device
                .reset_command_pool(upload.pool, vk::CommandPoolResetFlags::empty())?;
            let cmd = self
                .device
                .allocate_command_buffers(
                    &vk::CommandBufferAllocateInfo::builder()
                        .command_pool(upload.pool)
                        .level(vk::CommandBufferLevel::PRIMARY)
                        .command_buffer_count(1),
                )?
                .into_iter()
                .next()
                .ok_or_else(|| GPUError::native("driver returned no command buffer"))?;
            self.device.begin_command_buffer(
                cmd,
                &vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT),
            )?;
            record(&self.device, cmd);
            self.device.end_command_buffer(cmd)?;

            let cmds = [cmd];
            let submit = vk::SubmitInfo::builder().command_buffers(&cmds).build();
            self.device.reset_fences(&[upload.fence])?;
            self.device
                .queue_submit(*self.queue.lock(), &[submit], upload.fence)?;
            self.device.wait_for_fences(&[upload.fence], true, u64::MAX)?;
            self.device.free_command_buffers(upload.pool, &cmds);
        }
        Ok(())
    }

    /// Host-visible copy of `data` for transfer uploads.
    fn staging(&self, data: &[u8]) -> Result<(vk::Buffer, vk_mem::Allocation)> {
        unsafe {
            let (buffer, mut alloc) = self
                .allocator
                .create_buffer(
                    &vk::BufferCreateInfo::builder()
                        .size(data.len().max(1) as u64)
                        .usage(vk::BufferUsageFlags::TRANSFER_SRC)
                        .sharing_mode(vk::SharingMode::EXCLUSIVE),
                    &vk_mem::AllocationCreateInfo {
                        usage: vk_mem::MemoryUsage::AutoPreferHost,
                        flags: vk_mem::AllocationCreateFlags::HOST_ACCESS_SEQUENTIAL_WRITE,
                        ..Default::default()
                    },
                )
                .map_err(creation("staging buffer"))?;
            if let Err(res) = self.write_mapped(&mut alloc, data) {
                self.allocator.destroy_buffer(buffer, &mut alloc);
                return Err(creation("staging buffer")(res));
            }
            Ok((buffer, alloc))
        }
    }

    unsafe fn write_mapped(&self, alloc: &mut vk_mem::Allocation, data: &[u8]) -> ash::prelude::VkResult<()> {
        let mapped = self.allocator.map_memory(alloc)?;
        std::ptr::copy_nonoverlapping(data.as_ptr(), mapped, data.len());
        self.allocator.unmap_memory(alloc);
        self.allocator.flush_allocation(alloc, 0, data.len())
    }

    fn create_buffer(&self, desc: &BufferDescriptor, initial_data: Option<&[u8]>) -> Result<VkBuffer> {
        let mappable = desc.usage.contains(BufferUsage::CPU_ACCESSIBLE);
        let alloc_info = vk_mem::AllocationCreateInfo {
            usage: if mappable {
                vk_mem::MemoryUsage::AutoPreferHost
            } else {
                vk_mem::MemoryUsage::Auto
            },
            flags: if mappable {
                vk_mem::AllocationCreateFlags::HOST_ACCESS_RANDOM
            } else {
                vk_mem::AllocationCreateFlags::empty()
            },
            ..Default::default()
        };
        let size = desc.size();

        let (raw, mut alloc) = unsafe {
            self.allocator.create_buffer(
                &vk::BufferCreateInfo::builder()
                    .size(size)
                    .usage(buffer_usage(desc.usage))
                    .sharing_mode(vk::SharingMode::EXCLUSIVE),
                &alloc_info,
            )
        }
        .map_err(creation("buffer"))?;

        let uploaded = match initial_data {
            None => Ok(()),
            Some(data) => {
                let data = &data[..data.len().min(size as usize)];
                if mappable {
                    unsafe { self.write_mapped(&mut alloc, data) }.map_err(creation("buffer upload"))
                } else {
                    self.upload_buffer(raw, data)
                }
            }
        };
        if let Err(err) = uploaded {
            unsafe { self.allocator.destroy_buffer(raw, &mut alloc) };
            return Err(err);
        }
        Ok(VkBuffer { raw, alloc })
    }

    fn upload_buffer(&self, dst: vk::Buffer, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        let (staging, mut staging_alloc) = self.staging(data)?;
        let copied = self.one_shot(|device, cmd| unsafe {
            device.cmd_copy_buffer(
                cmd,
                staging,
                dst,
                &[vk::BufferCopy {
                    src_offset: 0,
                    dst_offset: 0,
                    size: data.len() as u64,
                }],
            );
        });
        unsafe { self.allocator.destroy_buffer(staging, &mut staging_alloc) };
        copied
    }

    fn create_texture(&self, desc: &TextureDescriptor, initial_data: Option<&[u8]>) -> Result<VkTexture> {
        let mut flags = vk::ImageCreateFlags::empty();
        if desc.texture_type == TextureType::TypeCube {
            flags |= vk::ImageCreateFlags::CUBE_COMPATIBLE;
        }
        if desc.texture_type == TextureType::Type3D && desc.usage.contains(TextureUsage::RENDER_TARGET) {
            flags |= vk::ImageCreateFlags::TYPE_2D_ARRAY_COMPATIBLE;
        }
        let depth = match desc.texture_type {
            TextureType::Type3D => desc.depth.max(1),
            _ => 1,
        };
        let layers = desc.native_layers();

        let (raw, mut alloc) = unsafe {
            self.allocator.create_image(
                &vk::ImageCreateInfo::builder()
                    .flags(flags)
                    .image_type(desc.texture_type.into())
                    .format(desc.format.into())
                    .extent(vk::Extent3D {
                        width: desc.width,
                        height: desc.height.max(1),
                        depth,
                    })
                    .mip_levels(desc.mip_levels.max(1))
                    .array_layers(layers)
                    .samples(desc.sample_count.into())
                    .tiling(vk::ImageTiling::OPTIMAL)
                    .usage(texture_usage(desc.usage, desc.format))
                    .sharing_mode(vk::SharingMode::EXCLUSIVE)
                    .initial_layout(vk::ImageLayout::UNDEFINED),
                &vk_mem::AllocationCreateInfo {
                    usage: vk_mem::MemoryUsage::Auto,
                    ..Default::default()
                },
            )
        }
        .map_err(creation("texture"))?;

        let image_aspect = aspect(desc.format);
        let initialized = match initial_data {
            Some(data) if !data.is_empty() => {
                let layer_bytes = desc.format.image_size(desc.width, desc.height.max(1)) * depth as u64;
                let needed = layer_bytes * layers as u64;
                if (data.len() as u64) < needed {
                    Err(GPUError::invalid(format!(
                        "texture data holds {} bytes, mip 0 needs {needed}",
                        data.len()
                    )))
                } else {
                    self.staging(&data[..needed as usize]).and_then(|(staging, mut staging_alloc)| {
                        let region = vk::BufferImageCopy {
                            buffer_offset: 0,
                            buffer_row_length: 0,
                            buffer_image_height: 0,
                            image_subresource: vk::ImageSubresourceLayers {
                                aspect_mask: image_aspect,
                                mip_level: 0,
                                base_array_layer: 0,
                                layer_count: layers,
                            },
                            image_offset: vk::Offset3D::default(),
                            image_extent: vk::Extent3D {
                                width: desc.width,
                                height: desc.height.max(1),
                                depth,
                            },
                        };
                        let copied = self.one_shot(|device, cmd| unsafe {
                            image_barrier(
                                device,
                                cmd,
                                raw,
                                image_aspect,
                                vk::ImageLayout::UNDEFINED,
                                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                            );
                            device.cmd_copy_buffer_to_image(
                                cmd,
                                staging,
                                raw,
                                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                                &[region],
                            );
                            image_barrier(
                                device,
                                cmd,
                                raw,
                                image_aspect,
                                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                                vk::ImageLayout::GENERAL,
                            );
                        });
                        unsafe { self.allocator.destroy_buffer(staging, &mut staging_alloc) };
                        copied
                    })
                }
            }
            _ => self.one_shot(|device, cmd| {
                image_barrier(
                    device,
                    cmd,
                    raw,
                    image_aspect,
                    vk::ImageLayout::UNDEFINED,
                    vk::ImageLayout::GENERAL,
                )
            }),
        };

        if let Err(err) = initialized {
            unsafe { self.allocator.destroy_image(raw, &mut alloc) };
            return Err(err);
        }
        Ok(VkTexture {
            raw,
            alloc: Some(alloc),
            desc: *desc,
        })
    }

    fn build_graphics_pipeline(&self, objects: &Objects, key: &VariantKey) -> Result<vk::Pipeline> {
        let record = objects
            .render_pipelines
            .get(&key.pipeline)
            .ok_or(GPUError::InvalidHandle("render pipeline"))?;

        let shader = |handle: Handle<Shader>| {
            objects
                .shaders
                .get(&handle)
                .ok_or(GPUError::InvalidHandle("shader"))
        };
        let mut stages: SmallVec<[vk::PipelineShaderStageCreateInfo; 2]> = SmallVec::new();
        stages.push(shader(record.vertex_shader)?.stage(vk::ShaderStageFlags::VERTEX));
        if let Some(fragment) = record.fragment_shader {
            stages.push(shader(fragment)?.stage(vk::ShaderStageFlags::FRAGMENT));
        }

        let (bindings, attributes) = match key.layout {
            Some(layout) => vertex_input(
                objects
                    .input_layouts
                    .get(&layout)
                    .ok_or(GPUError::InvalidHandle("input layout"))?,
            ),
            None => (SmallVec::new(), SmallVec::new()),
        };
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&attributes);
        let input_assembly =
            vk::PipelineInputAssemblyStateCreateInfo::builder().topology(key.topology.into());
        let tessellation = vk::PipelineTessellationStateCreateInfo::builder()
            .patch_control_points(record.patch_control_points.max(1));
        // Counts come from the *_WITH_COUNT dynamic states.
        let viewport = vk::PipelineViewportStateCreateInfo::default();

        let r = &record.rasterizer;
        let rasterization = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(!r.depth_clip_enable && self.features.depth_clamp)
            .polygon_mode(r.fill_mode.into())
            .cull_mode(r.cull_mode.into())
            .front_face(r.front_face.into())
            .depth_bias_enable(r.depth_bias != 0 || r.depth_bias_slope_scale != 0.0)
            .depth_bias_constant_factor(r.depth_bias as f32)
            .depth_bias_clamp(r.depth_bias_clamp)
            .depth_bias_slope_factor(r.depth_bias_slope_scale)
            .line_width(1.0);
        let multisample = vk::PipelineMultisampleStateCreateInfo::builder()
            .rasterization_samples(record.sample_count.into())
            .alpha_to_coverage_enable(record.blend.alpha_to_coverage);

        let ds = &record.depth_stencil;
        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(ds.depth_test_enable)
            .depth_write_enable(ds.depth_write_enable)
            .depth_compare_op(ds.depth_compare.into())
            .stencil_test_enable(ds.stencil_enable)
            .front(stencil_face(&ds.front, ds.stencil_read_mask, ds.stencil_write_mask))
            .back(stencil_face(&ds.back, ds.stencil_read_mask, ds.stencil_write_mask))
            .max_depth_bounds(1.0);

        let blend_attachments: SmallVec<[vk::PipelineColorBlendAttachmentState; MAX_COLOR_ATTACHMENTS]> =
            (0..record.color_formats.len())
                .map(|i| {
                    let target = if record.blend.independent_blend {
                        &record.blend.render_targets[i]
                    } else {
                        &record.blend.render_targets[0]
                    };
                    target.into()
                })
                .collect();
        let color_blend = vk::PipelineColorBlendStateCreateInfo::builder().attachments(&blend_attachments);

        let dynamic_states = [
            vk::DynamicState::VIEWPORT_WITH_COUNT,
            vk::DynamicState::SCISSOR_WITH_COUNT,
            vk::DynamicState::STENCIL_REFERENCE,
            vk::DynamicState::BLEND_CONSTANTS,
        ];
        let dynamic = vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

        let color_formats: SmallVec<[vk::Format; MAX_COLOR_ATTACHMENTS]> =
            record.color_formats.iter().map(|f| vk::Format::from(*f)).collect();
        let depth_format = record
            .depth_stencil_format
            .filter(|f| f.has_depth())
            .map_or(vk::Format::UNDEFINED, vk::Format::from);
        let stencil_format = record
            .depth_stencil_format
            .filter(|f| f.has_stencil())
            .map_or(vk::Format::UNDEFINED, vk::Format::from);
        let mut rendering = vk::PipelineRenderingCreateInfo::builder()
            .color_attachment_formats(&color_formats)
            .depth_attachment_format(depth_format)
            .stencil_attachment_format(stencil_format)
            .build();

        let mut create = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic)
            .layout(self.pipeline_layout)
            .push_next(&mut rendering);
        if key.topology == PrimitiveTopology::PatchList {
            create = create.tessellation_state(&tessellation);
        }

        let pipelines = unsafe {
            self.device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[create.build()], None)
        }
        .map_err(|(_, res)| creation("graphics pipeline")(res))?;
        pipelines
            .into_iter()
            .next()
            .ok_or_else(|| GPUError::creation("driver returned no graphics pipeline"))
    }

    /// Graphics pipelines are baked per input layout and topology the
    /// first time a draw needs that combination.
    pub(super) fn pipeline_variant(&self, key: VariantKey) -> Result<vk::Pipeline> {
        let mut objects = self.objects.lock();
        if let Some(pipeline) = objects.variants.get(&key) {
            return Ok(*pipeline);
        }
        let pipeline = self.build_graphics_pipeline(&objects, &key)?;
        debug!(
            "baked pipeline variant for {:?} ({:?}, {:?})",
            key.pipeline, key.layout, key.topology
        );
        objects.variants.insert(key, pipeline);
        Ok(pipeline)
    }

    fn destroy_variants(&self, objects: &mut Objects, keep: impl Fn(&VariantKey) -> bool) {
        objects.variants.retain(|key, pipeline| {
            let kept = keep(key);
            if !kept {
                unsafe { self.device.destroy_pipeline(*pipeline, None) };
            }
            kept
        });
    }

    pub(super) fn take_acquire_wait(&self) -> Option<vk::Semaphore> {
        self.swap_chain.lock().as_mut().and_then(|chain| chain.take_acquire_wait())
    }

    /// First use of a back buffer since it was acquired; the caller moves
    /// it out of `UNDEFINED`.
    pub(super) fn claim_back_buffer(&self, texture: Handle<Texture>) -> Option<vk::Image> {
        self.swap_chain
            .lock()
            .as_mut()
            .and_then(|chain| chain.claim(texture))
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        unsafe {
            if let Err(err) = self.device.device_wait_idle() {
                warn!("vulkan device did not go idle before teardown: {err}");
            }

            if let Some(mut chain) = self.swap_chain.get_mut().take() {
                chain.destroy(self);
            }

            let objects = std::mem::take(self.objects.get_mut());
            for (_, pipeline) in objects.variants {
                self.device.destroy_pipeline(pipeline, None);
            }
            for (_, pipeline) in objects.compute_pipelines {
                self.device.destroy_pipeline(pipeline, None);
            }
            for (_, shader) in objects.shaders {
                self.device.destroy_shader_module(shader.module, None);
            }
            for (_, sampler) in objects.samplers {
                self.device.destroy_sampler(sampler, None);
            }
            for (_, view) in objects.views {
                self.device.destroy_image_view(view.raw, None);
            }
            for (_, texture) in objects.textures {
                if let Some(mut alloc) = texture.alloc {
                    self.allocator.destroy_image(texture.raw, &mut alloc);
                }
            }
            for (_, mut buffer) in objects.buffers {
                self.allocator.destroy_buffer(buffer.raw, &mut buffer.alloc);
            }
            if let Some(mut alloc) = self.null_vertex_alloc.get_mut().take() {
                self.allocator.destroy_buffer(self.null_vertex_buffer, &mut alloc);
            }

            let upload = self.upload.get_mut();
            self.device.destroy_fence(upload.fence, None);
            self.device.destroy_command_pool(upload.pool, None);
            self.device.destroy_pipeline_layout(self.pipeline_layout, None);

            ManuallyDrop::drop(&mut self.allocator);
            self.device.destroy_device(None);
            if let Some((loader, messenger)) = self.debug.take() {
                loader.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
        debug!("vulkan device destroyed");
    }
}

/// Device half of the Vulkan backend. Objects are kept in per-kind maps
/// keyed by the crate handles the registry hands out.
pub struct VulkanDevice {
    inner: Arc<Inner>,
}

impl VulkanDevice {
    pub fn new(desc: &DeviceDescriptor) -> Result<Self> {
        Ok(Self {
            inner: Arc::new(Inner::new(desc)?),
        })
    }

    pub(crate) fn limits(&self) -> DeviceLimits {
        self.inner.limits
    }

    pub(crate) fn features(&self) -> DeviceFeatures {
        self.inner.features
    }

    pub(crate) fn create_buffer(
        &self,
        buffer: Handle<Buffer>,
        desc: &BufferDescriptor,
        initial_data: Option<&[u8]>,
    ) -> Result<()> {
        let created = self.inner.create_buffer(desc, initial_data)?;
        self.inner.objects.lock().buffers.insert(buffer, created);
        Ok(())
    }

    pub(crate) fn destroy_buffer(&self, buffer: Handle<Buffer>) {
        if let Some(mut buf) = self.inner.objects.lock().buffers.remove(&buffer) {
            unsafe { self.inner.allocator.destroy_buffer(buf.raw, &mut buf.alloc) };
        }
    }

    pub(crate) fn create_texture(
        &self,
        texture: Handle<Texture>,
        desc: &TextureDescriptor,
        initial_data: Option<&[u8]>,
    ) -> Result<()> {
        let created = self.inner.create_texture(desc, initial_data)?;
        self.inner.objects.lock().textures.insert(texture, created);
        Ok(())
    }

    pub(crate) fn destroy_texture(&self, texture: Handle<Texture>) {
        let Some(tex) = self.inner.objects.lock().textures.remove(&texture) else {
            return;
        };
        if let Some(mut alloc) = tex.alloc {
            unsafe { self.inner.allocator.destroy_image(tex.raw, &mut alloc) };
        }
    }

    pub(crate) fn create_texture_view(
        &self,
        view: Handle<TextureView>,
        texture: Handle<Texture>,
        desc: &NativeViewDesc,
    ) -> Result<()> {
        let mut objects = self.inner.objects.lock();
        let image = objects
            .textures
            .get(&texture)
            .map(|t| t.raw)
            .ok_or(GPUError::InvalidHandle("texture"))?;
        let view_aspect = view_aspect(desc.kind, desc.format);
        let range = vk::ImageSubresourceRange {
            aspect_mask: view_aspect,
            base_mip_level: desc.base_mip,
            level_count: desc.mip_count,
            base_array_layer: desc.base_layer,
            layer_count: desc.layer_count,
        };
        let raw = unsafe {
            self.inner.device.create_image_view(
                &vk::ImageViewCreateInfo::builder()
                    .image(image)
                    .view_type(desc.dimension.into())
                    .format(desc.format.into())
                    .subresource_range(range),
                None,
            )
        }
        .map_err(creation("texture view"))?;
        objects.views.insert(
            view,
            VkView {
                raw,
                texture,
                format: desc.format,
                aspect: aspect(desc.format),
                range,
                image,
            },
        );
        Ok(())
    }

    pub(crate) fn destroy_texture_view(&self, view: Handle<TextureView>) {
        if let Some(v) = self.inner.objects.lock().views.remove(&view) {
            unsafe { self.inner.device.destroy_image_view(v.raw, None) };
        }
    }

    pub(crate) fn create_sampler(&self, sampler: Handle<Sampler>, desc: &SamplerDescriptor) -> Result<()> {
        let anisotropy = desc.max_anisotropy > 1 && self.inner.features.sampler_anisotropy;
        let raw = unsafe {
            self.inner.device.create_sampler(
                &vk::SamplerCreateInfo::builder()
                    .mag_filter(desc.mag_filter.into())
                    .min_filter(desc.min_filter.into())
                    .mipmap_mode(desc.mip_filter.into())
                    .address_mode_u(desc.address_mode_u.into())
                    .address_mode_v(desc.address_mode_v.into())
                    .address_mode_w(desc.address_mode_w.into())
                    .anisotropy_enable(anisotropy)
                    .max_anisotropy(desc.max_anisotropy.min(self.inner.limits.max_sampler_anisotropy) as f32)
                    .compare_enable(desc.compare_function != CompareFunction::Never)
                    .compare_op(desc.compare_function.into())
                    .min_lod(desc.lod_min_clamp)
                    .max_lod(desc.lod_max_clamp.min(vk::LOD_CLAMP_NONE))
                    .border_color(desc.border_color.into()),
                None,
            )
        }
        .map_err(creation("sampler"))?;
        self.inner.objects.lock().samplers.insert(sampler, raw);
        Ok(())
    }

    pub(crate) fn destroy_sampler(&self, sampler: Handle<Sampler>) {
        if let Some(raw) = self.inner.objects.lock().samplers.remove(&sampler) {
            unsafe { self.inner.device.destroy_sampler(raw, None) };
        }
    }

    pub(crate) fn create_shader(&self, shader: Handle<Shader>, desc: &ShaderDescriptor) -> Result<()> {
        let words = ash::util::read_spv(&mut Cursor::new(&desc.code))
            .map_err(|err| GPUError::invalid(format!("shader is not SPIR-V: {err}")))?;
        let entry = CString::new(desc.entry_point.clone())
            .map_err(|_| GPUError::invalid("shader entry point contains a nul byte"))?;
        let module = unsafe {
            self.inner
                .device
                .create_shader_module(&vk::ShaderModuleCreateInfo::builder().code(&words), None)
        }
        .map_err(creation("shader module"))?;
        self.inner
            .objects
            .lock()
            .shaders
            .insert(shader, VkShader { module, entry });
        Ok(())
    }

    pub(crate) fn destroy_shader(&self, shader: Handle<Shader>) {
        if let Some(s) = self.inner.objects.lock().shaders.remove(&shader) {
            unsafe { self.inner.device.destroy_shader_module(s.module, None) };
        }
    }

    pub(crate) fn create_rasterizer_state(
        &self,
        state: Handle<RasterizerState>,
        desc: &RasterizerStateDescriptor,
    ) -> Result<()> {
        self.inner.objects.lock().rasterizer_states.insert(state, *desc);
        Ok(())
    }

    pub(crate) fn destroy_rasterizer_state(&self, state: Handle<RasterizerState>) {
        self.inner.objects.lock().rasterizer_states.remove(&state);
    }

    pub(crate) fn create_depth_stencil_state(
        &self,
        state: Handle<DepthStencilState>,
        desc: &DepthStencilStateDescriptor,
    ) -> Result<()> {
        self.inner.objects.lock().depth_stencil_states.insert(state, *desc);
        Ok(())
    }

    pub(crate) fn destroy_depth_stencil_state(&self, state: Handle<DepthStencilState>) {
        self.inner.objects.lock().depth_stencil_states.remove(&state);
    }

    pub(crate) fn create_blend_state(&self, state: Handle<BlendState>, desc: &BlendStateDescriptor) -> Result<()> {
        self.inner.objects.lock().blend_states.insert(state, *desc);
        Ok(())
    }

    pub(crate) fn destroy_blend_state(&self, state: Handle<BlendState>) {
        self.inner.objects.lock().blend_states.remove(&state);
    }

    pub(crate) fn create_input_layout(&self, layout: Handle<InputLayout>, desc: &InputLayoutDesc) -> Result<()> {
        self.inner
            .objects
            .lock()
            .input_layouts
            .insert(layout, desc.clone());
        Ok(())
    }

    pub(crate) fn destroy_input_layout(&self, layout: Handle<InputLayout>) {
        let mut objects = self.inner.objects.lock();
        objects.input_layouts.remove(&layout);
        self.inner
            .destroy_variants(&mut objects, |key| key.layout != Some(layout));
    }

    pub(crate) fn create_render_pipeline(
        &self,
        pipeline: Handle<RenderPipeline>,
        info: &RenderPipelineInfo<'_>,
    ) -> Result<()> {
        let record = VkRenderPipeline {
            vertex_shader: info.vertex_shader,
            fragment_shader: info.fragment_shader,
            patch_control_points: info.patch_control_points,
            rasterizer: *info.rasterizer,
            depth_stencil: *info.depth_stencil,
            blend: *info.blend,
            color_formats: info.color_formats.iter().copied().collect(),
            depth_stencil_format: info.depth_stencil_format,
            sample_count: info.sample_count,
        };
        self.inner
            .objects
            .lock()
            .render_pipelines
            .insert(pipeline, record);

        // Bake the layout-free variant now so shader or state errors
        // surface at creation rather than at the first draw.
        if info.attributes.is_empty() {
            let key = VariantKey {
                pipeline,
                layout: None,
                topology: info.topology,
            };
            if let Err(err) = self.inner.pipeline_variant(key) {
                self.inner.objects.lock().render_pipelines.remove(&pipeline);
                return Err(err);
            }
        }
        Ok(())
    }

    pub(crate) fn destroy_render_pipeline(&self, pipeline: Handle<RenderPipeline>) {
        let mut objects = self.inner.objects.lock();
        objects.render_pipelines.remove(&pipeline);
        self.inner
            .destroy_variants(&mut objects, |key| key.pipeline != pipeline);
    }

    pub(crate) fn create_compute_pipeline(
        &self,
        pipeline: Handle<ComputePipeline>,
        shader: Handle<Shader>,
    ) -> Result<()> {
        let mut objects = self.inner.objects.lock();
        let stage = objects
            .shaders
            .get(&shader)
            .ok_or(GPUError::InvalidHandle("shader"))?
            .stage(vk::ShaderStageFlags::COMPUTE);
        let create = vk::ComputePipelineCreateInfo::builder()
            .stage(stage)
            .layout(self.inner.pipeline_layout)
            .build();
        let raw = unsafe {
            self.inner
                .device
                .create_compute_pipelines(vk::PipelineCache::null(), &[create], None)
        }
        .map_err(|(_, res)| creation("compute pipeline")(res))?
        .into_iter()
        .next()
        .ok_or_else(|| GPUError::creation("driver returned no compute pipeline"))?;
        objects.compute_pipelines.insert(pipeline, raw);
        Ok(())
    }

    pub(crate) fn destroy_compute_pipeline(&self, pipeline: Handle<ComputePipeline>) {
        if let Some(raw) = self.inner.objects.lock().compute_pipelines.remove(&pipeline) {
            unsafe { self.inner.device.destroy_pipeline(raw, None) };
        }
    }

    pub(crate) fn create_swap_chain(&self, desc: &SwapChainDescriptor, image_count: u32) -> Result<SwapChainInfo> {
        let mut slot = self.inner.swap_chain.lock();
        if let Some(mut old) = slot.take() {
            old.destroy(&self.inner);
        }
        let chain = VulkanSwapChain::new(&self.inner, desc, image_count)?;
        let info = chain.info();
        *slot = Some(chain);
        Ok(info)
    }

    pub(crate) fn resize_swap_chain(&self, width: u32, height: u32) -> Result<ResizeOutcome> {
        match self.inner.swap_chain.lock().as_mut() {
            Some(chain) => chain.resize(&self.inner, width, height),
            None => Ok(ResizeOutcome::ChainLost),
        }
    }

    pub(crate) fn recreate_swap_chain(&self, desc: &SwapChainDescriptor, image_count: u32) -> Result<SwapChainInfo> {
        let mut slot = self.inner.swap_chain.lock();
        match slot.as_mut() {
            Some(chain) => {
                chain.rebuild(&self.inner, desc, image_count)?;
                Ok(chain.info())
            }
            None => {
                drop(slot);
                self.create_swap_chain(desc, image_count)
            }
        }
    }

    pub(crate) fn destroy_swap_chain(&self) {
        if let Some(mut chain) = self.inner.swap_chain.lock().take() {
            chain.destroy(&self.inner);
        }
    }

    pub(crate) fn swap_chain_info(&self) -> Option<SwapChainInfo> {
        self.inner.swap_chain.lock().as_ref().map(VulkanSwapChain::info)
    }

    pub(crate) fn wrap_back_buffer(&self, texture: Handle<Texture>, index: u32) -> Result<()> {
        let mut chain = self.inner.swap_chain.lock();
        let chain = chain
            .as_mut()
            .ok_or(GPUError::InvalidState("no swap chain to wrap"))?;
        let (raw, desc) = chain.wrap(texture, index)?;
        self.inner.objects.lock().textures.insert(
            texture,
            VkTexture {
                raw,
                alloc: None,
                desc,
            },
        );
        Ok(())
    }

    pub(crate) fn release_back_buffer(&self, texture: Handle<Texture>) {
        if let Some(chain) = self.inner.swap_chain.lock().as_mut() {
            chain.unwrap(texture);
        }
        self.inner.objects.lock().textures.remove(&texture);
    }

    pub(crate) fn acquire_next_image(&self) -> Result<u32> {
        match self.inner.swap_chain.lock().as_mut() {
            Some(chain) => chain.acquire(&self.inner),
            None => Err(GPUError::InvalidState("no swap chain to acquire from")),
        }
    }

    pub(crate) fn present(&self, image: u32) -> Result<PresentStatus> {
        match self.inner.swap_chain.lock().as_mut() {
            Some(chain) => chain.present(&self.inner, image),
            None => Err(GPUError::InvalidState("no swap chain to present")),
        }
    }

    pub(crate) fn create_commands(&self) -> Result<VulkanCommands> {
        VulkanCommands::new(Arc::clone(&self.inner))
    }

    pub(crate) fn wait_idle(&self) -> Result<()> {
        let _queue = self.inner.queue.lock();
        unsafe { self.inner.device.device_wait_idle() }?;
        Ok(())
    }

    /// Objects are released when the last context referencing the device
    /// goes away; this only drains the queue and drops the chain.
    pub(crate) fn shutdown(&self) {
        if let Err(err) = self.wait_idle() {
            warn!("vulkan shutdown: {err}");
        }
        self.destroy_swap_chain();
    }
}
