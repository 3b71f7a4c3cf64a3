use ash::vk;
use log::{debug, warn};

use super::conversions::surface_format;
use super::error::{creation, is_out_of_date};
use super::{image_barrier, Inner};
use crate::gpu::error::{GPUError, Result};
use crate::gpu::format::PixelFormat;
use crate::gpu::native::{PresentStatus, ResizeOutcome, SwapChainInfo};
use crate::gpu::resources::Texture;
use crate::gpu::structs::*;
use crate::utils::Handle;

struct BackBuffer {
    image: vk::Image,
    texture: Option<Handle<Texture>>,
    /// `UNDEFINED` until the first pass that renders into it after acquire.
    layout: vk::ImageLayout,
    present_cmd: vk::CommandBuffer,
    present_fence: vk::Fence,
    rendered: vk::Semaphore,
}

/// Surface, native chain and the per-image objects used to hand images
/// to the presentation engine.
pub(super) struct VulkanSwapChain {
    surface: vk::SurfaceKHR,
    raw: vk::SwapchainKHR,
    images: Vec<BackBuffer>,
    format: PixelFormat,
    surface_format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    extent: vk::Extent2D,
    requested_images: u32,
    present_pool: vk::CommandPool,
    acquire_semaphores: Vec<vk::Semaphore>,
    next_semaphore: usize,
    /// Signalled by the last acquire and not yet waited on by a submit.
    pending_acquire: Option<vk::Semaphore>,
    acquired: Option<u32>,
    out_of_date: bool,
}

impl VulkanSwapChain {
    pub(super) fn new(inner: &Inner, desc: &SwapChainDescriptor, image_count: u32) -> Result<Self> {
        let SurfaceSource::Window { window, display } = desc.surface else {
            return Err(GPUError::invalid("the vulkan backend needs a window surface"));
        };
        inner.swapchain_loader()?;

        let surface = unsafe { ash_window::create_surface(&inner.entry, &inner.instance, display, window, None) }
            .map_err(creation("surface"))?;

        let mut chain = Self {
            surface,
            raw: vk::SwapchainKHR::null(),
            images: Vec::new(),
            format: desc.color_format,
            surface_format: vk::SurfaceFormatKHR::default(),
            present_mode: vk::PresentModeKHR::FIFO,
            extent: vk::Extent2D::default(),
            requested_images: image_count,
            present_pool: vk::CommandPool::null(),
            acquire_semaphores: Vec::new(),
            next_semaphore: 0,
            pending_acquire: None,
            acquired: None,
            out_of_date: false,
        };
        if let Err(err) = chain
            .configure_surface(inner, desc)
            .and_then(|_| chain.build(inner, desc.width, desc.height))
        {
            chain.destroy(inner);
            return Err(err);
        }
        Ok(chain)
    }

    fn configure_surface(&mut self, inner: &Inner, desc: &SwapChainDescriptor) -> Result<()> {
        let loader = &inner.surface_loader;
        let supported = unsafe {
            loader.get_physical_device_surface_support(inner.pdevice, inner.queue_family, self.surface)
        }
        .map_err(creation("surface support query"))?;
        if !supported {
            return Err(GPUError::creation("the graphics queue cannot present to this surface"));
        }

        let formats = unsafe { loader.get_physical_device_surface_formats(inner.pdevice, self.surface) }
            .map_err(creation("surface formats"))?;
        let wanted = vk::Format::from(desc.color_format);
        let chosen = formats
            .iter()
            .find(|f| f.format == wanted)
            .or_else(|| formats.iter().find(|f| surface_format(f.format).is_some()))
            .copied()
            .ok_or_else(|| GPUError::creation("surface offers no usable color format"))?;
        self.format = surface_format(chosen.format).unwrap_or(desc.color_format);
        if self.format != desc.color_format {
            warn!(
                "surface does not support {:?}, presenting as {:?}",
                desc.color_format, self.format
            );
        }
        self.surface_format = chosen;

        let modes = unsafe { loader.get_physical_device_surface_present_modes(inner.pdevice, self.surface) }
            .map_err(creation("surface present modes"))?;
        self.present_mode = if desc.vsync {
            vk::PresentModeKHR::FIFO
        } else {
            [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE]
                .into_iter()
                .find(|mode| modes.contains(mode))
                .unwrap_or(vk::PresentModeKHR::FIFO)
        };

        self.present_pool = unsafe {
            inner.device.create_command_pool(
                &vk::CommandPoolCreateInfo::builder()
                    .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
                    .queue_family_index(inner.queue_family),
                None,
            )
        }
        .map_err(creation("present command pool"))?;
        Ok(())
    }

    /// (Re)creates the native chain at `width` x `height`, retiring the
    /// previous one once the new chain exists.
    fn build(&mut self, inner: &Inner, width: u32, height: u32) -> Result<()> {
        let loader = inner.swapchain_loader()?;
        let caps = unsafe {
            inner
                .surface_loader
                .get_physical_device_surface_capabilities(inner.pdevice, self.surface)
        }?;

        let extent = if caps.current_extent.width != u32::MAX {
            caps.current_extent
        } else {
            vk::Extent2D {
                width: width.clamp(caps.min_image_extent.width, caps.max_image_extent.width),
                height: height.clamp(caps.min_image_extent.height, caps.max_image_extent.height),
            }
        };
        if extent.width == 0 || extent.height == 0 {
            return Err(GPUError::Vulkan(vk::Result::ERROR_OUT_OF_DATE_KHR));
        }

        let mut count = self.requested_images.max(caps.min_image_count);
        if caps.max_image_count > 0 {
            count = count.min(caps.max_image_count);
        }

        let old = self.raw;
        let raw = unsafe {
            loader.create_swapchain(
                &vk::SwapchainCreateInfoKHR::builder()
                    .surface(self.surface)
                    .min_image_count(count)
                    .image_format(self.surface_format.format)
                    .image_color_space(self.surface_format.color_space)
                    .image_extent(extent)
                    .image_array_layers(1)
                    .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
                    .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
                    .pre_transform(caps.current_transform)
                    .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
                    .present_mode(self.present_mode)
                    .clipped(true)
                    .old_swapchain(old),
                None,
            )
        }?;

        self.release_images(inner);
        if old != vk::SwapchainKHR::null() {
            unsafe { loader.destroy_swapchain(old, None) };
        }
        self.raw = raw;
        self.extent = extent;

        let images = unsafe { loader.get_swapchain_images(raw) }?;
        let cmds = unsafe {
            inner.device.allocate_command_buffers(
                &vk::CommandBufferAllocateInfo::builder()
                    .command_pool(self.present_pool)
                    .level(vk::CommandBufferLevel::PRIMARY)
                    .command_buffer_count(images.len() as u32),
            )
        }
        .map_err(creation("present command buffers"))?;

        for (image, present_cmd) in images.into_iter().zip(cmds) {
            let present_fence = unsafe {
                inner.device.create_fence(
                    &vk::FenceCreateInfo::builder().flags(vk::FenceCreateFlags::SIGNALED),
                    None,
                )
            }
            .map_err(creation("present fence"))?;
            let rendered = unsafe {
                inner
                    .device
                    .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)
            }
            .map_err(creation("present semaphore"))?;
            self.images.push(BackBuffer {
                image,
                texture: None,
                layout: vk::ImageLayout::UNDEFINED,
                present_cmd,
                present_fence,
                rendered,
            });
        }

        // One more than the image count so an acquire never reuses a
        // semaphore whose image is still waiting to be presented.
        for _ in 0..=self.images.len() {
            let semaphore = unsafe {
                inner
                    .device
                    .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)
            }
            .map_err(creation("acquire semaphore"))?;
            self.acquire_semaphores.push(semaphore);
        }
        self.next_semaphore = 0;
        self.out_of_date = false;

        debug!(
            "vulkan swap chain {}x{} with {} images ({:?})",
            extent.width,
            extent.height,
            self.images.len(),
            self.present_mode
        );
        Ok(())
    }

    fn release_images(&mut self, inner: &Inner) {
        let device = &inner.device;
        unsafe {
            for bb in self.images.drain(..) {
                if let Err(err) = device.wait_for_fences(&[bb.present_fence], true, u64::MAX) {
                    warn!("present fence wait failed: {err}");
                }
                device.destroy_fence(bb.present_fence, None);
                device.destroy_semaphore(bb.rendered, None);
                device.free_command_buffers(self.present_pool, &[bb.present_cmd]);
            }
            for semaphore in self.acquire_semaphores.drain(..) {
                device.destroy_semaphore(semaphore, None);
            }
        }
        self.pending_acquire = None;
        self.acquired = None;
    }

    /// Builds a replacement chain on the same surface. The old chain is
    /// handed over as `old_swapchain` and released after the new one exists.
    pub(super) fn rebuild(&mut self, inner: &Inner, desc: &SwapChainDescriptor, image_count: u32) -> Result<()> {
        self.requested_images = image_count;
        self.build(inner, desc.width, desc.height)
    }

    pub(super) fn resize(&mut self, inner: &Inner, width: u32, height: u32) -> Result<ResizeOutcome> {
        match self.build(inner, width, height) {
            Ok(()) => Ok(ResizeOutcome::Resized),
            Err(GPUError::Vulkan(res)) if is_out_of_date(res) || res == vk::Result::ERROR_NATIVE_WINDOW_IN_USE_KHR => {
                Ok(ResizeOutcome::ChainLost)
            }
            Err(err) => Err(err),
        }
    }

    pub(super) fn destroy(&mut self, inner: &Inner) {
        unsafe {
            if let Err(err) = inner.device.device_wait_idle() {
                warn!("swap chain teardown: {err}");
            }
        }
        self.release_images(inner);
        unsafe {
            if self.raw != vk::SwapchainKHR::null() {
                if let Ok(loader) = inner.swapchain_loader() {
                    loader.destroy_swapchain(self.raw, None);
                }
                self.raw = vk::SwapchainKHR::null();
            }
            inner.device.destroy_command_pool(self.present_pool, None);
            self.present_pool = vk::CommandPool::null();
            inner.surface_loader.destroy_surface(self.surface, None);
            self.surface = vk::SurfaceKHR::null();
        }
    }

    pub(super) fn info(&self) -> SwapChainInfo {
        SwapChainInfo {
            image_count: self.images.len() as u32,
            width: self.extent.width,
            height: self.extent.height,
            format: self.format,
        }
    }

    pub(super) fn wrap(&mut self, texture: Handle<Texture>, index: u32) -> Result<(vk::Image, TextureDescriptor)> {
        let extent = self.extent;
        let format = self.format;
        let bb = self
            .images
            .get_mut(index as usize)
            .ok_or_else(|| GPUError::invalid(format!("swap chain has no image {index}")))?;
        bb.texture = Some(texture);
        Ok((
            bb.image,
            TextureDescriptor::render_target(extent.width, extent.height, format, SampleCount::S1),
        ))
    }

    pub(super) fn unwrap(&mut self, texture: Handle<Texture>) {
        for bb in &mut self.images {
            if bb.texture == Some(texture) {
                bb.texture = None;
            }
        }
    }

    pub(super) fn claim(&mut self, texture: Handle<Texture>) -> Option<vk::Image> {
        let bb = self.images.iter_mut().find(|bb| bb.texture == Some(texture))?;
        if bb.layout != vk::ImageLayout::UNDEFINED {
            return None;
        }
        bb.layout = vk::ImageLayout::GENERAL;
        Some(bb.image)
    }

    pub(super) fn take_acquire_wait(&mut self) -> Option<vk::Semaphore> {
        self.pending_acquire.take()
    }

    pub(super) fn acquire(&mut self, inner: &Inner) -> Result<u32> {
        let loader = inner.swapchain_loader()?;
        let semaphore = *self
            .acquire_semaphores
            .get(self.next_semaphore)
            .ok_or(GPUError::InvalidState("swap chain has no images"))?;
        self.next_semaphore = (self.next_semaphore + 1) % self.acquire_semaphores.len();

        match unsafe { loader.acquire_next_image(self.raw, u64::MAX, semaphore, vk::Fence::null()) } {
            Ok((index, suboptimal)) => {
                self.out_of_date |= suboptimal;
                if let Some(bb) = self.images.get_mut(index as usize) {
                    bb.layout = vk::ImageLayout::UNDEFINED;
                }
                self.pending_acquire = Some(semaphore);
                self.acquired = Some(index);
                Ok(index)
            }
            // Nothing was acquired; the present of this frame reports the
            // chain out of date and the device resizes it.
            Err(res) if is_out_of_date(res) => {
                self.out_of_date = true;
                self.acquired = None;
                Ok(0)
            }
            Err(res) => Err(res.into()),
        }
    }

    pub(super) fn present(&mut self, inner: &Inner, image: u32) -> Result<PresentStatus> {
        let Some(index) = self.acquired.take() else {
            return if self.out_of_date {
                Ok(PresentStatus::OutOfDate)
            } else {
                Err(GPUError::InvalidState("present without an acquired image"))
            };
        };
        if index != image {
            warn!("presenting image {index}, caller expected {image}");
        }
        let loader = inner.swapchain_loader()?;
        let device = &inner.device;
        let bb = self
            .images
            .get_mut(index as usize)
            .ok_or(GPUError::InvalidState("acquired image vanished"))?;

        unsafe {
            device.wait_for_fences(&[bb.present_fence], true, u64::MAX)?;
            device.reset_fences(&[bb.present_fence])?;
            device.reset_command_buffer(bb.present_cmd, vk::CommandBufferResetFlags::empty())?;
            device.begin_command_buffer(
                bb.present_cmd,
                &vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT),
            )?;
            image_barrier(
                device,
                bb.present_cmd,
                bb.image,
                vk::ImageAspectFlags::COLOR,
                bb.layout,
                vk::ImageLayout::PRESENT_SRC_KHR,
            );
            device.end_command_buffer(bb.present_cmd)?;
        }
        bb.layout = vk::ImageLayout::PRESENT_SRC_KHR;

        let waits: Vec<vk::Semaphore> = self.pending_acquire.take().into_iter().collect();
        let stages = vec![vk::PipelineStageFlags::ALL_COMMANDS; waits.len()];
        let cmds = [bb.present_cmd];
        let signals = [bb.rendered];
        let submit = vk::SubmitInfo::builder()
            .wait_semaphores(&waits)
            .wait_dst_stage_mask(&stages)
            .command_buffers(&cmds)
            .signal_semaphores(&signals)
            .build();

        let queue = inner.queue.lock();
        match unsafe { device.queue_submit(*queue, &[submit], bb.present_fence) } {
            Ok(()) => {}
            Err(vk::Result::ERROR_DEVICE_LOST) => return Ok(PresentStatus::DeviceLost(DeviceLostReason::Removed)),
            Err(res) => return Err(res.into()),
        }

        let swapchains = [self.raw];
        let indices = [index];
        let present = vk::PresentInfoKHR::builder()
            .wait_semaphores(&signals)
            .swapchains(&swapchains)
            .image_indices(&indices);
        match unsafe { loader.queue_present(*queue, &present) } {
            Ok(false) if !self.out_of_date => Ok(PresentStatus::Presented),
            Ok(_) => Ok(PresentStatus::OutOfDate),
            Err(vk::Result::ERROR_DEVICE_LOST) => Ok(PresentStatus::DeviceLost(DeviceLostReason::Removed)),
            Err(res) if is_out_of_date(res) => Ok(PresentStatus::OutOfDate),
            Err(res) => Err(res.into()),
        }
    }
}
