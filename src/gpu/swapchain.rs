//! The device's presentable image chain.
//!
//! Back buffers are wrapped as swap-chain-owned textures so they flow
//! through the same view cache and framebuffer paths as user textures.

use super::error::{GPUError, Result};
use super::native::{PresentStatus, ResizeOutcome, SwapChainInfo};
use super::registry::DeviceShared;
use super::resources::{Texture, TextureOwner};
use super::structs::*;
use super::validate;
use crate::utils::Handle;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SwapChainState {
    #[default]
    Uninitialized,
    Configured,
    Destroyed,
}

#[derive(Default)]
pub struct SwapChain {
    state: SwapChainState,
    desc: Option<SwapChainDescriptor>,
    back_buffers: Vec<Handle<Texture>>,
    depth_stencil: Option<Handle<Texture>>,
    current: u32,
    needs_resize: bool,
    width: u32,
    height: u32,
}

impl SwapChain {
    pub fn state(&self) -> SwapChainState {
        self.state
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn descriptor(&self) -> Option<&SwapChainDescriptor> {
        self.desc.as_ref()
    }

    /// Set when the last present reported the surface out of date.
    pub fn needs_resize(&self) -> bool {
        self.needs_resize
    }

    pub fn back_buffer_count(&self) -> u32 {
        self.back_buffers.len() as u32
    }

    pub fn back_buffer_texture(&self, index: u32) -> Option<Handle<Texture>> {
        self.back_buffers.get(index as usize).copied()
    }

    pub fn current_back_buffer_index(&self) -> u32 {
        self.current
    }

    pub fn current_back_buffer(&self) -> Option<Handle<Texture>> {
        self.back_buffer_texture(self.current)
    }

    pub fn depth_stencil_texture(&self) -> Option<Handle<Texture>> {
        self.depth_stencil
    }

    pub(crate) fn is_configured(&self) -> bool {
        self.state == SwapChainState::Configured
    }

    pub(crate) fn configure(&mut self, shared: &DeviceShared, desc: &SwapChainDescriptor) -> Result<()> {
        validate::swap_chain(desc)?;
        shared.ensure_alive()?;

        if let (SwapChainState::Configured, Some(old)) = (self.state, self.desc) {
            let same_chain = SwapChainDescriptor {
                width: old.width,
                height: old.height,
                ..*desc
            } == old;
            if same_chain {
                self.desc = Some(*desc);
                return self.resize(shared, desc.width, desc.height);
            }
            shared.native.wait_idle()?;
            self.release_images(shared);
        }

        self.desc = Some(*desc);
        self.create(shared, desc)
    }

    fn create(&mut self, shared: &DeviceShared, desc: &SwapChainDescriptor) -> Result<()> {
        let count = desc.buffer_count.clamp(
            shared.limits.min_swap_chain_images,
            shared.limits.max_swap_chain_images,
        );
        let info = shared.native.create_swap_chain(desc, count)?;
        log::debug!(
            "swap chain created: {}x{} with {} images",
            info.width,
            info.height,
            info.image_count
        );
        self.wrap_images(shared, &info)
    }

    fn wrap_images(&mut self, shared: &DeviceShared, info: &SwapChainInfo) -> Result<()> {
        let desc = self.desc.ok_or(GPUError::InvalidState("swap chain has no descriptor"))?;
        let color = TextureDescriptor::render_target(info.width, info.height, info.format, SampleCount::S1);

        for index in 0..info.image_count {
            match shared.wrap_back_buffer(color, index) {
                Ok(texture) => self.back_buffers.push(texture),
                Err(err) => {
                    self.release_images(shared);
                    return Err(err);
                }
            }
        }

        if let Some(format) = desc.depth_stencil_format {
            let depth = TextureDescriptor::render_target(info.width, info.height, format, SampleCount::S1);
            match shared.create_texture(&depth, None, TextureOwner::SwapChain) {
                Ok(texture) => self.depth_stencil = Some(texture),
                Err(err) => {
                    self.release_images(shared);
                    return Err(err);
                }
            }
        }

        self.width = info.width;
        self.height = info.height;
        self.current = 0;
        self.needs_resize = false;
        self.state = SwapChainState::Configured;
        Ok(())
    }

    /// Drops the back-buffer wrappers, their views and the depth buffer.
    fn release_images(&mut self, shared: &DeviceShared) {
        for texture in self.back_buffers.drain(..) {
            shared.release_swap_chain_texture(texture, true);
        }
        if let Some(texture) = self.depth_stencil.take() {
            shared.release_swap_chain_texture(texture, false);
        }
    }

    pub(crate) fn resize(&mut self, shared: &DeviceShared, width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(GPUError::invalid(format!(
                "swap chain size {width}x{height} has a zero extent"
            )));
        }
        shared.ensure_alive()?;

        if self.state != SwapChainState::Configured {
            let mut desc = self
                .desc
                .ok_or(GPUError::InvalidState("swap chain was never configured"))?;
            desc.width = width;
            desc.height = height;
            self.desc = Some(desc);
            return self.create(shared, &desc);
        }

        if (width, height) == (self.width, self.height) && !self.needs_resize {
            return Ok(());
        }

        shared.native.wait_idle()?;
        self.release_images(shared);
        if let Some(desc) = self.desc.as_mut() {
            desc.width = width;
            desc.height = height;
        }

        let info = match shared.native.resize_swap_chain(width, height)? {
            ResizeOutcome::Resized => shared
                .native
                .swap_chain_info()
                .ok_or(GPUError::InvalidState("native swap chain vanished during resize"))?,
            ResizeOutcome::ChainLost => {
                log::warn!("swap chain lost during resize, recreating");
                let desc = self.desc.ok_or(GPUError::InvalidState("swap chain has no descriptor"))?;
                let count = desc.buffer_count.clamp(
                    shared.limits.min_swap_chain_images,
                    shared.limits.max_swap_chain_images,
                );
                shared.native.recreate_swap_chain(&desc, count)?
            }
        };
        log::debug!("swap chain resized to {}x{}", info.width, info.height);
        self.wrap_images(shared, &info)
    }

    pub(crate) fn acquire(&mut self, shared: &DeviceShared) -> Result<u32> {
        if !self.is_configured() {
            return Err(GPUError::InvalidState("swap chain is not configured"));
        }
        self.current = shared.native.acquire_next_image()?;
        Ok(self.current)
    }

    pub(crate) fn present(&mut self, shared: &DeviceShared) -> Result<PresentStatus> {
        if !self.is_configured() {
            return Err(GPUError::InvalidState("swap chain is not configured"));
        }
        let status = shared.native.present(self.current)?;
        if status == PresentStatus::OutOfDate {
            log::debug!("swap chain out of date, resizing on next frame");
            self.needs_resize = true;
        }
        Ok(status)
    }

    pub(crate) fn destroy(&mut self, shared: &DeviceShared) {
        if self.state != SwapChainState::Configured {
            return;
        }
        self.release_images(shared);
        shared.native.destroy_swap_chain();
        self.state = SwapChainState::Destroyed;
    }

    /// Drops every handle after the registry behind them was forgotten.
    /// The descriptor survives so the chain can be rebuilt.
    pub(crate) fn forget(&mut self) {
        self.back_buffers.clear();
        self.depth_stencil = None;
        self.current = 0;
        self.needs_resize = false;
        if self.state == SwapChainState::Configured {
            self.state = SwapChainState::Uninitialized;
        }
    }
}
