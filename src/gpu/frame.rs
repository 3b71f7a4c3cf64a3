//! In-flight frame ring and deferred destruction.

use super::native::NativeDevice;
use super::resources::*;
use crate::utils::{Handle, PerFrame};

/// Native teardown postponed until the GPU is done with a frame slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum DeferredRelease {
    Buffer(Handle<Buffer>),
    Texture(Handle<Texture>),
    TextureView(Handle<TextureView>),
    Sampler(Handle<Sampler>),
    Shader(Handle<Shader>),
    RenderPipeline(Handle<RenderPipeline>),
    ComputePipeline(Handle<ComputePipeline>),
}

impl DeferredRelease {
    pub(crate) fn release(self, native: &NativeDevice) {
        match self {
            DeferredRelease::Buffer(h) => native.destroy_buffer(h),
            DeferredRelease::Texture(h) => native.destroy_texture(h),
            DeferredRelease::TextureView(h) => native.destroy_texture_view(h),
            DeferredRelease::Sampler(h) => native.destroy_sampler(h),
            DeferredRelease::Shader(h) => native.destroy_shader(h),
            DeferredRelease::RenderPipeline(h) => native.destroy_render_pipeline(h),
            DeferredRelease::ComputePipeline(h) => native.destroy_compute_pipeline(h),
        }
    }
}

#[derive(Default)]
pub(crate) struct FrameSlot {
    /// Fence value the slot's last submission signals; 0 means nothing
    /// was submitted from it yet.
    retire_fence: u64,
    deferred: Vec<DeferredRelease>,
}

pub(crate) struct FrameRing {
    slots: PerFrame<FrameSlot>,
    frame_index: u64,
}

impl FrameRing {
    pub(crate) fn new(inflight_frames: u32) -> Self {
        Self {
            slots: PerFrame::new(inflight_frames as usize),
            frame_index: 0,
        }
    }

    pub(crate) fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub(crate) fn slot_index(&self) -> usize {
        self.slots.curr_idx()
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    /// Queues `release` behind the current slot's next retirement.
    pub(crate) fn defer(&mut self, release: DeferredRelease) {
        self.slots.curr_mut().deferred.push(release);
    }

    /// Releases queued across all slots.
    pub(crate) fn pending(&self) -> usize {
        self.slots.iter().map(|slot| slot.deferred.len()).sum()
    }

    pub(crate) fn set_retire_fence(&mut self, fence: u64) {
        self.slots.curr_mut().retire_fence = fence;
    }

    /// Moves to the next slot. Returns the fence to wait on before the
    /// returned releases may run.
    pub(crate) fn advance(&mut self) -> (u64, Vec<DeferredRelease>) {
        self.slots.advance_next_frame();
        self.frame_index += 1;
        let slot = self.slots.curr_mut();
        (slot.retire_fence, std::mem::take(&mut slot.deferred))
    }

    /// Empties every slot, oldest first, and rewinds the ring.
    pub(crate) fn drain_all(&mut self) -> Vec<DeferredRelease> {
        let mut out = Vec::new();
        let start = self.slots.curr_idx();
        let len = self.slots.len();
        let mut collected: Vec<Vec<DeferredRelease>> = Vec::with_capacity(len);
        self.slots.for_each_mut(|slot| {
            slot.retire_fence = 0;
            collected.push(std::mem::take(&mut slot.deferred));
        });
        for offset in 1..=len {
            out.append(&mut collected[(start + offset) % len]);
        }
        self.slots.reset();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::Pool;

    fn buffer_handles(n: usize) -> Vec<Handle<Buffer>> {
        let mut pool = Pool::new(4);
        (0..n)
            .map(|_| pool.insert(Buffer { desc: Default::default() }).unwrap())
            .collect()
    }

    #[test]
    fn releases_come_back_one_rotation_later() {
        let b = buffer_handles(1)[0];
        let mut ring = FrameRing::new(3);
        ring.set_retire_fence(7);
        ring.defer(DeferredRelease::Buffer(b));
        assert_eq!(ring.pending(), 1);

        assert!(ring.advance().1.is_empty());
        assert!(ring.advance().1.is_empty());
        let (fence, released) = ring.advance();
        assert_eq!(fence, 7);
        assert_eq!(released, vec![DeferredRelease::Buffer(b)]);
        assert_eq!(ring.pending(), 0);
        assert_eq!(ring.frame_index(), 3);
    }

    #[test]
    fn drain_returns_oldest_slot_first() {
        let bs = buffer_handles(2);
        let mut ring = FrameRing::new(2);
        ring.defer(DeferredRelease::Buffer(bs[0]));
        ring.advance();
        ring.defer(DeferredRelease::Buffer(bs[1]));
        let drained = ring.drain_all();
        assert_eq!(
            drained,
            vec![DeferredRelease::Buffer(bs[0]), DeferredRelease::Buffer(bs[1])]
        );
        assert_eq!(ring.slot_index(), 0);
        assert_eq!(ring.pending(), 0);
    }
}
