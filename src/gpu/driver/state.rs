//! Dirty tracking for command-context state.
//!
//! Each category keeps the value last set and whether it still has to be
//! pushed to the native context. Setting an equal value never marks a
//! category dirty; flushing clears the flag only once the native call
//! went through.

use smallvec::SmallVec;

use crate::gpu::resources::{Buffer, InputElement, InputLayoutDesc, InputSlot, Shader};
use crate::gpu::structs::{
    IndexType, VertexAttribute, VertexInputRate, MAX_VERTEX_BUFFER_BINDINGS,
};
use crate::utils::bits::{range_mask, BitRanges};
use crate::utils::Handle;

/// A value plus its dirty flag.
#[derive(Debug, Clone)]
pub struct Tracked<T> {
    value: T,
    dirty: bool,
}

impl<T: PartialEq> Tracked<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            dirty: false,
        }
    }

    /// Stores `value`; returns whether it differed from the current one.
    pub fn set(&mut self, value: T) -> bool {
        if self.value == value {
            return false;
        }
        self.value = value;
        self.dirty = true;
        true
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn clear(&mut self) {
        self.dirty = false;
    }

    pub fn invalidate(&mut self) {
        self.dirty = true;
    }
}

/// Remembers the last value pushed to the native context, for state that is
/// applied by comparing handles rather than through a dirty flag.
#[derive(Debug, Clone, Copy)]
pub struct LastApplied<T> {
    last: Option<T>,
}

impl<T> Default for LastApplied<T> {
    fn default() -> Self {
        Self { last: None }
    }
}

impl<T: PartialEq + Copy> LastApplied<T> {
    pub fn differs(&self, value: T) -> bool {
        self.last != Some(value)
    }

    pub fn record(&mut self, value: T) {
        self.last = Some(value);
    }

    pub fn get(&self) -> Option<T> {
        self.last
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct VertexBufferBinding {
    pub buffer: Option<Handle<Buffer>>,
    pub offset: u64,
    pub stride: u32,
    pub input_rate: VertexInputRate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct IndexBufferBinding {
    pub buffer: Handle<Buffer>,
    pub offset: u64,
    pub index_type: IndexType,
}

/// What a [`VertexBufferState::set`] call changed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VertexBufferChange {
    pub binding: bool,
    pub layout: bool,
}

/// Per-slot vertex-buffer bindings.
///
/// Buffer and offset changes mark the slot's bit in the binding mask. Stride
/// and input-rate changes mark the input layout instead; rebuilding a layout
/// is a separate, more expensive native operation than a rebind.
#[derive(Debug, Clone, Default)]
pub struct VertexBufferState {
    slots: [VertexBufferBinding; MAX_VERTEX_BUFFER_BINDINGS],
    dirty_slots: u32,
    layout_dirty: bool,
}

impl VertexBufferState {
    pub fn set(&mut self, slot: usize, binding: VertexBufferBinding) -> VertexBufferChange {
        let current = &mut self.slots[slot];
        let change = VertexBufferChange {
            binding: current.buffer != binding.buffer || current.offset != binding.offset,
            layout: current.stride != binding.stride || current.input_rate != binding.input_rate,
        };

        if change.binding {
            self.dirty_slots |= 1 << slot;
        }
        if change.layout {
            self.layout_dirty = true;
        }
        *current = binding;
        change
    }

    pub fn binding(&self, slot: usize) -> &VertexBufferBinding {
        &self.slots[slot]
    }

    pub fn bindings(&self) -> &[VertexBufferBinding; MAX_VERTEX_BUFFER_BINDINGS] {
        &self.slots
    }

    pub fn dirty_slots(&self) -> u32 {
        self.dirty_slots
    }

    /// Contiguous runs of dirty slots as `(first_slot, count)`.
    pub fn dirty_ranges(&self) -> BitRanges {
        BitRanges::new(self.dirty_slots)
    }

    pub fn clear_slots(&mut self, first: u32, count: u32) {
        self.dirty_slots &= !range_mask(first, count);
    }

    pub fn is_layout_dirty(&self) -> bool {
        self.layout_dirty
    }

    pub fn clear_layout(&mut self) {
        self.layout_dirty = false;
    }

    pub fn invalidate_layout(&mut self) {
        self.layout_dirty = true;
    }
}

/// Builds the input layout for `attributes` read through `slots`.
///
/// When every attribute offset is 0, offsets are packed per buffer slot in
/// declaration order. A slot bound with stride 0 gets the tightly packed
/// stride of its attributes.
pub fn build_input_layout(
    vertex_shader: Handle<Shader>,
    attributes: &[VertexAttribute],
    slots: &[VertexBufferBinding; MAX_VERTEX_BUFFER_BINDINGS],
) -> InputLayoutDesc {
    let auto_offset = attributes.iter().all(|a| a.offset == 0);
    let mut packed = [0u32; MAX_VERTEX_BUFFER_BINDINGS];
    let mut elements: SmallVec<[InputElement; 16]> = SmallVec::with_capacity(attributes.len());

    for attr in attributes {
        let slot = attr.buffer_slot as usize;
        let offset = if auto_offset { packed[slot] } else { attr.offset };
        packed[slot] = packed[slot].max(offset + attr.format.size());
        elements.push(InputElement {
            format: attr.format,
            shader_location: attr.shader_location,
            buffer_slot: attr.buffer_slot,
            offset,
            input_rate: slots[slot].input_rate,
        });
    }

    let mut layout_slots = [InputSlot::default(); MAX_VERTEX_BUFFER_BINDINGS];
    for (slot, out) in layout_slots.iter_mut().enumerate() {
        if packed[slot] == 0 {
            continue;
        }
        let bound = &slots[slot];
        *out = InputSlot {
            stride: if bound.stride == 0 { packed[slot] } else { bound.stride },
            input_rate: bound.input_rate,
        };
    }

    InputLayoutDesc {
        vertex_shader,
        elements,
        slots: layout_slots,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::structs::VertexFormat;
    use crate::utils::Pool;

    fn buffers(n: usize) -> Vec<Handle<Buffer>> {
        let mut pool = Pool::new(8);
        (0..n)
            .map(|_| {
                pool.insert(Buffer {
                    desc: Default::default(),
                })
                .unwrap()
            })
            .collect()
    }

    fn binding(buffer: Handle<Buffer>, offset: u64, stride: u32) -> VertexBufferBinding {
        VertexBufferBinding {
            buffer: Some(buffer),
            offset,
            stride,
            input_rate: VertexInputRate::Vertex,
        }
    }

    #[test]
    fn tracked_set_is_idempotent() {
        let mut t = Tracked::new(3);
        assert!(!t.set(3));
        assert!(!t.is_dirty());
        assert!(t.set(4));
        assert!(t.is_dirty());
        t.clear();
        assert!(!t.set(4));
        assert!(!t.is_dirty());
    }

    #[test]
    fn identical_binding_is_not_dirty() {
        let b = buffers(1)[0];
        let mut state = VertexBufferState::default();
        let first = state.set(0, binding(b, 0, 16));
        assert!(first.binding && first.layout);
        state.clear_slots(0, 1);
        state.clear_layout();

        let second = state.set(0, binding(b, 0, 16));
        assert_eq!(second, VertexBufferChange::default());
        assert_eq!(state.dirty_slots(), 0);
        assert!(!state.is_layout_dirty());
    }

    #[test]
    fn stride_and_offset_are_tracked_independently() {
        let b = buffers(1)[0];
        let mut state = VertexBufferState::default();
        state.set(1, binding(b, 0, 16));
        state.clear_slots(0, 4);
        state.clear_layout();

        let stride_only = state.set(1, binding(b, 0, 32));
        assert!(!stride_only.binding);
        assert!(stride_only.layout);
        assert_eq!(state.dirty_slots(), 0);

        state.clear_layout();
        let offset_only = state.set(1, binding(b, 64, 32));
        assert!(offset_only.binding);
        assert!(!offset_only.layout);
        assert_eq!(state.dirty_slots(), 0b10);
    }

    #[test]
    fn dirty_ranges_group_adjacent_slots() {
        let bs = buffers(4);
        let mut state = VertexBufferState::default();
        state.set(0, binding(bs[0], 0, 4));
        state.set(1, binding(bs[1], 0, 4));
        state.set(3, binding(bs[3], 0, 4));
        let ranges: Vec<_> = state.dirty_ranges().collect();
        assert_eq!(ranges, vec![(0, 2), (3, 1)]);
        state.clear_slots(0, 2);
        assert_eq!(state.dirty_slots(), 0b1000);
    }

    #[test]
    fn auto_offsets_pack_per_slot() {
        let attrs = [
            VertexAttribute { format: VertexFormat::Float3, buffer_slot: 0, offset: 0, shader_location: 0 },
            VertexAttribute { format: VertexFormat::Float2, buffer_slot: 0, offset: 0, shader_location: 1 },
            VertexAttribute { format: VertexFormat::UByte4N, buffer_slot: 1, offset: 0, shader_location: 2 },
            VertexAttribute { format: VertexFormat::Float4, buffer_slot: 0, offset: 0, shader_location: 3 },
        ];
        let slots = [VertexBufferBinding::default(); MAX_VERTEX_BUFFER_BINDINGS];
        let layout = build_input_layout(Handle::null(), &attrs, &slots);
        let offsets: Vec<_> = layout.elements.iter().map(|e| e.offset).collect();
        assert_eq!(offsets, vec![0, 12, 0, 20]);
        assert_eq!(layout.slots[0].stride, 36);
        assert_eq!(layout.slots[1].stride, 4);
        assert_eq!(layout.slots[2], InputSlot::default());
    }

    #[test]
    fn explicit_offsets_are_kept() {
        let attrs = [
            VertexAttribute { format: VertexFormat::Float3, buffer_slot: 0, offset: 16, shader_location: 0 },
            VertexAttribute { format: VertexFormat::Float, buffer_slot: 0, offset: 0, shader_location: 1 },
        ];
        let mut slots = [VertexBufferBinding::default(); MAX_VERTEX_BUFFER_BINDINGS];
        slots[0].stride = 48;
        slots[0].input_rate = VertexInputRate::Instance;
        let layout = build_input_layout(Handle::null(), &attrs, &slots);
        assert_eq!(layout.elements[0].offset, 16);
        assert_eq!(layout.elements[1].offset, 0);
        assert_eq!(layout.elements[0].input_rate, VertexInputRate::Instance);
        assert_eq!(layout.slots[0].stride, 48);
    }
}
