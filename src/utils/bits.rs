/// Iterator over the runs of consecutive set bits in a mask, lowest run
/// first. Each item is `(first_bit, run_length)`.
///
/// Used to turn a per-slot dirty mask into one native call per contiguous
/// range of slots.
#[derive(Debug, Clone, Copy)]
pub struct BitRanges {
    remaining: u32,
}

impl BitRanges {
    pub fn new(mask: u32) -> Self {
        Self { remaining: mask }
    }
}

impl Iterator for BitRanges {
    type Item = (u32, u32);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let start = self.remaining.trailing_zeros();
        let count = (self.remaining >> start).trailing_ones();
        self.remaining &= !range_mask(start, count);
        Some((start, count))
    }
}

/// Mask with `count` bits set starting at `start`.
pub fn range_mask(start: u32, count: u32) -> u32 {
    if count == 0 {
        return 0;
    }
    if count >= 32 {
        return u32::MAX << start;
    }
    ((1u32 << count) - 1) << start
}
