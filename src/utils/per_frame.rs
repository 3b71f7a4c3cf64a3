/// Fixed ring of per-frame values, indexed by the frame currently being
/// recorded.
pub struct PerFrame<T> {
    frames: Vec<T>,
    curr_frame: u16,
}

impl<T> PerFrame<T>
where
    T: Default,
{
    pub fn new(num_frames: usize) -> Self {
        let mut frames = Vec::with_capacity(num_frames.max(1));
        frames.resize_with(num_frames.max(1), Default::default);
        Self {
            frames,
            curr_frame: 0,
        }
    }
}

impl<T> PerFrame<T> {
    pub fn curr(&self) -> &T {
        &self.frames[self.curr_frame as usize]
    }

    pub fn curr_mut(&mut self) -> &mut T {
        &mut self.frames[self.curr_frame as usize]
    }

    pub fn curr_idx(&self) -> usize {
        self.curr_frame as usize
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn advance_next_frame(&mut self) {
        self.curr_frame = ((self.curr_frame as usize + 1) % self.frames.len()) as u16;
    }

    pub fn reset(&mut self) {
        self.curr_frame = 0;
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.frames.iter()
    }

    pub fn for_each_mut<F>(&mut self, mut func: F)
    where
        F: FnMut(&mut T),
    {
        for i in &mut self.frames {
            func(i);
        }
    }
}
