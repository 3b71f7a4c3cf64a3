use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;

/// Generational index into a [`Pool`].
///
/// Generations start at 1, so the default handle never refers to a live
/// item. Releasing a slot bumps its generation, which turns every handle
/// still pointing at it stale.
pub struct Handle<T> {
    pub slot: u16,
    pub generation: u16,
    phantom: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    pub const fn null() -> Self {
        Self {
            slot: 0,
            generation: 0,
            phantom: PhantomData,
        }
    }

    pub fn is_null(&self) -> bool {
        self.generation == 0
    }

    /// Packs slot and generation into one value, mostly for native debug names.
    pub fn raw(&self) -> u32 {
        ((self.generation as u32) << 16) | self.slot as u32
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({}v{})", self.slot, self.generation)
    }
}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.slot == other.slot && self.generation == other.generation
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.slot.hash(state);
        self.generation.hash(state);
    }
}

impl<T> Default for Handle<T> {
    fn default() -> Self {
        Self::null()
    }
}

pub struct Pool<T> {
    items: Vec<Option<T>>,
    empty: Vec<usize>,
    generation: Vec<u16>,
    live: usize,
}

impl<T> Default for Pool<T> {
    fn default() -> Self {
        Self::new(64)
    }
}

impl<T> Pool<T> {
    pub fn new(initial_size: usize) -> Self {
        let mut p = Pool {
            items: Vec::with_capacity(initial_size),
            empty: Vec::with_capacity(initial_size),
            generation: vec![1; initial_size],
            live: 0,
        };

        // Reversed so the first insert lands in slot 0.
        p.empty = (0..initial_size).rev().collect();
        p.items.resize_with(initial_size, || None);
        p
    }

    /// Stores `item` and returns its handle. Returns `None` once every one of
    /// the 65536 addressable slots is occupied.
    pub fn insert(&mut self, item: T) -> Option<Handle<T>> {
        let slot = match self.empty.pop() {
            Some(slot) => slot,
            None => self.grow()?,
        };

        self.items[slot] = Some(item);
        self.live += 1;

        Some(Handle {
            slot: slot as u16,
            generation: self.generation[slot],
            phantom: PhantomData,
        })
    }

    fn grow(&mut self) -> Option<usize> {
        let old = self.items.len();
        let max = u16::MAX as usize + 1;
        if old >= max {
            return None;
        }
        let new = (old.max(16) * 2).min(max);
        self.items.resize_with(new, || None);
        self.generation.resize(new, 1);
        self.empty.extend((old + 1..new).rev());
        Some(old)
    }

    /// Removes the item behind `item`, returning it. Stale handles return
    /// `None` and leave the pool untouched.
    pub fn release(&mut self, item: Handle<T>) -> Option<T> {
        let slot = item.slot as usize;
        if !self.is_live(item) {
            return None;
        }

        let value = self.items[slot].take();
        self.generation[slot] = self.generation[slot].wrapping_add(1).max(1);
        self.empty.push(slot);
        self.live -= 1;
        value
    }

    pub fn is_live(&self, item: Handle<T>) -> bool {
        let slot = item.slot as usize;
        slot < self.items.len()
            && self.generation[slot] == item.generation
            && self.items[slot].is_some()
    }

    pub fn get_ref(&self, item: Handle<T>) -> Option<&T> {
        if !self.is_live(item) {
            return None;
        }
        self.items[item.slot as usize].as_ref()
    }

    pub fn get_mut_ref(&mut self, item: Handle<T>) -> Option<&mut T> {
        if !self.is_live(item) {
            return None;
        }
        self.items[item.slot as usize].as_mut()
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Handles of every occupied slot, in slot order.
    pub fn handles(&self) -> Vec<Handle<T>> {
        self.items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.is_some())
            .map(|(slot, _)| Handle {
                slot: slot as u16,
                generation: self.generation[slot],
                phantom: PhantomData,
            })
            .collect()
    }

    pub fn for_each_occupied<F>(&self, mut func: F)
    where
        F: FnMut(Handle<T>, &T),
    {
        for (slot, item) in self.items.iter().enumerate() {
            if let Some(item) = item {
                let handle = Handle {
                    slot: slot as u16,
                    generation: self.generation[slot],
                    phantom: PhantomData,
                };
                func(handle, item);
            }
        }
    }

    /// Releases every occupied slot and returns the removed items. All
    /// outstanding handles become stale.
    pub fn drain(&mut self) -> Vec<(Handle<T>, T)> {
        let mut out = Vec::with_capacity(self.live);
        for handle in self.handles() {
            if let Some(item) = self.release(handle) {
                out.push((handle, item));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_handle_is_never_live() {
        let mut pool: Pool<u32> = Pool::new(4);
        let h = pool.insert(7).unwrap();
        assert_eq!(h.slot, 0);
        assert!(!pool.is_live(Handle::default()));
        assert!(Handle::<u32>::default().is_null());
        assert_eq!(pool.get_ref(h), Some(&7));
    }

    #[test]
    fn release_makes_handle_stale() {
        let mut pool: Pool<&str> = Pool::new(2);
        let a = pool.insert("a").unwrap();
        assert_eq!(pool.release(a), Some("a"));
        assert_eq!(pool.release(a), None);

        let b = pool.insert("b").unwrap();
        assert_eq!(a.slot, b.slot);
        assert_ne!(a, b);
        assert!(pool.get_ref(a).is_none());
        assert_eq!(pool.get_ref(b), Some(&"b"));
    }

    #[test]
    fn grows_past_initial_size() {
        let mut pool: Pool<usize> = Pool::new(2);
        let handles: Vec<_> = (0..40).map(|i| pool.insert(i).unwrap()).collect();
        assert_eq!(pool.len(), 40);
        for (i, h) in handles.iter().enumerate() {
            assert_eq!(pool.get_ref(*h), Some(&i));
        }
    }

    #[test]
    fn drain_empties_and_invalidates() {
        let mut pool: Pool<u8> = Pool::new(8);
        let a = pool.insert(1).unwrap();
        let b = pool.insert(2).unwrap();
        let drained = pool.drain();
        assert_eq!(drained.len(), 2);
        assert!(pool.is_empty());
        assert!(!pool.is_live(a));
        assert!(!pool.is_live(b));
    }
}
