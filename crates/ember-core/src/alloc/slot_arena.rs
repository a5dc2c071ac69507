//! Generational slot arena.
//!
//! A free-list-backed arena whose entries are addressed by [`SlotId`] — an
//! index packed with a generation counter. Re-using a slot bumps its
//! generation, so stale ids are detected instead of silently aliasing the
//! new occupant.

use std::num::NonZeroU64;

/// Generational index into a [`SlotArena`].
///
/// Packs `generation` in the high 32 bits and `index + 1` in the low 32
/// bits, so the whole id is non-zero and `Option<SlotId>` costs nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotId(NonZeroU64);

impl SlotId {
    pub fn new(index: u32, generation: u32) -> Self {
        debug_assert!(index < u32::MAX);
        Self(NonZeroU64::new(((generation as u64) << 32) | (index as u64 + 1)).unwrap())
    }

    pub fn index(&self) -> u32 {
        (self.0.get() & u32::MAX as u64) as u32 - 1
    }

    pub fn generation(&self) -> u32 {
        (self.0.get() >> 32) as u32
    }
}

struct Entry<T> {
    generation: u32,
    data: Option<T>,
}

/// Arena of `T` addressed by generational [`SlotId`]s.
pub struct SlotArena<T> {
    entries: Vec<Entry<T>>,
    free: Vec<u32>,
    len: usize,
}

impl<T> Default for SlotArena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SlotArena<T> {
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }

    /// Insert a value, re-using a freed slot when one is available.
    pub fn insert(&mut self, data: T) -> SlotId {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let entry = &mut self.entries[index as usize];
            debug_assert!(entry.data.is_none());
            entry.data = Some(data);
            SlotId::new(index, entry.generation)
        } else {
            let index = self.entries.len() as u32;
            self.entries.push(Entry {
                generation: 0,
                data: Some(data),
            });
            SlotId::new(index, 0)
        }
    }

    /// Remove and return the value at `id`, bumping the slot's generation.
    ///
    /// Returns `None` if the id is stale or was never allocated.
    pub fn remove(&mut self, id: SlotId) -> Option<T> {
        let entry = self.entries.get_mut(id.index() as usize)?;
        if entry.generation != id.generation() {
            return None;
        }
        let data = entry.data.take()?;
        entry.generation = entry.generation.wrapping_add(1);
        self.free.push(id.index());
        self.len -= 1;
        Some(data)
    }

    pub fn contains(&self, id: SlotId) -> bool {
        self.try_get(id).is_some()
    }

    /// Look up `id`, panicking on a stale generation.
    pub fn get(&self, id: SlotId) -> &T {
        self.try_get(id)
            .expect("stale slot id, use after free")
    }

    pub fn get_mut(&mut self, id: SlotId) -> &mut T {
        self.try_get_mut(id)
            .expect("stale slot id, use after free")
    }

    pub fn try_get(&self, id: SlotId) -> Option<&T> {
        let entry = self.entries.get(id.index() as usize)?;
        if entry.generation != id.generation() {
            return None;
        }
        entry.data.as_ref()
    }

    pub fn try_get_mut(&mut self, id: SlotId) -> Option<&mut T> {
        let entry = self.entries.get_mut(id.index() as usize)?;
        if entry.generation != id.generation() {
            return None;
        }
        entry.data.as_mut()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter().filter_map(|e| e.data.as_ref())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.entries.iter_mut().filter_map(|e| e.data.as_mut())
    }

    /// Iterate occupied slots together with their current ids.
    pub fn iter_with_ids(&self) -> impl Iterator<Item = (SlotId, &T)> {
        self.entries.iter().enumerate().filter_map(|(i, e)| {
            e.data
                .as_ref()
                .map(|data| (SlotId::new(i as u32, e.generation), data))
        })
    }
}

static_assertions::assert_eq_size!(SlotId, Option<SlotId>);
