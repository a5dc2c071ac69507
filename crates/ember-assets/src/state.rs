//! Asset lifecycle states and per-load options.

use bitflags::bitflags;

/// Lifecycle state of a loaded asset slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetState {
    /// Slot exists but no load has completed yet and none is in flight.
    Zombie,
    /// An async read or decode is in flight; the object is a placeholder.
    Loading,
    /// The real object is installed.
    Ok,
    /// The last load failed; the object is the failure sentinel.
    Failed,
}

bitflags! {
    /// Flags controlling a single load operation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LoadFlags: u32 {
        /// Reload the asset even if it is already resident. Implies
        /// `WAIT_ON_LOAD`.
        const RELOAD = 1 << 0;
        /// Perform the whole load synchronously before returning.
        const WAIT_ON_LOAD = 1 << 1;
    }
}

/// Opaque allocator tag. Assets loaded with different tags get distinct
/// identity keys even for the same path and params.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct AllocId(pub u32);

/// Options for a load operation.
#[derive(Debug, Clone, Copy)]
pub struct LoadOptions {
    pub flags: LoadFlags,
    /// Free-form bitmask used to address groups of assets in bulk ops.
    pub tags: u32,
    pub alloc: AllocId,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            flags: LoadFlags::empty(),
            tags: 0,
            alloc: AllocId::default(),
        }
    }
}

impl LoadOptions {
    pub fn blocking(mut self) -> Self {
        self.flags |= LoadFlags::WAIT_ON_LOAD;
        self
    }

    pub fn reload(mut self) -> Self {
        self.flags |= LoadFlags::RELOAD;
        self
    }

    pub fn with_tags(mut self, tags: u32) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_alloc(mut self, alloc: AllocId) -> Self {
        self.alloc = alloc;
        self
    }
}
