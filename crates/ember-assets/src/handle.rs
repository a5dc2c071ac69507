//! Typed and untyped asset handles.
//!
//! A handle is a generational slot id plus the [`TypeId`] of the asset
//! type it was created for. Handles are plain `Copy` values and stay
//! valid until the asset's reference count drops to zero; using a
//! handle after that point is caught by the generation check.

use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use ember_core::alloc::slot_arena::SlotId;

use crate::registry::AssetType;

/// A type-erased asset handle.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct UntypedHandle {
    pub(crate) slot: SlotId,
    pub(crate) type_id: TypeId,
}

impl UntypedHandle {
    pub(crate) fn new(slot: SlotId, type_id: TypeId) -> Self {
        Self { slot, type_id }
    }

    /// The `TypeId` of the [`AssetType`] this handle was created for.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Converts back to a typed handle, checking the asset type.
    pub fn typed<A: AssetType>(self) -> Option<Handle<A>> {
        (self.type_id == TypeId::of::<A>()).then(|| Handle {
            raw: self,
            _marker: PhantomData,
        })
    }
}

impl fmt::Debug for UntypedHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UntypedHandle")
            .field("index", &self.slot.index())
            .field("generation", &self.slot.generation())
            .finish()
    }
}

/// A handle to an asset of type `A`.
pub struct Handle<A: AssetType> {
    pub(crate) raw: UntypedHandle,
    _marker: PhantomData<fn() -> A>,
}

impl<A: AssetType> Handle<A> {
    pub(crate) fn new(raw: UntypedHandle) -> Self {
        debug_assert_eq!(raw.type_id, TypeId::of::<A>());
        Self {
            raw,
            _marker: PhantomData,
        }
    }

    pub fn untyped(&self) -> UntypedHandle {
        self.raw
    }
}

// Manual impls so `A` does not need to be Clone/Copy/etc itself.
impl<A: AssetType> Clone for Handle<A> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<A: AssetType> Copy for Handle<A> {}

impl<A: AssetType> PartialEq for Handle<A> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<A: AssetType> Eq for Handle<A> {}

impl<A: AssetType> Hash for Handle<A> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl<A: AssetType> fmt::Debug for Handle<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("index", &self.raw.slot.index())
            .field("generation", &self.raw.slot.generation())
            .finish()
    }
}

impl<A: AssetType> From<Handle<A>> for UntypedHandle {
    fn from(handle: Handle<A>) -> Self {
        handle.raw
    }
}

/// A handle to an asset group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupHandle(pub(crate) SlotId);
