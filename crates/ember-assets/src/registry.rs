//! Asset type registration.
//!
//! Each asset type implements [`AssetType`] and is registered once with
//! the server. The server stores handlers type-erased behind
//! [`ErasedAssetType`]; objects, params and metadata travel through the
//! pipeline as `dyn Any` boxes and are downcast back at the trait
//! boundary.

use std::any::{Any, TypeId};
use std::hash::Hash;
use std::sync::Arc;

use ember_core::alloc::HashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::handle::UntypedHandle;
use crate::hash::{Fnv1a, hash_str};
use crate::state::{AllocId, LoadFlags};

/// A shared, type-erased asset object.
pub type ObjRef = Arc<dyn Any + Send + Sync>;
pub(crate) type ObjBox = Box<dyn Any + Send + Sync>;
pub(crate) type ParamsBox = Box<dyn Any + Send + Sync>;
pub(crate) type MetaBox = Box<dyn Any + Send + Sync>;

/// Context for a single load operation, handed to [`AssetType`]
/// callbacks.
pub struct LoadContext<'a, P> {
    /// Path the asset was requested as.
    pub path: &'a str,
    /// Path the bytes actually come from. Differs from `path` when the
    /// metadata cache redirected the load.
    pub real_path: &'a str,
    pub params: &'a P,
    pub alloc: AllocId,
    pub tags: u32,
    pub flags: LoadFlags,
}

/// Behavior of one asset type.
///
/// `prepare`, `finalize`, `release` and `reload` run on the thread that
/// drives [`AssetServer::update`]; only `load` runs on worker threads,
/// so it is the place for heavy decoding.
///
/// [`AssetServer::update`]: crate::server::AssetServer::update
pub trait AssetType: Send + Sync + 'static {
    /// The resident object produced by a successful load.
    type Obj: Send + Sync + 'static;
    /// Per-load parameters. Part of the asset identity key, so two
    /// loads of the same path with different params produce distinct
    /// assets.
    type Params: Clone + Hash + Default + Send + Sync + 'static;
    /// Metadata extracted from the source bytes, persistable in the
    /// metadata cache. Use `()` for types without metadata.
    type Metadata: Serialize + DeserializeOwned + Default + Send + Sync + 'static;

    /// Unique name, also used in cache files and bulk operations.
    fn name(&self) -> &'static str;

    /// Flags OR-ed into every load of this type.
    fn forced_flags(&self) -> LoadFlags {
        LoadFlags::empty()
    }

    /// Object installed when a load fails.
    fn failed_obj(&self) -> Self::Obj;

    /// Object visible while an async load is in flight.
    fn placeholder_obj(&self) -> Self::Obj;

    /// Extracts metadata from raw bytes. Called once per resource; the
    /// result is cached and reused by later loads.
    fn read_metadata(&self, ctx: &LoadContext<'_, Self::Params>, bytes: &[u8])
    -> Self::Metadata;

    /// Allocates the object shell from metadata, before any decoding.
    /// Returning `None` fails the load.
    fn prepare(
        &self,
        ctx: &LoadContext<'_, Self::Params>,
        metadata: &Self::Metadata,
    ) -> Option<Self::Obj>;

    /// Decodes bytes into the prepared object. Runs on a worker thread
    /// for async loads. Returning `false` fails the load and the object
    /// is released without being installed.
    fn load(&self, obj: &mut Self::Obj, ctx: &LoadContext<'_, Self::Params>, bytes: &[u8])
    -> bool;

    /// Last step before the object becomes visible, back on the driver
    /// thread.
    fn finalize(
        &self,
        _obj: &mut Self::Obj,
        _ctx: &LoadContext<'_, Self::Params>,
        _bytes: &[u8],
    ) {
    }

    /// Releases a loaded object. Not called for the failure and
    /// placeholder sentinels.
    fn release(&self, _obj: Arc<Self::Obj>) {}

    /// Notifies that `handle` now points at a fresh object after a
    /// reload. `previous` is the old object if the reload succeeded; it
    /// is released right after this call returns.
    fn reload(&self, _handle: UntypedHandle, _previous: Option<Arc<Self::Obj>>) {}
}

/// Object-safe wrapper over [`AssetType`] used by the server.
pub(crate) trait ErasedAssetType: Send + Sync {
    fn name(&self) -> &'static str;
    fn forced_flags(&self) -> LoadFlags;

    fn failed_obj(&self) -> ObjRef;
    fn placeholder_obj(&self) -> ObjRef;
    /// True if `obj` is one of the shared sentinel objects.
    fn is_sentinel(&self, obj: &ObjRef) -> bool;

    fn clone_params(&self, params: &(dyn Any + Send + Sync)) -> ParamsBox;
    fn hash_params(&self, params: &(dyn Any + Send + Sync), hasher: &mut Fnv1a);
    fn has_params(&self) -> bool;

    fn has_metadata(&self) -> bool;
    fn read_metadata(&self, req: &LoadRequest, bytes: &[u8]) -> MetaBox;
    fn metadata_to_json(&self, meta: &(dyn Any + Send + Sync)) -> serde_json::Value;
    fn metadata_from_json(&self, value: &serde_json::Value) -> Option<MetaBox>;

    fn prepare(&self, req: &LoadRequest, meta: &(dyn Any + Send + Sync)) -> Option<ObjBox>;
    fn load(&self, obj: &mut ObjBox, req: &LoadRequest, bytes: &[u8]) -> bool;
    fn finalize(&self, obj: &mut ObjBox, req: &LoadRequest, bytes: &[u8]);
    fn release(&self, obj: ObjRef);
    fn reload(&self, handle: UntypedHandle, previous: Option<ObjRef>);
}

/// Owned, type-erased form of [`LoadContext`]. Travels with async reads
/// and decode jobs.
pub(crate) struct LoadRequest {
    pub path: String,
    pub real_path: String,
    pub params: ParamsBox,
    pub alloc: AllocId,
    pub tags: u32,
    pub flags: LoadFlags,
}

struct TypedHandler<A: AssetType> {
    inner: A,
    failed: ObjRef,
    placeholder: ObjRef,
}

impl<A: AssetType> TypedHandler<A> {
    fn new(inner: A) -> Self {
        let failed: Arc<A::Obj> = Arc::new(inner.failed_obj());
        let placeholder: Arc<A::Obj> = Arc::new(inner.placeholder_obj());
        Self {
            inner,
            failed,
            placeholder,
        }
    }

    fn ctx<'a>(&self, req: &'a LoadRequest) -> LoadContext<'a, A::Params> {
        let params = req
            .params
            .downcast_ref::<A::Params>()
            .expect("asset params type mismatch");
        LoadContext {
            path: &req.path,
            real_path: &req.real_path,
            params,
            alloc: req.alloc,
            tags: req.tags,
            flags: req.flags,
        }
    }
}

impl<A: AssetType> ErasedAssetType for TypedHandler<A> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn forced_flags(&self) -> LoadFlags {
        self.inner.forced_flags()
    }

    fn failed_obj(&self) -> ObjRef {
        self.failed.clone()
    }

    fn placeholder_obj(&self) -> ObjRef {
        self.placeholder.clone()
    }

    fn is_sentinel(&self, obj: &ObjRef) -> bool {
        Arc::ptr_eq(obj, &self.failed) || Arc::ptr_eq(obj, &self.placeholder)
    }

    fn clone_params(&self, params: &(dyn Any + Send + Sync)) -> ParamsBox {
        let params = params
            .downcast_ref::<A::Params>()
            .expect("asset params type mismatch");
        Box::new(params.clone())
    }

    fn hash_params(&self, params: &(dyn Any + Send + Sync), hasher: &mut Fnv1a) {
        let params = params
            .downcast_ref::<A::Params>()
            .expect("asset params type mismatch");
        params.hash(hasher);
    }

    fn has_params(&self) -> bool {
        size_of::<A::Params>() > 0
    }

    fn has_metadata(&self) -> bool {
        size_of::<A::Metadata>() > 0
    }

    fn read_metadata(&self, req: &LoadRequest, bytes: &[u8]) -> MetaBox {
        Box::new(self.inner.read_metadata(&self.ctx(req), bytes))
    }

    fn metadata_to_json(&self, meta: &(dyn Any + Send + Sync)) -> serde_json::Value {
        let meta = meta
            .downcast_ref::<A::Metadata>()
            .expect("asset metadata type mismatch");
        serde_json::to_value(meta).unwrap_or(serde_json::Value::Null)
    }

    fn metadata_from_json(&self, value: &serde_json::Value) -> Option<MetaBox> {
        serde_json::from_value::<A::Metadata>(value.clone())
            .ok()
            .map(|meta| Box::new(meta) as MetaBox)
    }

    fn prepare(&self, req: &LoadRequest, meta: &(dyn Any + Send + Sync)) -> Option<ObjBox> {
        let meta = meta
            .downcast_ref::<A::Metadata>()
            .expect("asset metadata type mismatch");
        self.inner
            .prepare(&self.ctx(req), meta)
            .map(|obj| Box::new(obj) as ObjBox)
    }

    fn load(&self, obj: &mut ObjBox, req: &LoadRequest, bytes: &[u8]) -> bool {
        let obj = obj
            .downcast_mut::<A::Obj>()
            .expect("asset object type mismatch");
        self.inner.load(obj, &self.ctx(req), bytes)
    }

    fn finalize(&self, obj: &mut ObjBox, req: &LoadRequest, bytes: &[u8]) {
        let obj = obj
            .downcast_mut::<A::Obj>()
            .expect("asset object type mismatch");
        self.inner.finalize(obj, &self.ctx(req), bytes);
    }

    fn release(&self, obj: ObjRef) {
        let obj = obj
            .downcast::<A::Obj>()
            .expect("asset object type mismatch");
        self.inner.release(obj);
    }

    fn reload(&self, handle: UntypedHandle, previous: Option<ObjRef>) {
        let previous = previous.map(|obj| {
            obj.downcast::<A::Obj>()
                .expect("asset object type mismatch")
        });
        self.inner.reload(handle, previous);
    }
}

pub(crate) struct RegisteredType {
    pub handler: Arc<dyn ErasedAssetType>,
    pub type_id: TypeId,
    /// Set by unregistration. Assets of an unregistered type skip the
    /// release callback on teardown.
    pub unregistered: bool,
}

/// Registered asset types, addressable by Rust type and by name.
#[derive(Default)]
pub(crate) struct TypeRegistry {
    types: Vec<RegisteredType>,
    by_type_id: HashMap<TypeId, usize>,
    by_name_hash: HashMap<u64, usize>,
}

impl TypeRegistry {
    /// Registers a handler. Panics on a duplicate type or name; types
    /// are registered once at startup.
    pub fn register<A: AssetType>(&mut self, handler: A) -> usize {
        let type_id = TypeId::of::<A>();
        let name = handler.name();
        let name_hash = hash_str(name);
        assert!(
            !self.by_type_id.contains_key(&type_id),
            "asset type {name:?} is already registered"
        );
        assert!(
            !self.by_name_hash.contains_key(&name_hash),
            "asset type name {name:?} is already taken"
        );

        let index = self.types.len();
        self.types.push(RegisteredType {
            handler: Arc::new(TypedHandler::new(handler)),
            type_id,
            unregistered: false,
        });
        self.by_type_id.insert(type_id, index);
        self.by_name_hash.insert(name_hash, index);
        tracing::debug!(name, index, "registered asset type");
        index
    }

    /// Marks a type as unregistered. Its handler stays resident so
    /// outstanding assets keep working, but teardown will no longer
    /// call release for its objects.
    pub fn unregister(&mut self, name: &str) {
        let Some(&index) = self.by_name_hash.get(&hash_str(name)) else {
            tracing::warn!(name, "unregistering unknown asset type");
            return;
        };
        self.types[index].unregistered = true;
    }

    pub fn get(&self, index: usize) -> &RegisteredType {
        &self.types[index]
    }

    pub fn index_of<A: AssetType>(&self) -> Option<usize> {
        self.by_type_id.get(&TypeId::of::<A>()).copied()
    }

    pub fn index_of_name(&self, name: &str) -> Option<usize> {
        self.by_name_hash.get(&hash_str(name)).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Blob;

    impl AssetType for Blob {
        type Obj = Vec<u8>;
        type Params = ();
        type Metadata = ();

        fn name(&self) -> &'static str {
            "blob"
        }

        fn failed_obj(&self) -> Vec<u8> {
            Vec::new()
        }

        fn placeholder_obj(&self) -> Vec<u8> {
            Vec::new()
        }

        fn read_metadata(&self, _ctx: &LoadContext<'_, ()>, _bytes: &[u8]) {}

        fn prepare(&self, _ctx: &LoadContext<'_, ()>, _meta: &()) -> Option<Vec<u8>> {
            Some(Vec::new())
        }

        fn load(&self, obj: &mut Vec<u8>, _ctx: &LoadContext<'_, ()>, bytes: &[u8]) -> bool {
            obj.extend_from_slice(bytes);
            true
        }
    }

    #[test]
    fn register_and_lookup() {
        let mut registry = TypeRegistry::default();
        let index = registry.register(Blob);
        assert_eq!(registry.index_of::<Blob>(), Some(index));
        assert_eq!(registry.index_of_name("blob"), Some(index));
        assert_eq!(registry.index_of_name("nope"), None);
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn duplicate_registration_panics() {
        let mut registry = TypeRegistry::default();
        registry.register(Blob);
        registry.register(Blob);
    }

    #[test]
    fn sentinels_are_recognized() {
        let mut registry = TypeRegistry::default();
        let index = registry.register(Blob);
        let handler = registry.get(index).handler.clone();

        let failed = handler.failed_obj();
        let placeholder = handler.placeholder_obj();
        assert!(handler.is_sentinel(&failed));
        assert!(handler.is_sentinel(&placeholder));

        let real: ObjRef = Arc::new(vec![1u8, 2, 3]);
        assert!(!handler.is_sentinel(&real));
    }

    #[test]
    fn zero_sized_params_do_not_affect_keys() {
        let mut registry = TypeRegistry::default();
        let index = registry.register(Blob);
        assert!(!registry.get(index).handler.has_params());
        assert!(!registry.get(index).handler.has_metadata());
    }
}
