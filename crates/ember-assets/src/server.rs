//! The asset server.
//!
//! Owns the type registry, the resource table and the asset slots, and
//! drives the async load pipeline. Loads go through three stages:
//!
//! 1. a read task fetches the bytes from the [`Vfs`] on a worker thread,
//! 2. a decode job runs [`AssetType::load`] on a worker thread,
//! 3. [`AssetServer::update`] finalizes finished jobs on the driver
//!    thread and installs the objects.
//!
//! Blocking loads (`WAIT_ON_LOAD`) run all three stages inline before
//! returning. Everything except stage 2 happens on the thread that owns
//! the server; worker threads that need to resolve handles use the
//! [`SharedObjects`] mirror instead.

use std::hash::Hasher;
use std::path::Path;
use std::sync::{Arc, Mutex};

use ember_core::TaskPool;
use ember_core::alloc::HashMap;
use ember_core::alloc::slot_arena::{SlotArena, SlotId};
use futures_lite::future::block_on;

use crate::error::{AssetError, AssetResult};
use crate::handle::{GroupHandle, Handle, UntypedHandle};
use crate::hash::Fnv1a;
use crate::meta_cache;
use crate::registry::{
    AssetType, ErasedAssetType, LoadRequest, ObjBox, ObjRef, ParamsBox, TypeRegistry,
};
use crate::resource::ResourceTable;
use crate::state::{AssetState, LoadFlags, LoadOptions};
use crate::vfs::Vfs;

#[cfg(feature = "hot-reload")]
use crate::hot_reload::AssetWatcher;

struct AssetSlot {
    type_index: usize,
    resource: usize,
    params: ParamsBox,
    /// Identity key: hash of path, params and allocator tag.
    key: u64,
    ref_count: u32,
    obj: ObjRef,
    /// Previous object stashed during a reload, for rollback.
    dead_obj: Option<ObjRef>,
    tags: u32,
    load_flags: LoadFlags,
    state: AssetState,
    alloc: crate::state::AllocId,
}

struct PendingRead {
    handle: UntypedHandle,
    task: ember_core::task_pool::Task<AssetResult<Vec<u8>>>,
}

struct DecodeOutcome {
    ok: bool,
    obj: ObjBox,
    bytes: Vec<u8>,
    req: LoadRequest,
}

struct DecodeJob {
    handle: UntypedHandle,
    task: ember_core::task_pool::Task<DecodeOutcome>,
}

struct GroupSlot {
    assets: Vec<UntypedHandle>,
}

/// Lock-guarded mirror of the installed asset objects, safe to consult
/// from worker threads while the server is being mutated elsewhere.
#[derive(Clone, Default)]
pub struct SharedObjects {
    slots: Arc<Mutex<Vec<Option<(u32, ObjRef)>>>>,
}

impl SharedObjects {
    fn set(&self, slot: SlotId, obj: ObjRef) {
        let mut slots = self.slots.lock().unwrap();
        let index = slot.index() as usize;
        if slots.len() <= index {
            slots.resize_with(index + 1, || None);
        }
        slots[index] = Some((slot.generation(), obj));
    }

    fn clear(&self, slot: SlotId) {
        let mut slots = self.slots.lock().unwrap();
        if let Some(entry) = slots.get_mut(slot.index() as usize)
            && entry.as_ref().is_some_and(|(g, _)| *g == slot.generation())
        {
            *entry = None;
        }
    }

    /// Resolves a handle to its current object, if the asset is alive.
    pub fn get(&self, handle: UntypedHandle) -> Option<ObjRef> {
        let slots = self.slots.lock().unwrap();
        slots
            .get(handle.slot.index() as usize)?
            .as_ref()
            .filter(|(g, _)| *g == handle.slot.generation())
            .map(|(_, obj)| obj.clone())
    }

    pub fn get_typed<A: AssetType>(&self, handle: &Handle<A>) -> Option<Arc<A::Obj>> {
        self.get(handle.untyped()).and_then(|obj| obj.downcast().ok())
    }
}

pub struct AssetServer {
    registry: TypeRegistry,
    vfs: Arc<dyn Vfs>,
    pool: Arc<TaskPool>,
    assets: SlotArena<AssetSlot>,
    by_key: HashMap<u64, UntypedHandle>,
    resources: ResourceTable,
    pending_reads: Vec<PendingRead>,
    jobs: SlotArena<DecodeJob>,
    pending_jobs: Vec<SlotId>,
    groups: SlotArena<GroupSlot>,
    current_group: Option<GroupHandle>,
    shared: SharedObjects,
    #[cfg(feature = "hot-reload")]
    watcher: Option<AssetWatcher>,
}

impl AssetServer {
    pub fn new(vfs: Arc<dyn Vfs>, pool: Arc<TaskPool>) -> Self {
        Self {
            registry: TypeRegistry::default(),
            vfs,
            pool,
            assets: SlotArena::new(),
            by_key: HashMap::new(),
            resources: ResourceTable::default(),
            pending_reads: Vec::new(),
            jobs: SlotArena::new(),
            pending_jobs: Vec::new(),
            groups: SlotArena::new(),
            current_group: None,
            shared: SharedObjects::default(),
            #[cfg(feature = "hot-reload")]
            watcher: None,
        }
    }

    /// Registers an asset type. Panics if the type or its name is
    /// already registered.
    pub fn register_type<A: AssetType>(&mut self, handler: A) {
        self.registry.register(handler);
    }

    /// Unregisters a type by name. Outstanding assets of the type keep
    /// their objects but no release callback will run for them at
    /// teardown.
    pub fn unregister_type(&mut self, name: &str) {
        self.registry.unregister(name);
    }

    /// A cloneable view of installed objects for worker threads.
    pub fn shared_objects(&self) -> SharedObjects {
        self.shared.clone()
    }

    // ---- loading ----

    /// Loads an asset. Returns an error only for an empty path; a
    /// missing or undecodable file still yields a handle, in the
    /// `Failed` state (blocking) or transitioning to it (async).
    pub fn load<A: AssetType>(
        &mut self,
        path: &str,
        params: A::Params,
        options: LoadOptions,
    ) -> AssetResult<Handle<A>> {
        let type_index = self.type_index_of::<A>();
        let handle = self.load_core(type_index, path, Box::new(params), options, None)?;
        Ok(Handle::new(handle))
    }

    /// Loads an asset from bytes already in memory. `path` only names
    /// the asset for identity and diagnostics; the source is not read.
    pub fn load_from_mem<A: AssetType>(
        &mut self,
        path: &str,
        bytes: Vec<u8>,
        params: A::Params,
        options: LoadOptions,
    ) -> AssetResult<Handle<A>> {
        let type_index = self.type_index_of::<A>();
        let handle = self.load_core(type_index, path, Box::new(params), options, Some(bytes))?;
        Ok(Handle::new(handle))
    }

    fn type_index_of<A: AssetType>(&self) -> usize {
        self.registry.index_of::<A>().unwrap_or_else(|| {
            panic!(
                "asset type {} is not registered",
                std::any::type_name::<A>()
            )
        })
    }

    fn load_core(
        &mut self,
        type_index: usize,
        path: &str,
        params: ParamsBox,
        options: LoadOptions,
        mem: Option<Vec<u8>>,
    ) -> AssetResult<UntypedHandle> {
        if path.is_empty() {
            tracing::warn!("asset load with empty path");
            return Err(AssetError::EmptyPath);
        }
        let handler = self.registry.get(type_index).handler.clone();
        let mut flags = options.flags | handler.forced_flags();
        if flags.contains(LoadFlags::RELOAD) {
            flags |= LoadFlags::WAIT_ON_LOAD;
        }

        let key = {
            let mut h = Fnv1a::default();
            h.write(path.as_bytes());
            if handler.has_params() {
                handler.hash_params(params.as_ref(), &mut h);
            }
            h.write(&options.alloc.0.to_le_bytes());
            h.finish()
        };

        let existing = self.by_key.get(&key).copied();
        if let Some(handle) = existing
            && !flags.contains(LoadFlags::RELOAD)
        {
            self.assets.get_mut(handle.slot).ref_count += 1;
            self.push_to_group(handle);
            return Ok(handle);
        }

        let resource_index = self.resources.resolve_or_create(path, type_index);
        let real_path = self.resources.get(resource_index).real_path.clone();

        if !flags.contains(LoadFlags::WAIT_ON_LOAD) {
            let handle = self.create_asset(
                type_index,
                resource_index,
                params,
                key,
                options,
                flags,
                handler.placeholder_obj(),
                AssetState::Loading,
            );
            if let Some(bytes) = mem {
                // Bytes are already here; go straight to decode.
                self.start_decode(handle, bytes);
            } else {
                let vfs = self.vfs.clone();
                let read_path = real_path.clone();
                let task = self
                    .pool
                    .spawn(async move { vfs.read(Path::new(&read_path)) });
                self.pending_reads.push(PendingRead { handle, task });
            }
            self.push_to_group(handle);
            tracing::debug!(path, "async asset load queued");
            Ok(handle)
        } else {
            let handle = match existing {
                Some(handle) => {
                    // Reload in place: stash the live object so a failed
                    // reload can roll back.
                    let slot = self.assets.get_mut(handle.slot);
                    if slot.state == AssetState::Ok && !handler.is_sentinel(&slot.obj) {
                        slot.dead_obj = Some(slot.obj.clone());
                    }
                    slot.params = params;
                    slot.load_flags = flags;
                    slot.tags = options.tags;
                    handle
                }
                None => self.create_asset(
                    type_index,
                    resource_index,
                    params,
                    key,
                    options,
                    flags,
                    handler.failed_obj(),
                    AssetState::Zombie,
                ),
            };

            let bytes = match mem {
                Some(bytes) => Ok(bytes),
                None => self.vfs.read(Path::new(&real_path)),
            };
            match bytes {
                Ok(bytes) => self.blocking_load(handle, &bytes),
                Err(err) => {
                    tracing::warn!(path, error = %err, "failed opening asset");
                    self.fail_or_rollback(handle, &handler);
                }
            }
            self.push_to_group(handle);
            Ok(handle)
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn create_asset(
        &mut self,
        type_index: usize,
        resource: usize,
        params: ParamsBox,
        key: u64,
        options: LoadOptions,
        flags: LoadFlags,
        obj: ObjRef,
        state: AssetState,
    ) -> UntypedHandle {
        let type_id = self.registry.get(type_index).type_id;
        let slot = self.assets.insert(AssetSlot {
            type_index,
            resource,
            params,
            key,
            ref_count: 1,
            obj: obj.clone(),
            dead_obj: None,
            tags: options.tags,
            load_flags: flags,
            state,
            alloc: options.alloc,
        });
        let handle = UntypedHandle::new(slot, type_id);
        self.by_key.insert(key, handle);
        self.shared.set(slot, obj);
        handle
    }

    /// Builds the owned request that travels with async stages.
    fn request_for(&self, handle: UntypedHandle) -> (usize, usize, LoadRequest) {
        let slot = self.assets.get(handle.slot);
        let handler = &self.registry.get(slot.type_index).handler;
        let resource = self.resources.get(slot.resource);
        let req = LoadRequest {
            path: resource.path.clone(),
            real_path: resource.real_path.clone(),
            params: handler.clone_params(slot.params.as_ref()),
            alloc: slot.alloc,
            tags: slot.tags,
            flags: slot.load_flags,
        };
        (slot.type_index, slot.resource, req)
    }

    /// Runs metadata, prepare, load and finalize inline.
    fn blocking_load(&mut self, handle: UntypedHandle, bytes: &[u8]) {
        let (type_index, resource_index, req) = self.request_for(handle);
        let handler = self.registry.get(type_index).handler.clone();

        let needs_meta = self.resources.get(resource_index).metadata.is_none()
            || req.flags.contains(LoadFlags::RELOAD);
        if needs_meta {
            let meta = handler.read_metadata(&req, bytes);
            self.resources.get_mut(resource_index).metadata = Some(meta);
        }

        let decoded: Option<ObjBox> = {
            let meta = self
                .resources
                .get(resource_index)
                .metadata
                .as_ref()
                .expect("metadata was just extracted");
            match handler.prepare(&req, meta.as_ref()) {
                Some(mut obj) => {
                    if handler.load(&mut obj, &req, bytes) {
                        handler.finalize(&mut obj, &req, bytes);
                        Some(obj)
                    } else {
                        handler.release(Arc::from(obj));
                        None
                    }
                }
                None => None,
            }
        };

        match decoded {
            Some(obj) => {
                self.install_ok(handle, Arc::from(obj));
                tracing::debug!(path = %req.path, "asset loaded");
            }
            None => {
                warn_load(&req, "loading");
                self.fail_or_rollback(handle, &handler);
            }
        }

        if req.flags.contains(LoadFlags::RELOAD) {
            // After a rollback the stash is already consumed, so the
            // callback sees no previous object and nothing is released.
            let dead = self.assets.get_mut(handle.slot).dead_obj.take();
            handler.reload(handle, dead.clone());
            if let Some(dead) = dead
                && !handler.is_sentinel(&dead)
            {
                handler.release(dead);
            }
        }
    }

    fn install_ok(&mut self, handle: UntypedHandle, obj: ObjRef) {
        let slot = self.assets.get_mut(handle.slot);
        slot.obj = obj.clone();
        slot.state = AssetState::Ok;
        self.shared.set(handle.slot, obj);
    }

    /// Marks a failed load. Rolls back to the stashed object when a
    /// reload is in flight, otherwise installs the failure sentinel.
    fn fail_or_rollback(&mut self, handle: UntypedHandle, handler: &Arc<dyn ErasedAssetType>) {
        let slot = self.assets.get_mut(handle.slot);
        if let Some(dead) = slot.dead_obj.take() {
            slot.obj = dead.clone();
            slot.state = AssetState::Ok;
            self.shared.set(handle.slot, dead);
        } else {
            let failed = handler.failed_obj();
            slot.obj = failed.clone();
            slot.state = AssetState::Failed;
            self.shared.set(handle.slot, failed);
        }
    }

    // ---- async pipeline ----

    /// Drives the pipeline: dispatches finished reads to decode jobs
    /// and finalizes finished decodes. Call once per frame.
    pub fn update(&mut self) {
        let mut i = 0;
        while i < self.pending_reads.len() {
            if !self.pending_reads[i].task.is_finished() {
                i += 1;
                continue;
            }
            let read = self.pending_reads.swap_remove(i);
            match block_on(read.task) {
                Ok(bytes) => self.start_decode(read.handle, bytes),
                Err(err) => self.fail_read(read.handle, err),
            }
        }

        let mut j = 0;
        while j < self.pending_jobs.len() {
            let id = self.pending_jobs[j];
            let finished = self
                .jobs
                .try_get(id)
                .map(|job| job.task.is_finished())
                .unwrap_or(true);
            if !finished {
                j += 1;
                continue;
            }
            self.pending_jobs.swap_remove(j);
            if let Some(job) = self.jobs.remove(id) {
                let outcome = block_on(job.task);
                self.finish_decode(job.handle, outcome);
            }
        }
    }

    /// Extracts metadata, prepares the object and hands decoding to a
    /// worker. No-op if the asset was unloaded while the read ran.
    fn start_decode(&mut self, handle: UntypedHandle, bytes: Vec<u8>) {
        if self.assets.try_get(handle.slot).is_none() {
            return;
        }
        let (type_index, resource_index, req) = self.request_for(handle);
        let handler = self.registry.get(type_index).handler.clone();

        if self.resources.get(resource_index).metadata.is_none() {
            let meta = handler.read_metadata(&req, &bytes);
            self.resources.get_mut(resource_index).metadata = Some(meta);
        }
        let prepared = {
            let meta = self
                .resources
                .get(resource_index)
                .metadata
                .as_ref()
                .expect("metadata was just extracted");
            handler.prepare(&req, meta.as_ref())
        };
        let Some(mut obj) = prepared else {
            warn_load(&req, "preparing");
            self.fail_or_rollback(handle, &handler);
            return;
        };

        let task = self.pool.spawn(async move {
            let ok = handler.load(&mut obj, &req, &bytes);
            DecodeOutcome { ok, obj, bytes, req }
        });
        let job = self.jobs.insert(DecodeJob { handle, task });
        self.pending_jobs.push(job);
    }

    fn finish_decode(&mut self, handle: UntypedHandle, outcome: DecodeOutcome) {
        let DecodeOutcome {
            ok,
            mut obj,
            bytes,
            req,
        } = outcome;
        // The asset may have been unloaded while the job ran; the
        // worker result is simply discarded then.
        let Some(slot) = self.assets.try_get(handle.slot) else {
            return;
        };
        let handler = self.registry.get(slot.type_index).handler.clone();
        if ok {
            handler.finalize(&mut obj, &req, &bytes);
            self.install_ok(handle, Arc::from(obj));
            tracing::debug!(path = %req.path, "asset loaded");
        } else {
            warn_load(&req, "loading");
            handler.release(Arc::from(obj));
            self.fail_or_rollback(handle, &handler);
        }
    }

    fn fail_read(&mut self, handle: UntypedHandle, err: AssetError) {
        let Some(slot) = self.assets.try_get(handle.slot) else {
            return;
        };
        let handler = self.registry.get(slot.type_index).handler.clone();
        let path = self.resources.get(slot.resource).path.clone();
        tracing::warn!(path = %path, error = %err, "failed opening asset");
        self.fail_or_rollback(handle, &handler);
    }

    // ---- unloading ----

    /// Drops one reference. At zero the slot is freed, in-flight work
    /// for it is cancelled and the object is released.
    pub fn unload(&mut self, handle: impl Into<UntypedHandle>) {
        let handle = handle.into();
        let slot = self
            .assets
            .try_get_mut(handle.slot)
            .expect("invalid asset handle");
        debug_assert!(slot.ref_count > 0);
        slot.ref_count -= 1;
        if slot.ref_count > 0 {
            return;
        }

        self.pending_reads.retain(|read| read.handle != handle);
        if let Some(pos) = self
            .pending_jobs
            .iter()
            .position(|&id| self.jobs.get(id).handle == handle)
        {
            let id = self.pending_jobs.swap_remove(pos);
            self.jobs.remove(id);
        }

        let slot = self
            .assets
            .remove(handle.slot)
            .expect("invalid asset handle");
        let handler = &self.registry.get(slot.type_index).handler;
        if !handler.is_sentinel(&slot.obj) {
            handler.release(slot.obj);
        }
        if let Some(dead) = slot.dead_obj
            && !handler.is_sentinel(&dead)
        {
            handler.release(dead);
        }
        self.by_key.remove(&slot.key);
        self.shared.clear(handle.slot);
    }

    // ---- accessors ----

    pub fn state(&self, handle: impl Into<UntypedHandle>) -> AssetState {
        self.slot(handle.into()).state
    }

    pub fn path(&self, handle: impl Into<UntypedHandle>) -> &str {
        &self.resources.get(self.slot(handle.into()).resource).path
    }

    pub fn type_name(&self, handle: impl Into<UntypedHandle>) -> &'static str {
        self.registry
            .get(self.slot(handle.into()).type_index)
            .handler
            .name()
    }

    pub fn tags(&self, handle: impl Into<UntypedHandle>) -> u32 {
        self.slot(handle.into()).tags
    }

    pub fn ref_count(&self, handle: impl Into<UntypedHandle>) -> u32 {
        self.slot(handle.into()).ref_count
    }

    /// Adds a reference without loading. Returns the new count.
    pub fn ref_add(&mut self, handle: impl Into<UntypedHandle>) -> u32 {
        let slot = self
            .assets
            .try_get_mut(handle.into().slot)
            .expect("invalid asset handle");
        slot.ref_count += 1;
        slot.ref_count
    }

    pub fn is_alive(&self, handle: impl Into<UntypedHandle>) -> bool {
        self.assets.contains(handle.into().slot)
    }

    /// The current object for a handle. While loading this is the
    /// placeholder, after a failure the failure sentinel; it is never
    /// dangling for a live handle.
    pub fn obj<A: AssetType>(&self, handle: &Handle<A>) -> Arc<A::Obj> {
        self.slot(handle.raw)
            .obj
            .clone()
            .downcast()
            .expect("asset object type mismatch")
    }

    pub fn obj_untyped(&self, handle: impl Into<UntypedHandle>) -> ObjRef {
        self.slot(handle.into()).obj.clone()
    }

    pub fn params<A: AssetType>(&self, handle: &Handle<A>) -> &A::Params {
        self.slot(handle.raw)
            .params
            .downcast_ref()
            .expect("asset params type mismatch")
    }

    fn slot(&self, handle: UntypedHandle) -> &AssetSlot {
        self.assets
            .try_get(handle.slot)
            .expect("invalid asset handle")
    }

    // ---- groups ----

    /// Opens a group; loads issued until [`group_end`] are recorded in
    /// it. Pass an existing handle to resume that group. Panics if a
    /// group is already open.
    ///
    /// [`group_end`]: AssetServer::group_end
    pub fn group_begin(&mut self, group: Option<GroupHandle>) -> GroupHandle {
        assert!(self.current_group.is_none(), "asset group already open");
        let group = group.unwrap_or_else(|| {
            GroupHandle(self.groups.insert(GroupSlot { assets: Vec::new() }))
        });
        assert!(self.groups.contains(group.0), "invalid group handle");
        self.current_group = Some(group);
        group
    }

    pub fn group_end(&mut self, group: GroupHandle) {
        assert_eq!(
            self.current_group,
            Some(group),
            "ending a group that is not open"
        );
        self.current_group = None;
    }

    fn push_to_group(&mut self, handle: UntypedHandle) {
        if let Some(group) = self.current_group {
            let slot = self.groups.get_mut(group.0);
            if !slot.assets.contains(&handle) {
                slot.assets.push(handle);
            }
        }
    }

    /// True once no member of the group is still loading.
    pub fn group_loaded(&self, group: GroupHandle) -> bool {
        let Some(slot) = self.groups.try_get(group.0) else {
            return true;
        };
        slot.assets.iter().all(|handle| {
            self.assets
                .try_get(handle.slot)
                .map(|a| a.state != AssetState::Loading)
                .unwrap_or(true)
        })
    }

    /// Drives [`update`] until the whole group settled.
    ///
    /// [`update`]: AssetServer::update
    pub fn group_wait(&mut self, group: GroupHandle) {
        while !self.group_loaded(group) {
            self.update();
            std::thread::yield_now();
        }
    }

    /// Unloads every member and empties the group. The group handle
    /// stays valid for reuse.
    pub fn group_unload(&mut self, group: GroupHandle) {
        let Some(slot) = self.groups.try_get_mut(group.0) else {
            return;
        };
        let assets = std::mem::take(&mut slot.assets);
        for handle in assets {
            if self.assets.contains(handle.slot) {
                self.unload(handle);
            }
        }
    }

    /// Deletes the group record without touching its members.
    pub fn group_delete(&mut self, group: GroupHandle) {
        self.groups.remove(group.0);
    }

    pub fn group_gather(&self, group: GroupHandle) -> Vec<UntypedHandle> {
        self.groups
            .try_get(group.0)
            .map(|slot| slot.assets.clone())
            .unwrap_or_default()
    }

    // ---- bulk operations ----

    pub fn gather_by_type(&self, name: &str) -> Vec<UntypedHandle> {
        let Some(type_index) = self.registry.index_of_name(name) else {
            return Vec::new();
        };
        self.gather_matching(|slot| slot.type_index == type_index)
    }

    pub fn gather_by_tags(&self, tags: u32) -> Vec<UntypedHandle> {
        self.gather_matching(|slot| slot.tags & tags != 0)
    }

    fn gather_matching(&self, pred: impl Fn(&AssetSlot) -> bool) -> Vec<UntypedHandle> {
        self.assets
            .iter_with_ids()
            .filter(|&(_, slot)| pred(slot))
            .map(|(id, slot)| UntypedHandle::new(id, self.registry.get(slot.type_index).type_id))
            .collect()
    }

    /// Releases the objects of all matching assets and parks the slots
    /// as zombies. Handles and reference counts stay intact; a later
    /// reload can revive them.
    pub fn unload_by_type(&mut self, name: &str) {
        for handle in self.gather_by_type(name) {
            self.park_asset(handle);
        }
    }

    pub fn unload_by_tags(&mut self, tags: u32) {
        for handle in self.gather_by_tags(tags) {
            self.park_asset(handle);
        }
    }

    fn park_asset(&mut self, handle: UntypedHandle) {
        let slot = self.assets.get_mut(handle.slot);
        if slot.state != AssetState::Ok {
            return;
        }
        let handler = self.registry.get(slot.type_index).handler.clone();
        let obj = std::mem::replace(&mut slot.obj, handler.placeholder_obj());
        slot.state = AssetState::Zombie;
        self.shared.set(handle.slot, handler.placeholder_obj());
        if !handler.is_sentinel(&obj) {
            handler.release(obj);
        }
    }

    /// Synchronously reloads all assets of a type from their sources.
    pub fn reload_by_type(&mut self, name: &str) {
        let handles = self.gather_by_type(name);
        self.reload_all(handles);
    }

    pub fn reload_by_tags(&mut self, tags: u32) {
        let handles = self.gather_by_tags(tags);
        self.reload_all(handles);
    }

    fn reload_all(&mut self, handles: Vec<UntypedHandle>) {
        for handle in handles {
            self.reload_one(handle);
        }
    }

    fn reload_one(&mut self, handle: UntypedHandle) {
        let Some(slot) = self.assets.try_get(handle.slot) else {
            return;
        };
        let handler = &self.registry.get(slot.type_index).handler;
        let type_index = slot.type_index;
        let path = self.resources.get(slot.resource).path.clone();
        let params = handler.clone_params(slot.params.as_ref());
        let options = LoadOptions {
            flags: slot.load_flags | LoadFlags::RELOAD,
            tags: slot.tags,
            alloc: slot.alloc,
        };
        if let Err(err) = self.load_core(type_index, &path, params, options, None) {
            tracing::warn!(path = %path, error = %err, "reload failed");
        }
    }

    // ---- metadata cache ----

    /// Seeds the resource table from a cache file. Returns `Ok(false)`
    /// if the file does not exist.
    pub fn load_meta_cache(&mut self, path: impl AsRef<Path>) -> AssetResult<bool> {
        meta_cache::load(
            &mut self.resources,
            &self.registry,
            self.vfs.as_ref(),
            path.as_ref(),
        )
    }

    /// Writes all known resources to a cache file.
    pub fn save_meta_cache(&self, path: impl AsRef<Path>) -> AssetResult<()> {
        meta_cache::save(&self.resources, &self.registry, self.vfs.as_ref(), path.as_ref())
    }

    /// Writes the resources no load has touched, for audit tooling.
    pub fn save_unused_report(&self, path: impl AsRef<Path>) -> AssetResult<()> {
        meta_cache::save_unused(&self.resources, &self.registry, self.vfs.as_ref(), path.as_ref())
    }

    // ---- hot reload ----

    /// Starts watching a directory for file changes.
    #[cfg(feature = "hot-reload")]
    pub fn watch(&mut self, dir: impl AsRef<Path>) -> AssetResult<()> {
        self.watcher = Some(AssetWatcher::new(dir.as_ref())?);
        Ok(())
    }

    /// Reloads every asset whose source file changed since the last
    /// call. Returns the number of assets reloaded.
    #[cfg(feature = "hot-reload")]
    pub fn process_hot_reload(&mut self) -> usize {
        let Some(watcher) = &self.watcher else {
            return 0;
        };
        let changed = watcher.poll_changes();
        let mut reloaded = 0;
        for changed_path in changed {
            let unix = changed_path.to_string_lossy().replace('\\', "/");
            let Some(resource_index) = self
                .resources
                .iter()
                .find(|&(_, r)| changed_path_matches(&unix, &r.real_path))
                .map(|(i, _)| i)
            else {
                continue;
            };
            let handles: Vec<UntypedHandle> =
                self.gather_matching(|slot| slot.resource == resource_index);
            if handles.is_empty() {
                continue;
            }
            let real_path = self.resources.get(resource_index).real_path.clone();
            tracing::info!(path = %real_path, count = handles.len(), "hot reloading");
            reloaded += handles.len();
            self.reload_all(handles);
        }
        reloaded
    }
}

impl Drop for AssetServer {
    fn drop(&mut self) {
        // Cancel in-flight work first so workers stop touching state.
        self.pending_reads.clear();
        for id in self.pending_jobs.drain(..).collect::<Vec<_>>() {
            self.jobs.remove(id);
        }
        for (_, slot) in self.assets.iter_with_ids() {
            if slot.state == AssetState::Ok {
                let path = &self.resources.get(slot.resource).path;
                tracing::warn!(path = %path, refs = slot.ref_count, "un-released asset");
            }
            let registered = self.registry.get(slot.type_index);
            if !registered.unregistered && !registered.handler.is_sentinel(&slot.obj) {
                registered.handler.release(slot.obj.clone());
            }
        }
    }
}

/// True when a changed file (absolute, `/`-separated) refers to the
/// resource path. The match must sit on a path-component boundary so
/// `dir/some-a.doc` does not hit the resource `a.doc`.
#[cfg_attr(not(feature = "hot-reload"), allow(dead_code))]
fn changed_path_matches(changed: &str, real_path: &str) -> bool {
    changed == real_path
        || changed
            .strip_suffix(real_path)
            .is_some_and(|prefix| prefix.ends_with('/'))
}

fn warn_load(req: &LoadRequest, stage: &str) {
    if req.path == req.real_path {
        tracing::warn!(path = %req.path, stage, "asset load failed");
    } else {
        tracing::warn!(path = %req.path, real_path = %req.real_path, stage, "asset load failed");
    }
}

#[cfg(test)]
mod tests {
    use super::changed_path_matches;

    #[test]
    fn changed_paths_match_on_component_boundaries() {
        assert!(changed_path_matches("a.doc", "a.doc"));
        assert!(changed_path_matches("/project/assets/a.doc", "a.doc"));
        assert!(changed_path_matches(
            "/project/assets/textures/a.doc",
            "textures/a.doc"
        ));
        assert!(!changed_path_matches("/project/assets/some-a.doc", "a.doc"));
        assert!(!changed_path_matches("/project/assetsa.doc", "a.doc"));
        assert!(!changed_path_matches("/project/a.doc", "textures/a.doc"));
    }
}
