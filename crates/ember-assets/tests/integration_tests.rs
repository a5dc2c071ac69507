use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use ember_assets::{
    AssetServer, AssetState, AssetType, LoadContext, LoadOptions, MemoryVfs, UntypedHandle, Vfs,
};
use ember_core::TaskPool;
use serde::{Deserialize, Serialize};

/// Callback counters shared between a handler and the test body.
#[derive(Default)]
struct Counters {
    metadata: AtomicUsize,
    prepare: AtomicUsize,
    load: AtomicUsize,
    release: AtomicUsize,
    reload_with_prev: AtomicUsize,
    reload_without_prev: AtomicUsize,
}

#[derive(Serialize, Deserialize, Default)]
struct DocMeta {
    len: usize,
}

/// Test asset: utf-8 text repeated `params` times.
struct DocAsset {
    counters: Arc<Counters>,
}

impl DocAsset {
    fn new() -> (Self, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        (
            Self {
                counters: counters.clone(),
            },
            counters,
        )
    }
}

impl AssetType for DocAsset {
    type Obj = String;
    type Params = u32;
    type Metadata = DocMeta;

    fn name(&self) -> &'static str {
        "doc"
    }

    fn failed_obj(&self) -> String {
        "<failed>".to_owned()
    }

    fn placeholder_obj(&self) -> String {
        "<loading>".to_owned()
    }

    fn read_metadata(&self, _ctx: &LoadContext<'_, u32>, bytes: &[u8]) -> DocMeta {
        self.counters.metadata.fetch_add(1, Ordering::SeqCst);
        DocMeta { len: bytes.len() }
    }

    fn prepare(&self, _ctx: &LoadContext<'_, u32>, meta: &DocMeta) -> Option<String> {
        self.counters.prepare.fetch_add(1, Ordering::SeqCst);
        Some(String::with_capacity(meta.len))
    }

    fn load(&self, obj: &mut String, ctx: &LoadContext<'_, u32>, bytes: &[u8]) -> bool {
        self.counters.load.fetch_add(1, Ordering::SeqCst);
        let Ok(text) = std::str::from_utf8(bytes) else {
            return false;
        };
        let repeat = (*ctx.params).max(1);
        for _ in 0..repeat {
            obj.push_str(text);
        }
        true
    }

    fn release(&self, _obj: Arc<String>) {
        self.counters.release.fetch_add(1, Ordering::SeqCst);
    }

    fn reload(&self, _handle: UntypedHandle, previous: Option<Arc<String>>) {
        if previous.is_some() {
            self.counters.reload_with_prev.fetch_add(1, Ordering::SeqCst);
        } else {
            self.counters.reload_without_prev.fetch_add(1, Ordering::SeqCst);
        }
    }
}

fn new_server(vfs: Arc<MemoryVfs>) -> (AssetServer, Arc<Counters>) {
    let pool = Arc::new(TaskPool::new(2));
    let mut server = AssetServer::new(vfs, pool);
    let (handler, counters) = DocAsset::new();
    server.register_type(handler);
    (server, counters)
}

fn settle<H: Into<UntypedHandle> + Copy>(server: &mut AssetServer, handle: H) {
    while server.state(handle) == AssetState::Loading {
        server.update();
        std::thread::yield_now();
    }
}

#[test]
fn async_load_goes_through_placeholder() {
    let vfs = Arc::new(MemoryVfs::new());
    vfs.insert("a.doc", b"hi".to_vec());
    let (mut server, _) = new_server(vfs);

    let handle = server
        .load::<DocAsset>("a.doc", 1, LoadOptions::default())
        .unwrap();
    assert_eq!(server.state(handle), AssetState::Loading);
    assert_eq!(*server.obj(&handle), "<loading>");

    settle(&mut server, handle);
    assert_eq!(server.state(handle), AssetState::Ok);
    assert_eq!(*server.obj(&handle), "hi");
    assert_eq!(server.path(handle), "a.doc");
    assert_eq!(server.type_name(handle), "doc");
}

#[test]
fn blocking_load_is_immediate() {
    let vfs = Arc::new(MemoryVfs::new());
    vfs.insert("a.doc", b"hi".to_vec());
    let (mut server, counters) = new_server(vfs);

    let handle = server
        .load::<DocAsset>("a.doc", 2, LoadOptions::default().blocking())
        .unwrap();
    assert_eq!(server.state(handle), AssetState::Ok);
    assert_eq!(*server.obj(&handle), "hihi");
    assert_eq!(*server.params(&handle), 2);
    assert_eq!(counters.load.load(Ordering::SeqCst), 1);
}

#[test]
fn same_key_is_deduplicated() {
    let vfs = Arc::new(MemoryVfs::new());
    vfs.insert("a.doc", b"hi".to_vec());
    let (mut server, counters) = new_server(vfs);

    let opts = LoadOptions::default().blocking();
    let first = server.load::<DocAsset>("a.doc", 1, opts).unwrap();
    let second = server.load::<DocAsset>("a.doc", 1, opts).unwrap();
    assert_eq!(first, second);
    assert_eq!(server.ref_count(first), 2);
    assert_eq!(counters.prepare.load(Ordering::SeqCst), 1);

    // Different params are a different asset over the same resource,
    // and the cached metadata is reused.
    let other = server.load::<DocAsset>("a.doc", 3, opts).unwrap();
    assert_ne!(first, other);
    assert_eq!(*server.obj(&other), "hihihi");
    assert_eq!(counters.metadata.load(Ordering::SeqCst), 1);

    server.unload(first);
    assert!(server.is_alive(first));
    assert_eq!(server.ref_count(first), 1);
    server.unload(second);
    assert!(!server.is_alive(first));
}

#[test]
fn async_dedup_while_in_flight() {
    let vfs = Arc::new(MemoryVfs::new());
    vfs.insert("a.doc", b"hi".to_vec());
    let (mut server, _) = new_server(vfs);

    let first = server
        .load::<DocAsset>("a.doc", 1, LoadOptions::default())
        .unwrap();
    let second = server
        .load::<DocAsset>("a.doc", 1, LoadOptions::default())
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(server.ref_count(first), 2);

    settle(&mut server, first);
    assert_eq!(server.state(first), AssetState::Ok);
}

#[test]
fn missing_file_blocking_yields_failed_handle() {
    let vfs = Arc::new(MemoryVfs::new());
    let (mut server, counters) = new_server(vfs);

    let handle = server
        .load::<DocAsset>("nope.doc", 1, LoadOptions::default().blocking())
        .unwrap();
    assert_eq!(server.state(handle), AssetState::Failed);
    assert_eq!(*server.obj(&handle), "<failed>");
    // The sentinel is shared; releasing the asset must not call release.
    server.unload(handle);
    assert_eq!(counters.release.load(Ordering::SeqCst), 0);
}

#[test]
fn missing_file_async_yields_failed_handle() {
    let vfs = Arc::new(MemoryVfs::new());
    let (mut server, _) = new_server(vfs);

    let handle = server
        .load::<DocAsset>("nope.doc", 1, LoadOptions::default())
        .unwrap();
    settle(&mut server, handle);
    assert_eq!(server.state(handle), AssetState::Failed);
    assert_eq!(*server.obj(&handle), "<failed>");
}

#[test]
fn empty_path_is_an_error() {
    let vfs = Arc::new(MemoryVfs::new());
    let (mut server, _) = new_server(vfs);
    assert!(
        server
            .load::<DocAsset>("", 1, LoadOptions::default())
            .is_err()
    );
}

#[test]
fn undecodable_bytes_fail_and_release_partial_object() {
    let vfs = Arc::new(MemoryVfs::new());
    vfs.insert("bad.doc", vec![0xff, 0xfe]);
    let (mut server, counters) = new_server(vfs);

    let handle = server
        .load::<DocAsset>("bad.doc", 1, LoadOptions::default())
        .unwrap();
    settle(&mut server, handle);
    assert_eq!(server.state(handle), AssetState::Failed);
    // The half-built object from the failed decode was released.
    assert_eq!(counters.release.load(Ordering::SeqCst), 1);
}

#[test]
fn reload_swaps_object_and_releases_previous() {
    let vfs = Arc::new(MemoryVfs::new());
    vfs.insert("a.doc", b"v1".to_vec());
    let (mut server, counters) = new_server(vfs.clone());

    let handle = server
        .load::<DocAsset>("a.doc", 1, LoadOptions::default().blocking())
        .unwrap();
    assert_eq!(*server.obj(&handle), "v1");

    vfs.insert("a.doc", b"v2".to_vec());
    let reloaded = server
        .load::<DocAsset>("a.doc", 1, LoadOptions::default().reload())
        .unwrap();
    assert_eq!(handle, reloaded);
    assert_eq!(server.state(handle), AssetState::Ok);
    assert_eq!(*server.obj(&handle), "v2");
    assert_eq!(counters.reload_with_prev.load(Ordering::SeqCst), 1);
    assert_eq!(counters.release.load(Ordering::SeqCst), 1);
    // No extra reference was taken by the reload.
    assert_eq!(server.ref_count(handle), 1);
}

#[test]
fn failed_reload_rolls_back_to_previous_object() {
    let vfs = Arc::new(MemoryVfs::new());
    vfs.insert("a.doc", b"v1".to_vec());
    let (mut server, counters) = new_server(vfs.clone());

    let handle = server
        .load::<DocAsset>("a.doc", 1, LoadOptions::default().blocking())
        .unwrap();

    // Corrupt the source so the reload decode fails.
    vfs.insert("a.doc", vec![0xff]);
    let reloaded = server
        .load::<DocAsset>("a.doc", 1, LoadOptions::default().reload())
        .unwrap();
    assert_eq!(handle, reloaded);
    assert_eq!(server.state(handle), AssetState::Ok);
    assert_eq!(*server.obj(&handle), "v1");
    assert_eq!(counters.reload_without_prev.load(Ordering::SeqCst), 1);
    // Only the half-built object was released, not the rolled-back one.
    assert_eq!(counters.release.load(Ordering::SeqCst), 1);
}

#[test]
fn unload_while_read_in_flight_discards_result() {
    let vfs = Arc::new(MemoryVfs::new());
    vfs.insert("a.doc", b"hi".to_vec());
    let (mut server, _) = new_server(vfs);

    let handle = server
        .load::<DocAsset>("a.doc", 1, LoadOptions::default())
        .unwrap();
    server.unload(handle);
    assert!(!server.is_alive(handle));

    // Worker completions for the dead asset must be ignored.
    for _ in 0..32 {
        server.update();
        std::thread::yield_now();
    }
    assert!(!server.is_alive(handle));

    // The slot can be reused by a fresh load.
    let again = server
        .load::<DocAsset>("a.doc", 1, LoadOptions::default().blocking())
        .unwrap();
    assert_eq!(server.state(again), AssetState::Ok);
}

#[test]
fn load_from_mem_skips_the_source() {
    let vfs = Arc::new(MemoryVfs::new());
    let (mut server, _) = new_server(vfs);

    let blocking = server
        .load_from_mem::<DocAsset>(
            "mem/a.doc",
            b"inline".to_vec(),
            1,
            LoadOptions::default().blocking(),
        )
        .unwrap();
    assert_eq!(*server.obj(&blocking), "inline");

    let async_handle = server
        .load_from_mem::<DocAsset>("mem/b.doc", b"later".to_vec(), 1, LoadOptions::default())
        .unwrap();
    settle(&mut server, async_handle);
    assert_eq!(*server.obj(&async_handle), "later");
}

#[test]
fn groups_track_and_settle_their_loads() {
    let vfs = Arc::new(MemoryVfs::new());
    vfs.insert("a.doc", b"a".to_vec());
    vfs.insert("b.doc", b"b".to_vec());
    let (mut server, _) = new_server(vfs);

    let group = server.group_begin(None);
    let a = server
        .load::<DocAsset>("a.doc", 1, LoadOptions::default())
        .unwrap();
    let b = server
        .load::<DocAsset>("b.doc", 1, LoadOptions::default())
        .unwrap();
    server.group_end(group);

    server.group_wait(group);
    assert!(server.group_loaded(group));
    assert_eq!(server.state(a), AssetState::Ok);
    assert_eq!(server.state(b), AssetState::Ok);
    assert_eq!(server.group_gather(group).len(), 2);

    server.group_unload(group);
    assert!(!server.is_alive(a));
    assert!(!server.is_alive(b));
    server.group_delete(group);
    assert!(server.group_gather(group).is_empty());
}

#[test]
fn bulk_ops_by_type_and_tags() {
    let vfs = Arc::new(MemoryVfs::new());
    vfs.insert("a.doc", b"a".to_vec());
    vfs.insert("b.doc", b"b".to_vec());
    let (mut server, _) = new_server(vfs);

    let opts = LoadOptions::default().blocking();
    let a = server
        .load::<DocAsset>("a.doc", 1, opts.with_tags(0b01))
        .unwrap();
    let b = server
        .load::<DocAsset>("b.doc", 1, opts.with_tags(0b10))
        .unwrap();

    assert_eq!(server.gather_by_type("doc").len(), 2);
    assert_eq!(server.gather_by_type("unknown").len(), 0);
    assert_eq!(server.gather_by_tags(0b01).len(), 1);
    assert_eq!(server.tags(a), 0b01);

    // Parking keeps handles and refs but drops the objects.
    server.unload_by_type("doc");
    assert_eq!(server.state(a), AssetState::Zombie);
    assert_eq!(server.state(b), AssetState::Zombie);
    assert!(server.is_alive(a));

    server.reload_by_type("doc");
    assert_eq!(server.state(a), AssetState::Ok);
    assert_eq!(*server.obj(&a), "a");
    assert_eq!(server.state(b), AssetState::Ok);

    server.unload_by_tags(0b10);
    assert_eq!(server.state(a), AssetState::Ok);
    assert_eq!(server.state(b), AssetState::Zombie);
    server.reload_by_tags(0b10);
    assert_eq!(*server.obj(&b), "b");
}

#[test]
fn meta_cache_roundtrip_skips_metadata_extraction() {
    let vfs = Arc::new(MemoryVfs::new());
    vfs.insert("a.doc", b"cached".to_vec());

    {
        let (mut server, counters) = new_server(vfs.clone());
        let handle = server
            .load::<DocAsset>("a.doc", 1, LoadOptions::default().blocking())
            .unwrap();
        assert_eq!(counters.metadata.load(Ordering::SeqCst), 1);
        server.save_meta_cache("cache.json").unwrap();
        server.unload(handle);
    }

    let (mut server, counters) = new_server(vfs);
    assert!(server.load_meta_cache("cache.json").unwrap());
    let handle = server
        .load::<DocAsset>("a.doc", 1, LoadOptions::default().blocking())
        .unwrap();
    assert_eq!(server.state(handle), AssetState::Ok);
    assert_eq!(*server.obj(&handle), "cached");
    // Metadata came from the cache file.
    assert_eq!(counters.metadata.load(Ordering::SeqCst), 0);
}

#[test]
fn meta_cache_drops_stale_entries() {
    let vfs = Arc::new(MemoryVfs::new());
    vfs.insert("a.doc", b"old".to_vec());

    {
        let (mut server, _) = new_server(vfs.clone());
        let handle = server
            .load::<DocAsset>("a.doc", 1, LoadOptions::default().blocking())
            .unwrap();
        server.save_meta_cache("cache.json").unwrap();
        server.unload(handle);
    }

    // Touch the file after the cache was written.
    vfs.insert("a.doc", b"new".to_vec());

    let (mut server, counters) = new_server(vfs);
    assert!(server.load_meta_cache("cache.json").unwrap());
    let handle = server
        .load::<DocAsset>("a.doc", 1, LoadOptions::default().blocking())
        .unwrap();
    assert_eq!(*server.obj(&handle), "new");
    // The stale cache entry was ignored, so metadata was re-extracted.
    assert_eq!(counters.metadata.load(Ordering::SeqCst), 1);
}

#[test]
fn cache_entries_use_the_documented_field_names() {
    let vfs = Arc::new(MemoryVfs::new());
    vfs.insert("a.doc", b"x".to_vec());
    let (mut server, _) = new_server(vfs.clone());

    server
        .load::<DocAsset>("a.doc", 1, LoadOptions::default().blocking())
        .unwrap();
    server.save_meta_cache("cache.json").unwrap();

    let raw = vfs.read(std::path::Path::new("cache.json")).unwrap();
    let entries: serde_json::Value = serde_json::from_slice(&raw).unwrap();
    let entry = &entries.as_array().unwrap()[0];
    assert_eq!(entry.get("name").and_then(|v| v.as_str()), Some("a.doc"));
    assert_eq!(entry.get("type_name").and_then(|v| v.as_str()), Some("doc"));
    assert!(entry.get("last_modified").and_then(|v| v.as_u64()).is_some());
    assert_eq!(
        entry.pointer("/metadata/len").and_then(|v| v.as_u64()),
        Some(1)
    );
    // "path" only appears when the real path differs from the name.
    assert!(entry.get("path").is_none());
}

#[test]
fn meta_cache_missing_file_is_not_an_error() {
    let vfs = Arc::new(MemoryVfs::new());
    let (mut server, _) = new_server(vfs);
    assert!(!server.load_meta_cache("cache.json").unwrap());
}

#[test]
fn unused_report_lists_never_loaded_resources() {
    let vfs = Arc::new(MemoryVfs::new());
    vfs.insert("used.doc", b"u".to_vec());
    vfs.insert("unused.doc", b"x".to_vec());

    {
        let (mut server, _) = new_server(vfs.clone());
        let a = server
            .load::<DocAsset>("used.doc", 1, LoadOptions::default().blocking())
            .unwrap();
        let b = server
            .load::<DocAsset>("unused.doc", 1, LoadOptions::default().blocking())
            .unwrap();
        server.save_meta_cache("cache.json").unwrap();
        server.unload(a);
        server.unload(b);
    }

    let (mut server, _) = new_server(vfs.clone());
    assert!(server.load_meta_cache("cache.json").unwrap());
    server
        .load::<DocAsset>("used.doc", 1, LoadOptions::default().blocking())
        .unwrap();
    server.save_unused_report("unused.json").unwrap();

    let report = vfs.read(std::path::Path::new("unused.json")).unwrap();
    let entries: serde_json::Value = serde_json::from_slice(&report).unwrap();
    let names: Vec<&str> = entries
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|e| e.get("name").and_then(|n| n.as_str()))
        .collect();
    assert_eq!(names, vec!["unused.doc"]);
}

#[test]
fn shared_objects_resolve_from_other_threads() {
    let vfs = Arc::new(MemoryVfs::new());
    vfs.insert("a.doc", b"shared".to_vec());
    let (mut server, _) = new_server(vfs);

    let handle = server
        .load::<DocAsset>("a.doc", 1, LoadOptions::default().blocking())
        .unwrap();
    let shared = server.shared_objects();

    let worker = std::thread::spawn(move || {
        shared
            .get_typed(&handle)
            .map(|obj| (*obj).clone())
    });
    assert_eq!(worker.join().unwrap().as_deref(), Some("shared"));

    let shared = server.shared_objects();
    server.unload(handle);
    assert!(shared.get(handle.untyped()).is_none());
}

#[test]
fn teardown_releases_resident_objects() {
    let vfs = Arc::new(MemoryVfs::new());
    vfs.insert("a.doc", b"x".to_vec());
    let (mut server, counters) = new_server(vfs);

    server
        .load::<DocAsset>("a.doc", 1, LoadOptions::default().blocking())
        .unwrap();
    drop(server);
    assert_eq!(counters.release.load(Ordering::SeqCst), 1);
}

#[test]
fn unregistered_type_skips_release_at_teardown() {
    let vfs = Arc::new(MemoryVfs::new());
    vfs.insert("a.doc", b"x".to_vec());
    let (mut server, counters) = new_server(vfs);

    server
        .load::<DocAsset>("a.doc", 1, LoadOptions::default().blocking())
        .unwrap();
    server.unregister_type("doc");
    drop(server);
    assert_eq!(counters.release.load(Ordering::SeqCst), 0);
}

#[test]
fn ref_add_takes_an_extra_reference() {
    let vfs = Arc::new(MemoryVfs::new());
    vfs.insert("a.doc", b"x".to_vec());
    let (mut server, _) = new_server(vfs);

    let handle = server
        .load::<DocAsset>("a.doc", 1, LoadOptions::default().blocking())
        .unwrap();
    assert_eq!(server.ref_add(handle), 2);
    assert_eq!(server.ref_count(handle), 2);

    server.unload(handle);
    assert!(server.is_alive(handle));
    server.unload(handle);
    assert!(!server.is_alive(handle));
}

#[test]
fn group_can_be_resumed() {
    let vfs = Arc::new(MemoryVfs::new());
    vfs.insert("a.doc", b"a".to_vec());
    vfs.insert("b.doc", b"b".to_vec());
    let (mut server, _) = new_server(vfs);

    let group = server.group_begin(None);
    server
        .load::<DocAsset>("a.doc", 1, LoadOptions::default().blocking())
        .unwrap();
    server.group_end(group);

    // Reopening the same group keeps collecting into it.
    let resumed = server.group_begin(Some(group));
    assert_eq!(resumed, group);
    server
        .load::<DocAsset>("b.doc", 1, LoadOptions::default().blocking())
        .unwrap();
    server.group_end(group);

    assert_eq!(server.group_gather(group).len(), 2);
}

#[test]
fn handles_are_typed() {
    let vfs = Arc::new(MemoryVfs::new());
    vfs.insert("a.doc", b"x".to_vec());
    let (mut server, _) = new_server(vfs);

    let handle = server
        .load::<DocAsset>("a.doc", 1, LoadOptions::default().blocking())
        .unwrap();
    let untyped = handle.untyped();
    assert_eq!(untyped.typed::<DocAsset>(), Some(handle));
}
