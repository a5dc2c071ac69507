//! Registers a simple text asset type and loads a file both
//! asynchronously and blocking.

use std::sync::Arc;

use ember_assets::{
    AssetServer, AssetState, AssetType, LoadContext, LoadOptions, MemoryVfs,
};
use ember_core::TaskPool;

struct TextAsset;

impl AssetType for TextAsset {
    type Obj = String;
    type Params = ();
    type Metadata = ();

    fn name(&self) -> &'static str {
        "text"
    }

    fn failed_obj(&self) -> String {
        "<failed>".to_owned()
    }

    fn placeholder_obj(&self) -> String {
        "<loading>".to_owned()
    }

    fn read_metadata(&self, _ctx: &LoadContext<'_, ()>, _bytes: &[u8]) {}

    fn prepare(&self, _ctx: &LoadContext<'_, ()>, _meta: &()) -> Option<String> {
        Some(String::new())
    }

    fn load(&self, obj: &mut String, _ctx: &LoadContext<'_, ()>, bytes: &[u8]) -> bool {
        match std::str::from_utf8(bytes) {
            Ok(text) => {
                obj.push_str(text);
                true
            }
            Err(_) => false,
        }
    }
}

fn main() {
    ember_core::logging::init();

    let vfs = Arc::new(MemoryVfs::new());
    vfs.insert("greeting.txt", b"hello from the asset server".to_vec());

    let pool = Arc::new(TaskPool::default_threads());
    let mut server = AssetServer::new(vfs, pool);
    server.register_type(TextAsset);

    // Async load: the handle is usable right away, pointing at the
    // placeholder until update() installs the real object.
    let handle = server
        .load::<TextAsset>("greeting.txt", (), LoadOptions::default())
        .unwrap();
    println!("placeholder: {}", server.obj(&handle));

    while server.state(handle) == AssetState::Loading {
        server.update();
        std::thread::yield_now();
    }
    println!("loaded:      {}", server.obj(&handle));

    // Blocking load of the same path returns the same asset.
    let again = server
        .load::<TextAsset>("greeting.txt", (), LoadOptions::default().blocking())
        .unwrap();
    assert_eq!(handle, again);
    println!("refs:        {}", server.ref_count(handle));

    server.unload(again);
    server.unload(handle);
}
