//! Asset management for ember.
//!
//! Asset types are registered once with an [`AssetServer`], which then
//! loads, caches and ref-counts assets addressed by path, parameters
//! and an allocator tag. Loads are asynchronous by default: the caller
//! immediately gets a stable [`Handle`] pointing at a placeholder
//! object, and the real object is installed by [`AssetServer::update`]
//! once worker threads finish reading and decoding. Failed loads leave
//! the handle valid and pointing at a failure sentinel.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use ember_assets::*;
//! # use ember_core::TaskPool;
//! # struct Text;
//! # impl AssetType for Text {
//! #     type Obj = String;
//! #     type Params = ();
//! #     type Metadata = ();
//! #     fn name(&self) -> &'static str { "text" }
//! #     fn failed_obj(&self) -> String { String::new() }
//! #     fn placeholder_obj(&self) -> String { String::new() }
//! #     fn read_metadata(&self, _: &LoadContext<'_, ()>, _: &[u8]) {}
//! #     fn prepare(&self, _: &LoadContext<'_, ()>, _: &()) -> Option<String> { Some(String::new()) }
//! #     fn load(&self, obj: &mut String, _: &LoadContext<'_, ()>, bytes: &[u8]) -> bool {
//! #         *obj = String::from_utf8_lossy(bytes).into_owned();
//! #         true
//! #     }
//! # }
//! let pool = Arc::new(TaskPool::default_threads());
//! let vfs = Arc::new(DiskVfs::new("assets"));
//! let mut server = AssetServer::new(vfs, pool);
//! server.register_type(Text);
//!
//! let handle = server.load::<Text>("hello.txt", (), LoadOptions::default()).unwrap();
//! while server.state(handle) == AssetState::Loading {
//!     server.update();
//! }
//! println!("{}", server.obj(&handle));
//! ```

pub mod error;
pub mod handle;
pub mod hash;
pub mod registry;
pub mod server;
pub mod state;
pub mod vfs;

mod meta_cache;
mod resource;

#[cfg(feature = "hot-reload")]
mod hot_reload;

pub use error::{AssetError, AssetResult};
pub use handle::{GroupHandle, Handle, UntypedHandle};
pub use registry::{AssetType, LoadContext, ObjRef};
pub use server::{AssetServer, SharedObjects};
pub use state::{AllocId, AssetState, LoadFlags, LoadOptions};
pub use vfs::{DiskVfs, MemoryVfs, Vfs};
