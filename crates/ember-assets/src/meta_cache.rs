//! Metadata cache persistence.
//!
//! The cache is a JSON array of resource entries. Loading it seeds the
//! resource table so later loads can skip the metadata-extraction step;
//! entries whose source file changed since the cache was written are
//! dropped as stale.
//!
//! Entry shape:
//! `{ "name": path, "path": real_path?, "last_modified": stamp,
//!    "type_name": name, "metadata": {...}? }`

use std::path::Path;

use serde_json::{Map, Value, json};

use crate::error::{AssetError, AssetResult};
use crate::resource::{Resource, ResourceTable};
use crate::registry::TypeRegistry;
use crate::vfs::Vfs;

/// Writes every resource in the table to `cache_path`.
pub(crate) fn save(
    resources: &ResourceTable,
    registry: &TypeRegistry,
    vfs: &dyn Vfs,
    cache_path: &Path,
) -> AssetResult<()> {
    let mut entries = Vec::new();
    for (_, resource) in resources.iter() {
        entries.push(entry_json(resource, registry, vfs));
    }
    let bytes = serde_json::to_vec_pretty(&Value::Array(entries)).map_err(|e| {
        AssetError::CacheFormat {
            path: cache_path.to_path_buf(),
            message: e.to_string(),
        }
    })?;
    vfs.write(cache_path, &bytes)?;
    tracing::info!(path = %cache_path.display(), count = resources.len(), "saved asset cache");
    Ok(())
}

/// Writes only resources no load has touched. Useful for spotting
/// assets that ship but are never referenced.
pub(crate) fn save_unused(
    resources: &ResourceTable,
    registry: &TypeRegistry,
    vfs: &dyn Vfs,
    cache_path: &Path,
) -> AssetResult<()> {
    let mut entries = Vec::new();
    for (_, resource) in resources.iter() {
        if !resource.used {
            entries.push(entry_json(resource, registry, vfs));
        }
    }
    let count = entries.len();
    let bytes = serde_json::to_vec_pretty(&Value::Array(entries)).map_err(|e| {
        AssetError::CacheFormat {
            path: cache_path.to_path_buf(),
            message: e.to_string(),
        }
    })?;
    vfs.write(cache_path, &bytes)?;
    tracing::info!(path = %cache_path.display(), count, "dumped unused assets");
    Ok(())
}

fn entry_json(resource: &Resource, registry: &TypeRegistry, vfs: &dyn Vfs) -> Value {
    let registered = registry.get(resource.type_index);
    let mut entry = Map::new();
    entry.insert("name".into(), json!(resource.path));
    if resource.real_path != resource.path {
        entry.insert("path".into(), json!(resource.real_path));
    }
    // Stamp with the file's current mtime so a cache written after an
    // edit is not immediately stale.
    let stamp = vfs.last_modified(Path::new(&resource.real_path));
    entry.insert("last_modified".into(), json!(stamp));
    entry.insert("type_name".into(), json!(registered.handler.name()));
    if registered.handler.has_metadata()
        && let Some(meta) = &resource.metadata
    {
        entry.insert(
            "metadata".into(),
            registered.handler.metadata_to_json(meta.as_ref()),
        );
    }
    Value::Object(entry)
}

/// Loads a cache file written by [`save`] into the resource table.
///
/// Returns `Ok(false)` when the file does not exist. Entries for
/// unknown types, missing files or stale stamps are skipped; skipping
/// is not an error.
pub(crate) fn load(
    resources: &mut ResourceTable,
    registry: &TypeRegistry,
    vfs: &dyn Vfs,
    cache_path: &Path,
) -> AssetResult<bool> {
    let bytes = match vfs.read(cache_path) {
        Ok(bytes) => bytes,
        Err(AssetError::NotFound { .. }) => return Ok(false),
        Err(e) => return Err(e),
    };
    let root: Value =
        serde_json::from_slice(&bytes).map_err(|e| AssetError::CacheFormat {
            path: cache_path.to_path_buf(),
            message: e.to_string(),
        })?;
    let Value::Array(entries) = root else {
        return Err(AssetError::CacheFormat {
            path: cache_path.to_path_buf(),
            message: "expected a top-level array".into(),
        });
    };

    let mut loaded = 0usize;
    for entry in &entries {
        let Some(name) = entry.get("name").and_then(Value::as_str) else {
            continue;
        };
        if name.is_empty() {
            continue;
        }
        let real_path = entry
            .get("path")
            .and_then(Value::as_str)
            .unwrap_or(name)
            .to_owned();

        let current = vfs.last_modified(Path::new(&real_path));
        if current == 0 {
            tracing::debug!(path = name, "cache entry skipped, file missing");
            continue;
        }
        let stamp = entry
            .get("last_modified")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        if stamp != current {
            tracing::debug!(path = name, "cache entry skipped, file changed");
            continue;
        }

        let Some(type_index) = entry
            .get("type_name")
            .and_then(Value::as_str)
            .and_then(|n| registry.index_of_name(n))
        else {
            tracing::debug!(path = name, "cache entry skipped, unknown type");
            continue;
        };

        let metadata = entry
            .get("metadata")
            .and_then(|v| registry.get(type_index).handler.metadata_from_json(v));

        resources.insert_cached(Resource {
            path: name.to_owned(),
            real_path,
            type_index,
            used: false,
            metadata,
        });
        loaded += 1;
    }
    tracing::info!(path = %cache_path.display(), loaded, total = entries.len(), "loaded asset cache");
    Ok(true)
}
