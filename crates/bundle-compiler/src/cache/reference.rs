//! Reference cache: the objects each network registry pointed at when generated
//!
//! Body: registry count, then per registry `guid`, reference count and
//! `(file guid, class guid)` pairs.

use std::{
    io::{Read, Write},
    path::Path,
};

use anyhow::Result;
use indexmap::IndexMap;
use log::{debug, warn};
use rayon::prelude::*;
use rustc_hash::FxHashMap;

use super::{
    CacheStatus, cache_magic, create, open, read_body, read_count, read_guid, write_count,
    write_guid, write_header,
};
use crate::{
    asset_db::{AssetDatabase, ObjectData},
    types::{BundleId, Guid, ImportReference},
};

const MAGIC_NAME: &str = "YW_RefCache";

#[derive(Debug, Default)]
pub struct ReferenceCache {
    by_registry: IndexMap<Guid, Vec<ImportReference>>,
    by_bundle: FxHashMap<BundleId, Vec<ImportReference>>,
}

impl ReferenceCache {
    pub fn registry_references(&self, registry: Guid) -> Option<&[ImportReference]> {
        self.by_registry.get(&registry).map(Vec::as_slice)
    }

    /// References of the registry owned by `bundle`
    pub fn bundle_references(&self, bundle: BundleId) -> Option<&[ImportReference]> {
        self.by_bundle.get(&bundle).map(Vec::as_slice)
    }

    pub fn clear(&mut self) {
        self.by_registry.clear();
        self.by_bundle.clear();
    }

    /// Snapshots the distinct references of every network registry
    pub fn generate(db: &dyn AssetDatabase) -> Self {
        let mut cache = Self::default();
        for guid in db.assets_of_type("NetworkRegistryAsset", false) {
            let Some(entry) = db.asset(guid) else {
                continue;
            };
            let Some(ObjectData::NetworkRegistry { objects }) = entry.current_content().root_data()
            else {
                continue;
            };
            cache.insert(db, guid, unique_references(objects));
        }
        cache
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let mut writer = create(path)?;
        write_header(&mut writer, cache_magic(MAGIC_NAME))?;
        write_count(&mut writer, self.by_registry.len())?;
        for (registry, references) in &self.by_registry {
            write_guid(&mut writer, *registry)?;
            write_count(&mut writer, references.len())?;
            for reference in references {
                write_guid(&mut writer, reference.file_guid)?;
                write_guid(&mut writer, reference.class_guid)?;
            }
        }
        writer.flush()?;
        debug!(
            "Cached references of {} network registries",
            self.by_registry.len()
        );
        Ok(())
    }

    pub fn load(&mut self, path: &Path, db: &dyn AssetDatabase) -> CacheStatus {
        self.clear();
        let mut reader = match open(path, cache_magic(MAGIC_NAME)) {
            Ok(reader) => reader,
            Err(status) => return status,
        };

        let registries = match read_body(path, read_registries(&mut reader)) {
            Ok(registries) => registries,
            Err(status) => return status,
        };

        for (registry, references) in registries {
            self.insert(db, registry, references);
        }
        CacheStatus::Loaded
    }

    fn insert(&mut self, db: &dyn AssetDatabase, registry: Guid, references: Vec<ImportReference>) {
        match db.asset(registry).and_then(|e| e.bundles.first().copied()) {
            Some(bundle) => {
                self.by_bundle.insert(bundle, references.clone());
            }
            None => warn!("Network registry {registry} is not in any bundle"),
        }
        self.by_registry.insert(registry, references);
    }
}

/// Distinct references in a registry object list, first occurrence kept
fn unique_references(objects: &[ImportReference]) -> Vec<ImportReference> {
    objects
        .par_iter()
        .enumerate()
        .filter(|&(index, object)| !objects[..index].contains(object))
        .map(|(_, object)| *object)
        .collect()
}

fn read_registries<R: Read>(reader: &mut R) -> Result<Vec<(Guid, Vec<ImportReference>)>> {
    let count = read_count(reader)?;
    let mut registries = Vec::new();
    for _ in 0..count {
        let registry = read_guid(reader)?;
        let reference_count = read_count(reader)?;
        let mut references = Vec::new();
        for _ in 0..reference_count {
            let file_guid = read_guid(reader)?;
            let class_guid = read_guid(reader)?;
            references.push(ImportReference::new(file_guid, class_guid));
        }
        registries.push((registry, references));
    }
    Ok(registries)
}
