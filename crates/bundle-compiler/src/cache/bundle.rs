//! Bundle cache: which bundle owns which aggregate asset
//!
//! Body: registry count, then `(bundle id: u32, asset name\0)` per network
//! registry, then the same for mesh-variation databases. The list of networked
//! object types lives next to it in a plain text file, one type per line.

use std::{
    fs,
    io::{Read, Write},
    path::Path,
};

use anyhow::{Context, Result};
use indexmap::{IndexMap, IndexSet};
use log::{debug, info, warn};

use super::{
    CacheStatus, cache_magic, create, open, read_body, read_bundle_id, read_count, read_cstring,
    write_bundle_id, write_count, write_cstring, write_header,
};
use crate::{
    asset_db::{AssetDatabase, ObjectData},
    types::{BundleId, Guid},
};

const MAGIC_NAME: &str = "YW_BundleCache";

/// A per-bundle aggregate asset
#[derive(Debug, Clone, PartialEq, Eq)]
struct Aggregate {
    bundle: BundleId,
    asset_name: String,
    guid: Guid,
}

#[derive(Debug, Default)]
pub struct BundleCache {
    /// Bundle name to its network registry
    networked_bundles: IndexMap<String, Aggregate>,
    /// Bundle name to its mesh-variation database
    variation_databases: IndexMap<String, Aggregate>,
    networked_types: IndexSet<String>,
}

impl BundleCache {
    pub fn networked_registry(&self, bundle_name: &str) -> Option<Guid> {
        self.networked_bundles.get(bundle_name).map(|a| a.guid)
    }

    pub fn variation_database(&self, bundle_name: &str) -> Option<Guid> {
        self.variation_databases.get(bundle_name).map(|a| a.guid)
    }

    pub fn networked_types(&self) -> &IndexSet<String> {
        &self.networked_types
    }

    pub fn is_networked_type(&self, type_name: &str) -> bool {
        self.networked_types.contains(type_name)
    }

    pub fn clear(&mut self) {
        self.networked_bundles.clear();
        self.variation_databases.clear();
        self.networked_types.clear();
    }

    /// Finds every aggregate asset, keyed by the name of the first bundle it
    /// ships in, and the types of every object a network registry points at
    pub fn generate(db: &dyn AssetDatabase) -> Self {
        let mut cache = Self::default();
        for (type_name, target) in [
            ("NetworkRegistryAsset", &mut cache.networked_bundles),
            ("MeshVariationDatabase", &mut cache.variation_databases),
        ] {
            for guid in db.assets_of_type(type_name, false) {
                let Some(entry) = db.asset(guid) else {
                    continue;
                };
                let Some(bundle) = entry.bundles.first().and_then(|&id| db.bundle(id)) else {
                    warn!("{} is not in any bundle", entry.name);
                    continue;
                };
                target.insert(
                    bundle.name.clone(),
                    Aggregate {
                        bundle: bundle.id,
                        asset_name: entry.name.clone(),
                        guid,
                    },
                );
            }
        }
        cache.networked_types = derive_networked_types(db);
        cache
    }

    /// Writes the aggregate ownership cache. The networked type list is only
    /// written when `types_path` does not exist yet, so a curated list survives.
    pub fn write(&self, path: &Path, types_path: &Path) -> Result<()> {
        let mut writer = create(path)?;
        write_header(&mut writer, cache_magic(MAGIC_NAME))?;
        for section in [&self.networked_bundles, &self.variation_databases] {
            write_count(&mut writer, section.len())?;
            for aggregate in section.values() {
                write_bundle_id(&mut writer, aggregate.bundle)?;
                write_cstring(&mut writer, &aggregate.asset_name)?;
            }
        }
        writer.flush()?;

        if !types_path.exists() {
            info!("Writing {} networked types", self.networked_types.len());
            let mut text = String::new();
            for type_name in &self.networked_types {
                text.push_str(type_name);
                text.push('\n');
            }
            fs::write(types_path, text)
                .with_context(|| format!("Failed to write {}", types_path.display()))?;
        }
        Ok(())
    }

    pub fn load(&mut self, path: &Path, types_path: &Path, db: &dyn AssetDatabase) -> CacheStatus {
        self.clear();
        let mut reader = match open(path, cache_magic(MAGIC_NAME)) {
            Ok(reader) => reader,
            Err(status) => return status,
        };

        let sections = match read_body(path, read_sections(&mut reader)) {
            Ok(sections) => sections,
            Err(status) => return status,
        };

        for (section, target) in sections
            .into_iter()
            .zip([&mut self.networked_bundles, &mut self.variation_databases])
        {
            for (bundle, asset_name) in section {
                let Some(bundle) = db.bundle(bundle) else {
                    warn!("Cached bundle {bundle} of {asset_name} no longer exists");
                    continue;
                };
                let Some(asset) = db.asset_by_name(&asset_name) else {
                    warn!("Cached aggregate {asset_name} no longer exists");
                    continue;
                };
                target.insert(
                    bundle.name.clone(),
                    Aggregate {
                        bundle: bundle.id,
                        guid: asset.guid,
                        asset_name,
                    },
                );
            }
        }

        match fs::read_to_string(types_path) {
            Ok(text) => {
                self.networked_types.extend(
                    text.lines()
                        .map(str::trim)
                        .filter(|line| !line.is_empty())
                        .map(str::to_owned),
                );
            }
            Err(_) => warn!("No networked type list at {}", types_path.display()),
        }

        debug!(
            "Loaded {} network registries, {} variation databases, {} networked types",
            self.networked_bundles.len(),
            self.variation_databases.len(),
            self.networked_types.len()
        );
        CacheStatus::Loaded
    }
}

type Section = Vec<(BundleId, String)>;

fn read_section<R: Read>(reader: &mut R) -> Result<Section> {
    let count = read_count(reader)?;
    let mut section = Vec::new();
    for _ in 0..count {
        let bundle = read_bundle_id(reader)?;
        section.push((bundle, read_cstring(reader)?));
    }
    Ok(section)
}

/// Network registries, then variation databases
fn read_sections<R: Read>(reader: &mut R) -> Result<[Section; 2]> {
    let registries = read_section(reader)?;
    let databases = read_section(reader)?;
    Ok([registries, databases])
}

/// Types of every object some network registry points at, sorted
fn derive_networked_types(db: &dyn AssetDatabase) -> IndexSet<String> {
    let mut types = IndexSet::new();
    for registry in db.assets_of_type("NetworkRegistryAsset", false) {
        let Some(content) = db.asset(registry).map(|e| e.current_content()) else {
            continue;
        };
        let Some(ObjectData::NetworkRegistry { objects }) = content.root_data() else {
            continue;
        };
        for reference in objects {
            if let Some(object) = db
                .asset(reference.file_guid)
                .and_then(|owner| owner.current_content().object(reference.class_guid))
            {
                types.insert(object.data.type_name().to_owned());
            }
        }
    }
    types.sort();
    types
}
