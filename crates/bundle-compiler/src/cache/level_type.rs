//! Level-type cache
//!
//! Body: inclusion option count, then per option `name\0`, bundle count and
//! bundle ids; then the menu, singleplayer and multiplayer level bundle lists,
//! each as a count followed by bundle ids.

use std::{
    io::{Read, Write},
    path::Path,
};

use anyhow::Result;
use indexmap::IndexMap;
use log::{debug, warn};

use super::{
    CacheStatus, cache_magic, create, open, read_body, read_bundle_id, read_count, read_cstring,
    write_bundle_id, write_count, write_cstring, write_header,
};
use crate::{
    asset_db::{AssetDatabase, ObjectData},
    types::{BundleId, BundleKind},
};

const MAGIC_NAME: &str = "YW_LevelCache";

/// How a level is played, taken from its description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LevelCategory {
    Menu,
    /// Coop levels
    Singleplayer,
    Multiplayer,
}

#[derive(Debug, Default)]
pub struct LevelTypeCache {
    /// World-part inclusion option to the sub-level bundles enabling it
    inclusions: IndexMap<String, Vec<BundleId>>,
    menus: Vec<BundleId>,
    singleplayer: Vec<BundleId>,
    multiplayer: Vec<BundleId>,
}

impl LevelTypeCache {
    pub fn bundles_of(&self, category: LevelCategory) -> &[BundleId] {
        match category {
            LevelCategory::Menu => &self.menus,
            LevelCategory::Singleplayer => &self.singleplayer,
            LevelCategory::Multiplayer => &self.multiplayer,
        }
    }

    /// Category of a level bundle; `None` for bundles that are not classified levels
    pub fn category(&self, bundle: BundleId) -> Option<LevelCategory> {
        [
            LevelCategory::Menu,
            LevelCategory::Singleplayer,
            LevelCategory::Multiplayer,
        ]
        .into_iter()
        .find(|&category| self.bundles_of(category).contains(&bundle))
    }

    pub fn inclusion_bundles(&self, option: &str) -> &[BundleId] {
        self.inclusions
            .get(option)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn inclusion_options(&self) -> impl Iterator<Item = &str> {
        self.inclusions.keys().map(String::as_str)
    }

    pub fn clear(&mut self) {
        self.inclusions.clear();
        self.menus.clear();
        self.singleplayer.clear();
        self.multiplayer.clear();
    }

    /// Classifies every level and maps inclusion options from the database
    pub fn generate(db: &dyn AssetDatabase) -> Self {
        let mut cache = Self::default();

        for guid in db.assets_of_type("WorldPartInclusion", false) {
            let Some(entry) = db.asset(guid) else {
                continue;
            };
            for object in &entry.current_content().objects {
                if let ObjectData::WorldPartInclusionCriterion { options } = &object.data {
                    for option in options.iter().filter(|o| !o.is_empty()) {
                        cache.inclusions.entry(option.clone()).or_default();
                    }
                }
            }
        }

        for id in db.bundles() {
            let Some(bundle) = db.bundle(id) else {
                continue;
            };
            if bundle.kind != BundleKind::SubLevel {
                continue;
            }
            let Some(blueprint) = bundle.blueprint.and_then(|guid| db.asset(guid)) else {
                continue;
            };
            for object in &blueprint.current_content().objects {
                let ObjectData::SubWorldInclusionSetting { enabled_options } = &object.data else {
                    continue;
                };
                for option in enabled_options {
                    if let Some(bundles) = cache.inclusions.get_mut(option) {
                        bundles.push(id);
                    }
                }
            }
        }

        for guid in db.assets_of_type("LevelData", false) {
            let Some(level) = db.asset(guid) else {
                continue;
            };
            let Some(&bundle) = level.bundles.first() else {
                continue;
            };
            let description = db
                .asset_by_name(&format!("{}/Description", level.name))
                .and_then(|d| match d.current_content().root_data() {
                    Some(ObjectData::LevelDescription { is_menu, is_coop, .. }) => {
                        Some((*is_menu, *is_coop))
                    }
                    _ => None,
                });
            match description {
                Some((true, _)) => cache.menus.push(bundle),
                Some((false, true)) => cache.singleplayer.push(bundle),
                Some((false, false)) => cache.multiplayer.push(bundle),
                None => warn!("Could not find level description for {}", level.name),
            }
        }

        cache
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let mut writer = create(path)?;
        write_header(&mut writer, cache_magic(MAGIC_NAME))?;

        write_count(&mut writer, self.inclusions.len())?;
        for (option, bundles) in &self.inclusions {
            write_cstring(&mut writer, option)?;
            write_ids(&mut writer, bundles)?;
        }
        for list in [&self.menus, &self.singleplayer, &self.multiplayer] {
            write_ids(&mut writer, list)?;
        }

        writer.flush()?;
        Ok(())
    }

    pub fn load(&mut self, path: &Path) -> CacheStatus {
        self.clear();
        let mut reader = match open(path, cache_magic(MAGIC_NAME)) {
            Ok(reader) => reader,
            Err(status) => return status,
        };

        match read_body(path, Self::read(&mut reader)) {
            Ok(cache) => {
                *self = cache;
                debug!(
                    "Loaded {} menu, {} singleplayer and {} multiplayer levels",
                    self.menus.len(),
                    self.singleplayer.len(),
                    self.multiplayer.len()
                );
                CacheStatus::Loaded
            }
            Err(status) => status,
        }
    }

    fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let mut cache = Self::default();
        let count = read_count(reader)?;
        for _ in 0..count {
            let option = read_cstring(reader)?;
            let bundles = read_ids(reader)?;
            cache.inclusions.insert(option, bundles);
        }
        cache.menus = read_ids(reader)?;
        cache.singleplayer = read_ids(reader)?;
        cache.multiplayer = read_ids(reader)?;
        Ok(cache)
    }
}

fn write_ids<W: Write>(writer: &mut W, ids: &[BundleId]) -> Result<()> {
    write_count(writer, ids.len())?;
    for &id in ids {
        write_bundle_id(writer, id)?;
    }
    Ok(())
}

fn read_ids<R: Read>(reader: &mut R) -> Result<Vec<BundleId>> {
    let count = read_count(reader)?;
    (0..count).map(|_| read_bundle_id(reader)).collect()
}
