//! Batch entry points over a whole session
//!
//! [`BundleOperator`] owns the caches, the packaging dispatcher and the handler
//! table for a session and hands out one fresh [`ClosureCompiler`] per root.
//! Roots are compiled one after another; compiles share the database.

use std::sync::Arc;

use anyhow::{Result, anyhow, bail};
use indexmap::IndexSet;
use log::{debug, info};
use rustc_hash::FxHashSet;

use crate::{
    asset_db::{AssetDatabase, ObjectData},
    cache::{CacheManager, LevelCategory},
    call_stack::{CallStack, walk_stack},
    compiler::{ClosureCompiler, CompileSummary},
    config::Config,
    handlers::HandlerTable,
    packaging::Dispatcher,
    types::{BundleKind, Guid},
    util::hash_string,
};

const UNLOCK_TYPE: &str = "UnlockAssetBase";
const LEVEL_TYPE: &str = "LevelData";

#[derive(Debug)]
pub struct BundleOperator {
    config: Config,
    caches: CacheManager,
    dispatcher: Dispatcher,
    handlers: HandlerTable,
    /// Assets packaging edited without them having edits of their own
    pure_bundled: IndexSet<Guid>,
}

impl BundleOperator {
    pub fn new(config: Config, caches: CacheManager, db: &dyn AssetDatabase) -> Self {
        let handlers = HandlerTable::new(db, &config);
        Self {
            config,
            caches,
            dispatcher: Dispatcher::default(),
            handlers,
            pure_bundled: IndexSet::new(),
        }
    }

    pub fn caches(&self) -> &CacheManager {
        &self.caches
    }

    pub fn pure_bundled(&self) -> &IndexSet<Guid> {
        &self.pure_bundled
    }

    pub fn compile_one(
        &mut self,
        db: &mut dyn AssetDatabase,
        root: &Arc<CallStack>,
    ) -> Result<CompileSummary> {
        info!("Compiling {root}");
        ClosureCompiler::new(
            &self.caches,
            &self.dispatcher,
            &self.handlers,
            &self.config.packaging,
        )
        .compile(db, &mut self.pure_bundled, root)
    }

    /// Compiles every root whose level category is enabled. Roots that are not
    /// levels are always compiled.
    pub fn compile_all(&mut self, db: &mut dyn AssetDatabase) -> Result<Vec<CompileSummary>> {
        let roots = self.caches.forest().roots().to_vec();
        let mut summaries = Vec::with_capacity(roots.len());
        for root in &roots {
            if !self.is_enabled(root) {
                debug!("Skipping {root}, its level category is disabled");
                continue;
            }
            summaries.push(self.compile_one(db, root)?);
        }
        info!("Compiled {} of {} root call stacks", summaries.len(), roots.len());
        Ok(summaries)
    }

    fn is_enabled(&self, root: &CallStack) -> bool {
        let compile = &self.config.compile;
        match self.caches.level_types().category(root.caller_id()) {
            Some(LevelCategory::Menu) => compile.menus,
            Some(LevelCategory::Singleplayer) => compile.singleplayer,
            Some(LevelCategory::Multiplayer) => compile.multiplayer,
            None => true,
        }
    }

    /// A sub-level root by full bundle name or by its last path segment
    pub fn find_level(&self, name: &str) -> Option<&Arc<CallStack>> {
        self.caches
            .forest()
            .roots_of_kind(BundleKind::SubLevel)
            .find(|root| {
                let caller = root.caller();
                caller.name == name || caller.display_name().eq_ignore_ascii_case(name)
            })
    }

    fn menu_roots(&self) -> Vec<Arc<CallStack>> {
        self.caches
            .level_types()
            .bundles_of(LevelCategory::Menu)
            .iter()
            .filter_map(|&bundle| self.caches.call_stack(bundle).cloned())
            .collect()
    }

    /// Clears all bundling, then compiles the menus and the named level
    pub fn compile_bundle_by_name(
        &mut self,
        db: &mut dyn AssetDatabase,
        name: &str,
    ) -> Result<Vec<CompileSummary>> {
        let target = self
            .find_level(name)
            .cloned()
            .ok_or_else(|| anyhow!("No level call stack named {name}"))?;
        self.clear_all_bundling(db)?;

        let menus = self.menu_roots();
        let mut summaries = Vec::with_capacity(menus.len() + 1);
        for menu in &menus {
            summaries.push(self.compile_one(db, menu)?);
        }
        if menus.iter().any(|menu| menu.caller_id() == target.caller_id()) {
            debug!("{target} was already compiled as a menu");
        } else {
            summaries.push(self.compile_one(db, &target)?);
        }
        Ok(summaries)
    }

    /// Undoes every bundle addition made by earlier compiles. Aggregates are
    /// reverted, assets that only carried packaging edits are reverted fully and
    /// everything else just loses its added bundles. Returns how many assets changed.
    pub fn clear_all_bundling(&mut self, db: &mut dyn AssetDatabase) -> Result<usize> {
        let mut cleared = 0;
        for guid in db.assets_of_type("", true) {
            let Some(entry) = db.asset(guid) else {
                continue;
            };
            let type_name = entry.type_name.clone();
            let is_added = entry.is_added;
            let has_added_bundles = !entry.added_bundles.is_empty();
            // An edit equal to the shipped content is a leftover of packaging
            let packaging_only = self.pure_bundled.contains(&guid)
                || entry.modified.as_ref().is_some_and(|modified| {
                    modified.data == entry.content && modified.dependent_assets.is_empty()
                });

            match type_name.as_str() {
                "NetworkRegistryAsset" | "MeshVariationDatabase" => {
                    if is_added {
                        continue;
                    }
                    db.revert_asset(guid)?;
                }
                "LevelData" | "SubWorldData" => continue,
                _ => {
                    if !has_added_bundles {
                        continue;
                    }
                    if packaging_only && !is_added {
                        db.revert_asset(guid)?;
                    } else {
                        db.clear_added_bundles(guid)?;
                    }
                }
            }
            cleared += 1;
        }

        for chunk in db.chunks() {
            db.clear_chunk_added_bundles(chunk)?;
        }
        for rid in db.resources() {
            db.clear_res_added_bundles(rid)?;
        }
        db.clear_whitelist();
        self.pure_bundled.clear();

        info!("Cleared bundling of {cleared} assets");
        Ok(cleared)
    }

    /// Adds the identifier of every edited unlock loaded under `root` to the
    /// unlock table of the root's level. Returns how many identifiers were added.
    pub fn build_unlock_id_table(
        &self,
        db: &mut dyn AssetDatabase,
        root: &CallStack,
    ) -> Result<usize> {
        let level = root
            .asset()
            .filter(|&guid| db.asset(guid).is_some_and(|e| e.type_name == LEVEL_TYPE))
            .ok_or_else(|| anyhow!("{root} is not described by a level"))?;

        let mut bundles = FxHashSet::default();
        walk_stack(root, &mut |stack: &CallStack| {
            bundles.insert(stack.caller_id());
        });

        let identifiers: Vec<u32> = db
            .assets_of_type(UNLOCK_TYPE, true)
            .into_iter()
            .filter_map(|guid| db.asset(guid))
            .filter(|entry| entry.memberships().any(|b| bundles.contains(&b)))
            .filter_map(|entry| unlock_identifier(entry.current_content().root_data()))
            .collect();
        add_unlock_ids(db, level, &identifiers)
    }

    /// Adds the identifier of every edited unlock to the table of every level
    pub fn compile_id_tables(&self, db: &mut dyn AssetDatabase) -> Result<usize> {
        let identifiers: Vec<u32> = db
            .assets_of_type(UNLOCK_TYPE, true)
            .into_iter()
            .filter_map(|guid| db.asset(guid))
            .filter_map(|entry| unlock_identifier(entry.current_content().root_data()))
            .collect();

        let mut added = 0;
        for level in db.assets_of_type(LEVEL_TYPE, false) {
            added += add_unlock_ids(db, level, &identifiers)?;
        }
        Ok(added)
    }

    /// Gives every new unlock whose identifier collides with a known one a fresh
    /// identifier: the hash of its name, then the next free value after it.
    /// Returns how many unlocks were re-identified.
    pub fn generate_unlock_ids(&mut self, db: &mut dyn AssetDatabase) -> Result<usize> {
        let mut renumbered = 0;
        for guid in db.assets_of_type(UNLOCK_TYPE, true) {
            let Some(entry) = db.asset(guid) else {
                continue;
            };
            if self.caches.unlock_ids().id_of(&entry.name).is_some() {
                continue;
            }
            let name = entry.name.clone();
            let mut content = entry.current_content().clone();
            let Some(ObjectData::Unlock { identifier }) = content.root_mut() else {
                continue;
            };

            let ids = self.caches.unlock_ids_mut();
            if ids.reserve(*identifier, &name, guid) {
                continue;
            }
            let mut candidate = hash_string(&name);
            while !ids.reserve(candidate, &name, guid) {
                candidate = candidate.wrapping_add(1);
            }
            debug!("Unlock {name} collides on {identifier}, using {candidate}");
            *identifier = candidate;
            db.modify_ebx(guid, content)?;
            renumbered += 1;
        }
        Ok(renumbered)
    }
}

fn unlock_identifier(root: Option<&ObjectData>) -> Option<u32> {
    match root {
        Some(ObjectData::Unlock { identifier }) => Some(*identifier),
        _ => None,
    }
}

/// Appends the missing `identifiers` to a level's unlock table
fn add_unlock_ids(db: &mut dyn AssetDatabase, level: Guid, identifiers: &[u32]) -> Result<usize> {
    let Some(mut content) = db.ebx(level) else {
        bail!("Level {level} does not exist");
    };
    let Some(ObjectData::LevelData { unlock_ids }) = content.root_mut() else {
        bail!("Asset {level} is not level data");
    };

    let mut added = 0;
    for &identifier in identifiers {
        if !unlock_ids.contains(&identifier) {
            unlock_ids.push(identifier);
            added += 1;
        }
    }
    if added > 0 {
        db.modify_ebx(level, content)?;
    }
    Ok(added)
}
