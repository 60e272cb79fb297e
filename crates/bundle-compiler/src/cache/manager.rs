//! Owns every cache of a session and the paths they persist to

use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use log::info;

use super::{
    BundleCache, CacheStatus, CallStackCache, LevelTypeCache, ReferenceCache, UnlockIdCache,
};
use crate::{
    asset_db::AssetDatabase,
    call_graph::CallStackBuilder,
    call_stack::{CallStack, CallStackForest},
    config::Config,
    types::{BundleEntry, BundleId, Guid, ImportReference},
};

#[derive(Debug, Clone)]
struct CachePaths {
    call_stacks: PathBuf,
    bundles: PathBuf,
    networked_types: PathBuf,
    references: PathBuf,
    unlock_ids: PathBuf,
    level_types: PathBuf,
}

impl CachePaths {
    fn new(config: &Config) -> Self {
        Self {
            call_stacks: config.cache_file("Callstack.cache"),
            bundles: config.cache_file("Bundles.cache"),
            networked_types: config.cache_file("NetworkedTypes.txt"),
            references: config.cache_file("Reference.cache"),
            unlock_ids: config.cache_file("IdCache.cache"),
            level_types: config.cache_file("Level.cache"),
        }
    }
}

/// Load outcome of every cache file. Each file is independent, so one stale
/// cache does not invalidate the others.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheReport {
    pub call_stacks: CacheStatus,
    pub bundles: CacheStatus,
    pub references: CacheStatus,
    pub unlock_ids: CacheStatus,
    pub level_types: CacheStatus,
}

impl CacheReport {
    pub fn all_loaded(&self) -> bool {
        [
            self.call_stacks,
            self.bundles,
            self.references,
            self.unlock_ids,
            self.level_types,
        ]
        .into_iter()
        .all(CacheStatus::is_loaded)
    }
}

#[derive(Debug)]
pub struct CacheManager {
    paths: CachePaths,
    platform: String,
    call_stacks: CallStackCache,
    bundles: BundleCache,
    references: ReferenceCache,
    unlock_ids: UnlockIdCache,
    level_types: LevelTypeCache,
}

impl CacheManager {
    /// An empty manager; call [`CacheManager::load`] or [`CacheManager::generate`]
    pub fn new(config: &Config) -> Self {
        Self {
            paths: CachePaths::new(config),
            platform: config.platform.clone(),
            call_stacks: CallStackCache::default(),
            bundles: BundleCache::default(),
            references: ReferenceCache::default(),
            unlock_ids: UnlockIdCache::default(),
            level_types: LevelTypeCache::default(),
        }
    }

    /// Builds every cache from the database without touching the disk
    pub fn in_memory(config: &Config, db: &dyn AssetDatabase) -> Self {
        let mut manager = Self::new(config);
        manager.build(db);
        manager
    }

    fn build(&mut self, db: &dyn AssetDatabase) {
        let stacks = CallStackBuilder::new(db, &self.platform).build();
        self.call_stacks = CallStackCache::from_built(stacks);
        self.bundles = BundleCache::generate(db);
        self.references = ReferenceCache::generate(db);
        self.unlock_ids = UnlockIdCache::generate(db);
        self.level_types = LevelTypeCache::generate(db);
    }

    /// Reads every cache file, resolving cached names against `db`
    pub fn load(&mut self, db: &dyn AssetDatabase) -> CacheReport {
        let report = CacheReport {
            call_stacks: self.call_stacks.load(&self.paths.call_stacks, db),
            bundles: self
                .bundles
                .load(&self.paths.bundles, &self.paths.networked_types, db),
            references: self.references.load(&self.paths.references, db),
            unlock_ids: self.unlock_ids.load(&self.paths.unlock_ids, db),
            level_types: self.level_types.load(&self.paths.level_types),
        };
        if report.all_loaded() {
            info!("Loaded {} root call stacks", self.call_stacks.forest().len());
        }
        report
    }

    /// Rebuilds every cache from the database, writes them and reads them back
    pub fn generate(&mut self, db: &dyn AssetDatabase) -> Result<CacheReport> {
        self.build(db);
        self.call_stacks.write(&self.paths.call_stacks)?;
        self.bundles
            .write(&self.paths.bundles, &self.paths.networked_types)?;
        self.references.write(&self.paths.references)?;
        self.unlock_ids.write(&self.paths.unlock_ids)?;
        self.level_types.write(&self.paths.level_types)?;
        info!("Generated caches at {}", self.paths.call_stacks.display());
        Ok(self.load(db))
    }

    pub fn clear(&mut self) {
        self.call_stacks.clear();
        self.bundles.clear();
        self.references.clear();
        self.unlock_ids.clear();
        self.level_types.clear();
    }

    pub fn forest(&self) -> &CallStackForest {
        self.call_stacks.forest()
    }

    pub fn call_stack(&self, bundle: BundleId) -> Option<&Arc<CallStack>> {
        self.forest().get(bundle)
    }

    /// The root whose tree loads `bundle`
    pub fn root_call(&self, bundle: BundleId) -> Option<&BundleEntry> {
        self.forest().root_call(bundle)
    }

    pub fn networked_registry(&self, bundle_name: &str) -> Option<Guid> {
        self.bundles.networked_registry(bundle_name)
    }

    pub fn variation_database(&self, bundle_name: &str) -> Option<Guid> {
        self.bundles.variation_database(bundle_name)
    }

    /// Registry references recorded for the registry owned by `bundle`
    pub fn network_references(&self, bundle: BundleId) -> Option<&[ImportReference]> {
        self.references.bundle_references(bundle)
    }

    pub fn is_networked_type(&self, type_name: &str) -> bool {
        self.bundles.is_networked_type(type_name)
    }

    pub fn unlock_ids(&self) -> &UnlockIdCache {
        &self.unlock_ids
    }

    pub fn unlock_ids_mut(&mut self) -> &mut UnlockIdCache {
        &mut self.unlock_ids
    }

    pub fn level_types(&self) -> &LevelTypeCache {
        &self.level_types
    }
}
