//! Per-type overrides of the compiler's one-asset-one-bundle packaging
//!
//! A handler receives the head of a bundle's pending queue together with the
//! queue itself. It may package the asset anywhere, and it must remove at least
//! the asset it was given; it may also strip other pending entries.

use std::sync::Arc;

use anyhow::{Result, anyhow};
use log::{debug, warn};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    asset_db::AssetDatabase,
    call_stack::CallStack,
    config::Config,
    packaging::PackagingContext,
    types::{BundleEntry, Guid},
    util::qualified_bundle_name,
};


/// Removes the first occurrence of `asset` from a pending queue
pub fn remove_pending(queue: &mut Vec<Guid>, asset: Guid) -> bool {
    match queue.iter().position(|&pending| pending == asset) {
        Some(index) => {
            queue.remove(index);
            true
        }
        None => false,
    }
}

pub trait CompilerHandler: std::fmt::Debug {
    fn asset_type(&self) -> &'static str;

    /// Packages `asset`, queued for the caller of `target`, and updates `queue`
    fn compile_asset_bundle(
        &self,
        ctx: &mut PackagingContext<'_>,
        asset: Guid,
        target: &CallStack,
        queue: &mut Vec<Guid>,
    ) -> Result<()>;
}

/// Weapon unlocks live in one designated shared bundle, together with whatever
/// they pull in that is still waiting to be packaged
#[derive(Debug)]
pub struct WeaponUnlockHandler {
    shared: BundleEntry,
}

impl WeaponUnlockHandler {
    pub fn new(shared: BundleEntry) -> Self {
        Self { shared }
    }

    fn in_shared_bundle(&self, db: &dyn AssetDatabase, asset: Guid) -> bool {
        db.asset(asset)
            .is_some_and(|entry| entry.is_in_bundle(self.shared.id))
    }

    /// Drops `asset` and every pending asset it transitively depends on
    fn strip(
        db: &dyn AssetDatabase,
        asset: Guid,
        queue: &mut Vec<Guid>,
        visited: &mut FxHashSet<Guid>,
    ) {
        remove_pending(queue, asset);
        let Some(entry) = db.asset(asset) else {
            return;
        };
        for &dependency in &entry.dependencies {
            if queue.contains(&dependency) && visited.insert(dependency) {
                Self::strip(db, dependency, queue, visited);
            }
        }
    }

    /// Packages `asset` into the shared bundle, then relocates its pending dependencies
    fn relocate(
        &self,
        ctx: &mut PackagingContext<'_>,
        asset: Guid,
        shared: &CallStack,
        queue: &mut Vec<Guid>,
        visited: &mut FxHashSet<Guid>,
    ) -> Result<()> {
        if !visited.insert(asset) {
            return Ok(());
        }
        ctx.add_to_bundle(asset, shared)?;
        remove_pending(queue, asset);

        let dependencies = ctx
            .db
            .asset(asset)
            .map(|entry| entry.dependencies.clone())
            .unwrap_or_default();
        for dependency in dependencies {
            if !queue.contains(&dependency) {
                continue;
            }
            if self.in_shared_bundle(&*ctx.db, dependency) {
                remove_pending(queue, dependency);
                continue;
            }
            self.relocate(ctx, dependency, shared, queue, visited)?;
        }
        Ok(())
    }
}

impl CompilerHandler for WeaponUnlockHandler {
    fn asset_type(&self) -> &'static str {
        "SoldierWeaponUnlockAsset"
    }

    fn compile_asset_bundle(
        &self,
        ctx: &mut PackagingContext<'_>,
        asset: Guid,
        target: &CallStack,
        queue: &mut Vec<Guid>,
    ) -> Result<()> {
        let mut visited = FxHashSet::default();
        if self.in_shared_bundle(&*ctx.db, asset) {
            debug!(
                "Weapon unlock {asset} already ships in {}, dropping it from {}",
                self.shared.name,
                target.caller().name
            );
            Self::strip(&*ctx.db, asset, queue, &mut visited);
            return Ok(());
        }

        let shared = ctx
            .caches
            .call_stack(self.shared.id)
            .cloned()
            .unwrap_or_else(|| Arc::new(CallStack::leaf(self.shared.clone())));
        self.relocate(ctx, asset, &shared, queue, &mut visited)
    }
}

/// Profile options ship in two fixed bundles and nowhere else
#[derive(Debug)]
pub struct ProfileOptionHandler {
    primary: BundleEntry,
    secondary: BundleEntry,
}

impl ProfileOptionHandler {
    pub fn new(primary: BundleEntry, secondary: BundleEntry) -> Self {
        Self { primary, secondary }
    }
}

impl CompilerHandler for ProfileOptionHandler {
    fn asset_type(&self) -> &'static str {
        "ProfileOptionData"
    }

    fn compile_asset_bundle(
        &self,
        ctx: &mut PackagingContext<'_>,
        asset: Guid,
        _target: &CallStack,
        queue: &mut Vec<Guid>,
    ) -> Result<()> {
        let placed = ctx
            .db
            .asset(asset)
            .is_some_and(|entry| entry.is_in_bundle(self.primary.id));
        if !placed {
            for bundle in [&self.primary, &self.secondary] {
                ctx.add_to_bundle(asset, &CallStack::leaf(bundle.clone()))?;
            }
        }
        remove_pending(queue, asset);
        Ok(())
    }
}

/// Registration table of override handlers, keyed by exact asset type
#[derive(Debug, Default)]
pub struct HandlerTable {
    handlers: FxHashMap<&'static str, Box<dyn CompilerHandler>>,
}

impl HandlerTable {
    /// Registers the built-in handlers, resolving their well-known bundles once.
    /// A handler whose bundle does not exist in `db` is left out.
    pub fn new(db: &dyn AssetDatabase, config: &Config) -> Self {
        let resolve = |declared: &str| -> Option<BundleEntry> {
            let name = qualified_bundle_name(&config.platform, declared);
            let entry = db.bundle_id(&name).and_then(|id| db.bundle(id)).cloned();
            if entry.is_none() {
                warn!("Well-known bundle {name} does not exist");
            }
            entry
        };

        let mut table = Self::default();
        if let Some(shared) = resolve(&config.well_known.weapon_shared_bundle) {
            table.register(Box::new(WeaponUnlockHandler::new(shared)));
        }
        let [primary, secondary] = &config.well_known.profile_option_bundles;
        if let (Some(primary), Some(secondary)) = (resolve(primary), resolve(secondary)) {
            table.register(Box::new(ProfileOptionHandler::new(primary, secondary)));
        }
        table
    }

    pub fn register(&mut self, handler: Box<dyn CompilerHandler>) {
        self.handlers.insert(handler.asset_type(), handler);
    }

    pub fn has_handler(&self, type_name: &str) -> bool {
        self.handlers.contains_key(type_name)
    }

    /// Looks up a registered handler; asking for an unregistered type is a
    /// dispatch-table omission and fails
    pub fn handler(&self, type_name: &str) -> Result<&dyn CompilerHandler> {
        self.handlers
            .get(type_name)
            .map(Box::as_ref)
            .ok_or_else(|| anyhow!("No compiler handler registered for {type_name}"))
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
