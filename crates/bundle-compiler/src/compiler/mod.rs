//! The closure compiler
//!
//! Compiling a root call stack runs in three passes:
//!
//! 1. A depth-first crawl decides, per bundle, which edited assets and which of
//!    their dependencies must be packaged into it. The loaded set tracks which
//!    bundles are resident at each point of the walk so nothing is shipped twice.
//! 2. Every pending queue is drained through the override handlers or the
//!    packaging dispatcher.
//! 3. Network registries of the compiled bundles drop references to objects that
//!    no longer exist.

use std::sync::Arc;

use anyhow::{Result, anyhow};
use indexmap::{IndexMap, IndexSet};
use log::{debug, trace, warn};

use crate::{
    asset_db::{AssetDatabase, ObjectData},
    cache::CacheManager,
    call_stack::CallStack,
    config::PackagingOptions,
    handlers::HandlerTable,
    packaging::{Dispatcher, PackagingContext},
    types::{BundleId, BundleKind, Guid, ImportReference},
};

mod state;

pub use state::CompilationState;


/// Edits to assets of this type do not make a bundle worth compiling
const LEVEL_TYPE: &str = "LevelData";

/// Aggregates are filled while packaging other assets, never packaged themselves
const AGGREGATE_TYPES: [&str; 2] = ["NetworkRegistryAsset", "MeshVariationDatabase"];

/// What one compile did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileSummary {
    pub crawled_bundles: usize,
    /// Assets handed to a handler or the dispatcher, per bundle, in order
    pub packaged: IndexMap<BundleId, Vec<Guid>>,
    pub pruned_references: usize,
}

impl CompileSummary {
    pub fn packaged_count(&self) -> usize {
        self.packaged.values().map(Vec::len).sum()
    }
}

/// Compiles one root call stack. A compiler is used once and then dropped.
#[derive(Debug)]
pub struct ClosureCompiler<'a> {
    caches: &'a CacheManager,
    dispatcher: &'a Dispatcher,
    handlers: &'a HandlerTable,
    options: &'a PackagingOptions,
    state: CompilationState,
    /// Call-stack node of every crawled bundle, in crawl order
    targets: IndexMap<BundleId, Arc<CallStack>>,
}

impl<'a> ClosureCompiler<'a> {
    /// A compiler whose loaded set starts with every root shared bundle
    pub fn new(
        caches: &'a CacheManager,
        dispatcher: &'a Dispatcher,
        handlers: &'a HandlerTable,
        options: &'a PackagingOptions,
    ) -> Self {
        let mut state = CompilationState::new();
        for root in caches.forest().roots_of_kind(BundleKind::Shared) {
            state.mark_loaded(root.caller_id());
        }
        Self {
            caches,
            dispatcher,
            handlers,
            options,
            state,
            targets: IndexMap::new(),
        }
    }

    pub fn state(&self) -> &CompilationState {
        &self.state
    }

    /// Crawls, whitelists every crawled bundle, drains and validates registries
    pub fn compile(
        mut self,
        db: &mut dyn AssetDatabase,
        pure_bundled: &mut IndexSet<Guid>,
        root: &Arc<CallStack>,
    ) -> Result<CompileSummary> {
        self.crawl(&*db, root);
        for &bundle in self.targets.keys() {
            db.whitelist_bundle(bundle);
        }

        let queues = self.state.take_queues();
        let mut summary = CompileSummary {
            crawled_bundles: self.targets.len(),
            ..CompileSummary::default()
        };
        for (bundle, queue) in queues {
            let target = self
                .targets
                .get(&bundle)
                .cloned()
                .ok_or_else(|| anyhow!("Bundle {bundle} was queued without being crawled"))?;
            let packaged = self.drain(db, pure_bundled, &target, queue)?;
            summary.pruned_references += self.validate_registry(db, &target)?;
            summary.packaged.insert(bundle, packaged);
        }

        debug!(
            "Compiled {root}: {} bundles crawled, {} assets packaged, {} registry references pruned",
            summary.crawled_bundles,
            summary.packaged_count(),
            summary.pruned_references
        );
        Ok(summary)
    }

    /// Decides the pending queue of every bundle below `root`
    pub fn crawl(&mut self, db: &dyn AssetDatabase, root: &Arc<CallStack>) {
        let bundle = root.caller_id();
        self.targets
            .entry(bundle)
            .or_insert_with(|| Arc::clone(root));

        let owned = db.assets_in_bundle(bundle);
        let relevant = owned
            .iter()
            .filter_map(|&guid| db.asset(guid))
            .any(|entry| entry.is_modified() && entry.type_name != LEVEL_TYPE);
        if relevant {
            self.state.open_queue(bundle);
            for guid in owned {
                self.check_owned(db, guid, root);
            }
        } else {
            trace!("Nothing to compile in {}", root.caller().name);
        }

        // A blueprint bundle is not guaranteed to be loaded at runtime
        if root.kind() != BundleKind::Blueprint {
            self.state.mark_loaded(bundle);
        }
        for child in root.children() {
            self.crawl(db, child);
        }
        // Shared bundles stay resident
        if root.kind() != BundleKind::Shared {
            self.state.unload(bundle);
        }
    }

    fn check_owned(&mut self, db: &dyn AssetDatabase, asset: Guid, stack: &CallStack) {
        let bundle = stack.caller_id();
        let Some(entry) = db.asset(asset) else {
            return;
        };
        if !entry.is_modified() || AGGREGATE_TYPES.contains(&entry.type_name.as_str()) {
            return;
        }

        self.check_dependencies(db, asset, stack);

        if entry.bundles.contains(&bundle) {
            return;
        }
        if entry
            .memberships()
            .any(|other| other != bundle && self.state.is_loaded(other))
        {
            trace!("{} is already loaded above {}", entry.name, stack.caller().name);
            return;
        }
        if self.state.is_queued(bundle, asset) {
            return;
        }
        self.state.enqueue(bundle, asset);
    }

    fn check_dependencies(&mut self, db: &dyn AssetDatabase, asset: Guid, stack: &CallStack) {
        let bundle = stack.caller_id();
        let Some(entry) = db.asset(asset) else {
            return;
        };

        for &dependency in &entry.dependencies {
            let Some(reference) = db.asset(dependency) else {
                trace!("{} depends on unknown asset {dependency}", entry.name);
                continue;
            };
            if reference.is_in_bundle(bundle) {
                continue;
            }
            if reference.memberships().any(|b| self.state.is_loaded(b)) {
                continue;
            }
            // Picked up when the bundle below is compiled
            if reference
                .memberships()
                .any(|b| stack.calls_bundle(b, true))
            {
                continue;
            }

            if let Some(owner) = self.state.decided_elsewhere(bundle, dependency) {
                let owner_kind = db.bundle(owner).map(|b| b.kind);
                if owner_kind == Some(BundleKind::SubLevel) && stack.kind() == BundleKind::Shared {
                    debug!(
                        "Promoting {} from {} to {}",
                        reference.name,
                        db.bundle(owner).map_or("<unknown>", |b| b.name.as_str()),
                        stack.caller().name
                    );
                    self.state.dequeue(owner, dependency);
                } else {
                    continue;
                }
            }

            if self.state.is_queued(bundle, dependency) {
                continue;
            }
            self.state.enqueue(bundle, dependency);
            self.check_dependencies(db, dependency, stack);
        }
    }

    /// Packages a queue head-first until it is empty. Returns every head handled.
    fn drain(
        &self,
        db: &mut dyn AssetDatabase,
        pure_bundled: &mut IndexSet<Guid>,
        target: &CallStack,
        mut queue: Vec<Guid>,
    ) -> Result<Vec<Guid>> {
        let mut ctx = PackagingContext {
            db,
            caches: self.caches,
            options: self.options,
            dispatcher: self.dispatcher,
            pure_bundled,
        };
        let mut handled = Vec::with_capacity(queue.len());

        while let Some(&head) = queue.first() {
            let Some(type_name) = ctx.db.asset(head).map(|e| e.type_name.clone()) else {
                warn!("Dropping unknown asset {head} from {}", target.caller().name);
                queue.remove(0);
                continue;
            };

            if self.handlers.has_handler(&type_name) {
                self.handlers.handler(&type_name)?.compile_asset_bundle(
                    &mut ctx,
                    head,
                    target,
                    &mut queue,
                )?;
            } else {
                ctx.add_to_bundle(head, target)?;
                queue.remove(0);
            }
            handled.push(head);

            if queue.first() == Some(&head) {
                warn!(
                    "Handler for {type_name} left {head} pending in {}, dropping it",
                    target.caller().name
                );
                queue.remove(0);
            }
        }
        Ok(handled)
    }

    /// Prunes registry references whose object no longer exists. Returns how many
    /// references were dropped.
    fn validate_registry(&self, db: &mut dyn AssetDatabase, target: &CallStack) -> Result<usize> {
        let Some(registry) = self.caches.networked_registry(&target.caller().name) else {
            return Ok(0);
        };
        let Some(mut content) = db.ebx(registry) else {
            return Ok(0);
        };
        let Some(ObjectData::NetworkRegistry { objects }) = content.root_mut() else {
            return Ok(0);
        };

        let references: Vec<ImportReference> =
            match self.caches.network_references(target.caller_id()) {
                Some(cached) if !cached.is_empty() => cached.to_vec(),
                _ => objects.clone(),
            };

        let mut pruned = 0;
        for reference in references {
            let resolves = match db.asset(reference.file_guid) {
                None => false,
                Some(owner) if owner.has_modified_data() => owner
                    .current_content()
                    .object(reference.class_guid)
                    .is_some(),
                Some(_) => true,
            };
            if resolves {
                continue;
            }
            if let Some(index) = objects.iter().position(|o| *o == reference) {
                objects.remove(index);
                pruned += 1;
            }
        }

        if pruned > 0 {
            debug!(
                "Pruned {pruned} dangling references from the registry of {}",
                target.caller().name
            );
            db.modify_ebx(registry, content)?;
        }
        Ok(pruned)
    }
}
