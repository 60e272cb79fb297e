//! Bookkeeping of one closure compile

use indexmap::IndexMap;
use rustc_hash::FxHashSet;

use crate::types::{BundleId, Guid};

/// Pending queues, per-bundle decisions and the loaded set of one compile.
/// Owned by a single compiler and dropped with it.
#[derive(Debug, Default)]
pub struct CompilationState {
    /// Assets waiting to be packaged, per bundle, in discovery order
    assets_to_compile: IndexMap<BundleId, Vec<Guid>>,
    /// Assets already decided for a bundle
    checked: IndexMap<BundleId, FxHashSet<Guid>>,
    /// Bundles resident at the current point of the walk
    loaded: FxHashSet<BundleId>,
}

impl CompilationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_loaded(&mut self, bundle: BundleId) {
        self.loaded.insert(bundle);
    }

    pub fn unload(&mut self, bundle: BundleId) {
        self.loaded.remove(&bundle);
    }

    pub fn is_loaded(&self, bundle: BundleId) -> bool {
        self.loaded.contains(&bundle)
    }

    /// Opens the pending queue of a bundle that has edits worth packaging
    pub fn open_queue(&mut self, bundle: BundleId) {
        self.assets_to_compile.entry(bundle).or_default();
        self.checked.entry(bundle).or_default();
    }

    pub fn enqueue(&mut self, bundle: BundleId, asset: Guid) {
        self.assets_to_compile.entry(bundle).or_default().push(asset);
        self.checked.entry(bundle).or_default().insert(asset);
    }

    pub fn is_queued(&self, bundle: BundleId, asset: Guid) -> bool {
        self.assets_to_compile
            .get(&bundle)
            .is_some_and(|queue| queue.contains(&asset))
    }

    pub fn is_checked(&self, bundle: BundleId, asset: Guid) -> bool {
        self.checked
            .get(&bundle)
            .is_some_and(|checked| checked.contains(&asset))
    }

    /// Drops `asset` from the pending queue of `bundle`. It stays checked there.
    pub fn dequeue(&mut self, bundle: BundleId, asset: Guid) -> bool {
        let Some(queue) = self.assets_to_compile.get_mut(&bundle) else {
            return false;
        };
        match queue.iter().position(|&pending| pending == asset) {
            Some(index) => {
                queue.remove(index);
                true
            }
            None => false,
        }
    }

    /// Another bundle `asset` was already decided for: the one still queueing
    /// it, else the first one that checked it
    pub fn decided_elsewhere(&self, bundle: BundleId, asset: Guid) -> Option<BundleId> {
        let queueing = self
            .assets_to_compile
            .iter()
            .find(|(other, queue)| **other != bundle && queue.contains(&asset))
            .map(|(other, _)| *other);
        queueing.or_else(|| {
            self.checked
                .iter()
                .find(|(other, checked)| **other != bundle && checked.contains(&asset))
                .map(|(other, _)| *other)
        })
    }

    pub fn queue(&self, bundle: BundleId) -> &[Guid] {
        self.assets_to_compile
            .get(&bundle)
            .map_or(&[], Vec::as_slice)
    }

    /// Bundles with an open queue, in the order they were opened
    pub fn queued_bundles(&self) -> impl Iterator<Item = BundleId> + '_ {
        self.assets_to_compile.keys().copied()
    }

    /// Moves every queue out for draining, keeping their order
    pub fn take_queues(&mut self) -> IndexMap<BundleId, Vec<Guid>> {
        std::mem::take(&mut self.assets_to_compile)
    }
}
