//! Call-stack construction
//!
//! The builder asks the per-kind [`agents`] for the direct children of a bundle,
//! records every load edge in a [`BundleCallGraph`] and unfolds the graph into
//! call-stack trees, one per level plus one per shared bundle that no level loads.
//! A bundle reached again while it is still being expanded would make the tree
//! infinite; that edge is kept in the graph but not unfolded.

use std::sync::Arc;

use anyhow::{Result, anyhow};
use log::{debug, error, warn};
use petgraph::{
    algo::tarjan_scc,
    graph::{DiGraph, NodeIndex},
};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::{
    asset_db::AssetDatabase,
    call_stack::{CallStack, CallStackForest},
    types::{BundleId, BundleKind},
};

pub mod agents;

use agents::{AgentContext, AgentTable};


/// Directed "loads" relation between bundles
#[derive(Debug, Default)]
pub struct BundleCallGraph {
    graph: DiGraph<BundleId, ()>,
    node_indices: FxHashMap<BundleId, NodeIndex>,
}

impl BundleCallGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn node(&mut self, id: BundleId) -> NodeIndex {
        if let Some(&idx) = self.node_indices.get(&id) {
            return idx;
        }
        let idx = self.graph.add_node(id);
        self.node_indices.insert(id, idx);
        idx
    }

    pub fn add_bundle(&mut self, id: BundleId) {
        self.node(id);
    }

    /// Records that `caller` loads `callee`; repeated edges are stored once
    pub fn add_call(&mut self, caller: BundleId, callee: BundleId) {
        let from = self.node(caller);
        let to = self.node(callee);
        self.graph.update_edge(from, to, ());
    }

    pub fn calls(&self, caller: BundleId) -> Vec<BundleId> {
        let Some(&idx) = self.node_indices.get(&caller) else {
            return Vec::new();
        };
        self.graph
            .neighbors_directed(idx, petgraph::Direction::Outgoing)
            .map(|n| self.graph[n])
            .collect()
    }

    pub fn bundle_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn call_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Groups of bundles that load each other, including bundles loading themselves
    pub fn cycles(&self) -> Vec<Vec<BundleId>> {
        tarjan_scc(&self.graph)
            .into_iter()
            .filter(|component| {
                component.len() > 1
                    || self
                        .graph
                        .find_edge(component[0], component[0])
                        .is_some()
            })
            .map(|component| {
                let mut ids: Vec<BundleId> = component.iter().map(|&n| self.graph[n]).collect();
                ids.sort();
                ids
            })
            .collect()
    }
}

/// Root call stacks in the order they are persisted
#[derive(Debug, Default)]
pub struct BuiltStacks {
    /// One root per level, keyed by the level's first bundle
    pub levels: Vec<Arc<CallStack>>,
    /// Shared bundles never reached from a level
    pub leftovers: Vec<Arc<CallStack>>,
}

impl BuiltStacks {
    pub fn into_forest(self) -> CallStackForest {
        CallStackForest::from_roots(self.levels.into_iter().chain(self.leftovers).collect())
    }
}

/// Unfolds bundle load relations into call-stack trees
pub struct CallStackBuilder<'a> {
    db: &'a dyn AssetDatabase,
    platform: &'a str,
    agents: AgentTable,
    graph: BundleCallGraph,
    /// Children per bundle; agents run once per bundle
    children: FxHashMap<BundleId, Vec<BundleId>>,
    accounted: FxHashSet<BundleId>,
}

impl std::fmt::Debug for CallStackBuilder<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallStackBuilder")
            .field("platform", &self.platform)
            .field("graph", &self.graph)
            .finish_non_exhaustive()
    }
}

impl<'a> CallStackBuilder<'a> {
    pub fn new(db: &'a dyn AssetDatabase, platform: &'a str) -> Self {
        Self {
            db,
            platform,
            agents: AgentTable::default(),
            graph: BundleCallGraph::new(),
            children: FxHashMap::default(),
            accounted: FxHashSet::default(),
        }
    }

    pub fn graph(&self) -> &BundleCallGraph {
        &self.graph
    }

    /// Builds every level root, then one root per shared bundle left over
    pub fn build(&mut self) -> BuiltStacks {
        let mut built = BuiltStacks::default();

        for level in self.db.assets_of_type("LevelData", false) {
            let Some(entry) = self.db.asset(level) else {
                continue;
            };
            let Some(&bundle) = entry.bundles.first() else {
                warn!("Level {} is not in any bundle", entry.name);
                continue;
            };
            match self.build_root(bundle) {
                Ok(stack) => built.levels.push(stack),
                Err(err) => error!("Skipping call stack of {}: {err:#}", entry.name),
            }
        }

        let leftovers: Vec<BundleId> = self
            .db
            .bundles()
            .into_iter()
            .filter(|id| !self.accounted.contains(id))
            .filter(|&id| {
                self.db
                    .bundle(id)
                    .is_some_and(|b| b.kind == BundleKind::Shared)
            })
            .collect();
        for bundle in leftovers {
            match self.build_root(bundle) {
                Ok(stack) => built.leftovers.push(stack),
                Err(err) => error!("Skipping call stack of {bundle}: {err:#}"),
            }
        }

        for cycle in self.graph.cycles() {
            let names: Vec<&str> = cycle
                .iter()
                .filter_map(|&id| self.db.bundle(id).map(|b| b.name.as_str()))
                .collect();
            warn!("Bundles load each other: {}", names.join(", "));
        }

        debug!(
            "Built {} level and {} shared call stacks over {} bundles",
            built.levels.len(),
            built.leftovers.len(),
            self.graph.bundle_count()
        );
        built
    }

    /// Builds the tree rooted at `bundle`
    pub fn build_root(&mut self, bundle: BundleId) -> Result<Arc<CallStack>> {
        let mut path = Vec::new();
        self.expand(bundle, &mut path)
    }

    fn expand(&mut self, id: BundleId, path: &mut Vec<BundleId>) -> Result<Arc<CallStack>> {
        self.accounted.insert(id);
        self.graph.add_bundle(id);

        let bundle = self
            .db
            .bundle(id)
            .ok_or_else(|| anyhow!("Unknown bundle {id}"))?
            .clone();
        let children = self.children_of(id)?;

        path.push(id);
        let mut stacks = Vec::with_capacity(children.len());
        for child in children {
            self.graph.add_call(id, child);
            if path.contains(&child) {
                warn!(
                    "{} is loaded by its own call stack, not expanding it again",
                    self.db.bundle(child).map_or("<unknown>", |b| b.name.as_str())
                );
                continue;
            }
            // A nested failure only costs that bundle its children
            match self.expand(child, path) {
                Ok(stack) => stacks.push(stack),
                Err(err) => {
                    error!(
                        "Not expanding call stack of {}: {err:#}",
                        self.db.bundle(child).map_or("<unknown>", |b| b.name.as_str())
                    );
                    if let Some(entry) = self.db.bundle(child) {
                        stacks.push(Arc::new(CallStack::leaf(entry.clone())));
                    }
                }
            }
        }
        path.pop();

        Ok(Arc::new(CallStack::new(bundle, stacks)))
    }

    fn children_of(&mut self, id: BundleId) -> Result<Vec<BundleId>> {
        if let Some(children) = self.children.get(&id) {
            return Ok(children.clone());
        }

        let mut children = Vec::new();
        if let Some(bundle) = self.db.bundle(id)
            && let Some(agent) = self.agents.agent_for(self.db, bundle)
        {
            let ctx = AgentContext {
                db: self.db,
                platform: self.platform,
            };
            agent.generate_call_stack(ctx, bundle, &mut children)?;
        }

        self.children.insert(id, children.clone());
        Ok(children)
    }
}
