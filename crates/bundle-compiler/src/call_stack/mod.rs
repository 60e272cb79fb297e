//! The call-stack model
//!
//! A [`CallStack`] describes one bundle and, in load order, the bundles it causes
//! to load. Call stacks are built once per session (from the builder or from the
//! cache) and are read-only afterwards, so children are shared through `Arc` and
//! the flat id index in [`CallStackForest`] points into the same trees.

use std::{fmt, sync::Arc};

use rustc_hash::FxHashMap;

use crate::types::{BundleEntry, BundleId, BundleKind, Guid};

mod walker;

pub use walker::{StackVisitor, walk_stack, walk_stack_with_depth};


/// One bundle and the bundles it is responsible for loading
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallStack {
    caller: BundleEntry,
    /// Blueprint asset describing the caller, if any
    asset: Option<Guid>,
    children: Vec<Arc<CallStack>>,
}

impl CallStack {
    pub fn new(caller: BundleEntry, children: Vec<Arc<CallStack>>) -> Self {
        Self {
            asset: caller.blueprint,
            caller,
            children,
        }
    }

    pub fn leaf(caller: BundleEntry) -> Self {
        Self::new(caller, Vec::new())
    }

    pub fn caller(&self) -> &BundleEntry {
        &self.caller
    }

    pub fn caller_id(&self) -> BundleId {
        self.caller.id
    }

    pub fn kind(&self) -> BundleKind {
        self.caller.kind
    }

    pub fn asset(&self) -> Option<Guid> {
        self.asset
    }

    pub fn children(&self) -> &[Arc<CallStack>] {
        &self.children
    }

    /// Whether `bundle` is loaded by this stack: by a direct child, or anywhere
    /// below when `recursive` is set
    pub fn calls_bundle(&self, bundle: BundleId, recursive: bool) -> bool {
        self.children.iter().any(|child| {
            child.caller_id() == bundle || (recursive && child.calls_bundle(bundle, true))
        })
    }

    /// Number of nodes in this tree
    pub fn node_count(&self) -> usize {
        1 + self
            .children
            .iter()
            .map(|c| c.node_count())
            .sum::<usize>()
    }

    /// Indented rendering of the tree, one bundle per line
    pub fn render(&self) -> String {
        let mut out = String::new();
        walk_stack_with_depth(self, &mut |stack: &CallStack, depth: usize| {
            out.push_str(&"  ".repeat(depth));
            out.push_str(&stack.caller.name);
            out.push('\n');
        });
        out
    }
}

impl fmt::Display for CallStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Callstack", self.caller.display_name())
    }
}

/// All root call stacks of a session plus a flat index by bundle id
#[derive(Debug, Clone, Default)]
pub struct CallStackForest {
    roots: Vec<Arc<CallStack>>,
    index: FxHashMap<BundleId, Arc<CallStack>>,
}

impl CallStackForest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_roots(roots: Vec<Arc<CallStack>>) -> Self {
        let mut forest = Self::new();
        for root in roots {
            forest.push_root(root);
        }
        forest
    }

    /// Adds a root tree; the first stack seen for a bundle id wins the index slot
    pub fn push_root(&mut self, root: Arc<CallStack>) {
        let mut pending = vec![Arc::clone(&root)];
        while let Some(stack) = pending.pop() {
            // Children are pushed in reverse so the index sees them in pre-order
            pending.extend(stack.children.iter().rev().cloned());
            self.index.entry(stack.caller_id()).or_insert(stack);
        }
        self.roots.push(root);
    }

    pub fn roots(&self) -> &[Arc<CallStack>] {
        &self.roots
    }

    pub fn get(&self, id: BundleId) -> Option<&Arc<CallStack>> {
        self.index.get(&id)
    }

    pub fn contains(&self, id: BundleId) -> bool {
        self.index.contains_key(&id)
    }

    /// Root stacks whose caller has the given kind
    pub fn roots_of_kind(&self, kind: BundleKind) -> impl Iterator<Item = &Arc<CallStack>> {
        self.roots.iter().filter(move |r| r.kind() == kind)
    }

    /// The root whose tree loads `bundle`
    pub fn root_call(&self, bundle: BundleId) -> Option<&BundleEntry> {
        self.roots
            .iter()
            .find(|root| root.calls_bundle(bundle, true))
            .map(|root| root.caller())
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn clear(&mut self) {
        self.roots.clear();
        self.index.clear();
    }
}
