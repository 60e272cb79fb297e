//! Call-stack cache: the forest as nested bundle names
//!
//! Body: level root count, level trees, leftover root count, leftover trees.
//! A tree is `name\0`, `child count: i32`, then each child tree.

use std::{
    io::{Read, Write},
    path::Path,
    sync::Arc,
};

use anyhow::Result;
use log::{debug, warn};

use super::{
    CacheStatus, cache_magic, create, open, read_body, read_count, read_cstring, write_count,
    write_cstring, write_header,
};
use crate::{
    asset_db::AssetDatabase,
    call_graph::BuiltStacks,
    call_stack::{CallStack, CallStackForest},
};

const MAGIC_NAME: &str = "YW_CallStackCache";

#[derive(Debug, Default)]
pub struct CallStackCache {
    forest: CallStackForest,
    /// Roots before this index come from levels
    level_roots: usize,
}

/// A tree as stored, before names are resolved against the database
struct NameTree {
    name: String,
    children: Vec<NameTree>,
}

impl CallStackCache {
    pub fn forest(&self) -> &CallStackForest {
        &self.forest
    }

    pub fn from_built(stacks: BuiltStacks) -> Self {
        Self {
            level_roots: stacks.levels.len(),
            forest: stacks.into_forest(),
        }
    }

    pub fn clear(&mut self) {
        self.forest.clear();
        self.level_roots = 0;
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let mut writer = create(path)?;
        write_header(&mut writer, cache_magic(MAGIC_NAME))?;

        let roots = self.forest.roots();
        let (levels, leftovers) = roots.split_at(self.level_roots.min(roots.len()));
        for section in [levels, leftovers] {
            write_count(&mut writer, section.len())?;
            for root in section {
                write_tree(&mut writer, root)?;
            }
        }

        writer.flush()?;
        Ok(())
    }

    /// Replaces the forest with the cached one. Bundles that no longer exist are
    /// dropped together with their subtree.
    pub fn load(&mut self, path: &Path, db: &dyn AssetDatabase) -> CacheStatus {
        self.clear();
        let mut reader = match open(path, cache_magic(MAGIC_NAME)) {
            Ok(reader) => reader,
            Err(status) => return status,
        };

        let [levels, leftovers] = match read_body(path, read_sections(&mut reader)) {
            Ok(sections) => sections,
            Err(status) => return status,
        };

        let levels: Vec<_> = levels.iter().filter_map(|tree| resolve(db, tree)).collect();
        self.level_roots = levels.len();
        let leftovers = leftovers.iter().filter_map(|tree| resolve(db, tree));
        self.forest = CallStackForest::from_roots(levels.into_iter().chain(leftovers).collect());
        debug!("Loaded {} root call stacks", self.forest.len());
        CacheStatus::Loaded
    }
}

/// Level roots, then leftover roots
fn read_sections<R: Read>(reader: &mut R) -> Result<[Vec<NameTree>; 2]> {
    let levels = read_section(reader)?;
    let leftovers = read_section(reader)?;
    Ok([levels, leftovers])
}

fn read_section<R: Read>(reader: &mut R) -> Result<Vec<NameTree>> {
    let count = read_count(reader)?;
    (0..count).map(|_| read_tree(reader)).collect()
}

fn write_tree<W: Write>(writer: &mut W, stack: &CallStack) -> Result<()> {
    write_cstring(writer, &stack.caller().name)?;
    write_count(writer, stack.children().len())?;
    for child in stack.children() {
        write_tree(writer, child)?;
    }
    Ok(())
}

fn read_tree<R: Read>(reader: &mut R) -> Result<NameTree> {
    let name = read_cstring(reader)?;
    let count = read_count(reader)?;
    let children = (0..count)
        .map(|_| read_tree(reader))
        .collect::<Result<Vec<_>>>()?;
    Ok(NameTree { name, children })
}

fn resolve(db: &dyn AssetDatabase, tree: &NameTree) -> Option<Arc<CallStack>> {
    let Some(bundle) = db.bundle_id(&tree.name).and_then(|id| db.bundle(id)) else {
        warn!("Cached bundle {} no longer exists", tree.name);
        return None;
    };
    let children = tree
        .children
        .iter()
        .filter_map(|child| resolve(db, child))
        .collect();
    Some(Arc::new(CallStack::new(bundle.clone(), children)))
}
