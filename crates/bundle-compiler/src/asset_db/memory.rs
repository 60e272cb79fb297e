//! In-memory asset database backed by a JSON snapshot

use std::{fs, path::Path};

use anyhow::{Context, Result, anyhow};
use indexmap::{IndexMap, IndexSet};
use log::debug;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::{
    AssetDatabase, AssetEntry, ChunkEntry, EbxAsset, KnownVariation, LinkTarget, ModifiedEntry,
    ResEntry,
};
use crate::types::{BundleEntry, BundleId, BundleKind, Guid, ResourceId};

/// `name` derives from `parent` in the game's type library
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDeclaration {
    pub name: String,
    pub parent: String,
}

/// Known variations of one mesh
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariationRecord {
    pub mesh: Guid,
    pub variations: Vec<KnownVariation>,
}

/// On-disk form of a [`MemoryDatabase`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSnapshot {
    #[serde(default)]
    pub bundles: Vec<BundleEntry>,
    #[serde(default)]
    pub assets: Vec<AssetEntry>,
    #[serde(default)]
    pub chunks: Vec<ChunkEntry>,
    #[serde(default)]
    pub resources: Vec<ResEntry>,
    #[serde(default)]
    pub types: Vec<TypeDeclaration>,
    #[serde(default)]
    pub mesh_variations: Vec<VariationRecord>,
    #[serde(default)]
    pub whitelisted_bundles: Vec<BundleId>,
}

/// Asset database kept entirely in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    bundles: IndexMap<BundleId, BundleEntry>,
    bundle_names: FxHashMap<String, BundleId>,
    assets: IndexMap<Guid, AssetEntry>,
    asset_names: FxHashMap<String, Guid>,
    chunks: IndexMap<Guid, ChunkEntry>,
    resources: IndexMap<ResourceId, ResEntry>,
    res_names: FxHashMap<String, ResourceId>,
    type_parents: FxHashMap<String, String>,
    mesh_variations: FxHashMap<Guid, Vec<KnownVariation>>,
    whitelisted: IndexSet<BundleId>,
}

fn push_unique<T: PartialEq>(list: &mut Vec<T>, value: T) {
    if !list.contains(&value) {
        list.push(value);
    }
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: DatabaseSnapshot) -> Self {
        let mut db = Self::new();
        for bundle in snapshot.bundles {
            db.insert_bundle(bundle);
        }
        for asset in snapshot.assets {
            db.add_asset(asset);
        }
        for chunk in snapshot.chunks {
            db.add_chunk(chunk);
        }
        for res in snapshot.resources {
            db.add_res(res);
        }
        for decl in snapshot.types {
            db.declare_type(&decl.name, &decl.parent);
        }
        for record in snapshot.mesh_variations {
            db.mesh_variations.insert(record.mesh, record.variations);
        }
        db.whitelisted.extend(snapshot.whitelisted_bundles);
        db
    }

    pub fn to_snapshot(&self) -> DatabaseSnapshot {
        let mut types: Vec<TypeDeclaration> = self
            .type_parents
            .iter()
            .map(|(name, parent)| TypeDeclaration {
                name: name.clone(),
                parent: parent.clone(),
            })
            .collect();
        types.sort_by(|a, b| a.name.cmp(&b.name));

        DatabaseSnapshot {
            bundles: self.bundles.values().cloned().collect(),
            assets: self.assets.values().cloned().collect(),
            chunks: self.chunks.values().cloned().collect(),
            resources: self.resources.values().cloned().collect(),
            types,
            mesh_variations: self
                .mesh_variations
                .iter()
                .map(|(mesh, variations)| VariationRecord {
                    mesh: *mesh,
                    variations: variations.clone(),
                })
                .collect(),
            whitelisted_bundles: self.whitelisted.iter().copied().collect(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read database snapshot {}", path.display()))?;
        let snapshot: DatabaseSnapshot = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse database snapshot {}", path.display()))?;
        debug!(
            "Loaded {} bundles and {} assets from {}",
            snapshot.bundles.len(),
            snapshot.assets.len(),
            path.display()
        );
        Ok(Self::from_snapshot(snapshot))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(&self.to_snapshot())?;
        fs::write(path, text)
            .with_context(|| format!("Failed to write database snapshot {}", path.display()))
    }

    /// Registers a bundle under the next free id
    pub fn add_bundle(&mut self, name: &str, kind: BundleKind, blueprint: Option<Guid>) -> BundleId {
        // Snapshot ids may be sparse
        let next = self
            .bundles
            .keys()
            .map(|id| id.as_u32() + 1)
            .max()
            .unwrap_or_default();
        let id = BundleId::new(next);
        self.insert_bundle(BundleEntry {
            id,
            name: name.to_owned(),
            kind,
            blueprint,
        });
        id
    }

    fn insert_bundle(&mut self, bundle: BundleEntry) {
        self.bundle_names.insert(bundle.name.clone(), bundle.id);
        self.bundles.insert(bundle.id, bundle);
    }

    pub fn set_bundle_blueprint(&mut self, id: BundleId, blueprint: Guid) {
        if let Some(bundle) = self.bundles.get_mut(&id) {
            bundle.blueprint = Some(blueprint);
        }
    }

    pub fn add_asset(&mut self, asset: AssetEntry) {
        self.asset_names.insert(asset.name.clone(), asset.guid);
        self.assets.insert(asset.guid, asset);
    }

    pub fn add_chunk(&mut self, chunk: ChunkEntry) {
        self.chunks.insert(chunk.id, chunk);
    }

    pub fn add_res(&mut self, res: ResEntry) {
        self.res_names.insert(res.name.clone(), res.rid);
        self.resources.insert(res.rid, res);
    }

    pub fn declare_type(&mut self, name: &str, parent: &str) {
        self.type_parents.insert(name.to_owned(), parent.to_owned());
    }

    pub fn add_mesh_variations(&mut self, mesh: Guid, variations: Vec<KnownVariation>) {
        self.mesh_variations.insert(mesh, variations);
    }

    pub fn whitelisted_bundles(&self) -> impl Iterator<Item = BundleId> + '_ {
        self.whitelisted.iter().copied()
    }

    fn asset_mut(&mut self, guid: Guid) -> Result<&mut AssetEntry> {
        self.assets
            .get_mut(&guid)
            .ok_or_else(|| anyhow!("Unknown asset {guid}"))
    }

    fn chunk_mut(&mut self, id: Guid) -> Result<&mut ChunkEntry> {
        self.chunks
            .get_mut(&id)
            .ok_or_else(|| anyhow!("Unknown chunk {id}"))
    }

    fn res_mut(&mut self, rid: ResourceId) -> Result<&mut ResEntry> {
        self.resources
            .get_mut(&rid)
            .ok_or_else(|| anyhow!("Unknown resource {:#x}", rid.as_u64()))
    }
}

impl AssetDatabase for MemoryDatabase {
    fn bundle(&self, id: BundleId) -> Option<&BundleEntry> {
        self.bundles.get(&id)
    }

    fn bundle_id(&self, name: &str) -> Option<BundleId> {
        self.bundle_names.get(name).copied()
    }

    fn bundles(&self) -> Vec<BundleId> {
        self.bundles.keys().copied().collect()
    }

    fn asset(&self, guid: Guid) -> Option<&AssetEntry> {
        self.assets.get(&guid)
    }

    fn asset_by_name(&self, name: &str) -> Option<&AssetEntry> {
        self.asset_names
            .get(name)
            .and_then(|guid| self.assets.get(guid))
    }

    fn assets_in_bundle(&self, bundle: BundleId) -> Vec<Guid> {
        self.assets
            .values()
            .filter(|a| a.is_in_bundle(bundle))
            .map(|a| a.guid)
            .collect()
    }

    fn assets_of_type(&self, type_name: &str, modified_only: bool) -> Vec<Guid> {
        self.assets
            .values()
            .filter(|a| !modified_only || a.is_modified())
            .filter(|a| type_name.is_empty() || self.is_subtype_of(&a.type_name, type_name))
            .map(|a| a.guid)
            .collect()
    }

    fn modify_ebx(&mut self, guid: Guid, content: EbxAsset) -> Result<()> {
        let entry = self.asset_mut(guid)?;
        match &mut entry.modified {
            Some(modified) => modified.data = content,
            None => {
                entry.modified = Some(ModifiedEntry {
                    data: content,
                    dependent_assets: Vec::new(),
                });
            }
        }
        Ok(())
    }

    fn revert_asset(&mut self, guid: Guid) -> Result<()> {
        let entry = self.asset_mut(guid)?;
        entry.modified = None;
        entry.added_bundles.clear();
        entry.linked.clear();
        Ok(())
    }

    fn add_asset_to_bundle(&mut self, guid: Guid, bundle: BundleId) -> Result<()> {
        let entry = self.asset_mut(guid)?;
        if !entry.bundles.contains(&bundle) {
            push_unique(&mut entry.added_bundles, bundle);
        }
        Ok(())
    }

    fn clear_added_bundles(&mut self, guid: Guid) -> Result<()> {
        self.asset_mut(guid)?.added_bundles.clear();
        Ok(())
    }

    fn add_dependent(&mut self, owner: Guid, dependent: Guid) -> Result<()> {
        let entry = self.asset_mut(owner)?;
        let modified = entry
            .modified
            .as_mut()
            .ok_or_else(|| anyhow!("Asset {owner} has no edits to attach {dependent} to"))?;
        push_unique(&mut modified.dependent_assets, dependent);
        Ok(())
    }

    fn link_asset(&mut self, guid: Guid, target: LinkTarget) -> Result<()> {
        push_unique(&mut self.asset_mut(guid)?.linked, target);
        Ok(())
    }

    fn chunk(&self, id: Guid) -> Option<&ChunkEntry> {
        self.chunks.get(&id)
    }

    fn chunks(&self) -> Vec<Guid> {
        self.chunks.keys().copied().collect()
    }

    fn add_chunk_to_bundle(&mut self, id: Guid, bundle: BundleId) -> Result<()> {
        let chunk = self.chunk_mut(id)?;
        if !chunk.bundles.contains(&bundle) {
            push_unique(&mut chunk.added_bundles, bundle);
        }
        Ok(())
    }

    fn set_chunk_first_mip(&mut self, id: Guid, first_mip: i32) -> Result<()> {
        self.chunk_mut(id)?.first_mip = first_mip;
        Ok(())
    }

    fn chunk_data(&self, id: Guid) -> Option<Vec<u8>> {
        self.chunks
            .get(&id)
            .map(|c| c.modified_data.clone().unwrap_or_else(|| c.data.clone()))
    }

    fn modify_chunk(&mut self, id: Guid, data: Vec<u8>) -> Result<()> {
        self.chunk_mut(id)?.modified_data = Some(data);
        Ok(())
    }

    fn clear_chunk_added_bundles(&mut self, id: Guid) -> Result<()> {
        self.chunk_mut(id)?.added_bundles.clear();
        Ok(())
    }

    fn res(&self, rid: ResourceId) -> Option<&ResEntry> {
        self.resources.get(&rid)
    }

    fn res_by_name(&self, name: &str) -> Option<&ResEntry> {
        self.res_names
            .get(name)
            .and_then(|rid| self.resources.get(rid))
    }

    fn resources(&self) -> Vec<ResourceId> {
        self.resources.keys().copied().collect()
    }

    fn add_res_to_bundle(&mut self, rid: ResourceId, bundle: BundleId) -> Result<()> {
        let res = self.res_mut(rid)?;
        if !res.bundles.contains(&bundle) {
            push_unique(&mut res.added_bundles, bundle);
        }
        Ok(())
    }

    fn link_res(&mut self, rid: ResourceId, chunk: Guid) -> Result<()> {
        push_unique(&mut self.res_mut(rid)?.linked, chunk);
        Ok(())
    }

    fn clear_res_added_bundles(&mut self, rid: ResourceId) -> Result<()> {
        self.res_mut(rid)?.added_bundles.clear();
        Ok(())
    }

    fn type_ancestors(&self, type_name: &str) -> Vec<String> {
        let mut ancestors = Vec::new();
        let mut current = type_name;
        while let Some(parent) = self.type_parents.get(current) {
            // Guard against a malformed, cyclic type table
            if parent == type_name || ancestors.contains(parent) {
                break;
            }
            ancestors.push(parent.clone());
            current = parent.as_str();
        }
        ancestors
    }

    fn mesh_variations(&self, mesh: Guid) -> Option<&[KnownVariation]> {
        self.mesh_variations.get(&mesh).map(Vec::as_slice)
    }

    fn whitelist_bundle(&mut self, bundle: BundleId) {
        self.whitelisted.insert(bundle);
    }

    fn clear_whitelist(&mut self) {
        self.whitelisted.clear();
    }
}
