//! The asset database collaborator
//!
//! Bundle compilation never owns asset data. It reads entries through the
//! [`AssetDatabase`] trait and requests every mutation (bundle membership,
//! modified content, links) through it, so the same compiler drives the
//! in-memory [`MemoryDatabase`] used by the CLI and tests or any other store.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::types::{BundleEntry, BundleId, Guid, ResourceId};

mod memory;
pub mod objects;


pub use memory::{DatabaseSnapshot, MemoryDatabase, TypeDeclaration, VariationRecord};
pub use objects::{EbxAsset, EbxObject, KnownVariation, ObjectData, ResPayload};

/// Child data an asset or resource pulls along when it is bundled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkTarget {
    Res(ResourceId),
    Chunk(Guid),
}

/// Edited state of an asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifiedEntry {
    pub data: EbxAsset,
    /// Assets whose packaging caused this edit
    #[serde(default)]
    pub dependent_assets: Vec<Guid>,
}

/// An ebx asset entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetEntry {
    pub guid: Guid,
    pub name: String,
    pub type_name: String,
    /// Bundles the asset originally ships in
    #[serde(default)]
    pub bundles: Vec<BundleId>,
    /// Bundles the asset was added to by tooling
    #[serde(default)]
    pub added_bundles: Vec<BundleId>,
    #[serde(default)]
    pub dependencies: Vec<Guid>,
    /// The asset does not exist in the base game
    #[serde(default)]
    pub is_added: bool,
    #[serde(default)]
    pub linked: Vec<LinkTarget>,
    pub content: EbxAsset,
    #[serde(default)]
    pub modified: Option<ModifiedEntry>,
}

impl AssetEntry {
    pub fn has_modified_data(&self) -> bool {
        self.modified.is_some()
    }

    pub fn is_modified(&self) -> bool {
        self.is_added || self.has_modified_data() || !self.added_bundles.is_empty()
    }

    /// Committed and tentatively added bundle memberships
    pub fn memberships(&self) -> impl Iterator<Item = BundleId> + '_ {
        self.bundles
            .iter()
            .chain(self.added_bundles.iter())
            .copied()
    }

    pub fn is_in_bundle(&self, bundle: BundleId) -> bool {
        self.bundles.contains(&bundle) || self.added_bundles.contains(&bundle)
    }

    /// Content as currently edited, falling back to the original
    pub fn current_content(&self) -> &EbxAsset {
        self.modified.as_ref().map_or(&self.content, |m| &m.data)
    }
}

/// A chunk (streamed payload) entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkEntry {
    pub id: Guid,
    #[serde(default)]
    pub bundles: Vec<BundleId>,
    #[serde(default)]
    pub added_bundles: Vec<BundleId>,
    #[serde(default)]
    pub is_added: bool,
    #[serde(default)]
    pub first_mip: i32,
    #[serde(default)]
    pub data: Vec<u8>,
    #[serde(default)]
    pub modified_data: Option<Vec<u8>>,
}

impl ChunkEntry {
    /// Chunks that are neither shipped anywhere nor added are not bundleable
    pub fn is_bundleable(&self) -> bool {
        !self.bundles.is_empty() || self.is_added
    }
}

/// A resource entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResEntry {
    pub rid: ResourceId,
    pub name: String,
    #[serde(default)]
    pub bundles: Vec<BundleId>,
    #[serde(default)]
    pub added_bundles: Vec<BundleId>,
    #[serde(default)]
    pub linked: Vec<Guid>,
    #[serde(default)]
    pub payload: ResPayload,
}

/// Everything bundle compilation needs from the asset store
pub trait AssetDatabase {
    fn bundle(&self, id: BundleId) -> Option<&BundleEntry>;

    /// Resolves a full bundle name (e.g. `win32/levels/harbor`) to its id
    fn bundle_id(&self, name: &str) -> Option<BundleId>;

    fn bundles(&self) -> Vec<BundleId>;

    fn asset(&self, guid: Guid) -> Option<&AssetEntry>;

    fn asset_by_name(&self, name: &str) -> Option<&AssetEntry>;

    /// Assets with a committed or added membership in `bundle`
    fn assets_in_bundle(&self, bundle: BundleId) -> Vec<Guid>;

    /// Assets of `type_name` or any subtype; an empty type matches every asset
    fn assets_of_type(&self, type_name: &str, modified_only: bool) -> Vec<Guid>;

    /// Current content of an asset
    fn ebx(&self, guid: Guid) -> Option<EbxAsset> {
        self.asset(guid).map(|entry| entry.current_content().clone())
    }

    /// Records `content` as the edited state of the asset
    fn modify_ebx(&mut self, guid: Guid, content: EbxAsset) -> Result<()>;

    /// Drops every edit of the asset, including added bundles
    fn revert_asset(&mut self, guid: Guid) -> Result<()>;

    fn add_asset_to_bundle(&mut self, guid: Guid, bundle: BundleId) -> Result<()>;

    fn clear_added_bundles(&mut self, guid: Guid) -> Result<()>;

    /// Remembers that editing `owner` was caused by packaging `dependent`
    fn add_dependent(&mut self, owner: Guid, dependent: Guid) -> Result<()>;

    fn link_asset(&mut self, guid: Guid, target: LinkTarget) -> Result<()>;

    fn chunk(&self, id: Guid) -> Option<&ChunkEntry>;

    fn chunks(&self) -> Vec<Guid>;

    fn add_chunk_to_bundle(&mut self, id: Guid, bundle: BundleId) -> Result<()>;

    fn set_chunk_first_mip(&mut self, id: Guid, first_mip: i32) -> Result<()>;

    /// Raw chunk bytes, edited data first
    fn chunk_data(&self, id: Guid) -> Option<Vec<u8>>;

    fn modify_chunk(&mut self, id: Guid, data: Vec<u8>) -> Result<()>;

    fn clear_chunk_added_bundles(&mut self, id: Guid) -> Result<()>;

    fn res(&self, rid: ResourceId) -> Option<&ResEntry>;

    fn res_by_name(&self, name: &str) -> Option<&ResEntry>;

    fn resources(&self) -> Vec<ResourceId>;

    fn add_res_to_bundle(&mut self, rid: ResourceId, bundle: BundleId) -> Result<()>;

    fn link_res(&mut self, rid: ResourceId, chunk: Guid) -> Result<()>;

    fn clear_res_added_bundles(&mut self, rid: ResourceId) -> Result<()>;

    /// Supertypes of `type_name`, nearest first, not including the type itself
    fn type_ancestors(&self, type_name: &str) -> Vec<String>;

    fn is_subtype_of(&self, type_name: &str, base: &str) -> bool {
        type_name == base || self.type_ancestors(type_name).iter().any(|t| t == base)
    }

    /// Variations the game already ships for a mesh
    fn mesh_variations(&self, mesh: Guid) -> Option<&[KnownVariation]>;

    /// Marks a bundle as touched so the mod writer includes it
    fn whitelist_bundle(&mut self, bundle: BundleId);

    fn clear_whitelist(&mut self);
}
