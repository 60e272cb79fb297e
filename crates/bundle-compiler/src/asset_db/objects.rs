//! Typed asset payloads
//!
//! Only the fields bundle compilation reads are modelled. Every object kind the
//! compiler does not care about lands in [`ObjectData::Other`] with its type name
//! preserved, so networked-type checks still work for it.

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::types::{Guid, ImportReference, ResourceId};

/// The content of one ebx asset. The first object is the root object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EbxAsset {
    pub file_guid: Guid,
    #[serde(default)]
    pub objects: Vec<EbxObject>,
}

/// One exported object instance inside an asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EbxObject {
    pub instance_guid: Guid,
    pub data: ObjectData,
}

/// A texture slot of a material, pointing at a texture asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextureParameter {
    pub parameter_name: String,
    pub value: ImportReference,
}

/// Where a pathfinding asset keeps its blob chunks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlobLayout {
    Single { blob: Guid },
    Many { blobs: Vec<Guid> },
}

impl BlobLayout {
    pub fn chunk_ids(&self) -> Vec<Guid> {
        match self {
            Self::Single { blob } => vec![*blob],
            Self::Many { blobs } => blobs.clone(),
        }
    }
}

/// Material row of a mesh-variation database entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariationMaterialEntry {
    pub material: ImportReference,
    #[serde(default)]
    pub texture_parameters: Vec<TextureParameter>,
}

/// One entry of a mesh-variation database aggregate
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariationEntry {
    #[serde(default)]
    pub mesh: Option<ImportReference>,
    #[serde(default)]
    pub materials: Vec<VariationMaterialEntry>,
}

/// Tagged object payloads, one variant per schema the compiler understands
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ObjectData {
    BundleCollection {
        bundles: Vec<String>,
    },
    LevelDescription {
        bundles: Vec<String>,
        #[serde(default)]
        is_menu: bool,
        #[serde(default)]
        is_coop: bool,
    },
    LevelData {
        #[serde(default)]
        unlock_ids: Vec<u32>,
    },
    SubWorldData,
    SubWorldReference {
        bundle_name: String,
    },
    SoundWave {
        chunks: Vec<Guid>,
    },
    MovieTexture {
        chunk: Guid,
        #[serde(default)]
        subtitle_chunk: Option<Guid>,
    },
    PathfindingBlob {
        blobs: BlobLayout,
    },
    Texture {
        resource: ResourceId,
    },
    AtlasTexture {
        resource: ResourceId,
    },
    SvgImage {
        resource: ResourceId,
    },
    Mesh {
        mesh_set_resource: ResourceId,
    },
    MeshMaterial {
        #[serde(default)]
        texture_parameters: Vec<TextureParameter>,
    },
    NetworkRegistry {
        #[serde(default)]
        objects: Vec<ImportReference>,
    },
    MeshVariationDatabase {
        #[serde(default)]
        entries: Vec<VariationEntry>,
    },
    Unlock {
        identifier: u32,
    },
    WorldPartInclusionCriterion {
        #[serde(default)]
        options: Vec<String>,
    },
    SubWorldInclusionSetting {
        #[serde(default)]
        enabled_options: Vec<String>,
    },
    Other {
        type_name: String,
    },
}

impl ObjectData {
    /// Runtime type name of the object
    pub fn type_name(&self) -> &str {
        match self {
            Self::BundleCollection { .. } => "BlueprintBundleCollection",
            Self::LevelDescription { .. } => "LevelDescriptionAsset",
            Self::LevelData { .. } => "LevelData",
            Self::SubWorldData => "SubWorldData",
            Self::SubWorldReference { .. } => "SubWorldReferenceObjectData",
            Self::SoundWave { .. } => "SoundWaveAsset",
            Self::MovieTexture { .. } => "MovieTextureAsset",
            Self::PathfindingBlob { .. } => "PathfindingBlobAsset",
            Self::Texture { .. } => "TextureAsset",
            Self::AtlasTexture { .. } => "AtlasTextureAsset",
            Self::SvgImage { .. } => "SvgImage",
            Self::Mesh { .. } => "MeshAsset",
            Self::MeshMaterial { .. } => "MeshMaterial",
            Self::NetworkRegistry { .. } => "NetworkRegistryAsset",
            Self::MeshVariationDatabase { .. } => "MeshVariationDatabase",
            Self::Unlock { .. } => "UnlockAssetBase",
            Self::WorldPartInclusionCriterion { .. } => "WorldPartInclusionCriterion",
            Self::SubWorldInclusionSetting { .. } => "SubWorldInclusionSetting",
            Self::Other { type_name } => type_name,
        }
    }

    /// External references held by this object
    fn references(&self) -> Vec<ImportReference> {
        match self {
            Self::MeshMaterial { texture_parameters } => {
                texture_parameters.iter().map(|p| p.value).collect()
            }
            Self::NetworkRegistry { objects } => objects.clone(),
            Self::MeshVariationDatabase { entries } => entries
                .iter()
                .flat_map(|entry| {
                    entry.mesh.into_iter().chain(entry.materials.iter().flat_map(|m| {
                        std::iter::once(m.material)
                            .chain(m.texture_parameters.iter().map(|p| p.value))
                    }))
                })
                .collect(),
            _ => Vec::new(),
        }
    }
}

impl EbxAsset {
    pub fn new(file_guid: Guid, objects: Vec<EbxObject>) -> Self {
        Self { file_guid, objects }
    }

    pub fn root(&self) -> Option<&EbxObject> {
        self.objects.first()
    }

    pub fn root_mut(&mut self) -> Option<&mut ObjectData> {
        self.objects.first_mut().map(|o| &mut o.data)
    }

    pub fn root_data(&self) -> Option<&ObjectData> {
        self.root().map(|o| &o.data)
    }

    pub fn root_instance_guid(&self) -> Option<Guid> {
        self.root().map(|o| o.instance_guid)
    }

    /// Looks up an exported object by its instance guid
    pub fn object(&self, instance_guid: Guid) -> Option<&EbxObject> {
        self.objects
            .iter()
            .find(|o| o.instance_guid == instance_guid)
    }

    /// Files this asset points into, in first-seen order, excluding itself
    pub fn dependencies(&self) -> IndexSet<Guid> {
        self.objects
            .iter()
            .flat_map(|o| o.data.references())
            .map(|r| r.file_guid)
            .filter(|guid| *guid != self.file_guid)
            .collect()
    }
}

/// Resource payload fields the packaging extensions read
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResPayload {
    Texture {
        chunk: Guid,
        #[serde(default)]
        first_mip: i32,
    },
    AtlasTexture {
        chunk: Guid,
    },
    MeshSet {
        /// Chunk of every LOD; a nil guid marks a LOD without streamed data
        #[serde(default)]
        lods: Vec<Guid>,
    },
    #[default]
    Opaque,
}

/// Material of a previously known mesh variation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownVariationMaterial {
    pub material_guid: Guid,
    #[serde(default)]
    pub texture_parameters: Vec<TextureParameter>,
}

/// A mesh variation already shipped by the game, used to fill in texture parameters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownVariation {
    #[serde(default)]
    pub materials: Vec<KnownVariationMaterial>,
}
