use anyhow::Result;
use indexmap::IndexSet;
use pretty_assertions::assert_eq;

use super::*;
use crate::{
    asset_db::{
        LinkTarget, ObjectData, ResPayload,
        objects::{BlobLayout, KnownVariation, KnownVariationMaterial, TextureParameter},
    },
    config::{Config, PackagingOptions},
    test_support::Fixture,
    types::{BundleKind, ImportReference},
};

/// A level bundle owning a network registry (which marks `TriggerEntityData`
/// as networked) and a mesh-variation database
struct Harness {
    fx: Fixture,
    level: BundleId,
    registry: Guid,
    variations: Guid,
    caches: CacheManager,
    dispatcher: Dispatcher,
    options: PackagingOptions,
    pure_bundled: IndexSet<Guid>,
}

impl Harness {
    fn new() -> Self {
        let mut fx = Fixture::new();
        let level = fx.bundle("win32/levels/harbor", BundleKind::SubLevel);
        let trigger = fx
            .asset("Levels/Harbor/Trigger", "TriggerEntityData")
            .bundles(&[level])
            .insert();
        let trigger_root = fx
            .db
            .asset(trigger)
            .and_then(|e| e.content.root_instance_guid())
            .unwrap();
        let registry = fx
            .asset("Levels/Harbor/Registry", "NetworkRegistryAsset")
            .bundles(&[level])
            .objects(vec![ObjectData::NetworkRegistry {
                objects: vec![ImportReference::new(trigger, trigger_root)],
            }])
            .insert();
        let variations = fx
            .asset("Levels/Harbor/Variations", "MeshVariationDatabase")
            .bundles(&[level])
            .objects(vec![ObjectData::MeshVariationDatabase {
                entries: Vec::new(),
            }])
            .insert();
        fx.db.declare_type("TextureAsset", "TextureBaseAsset");
        fx.db.declare_type("SkinnedMeshAsset", "MeshAsset");
        fx.db.declare_type("MeshAsset", "DataContainer");

        let caches = CacheManager::in_memory(&Config::default(), &fx.db);
        Self {
            fx,
            level,
            registry,
            variations,
            caches,
            dispatcher: Dispatcher::default(),
            options: PackagingOptions::default(),
            pure_bundled: IndexSet::new(),
        }
    }

    fn target(&self) -> CallStack {
        CallStack::leaf(self.fx.db.bundle(self.level).unwrap().clone())
    }

    fn package(&mut self, asset: Guid) -> Result<()> {
        let target = self.target();
        let mut ctx = PackagingContext {
            db: &mut self.fx.db,
            caches: &self.caches,
            options: &self.options,
            dispatcher: &self.dispatcher,
            pure_bundled: &mut self.pure_bundled,
        };
        ctx.add_to_bundle(asset, &target)
    }

    fn registry_objects(&self) -> Vec<ImportReference> {
        match self.fx.db.ebx(self.registry).and_then(|c| c.root_data().cloned()) {
            Some(ObjectData::NetworkRegistry { objects }) => objects,
            other => panic!("unexpected registry root {other:?}"),
        }
    }
}

#[test]
fn test_extension_lookup_prefers_exact_then_nearest_supertype() {
    let h = Harness::new();
    let lookup = |type_name: &str| {
        h.dispatcher
            .extension_for(&h.fx.db, type_name)
            .unwrap()
            .asset_type()
    };

    assert_eq!(lookup("AtlasTextureAsset"), "AtlasTextureAsset");
    assert_eq!(lookup("TextureAsset"), "TextureBaseAsset");
    assert_eq!(lookup("SkinnedMeshAsset"), "MeshAsset");
    assert_eq!(lookup("SoldierWeaponUnlockAsset"), DEFAULT_EXTENSION);
}

#[test]
fn test_missing_default_extension_is_an_error() {
    let h = Harness::new();
    let dispatcher = Dispatcher::with_extensions(vec![Box::new(SoundWaveExtension)]);
    assert!(dispatcher.extension_for(&h.fx.db, "SoundWaveAsset").is_ok());
    let err = dispatcher
        .extension_for(&h.fx.db, "BlueprintAsset")
        .unwrap_err();
    assert!(err.to_string().contains("BlueprintAsset"), "{err}");
}

#[test]
fn test_unknown_asset_cannot_be_packaged() {
    let mut h = Harness::new();
    let missing = h.fx.next_guid();
    assert!(h.package(missing).is_err());
}

#[test]
fn test_default_packaging_records_pure_bundled_assets() {
    let mut h = Harness::new();
    let plain = h.fx.asset("Gameplay/Crate", "PropAsset").insert();
    let edited = h
        .fx
        .asset("Gameplay/Barrel", "PropAsset")
        .modified()
        .insert();

    h.package(plain).unwrap();
    h.package(edited).unwrap();

    let plain_entry = h.fx.db.asset(plain).unwrap();
    assert_eq!(plain_entry.added_bundles, vec![h.level]);
    assert!(plain_entry.has_modified_data());
    assert!(h.pure_bundled.contains(&plain));
    assert!(!h.pure_bundled.contains(&edited));
}

#[test]
fn test_networked_objects_are_registered_once() {
    let mut h = Harness::new();
    let door = h
        .fx
        .asset("Gameplay/Door", "BlueprintAsset")
        .objects(vec![
            ObjectData::Other {
                type_name: "BlueprintAsset".to_owned(),
            },
            ObjectData::Other {
                type_name: "TriggerEntityData".to_owned(),
            },
        ])
        .insert();
    let door_trigger = h.fx.db.asset(door).unwrap().content.objects[1].instance_guid;

    h.package(door).unwrap();
    h.package(door).unwrap();

    let objects = h.registry_objects();
    assert_eq!(objects.len(), 2);
    assert_eq!(objects[1], ImportReference::new(door, door_trigger));
    let registry = h.fx.db.asset(h.registry).unwrap();
    assert_eq!(
        registry.modified.as_ref().unwrap().dependent_assets,
        vec![door]
    );
}

#[test]
fn test_assets_without_networked_objects_leave_registry_alone() {
    let mut h = Harness::new();
    let crate_asset = h.fx.asset("Gameplay/Crate", "PropAsset").insert();
    h.package(crate_asset).unwrap();

    assert_eq!(h.registry_objects().len(), 1);
    // The registry is still edited, so the dependent is recorded
    let registry = h.fx.db.asset(h.registry).unwrap();
    assert_eq!(
        registry.modified.as_ref().unwrap().dependent_assets,
        vec![crate_asset]
    );
}

#[test]
fn test_sound_wave_links_only_bundleable_chunks() {
    let mut h = Harness::new();
    let other = h.fx.bundle("win32/sound/common", BundleKind::Shared);
    let shipped = h.fx.chunk(&[other]);
    let orphan = h.fx.chunk(&[]);
    let wave = h
        .fx
        .asset("Sound/Horn", "SoundWaveAsset")
        .objects(vec![ObjectData::SoundWave {
            chunks: vec![shipped, orphan],
        }])
        .insert();

    h.package(wave).unwrap();

    assert_eq!(h.fx.db.chunk(shipped).unwrap().added_bundles, vec![h.level]);
    assert!(h.fx.db.chunk(orphan).unwrap().added_bundles.is_empty());
    assert_eq!(
        h.fx.db.asset(wave).unwrap().linked,
        vec![LinkTarget::Chunk(shipped)]
    );
    // Sound waves never touch the registry
    assert!(h.fx.db.asset(h.registry).unwrap().modified.is_none());
}

#[test]
fn test_movie_links_its_chunk_even_when_unbundleable() {
    let mut h = Harness::new();
    let movie_chunk = h.fx.chunk(&[]);
    let subtitles = h.fx.chunk(&[]);
    let movie = h
        .fx
        .asset("Movies/Intro", "MovieTextureBaseAsset")
        .objects(vec![ObjectData::MovieTexture {
            chunk: movie_chunk,
            subtitle_chunk: Some(subtitles),
        }])
        .insert();

    h.package(movie).unwrap();

    assert!(h.fx.db.chunk(movie_chunk).unwrap().added_bundles.is_empty());
    assert_eq!(
        h.fx.db.chunk(subtitles).unwrap().added_bundles,
        vec![h.level]
    );
    assert_eq!(
        h.fx.db.asset(movie).unwrap().linked,
        vec![LinkTarget::Chunk(movie_chunk), LinkTarget::Chunk(subtitles)]
    );
}

#[test]
fn test_pathfinding_blobs_are_rewritten() {
    let mut h = Harness::new();
    let first = h.fx.chunk(&[]);
    let second = h.fx.chunk(&[]);
    let blob = h
        .fx
        .asset("Levels/Harbor/Navmesh", "PathfindingBlobAsset")
        .objects(vec![ObjectData::PathfindingBlob {
            blobs: BlobLayout::Many {
                blobs: vec![first, second],
            },
        }])
        .insert();

    h.package(blob).unwrap();

    for chunk in [first, second] {
        let entry = h.fx.db.chunk(chunk).unwrap();
        assert_eq!(entry.added_bundles, vec![h.level]);
        assert_eq!(entry.modified_data.as_deref(), Some(&[1, 2, 3][..]));
    }
}

#[test]
fn test_pathfinding_with_missing_chunk_fails() {
    let mut h = Harness::new();
    let missing = h.fx.next_guid();
    let blob = h
        .fx
        .asset("Levels/Harbor/Navmesh", "PathfindingBlobAsset")
        .objects(vec![ObjectData::PathfindingBlob {
            blobs: BlobLayout::Single { blob: missing },
        }])
        .insert();

    assert!(h.package(blob).is_err());
}

#[test]
fn test_texture_bundles_resource_chunk_and_first_mip() {
    let mut h = Harness::new();
    let other = h.fx.bundle("win32/ui/common", BundleKind::Shared);
    let chunk = h.fx.chunk(&[other]);
    let res = h.fx.res(
        "ui/textures/logo",
        ResPayload::Texture {
            chunk,
            first_mip: 3,
        },
    );
    let texture = h
        .fx
        .asset("UI/Textures/Logo", "TextureAsset")
        .objects(vec![ObjectData::Texture { resource: res }])
        .insert();

    h.package(texture).unwrap();

    let res_entry = h.fx.db.res(res).unwrap();
    assert_eq!(res_entry.added_bundles, vec![h.level]);
    assert_eq!(res_entry.linked, vec![chunk]);
    let chunk_entry = h.fx.db.chunk(chunk).unwrap();
    assert_eq!(chunk_entry.added_bundles, vec![h.level]);
    assert_eq!(chunk_entry.first_mip, 3);
    assert_eq!(
        h.fx.db.asset(texture).unwrap().linked,
        vec![LinkTarget::Res(res)]
    );
}

#[test]
fn test_atlas_texture_keeps_first_mip() {
    let mut h = Harness::new();
    let chunk = h.fx.chunk(&[]);
    let res = h.fx.res("ui/atlas", ResPayload::AtlasTexture { chunk });
    let atlas = h
        .fx
        .asset("UI/Atlas", "AtlasTextureAsset")
        .objects(vec![ObjectData::AtlasTexture { resource: res }])
        .insert();

    h.package(atlas).unwrap();

    let chunk_entry = h.fx.db.chunk(chunk).unwrap();
    assert!(chunk_entry.added_bundles.is_empty());
    assert_eq!(chunk_entry.first_mip, 0);
    assert_eq!(h.fx.db.res(res).unwrap().linked, vec![chunk]);
}

#[test]
fn test_svg_image_bundles_its_resource() {
    let mut h = Harness::new();
    let res = h.fx.res("ui/icons/star", ResPayload::Opaque);
    let svg = h
        .fx
        .asset("UI/Icons/Star", "SvgImage")
        .objects(vec![ObjectData::SvgImage { resource: res }])
        .insert();

    h.package(svg).unwrap();

    assert_eq!(h.fx.db.res(res).unwrap().added_bundles, vec![h.level]);
    assert_eq!(h.fx.db.asset(svg).unwrap().linked, vec![LinkTarget::Res(res)]);
}

#[test]
fn test_mesh_bundles_lods_and_optional_blocks() {
    let mut h = Harness::new();
    h.options.mesh_blocks = true;
    let other = h.fx.bundle("win32/props/common", BundleKind::Shared);
    let lod0 = h.fx.chunk(&[other]);
    let lod1 = h.fx.chunk(&[]);
    let mesh_set = h.fx.res(
        "props/barrel_mesh",
        ResPayload::MeshSet {
            lods: vec![lod0, Guid::nil(), lod1],
        },
    );
    let blocks = h.fx.res("props/barrel_mesh/blocks", ResPayload::Opaque);
    let mesh = h
        .fx
        .asset("Props/Barrel", "MeshAsset")
        .objects(vec![ObjectData::Mesh {
            mesh_set_resource: mesh_set,
        }])
        .insert();

    h.package(mesh).unwrap();

    let set = h.fx.db.res(mesh_set).unwrap();
    assert_eq!(set.added_bundles, vec![h.level]);
    assert_eq!(set.linked, vec![lod0]);
    assert_eq!(h.fx.db.chunk(lod0).unwrap().added_bundles, vec![h.level]);
    assert!(h.fx.db.chunk(lod1).unwrap().added_bundles.is_empty());
    assert_eq!(h.fx.db.res(blocks).unwrap().added_bundles, vec![h.level]);
}

#[test]
fn test_mesh_variation_borrows_known_texture_parameters() {
    let mut h = Harness::new();
    let shared = h.fx.bundle("win32/textures/shared", BundleKind::Shared);
    let loose = h.fx.bundle("win32/textures/loose", BundleKind::None);
    let shared_texture = h
        .fx
        .asset("Textures/Shared", "TextureAsset")
        .bundles(&[shared])
        .insert();
    let loose_texture = h
        .fx
        .asset("Textures/Loose", "PropAsset")
        .bundles(&[loose])
        .insert();
    let mesh_set = h.fx.res("props/crate_mesh", ResPayload::MeshSet { lods: Vec::new() });
    let mesh = h
        .fx
        .asset("Props/Crate", "MeshAsset")
        .objects(vec![
            ObjectData::Mesh {
                mesh_set_resource: mesh_set,
            },
            ObjectData::MeshMaterial {
                texture_parameters: Vec::new(),
            },
        ])
        .insert();
    let (mesh_root, material) = {
        let objects = &h.fx.db.asset(mesh).unwrap().content.objects;
        (objects[0].instance_guid, objects[1].instance_guid)
    };
    let parameter = |name: &str, texture: Guid| TextureParameter {
        parameter_name: name.to_owned(),
        value: ImportReference::new(texture, Guid::nil()),
    };
    h.fx.db.add_mesh_variations(
        mesh,
        vec![KnownVariation {
            materials: vec![KnownVariationMaterial {
                material_guid: material,
                texture_parameters: vec![
                    parameter("Diffuse", shared_texture),
                    parameter("Normal", loose_texture),
                ],
            }],
        }],
    );

    h.package(mesh).unwrap();
    // A second packaging finds the mesh already registered
    h.package(mesh).unwrap();

    let Some(ObjectData::MeshVariationDatabase { entries }) = h
        .fx
        .db
        .ebx(h.variations)
        .and_then(|c| c.root_data().cloned())
    else {
        panic!("variation database lost its root");
    };
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].mesh, Some(ImportReference::new(mesh, mesh_root)));
    assert_eq!(entries[0].materials.len(), 1);
    assert_eq!(entries[0].materials[0].texture_parameters.len(), 2);

    // Shared textures are left to their bundle, others are packaged
    assert!(h.fx.db.asset(shared_texture).unwrap().added_bundles.is_empty());
    assert_eq!(
        h.fx.db.asset(loose_texture).unwrap().added_bundles,
        vec![h.level]
    );
}
