//! Tests for cache persistence

use std::{fs, path::Path};

use byteorder::{LittleEndian, WriteBytesExt};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

use super::*;
use crate::{
    asset_db::{AssetDatabase, ObjectData},
    config::Config,
    test_support::Fixture,
    types::{BundleKind, ImportReference},
};

fn config_in(dir: &Path) -> Config {
    Config {
        profile: "test".to_owned(),
        cache_dir: Some(dir.to_path_buf()),
        ..Config::default()
    }
}

/// A menu level loading a shared bundle that owns a network registry, and an
/// unlock asset
fn menu_fixture() -> Fixture {
    let mut fx = Fixture::new();
    let shared = fx.bundle("win32/gameplay/shared", BundleKind::Shared);

    let target = fx
        .asset("Gameplay/Trigger", "TriggerEntityData")
        .bundles(&[shared])
        .insert();
    let target_instance = fx
        .db
        .asset(target)
        .and_then(|e| e.content.root_instance_guid())
        .unwrap();
    let reference = ImportReference::new(target, target_instance);
    fx.asset("Gameplay/Registry", "NetworkRegistryAsset")
        .bundles(&[shared])
        .objects(vec![ObjectData::NetworkRegistry {
            objects: vec![reference, reference],
        }])
        .insert();

    fx.asset("Unlocks/Rifle", "UnlockAssetBase")
        .bundles(&[shared])
        .objects(vec![ObjectData::Unlock { identifier: 77 }])
        .insert();

    fx.blueprint_bundle(
        "win32/levels/frontend",
        BundleKind::SubLevel,
        "Levels/Frontend",
        ObjectData::LevelData {
            unlock_ids: Vec::new(),
        },
        Vec::new(),
    );
    fx.asset("Levels/Frontend/Description", "LevelDescriptionAsset")
        .objects(vec![ObjectData::LevelDescription {
            bundles: vec!["Gameplay/Shared".to_owned()],
            is_menu: true,
            is_coop: false,
        }])
        .insert();
    fx
}

fn write_raw(path: &Path, magic: i32, version: i32, body: &[u8]) {
    let mut bytes = Vec::new();
    bytes.write_i32::<LittleEndian>(magic).unwrap();
    bytes.write_i32::<LittleEndian>(version).unwrap();
    bytes.extend_from_slice(body);
    fs::write(path, bytes).unwrap();
}

#[test]
fn test_generate_then_load_round_trips() {
    let dir = TempDir::new().unwrap();
    let config = config_in(dir.path());
    let fx = menu_fixture();

    let mut manager = CacheManager::new(&config);
    let report = manager.generate(&fx.db).unwrap();
    assert!(report.all_loaded(), "{report:?}");

    let mut reloaded = CacheManager::new(&config);
    let report = reloaded.load(&fx.db);
    assert!(report.all_loaded(), "{report:?}");

    let roots: Vec<String> = reloaded
        .forest()
        .roots()
        .iter()
        .map(|r| r.render())
        .collect();
    insta::assert_snapshot!(roots.join("---\n"), @r"
    win32/levels/frontend
      win32/gameplay/shared
    ");

    let shared = fx.db.bundle_id("win32/gameplay/shared").unwrap();
    let registry = fx.db.asset_by_name("Gameplay/Registry").unwrap().guid;
    assert_eq!(reloaded.networked_registry("win32/gameplay/shared"), Some(registry));
    assert_eq!(reloaded.network_references(shared).map(<[_]>::len), Some(1));
    assert!(reloaded.is_networked_type("TriggerEntityData"));
    assert_eq!(reloaded.unlock_ids().id_of("Unlocks/Rifle"), Some(77));

    let frontend = fx.db.bundle_id("win32/levels/frontend").unwrap();
    assert_eq!(
        reloaded.level_types().category(frontend),
        Some(LevelCategory::Menu)
    );
}

#[test]
fn test_in_memory_matches_generated() {
    let dir = TempDir::new().unwrap();
    let config = config_in(dir.path());
    let fx = menu_fixture();

    let in_memory = CacheManager::in_memory(&config, &fx.db);
    let mut generated = CacheManager::new(&config);
    generated.generate(&fx.db).unwrap();

    let render = |manager: &CacheManager| -> Vec<String> {
        manager.forest().roots().iter().map(|r| r.render()).collect()
    };
    assert_eq!(render(&in_memory), render(&generated));
    assert_eq!(
        in_memory.unlock_ids().id_of("Unlocks/Rifle"),
        generated.unlock_ids().id_of("Unlocks/Rifle")
    );
}

#[test]
fn test_missing_files_report_missing() {
    let dir = TempDir::new().unwrap();
    let fx = menu_fixture();
    let mut manager = CacheManager::new(&config_in(dir.path()));

    let report = manager.load(&fx.db);
    assert_eq!(report.call_stacks, CacheStatus::Missing);
    assert_eq!(report.level_types, CacheStatus::Missing);
    assert!(!report.all_loaded());
    assert!(manager.forest().is_empty());
}

#[test]
fn test_wrong_version_is_stale_and_leaves_forest_empty() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("test_Callstack.cache");
    write_raw(&path, cache_magic("YW_CallStackCache"), CACHE_VERSION - 1, &[0; 8]);

    let fx = menu_fixture();
    let mut cache = CallStackCache::default();
    assert_eq!(cache.load(&path, &fx.db), CacheStatus::Stale);
    assert!(cache.forest().is_empty());
}

#[test]
fn test_wrong_magic_is_stale() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("test_Level.cache");
    write_raw(&path, cache_magic("YW_IdCache"), CACHE_VERSION, &[0; 16]);

    let mut cache = LevelTypeCache::default();
    assert_eq!(cache.load(&path), CacheStatus::Stale);
}

#[test]
fn test_truncated_body_is_stale() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("test_IdCache.cache");
    // One entry announced, half a guid present
    let mut body = Vec::new();
    body.write_i32::<LittleEndian>(1).unwrap();
    body.extend_from_slice(&[0xAB; 8]);
    write_raw(&path, cache_magic("YW_IdCache"), CACHE_VERSION, &body);

    let fx = menu_fixture();
    let mut cache = UnlockIdCache::default();
    assert_eq!(cache.load(&path, &fx.db), CacheStatus::Stale);
    assert!(cache.is_empty());
}

#[test]
fn test_one_stale_cache_does_not_affect_others() {
    let dir = TempDir::new().unwrap();
    let config = config_in(dir.path());
    let fx = menu_fixture();
    CacheManager::new(&config).generate(&fx.db).unwrap();

    write_raw(
        &config.cache_file("Reference.cache"),
        cache_magic("YW_RefCache"),
        999,
        &[],
    );

    let mut manager = CacheManager::new(&config);
    let report = manager.load(&fx.db);
    assert_eq!(report.references, CacheStatus::Stale);
    assert_eq!(report.call_stacks, CacheStatus::Loaded);
    assert_eq!(report.bundles, CacheStatus::Loaded);
    assert_eq!(manager.forest().len(), 1);
}

#[test]
fn test_existing_networked_type_list_is_kept() {
    let dir = TempDir::new().unwrap();
    let config = config_in(dir.path());
    let types_path = config.cache_file("NetworkedTypes.txt");
    fs::write(&types_path, "CuratedType\n").unwrap();

    let fx = menu_fixture();
    let mut manager = CacheManager::new(&config);
    manager.generate(&fx.db).unwrap();

    assert_eq!(fs::read_to_string(&types_path).unwrap(), "CuratedType\n");
    assert!(manager.is_networked_type("CuratedType"));
    assert!(!manager.is_networked_type("TriggerEntityData"));
}

#[test]
fn test_renamed_bundle_drops_its_subtree() {
    let dir = TempDir::new().unwrap();
    let config = config_in(dir.path());
    let fx = menu_fixture();
    CacheManager::new(&config).generate(&fx.db).unwrap();

    // A database without the shared bundle still resolves the level root
    let mut other = Fixture::new();
    other.blueprint_bundle(
        "win32/levels/frontend",
        BundleKind::SubLevel,
        "Levels/Frontend",
        ObjectData::LevelData {
            unlock_ids: Vec::new(),
        },
        Vec::new(),
    );

    let mut cache = CallStackCache::default();
    let status = cache.load(&config.cache_file("Callstack.cache"), &other.db);
    assert_eq!(status, CacheStatus::Loaded);
    assert_eq!(cache.forest().len(), 1);
    assert!(cache.forest().roots()[0].children().is_empty());
}
