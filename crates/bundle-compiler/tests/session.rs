#![allow(clippy::disallowed_methods)]

use std::fs;

use bundle_compiler::{
    asset_db::{
        AssetDatabase, AssetEntry, EbxAsset, EbxObject, MemoryDatabase, ModifiedEntry, ObjectData,
    },
    cache::CacheManager,
    config::Config,
    operator::BundleOperator,
    types::{BundleId, BundleKind, Guid},
};
use pretty_assertions::assert_eq;
use serial_test::serial;
use tempfile::TempDir;

fn guid(n: u128) -> Guid {
    Guid::from_u128(n)
}

fn entry(id: u128, name: &str, root: ObjectData) -> AssetEntry {
    let file_guid = guid(id);
    AssetEntry {
        guid: file_guid,
        name: name.to_owned(),
        type_name: root.type_name().to_owned(),
        bundles: Vec::new(),
        added_bundles: Vec::new(),
        dependencies: Vec::new(),
        is_added: false,
        linked: Vec::new(),
        content: EbxAsset::new(
            file_guid,
            vec![EbxObject {
                instance_guid: guid(id + 0x1_0000),
                data: root,
            }],
        ),
        modified: None,
    }
}

fn other(type_name: &str) -> ObjectData {
    ObjectData::Other {
        type_name: type_name.to_owned(),
    }
}

fn modified(mut asset: AssetEntry) -> AssetEntry {
    asset.modified = Some(ModifiedEntry {
        data: asset.content.clone(),
        dependent_assets: Vec::new(),
    });
    asset
}

struct Harbor {
    db: MemoryDatabase,
    harbor: BundleId,
    props: BundleId,
}

/// A multiplayer level loading a shared bundle. The edited harbor layer now
/// references a crane shipped only with an unrelated prop bundle, and the crane
/// references a hook.
fn harbor() -> Harbor {
    let mut db = MemoryDatabase::new();
    let props = db.add_bundle("win32/props/harbor", BundleKind::None, None);
    let shared = db.add_bundle("win32/gameplay/shared", BundleKind::Shared, None);
    let harbor = db.add_bundle("win32/levels/mp/harbor", BundleKind::SubLevel, None);

    let mut level = entry(
        1,
        "Levels/MP/Harbor",
        ObjectData::LevelData {
            unlock_ids: Vec::new(),
        },
    );
    level.bundles = vec![harbor];
    db.add_asset(level);
    db.set_bundle_blueprint(harbor, guid(1));
    db.add_asset(entry(
        2,
        "Levels/MP/Harbor/Description",
        ObjectData::LevelDescription {
            bundles: vec!["Gameplay/Shared".to_owned()],
            is_menu: false,
            is_coop: false,
        },
    ));

    let mut hook = entry(3, "Props/Hook", other("PropAsset"));
    hook.bundles = vec![props];
    db.add_asset(hook);
    let mut crane = entry(4, "Props/Crane", other("PropAsset"));
    crane.bundles = vec![props];
    crane.dependencies = vec![guid(3)];
    db.add_asset(crane);

    let mut layer = modified(entry(5, "Levels/MP/Harbor/Layer", other("LayerData")));
    layer.bundles = vec![harbor];
    layer.dependencies = vec![guid(4)];
    db.add_asset(layer);

    let mut unlock = modified(entry(
        6,
        "Unlocks/Flare",
        ObjectData::Unlock { identifier: 40 },
    ));
    unlock.bundles = vec![shared];
    db.add_asset(unlock);

    Harbor { db, harbor, props }
}

fn config_in(dir: &TempDir) -> Config {
    let mut config = Config {
        profile: "harbor".to_owned(),
        cache_dir: Some(dir.path().to_path_buf()),
        ..Config::default()
    };
    config.compile.multiplayer = true;
    config
}

#[test]
fn test_generated_caches_load_in_a_new_session() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    let h = harbor();

    let mut caches = CacheManager::new(&config);
    let report = caches.generate(&h.db).unwrap();
    assert!(report.all_loaded(), "{report:?}");
    assert!(dir.path().join("harbor_Callstack.cache").is_file());

    let mut reloaded = CacheManager::new(&config);
    assert!(reloaded.load(&h.db).all_loaded());
    assert_eq!(reloaded.forest().len(), caches.forest().len());

    let root = reloaded.call_stack(h.harbor).unwrap();
    insta::assert_snapshot!(root.render().trim_end(), @r"
    win32/levels/mp/harbor
      win32/gameplay/shared
    ");
}

#[test]
fn test_missing_cache_directory_reports_missing_files() {
    let dir = TempDir::new().unwrap();
    let config = Config {
        cache_dir: Some(dir.path().join("never-written")),
        ..Config::default()
    };
    let h = harbor();
    let mut caches = CacheManager::new(&config);
    assert!(!caches.load(&h.db).all_loaded());
    assert!(caches.forest().is_empty());
}

#[test]
fn test_compile_packages_the_dependency_closure_and_survives_a_snapshot() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    let mut h = harbor();

    let caches = CacheManager::in_memory(&config, &h.db);
    let mut operator = BundleOperator::new(config, caches, &h.db);
    let summaries = operator.compile_all(&mut h.db).unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(
        summaries[0].packaged.get(&h.harbor),
        Some(&vec![guid(4), guid(3)])
    );
    for asset in [guid(3), guid(4)] {
        let entry = h.db.asset(asset).unwrap();
        assert_eq!(entry.added_bundles, vec![h.harbor]);
        assert_eq!(entry.bundles, vec![h.props]);
    }

    let path = dir.path().join("harbor.json");
    h.db.save(&path).unwrap();
    let mut restored = MemoryDatabase::load(&path).unwrap();
    assert_eq!(restored.to_snapshot(), h.db.to_snapshot());

    // A later session does not know what was packaged, clearing still undoes it
    let config = config_in(&dir);
    let caches = CacheManager::in_memory(&config, &restored);
    let mut operator = BundleOperator::new(config, caches, &restored);
    assert_eq!(operator.clear_all_bundling(&mut restored).unwrap(), 2);
    for asset in [guid(3), guid(4)] {
        assert!(!restored.asset(asset).unwrap().is_modified());
    }
    assert!(restored.asset(guid(5)).unwrap().has_modified_data());
}

#[test]
fn test_unlock_tables_by_level_name() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);
    let mut h = harbor();

    let caches = CacheManager::in_memory(&config, &h.db);
    let operator = BundleOperator::new(config, caches, &h.db);
    let root = operator.find_level("Harbor").cloned().unwrap();
    assert_eq!(operator.build_unlock_id_table(&mut h.db, &root).unwrap(), 1);

    let Some(ObjectData::LevelData { unlock_ids }) =
        h.db.ebx(guid(1)).and_then(|c| c.root_data().cloned())
    else {
        panic!("level lost its root");
    };
    assert_eq!(unlock_ids, vec![40]);
}

#[test]
#[serial]
fn test_config_file_and_environment_layers() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bundle-compiler.toml");
    fs::write(
        &path,
        r#"
profile = "kyber"

[compile]
multiplayer = true
singleplayer = false

[packaging]
mesh_blocks = true
"#,
    )
    .unwrap();

    let config = Config::load(Some(path.as_path())).unwrap();
    assert_eq!(config.profile, "kyber");
    assert!(config.compile.multiplayer);
    assert!(!config.compile.singleplayer);
    assert!(config.packaging.mesh_blocks);
    assert_eq!(config.platform, "win32");

    // SAFETY: serialized with every other test touching the environment
    unsafe {
        std::env::set_var("BUNDLE_COMPILER_PROFILE", "override");
        std::env::set_var("BUNDLE_COMPILER_CACHE_DIR", dir.path());
    }
    let config = Config::load(Some(path.as_path()));
    unsafe {
        std::env::remove_var("BUNDLE_COMPILER_PROFILE");
        std::env::remove_var("BUNDLE_COMPILER_CACHE_DIR");
    }
    let config = config.unwrap();
    assert_eq!(config.profile, "override");
    assert_eq!(
        config.cache_file("Level.cache"),
        dir.path().join("override_Level.cache")
    );
}

#[test]
#[serial]
fn test_missing_explicit_config_is_an_error() {
    let dir = TempDir::new().unwrap();
    assert!(Config::load(Some(dir.path().join("absent.toml").as_path())).is_err());
}
