//! Layered configuration
//!
//! Values are resolved in order, later layers winning:
//! 1. Built-in defaults
//! 2. User config: `<config_dir>/bundle-compiler/config.toml`
//! 3. Project config: `bundle-compiler.toml` in the working directory, or an explicit path
//! 4. Environment: `BUNDLE_COMPILER_PROFILE`, `BUNDLE_COMPILER_CACHE_DIR`

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use etcetera::{BaseStrategy, choose_base_strategy};
use log::debug;
use serde::Deserialize;

const APP_DIR: &str = "bundle-compiler";
const PROJECT_CONFIG: &str = "bundle-compiler.toml";

/// Which level categories a full compile processes
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    pub multiplayer: bool,
    pub singleplayer: bool,
    pub menus: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            multiplayer: false,
            singleplayer: true,
            menus: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PackagingOptions {
    /// Meshes also ship their `<name>_mesh/blocks` resource
    pub mesh_blocks: bool,
}

/// Bundles some asset types are always redirected to, without platform prefix
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WellKnownBundles {
    pub weapon_shared_bundle: String,
    pub profile_option_bundles: [String; 2],
}

impl Default for WellKnownBundles {
    fn default() -> Self {
        Self {
            weapon_shared_bundle: "gameplay/bundles/weaponsbundlecommon".to_owned(),
            profile_option_bundles: [
                "ui/static".to_owned(),
                "gameconfigurations/profileoptions".to_owned(),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Game profile, prefixes every cache file name
    pub profile: String,
    /// Directory holding the cache files; the user cache directory when unset
    pub cache_dir: Option<PathBuf>,
    /// Platform prefix of bundle names
    pub platform: String,
    pub compile: CompileOptions,
    pub packaging: PackagingOptions,
    pub well_known: WellKnownBundles,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            profile: "starwarsbattlefrontii".to_owned(),
            cache_dir: None,
            platform: "win32".to_owned(),
            compile: CompileOptions::default(),
            packaging: PackagingOptions::default(),
            well_known: WellKnownBundles::default(),
        }
    }
}

/// A partially specified config file; absent keys keep the lower layer's value
#[derive(Debug, Default, Deserialize)]
struct ConfigLayer {
    profile: Option<String>,
    cache_dir: Option<PathBuf>,
    platform: Option<String>,
    compile: Option<CompileOptions>,
    packaging: Option<PackagingOptions>,
    well_known: Option<WellKnownBundles>,
}

impl Config {
    /// Loads the layered configuration. An explicit path replaces the project file lookup.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(user_path) = user_config_path()
            && user_path.is_file()
        {
            config.apply(read_layer(&user_path)?);
        }

        let project_path = explicit.map_or_else(|| PathBuf::from(PROJECT_CONFIG), Path::to_path_buf);
        if project_path.is_file() {
            config.apply(read_layer(&project_path)?);
        } else if explicit.is_some() {
            anyhow::bail!("Config file {} does not exist", project_path.display());
        }

        config.apply_env();
        Ok(config)
    }

    /// Parses one config file on top of the defaults
    pub fn from_toml(text: &str) -> Result<Self> {
        let layer: ConfigLayer = toml::from_str(text).context("Invalid bundle compiler config")?;
        let mut config = Self::default();
        config.apply(layer);
        Ok(config)
    }

    fn apply(&mut self, layer: ConfigLayer) {
        if let Some(profile) = layer.profile {
            self.profile = profile;
        }
        if let Some(cache_dir) = layer.cache_dir {
            self.cache_dir = Some(cache_dir);
        }
        if let Some(platform) = layer.platform {
            self.platform = platform;
        }
        if let Some(compile) = layer.compile {
            self.compile = compile;
        }
        if let Some(packaging) = layer.packaging {
            self.packaging = packaging;
        }
        if let Some(well_known) = layer.well_known {
            self.well_known = well_known;
        }
    }

    fn apply_env(&mut self) {
        if let Ok(profile) = std::env::var("BUNDLE_COMPILER_PROFILE")
            && !profile.is_empty()
        {
            debug!("Profile overridden from environment: {profile}");
            self.profile = profile;
        }
        if let Ok(cache_dir) = std::env::var("BUNDLE_COMPILER_CACHE_DIR")
            && !cache_dir.is_empty()
        {
            self.cache_dir = Some(PathBuf::from(cache_dir));
        }
    }

    /// Directory the cache files live in
    pub fn resolved_cache_dir(&self) -> PathBuf {
        if let Some(dir) = &self.cache_dir {
            return dir.clone();
        }
        choose_base_strategy().map_or_else(
            |_| PathBuf::from("Caches"),
            |strategy| strategy.cache_dir().join(APP_DIR),
        )
    }

    /// Full path of one cache file, e.g. `<cache_dir>/<profile>_Callstack.cache`
    pub fn cache_file(&self, suffix: &str) -> PathBuf {
        self.resolved_cache_dir()
            .join(format!("{}_{suffix}", self.profile))
    }
}

fn user_config_path() -> Option<PathBuf> {
    choose_base_strategy()
        .ok()
        .map(|strategy| strategy.config_dir().join(APP_DIR).join("config.toml"))
}

fn read_layer(path: &Path) -> Result<ConfigLayer> {
    debug!("Reading config layer {}", path.display());
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("Invalid config {}", path.display()))
}
