//! Identifiers and small value types shared by every stage of bundle compilation

use std::fmt;

use serde::{Deserialize, Serialize};

/// Globally unique identifier of an asset, object instance or chunk
pub type Guid = uuid::Uuid;

/// Stable identifier of a content bundle inside the asset database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BundleId(u32);

impl BundleId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the underlying u32 value of the BundleId
    #[inline]
    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for BundleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifier of a resource (res) entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(u64);

impl ResourceId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    #[inline]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

/// How the runtime treats a bundle once it is loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BundleKind {
    #[default]
    None,
    /// Level and sub-world bundles; their content is described by a blueprint asset
    SubLevel,
    /// Blueprint bundles, whose loading cannot be proven statically
    Blueprint,
    /// Shared bundles stay resident once loaded
    Shared,
}

/// One shippable content bundle as known to the asset database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleEntry {
    pub id: BundleId,
    /// Path-like name, e.g. `win32/levels/mp/harbor`
    pub name: String,
    pub kind: BundleKind,
    /// Asset describing the bundle content (`LevelData`, `SubWorldData`, ...)
    #[serde(default)]
    pub blueprint: Option<Guid>,
}

impl BundleEntry {
    /// Last path segment of the bundle name
    pub fn display_name(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }

    pub fn is_shared(&self) -> bool {
        self.kind == BundleKind::Shared
    }
}

/// A pointer to an object exported by another asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImportReference {
    pub file_guid: Guid,
    pub class_guid: Guid,
}

impl ImportReference {
    pub const fn new(file_guid: Guid, class_guid: Guid) -> Self {
        Self {
            file_guid,
            class_guid,
        }
    }
}
