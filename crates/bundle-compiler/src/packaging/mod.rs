//! Packaging: committing one asset to one bundle
//!
//! The [`Dispatcher`] picks a [`BundleExtension`] by asset type, exact match first
//! and then the nearest registered supertype. Every extension runs in two steps:
//! `bundle` adds the asset (and whatever resources and chunks it drags along) to
//! the target bundle, `ebx` folds it into the target's aggregate assets.

use std::fmt;

use anyhow::{Result, anyhow, bail};
use indexmap::IndexSet;
use log::{trace, warn};
use rustc_hash::FxHashMap;

use crate::{
    asset_db::{AssetDatabase, ChunkEntry, LinkTarget, ObjectData},
    cache::CacheManager,
    call_stack::CallStack,
    config::PackagingOptions,
    types::{BundleId, Guid, ImportReference, ResourceId},
};

mod extensions;
mod mesh;

pub use extensions::{
    AtlasTextureExtension, MovieTextureExtension, PathfindingExtension, SoundWaveExtension,
    SvgImageExtension, TextureExtension,
};
pub use mesh::MeshExtension;

#[cfg(test)]
mod tests;

/// Key of the extension used when no registered type matches
pub const DEFAULT_EXTENSION: &str = "{none}";

/// Everything packaging may read or mutate
pub struct PackagingContext<'a> {
    pub db: &'a mut dyn AssetDatabase,
    pub caches: &'a CacheManager,
    pub options: &'a PackagingOptions,
    pub dispatcher: &'a Dispatcher,
    /// Assets that had no edits of their own before packaging touched them
    pub pure_bundled: &'a mut IndexSet<Guid>,
}

impl fmt::Debug for PackagingContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PackagingContext")
            .field("options", &self.options)
            .field("pure_bundled", &self.pure_bundled.len())
            .finish_non_exhaustive()
    }
}

impl PackagingContext<'_> {
    /// Packages `asset` into the caller of `target` through the dispatcher
    pub fn add_to_bundle(&mut self, asset: Guid, target: &CallStack) -> Result<()> {
        let dispatcher = self.dispatcher;
        dispatcher.add_to_bundle(self, asset, target)
    }

    /// Adds a chunk to `bundle` unless it is shipped nowhere and not added by tooling
    fn add_bundleable_chunk(&mut self, chunk: Guid, bundle: BundleId) -> Result<bool> {
        match self.db.chunk(chunk).map(ChunkEntry::is_bundleable) {
            Some(true) => {
                self.db.add_chunk_to_bundle(chunk, bundle)?;
                Ok(true)
            }
            Some(false) => Ok(false),
            None => {
                warn!("Chunk {chunk} does not exist");
                Ok(false)
            }
        }
    }
}

/// Per-type packaging routine
pub trait BundleExtension: fmt::Debug {
    fn asset_type(&self) -> &'static str;

    /// Adds the asset to the target bundle
    fn bundle(&self, ctx: &mut PackagingContext<'_>, asset: Guid, target: &CallStack) -> Result<()> {
        bundle_asset(ctx, asset, target)
    }

    /// Folds the asset into the target bundle's aggregate assets
    fn ebx(&self, ctx: &mut PackagingContext<'_>, asset: Guid, target: &CallStack) -> Result<()> {
        link_network_registry(ctx, asset, target)
    }
}

/// Plain packaging: add to the bundle, register networked objects
#[derive(Debug, Default)]
pub struct DefaultExtension;

impl BundleExtension for DefaultExtension {
    fn asset_type(&self) -> &'static str {
        DEFAULT_EXTENSION
    }
}

/// Records the asset as edited and adds it to the target bundle
pub(crate) fn bundle_asset(
    ctx: &mut PackagingContext<'_>,
    asset: Guid,
    target: &CallStack,
) -> Result<()> {
    let entry = ctx
        .db
        .asset(asset)
        .ok_or_else(|| anyhow!("Cannot package unknown asset {asset}"))?;
    if !entry.has_modified_data() {
        ctx.pure_bundled.insert(asset);
    }
    let content = entry.current_content().clone();
    trace!("Adding {} to {}", entry.name, target.caller().name);

    ctx.db.modify_ebx(asset, content)?;
    ctx.db.add_asset_to_bundle(asset, target.caller_id())
}

/// Appends every networked object of `asset` to the network registry of the
/// target bundle, if it has one
pub(crate) fn link_network_registry(
    ctx: &mut PackagingContext<'_>,
    asset: Guid,
    target: &CallStack,
) -> Result<()> {
    let Some(registry) = ctx.caches.networked_registry(&target.caller().name) else {
        return Ok(());
    };
    let Some(mut content) = ctx.db.ebx(registry) else {
        warn!(
            "Network registry of {} no longer exists",
            target.caller().name
        );
        return Ok(());
    };
    if content.dependencies().contains(&asset) {
        return Ok(());
    }
    let source = ctx
        .db
        .ebx(asset)
        .ok_or_else(|| anyhow!("Cannot package unknown asset {asset}"))?;

    let Some(ObjectData::NetworkRegistry { objects }) = content.root_mut() else {
        warn!("{registry} is cached as a network registry but is not one");
        return Ok(());
    };
    for object in &source.objects {
        if !ctx.caches.is_networked_type(object.data.type_name()) {
            continue;
        }
        let reference = ImportReference::new(source.file_guid, object.instance_guid);
        if !objects.contains(&reference) {
            objects.push(reference);
        }
    }

    ctx.db.modify_ebx(registry, content)?;
    ctx.db.add_dependent(registry, asset)
}

/// Registration table of packaging extensions
#[derive(Debug)]
pub struct Dispatcher {
    extensions: FxHashMap<&'static str, Box<dyn BundleExtension>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::with_extensions(vec![
            Box::new(DefaultExtension),
            Box::new(SoundWaveExtension),
            Box::new(MovieTextureExtension),
            Box::new(PathfindingExtension),
            Box::new(AtlasTextureExtension),
            Box::new(TextureExtension),
            Box::new(SvgImageExtension),
            Box::new(MeshExtension),
        ])
    }
}

impl Dispatcher {
    pub fn with_extensions(extensions: Vec<Box<dyn BundleExtension>>) -> Self {
        Self {
            extensions: extensions
                .into_iter()
                .map(|extension| (extension.asset_type(), extension))
                .collect(),
        }
    }

    /// The extension for `type_name`: exact match, nearest registered supertype,
    /// then the default extension
    pub fn extension_for(
        &self,
        db: &dyn AssetDatabase,
        type_name: &str,
    ) -> Result<&dyn BundleExtension> {
        if let Some(extension) = self.extensions.get(type_name) {
            return Ok(extension.as_ref());
        }
        for ancestor in db.type_ancestors(type_name) {
            if let Some(extension) = self.extensions.get(ancestor.as_str()) {
                return Ok(extension.as_ref());
            }
        }
        match self.extensions.get(DEFAULT_EXTENSION) {
            Some(extension) => Ok(extension.as_ref()),
            None => bail!("No packaging extension registered for {type_name} and no default"),
        }
    }

    pub fn add_to_bundle(
        &self,
        ctx: &mut PackagingContext<'_>,
        asset: Guid,
        target: &CallStack,
    ) -> Result<()> {
        let type_name = ctx
            .db
            .asset(asset)
            .map(|entry| entry.type_name.clone())
            .ok_or_else(|| anyhow!("Cannot package unknown asset {asset}"))?;
        let extension = self.extension_for(&*ctx.db, &type_name)?;
        extension.bundle(ctx, asset, target)?;
        extension.ebx(ctx, asset, target)
    }
}

/// Links a resource to the asset and adds it to `bundle`
fn add_linked_res(
    ctx: &mut PackagingContext<'_>,
    asset: Guid,
    rid: ResourceId,
    bundle: BundleId,
) -> Result<()> {
    ctx.db.add_res_to_bundle(rid, bundle)?;
    ctx.db.link_asset(asset, LinkTarget::Res(rid))
}
