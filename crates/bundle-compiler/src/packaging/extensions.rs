//! Extensions for assets that ship resources or chunks alongside their ebx

use anyhow::{Context, Result};
use log::warn;

use super::{BundleExtension, PackagingContext, add_linked_res, bundle_asset};
use crate::{
    asset_db::{AssetDatabase, LinkTarget, ObjectData, ResPayload},
    call_stack::CallStack,
    types::{Guid, ResourceId},
};

fn root_of(db: &dyn AssetDatabase, asset: Guid) -> Option<ObjectData> {
    db.asset(asset)?.current_content().root_data().cloned()
}

fn unexpected_root(db: &dyn AssetDatabase, asset: Guid, expected: &str) {
    let name = db.asset(asset).map_or("<unknown>", |e| e.name.as_str());
    warn!("{name} is not a {expected}, only its ebx was bundled");
}

#[derive(Debug, Default)]
pub struct SoundWaveExtension;

impl BundleExtension for SoundWaveExtension {
    fn asset_type(&self) -> &'static str {
        "SoundWaveAsset"
    }

    fn bundle(&self, ctx: &mut PackagingContext<'_>, asset: Guid, target: &CallStack) -> Result<()> {
        bundle_asset(ctx, asset, target)?;
        let Some(ObjectData::SoundWave { chunks }) = root_of(&*ctx.db, asset) else {
            unexpected_root(&*ctx.db, asset, "sound wave");
            return Ok(());
        };

        for chunk in chunks {
            if ctx.add_bundleable_chunk(chunk, target.caller_id())? {
                ctx.db.link_asset(asset, LinkTarget::Chunk(chunk))?;
            }
        }
        Ok(())
    }

    fn ebx(&self, _: &mut PackagingContext<'_>, _: Guid, _: &CallStack) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MovieTextureExtension;

impl BundleExtension for MovieTextureExtension {
    fn asset_type(&self) -> &'static str {
        "MovieTextureBaseAsset"
    }

    fn bundle(&self, ctx: &mut PackagingContext<'_>, asset: Guid, target: &CallStack) -> Result<()> {
        bundle_asset(ctx, asset, target)?;
        let Some(ObjectData::MovieTexture {
            chunk,
            subtitle_chunk,
        }) = root_of(&*ctx.db, asset)
        else {
            unexpected_root(&*ctx.db, asset, "movie texture");
            return Ok(());
        };

        // The movie chunk is linked even when it cannot be bundled
        ctx.add_bundleable_chunk(chunk, target.caller_id())?;
        if ctx.db.chunk(chunk).is_some() {
            ctx.db.link_asset(asset, LinkTarget::Chunk(chunk))?;
        }

        if let Some(subtitles) = subtitle_chunk
            && ctx.db.chunk(subtitles).is_some()
        {
            ctx.db.add_chunk_to_bundle(subtitles, target.caller_id())?;
            ctx.db.link_asset(asset, LinkTarget::Chunk(subtitles))?;
        }
        Ok(())
    }

    fn ebx(&self, _: &mut PackagingContext<'_>, _: Guid, _: &CallStack) -> Result<()> {
        Ok(())
    }
}

/// Pathfinding blobs are rewritten in place so the mod always carries them
#[derive(Debug, Default)]
pub struct PathfindingExtension;

impl BundleExtension for PathfindingExtension {
    fn asset_type(&self) -> &'static str {
        "PathfindingBlobAsset"
    }

    fn bundle(&self, ctx: &mut PackagingContext<'_>, asset: Guid, target: &CallStack) -> Result<()> {
        bundle_asset(ctx, asset, target)?;
        let Some(ObjectData::PathfindingBlob { blobs }) = root_of(&*ctx.db, asset) else {
            unexpected_root(&*ctx.db, asset, "pathfinding blob");
            return Ok(());
        };

        for chunk in blobs.chunk_ids() {
            ctx.db
                .add_chunk_to_bundle(chunk, target.caller_id())
                .with_context(|| format!("Failed to bundle pathfinding chunk {chunk}"))?;
            let data = ctx
                .db
                .chunk_data(chunk)
                .with_context(|| format!("Pathfinding chunk {chunk} has no data"))?;
            ctx.db.modify_chunk(chunk, data)?;
        }
        Ok(())
    }

    fn ebx(&self, _: &mut PackagingContext<'_>, _: Guid, _: &CallStack) -> Result<()> {
        Ok(())
    }
}

/// Adds a texture resource and its chunk, linking chunk to resource and
/// resource to asset. Returns the chunk and its first mip.
fn bundle_texture_res(
    ctx: &mut PackagingContext<'_>,
    asset: Guid,
    rid: ResourceId,
    target: &CallStack,
) -> Result<Option<(Guid, Option<i32>)>> {
    let bundle = target.caller_id();
    ctx.db.add_res_to_bundle(rid, bundle)?;

    let texture = match ctx.db.res(rid).map(|res| &res.payload) {
        Some(ResPayload::Texture { chunk, first_mip }) => Some((*chunk, Some(*first_mip))),
        Some(ResPayload::AtlasTexture { chunk }) => Some((*chunk, None)),
        _ => None,
    };
    let Some((chunk, first_mip)) = texture else {
        warn!("Resource {} is not a texture", rid.as_u64());
        ctx.db.link_asset(asset, LinkTarget::Res(rid))?;
        return Ok(None);
    };

    ctx.add_bundleable_chunk(chunk, bundle)?;
    if ctx.db.chunk(chunk).is_some() {
        ctx.db.link_res(rid, chunk)?;
    }
    ctx.db.link_asset(asset, LinkTarget::Res(rid))?;
    Ok(Some((chunk, first_mip)))
}

#[derive(Debug, Default)]
pub struct AtlasTextureExtension;

impl BundleExtension for AtlasTextureExtension {
    fn asset_type(&self) -> &'static str {
        "AtlasTextureAsset"
    }

    fn bundle(&self, ctx: &mut PackagingContext<'_>, asset: Guid, target: &CallStack) -> Result<()> {
        bundle_asset(ctx, asset, target)?;
        let Some(ObjectData::AtlasTexture { resource }) = root_of(&*ctx.db, asset) else {
            unexpected_root(&*ctx.db, asset, "atlas texture");
            return Ok(());
        };
        bundle_texture_res(ctx, asset, resource, target)?;
        Ok(())
    }

    fn ebx(&self, _: &mut PackagingContext<'_>, _: Guid, _: &CallStack) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct TextureExtension;

impl BundleExtension for TextureExtension {
    fn asset_type(&self) -> &'static str {
        "TextureBaseAsset"
    }

    fn bundle(&self, ctx: &mut PackagingContext<'_>, asset: Guid, target: &CallStack) -> Result<()> {
        bundle_asset(ctx, asset, target)?;
        let Some(ObjectData::Texture { resource }) = root_of(&*ctx.db, asset) else {
            unexpected_root(&*ctx.db, asset, "texture");
            return Ok(());
        };

        if let Some((chunk, Some(first_mip))) = bundle_texture_res(ctx, asset, resource, target)?
            && ctx.db.chunk(chunk).is_some()
        {
            ctx.db.set_chunk_first_mip(chunk, first_mip)?;
        }
        Ok(())
    }

    fn ebx(&self, _: &mut PackagingContext<'_>, _: Guid, _: &CallStack) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct SvgImageExtension;

impl BundleExtension for SvgImageExtension {
    fn asset_type(&self) -> &'static str {
        "SvgImage"
    }

    fn bundle(&self, ctx: &mut PackagingContext<'_>, asset: Guid, target: &CallStack) -> Result<()> {
        bundle_asset(ctx, asset, target)?;
        let Some(ObjectData::SvgImage { resource }) = root_of(&*ctx.db, asset) else {
            unexpected_root(&*ctx.db, asset, "svg image");
            return Ok(());
        };
        add_linked_res(ctx, asset, resource, target.caller_id())
    }

    fn ebx(&self, _: &mut PackagingContext<'_>, _: Guid, _: &CallStack) -> Result<()> {
        Ok(())
    }
}
