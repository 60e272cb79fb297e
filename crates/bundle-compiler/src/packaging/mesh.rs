//! Mesh packaging and mesh-variation database registration

use anyhow::Result;
use cow_utils::CowUtils;
use log::{debug, warn};

use super::{BundleExtension, PackagingContext, add_linked_res, bundle_asset};
use crate::{
    asset_db::{
        ObjectData, ResPayload,
        objects::{VariationEntry, VariationMaterialEntry},
    },
    call_stack::CallStack,
    types::{Guid, ImportReference},
};

#[derive(Debug, Default)]
pub struct MeshExtension;

impl BundleExtension for MeshExtension {
    fn asset_type(&self) -> &'static str {
        "MeshAsset"
    }

    fn bundle(&self, ctx: &mut PackagingContext<'_>, asset: Guid, target: &CallStack) -> Result<()> {
        let bundle = target.caller_id();
        let Some(entry) = ctx.db.asset(asset) else {
            return bundle_asset(ctx, asset, target);
        };
        let name = entry.name.clone();
        let mesh_set = match entry.current_content().root_data() {
            Some(ObjectData::Mesh { mesh_set_resource }) => Some(*mesh_set_resource),
            _ => None,
        };

        match mesh_set {
            Some(rid) => {
                add_linked_res(ctx, asset, rid, bundle)?;
                let lods = match ctx.db.res(rid).map(|res| &res.payload) {
                    Some(ResPayload::MeshSet { lods }) => lods.clone(),
                    _ => Vec::new(),
                };
                for chunk in lods.into_iter().filter(|lod| !lod.is_nil()) {
                    if ctx.add_bundleable_chunk(chunk, bundle)? {
                        ctx.db.link_res(rid, chunk)?;
                    }
                }
            }
            None => warn!("{name} has no mesh set resource"),
        }

        if ctx.options.mesh_blocks {
            let blocks_name = format!("{}_mesh/blocks", name.cow_to_ascii_lowercase());
            match ctx.db.res_by_name(&blocks_name).map(|res| res.rid) {
                Some(blocks) => ctx.db.add_res_to_bundle(blocks, bundle)?,
                None => warn!("{name} has no {blocks_name} resource"),
            }
        }

        bundle_asset(ctx, asset, target)
    }

    fn ebx(&self, ctx: &mut PackagingContext<'_>, asset: Guid, target: &CallStack) -> Result<()> {
        register_variation(ctx, asset, target)
    }
}

/// Appends a variation entry for the mesh to the target bundle's mesh-variation
/// database. Materials without texture parameters borrow them from the first
/// variation the game already ships for this mesh; textures borrowed that way are
/// packaged too unless a shared bundle or a directly loaded bundle carries them.
fn register_variation(ctx: &mut PackagingContext<'_>, asset: Guid, target: &CallStack) -> Result<()> {
    let Some(database) = ctx.caches.variation_database(&target.caller().name) else {
        return Ok(());
    };
    let Some(mut content) = ctx.db.ebx(database) else {
        warn!(
            "Mesh variation database of {} no longer exists",
            target.caller().name
        );
        return Ok(());
    };
    if content.dependencies().contains(&asset) {
        return Ok(());
    }
    let Some(source) = ctx.db.ebx(asset) else {
        return Ok(());
    };
    let known = ctx
        .db
        .mesh_variations(asset)
        .and_then(|variations| variations.first())
        .cloned();

    let mut variation = VariationEntry::default();
    let mut borrowed_textures = Vec::new();
    for object in &source.objects {
        let ObjectData::MeshMaterial { texture_parameters } = &object.data else {
            variation.mesh = source
                .root_instance_guid()
                .map(|root| ImportReference::new(asset, root));
            continue;
        };

        let mut material = VariationMaterialEntry {
            material: ImportReference::new(asset, object.instance_guid),
            texture_parameters: texture_parameters.clone(),
        };
        if material.texture_parameters.is_empty()
            && let Some(known_material) = known.as_ref().and_then(|known| {
                known
                    .materials
                    .iter()
                    .find(|m| m.material_guid == object.instance_guid)
            })
        {
            for parameter in &known_material.texture_parameters {
                material.texture_parameters.push(parameter.clone());
                borrowed_textures.push(parameter.value.file_guid);
            }
        }
        variation.materials.push(material);
    }

    for texture in borrowed_textures {
        let Some(entry) = ctx.db.asset(texture) else {
            warn!("Texture {texture} of a known mesh variation does not exist");
            continue;
        };
        let handled_elsewhere = entry.memberships().any(|bundle| {
            ctx.db.bundle(bundle).is_some_and(|b| b.is_shared())
                || target.calls_bundle(bundle, false)
        });
        if handled_elsewhere {
            continue;
        }
        debug!(
            "Packaging borrowed texture {} into {}",
            entry.name,
            target.caller().name
        );
        ctx.add_to_bundle(texture, target)?;
    }

    let Some(ObjectData::MeshVariationDatabase { entries }) = content.root_mut() else {
        warn!("{database} is cached as a mesh variation database but is not one");
        return Ok(());
    };
    entries.push(variation);
    ctx.db.modify_ebx(database, content)
}
