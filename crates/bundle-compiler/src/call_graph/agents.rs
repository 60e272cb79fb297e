//! Per-bundle-kind strategies enumerating the bundles a bundle loads

use anyhow::{Result, anyhow};
use indexmap::IndexMap;
use log::{error, warn};

use crate::{
    asset_db::{AssetDatabase, EbxAsset, ObjectData},
    types::{BundleEntry, BundleId},
    util::qualified_bundle_name,
};

/// Everything an agent needs to resolve declared bundle names
#[derive(Clone, Copy)]
pub struct AgentContext<'a> {
    pub db: &'a dyn AssetDatabase,
    pub platform: &'a str,
}

impl std::fmt::Debug for AgentContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentContext")
            .field("platform", &self.platform)
            .finish_non_exhaustive()
    }
}

impl AgentContext<'_> {
    fn resolve(&self, declared: &str) -> Option<BundleId> {
        self.db
            .bundle_id(&qualified_bundle_name(self.platform, declared))
    }
}

/// Enumerates the direct children of one bundle in load order
pub trait CallStackAgent: std::fmt::Debug {
    fn generate_call_stack(
        &self,
        ctx: AgentContext<'_>,
        bundle: &BundleEntry,
        children: &mut Vec<BundleId>,
    ) -> Result<()>;
}

/// Agent keyed by the type of the bundle's blueprint asset
pub trait BlueprintCallStackAgent: CallStackAgent {
    fn asset_type(&self) -> &'static str;
}

/// Bundles without a blueprint: children come from bundle collection assets.
///
/// Nothing else is known about what loads a shared bundle.
#[derive(Debug, Default)]
pub struct SharedCallStackAgent;

impl CallStackAgent for SharedCallStackAgent {
    fn generate_call_stack(
        &self,
        ctx: AgentContext<'_>,
        bundle: &BundleEntry,
        children: &mut Vec<BundleId>,
    ) -> Result<()> {
        for guid in ctx.db.assets_in_bundle(bundle.id) {
            let Some(entry) = ctx.db.asset(guid) else {
                continue;
            };
            if entry.type_name != "BlueprintBundleCollection" {
                continue;
            }
            let Some(ObjectData::BundleCollection { bundles }) =
                entry.current_content().root_data()
            else {
                continue;
            };

            for declared in bundles {
                let Some(child) = ctx.resolve(declared) else {
                    continue;
                };
                if child == bundle.id || children.contains(&child) {
                    continue;
                }
                children.push(child);
            }
        }
        Ok(())
    }
}

/// Appends the first bundle of every sub-world referenced by `content`
fn collect_subworld_references(
    ctx: AgentContext<'_>,
    owner: &str,
    content: &EbxAsset,
    children: &mut Vec<BundleId>,
) {
    for object in &content.objects {
        let ObjectData::SubWorldReference { bundle_name } = &object.data else {
            continue;
        };

        let Some(subworld) = ctx.db.asset_by_name(bundle_name) else {
            error!("Subworld {bundle_name} referenced in {owner} does not exist.");
            continue;
        };
        let Some(&child) = subworld.bundles.first() else {
            error!("Subworld {bundle_name} referenced in {owner} is not in any bundle.");
            continue;
        };

        if !children.contains(&child) {
            children.push(child);
        }
    }
}

#[derive(Debug, Default)]
pub struct LevelCallStackAgent;

impl CallStackAgent for LevelCallStackAgent {
    fn generate_call_stack(
        &self,
        ctx: AgentContext<'_>,
        bundle: &BundleEntry,
        children: &mut Vec<BundleId>,
    ) -> Result<()> {
        let level = bundle
            .blueprint
            .and_then(|guid| ctx.db.asset(guid))
            .ok_or_else(|| anyhow!("Bundle {} has no level blueprint", bundle.name))?;

        // Whatever the description loads comes first, it is loaded before anything else
        let description = ctx
            .db
            .asset_by_name(&format!("{}/Description", level.name))
            .ok_or_else(|| anyhow!("Could not find level description for {}", level.name))?;

        if let Some(ObjectData::LevelDescription { bundles, .. }) =
            description.current_content().root_data()
        {
            for declared in bundles {
                match ctx.resolve(declared) {
                    Some(child) if child == bundle.id || children.contains(&child) => {}
                    Some(child) => children.push(child),
                    None => warn!(
                        "Bundle {declared} declared by {} does not exist",
                        description.name
                    ),
                }
            }
        } else {
            warn!("{} is not a level description", description.name);
        }

        collect_subworld_references(ctx, &level.name, level.current_content(), children);
        Ok(())
    }
}

impl BlueprintCallStackAgent for LevelCallStackAgent {
    fn asset_type(&self) -> &'static str {
        "LevelData"
    }
}

#[derive(Debug, Default)]
pub struct SubWorldCallStackAgent;

impl CallStackAgent for SubWorldCallStackAgent {
    fn generate_call_stack(
        &self,
        ctx: AgentContext<'_>,
        bundle: &BundleEntry,
        children: &mut Vec<BundleId>,
    ) -> Result<()> {
        let Some(subworld) = bundle.blueprint.and_then(|guid| ctx.db.asset(guid)) else {
            return Ok(());
        };
        collect_subworld_references(ctx, &subworld.name, subworld.current_content(), children);
        Ok(())
    }
}

impl BlueprintCallStackAgent for SubWorldCallStackAgent {
    fn asset_type(&self) -> &'static str {
        "SubWorldData"
    }
}

/// Agent registration table
#[derive(Debug)]
pub struct AgentTable {
    shared: SharedCallStackAgent,
    blueprint: IndexMap<&'static str, Box<dyn BlueprintCallStackAgent>>,
}

impl Default for AgentTable {
    fn default() -> Self {
        let agents: Vec<Box<dyn BlueprintCallStackAgent>> = vec![
            Box::new(LevelCallStackAgent),
            Box::new(SubWorldCallStackAgent),
        ];
        Self {
            shared: SharedCallStackAgent,
            blueprint: agents.into_iter().map(|a| (a.asset_type(), a)).collect(),
        }
    }
}

impl AgentTable {
    /// Picks the agent for a bundle; blueprints of unknown types have no agent
    pub fn agent_for(&self, db: &dyn AssetDatabase, bundle: &BundleEntry) -> Option<&dyn CallStackAgent> {
        match bundle.blueprint {
            None => Some(&self.shared),
            Some(guid) => {
                let type_name = db.asset(guid)?.type_name.as_str();
                self.blueprint
                    .get(type_name)
                    .map(|agent| agent.as_ref() as &dyn CallStackAgent)
            }
        }
    }
}
