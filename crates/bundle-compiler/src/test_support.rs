//! Fixture builders for unit tests

use crate::{
    asset_db::{
        AssetEntry, ChunkEntry, EbxAsset, EbxObject, MemoryDatabase, ModifiedEntry, ObjectData,
        ResEntry, ResPayload,
    },
    types::{BundleId, BundleKind, Guid, ResourceId},
};

/// A [`MemoryDatabase`] plus a guid counter
pub(crate) struct Fixture {
    pub(crate) db: MemoryDatabase,
    next: u128,
}

impl Fixture {
    pub(crate) fn new() -> Self {
        Self {
            db: MemoryDatabase::new(),
            next: 0x1000,
        }
    }

    pub(crate) fn next_guid(&mut self) -> Guid {
        self.next += 1;
        Guid::from_u128(self.next)
    }

    pub(crate) fn bundle(&mut self, name: &str, kind: BundleKind) -> BundleId {
        self.db.add_bundle(name, kind, None)
    }

    /// A bundle described by a blueprint asset whose root object is `blueprint`
    pub(crate) fn blueprint_bundle(
        &mut self,
        name: &str,
        kind: BundleKind,
        asset_name: &str,
        blueprint: ObjectData,
        extra: Vec<ObjectData>,
    ) -> (BundleId, Guid) {
        let id = self.db.add_bundle(name, kind, None);
        let type_name = blueprint.type_name().to_owned();
        let mut objects = vec![blueprint];
        objects.extend(extra);
        let guid = self
            .asset(asset_name, &type_name)
            .bundles(&[id])
            .objects(objects)
            .insert();
        self.db.set_bundle_blueprint(id, guid);
        (id, guid)
    }

    pub(crate) fn asset<'a>(&'a mut self, name: &str, type_name: &str) -> AssetBuilder<'a> {
        let guid = self.next_guid();
        AssetBuilder {
            fixture: self,
            entry: AssetEntry {
                guid,
                name: name.to_owned(),
                type_name: type_name.to_owned(),
                bundles: Vec::new(),
                added_bundles: Vec::new(),
                dependencies: Vec::new(),
                is_added: false,
                linked: Vec::new(),
                content: EbxAsset::new(guid, Vec::new()),
                modified: None,
            },
        }
    }

    pub(crate) fn chunk(&mut self, bundles: &[BundleId]) -> Guid {
        let id = self.next_guid();
        self.db.add_chunk(ChunkEntry {
            id,
            bundles: bundles.to_vec(),
            added_bundles: Vec::new(),
            is_added: false,
            first_mip: 0,
            data: vec![1, 2, 3],
            modified_data: None,
        });
        id
    }

    pub(crate) fn res(&mut self, name: &str, payload: ResPayload) -> ResourceId {
        self.next += 1;
        let rid = ResourceId::new(self.next as u64);
        self.db.add_res(ResEntry {
            rid,
            name: name.to_owned(),
            bundles: Vec::new(),
            added_bundles: Vec::new(),
            linked: Vec::new(),
            payload,
        });
        rid
    }
}

pub(crate) struct AssetBuilder<'a> {
    fixture: &'a mut Fixture,
    entry: AssetEntry,
}

impl AssetBuilder<'_> {
    pub(crate) fn bundles(mut self, bundles: &[BundleId]) -> Self {
        self.entry.bundles = bundles.to_vec();
        self
    }

    pub(crate) fn added_to(mut self, bundles: &[BundleId]) -> Self {
        self.entry.added_bundles = bundles.to_vec();
        self
    }

    pub(crate) fn depends_on(mut self, dependencies: &[Guid]) -> Self {
        self.entry.dependencies = dependencies.to_vec();
        self
    }

    /// Objects in order, the first one being the root
    pub(crate) fn objects(mut self, objects: Vec<ObjectData>) -> Self {
        let objects = objects
            .into_iter()
            .map(|data| EbxObject {
                instance_guid: self.fixture.next_guid(),
                data,
            })
            .collect();
        self.entry.content = EbxAsset::new(self.entry.guid, objects);
        self
    }

    /// Records the current content as an edit
    pub(crate) fn modified(mut self) -> Self {
        self.entry.modified = Some(ModifiedEntry {
            data: self.entry.content.clone(),
            dependent_assets: Vec::new(),
        });
        self
    }

    pub(crate) fn added(mut self) -> Self {
        self.entry.is_added = true;
        self
    }

    pub(crate) fn insert(self) -> Guid {
        let guid = self.entry.guid;
        let mut entry = self.entry;
        if entry.content.objects.is_empty() {
            let instance_guid = self.fixture.next_guid();
            entry.content.objects.push(EbxObject {
                instance_guid,
                data: ObjectData::Other {
                    type_name: entry.type_name.clone(),
                },
            });
            if let Some(modified) = &mut entry.modified {
                modified.data = entry.content.clone();
            }
        }
        self.fixture.db.add_asset(entry);
        guid
    }
}
