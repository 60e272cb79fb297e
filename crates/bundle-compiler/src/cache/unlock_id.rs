//! Unlock-id cache: identifiers used by the unmodified game
//!
//! Body: unlock count, then `(asset guid, identifier: u32)` per unlock asset.

use std::{
    io::{Read, Write},
    path::Path,
};

use anyhow::Result;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use indexmap::IndexSet;
use log::{debug, warn};
use rustc_hash::FxHashMap;

use super::{
    CacheStatus, cache_magic, create, open, read_body, read_count, read_guid, write_count,
    write_guid, write_header,
};
use crate::{
    asset_db::{AssetDatabase, ObjectData},
    types::Guid,
};

const MAGIC_NAME: &str = "YW_IdCache";

#[derive(Debug, Default)]
pub struct UnlockIdCache {
    ids: IndexSet<u32>,
    asset_to_id: FxHashMap<String, u32>,
    assets: FxHashMap<u32, Guid>,
}

impl UnlockIdCache {
    pub fn contains_id(&self, id: u32) -> bool {
        self.ids.contains(&id)
    }

    /// Identifier the named asset had when the cache was generated
    pub fn id_of(&self, asset_name: &str) -> Option<u32> {
        self.asset_to_id.get(asset_name).copied()
    }

    pub fn asset_of(&self, id: u32) -> Option<Guid> {
        self.assets.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Claims `id` for the named asset unless another asset already uses it
    pub fn reserve(&mut self, id: u32, asset_name: &str, guid: Guid) -> bool {
        if self.ids.contains(&id) {
            return false;
        }
        self.insert(id, asset_name, guid);
        true
    }

    pub fn clear(&mut self) {
        self.ids.clear();
        self.asset_to_id.clear();
        self.assets.clear();
    }

    /// Records the identifier of every unlock asset as currently stored
    pub fn generate(db: &dyn AssetDatabase) -> Self {
        let mut cache = Self::default();
        for guid in db.assets_of_type("UnlockAssetBase", false) {
            let Some(entry) = db.asset(guid) else {
                continue;
            };
            if let Some(ObjectData::Unlock { identifier }) = entry.current_content().root_data() {
                cache.insert(*identifier, &entry.name, guid);
            }
        }
        cache
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let mut writer = create(path)?;
        write_header(&mut writer, cache_magic(MAGIC_NAME))?;
        write_count(&mut writer, self.assets.len())?;
        for &id in &self.ids {
            if let Some(&guid) = self.assets.get(&id) {
                write_guid(&mut writer, guid)?;
                writer.write_u32::<LittleEndian>(id)?;
            }
        }
        writer.flush()?;
        Ok(())
    }

    pub fn load(&mut self, path: &Path, db: &dyn AssetDatabase) -> CacheStatus {
        self.clear();
        let mut reader = match open(path, cache_magic(MAGIC_NAME)) {
            Ok(reader) => reader,
            Err(status) => return status,
        };

        let unlocks = match read_body(path, read_unlocks(&mut reader)) {
            Ok(unlocks) => unlocks,
            Err(status) => return status,
        };

        for (guid, id) in unlocks {
            let Some(entry) = db.asset(guid) else {
                warn!("Cached unlock asset {guid} no longer exists");
                continue;
            };
            self.insert(id, &entry.name, guid);
        }
        debug!("Loaded {} unlock identifiers", self.ids.len());
        CacheStatus::Loaded
    }

    fn insert(&mut self, id: u32, asset_name: &str, guid: Guid) {
        self.ids.insert(id);
        self.asset_to_id.insert(asset_name.to_owned(), id);
        self.assets.insert(id, guid);
    }
}

fn read_unlocks<R: Read>(reader: &mut R) -> Result<Vec<(Guid, u32)>> {
    let count = read_count(reader)?;
    let mut unlocks = Vec::new();
    for _ in 0..count {
        let guid = read_guid(reader)?;
        unlocks.push((guid, reader.read_u32::<LittleEndian>()?));
    }
    Ok(unlocks)
}
