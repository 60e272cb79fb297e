//! Persisted caches
//!
//! Every cache file starts with two little-endian `i32`s: a magic derived from the
//! cache name and a format version. A missing file or a header mismatch is not an
//! error, it reports a [`CacheStatus`] asking for regeneration. Strings are
//! null-terminated, guids use the 16-byte mixed-endian layout of the game tools.

use std::{
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    path::Path,
};

use anyhow::{Context, Result, bail};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::{error, warn};

use crate::{
    types::{BundleId, Guid},
    util::hash_string,
};

mod bundle;
mod call_stack;
mod level_type;
mod manager;
mod reference;
mod unlock_id;

pub use bundle::BundleCache;
pub use call_stack::CallStackCache;
pub use level_type::{LevelCategory, LevelTypeCache};
pub use manager::{CacheManager, CacheReport};
pub use reference::ReferenceCache;
pub use unlock_id::UnlockIdCache;

#[cfg(test)]
mod tests;

/// Format version shared by every cache file
pub const CACHE_VERSION: i32 = 1002;

/// Outcome of loading one cache file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Loaded,
    /// The file does not exist yet
    Missing,
    /// Wrong magic, wrong version or unreadable body
    Stale,
}

impl CacheStatus {
    pub fn is_loaded(self) -> bool {
        self == Self::Loaded
    }
}

/// Magic of a cache, stored as the signed int the file format uses
#[allow(clippy::cast_possible_wrap)]
pub fn cache_magic(name: &str) -> i32 {
    hash_string(name) as i32
}

pub(crate) fn create(path: &Path) -> Result<BufWriter<File>> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create cache directory {}", parent.display()))?;
    }
    let file = File::create(path)
        .with_context(|| format!("Failed to create cache {}", path.display()))?;
    Ok(BufWriter::new(file))
}

/// Opens a cache and validates its header, or reports why it cannot be used
pub(crate) fn open(path: &Path, magic: i32) -> Result<BufReader<File>, CacheStatus> {
    if !path.is_file() {
        warn!(
            "{} has not been generated yet, consider running generate-cache",
            path.display()
        );
        return Err(CacheStatus::Missing);
    }

    let mut reader = match File::open(path) {
        Ok(file) => BufReader::new(file),
        Err(err) => {
            error!("Failed to open cache {}: {err}", path.display());
            return Err(CacheStatus::Stale);
        }
    };

    let Ok(found) = reader.read_i32::<LittleEndian>() else {
        error!("{} is truncated", path.display());
        return Err(CacheStatus::Stale);
    };
    if found != magic {
        error!("{} is not a cache of the expected kind", path.display());
        return Err(CacheStatus::Stale);
    }

    match reader.read_i32::<LittleEndian>() {
        Ok(CACHE_VERSION) => Ok(reader),
        _ => {
            error!("{} is out of date, regenerate the cache", path.display());
            Err(CacheStatus::Stale)
        }
    }
}

pub(crate) fn write_header<W: Write>(writer: &mut W, magic: i32) -> Result<()> {
    writer.write_i32::<LittleEndian>(magic)?;
    writer.write_i32::<LittleEndian>(CACHE_VERSION)?;
    Ok(())
}

pub(crate) fn write_count<W: Write>(writer: &mut W, count: usize) -> Result<()> {
    let Ok(count) = i32::try_from(count) else {
        bail!("Too many cache entries: {count}");
    };
    writer.write_i32::<LittleEndian>(count)?;
    Ok(())
}

pub(crate) fn read_count<R: Read>(reader: &mut R) -> Result<usize> {
    let count = reader.read_i32::<LittleEndian>()?;
    usize::try_from(count).with_context(|| format!("Negative entry count {count}"))
}

pub(crate) fn write_cstring<W: Write>(writer: &mut W, value: &str) -> Result<()> {
    if value.as_bytes().contains(&0) {
        bail!("Cannot store {value:?}, it contains a NUL byte");
    }
    writer.write_all(value.as_bytes())?;
    writer.write_u8(0)?;
    Ok(())
}

pub(crate) fn read_cstring<R: Read>(reader: &mut R) -> Result<String> {
    let mut buf = Vec::new();
    loop {
        let c = reader.read_u8()?;
        if c == 0 {
            return String::from_utf8(buf).context("Cache string is not valid UTF-8");
        }
        buf.push(c);
    }
}

pub(crate) fn write_guid<W: Write>(writer: &mut W, guid: Guid) -> Result<()> {
    writer.write_all(&guid.to_bytes_le())?;
    Ok(())
}

pub(crate) fn read_guid<R: Read>(reader: &mut R) -> Result<Guid> {
    let mut bytes = [0_u8; 16];
    reader.read_exact(&mut bytes)?;
    Ok(Guid::from_bytes_le(bytes))
}

pub(crate) fn write_bundle_id<W: Write>(writer: &mut W, id: BundleId) -> Result<()> {
    writer.write_u32::<LittleEndian>(id.as_u32())?;
    Ok(())
}

pub(crate) fn read_bundle_id<R: Read>(reader: &mut R) -> Result<BundleId> {
    Ok(BundleId::new(reader.read_u32::<LittleEndian>()?))
}

/// A truncated or corrupt body makes the whole cache stale
pub(crate) fn read_body<T>(path: &Path, result: Result<T>) -> Result<T, CacheStatus> {
    result.map_err(|err| {
        error!("{} is corrupt, regenerate the cache: {err:#}", path.display());
        CacheStatus::Stale
    })
}
