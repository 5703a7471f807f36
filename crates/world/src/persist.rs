//! Record-file persistence for per-world region and mine snapshots.
//!
//! Each file holds a fixed header (magic, version, CRC32, payload length)
//! followed by a zstd-compressed bincode list of individually encoded
//! records. A record that fails to decode is skipped; the rest still load.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use crc32fast::Hasher;
use quarry_core::WorldId;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::mine::Mine;
use crate::region::Region;

/// Magic number for record files ("QRRC").
const RECORD_MAGIC: u32 = 0x5152_5243;

/// Current record file format version.
const RECORD_VERSION: u16 = 1;

const HEADER_LEN: usize = 14;

/// Records decoded from a snapshot, plus how many were dropped as corrupt.
#[derive(Debug, Clone, PartialEq)]
pub struct Loaded<T> {
    pub records: Vec<T>,
    pub skipped: usize,
}

impl<T> Default for Loaded<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            skipped: 0,
        }
    }
}

/// Storage backend for world snapshots.
///
/// Saves replace the whole set for a world; loads of a world that was never
/// saved return an empty set.
pub trait SnapshotStore: Send + Sync + 'static {
    fn save_regions(&self, world: &WorldId, regions: &[Region]) -> Result<()>;
    fn load_regions(&self, world: &WorldId) -> Result<Loaded<Region>>;
    fn save_mines(&self, world: &WorldId, mines: &[Mine]) -> Result<()>;
    fn load_mines(&self, world: &WorldId) -> Result<Loaded<Mine>>;
}

#[derive(Debug, Clone)]
struct RecordHeader {
    magic: u32,
    version: u16,
    crc32: u32,
    payload_len: u32,
}

impl RecordHeader {
    fn new(crc32: u32, payload_len: u32) -> Self {
        Self {
            magic: RECORD_MAGIC,
            version: RECORD_VERSION,
            crc32,
            payload_len,
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_LEN);
        bytes.extend_from_slice(&self.magic.to_le_bytes());
        bytes.extend_from_slice(&self.version.to_le_bytes());
        bytes.extend_from_slice(&self.crc32.to_le_bytes());
        bytes.extend_from_slice(&self.payload_len.to_le_bytes());
        bytes
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            bail!("record header too short");
        }

        let magic = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        if magic != RECORD_MAGIC {
            bail!(
                "invalid record magic: expected 0x{:08X}, got 0x{:08X}",
                RECORD_MAGIC,
                magic
            );
        }

        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != RECORD_VERSION {
            bail!("unsupported record file version {version}");
        }
        let crc32 = u32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]);
        let payload_len = u32::from_le_bytes([bytes[10], bytes[11], bytes[12], bytes[13]]);

        Ok(Self {
            magic,
            version,
            crc32,
            payload_len,
        })
    }
}

/// Encode each record separately and write them as one record file.
pub fn write_records<T: Serialize>(path: &Path, records: &[T]) -> Result<()> {
    let raw = records
        .iter()
        .map(|record| bincode::serialize(record).context("failed to serialize record"))
        .collect::<Result<Vec<_>>>()?;
    write_raw_records(path, &raw)
}

/// Write already encoded records. The write goes to a temp file first and is
/// renamed over `path`, so a crash never leaves a half-written snapshot.
pub fn write_raw_records(path: &Path, records: &[Vec<u8>]) -> Result<()> {
    let serialized = bincode::serialize(records).context("failed to serialize record list")?;

    // Level 3 for balanced speed/compression.
    let compressed = zstd::encode_all(&serialized[..], 3).context("failed to compress records")?;

    let mut hasher = Hasher::new();
    hasher.update(&compressed);
    let crc32 = hasher.finalize();
    let payload_len = u32::try_from(compressed.len()).context("record payload too large")?;
    let header = RecordHeader::new(crc32, payload_len);

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let tmp = path.with_extension("tmp");
    {
        let mut file = File::create(&tmp)
            .with_context(|| format!("failed to create {}", tmp.display()))?;
        file.write_all(&header.to_bytes())
            .context("failed to write header")?;
        file.write_all(&compressed)
            .context("failed to write payload")?;
        file.sync_all().context("failed to sync record file")?;
    }
    fs::rename(&tmp, path)
        .with_context(|| format!("failed to move snapshot into {}", path.display()))?;
    debug!(path = %path.display(), records = records.len(), "wrote record file");
    Ok(())
}

/// Read a record file, skipping records that fail to decode.
///
/// A missing file yields an empty set. A damaged header or payload is an error
/// since no record in it can be trusted.
pub fn read_records<T: DeserializeOwned>(path: &Path) -> Result<Loaded<T>> {
    if !path.exists() {
        return Ok(Loaded::default());
    }

    let mut file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;

    let mut header_bytes = [0u8; HEADER_LEN];
    file.read_exact(&mut header_bytes)
        .context("failed to read record header")?;
    let header = RecordHeader::from_bytes(&header_bytes)?;

    let mut compressed = vec![0u8; header.payload_len as usize];
    file.read_exact(&mut compressed)
        .context("failed to read record payload")?;

    let mut hasher = Hasher::new();
    hasher.update(&compressed);
    let computed_crc = hasher.finalize();
    if computed_crc != header.crc32 {
        bail!(
            "CRC32 mismatch in {}: expected {:08X}, got {:08X}",
            path.display(),
            header.crc32,
            computed_crc
        );
    }

    let decompressed =
        zstd::decode_all(&compressed[..]).context("failed to decompress records")?;
    let raw: Vec<Vec<u8>> =
        bincode::deserialize(&decompressed).context("failed to deserialize record list")?;

    let mut loaded = Loaded::default();
    for (index, bytes) in raw.iter().enumerate() {
        match bincode::deserialize::<T>(bytes) {
            Ok(record) => loaded.records.push(record),
            Err(err) => {
                warn!(path = %path.display(), index, error = %err, "skipping malformed record");
                loaded.skipped += 1;
            }
        }
    }
    Ok(loaded)
}

/// Directory of per-world record files: `<world>.regions.qr` and `<world>.mines.qr`.
pub struct RecordFileStore {
    dir: PathBuf,
}

impl RecordFileStore {
    /// Create a store rooted at `dir`, creating the directory if needed.
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).context("failed to create data directory")?;
        Ok(Self { dir })
    }

    pub fn regions_path(&self, world: &WorldId) -> PathBuf {
        self.dir.join(format!("{}.regions.qr", world.file_stem()))
    }

    pub fn mines_path(&self, world: &WorldId) -> PathBuf {
        self.dir.join(format!("{}.mines.qr", world.file_stem()))
    }
}

impl SnapshotStore for RecordFileStore {
    fn save_regions(&self, world: &WorldId, regions: &[Region]) -> Result<()> {
        write_records(&self.regions_path(world), regions)
            .with_context(|| format!("failed to save regions of {world}"))
    }

    fn load_regions(&self, world: &WorldId) -> Result<Loaded<Region>> {
        read_records(&self.regions_path(world))
            .with_context(|| format!("failed to load regions of {world}"))
    }

    fn save_mines(&self, world: &WorldId, mines: &[Mine]) -> Result<()> {
        write_records(&self.mines_path(world), mines)
            .with_context(|| format!("failed to save mines of {world}"))
    }

    fn load_mines(&self, world: &WorldId) -> Result<Loaded<Mine>> {
        read_records(&self.mines_path(world))
            .with_context(|| format!("failed to load mines of {world}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::RegionId;
    use quarry_core::BlockPos;

    fn region(id: u64, name: &str) -> Region {
        Region {
            id: RegionId(id),
            name: name.into(),
            world: WorldId::from("overworld"),
            corner1: BlockPos::new(0, 0, 0),
            corner2: BlockPos::new(4, 4, 4),
            flags: ["break".to_string()].into_iter().collect(),
        }
    }

    #[test]
    fn record_header_roundtrip() {
        let header = RecordHeader::new(0xDEADBEEF, 1234);
        let bytes = header.to_bytes();
        let decoded = RecordHeader::from_bytes(&bytes).unwrap();

        assert_eq!(decoded.magic, RECORD_MAGIC);
        assert_eq!(decoded.version, RECORD_VERSION);
        assert_eq!(decoded.crc32, 0xDEADBEEF);
        assert_eq!(decoded.payload_len, 1234);
    }

    #[test]
    fn save_and_load_regions() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordFileStore::new(dir.path()).unwrap();
        let world = WorldId::from("overworld");

        store
            .save_regions(&world, &[region(1, "a"), region(2, "b")])
            .expect("save regions");
        let loaded = store.load_regions(&world).expect("load regions");

        assert_eq!(loaded.skipped, 0);
        assert_eq!(loaded.records, vec![region(1, "a"), region(2, "b")]);
        assert!(store.load_mines(&world).unwrap().records.is_empty());
    }

    #[test]
    fn undecodable_record_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("w.regions.qr");
        let good = bincode::serialize(&region(7, "good")).unwrap();
        write_raw_records(&path, &[vec![0xFF, 0x01], good]).unwrap();

        let loaded: Loaded<Region> = read_records(&path).unwrap();
        assert_eq!(loaded.skipped, 1);
        assert_eq!(loaded.records, vec![region(7, "good")]);
    }

    #[test]
    fn corrupted_payload_fails_crc() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("w.regions.qr");
        write_records(&path, &[region(1, "a")]).unwrap();

        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        fs::write(&path, bytes).unwrap();

        let err = read_records::<Region>(&path).unwrap_err();
        assert!(err.to_string().contains("CRC32 mismatch"));
    }
}
