//! The built-in directory-based world format.
//!
//! Layout:
//! ```text
//! <world dir>/
//!   world.meta            bincode-encoded WorldInfo
//!   chunks/
//!     c.<cx>.<cz>.dat     zlib-compressed bincode GridData
//! ```
//! Writes go through a temp file followed by a rename, so a crash mid-save
//! never leaves a truncated chunk behind.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};

use crate::persistence::{PersistenceError, PersistenceResult, WorldInfo, WorldProvider};
use crate::world::grid::BlockGrid;

pub const PROVIDER_NAME: &str = "vxb";

const META_FILE: &str = "world.meta";
const CHUNK_DIR: &str = "chunks";
const FORMAT_VERSION: u16 = 1;

/// Serialized form of one grid. The heightmap is derived on load rather
/// than stored.
#[derive(Serialize, Deserialize)]
struct GridData {
    version: u16,
    ids: Vec<u16>,
    meta: Vec<u8>,
    light: Vec<u8>,
    extra: Vec<u8>,
}

pub struct BinaryProvider {
    root: PathBuf,
    open: bool,
}

impl BinaryProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            open: false,
        }
    }

    /// Format auto-detection: a directory holding a `world.meta` file.
    pub fn claims(path: &Path) -> bool {
        path.is_dir() && path.join(META_FILE).is_file()
    }

    fn chunk_path(&self, cx: i32, cz: i32) -> PathBuf {
        self.root.join(CHUNK_DIR).join(format!("c.{}.{}.dat", cx, cz))
    }

    fn require_open(&self) -> PersistenceResult<()> {
        if self.open {
            Ok(())
        } else {
            Err(PersistenceError::NotOpen)
        }
    }

    fn atomic_write(path: &Path, bytes: &[u8]) -> PersistenceResult<()> {
        let tmp = path.with_extension("tmp");
        {
            let mut file = File::create(&tmp)?;
            file.write_all(bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

impl WorldProvider for BinaryProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn open(&mut self) -> PersistenceResult<()> {
        fs::create_dir_all(self.root.join(CHUNK_DIR))?;
        self.open = true;
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn load(&mut self, cx: i32, cz: i32) -> PersistenceResult<Option<BlockGrid>> {
        self.require_open()?;
        let path = self.chunk_path(cx, cz);
        let file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut raw = Vec::new();
        ZlibDecoder::new(file).read_to_end(&mut raw)?;
        let data: GridData = bincode::deserialize(&raw)?;
        if data.version != FORMAT_VERSION {
            return Err(PersistenceError::Corrupted(format!(
                "chunk ({}, {}): unsupported format version {}",
                cx, cz, data.version
            )));
        }
        let grid = BlockGrid::from_raw(data.ids, data.meta, data.light, data.extra)
            .ok_or_else(|| {
                PersistenceError::Corrupted(format!(
                    "chunk ({}, {}): array length mismatch",
                    cx, cz
                ))
            })?;
        Ok(Some(grid))
    }

    fn save(&mut self, cx: i32, cz: i32, grid: &BlockGrid) -> PersistenceResult<()> {
        self.require_open()?;
        let data = GridData {
            version: FORMAT_VERSION,
            ids: grid.raw_ids().to_vec(),
            meta: grid.raw_meta().to_vec(),
            light: grid.raw_light().to_vec(),
            extra: grid.raw_extra().to_vec(),
        };
        let raw = bincode::serialize(&data)?;
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&raw)?;
        let compressed = encoder.finish()?;
        Self::atomic_write(&self.chunk_path(cx, cz), &compressed)
    }

    fn save_info(&mut self, info: &WorldInfo) -> PersistenceResult<()> {
        self.require_open()?;
        let bytes = bincode::serialize(info)?;
        Self::atomic_write(&self.root.join(META_FILE), &bytes)
    }

    fn info(&mut self) -> PersistenceResult<WorldInfo> {
        self.require_open()?;
        let mut bytes = Vec::new();
        File::open(self.root.join(META_FILE))?.read_to_end(&mut bytes)?;
        Ok(bincode::deserialize(&bytes)?)
    }
}
