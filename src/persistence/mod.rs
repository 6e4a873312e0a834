//! Pluggable world persistence.
//!
//! The runtime core treats on-disk formats as collaborators behind the
//! [`WorldProvider`] trait: `load`/`save` must be safe to call with the
//! owning world's chunk-table lock held and must complete without calling
//! back into the world. One concrete format ships with the crate
//! ([`binary::BinaryProvider`]); others register through
//! [`ProviderRegistry`].

pub mod binary;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::world::entity::EntityPos;
use crate::world::grid::BlockGrid;

pub type PersistenceResult<T> = Result<T, PersistenceError>;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupted world data: {0}")]
    Corrupted(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("unknown persistence provider \"{0}\"")]
    UnknownProvider(String),

    #[error("provider is not open")]
    NotOpen,
}

impl From<bincode::Error> for PersistenceError {
    fn from(err: bincode::Error) -> Self {
        PersistenceError::Serialization(err.to_string())
    }
}

/// Fields every format must persist for a world, independent of encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldInfo {
    /// World width in blocks, 0 for unbounded.
    pub width: i32,
    /// World depth in blocks, 0 for unbounded.
    pub depth: i32,
    pub spawn: EntityPos,
    pub chunk_count: u32,
    pub generator: String,
    pub seed: u64,
    pub access_rule: String,
    pub build_rule: String,
}

/// A world importer/exporter for one on-disk format.
///
/// `open`/`close` bracket chunk batches so multiple chunks can be moved
/// without reopening the underlying storage each time.
pub trait WorldProvider: Send {
    fn name(&self) -> &'static str;

    fn open(&mut self) -> PersistenceResult<()>;

    fn close(&mut self);

    /// Load one chunk, or `None` if the format has no data for it.
    fn load(&mut self, cx: i32, cz: i32) -> PersistenceResult<Option<BlockGrid>>;

    fn save(&mut self, cx: i32, cz: i32, grid: &BlockGrid) -> PersistenceResult<()>;

    fn save_info(&mut self, info: &WorldInfo) -> PersistenceResult<()>;

    fn info(&mut self) -> PersistenceResult<WorldInfo>;
}

struct ProviderEntry {
    name: &'static str,
    claims: fn(&Path) -> bool,
    factory: fn(PathBuf) -> Box<dyn WorldProvider>,
}

/// Maps provider names to factories and supports format auto-detection for
/// existing world paths.
pub struct ProviderRegistry {
    entries: Vec<ProviderEntry>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn with_defaults() -> Self {
        let mut reg = Self::new();
        reg.register(
            binary::PROVIDER_NAME,
            binary::BinaryProvider::claims,
            |path| Box::new(binary::BinaryProvider::new(path)),
        );
        reg
    }

    pub fn register(
        &mut self,
        name: &'static str,
        claims: fn(&Path) -> bool,
        factory: fn(PathBuf) -> Box<dyn WorldProvider>,
    ) {
        self.entries.push(ProviderEntry {
            name,
            claims,
            factory,
        });
    }

    pub fn create(
        &self,
        name: &str,
        path: impl Into<PathBuf>,
    ) -> PersistenceResult<Box<dyn WorldProvider>> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| (e.factory)(path.into()))
            .ok_or_else(|| PersistenceError::UnknownProvider(name.to_string()))
    }

    /// Determine which registered provider claims the world at `path`.
    pub fn determine(&self, path: &Path) -> Option<&'static str> {
        self.entries
            .iter()
            .find(|e| (e.claims)(path))
            .map(|e| e.name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|e| e.name).collect()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
