//! Crate-wide error taxonomy.
//!
//! Per-chunk failures (generation, persistence) are isolated to the affected
//! request and never halt a world's tick loop; lifecycle misuse is reported
//! synchronously to the caller.

use thiserror::Error;

use crate::generation::GenerationError;
use crate::persistence::PersistenceError;

pub type WorldResult<T> = Result<T, WorldError>;

#[derive(Debug, Error)]
pub enum WorldError {
    /// Coordinate outside the declared world extents or grid dimensions.
    /// A programming error on the caller's side, never user-facing.
    #[error("block coordinate ({x}, {y}, {z}) is out of bounds")]
    OutOfBounds { x: i32, y: i32, z: i32 },

    /// Query against a chunk that is not loaded. Recoverable: the caller
    /// can trigger a load and retry.
    #[error("chunk ({cx}, {cz}) is not resident")]
    ChunkNotResident { cx: i32, cz: i32 },

    #[error("terrain generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("persistence operation failed: {0}")]
    Persistence(#[from] PersistenceError),

    /// `start()` on a world whose tick thread is already running.
    #[error("world tick thread is already running")]
    AlreadyRunning,

    /// `stop()` on a world whose tick thread is not running.
    #[error("world tick thread is not running")]
    NotRunning,

    #[error("a world named \"{0}\" already exists")]
    WorldExists(String),

    #[error("no world named \"{0}\" is loaded")]
    NoSuchWorld(String),
}
