//! Multi-world voxel server runtime.
//!
//! The crate is organized around [`runtime::WorldRuntime`], which owns a set
//! of isolated [`world::World`]s, a shared background
//! [`generation::ChunkGenerationService`], and the generator/provider
//! registries. Each running world drives its own tick thread; block
//! mutations from any thread are queued and committed once per tick, then
//! fanned out as per-chunk delta batches through [`world::DeltaSink`].
//!
//! ```no_run
//! use voxelhost::config::RuntimeConfig;
//! use voxelhost::runtime::WorldRuntime;
//! use voxelhost::world::BlockId;
//!
//! # fn main() -> Result<(), voxelhost::error::WorldError> {
//! let runtime = WorldRuntime::new(RuntimeConfig::default());
//! let world = runtime.create_world("main", Some("flatgrass"), Some(42), 0, 0)?;
//! world.prepare_spawn(2);
//! world.start()?;
//! world.queue_update(8, 64, 8, BlockId::STONE, 0, None, false)?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod generation;
pub mod lighting;
pub mod persistence;
pub mod physics;
pub mod runtime;
pub mod world;

pub use error::{WorldError, WorldResult};
pub use runtime::WorldRuntime;
pub use world::{BlockId, BlockRecord, World, WorldConfig, WorldLifecycle};
