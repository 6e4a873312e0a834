//! The multi-world runtime.
//!
//! Owns the name-to-world registry, the shared chunk generation service,
//! the generator and provider registries, and the runtime-wide id counters.
//! Worlds never reference each other; everything cross-world goes through
//! this type.

use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rand::Rng;

use crate::config::RuntimeConfig;
use crate::error::{WorldError, WorldResult};
use crate::generation::{ChunkGenerationService, GeneratorRegistry, RequesterId, WorldId};
use crate::persistence::{PersistenceError, ProviderRegistry};
use crate::world::{EntityId, World, WorldConfig};

pub struct WorldRuntime {
    config: RuntimeConfig,
    worlds: DashMap<String, Arc<World>>,
    generation: ChunkGenerationService,
    providers: ProviderRegistry,
    generators: GeneratorRegistry,
    next_entity_id: AtomicU32,
    next_world_id: AtomicU32,
}

impl WorldRuntime {
    /// Build a runtime and start the shared generation worker.
    pub fn new(config: RuntimeConfig) -> Self {
        let generation = ChunkGenerationService::new();
        generation.start();
        Self {
            config,
            worlds: DashMap::new(),
            generation,
            providers: ProviderRegistry::with_defaults(),
            generators: GeneratorRegistry::with_defaults(),
            next_entity_id: AtomicU32::new(1),
            next_world_id: AtomicU32::new(1),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn generation(&self) -> &ChunkGenerationService {
        &self.generation
    }

    pub fn generators(&self) -> &GeneratorRegistry {
        &self.generators
    }

    pub fn generators_mut(&mut self) -> &mut GeneratorRegistry {
        &mut self.generators
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    pub fn providers_mut(&mut self) -> &mut ProviderRegistry {
        &mut self.providers
    }

    fn world_config(&self, width: i32, depth: i32) -> WorldConfig {
        WorldConfig {
            tick_interval: Duration::from_millis(self.config.tick_interval_ms.max(1)),
            width,
            depth,
            autosave_ticks: self.config.autosave_ticks,
            lighting_batch: self.config.lighting_batch,
        }
    }

    /// Create a fresh in-memory world. `generator` and `seed` fall back to
    /// the runtime defaults; a missing default seed is drawn at random.
    /// Width and depth of 0 mean unbounded.
    pub fn create_world(
        &self,
        name: &str,
        generator: Option<&str>,
        seed: Option<u64>,
        width: i32,
        depth: i32,
    ) -> WorldResult<Arc<World>> {
        let generator_name = generator.unwrap_or(&self.config.default_generator);
        let seed = seed
            .or(self.config.default_seed)
            .unwrap_or_else(|| rand::thread_rng().gen());
        let terrain = self.generators.create(generator_name, seed)?;
        let world = World::new(
            name,
            self.allocate_world_id(),
            generator_name,
            terrain,
            seed,
            self.world_config(width, depth),
        );
        match self.worlds.entry(name.to_string()) {
            Entry::Occupied(_) => Err(WorldError::WorldExists(name.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&world));
                log::info!(
                    "[WorldRuntime] created world \"{}\" (generator {}, seed {})",
                    name,
                    generator_name,
                    seed
                );
                Ok(world)
            }
        }
    }

    /// Open an existing world from disk, auto-detecting its format among the
    /// registered providers.
    pub fn open_world(&self, name: &str, path: &Path) -> WorldResult<Arc<World>> {
        let provider_name = self.providers.determine(path).ok_or_else(|| {
            WorldError::Persistence(PersistenceError::UnknownProvider(
                path.display().to_string(),
            ))
        })?;
        let mut provider = self.providers.create(provider_name, path)?;
        provider.open()?;
        let info = provider.info()?;

        let terrain = self.generators.create(&info.generator, info.seed)?;
        let world = World::new(
            name,
            self.allocate_world_id(),
            info.generator.clone(),
            terrain,
            info.seed,
            self.world_config(info.width, info.depth),
        );
        world.set_spawn_pos(info.spawn);
        world.set_access_rule(info.access_rule);
        world.set_build_rule(info.build_rule);
        world.set_provider(provider);

        match self.worlds.entry(name.to_string()) {
            Entry::Occupied(_) => Err(WorldError::WorldExists(name.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&world));
                log::info!(
                    "[WorldRuntime] opened world \"{}\" from {} ({} format)",
                    name,
                    path.display(),
                    provider_name
                );
                Ok(world)
            }
        }
    }

    /// Attach a fresh on-disk store to a world that was created in memory.
    pub fn attach_provider(
        &self,
        world: &World,
        provider_name: &str,
        path: &Path,
    ) -> WorldResult<()> {
        let mut provider = self.providers.create(provider_name, path)?;
        provider.open()?;
        world.set_provider(provider);
        Ok(())
    }

    pub fn world(&self, name: &str) -> WorldResult<Arc<World>> {
        self.worlds
            .get(name)
            .map(|w| Arc::clone(&w))
            .ok_or_else(|| WorldError::NoSuchWorld(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.worlds.contains_key(name)
    }

    pub fn world_names(&self) -> Vec<String> {
        self.worlds.iter().map(|e| e.key().clone()).collect()
    }

    pub fn worlds(&self) -> Vec<Arc<World>> {
        self.worlds.iter().map(|e| Arc::clone(&e)).collect()
    }

    pub fn world_count(&self) -> usize {
        self.worlds.len()
    }

    /// Detach a world from the runtime: cancel its pending generation,
    /// stop its tick thread and save what it holds.
    pub fn remove_world(&self, name: &str) -> WorldResult<()> {
        let (_, world) = self
            .worlds
            .remove(name)
            .ok_or_else(|| WorldError::NoSuchWorld(name.to_string()))?;
        self.generation.cancel_requests(world.id());
        match world.stop() {
            Ok(()) | Err(WorldError::NotRunning) => {}
            Err(e) => return Err(e),
        }
        if let Err(e) = world.save_all() {
            log::error!(
                "[WorldRuntime] failed to save world \"{}\" on removal: {}",
                name,
                e
            );
        }
        log::info!("[WorldRuntime] removed world \"{}\"", name);
        Ok(())
    }

    /// Stop every world and the generation worker. Safe to call twice.
    pub fn shutdown(&self) {
        let names = self.world_names();
        for name in names {
            if let Err(e) = self.remove_world(&name) {
                log::error!("[WorldRuntime] failed to remove world \"{}\": {}", name, e);
            }
        }
        self.generation.stop();
        log::info!("[WorldRuntime] shut down");
    }

    // --- id allocation -------------------------------------------------

    pub fn allocate_entity_id(&self) -> EntityId {
        EntityId(self.next_entity_id.fetch_add(1, Ordering::Relaxed))
    }

    fn allocate_world_id(&self) -> WorldId {
        WorldId(self.next_world_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Requester identity for fairness scheduling, derived from the entity
    /// the requests are issued for.
    pub fn requester_for(&self, entity: EntityId) -> RequesterId {
        RequesterId(entity.0)
    }
}

impl Drop for WorldRuntime {
    fn drop(&mut self) {
        self.shutdown();
    }
}
