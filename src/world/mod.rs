//! The world aggregate: one chunk table, one update queue, one entity
//! registry, and the tick thread that drives them.
//!
//! Worlds are the unit of isolation; two worlds share no mutable state.
//! Network and command threads call the public block API concurrently;
//! mutations are queued and the tick thread is the sole authority that
//! commits them to the chunk table.

pub mod block;
pub mod chunk_table;
pub mod delta;
pub mod entity;
pub mod grid;
pub mod update_queue;

pub use block::{BlockId, BlockRecord};
pub use chunk_table::{ChunkTable, GridRef};
pub use delta::{BlockDelta, ChunkDeltaBatch, DeltaSink, NullSink};
pub use entity::{Entity, EntityId, EntityKind, EntityPos, EntityRegistry};
pub use grid::{BlockGrid, GRID_HEIGHT, GRID_WIDTH};
pub use update_queue::{BlockUpdate, UpdateQueue};

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;

use crate::error::{WorldError, WorldResult};
use crate::generation::{
    ChunkGenerationService, GenFlags, GenResponse, RequesterId, TerrainGenerator, WorldId,
};
use crate::lighting::{self, LightingScheduler};
use crate::persistence::{WorldInfo, WorldProvider};
use crate::physics::{PhysicsHandler, PhysicsScheduler, PhysicsState};
use crate::world::chunk_table::pack_coords;

/// Tick-thread lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorldLifecycle {
    Stopped,
    Starting,
    Running,
    Stopping,
}

const LC_STOPPED: u8 = 0;
const LC_STARTING: u8 = 1;
const LC_RUNNING: u8 = 2;
const LC_STOPPING: u8 = 3;

/// Per-world construction parameters.
#[derive(Debug, Clone)]
pub struct WorldConfig {
    pub tick_interval: Duration,
    /// Width in blocks, 0 for unbounded.
    pub width: i32,
    /// Depth in blocks, 0 for unbounded.
    pub depth: i32,
    pub autosave_ticks: Option<u64>,
    pub lighting_batch: usize,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(50),
            width: 0,
            depth: 0,
            autosave_ticks: None,
            lighting_batch: 1024,
        }
    }
}

pub struct World {
    name: String,
    id: WorldId,

    width: AtomicI32,
    depth: AtomicI32,
    spawn: Mutex<EntityPos>,
    access_rule: Mutex<String>,
    build_rule: Mutex<String>,

    time: AtomicU64,
    time_frozen: AtomicBool,
    ticks: AtomicU64,
    tick_interval: Duration,
    autosave_ticks: Option<u64>,
    lighting_batch: usize,

    lifecycle: AtomicU8,
    stop_requested: AtomicBool,
    tick_thread: Mutex<Option<JoinHandle<()>>>,

    chunks: RwLock<ChunkTable>,
    updates: UpdateQueue,
    entities: EntityRegistry,
    physics: PhysicsScheduler,
    lighting: LightingScheduler,

    generator: Arc<dyn TerrainGenerator>,
    generator_name: String,
    seed: u64,
    provider: Mutex<Option<Box<dyn WorldProvider>>>,

    gen_rx: Receiver<GenResponse>,
    gen_tx: Sender<GenResponse>,

    sink: RwLock<Arc<dyn DeltaSink>>,
    physics_handler: RwLock<Option<Arc<dyn PhysicsHandler>>>,
}

impl World {
    pub fn new(
        name: impl Into<String>,
        id: WorldId,
        generator_name: impl Into<String>,
        generator: Arc<dyn TerrainGenerator>,
        seed: u64,
        config: WorldConfig,
    ) -> Arc<World> {
        let (gen_tx, gen_rx) = crossbeam_channel::unbounded();
        Arc::new(World {
            name: name.into(),
            id,
            width: AtomicI32::new(config.width),
            depth: AtomicI32::new(config.depth),
            spawn: Mutex::new(EntityPos::new(8.5, 66.0, 8.5)),
            access_rule: Mutex::new(String::new()),
            build_rule: Mutex::new(String::new()),
            time: AtomicU64::new(0),
            time_frozen: AtomicBool::new(false),
            ticks: AtomicU64::new(0),
            tick_interval: config.tick_interval,
            autosave_ticks: config.autosave_ticks,
            lighting_batch: config.lighting_batch,
            lifecycle: AtomicU8::new(LC_STOPPED),
            stop_requested: AtomicBool::new(false),
            tick_thread: Mutex::new(None),
            chunks: RwLock::new(ChunkTable::new()),
            updates: UpdateQueue::new(),
            entities: EntityRegistry::new(),
            physics: PhysicsScheduler::new(),
            lighting: LightingScheduler::new(),
            generator,
            generator_name: generator_name.into(),
            seed,
            provider: Mutex::new(None),
            gen_rx,
            gen_tx,
            sink: RwLock::new(Arc::new(NullSink)),
            physics_handler: RwLock::new(None),
        })
    }

    // --- identity and metadata ---------------------------------------

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> WorldId {
        self.id
    }

    pub fn generator_name(&self) -> &str {
        &self.generator_name
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn width(&self) -> i32 {
        self.width.load(Ordering::Acquire)
    }

    pub fn depth(&self) -> i32 {
        self.depth.load(Ordering::Acquire)
    }

    pub fn set_size(&self, width: i32, depth: i32) {
        self.width.store(width.max(0), Ordering::Release);
        self.depth.store(depth.max(0), Ordering::Release);
    }

    pub fn spawn_pos(&self) -> EntityPos {
        *self.spawn.lock()
    }

    pub fn set_spawn_pos(&self, pos: EntityPos) {
        *self.spawn.lock() = pos;
    }

    pub fn set_access_rule(&self, rule: impl Into<String>) {
        *self.access_rule.lock() = rule.into();
    }

    pub fn set_build_rule(&self, rule: impl Into<String>) {
        *self.build_rule.lock() = rule.into();
    }

    // --- world time ---------------------------------------------------

    pub fn time(&self) -> u64 {
        self.time.load(Ordering::Acquire)
    }

    pub fn set_time(&self, value: u64) {
        self.time.store(value, Ordering::Release);
    }

    pub fn freeze_time(&self) {
        self.time_frozen.store(true, Ordering::Release);
    }

    pub fn resume_time(&self) {
        self.time_frozen.store(false, Ordering::Release);
    }

    pub fn is_time_frozen(&self) -> bool {
        self.time_frozen.load(Ordering::Acquire)
    }

    pub fn current_tick(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }

    // --- collaborators ------------------------------------------------

    pub fn set_provider(&self, provider: Box<dyn WorldProvider>) {
        *self.provider.lock() = Some(provider);
    }

    pub fn set_delta_sink(&self, sink: Arc<dyn DeltaSink>) {
        *self.sink.write() = sink;
    }

    pub fn set_physics_handler(&self, handler: Arc<dyn PhysicsHandler>) {
        *self.physics_handler.write() = Some(handler);
    }

    // --- physics state ------------------------------------------------

    pub fn physics_state(&self) -> PhysicsState {
        self.physics.state()
    }

    pub fn start_physics(&self) {
        self.physics.resume();
    }

    pub fn pause_physics(&self) {
        self.physics.pause();
    }

    pub fn stop_physics(&self) {
        self.physics.disable();
    }

    pub fn physics(&self) -> &PhysicsScheduler {
        &self.physics
    }

    pub fn lighting(&self) -> &LightingScheduler {
        &self.lighting
    }

    // --- bounds -------------------------------------------------------

    pub fn in_bounds(&self, x: i32, y: i32, z: i32) -> bool {
        if y < 0 || y >= GRID_HEIGHT as i32 {
            return false;
        }
        let w = self.width();
        let d = self.depth();
        (w == 0 || (x >= 0 && x < w)) && (d == 0 || (z >= 0 && z < d))
    }

    pub fn chunk_in_bounds(&self, cx: i32, cz: i32) -> bool {
        let w = self.width();
        let d = self.depth();
        let cw = (w + GRID_WIDTH as i32 - 1) / GRID_WIDTH as i32;
        let cd = (d + GRID_WIDTH as i32 - 1) / GRID_WIDTH as i32;
        (w == 0 || (cx >= 0 && cx < cw)) && (d == 0 || (cz >= 0 && cz < cd))
    }

    #[inline]
    fn locate(x: i32, z: i32) -> (i32, i32, i32, i32) {
        (x >> 4, z >> 4, x & 15, z & 15)
    }

    // --- block queries ------------------------------------------------

    pub fn block_at(&self, x: i32, y: i32, z: i32) -> WorldResult<BlockRecord> {
        if !self.in_bounds(x, y, z) {
            return Err(WorldError::OutOfBounds { x, y, z });
        }
        let (cx, cz, lx, lz) = Self::locate(x, z);
        let grid = self
            .chunks
            .read()
            .get(cx, cz)
            .ok_or(WorldError::ChunkNotResident { cx, cz })?;
        let rec = grid.read().get(lx, y, lz)?;
        Ok(rec)
    }

    pub fn block_id(&self, x: i32, y: i32, z: i32) -> WorldResult<BlockId> {
        Ok(self.block_at(x, y, z)?.id)
    }

    pub fn block_meta(&self, x: i32, y: i32, z: i32) -> WorldResult<u8> {
        Ok(self.block_at(x, y, z)?.meta)
    }

    pub fn block_light(&self, x: i32, y: i32, z: i32) -> WorldResult<u8> {
        Ok(self.block_at(x, y, z)?.block_light)
    }

    pub fn sky_light(&self, x: i32, y: i32, z: i32) -> WorldResult<u8> {
        Ok(self.block_at(x, y, z)?.sky_light)
    }

    pub fn block_extra(&self, x: i32, y: i32, z: i32) -> WorldResult<u8> {
        Ok(self.block_at(x, y, z)?.extra)
    }

    // --- block mutation -----------------------------------------------

    /// Queue a block change for commit on the next tick. The canonical
    /// mutation path; callable from any thread.
    pub fn queue_update(
        &self,
        x: i32,
        y: i32,
        z: i32,
        id: BlockId,
        meta: u8,
        origin: Option<EntityId>,
        physics: bool,
    ) -> WorldResult<()> {
        self.queue_update_record(BlockUpdate {
            x,
            y,
            z,
            id,
            meta,
            extra: 0,
            origin,
            physics,
        })
    }

    pub fn queue_update_record(&self, update: BlockUpdate) -> WorldResult<()> {
        if !self.in_bounds(update.x, update.y, update.z) {
            return Err(WorldError::OutOfBounds {
                x: update.x,
                y: update.y,
                z: update.z,
            });
        }
        self.updates.enqueue(update);
        Ok(())
    }

    /// Administrative direct commit, bypassing the queue. Notifies the
    /// schedulers and the delta sink exactly like a flushed update. The
    /// target chunk must be resident.
    pub fn set_block_now(
        &self,
        x: i32,
        y: i32,
        z: i32,
        id: BlockId,
        meta: u8,
        physics: bool,
    ) -> WorldResult<()> {
        if !self.in_bounds(x, y, z) {
            return Err(WorldError::OutOfBounds { x, y, z });
        }
        let (cx, cz, lx, lz) = Self::locate(x, z);
        let grid = self
            .chunks
            .read()
            .get(cx, cz)
            .ok_or(WorldError::ChunkNotResident { cx, cz })?;
        {
            let mut g = grid.write();
            let mut rec = g.get(lx, y, lz)?;
            rec.id = id;
            rec.meta = meta;
            g.set(lx, y, lz, rec)?;
        }
        self.lighting.notify_block_changed(x, y, z);
        if physics && self.physics.state() != PhysicsState::Off {
            self.physics
                .notify_block_changed(x, y, z, self.current_tick());
        }
        let sink = Arc::clone(&*self.sink.read());
        sink.deliver(
            &self.name,
            ChunkDeltaBatch {
                cx,
                cz,
                deltas: vec![BlockDelta { x, y, z, id, meta }],
            },
        );
        Ok(())
    }

    // --- chunk management ---------------------------------------------

    pub fn chunk(&self, cx: i32, cz: i32) -> Option<GridRef> {
        self.chunks.read().get(cx, cz)
    }

    pub fn is_chunk_resident(&self, cx: i32, cz: i32) -> bool {
        self.chunks.read().contains(cx, cz)
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.read().len()
    }

    /// Get the chunk, loading it from the provider or generating it
    /// synchronously if missing. Provider failures are logged and treated
    /// as "no data"; only generation failures propagate.
    pub fn load_chunk(&self, cx: i32, cz: i32) -> WorldResult<GridRef> {
        if let Some(grid) = self.chunk(cx, cz) {
            return Ok(grid);
        }

        if let Some(provider) = self.provider.lock().as_mut() {
            match provider.load(cx, cz) {
                Ok(Some(grid)) => {
                    return Ok(self.chunks.write().put(cx, cz, grid));
                }
                Ok(None) => {}
                Err(e) => {
                    log::warn!(
                        "[World:{}] failed to load chunk ({}, {}): {}",
                        self.name,
                        cx,
                        cz,
                        e
                    );
                }
            }
        }

        let mut grid = BlockGrid::new();
        self.generator.generate(&mut grid, cx, cz)?;
        lighting::seed_sky_light(&mut grid);
        grid.mark_dirty();
        Ok(self.chunks.write().put(cx, cz, grid))
    }

    /// Unload the chunk, saving it first when requested and a provider is
    /// configured.
    pub fn unload_chunk(&self, cx: i32, cz: i32, save: bool) -> WorldResult<()> {
        let grid = self
            .chunks
            .write()
            .remove(cx, cz)
            .ok_or(WorldError::ChunkNotResident { cx, cz })?;
        if save {
            if let Some(provider) = self.provider.lock().as_mut() {
                let g = grid.read();
                if g.is_dirty() {
                    provider.save(cx, cz, &g).map_err(|e| {
                        log::error!(
                            "[World:{}] failed to save chunk ({}, {}) on unload: {}",
                            self.name,
                            cx,
                            cz,
                            e
                        );
                        WorldError::Persistence(e)
                    })?;
                }
            }
        }
        Ok(())
    }

    /// Load every in-bounds chunk in a square of the given radius around
    /// (center_cx, center_cz). Generation failures are logged per chunk
    /// and do not stop the sweep. Returns how many chunks became resident.
    pub fn load_area(&self, center_cx: i32, center_cz: i32, radius: i32) -> usize {
        let mut loaded = 0;
        for cx in (center_cx - radius)..=(center_cx + radius) {
            for cz in (center_cz - radius)..=(center_cz + radius) {
                if !self.chunk_in_bounds(cx, cz) {
                    continue;
                }
                match self.load_chunk(cx, cz) {
                    Ok(_) => loaded += 1,
                    Err(e) => {
                        log::warn!(
                            "[World:{}] failed to load chunk ({}, {}): {}",
                            self.name,
                            cx,
                            cz,
                            e
                        );
                    }
                }
            }
        }
        loaded
    }

    /// Pre-load a ring of chunks around the spawn point.
    pub fn prepare_spawn(&self, radius: i32) -> usize {
        let spawn = self.spawn_pos();
        let (cx, cz, _, _) = Self::locate(spawn.x.floor() as i32, spawn.z.floor() as i32);
        self.load_area(cx, cz, radius)
    }

    // --- persistence --------------------------------------------------

    pub fn world_info(&self) -> WorldInfo {
        WorldInfo {
            width: self.width(),
            depth: self.depth(),
            spawn: self.spawn_pos(),
            chunk_count: self.chunk_count() as u32,
            generator: self.generator_name.clone(),
            seed: self.seed,
            access_rule: self.access_rule.lock().clone(),
            build_rule: self.build_rule.lock().clone(),
        }
    }

    /// Save all dirty chunks and the world metadata. Per-chunk failures
    /// are logged and skipped; the in-memory state stays authoritative.
    /// Returns how many chunks were written.
    pub fn save_all(&self) -> WorldResult<usize> {
        let snapshot = self.chunks.read().snapshot();
        let mut provider_slot = self.provider.lock();
        let Some(provider) = provider_slot.as_mut() else {
            return Ok(0);
        };

        let mut saved = 0;
        for (cx, cz, grid) in snapshot {
            let g = grid.read();
            if !g.is_dirty() {
                continue;
            }
            let result = provider.save(cx, cz, &g);
            drop(g);
            match result {
                Ok(()) => {
                    grid.write().mark_clean();
                    saved += 1;
                }
                Err(e) => {
                    log::error!(
                        "[World:{}] failed to save chunk ({}, {}): {}",
                        self.name,
                        cx,
                        cz,
                        e
                    );
                }
            }
        }

        let info = WorldInfo {
            width: self.width(),
            depth: self.depth(),
            spawn: self.spawn_pos(),
            chunk_count: saved.max(self.chunk_count()) as u32,
            generator: self.generator_name.clone(),
            seed: self.seed,
            access_rule: self.access_rule.lock().clone(),
            build_rule: self.build_rule.lock().clone(),
        };
        provider.save_info(&info)?;
        Ok(saved)
    }

    /// Save only the world metadata.
    pub fn save_metadata(&self) -> WorldResult<()> {
        let info = self.world_info();
        let mut provider_slot = self.provider.lock();
        if let Some(provider) = provider_slot.as_mut() {
            provider.save_info(&info)?;
        }
        Ok(())
    }

    // --- generation ---------------------------------------------------

    /// Ask the shared generation service for a chunk on the requester's
    /// behalf. The finished grid arrives through this world's inbox and
    /// is inserted by the tick loop.
    pub fn request_chunk(
        &self,
        service: &ChunkGenerationService,
        requester: RequesterId,
        cx: i32,
        cz: i32,
        flags: GenFlags,
        extra: i32,
    ) {
        service.request(
            requester,
            self.id,
            cx,
            cz,
            flags,
            extra,
            Arc::clone(&self.generator),
            self.gen_tx.clone(),
        );
    }

    /// Sender half of this world's generation inbox, for callers that
    /// drive the service directly.
    pub fn gen_reply_sender(&self) -> Sender<GenResponse> {
        self.gen_tx.clone()
    }

    // --- entities -----------------------------------------------------

    pub fn spawn_entity(&self, entity: Entity) -> bool {
        self.entities.spawn(entity)
    }

    pub fn despawn_entity(&self, id: EntityId) -> bool {
        self.entities.despawn(id)
    }

    pub fn entity(&self, id: EntityId) -> Option<Entity> {
        self.entities.get(id)
    }

    pub fn entities(&self) -> Vec<Entity> {
        self.entities.snapshot()
    }

    pub fn entity_registry(&self) -> &EntityRegistry {
        &self.entities
    }

    /// Live entities positioned inside a resident chunk. Acquires the
    /// chunk-table read lock before the entity lock; every caller that
    /// needs both must use this order.
    pub fn entities_in_chunk(&self, cx: i32, cz: i32) -> Vec<Entity> {
        let table = self.chunks.read();
        if !table.contains(cx, cz) {
            return Vec::new();
        }
        let list = self
            .entities
            .snapshot()
            .into_iter()
            .filter(|e| {
                let (ecx, ecz, _, _) = Self::locate(e.pos.x.floor() as i32, e.pos.z.floor() as i32);
                ecx == cx && ecz == cz
            })
            .collect();
        drop(table);
        list
    }

    // --- tick loop ----------------------------------------------------

    pub fn lifecycle(&self) -> WorldLifecycle {
        match self.lifecycle.load(Ordering::Acquire) {
            LC_STARTING => WorldLifecycle::Starting,
            LC_RUNNING => WorldLifecycle::Running,
            LC_STOPPING => WorldLifecycle::Stopping,
            _ => WorldLifecycle::Stopped,
        }
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle.load(Ordering::Acquire) == LC_RUNNING
    }

    /// Spawn the tick thread. Fails with `AlreadyRunning` unless the world
    /// is fully stopped.
    ///
    /// The thread-handle slot's lock serializes `start` and `stop`, so a
    /// spawned thread is always reachable to a concurrent `stop()`.
    pub fn start(self: &Arc<Self>) -> WorldResult<()> {
        let mut slot = self.tick_thread.lock();
        if slot.is_some() {
            return Err(WorldError::AlreadyRunning);
        }
        self.lifecycle.store(LC_STARTING, Ordering::Release);
        self.stop_requested.store(false, Ordering::Release);

        let world = Arc::clone(self);
        *slot = Some(
            thread::Builder::new()
                .name(format!("world-{}", self.name))
                .spawn(move || world.run_loop())
                .expect("failed to spawn world tick thread"),
        );

        self.lifecycle.store(LC_RUNNING, Ordering::Release);
        log::info!(
            "[World:{}] tick thread started ({} ms period)",
            self.name,
            self.tick_interval.as_millis()
        );
        Ok(())
    }

    /// Signal the tick thread to exit after its current tick and join it.
    /// The only long-blocking call in the public contract. Must not be
    /// called from the tick thread itself.
    pub fn stop(&self) -> WorldResult<()> {
        let mut slot = self.tick_thread.lock();
        let Some(handle) = slot.take() else {
            return Err(WorldError::NotRunning);
        };
        self.lifecycle.store(LC_STOPPING, Ordering::Release);
        self.stop_requested.store(true, Ordering::Release);

        if handle.join().is_err() {
            log::error!("[World:{}] tick thread panicked", self.name);
        }
        self.lifecycle.store(LC_STOPPED, Ordering::Release);
        log::info!("[World:{}] tick thread stopped", self.name);
        Ok(())
    }

    fn run_loop(self: Arc<Self>) {
        let period = self.tick_interval;
        let mut next = Instant::now() + period;
        while !self.stop_requested.load(Ordering::Acquire) {
            self.tick();
            let now = Instant::now();
            if now < next {
                thread::sleep(next - now);
            } else {
                // Overrun: free-run to catch up rather than skip work;
                // dropped physics/update processing would corrupt world
                // consistency.
                let drift = now - next;
                if drift >= period {
                    log::warn!(
                        "[World:{}] tick overran its period, running {} ms behind",
                        self.name,
                        drift.as_millis()
                    );
                }
            }
            next += period;
        }
    }

    /// Advance the world by one tick. Driven by the tick thread; manual
    /// calls are for tests and tools and must not overlap a running tick
    /// thread.
    pub fn tick(&self) {
        let tick = self.ticks.fetch_add(1, Ordering::AcqRel) + 1;
        if !self.time_frozen.load(Ordering::Acquire) {
            self.time.fetch_add(1, Ordering::AcqRel);
        }

        let due = self.physics.drain_due(tick);
        if !due.is_empty() {
            let handler = self.physics_handler.read().clone();
            if let Some(handler) = handler {
                for task in &due {
                    handler.on_physics(self, task);
                }
            }
        }

        let records = self.updates.flush();
        if !records.is_empty() {
            self.process_updates(records, tick);
        }

        while let Ok(response) = self.gen_rx.try_recv() {
            self.accept_generated(response);
        }

        let columns = self.lighting.drain(self.lighting_batch);
        if !columns.is_empty() {
            self.relight_columns(&columns);
        }

        let pruned = self.entities.prune();
        if pruned > 0 {
            log::debug!("[World:{}] pruned {} despawned entities", self.name, pruned);
        }

        if let Some(every) = self.autosave_ticks {
            if every > 0 && tick % every == 0 {
                match self.save_all() {
                    Ok(saved) if saved > 0 => {
                        log::info!("[World:{}] autosaved {} chunks", self.name, saved);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        log::warn!("[World:{}] autosave failed: {}", self.name, e);
                    }
                }
            }
        }
    }

    /// Commit one flush worth of updates in enqueue order, then fan out
    /// notifications: per-chunk deltas to the sink, physics when the record
    /// asks for it, lighting for every committed change.
    fn process_updates(&self, records: Vec<BlockUpdate>, now: u64) {
        let physics_enabled = self.physics.state() != PhysicsState::Off;
        let mut batches: Vec<ChunkDeltaBatch> = Vec::new();
        let mut batch_index: FxHashMap<u64, usize> = FxHashMap::default();

        let table = self.chunks.read();
        for update in records {
            if !self.in_bounds(update.x, update.y, update.z) {
                // Bounds can shrink between enqueue and flush.
                continue;
            }
            let (cx, cz, lx, lz) = Self::locate(update.x, update.z);
            let Some(grid) = table.get(cx, cz) else {
                // Chunk unloaded since the update was queued.
                continue;
            };
            {
                let mut g = grid.write();
                let mut rec = match g.get(lx, update.y, lz) {
                    Ok(rec) => rec,
                    Err(_) => continue,
                };
                rec.id = update.id;
                rec.meta = update.meta;
                rec.extra = update.extra;
                if g.set(lx, update.y, lz, rec).is_err() {
                    continue;
                }
            }

            // Committed: notify exactly once, after the grid lock is gone.
            self.lighting
                .notify_block_changed(update.x, update.y, update.z);
            if update.physics && physics_enabled {
                self.physics
                    .notify_block_changed(update.x, update.y, update.z, now);
            }

            let key = pack_coords(cx, cz);
            let bi = *batch_index.entry(key).or_insert_with(|| {
                batches.push(ChunkDeltaBatch {
                    cx,
                    cz,
                    deltas: Vec::new(),
                });
                batches.len() - 1
            });
            batches[bi].deltas.push(BlockDelta {
                x: update.x,
                y: update.y,
                z: update.z,
                id: update.id,
                meta: update.meta,
            });
        }
        drop(table);

        if !batches.is_empty() {
            let sink = Arc::clone(&*self.sink.read());
            for batch in batches {
                sink.deliver(&self.name, batch);
            }
        }
    }

    /// Insert a delivered generation response, discarding it idempotently
    /// when the chunk is no longer wanted.
    fn accept_generated(&self, response: GenResponse) {
        if response.flags.contains(GenFlags::ABORTED) {
            log::debug!(
                "[World:{}] generation of chunk ({}, {}) was aborted",
                self.name,
                response.cx,
                response.cz
            );
            return;
        }
        let Some(mut grid) = response.grid else {
            return;
        };
        if !self.chunk_in_bounds(response.cx, response.cz) {
            return;
        }
        let mut table = self.chunks.write();
        if table.contains(response.cx, response.cz) {
            // Lost the race against a synchronous load; resident data wins.
            log::debug!(
                "[World:{}] discarding duplicate generation of chunk ({}, {})",
                self.name,
                response.cx,
                response.cz
            );
            return;
        }
        grid.mark_dirty();
        table.put(response.cx, response.cz, grid);
    }

    fn relight_columns(&self, columns: &[(i32, i32)]) {
        let table = self.chunks.read();
        for &(x, z) in columns {
            let (cx, cz, lx, lz) = Self::locate(x, z);
            if let Some(grid) = table.get(cx, cz) {
                lighting::recompute_sky_column(&mut grid.write(), lx, lz);
            }
        }
    }
}

impl Drop for World {
    fn drop(&mut self) {
        // The tick thread holds an Arc to the world, so by the time drop
        // runs the thread is necessarily gone; this only tidies the slot.
        if let Some(handle) = self.tick_thread.get_mut().take() {
            let _ = handle.join();
        }
    }
}
