//! Background chunk generation.
//!
//! One worker thread is shared by every world in the runtime, bounding total
//! generation concurrency to a single CPU-bound job at a time. Requests are
//! queued per requester and serviced round-robin so no client can starve the
//! others by flooding the service; completed grids are delivered back over
//! the requesting world's inbox channel and picked up by its tick loop.

mod flatgrass;
mod hills;

pub use flatgrass::FlatGrassGenerator;
pub use hills::HillsGenerator;

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Sender;
use parking_lot::{Condvar, Mutex};
use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

use crate::lighting;
use crate::world::grid::BlockGrid;

/// Identity of the party a generation request is issued for, typically a
/// connected client. Used only for fairness scheduling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequesterId(pub u32);

/// Runtime-unique world identity carried through requests so responses can
/// be routed and cancelled without holding a reference to the world itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorldId(pub u32);

/// Request/response flag bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GenFlags(u32);

impl GenFlags {
    pub const NONE: GenFlags = GenFlags(0);
    /// Generation was cancelled or failed; the response carries no grid.
    pub const ABORTED: GenFlags = GenFlags(1);
    /// Drop the grid once generated instead of delivering a response.
    pub const NO_DELIVER: GenFlags = GenFlags(1 << 1);
    /// The request is immune to `cancel_requests`.
    pub const NO_ABORT: GenFlags = GenFlags(1 << 2);

    #[inline]
    pub fn contains(self, other: GenFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for GenFlags {
    type Output = GenFlags;

    fn bitor(self, rhs: GenFlags) -> GenFlags {
        GenFlags(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for GenFlags {
    fn bitor_assign(&mut self, rhs: GenFlags) {
        self.0 |= rhs.0;
    }
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("unknown generator \"{0}\"")]
    UnknownGenerator(String),

    #[error("generator failed: {0}")]
    Failed(String),
}

/// Produces the terrain for one chunk. Implementations must be pure with
/// respect to world state: a function of chunk coordinates and the seed they
/// were constructed with, invoked only from the generation worker thread
/// (or synchronously by a world that needs a chunk immediately).
pub trait TerrainGenerator: Send + Sync {
    fn name(&self) -> &str;

    fn generate(&self, grid: &mut BlockGrid, cx: i32, cz: i32) -> Result<(), GenerationError>;
}

/// Generates nothing but air. Useful for void worlds and as the placeholder
/// fallback when real generation aborts.
pub struct EmptyGenerator;

impl TerrainGenerator for EmptyGenerator {
    fn name(&self) -> &str {
        "empty"
    }

    fn generate(&self, _grid: &mut BlockGrid, _cx: i32, _cz: i32) -> Result<(), GenerationError> {
        Ok(())
    }
}

/// Completed (or aborted) generation work, delivered to the requesting
/// world's inbox.
pub struct GenResponse {
    pub world_id: WorldId,
    pub cx: i32,
    pub cz: i32,
    /// `None` when the request was aborted or the generator failed.
    pub grid: Option<BlockGrid>,
    pub flags: GenFlags,
    pub extra: i32,
}

struct PendingRequest {
    world_id: WorldId,
    cx: i32,
    cz: i32,
    flags: GenFlags,
    extra: i32,
    generator: Arc<dyn TerrainGenerator>,
    reply: Sender<GenResponse>,
}

struct RequesterQueue {
    requester: u32,
    entries: VecDeque<PendingRequest>,
}

#[derive(Default)]
struct ServiceState {
    queues: Vec<RequesterQueue>,
    /// requester id -> index into `queues`.
    by_requester: FxHashMap<u32, usize>,
    /// world id -> requesters that may hold pending entries for it. A
    /// superset: stale entries are tolerated by `cancel_requests`, which
    /// verifies against the actual queues.
    by_world: FxHashMap<u32, FxHashSet<u32>>,
    cursor: usize,
    shutdown: bool,
}

impl ServiceState {
    /// Round-robin selection across requester queues, starting at the
    /// cursor. Emptied queues are dropped so the rotation stays compact.
    fn take_next(&mut self) -> Option<PendingRequest> {
        if self.queues.is_empty() {
            return None;
        }
        let n = self.queues.len();
        let mut taken = None;
        for i in 0..n {
            let idx = (self.cursor + i) % n;
            if let Some(req) = self.queues[idx].entries.pop_front() {
                taken = Some((idx, req));
                break;
            }
        }
        let (idx, req) = taken?;
        self.cursor = (idx + 1) % n;
        if self.queues[idx].entries.is_empty() {
            let removed = self.queues.remove(idx);
            self.by_requester.remove(&removed.requester);
            for (i, q) in self.queues.iter().enumerate() {
                self.by_requester.insert(q.requester, i);
            }
            if self.queues.is_empty() {
                self.cursor = 0;
            } else {
                if idx < self.cursor {
                    self.cursor -= 1;
                }
                self.cursor %= self.queues.len();
            }
        }
        Some(req)
    }

    fn pending(&self) -> usize {
        self.queues.iter().map(|q| q.entries.len()).sum()
    }
}

struct ServiceShared {
    state: Mutex<ServiceState>,
    cond: Condvar,
}

/// The shared background chunk generation worker.
///
/// `request` never blocks beyond a short critical section; the worker parks
/// on the condvar when all queues are empty. `stop()` joins the worker and
/// is the only blocking call.
pub struct ChunkGenerationService {
    shared: Arc<ServiceShared>,
    worker: Mutex<Option<JoinHandle<()>>>,
    started: AtomicBool,
}

impl ChunkGenerationService {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(ServiceShared {
                state: Mutex::new(ServiceState::default()),
                cond: Condvar::new(),
            }),
            worker: Mutex::new(None),
            started: AtomicBool::new(false),
        }
    }

    /// Start the worker thread and begin servicing requests. Idempotent.
    pub fn start(&self) {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return;
        }
        self.shared.state.lock().shutdown = false;
        let shared = Arc::clone(&self.shared);
        *worker = Some(
            thread::Builder::new()
                .name("chunk-gen".into())
                .spawn(move || worker_loop(shared))
                .expect("failed to spawn chunk generation worker"),
        );
        self.started.store(true, Ordering::Release);
        log::info!("[ChunkGenerationService] worker started");
    }

    /// Signal the worker to exit once idle and join it.
    pub fn stop(&self) {
        let handle = {
            let mut worker = self.worker.lock();
            // Cleared under the worker lock so a concurrent `request` cannot
            // respawn the worker of a service being shut down.
            self.started.store(false, Ordering::Release);
            self.shared.state.lock().shutdown = true;
            self.shared.cond.notify_all();
            worker.take()
        };
        if let Some(handle) = handle {
            if handle.join().is_err() {
                log::error!("[ChunkGenerationService] worker panicked during shutdown");
            }
        }
    }

    /// Queue the chunk at (cx, cz) for generation on the requester's behalf.
    /// The response is delivered to `reply` unless `NO_DELIVER` is set.
    pub fn request(
        &self,
        requester: RequesterId,
        world_id: WorldId,
        cx: i32,
        cz: i32,
        flags: GenFlags,
        extra: i32,
        generator: Arc<dyn TerrainGenerator>,
        reply: Sender<GenResponse>,
    ) {
        self.ensure_worker_alive();
        let mut state = self.shared.state.lock();
        let qi = match state.by_requester.get(&requester.0) {
            Some(&i) => i,
            None => {
                state.queues.push(RequesterQueue {
                    requester: requester.0,
                    entries: VecDeque::new(),
                });
                let i = state.queues.len() - 1;
                state.by_requester.insert(requester.0, i);
                i
            }
        };
        state.queues[qi].entries.push_back(PendingRequest {
            world_id,
            cx,
            cz,
            flags,
            extra,
            generator,
            reply,
        });
        state
            .by_world
            .entry(world_id.0)
            .or_default()
            .insert(requester.0);
        drop(state);
        self.shared.cond.notify_one();
    }

    /// Best-effort cancellation of every cancellable request for a world.
    /// Requests already dequeued complete normally; their responses are
    /// discarded by the (absent) receiver. `NO_ABORT` requests are immune.
    pub fn cancel_requests(&self, world_id: WorldId) {
        let mut state = self.shared.state.lock();
        let Some(requesters) = state.by_world.remove(&world_id.0) else {
            return;
        };
        let mut cancelled = 0usize;
        let indices: Vec<usize> = requesters
            .iter()
            .filter_map(|r| state.by_requester.get(r).copied())
            .collect();
        for qi in indices {
            for entry in state.queues[qi].entries.iter_mut() {
                if entry.world_id == world_id && !entry.flags.contains(GenFlags::NO_ABORT) {
                    entry.flags |= GenFlags::ABORTED;
                    cancelled += 1;
                }
            }
        }
        if cancelled > 0 {
            log::debug!(
                "[ChunkGenerationService] cancelled {} pending requests for world {}",
                cancelled,
                world_id.0
            );
        }
    }

    /// Total queued (not yet dequeued) requests, for diagnostics and tests.
    pub fn pending(&self) -> usize {
        self.shared.state.lock().pending()
    }

    /// A dead worker would make every future request hang forever, so a
    /// worker that exited unexpectedly is respawned before enqueuing.
    fn ensure_worker_alive(&self) {
        if !self.started.load(Ordering::Acquire) {
            return;
        }
        let mut worker = self.worker.lock();
        // `stop()` may have won the lock in the meantime.
        if !self.started.load(Ordering::Acquire) {
            return;
        }
        let dead = worker.as_ref().map_or(true, |h| h.is_finished());
        if !dead {
            return;
        }
        if let Some(handle) = worker.take() {
            let _ = handle.join();
        }
        log::error!("[ChunkGenerationService] worker thread died; respawning");
        let shared = Arc::clone(&self.shared);
        shared.state.lock().shutdown = false;
        *worker = Some(
            thread::Builder::new()
                .name("chunk-gen".into())
                .spawn(move || worker_loop(shared))
                .expect("failed to respawn chunk generation worker"),
        );
    }
}

impl Default for ChunkGenerationService {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ChunkGenerationService {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop(shared: Arc<ServiceShared>) {
    loop {
        let request = {
            let mut state = shared.state.lock();
            loop {
                if state.shutdown {
                    log::info!("[ChunkGenerationService] worker stopping");
                    return;
                }
                if let Some(req) = state.take_next() {
                    break req;
                }
                shared.cond.wait(&mut state);
            }
        };
        run_request(request);
    }
}

fn run_request(req: PendingRequest) {
    // Cancelled before dequeue: reply aborted so nobody waits forever.
    if req.flags.contains(GenFlags::ABORTED) && !req.flags.contains(GenFlags::NO_ABORT) {
        if !req.flags.contains(GenFlags::NO_DELIVER) {
            let _ = req.reply.send(GenResponse {
                world_id: req.world_id,
                cx: req.cx,
                cz: req.cz,
                grid: None,
                flags: req.flags,
                extra: req.extra,
            });
        }
        return;
    }

    let mut grid = BlockGrid::new();
    let generator = Arc::clone(&req.generator);
    let (cx, cz) = (req.cx, req.cz);
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| generator.generate(&mut grid, cx, cz)));

    let (grid, flags) = match outcome {
        Ok(Ok(())) => {
            lighting::seed_sky_light(&mut grid);
            (Some(grid), req.flags)
        }
        Ok(Err(err)) => {
            log::warn!(
                "[ChunkGenerationService] generator \"{}\" failed for chunk ({}, {}): {}",
                generator.name(),
                cx,
                cz,
                err
            );
            (None, req.flags | GenFlags::ABORTED)
        }
        Err(_) => {
            log::error!(
                "[ChunkGenerationService] generator \"{}\" panicked for chunk ({}, {})",
                generator.name(),
                cx,
                cz
            );
            (None, req.flags | GenFlags::ABORTED)
        }
    };

    if !req.flags.contains(GenFlags::NO_DELIVER) {
        // A closed inbox means the world is gone; dropping the grid is the
        // correct outcome.
        let _ = req.reply.send(GenResponse {
            world_id: req.world_id,
            cx: req.cx,
            cz: req.cz,
            grid,
            flags,
            extra: req.extra,
        });
    }
}

type GeneratorFactory = Box<dyn Fn(u64) -> Arc<dyn TerrainGenerator> + Send + Sync>;

/// Maps generator names to factories, keeping the world core decoupled from
/// concrete terrain algorithms. Seeds are passed at creation time.
pub struct GeneratorRegistry {
    factories: FxHashMap<String, GeneratorFactory>,
}

impl GeneratorRegistry {
    pub fn new() -> Self {
        Self {
            factories: FxHashMap::default(),
        }
    }

    /// Registry pre-populated with the built-in generators.
    pub fn with_defaults() -> Self {
        let mut reg = Self::new();
        reg.register("flatgrass", |_seed| Arc::new(FlatGrassGenerator));
        reg.register("hills", |seed| Arc::new(HillsGenerator::new(seed)));
        reg.register("empty", |_seed| Arc::new(EmptyGenerator));
        reg
    }

    pub fn register(
        &mut self,
        name: &str,
        factory: impl Fn(u64) -> Arc<dyn TerrainGenerator> + Send + Sync + 'static,
    ) {
        self.factories.insert(name.to_string(), Box::new(factory));
    }

    pub fn create(
        &self,
        name: &str,
        seed: u64,
    ) -> Result<Arc<dyn TerrainGenerator>, GenerationError> {
        match self.factories.get(name) {
            Some(factory) => Ok(factory(seed)),
            None => Err(GenerationError::UnknownGenerator(name.to_string())),
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }
}

impl Default for GeneratorRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
