//! Tick-delayed physics scheduling.
//!
//! The scheduler itself only orders work; what a fired task *does* is up to
//! the [`PhysicsHandler`] the owning world was configured with (falling sand,
//! liquid spread, and so on live above this crate's core).

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxHashSet;

use crate::world::World;

/// Ticks between a block change and the physics reaction it triggers.
pub const REACT_DELAY_TICKS: u64 = 1;

/// Physics scheduling state for one world.
///
/// `Paused` retains queued tasks but fires none; `Off` drops tasks at
/// enqueue time, not merely at run time. That distinction is observable:
/// resuming from `Paused` fires the backlog, turning physics back on after
/// `Off` does not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhysicsState {
    On,
    Paused,
    Off,
}

impl PhysicsState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => PhysicsState::On,
            1 => PhysicsState::Paused,
            _ => PhysicsState::Off,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            PhysicsState::On => 0,
            PhysicsState::Paused => 1,
            PhysicsState::Off => 2,
        }
    }
}

/// One scheduled physics callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhysicsTask {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub due_tick: u64,
    pub extra: i32,
}

#[derive(PartialEq, Eq)]
struct QueuedTask {
    task: PhysicsTask,
    seq: u64,
}

impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.task.due_tick, self.seq).cmp(&(other.task.due_tick, other.seq))
    }
}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Reaction to a fired physics task. Runs on the tick thread; may enqueue
/// further updates through the world's public API (the update queue makes
/// that re-entrancy safe), but must not call back into `drain_due`.
pub trait PhysicsHandler: Send + Sync {
    fn on_physics(&self, world: &World, task: &PhysicsTask);
}

/// Min-heap of delayed physics tasks for one world.
pub struct PhysicsScheduler {
    state: AtomicU8,
    queue: Mutex<BinaryHeap<Reverse<QueuedTask>>>,
    /// Coordinates currently queued via `schedule_once`.
    queued_once: Mutex<FxHashSet<(i32, i32, i32)>>,
    seq: AtomicU64,
}

impl PhysicsScheduler {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(PhysicsState::On.as_u8()),
            queue: Mutex::new(BinaryHeap::new()),
            queued_once: Mutex::new(FxHashSet::default()),
            seq: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> PhysicsState {
        PhysicsState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn resume(&self) {
        self.state.store(PhysicsState::On.as_u8(), Ordering::Release);
    }

    pub fn pause(&self) {
        self.state
            .store(PhysicsState::Paused.as_u8(), Ordering::Release);
    }

    /// Disable physics and discard everything already queued.
    pub fn disable(&self) {
        self.state.store(PhysicsState::Off.as_u8(), Ordering::Release);
        self.queue.lock().clear();
        self.queued_once.lock().clear();
    }

    /// Queue a task to fire `delay` ticks from `now`. Dropped when physics
    /// is off. Returns whether the task was queued.
    pub fn schedule(&self, x: i32, y: i32, z: i32, delay: u64, extra: i32, now: u64) -> bool {
        if self.state() == PhysicsState::Off {
            return false;
        }
        let task = PhysicsTask {
            x,
            y,
            z,
            due_tick: now + delay,
            extra,
        };
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        self.queue.lock().push(Reverse(QueuedTask { task, seq }));
        true
    }

    /// Like `schedule`, but a no-op if that coordinate is already queued
    /// through this method.
    pub fn schedule_once(&self, x: i32, y: i32, z: i32, delay: u64, extra: i32, now: u64) -> bool {
        if self.state() == PhysicsState::Off {
            return false;
        }
        if !self.queued_once.lock().insert((x, y, z)) {
            return false;
        }
        self.schedule(x, y, z, delay, extra, now)
    }

    /// Called by the flush path once per committed mutation that carries
    /// physics intent. The world guarantees the mutation is already visible
    /// in the chunk table when this runs.
    pub fn notify_block_changed(&self, x: i32, y: i32, z: i32, now: u64) {
        self.schedule(x, y, z, REACT_DELAY_TICKS, 0, now);
    }

    /// Pop every task due at or before `now`, in due order. Returns nothing
    /// unless the scheduler is `On`.
    pub fn drain_due(&self, now: u64) -> Vec<PhysicsTask> {
        if self.state() != PhysicsState::On {
            return Vec::new();
        }
        let mut queue = self.queue.lock();
        let mut due = Vec::new();
        while let Some(Reverse(head)) = queue.peek() {
            if head.task.due_tick > now {
                break;
            }
            let Reverse(entry) = queue.pop().expect("peeked entry must pop");
            due.push(entry.task);
        }
        if !due.is_empty() {
            let mut once = self.queued_once.lock();
            for task in &due {
                once.remove(&(task.x, task.y, task.z));
            }
        }
        due
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }
}

impl Default for PhysicsScheduler {
    fn default() -> Self {
        Self::new()
    }
}
