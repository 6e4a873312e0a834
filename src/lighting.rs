//! Sky-light recomputation scheduling.
//!
//! Every committed block change is reported here (light must be recomputed
//! for every change, unlike physics). Work is coalesced per column and
//! processed in bounded batches from the tick loop so a mass edit cannot
//! stall a tick indefinitely.

use std::collections::VecDeque;

use parking_lot::Mutex;
use rustc_hash::FxHashSet;

use crate::world::grid::{BlockGrid, GRID_HEIGHT, GRID_WIDTH};

/// Pending light recomputes for one world, keyed by world block coordinate.
pub struct LightingScheduler {
    queue: Mutex<VecDeque<(i32, i32)>>,
    queued: Mutex<FxHashSet<(i32, i32)>>,
}

impl LightingScheduler {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            queued: Mutex::new(FxHashSet::default()),
        }
    }

    /// Called by the flush path once per committed mutation, after the
    /// mutation is visible in the chunk table. Coalesces repeat changes to
    /// the same column.
    pub fn notify_block_changed(&self, x: i32, _y: i32, z: i32) {
        if self.queued.lock().insert((x, z)) {
            self.queue.lock().push_back((x, z));
        }
    }

    /// Pop up to `max` pending columns, oldest first.
    pub fn drain(&self, max: usize) -> Vec<(i32, i32)> {
        let mut queue = self.queue.lock();
        let take = max.min(queue.len());
        let drained: Vec<(i32, i32)> = queue.drain(..take).collect();
        drop(queue);
        if !drained.is_empty() {
            let mut queued = self.queued.lock();
            for col in &drained {
                queued.remove(col);
            }
        }
        drained
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }
}

impl Default for LightingScheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Recompute the sky-light column at local (x, z): full daylight from the
/// top down to the first opaque block, darkness below it.
pub fn recompute_sky_column(grid: &mut BlockGrid, x: i32, z: i32) {
    let mut level = 15u8;
    for y in (0..GRID_HEIGHT as i32).rev() {
        // Column coordinates are validated once by the first access.
        let id = match grid.block_id(x, y, z) {
            Ok(id) => id,
            Err(_) => return,
        };
        if !id.is_transparent() {
            level = 0;
        }
        let _ = grid.set_sky_light(x, y, z, level);
    }
}

/// Seed sky light for every column of a freshly generated or loaded grid.
pub fn seed_sky_light(grid: &mut BlockGrid) {
    for x in 0..GRID_WIDTH as i32 {
        for z in 0..GRID_WIDTH as i32 {
            recompute_sky_column(grid, x, z);
        }
    }
}
