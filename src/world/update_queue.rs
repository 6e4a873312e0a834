use parking_lot::Mutex;

use crate::world::block::BlockId;
use crate::world::entity::EntityId;

/// A pending block mutation, queued by any thread and committed by the
/// owning world's tick thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockUpdate {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub id: BlockId,
    pub meta: u8,
    pub extra: u8,
    /// Entity that initiated the update, if any.
    pub origin: Option<EntityId>,
    /// Whether the physics scheduler should react to this change.
    pub physics: bool,
}

/// Ordered list of pending block mutations for one world.
///
/// Many producers, one consumer. `enqueue` holds the lock only long enough
/// to push; `flush` swaps the whole queue out atomically, so every record
/// lands in exactly one flush result and records enqueued during the swap
/// simply land in the fresh queue for the next tick.
pub struct UpdateQueue {
    pending: Mutex<Vec<BlockUpdate>>,
}

impl UpdateQueue {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(Vec::new()),
        }
    }

    pub fn enqueue(&self, update: BlockUpdate) {
        self.pending.lock().push(update);
    }

    /// Drain all pending records in enqueue order. Called only from the
    /// owning world's tick thread.
    pub fn flush(&self) -> Vec<BlockUpdate> {
        std::mem::take(&mut *self.pending.lock())
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}

impl Default for UpdateQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn update(x: i32, physics: bool) -> BlockUpdate {
        BlockUpdate {
            x,
            y: 0,
            z: 0,
            id: BlockId::STONE,
            meta: 0,
            extra: 0,
            origin: None,
            physics,
        }
    }

    #[test]
    fn flush_preserves_enqueue_order() {
        let queue = UpdateQueue::new();
        for x in 0..100 {
            queue.enqueue(update(x, false));
        }
        let drained = queue.flush();
        let xs: Vec<i32> = drained.iter().map(|u| u.x).collect();
        assert_eq!(xs, (0..100).collect::<Vec<_>>());
        assert!(queue.flush().is_empty());
    }

    #[test]
    fn concurrent_enqueues_each_appear_exactly_once() {
        let queue = Arc::new(UpdateQueue::new());
        let producers = 8;
        let per_producer = 500;

        let mut handles = Vec::new();
        for p in 0..producers {
            let queue = Arc::clone(&queue);
            handles.push(thread::spawn(move || {
                for i in 0..per_producer {
                    queue.enqueue(update(p * per_producer + i, false));
                }
            }));
        }

        // Flush concurrently with the producers, like a running tick thread.
        let mut seen: Vec<i32> = Vec::new();
        loop {
            for u in queue.flush() {
                seen.push(u.x);
            }
            if handles.iter().all(|h| h.is_finished()) {
                break;
            }
        }
        for h in handles {
            h.join().unwrap();
        }
        for u in queue.flush() {
            seen.push(u.x);
        }

        assert_eq!(seen.len(), (producers * per_producer) as usize);

        // Per-producer relative order survives interleaved flushes.
        for p in 0..producers {
            let lo = p * per_producer;
            let hi = lo + per_producer;
            let of_producer: Vec<i32> =
                seen.iter().copied().filter(|x| *x >= lo && *x < hi).collect();
            assert_eq!(of_producer, (lo..hi).collect::<Vec<_>>());
        }

        // Exactly once: no duplicates.
        let mut sorted = seen.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), seen.len());
    }
}
