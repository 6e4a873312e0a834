use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;

use crate::world::grid::BlockGrid;

/// Shared handle to a resident grid.
pub type GridRef = Arc<RwLock<BlockGrid>>;

/// Pack a chunk coordinate pair into one 64-bit map key.
#[inline]
pub fn pack_coords(cx: i32, cz: i32) -> u64 {
    ((cx as u32 as u64) << 32) | (cz as u32 as u64)
}

#[inline]
pub fn unpack_coords(key: u64) -> (i32, i32) {
    ((key >> 32) as u32 as i32, key as u32 as i32)
}

/// A world's sparse collection of resident grids, keyed by packed chunk
/// coordinate.
///
/// Hashed rather than gridded because world extents are unbounded in at
/// least one configurable dimension and chunks load sparsely around active
/// players. A single-slot cache remembers the last grid handed out, so
/// spatially local access patterns (a player editing one chunk) skip the
/// hash lookup. The cache is cleared by every `put`/`remove`.
///
/// The table itself is kept behind the owning world's `RwLock`; mutating
/// methods take `&mut self` and therefore require the write lock.
pub struct ChunkTable {
    map: FxHashMap<u64, GridRef>,
    last: Mutex<Option<(u64, GridRef)>>,
}

impl ChunkTable {
    pub fn new() -> Self {
        Self {
            map: FxHashMap::default(),
            last: Mutex::new(None),
        }
    }

    pub fn get(&self, cx: i32, cz: i32) -> Option<GridRef> {
        let key = pack_coords(cx, cz);
        let mut last = self.last.lock();
        if let Some((cached_key, grid)) = last.as_ref() {
            if *cached_key == key {
                return Some(Arc::clone(grid));
            }
        }
        let grid = self.map.get(&key).cloned()?;
        *last = Some((key, Arc::clone(&grid)));
        Some(grid)
    }

    /// Insert a grid, replacing any existing entry at the same coordinate.
    /// The caller is responsible for persisting the displaced grid first.
    pub fn put(&mut self, cx: i32, cz: i32, grid: BlockGrid) -> GridRef {
        let key = pack_coords(cx, cz);
        let grid = Arc::new(RwLock::new(grid));
        self.map.insert(key, Arc::clone(&grid));
        *self.last.lock() = None;
        grid
    }

    pub fn remove(&mut self, cx: i32, cz: i32) -> Option<GridRef> {
        let key = pack_coords(cx, cz);
        let removed = self.map.remove(&key);
        if removed.is_some() {
            *self.last.lock() = None;
        }
        removed
    }

    pub fn contains(&self, cx: i32, cz: i32) -> bool {
        self.map.contains_key(&pack_coords(cx, cz))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn for_each(&self, mut f: impl FnMut(i32, i32, &GridRef)) {
        for (key, grid) in &self.map {
            let (cx, cz) = unpack_coords(*key);
            f(cx, cz, grid);
        }
    }

    /// Snapshot of all entries, for iteration outside the table lock.
    pub fn snapshot(&self) -> Vec<(i32, i32, GridRef)> {
        self.map
            .iter()
            .map(|(key, grid)| {
                let (cx, cz) = unpack_coords(*key);
                (cx, cz, Arc::clone(grid))
            })
            .collect()
    }
}

impl Default for ChunkTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::block::BlockId;

    #[test]
    fn pack_round_trips_negative_coords() {
        for &(cx, cz) in &[(0, 0), (-1, -1), (i32::MAX, i32::MIN), (-42, 17)] {
            assert_eq!(unpack_coords(pack_coords(cx, cz)), (cx, cz));
        }
    }

    #[test]
    fn put_then_get_returns_same_grid() {
        let mut table = ChunkTable::new();
        let mut grid = BlockGrid::new();
        grid.set_block_id(0, 0, 0, BlockId::STONE).unwrap();
        let inserted = table.put(3, -4, grid);
        let fetched = table.get(3, -4).expect("grid should be resident");
        assert!(Arc::ptr_eq(&inserted, &fetched));
        assert_eq!(fetched.read().block_id(0, 0, 0).unwrap(), BlockId::STONE);
    }

    #[test]
    fn remove_then_get_returns_none() {
        let mut table = ChunkTable::new();
        table.put(1, 2, BlockGrid::new());
        assert!(table.remove(1, 2).is_some());
        assert!(table.get(1, 2).is_none());
        assert!(table.remove(1, 2).is_none());
    }

    #[test]
    fn cache_is_invalidated_by_put() {
        let mut table = ChunkTable::new();
        let first = table.put(0, 0, BlockGrid::new());
        // Prime the cache.
        assert!(Arc::ptr_eq(&first, &table.get(0, 0).unwrap()));
        let second = table.put(0, 0, BlockGrid::new());
        let fetched = table.get(0, 0).unwrap();
        assert!(Arc::ptr_eq(&second, &fetched));
        assert!(!Arc::ptr_eq(&first, &fetched));
    }

    #[test]
    fn cache_is_invalidated_by_remove() {
        let mut table = ChunkTable::new();
        table.put(5, 5, BlockGrid::new());
        table.get(5, 5).unwrap();
        table.remove(5, 5);
        assert!(table.get(5, 5).is_none());
    }

    #[test]
    fn at_most_one_entry_per_coordinate() {
        let mut table = ChunkTable::new();
        table.put(9, 9, BlockGrid::new());
        table.put(9, 9, BlockGrid::new());
        assert_eq!(table.len(), 1);
    }
}
