use crate::error::WorldError;
use crate::world::block::{BlockId, BlockRecord};

/// Blocks along each horizontal axis of a grid.
pub const GRID_WIDTH: usize = 16;
/// Blocks along the vertical axis of a grid.
pub const GRID_HEIGHT: usize = 256;
/// Total block count in one grid.
pub const GRID_VOLUME: usize = GRID_WIDTH * GRID_WIDTH * GRID_HEIGHT;

/// The in-memory block array backing one chunk.
///
/// Stored as parallel flat arrays in XZY order so vertical scans (lighting,
/// heightmap maintenance) walk memory contiguously. Coordinates are local;
/// callers are expected to reduce world coordinates modulo the grid
/// dimensions first. Out-of-range coordinates are rejected, never clamped.
///
/// A grid carries no locking of its own. While a grid is in flight
/// (generation, load from disk) it is owned by value; once inserted into a
/// chunk table it lives behind the table's `Arc<RwLock<_>>` wrapper.
pub struct BlockGrid {
    ids: Box<[u16]>,
    meta: Box<[u8]>,
    /// Packed light nibbles: `(sky << 4) | block`.
    light: Box<[u8]>,
    extra: Box<[u8]>,
    /// Highest non-air y per column, -1 for an empty column.
    heightmap: Box<[i16]>,
    dirty: bool,
}

impl BlockGrid {
    /// A grid of air with full sky light everywhere.
    pub fn new() -> Self {
        Self {
            ids: vec![0u16; GRID_VOLUME].into_boxed_slice(),
            meta: vec![0u8; GRID_VOLUME].into_boxed_slice(),
            light: vec![0xF0u8; GRID_VOLUME].into_boxed_slice(),
            extra: vec![0u8; GRID_VOLUME].into_boxed_slice(),
            heightmap: vec![-1i16; GRID_WIDTH * GRID_WIDTH].into_boxed_slice(),
            dirty: false,
        }
    }

    #[inline]
    fn index(x: i32, y: i32, z: i32) -> Result<usize, WorldError> {
        if x < 0
            || y < 0
            || z < 0
            || x >= GRID_WIDTH as i32
            || y >= GRID_HEIGHT as i32
            || z >= GRID_WIDTH as i32
        {
            return Err(WorldError::OutOfBounds { x, y, z });
        }
        Ok(((x as usize) * GRID_WIDTH + z as usize) * GRID_HEIGHT + y as usize)
    }

    #[inline]
    fn column(x: i32, z: i32) -> usize {
        (x as usize) * GRID_WIDTH + z as usize
    }

    pub fn get(&self, x: i32, y: i32, z: i32) -> Result<BlockRecord, WorldError> {
        let i = Self::index(x, y, z)?;
        Ok(BlockRecord {
            id: BlockId(self.ids[i]),
            meta: self.meta[i],
            block_light: self.light[i] & 0x0F,
            sky_light: self.light[i] >> 4,
            extra: self.extra[i],
        })
    }

    pub fn set(&mut self, x: i32, y: i32, z: i32, rec: BlockRecord) -> Result<(), WorldError> {
        let i = Self::index(x, y, z)?;
        self.ids[i] = rec.id.0;
        self.meta[i] = rec.meta;
        self.light[i] = (rec.sky_light << 4) | (rec.block_light & 0x0F);
        self.extra[i] = rec.extra;
        self.update_heightmap(x, y, z, rec.id);
        self.dirty = true;
        Ok(())
    }

    pub fn block_id(&self, x: i32, y: i32, z: i32) -> Result<BlockId, WorldError> {
        Ok(BlockId(self.ids[Self::index(x, y, z)?]))
    }

    pub fn set_block_id(&mut self, x: i32, y: i32, z: i32, id: BlockId) -> Result<(), WorldError> {
        let i = Self::index(x, y, z)?;
        self.ids[i] = id.0;
        self.update_heightmap(x, y, z, id);
        self.dirty = true;
        Ok(())
    }

    pub fn meta(&self, x: i32, y: i32, z: i32) -> Result<u8, WorldError> {
        Ok(self.meta[Self::index(x, y, z)?])
    }

    pub fn set_meta(&mut self, x: i32, y: i32, z: i32, val: u8) -> Result<(), WorldError> {
        let i = Self::index(x, y, z)?;
        self.meta[i] = val;
        self.dirty = true;
        Ok(())
    }

    pub fn block_light(&self, x: i32, y: i32, z: i32) -> Result<u8, WorldError> {
        Ok(self.light[Self::index(x, y, z)?] & 0x0F)
    }

    pub fn set_block_light(&mut self, x: i32, y: i32, z: i32, val: u8) -> Result<(), WorldError> {
        let i = Self::index(x, y, z)?;
        self.light[i] = (self.light[i] & 0xF0) | (val & 0x0F);
        self.dirty = true;
        Ok(())
    }

    pub fn sky_light(&self, x: i32, y: i32, z: i32) -> Result<u8, WorldError> {
        Ok(self.light[Self::index(x, y, z)?] >> 4)
    }

    pub fn set_sky_light(&mut self, x: i32, y: i32, z: i32, val: u8) -> Result<(), WorldError> {
        let i = Self::index(x, y, z)?;
        self.light[i] = ((val & 0x0F) << 4) | (self.light[i] & 0x0F);
        self.dirty = true;
        Ok(())
    }

    pub fn extra(&self, x: i32, y: i32, z: i32) -> Result<u8, WorldError> {
        Ok(self.extra[Self::index(x, y, z)?])
    }

    pub fn set_extra(&mut self, x: i32, y: i32, z: i32, val: u8) -> Result<(), WorldError> {
        let i = Self::index(x, y, z)?;
        self.extra[i] = val;
        self.dirty = true;
        Ok(())
    }

    /// Fill `[y_from, y_to)` of one column with the given block type.
    /// Generator convenience; the vertical run is contiguous in memory.
    /// An empty range is a no-op.
    pub fn fill_column(
        &mut self,
        x: i32,
        z: i32,
        y_from: i32,
        y_to: i32,
        id: BlockId,
    ) -> Result<(), WorldError> {
        if y_from < 0 || y_to > GRID_HEIGHT as i32 || y_from > y_to {
            return Err(WorldError::OutOfBounds { x, y: y_from, z });
        }
        if y_from == y_to {
            return Ok(());
        }
        let base = Self::index(x, y_from, z)?;
        for off in 0..(y_to - y_from) as usize {
            self.ids[base + off] = id.0;
        }
        let col = Self::column(x, z);
        if !id.is_air() {
            self.heightmap[col] = self.heightmap[col].max((y_to - 1) as i16);
        } else {
            let h = self.heightmap[col];
            // Carving away the old top invalidates it; rescan downward for
            // the next solid block.
            if h >= y_from as i16 && h < y_to as i16 {
                let colbase = base - y_from as usize;
                let mut ny = y_from - 1;
                while ny >= 0 && self.ids[colbase + ny as usize] == 0 {
                    ny -= 1;
                }
                self.heightmap[col] = ny as i16;
            }
        }
        self.dirty = true;
        Ok(())
    }

    /// Highest non-air y in the column, or -1 if the column is all air.
    pub fn height(&self, x: i32, z: i32) -> Result<i16, WorldError> {
        Self::index(x, 0, z)?;
        Ok(self.heightmap[Self::column(x, z)])
    }

    fn update_heightmap(&mut self, x: i32, y: i32, z: i32, id: BlockId) {
        let col = Self::column(x, z);
        let h = self.heightmap[col];
        if !id.is_air() {
            if y as i16 > h {
                self.heightmap[col] = y as i16;
            }
        } else if y as i16 == h {
            // The old top was removed; scan down for the next solid block.
            let base = ((x as usize) * GRID_WIDTH + z as usize) * GRID_HEIGHT;
            let mut ny = y - 1;
            while ny >= 0 && self.ids[base + ny as usize] == 0 {
                ny -= 1;
            }
            self.heightmap[col] = ny as i16;
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    // Raw array views for the persistence layer.

    pub(crate) fn raw_ids(&self) -> &[u16] {
        &self.ids
    }

    pub(crate) fn raw_meta(&self) -> &[u8] {
        &self.meta
    }

    pub(crate) fn raw_light(&self) -> &[u8] {
        &self.light
    }

    pub(crate) fn raw_extra(&self) -> &[u8] {
        &self.extra
    }

    /// Rebuild a grid from persisted arrays. Lengths must match the grid
    /// volume exactly; the heightmap is derived rather than stored.
    pub(crate) fn from_raw(
        ids: Vec<u16>,
        meta: Vec<u8>,
        light: Vec<u8>,
        extra: Vec<u8>,
    ) -> Option<Self> {
        if ids.len() != GRID_VOLUME
            || meta.len() != GRID_VOLUME
            || light.len() != GRID_VOLUME
            || extra.len() != GRID_VOLUME
        {
            return None;
        }
        let mut grid = Self {
            ids: ids.into_boxed_slice(),
            meta: meta.into_boxed_slice(),
            light: light.into_boxed_slice(),
            extra: extra.into_boxed_slice(),
            heightmap: vec![-1i16; GRID_WIDTH * GRID_WIDTH].into_boxed_slice(),
            dirty: false,
        };
        grid.rebuild_heightmap();
        Some(grid)
    }

    fn rebuild_heightmap(&mut self) {
        for x in 0..GRID_WIDTH {
            for z in 0..GRID_WIDTH {
                let base = (x * GRID_WIDTH + z) * GRID_HEIGHT;
                let mut top = -1i16;
                for y in (0..GRID_HEIGHT).rev() {
                    if self.ids[base + y] != 0 {
                        top = y as i16;
                        break;
                    }
                }
                self.heightmap[x * GRID_WIDTH + z] = top;
            }
        }
    }
}

impl Default for BlockGrid {
    fn default() -> Self {
        Self::new()
    }
}
