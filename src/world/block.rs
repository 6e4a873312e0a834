use serde::{Deserialize, Serialize};

/// Numeric block type identifier.
///
/// The id space is open ended; the constants below cover the handful of
/// types the built-in generators and tests need.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockId(pub u16);

impl BlockId {
    pub const AIR: BlockId = BlockId(0);
    pub const STONE: BlockId = BlockId(1);
    pub const GRASS: BlockId = BlockId(2);
    pub const DIRT: BlockId = BlockId(3);
    pub const BEDROCK: BlockId = BlockId(7);
    pub const WATER: BlockId = BlockId(8);
    pub const SAND: BlockId = BlockId(12);

    #[inline]
    pub fn is_air(self) -> bool {
        self == BlockId::AIR
    }

    /// Whether sky light passes through this block type.
    #[inline]
    pub fn is_transparent(self) -> bool {
        matches!(self, BlockId::AIR | BlockId::WATER)
    }
}

impl Default for BlockId {
    fn default() -> Self {
        BlockId::AIR
    }
}

/// Full per-block state as stored in a grid.
///
/// Light levels are nibbles (0..=15); the grid packs the two of them into a
/// single byte internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRecord {
    pub id: BlockId,
    pub meta: u8,
    pub block_light: u8,
    pub sky_light: u8,
    pub extra: u8,
}

impl BlockRecord {
    /// A plain block with no metadata and full sky light.
    pub fn of(id: BlockId) -> Self {
        Self {
            id,
            meta: 0,
            block_light: 0,
            sky_light: 15,
            extra: 0,
        }
    }
}

impl Default for BlockRecord {
    fn default() -> Self {
        Self::of(BlockId::AIR)
    }
}
