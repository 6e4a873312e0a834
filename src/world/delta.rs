use crate::world::block::BlockId;

/// One applied block change, as exposed to the network layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockDelta {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub id: BlockId,
    pub meta: u8,
}

/// Minimal network delta for one chunk's observers, built from one flush.
/// Deltas appear in commit order.
#[derive(Debug, Clone)]
pub struct ChunkDeltaBatch {
    pub cx: i32,
    pub cz: i32,
    pub deltas: Vec<BlockDelta>,
}

/// Consumer of per-flush block-change batches. Implemented by the network
/// layer, which serializes and transmits the deltas to subscribed clients;
/// the runtime core performs no socket I/O itself.
///
/// Called from the tick thread; implementations should hand the batch off
/// rather than block.
pub trait DeltaSink: Send + Sync {
    fn deliver(&self, world: &str, batch: ChunkDeltaBatch);
}

/// Discards every batch. Default sink for worlds with no observers wired up.
pub struct NullSink;

impl DeltaSink for NullSink {
    fn deliver(&self, _world: &str, _batch: ChunkDeltaBatch) {}
}
