use crate::generation::{GenerationError, TerrainGenerator};
use crate::world::block::BlockId;
use crate::world::grid::{BlockGrid, GRID_WIDTH};

/// Grass-surface y level for flatgrass terrain.
pub const FLATGRASS_SURFACE_Y: i32 = 63;

/// Simple flat terrain: stone up to y 58, dirt from 59 through 62, grass at
/// 63, air above. Identical for every chunk and independent of the seed.
pub struct FlatGrassGenerator;

impl TerrainGenerator for FlatGrassGenerator {
    fn name(&self) -> &str {
        "flatgrass"
    }

    fn generate(&self, grid: &mut BlockGrid, _cx: i32, _cz: i32) -> Result<(), GenerationError> {
        for x in 0..GRID_WIDTH as i32 {
            for z in 0..GRID_WIDTH as i32 {
                grid.fill_column(x, z, 0, FLATGRASS_SURFACE_Y - 4, BlockId::STONE)
                    .map_err(|e| GenerationError::Failed(e.to_string()))?;
                grid.fill_column(
                    x,
                    z,
                    FLATGRASS_SURFACE_Y - 4,
                    FLATGRASS_SURFACE_Y,
                    BlockId::DIRT,
                )
                .map_err(|e| GenerationError::Failed(e.to_string()))?;
                grid.set_block_id(x, FLATGRASS_SURFACE_Y, z, BlockId::GRASS)
                    .map_err(|e| GenerationError::Failed(e.to_string()))?;
            }
        }
        Ok(())
    }
}
