use noise::{NoiseFn, Perlin};

use crate::generation::{GenerationError, TerrainGenerator};
use crate::world::block::BlockId;
use crate::world::grid::{BlockGrid, GRID_WIDTH};

const SEA_LEVEL: i32 = 62;
const BASE_HEIGHT: f64 = 64.0;
const AMPLITUDE: f64 = 18.0;
const SCALE: f64 = 0.0085;

/// Rolling Perlin-noise hills with beaches and water below sea level.
pub struct HillsGenerator {
    noise: Perlin,
}

impl HillsGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            noise: Perlin::new(seed as u32),
        }
    }

    fn surface_height(&self, wx: f64, wz: f64) -> i32 {
        // Two octaves are enough for gentle terrain.
        let broad = self.noise.get([wx * SCALE, wz * SCALE]);
        let detail = self.noise.get([wx * SCALE * 4.0, wz * SCALE * 4.0]) * 0.25;
        (BASE_HEIGHT + (broad + detail) * AMPLITUDE).floor() as i32
    }
}

impl TerrainGenerator for HillsGenerator {
    fn name(&self) -> &str {
        "hills"
    }

    fn generate(&self, grid: &mut BlockGrid, cx: i32, cz: i32) -> Result<(), GenerationError> {
        let err = |e: crate::error::WorldError| GenerationError::Failed(e.to_string());
        for x in 0..GRID_WIDTH as i32 {
            for z in 0..GRID_WIDTH as i32 {
                let wx = (cx * GRID_WIDTH as i32 + x) as f64;
                let wz = (cz * GRID_WIDTH as i32 + z) as f64;
                let surface = self.surface_height(wx, wz).clamp(1, 200);

                grid.set_block_id(x, 0, z, BlockId::BEDROCK).map_err(err)?;
                grid.fill_column(x, z, 1, (surface - 3).max(1), BlockId::STONE)
                    .map_err(err)?;

                if surface <= SEA_LEVEL {
                    // Submerged or shoreline columns get sand and water.
                    grid.fill_column(x, z, (surface - 3).max(1), surface + 1, BlockId::SAND)
                        .map_err(err)?;
                    grid.fill_column(x, z, surface + 1, SEA_LEVEL + 1, BlockId::WATER)
                        .map_err(err)?;
                } else {
                    grid.fill_column(x, z, (surface - 3).max(1), surface, BlockId::DIRT)
                        .map_err(err)?;
                    grid.set_block_id(x, surface, z, BlockId::GRASS).map_err(err)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_is_deterministic() {
        let a = HillsGenerator::new(1234);
        let b = HillsGenerator::new(1234);
        let mut grid_a = BlockGrid::new();
        let mut grid_b = BlockGrid::new();
        a.generate(&mut grid_a, 2, -3).unwrap();
        b.generate(&mut grid_b, 2, -3).unwrap();

        for x in 0..GRID_WIDTH as i32 {
            for z in 0..GRID_WIDTH as i32 {
                assert_eq!(grid_a.height(x, z).unwrap(), grid_b.height(x, z).unwrap());
            }
        }
    }

    #[test]
    fn columns_are_capped_with_grass_or_water() {
        let gen = HillsGenerator::new(99);
        let mut grid = BlockGrid::new();
        gen.generate(&mut grid, 0, 0).unwrap();

        for x in 0..GRID_WIDTH as i32 {
            for z in 0..GRID_WIDTH as i32 {
                let top = grid.height(x, z).unwrap() as i32;
                let id = grid.block_id(x, top, z).unwrap();
                assert!(
                    id == BlockId::GRASS || id == BlockId::WATER || id == BlockId::SAND,
                    "unexpected surface block {:?} at ({}, {})",
                    id,
                    x,
                    z
                );
                assert_eq!(grid.block_id(x, 0, z).unwrap(), BlockId::BEDROCK);
            }
        }
    }
}
