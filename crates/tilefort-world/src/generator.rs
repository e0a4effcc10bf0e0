//! Seeded terrain supplier used by the server world.

use noise::{NoiseFn, Perlin};

use crate::chunk::Chunk;
use crate::coords::{ChunkPosition, TilePosition};
use crate::tile::Tile;
use crate::world::ChunkSupplier;

/// Deterministic terrain: every tile is sand, gravel or grass depending on a
/// 2D Perlin sample at its absolute position.
///
/// Always supplies a chunk, so a world backed by it never defers orders.
pub struct TerrainGenerator {
    seed: u32,
    perlin: Perlin,
    frequency: f64,
}

impl TerrainGenerator {
    /// Default sampling frequency (features roughly 24 tiles across).
    pub const DEFAULT_FREQUENCY: f64 = 1.0 / 24.0;

    /// A generator with the default noise frequency.
    pub fn new(seed: u32) -> Self {
        Self::with_frequency(seed, Self::DEFAULT_FREQUENCY)
    }

    /// A generator sampling noise at `frequency` per tile.
    pub fn with_frequency(seed: u32, frequency: f64) -> Self {
        Self {
            seed,
            perlin: Perlin::new(seed),
            frequency,
        }
    }

    /// Seed the noise was built from.
    pub fn seed(&self) -> u32 {
        self.seed
    }

    /// The generated tile at an absolute position.
    pub fn tile_at(&self, position: TilePosition) -> Tile {
        let sample = self.perlin.get([
            f64::from(position.x) * self.frequency + 0.5,
            f64::from(position.y) * self.frequency + 0.5,
        ]);
        // Perlin output is roughly [-1, 1]; split it into three bands.
        if sample < -0.2 {
            Tile::SAND
        } else if sample < 0.2 {
            Tile::GRAVEL
        } else {
            Tile::GRASS
        }
    }

    /// Generates the full chunk at `position`.
    pub fn generate(&self, position: ChunkPosition) -> Chunk {
        Chunk::from_fn(position, |tile| self.tile_at(tile))
    }
}

impl ChunkSupplier for TerrainGenerator {
    fn supply(&mut self, position: ChunkPosition) -> Option<Chunk> {
        tracing::trace!(chunk = %position, seed = self.seed, "Generating chunk");
        Some(self.generate(position))
    }
}
