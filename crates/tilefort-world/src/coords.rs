//! Absolute tile coordinates and chunk coordinates.
//!
//! Tile space is an unbounded integer grid. Chunk space groups tiles into
//! [`CHUNK_SIZE`]×[`CHUNK_SIZE`] squares. Conversions use floor division and
//! Euclidean remainders so that negative coordinates map onto the chunk that
//! actually contains them: tile `-1` lives in chunk `-1` at local offset `15`.

use std::fmt;

/// Side length of a chunk in tiles.
pub const CHUNK_SIZE: usize = 16;

/// Number of tiles in a chunk (16²).
pub const CHUNK_AREA: usize = CHUNK_SIZE * CHUNK_SIZE;

const CHUNK_SIZE_I32: i32 = CHUNK_SIZE as i32;

// ---------------------------------------------------------------------------
// TilePosition
// ---------------------------------------------------------------------------

/// A position in absolute tile space.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TilePosition {
    /// Tile-grid X coordinate.
    pub x: i32,
    /// Tile-grid Y coordinate.
    pub y: i32,
}

impl TilePosition {
    /// Creates a new tile position.
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Local `(x, y)` of a flat chunk index (`index % 16`, `index / 16`).
    ///
    /// The result is only meaningful for `index < CHUNK_AREA`.
    pub const fn from_index(index: usize) -> Self {
        Self {
            x: (index % CHUNK_SIZE) as i32,
            y: (index / CHUNK_SIZE) as i32,
        }
    }

    /// The chunk containing this tile (floor division on both axes).
    pub const fn chunk(self) -> ChunkPosition {
        ChunkPosition {
            x: self.x.div_euclid(CHUNK_SIZE_I32),
            y: self.y.div_euclid(CHUNK_SIZE_I32),
        }
    }

    /// Offset of this tile inside its chunk, each axis in `[0, 16)`.
    pub const fn local(self) -> (usize, usize) {
        (
            self.x.rem_euclid(CHUNK_SIZE_I32) as usize,
            self.y.rem_euclid(CHUNK_SIZE_I32) as usize,
        )
    }

    /// Flat index of this tile inside its chunk (`x + y * 16`).
    pub const fn local_index(self) -> usize {
        let (x, y) = self.local();
        x + y * CHUNK_SIZE
    }

    /// Returns the position offset by `(dx, dy)` tiles.
    pub const fn offset(self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x.wrapping_add(dx),
            y: self.y.wrapping_add(dy),
        }
    }
}

impl fmt::Display for TilePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "X:{} Y:{}", self.x, self.y)
    }
}

// ---------------------------------------------------------------------------
// ChunkPosition
// ---------------------------------------------------------------------------

/// Identifies a chunk in chunk space. Used as the key of the world's chunk map.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkPosition {
    /// Chunk-grid X coordinate.
    pub x: i32,
    /// Chunk-grid Y coordinate.
    pub y: i32,
}

impl ChunkPosition {
    /// Creates a new chunk position.
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Absolute X of the chunk's first tile (`x * 16`).
    ///
    /// Wraps for chunk coordinates that no tile coordinate can produce.
    pub const fn tile_x(self) -> i32 {
        self.x.wrapping_mul(CHUNK_SIZE_I32)
    }

    /// Absolute Y of the chunk's first tile (`y * 16`).
    pub const fn tile_y(self) -> i32 {
        self.y.wrapping_mul(CHUNK_SIZE_I32)
    }

    /// Absolute position of the chunk's first tile.
    pub const fn origin(self) -> TilePosition {
        TilePosition::new(self.tile_x(), self.tile_y())
    }

    /// Absolute tile position of a flat index inside this chunk.
    pub const fn tile_at(self, index: usize) -> TilePosition {
        let local = TilePosition::from_index(index);
        self.origin().offset(local.x, local.y)
    }

    /// Returns the chunk offset by `(dx, dy)` chunks.
    pub const fn offset(self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x.wrapping_add(dx),
            y: self.y.wrapping_add(dy),
        }
    }

    /// Iterates the square of chunks within `radius` of `self` (Chebyshev),
    /// row by row.
    pub fn square(self, radius: i32) -> impl Iterator<Item = ChunkPosition> {
        let radius = radius.max(0);
        (-radius..=radius).flat_map(move |dy| (-radius..=radius).map(move |dx| self.offset(dx, dy)))
    }
}

impl fmt::Display for ChunkPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "X:{} Y:{}", self.x, self.y)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(p: TilePosition) -> TilePosition {
        let (lx, ly) = p.local();
        p.chunk().origin().offset(lx as i32, ly as i32)
    }

    #[test]
    fn test_negative_one_maps_to_previous_chunk() {
        let p = TilePosition::new(-1, -1);
        assert_eq!(p.chunk(), ChunkPosition::new(-1, -1));
        assert_eq!(p.local(), (15, 15));
    }

    #[test]
    fn test_positive_tile_maps_by_floor() {
        let p = TilePosition::new(17, 31);
        assert_eq!(p.chunk(), ChunkPosition::new(1, 1));
        assert_eq!(p.local(), (1, 15));
        assert_eq!(p.local_index(), 1 + 15 * CHUNK_SIZE);
    }

    #[test]
    fn test_chunk_boundaries() {
        assert_eq!(TilePosition::new(0, 0).chunk(), ChunkPosition::new(0, 0));
        assert_eq!(TilePosition::new(15, 15).chunk(), ChunkPosition::new(0, 0));
        assert_eq!(TilePosition::new(16, 16).chunk(), ChunkPosition::new(1, 1));
        assert_eq!(TilePosition::new(-16, -16).chunk(), ChunkPosition::new(-1, -1));
        assert_eq!(TilePosition::new(-17, 0).chunk(), ChunkPosition::new(-2, 0));
        assert_eq!(TilePosition::new(-16, 0).local(), (0, 0));
    }

    #[test]
    fn test_origin_plus_local_is_identity() {
        for x in -70..70 {
            for y in [-33, -17, -16, -1, 0, 1, 15, 16, 47] {
                let p = TilePosition::new(x, y);
                assert_eq!(roundtrip(p), p, "roundtrip failed for {p}");
            }
        }
    }

    #[test]
    fn test_roundtrip_at_extremes() {
        for p in [
            TilePosition::new(i32::MIN, i32::MAX),
            TilePosition::new(i32::MAX, i32::MIN),
            TilePosition::new(i32::MIN + 15, -1),
        ] {
            assert_eq!(roundtrip(p), p);
        }
    }

    #[test]
    fn test_from_index_and_tile_at_agree() {
        let chunk = ChunkPosition::new(-2, 3);
        for index in 0..CHUNK_AREA {
            let tile = chunk.tile_at(index);
            assert_eq!(tile.chunk(), chunk);
            assert_eq!(tile.local_index(), index);
        }
        assert_eq!(TilePosition::from_index(17), TilePosition::new(1, 1));
    }

    #[test]
    fn test_tile_origin_scales_by_chunk_size() {
        let chunk = ChunkPosition::new(2, -3);
        assert_eq!(chunk.tile_x(), 32);
        assert_eq!(chunk.tile_y(), -48);
    }

    #[test]
    fn test_square_covers_radius() {
        let squares: Vec<_> = ChunkPosition::new(0, 0).square(1).collect();
        assert_eq!(squares.len(), 9);
        assert_eq!(squares[0], ChunkPosition::new(-1, -1));
        assert_eq!(squares[8], ChunkPosition::new(1, 1));
        assert_eq!(ChunkPosition::new(5, 5).square(0).count(), 1);
    }
}
