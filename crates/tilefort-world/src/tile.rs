//! Tile values and build orders.

use std::fmt;

use crate::coords::TilePosition;

/// The smallest addressable world cell, identified by a 16-bit id.
///
/// `Tile(0)` is the empty tile a fresh chunk is filled with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Tile(u16);

impl Tile {
    /// The empty tile.
    pub const EMPTY: Self = Self(0);
    /// Sand (terrain generator output).
    pub const SAND: Self = Self(1);
    /// Gravel (terrain generator output).
    pub const GRAVEL: Self = Self(2);
    /// Grass (terrain generator output).
    pub const GRASS: Self = Self(3);

    /// Creates a tile with the given id.
    pub const fn new(id: u16) -> Self {
        Self(id)
    }

    /// Returns the tile id.
    pub const fn id(self) -> u16 {
        self.0
    }
}

impl From<u16> for Tile {
    fn from(id: u16) -> Self {
        Self(id)
    }
}

impl fmt::Display for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A single pending tile mutation: place `tile` at `position`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BuildOrder {
    /// Absolute target position.
    pub position: TilePosition,
    /// Tile to place there.
    pub tile: Tile,
}

impl BuildOrder {
    /// Creates a build order.
    pub const fn new(position: TilePosition, tile: Tile) -> Self {
        Self { position, tile }
    }
}
