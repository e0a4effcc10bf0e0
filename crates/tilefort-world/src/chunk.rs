//! Fixed-size 16×16 tile storage with bounds-checked access and change
//! notification.
//!
//! Tiles are stored in a flat array indexed `x + y * 16`. The `try_*`
//! accessors reject out-of-range coordinates by returning `None`/`false`;
//! the [`Index`] implementation assumes a pre-validated index.
//!
//! A chunk can carry one change subscription. Every successful `try_set*`
//! sends a [`TileChange`] to the subscriber. The chunk holds only the sending
//! half of the channel, never a reference to its owner.

use std::ops::Index;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::Sender;

use crate::coords::{CHUNK_AREA, CHUNK_SIZE, ChunkPosition, TilePosition};
use crate::tile::Tile;

/// Notification sent to a chunk's subscriber when one of its tiles is set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TileChange {
    /// The chunk that changed.
    pub chunk: ChunkPosition,
    /// Flat index of the changed tile.
    pub index: usize,
    /// The value written.
    pub tile: Tile,
}

impl TileChange {
    /// Absolute position of the changed tile.
    pub fn position(&self) -> TilePosition {
        self.chunk.tile_at(self.index)
    }
}

/// Handle identifying a registered change subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

static NEXT_SUBSCRIPTION: AtomicU64 = AtomicU64::new(1);

#[derive(Debug)]
struct Subscription {
    id: SubscriptionId,
    tx: Sender<TileChange>,
}

/// A 16×16 block of tiles at a fixed [`ChunkPosition`].
#[derive(Debug)]
pub struct Chunk {
    position: ChunkPosition,
    tiles: [Tile; CHUNK_AREA],
    subscription: Option<Subscription>,
}

impl Chunk {
    /// Creates a chunk filled with [`Tile::EMPTY`].
    pub fn new(position: ChunkPosition) -> Self {
        Self::filled(position, Tile::EMPTY)
    }

    /// Creates a chunk with every tile set to `tile`.
    pub fn filled(position: ChunkPosition, tile: Tile) -> Self {
        Self::from_tiles(position, [tile; CHUNK_AREA])
    }

    /// Creates a chunk from a complete tile array (e.g. after deserialization).
    pub fn from_tiles(position: ChunkPosition, tiles: [Tile; CHUNK_AREA]) -> Self {
        Self {
            position,
            tiles,
            subscription: None,
        }
    }

    /// Creates a chunk by evaluating `f` at every absolute tile position.
    pub fn from_fn(position: ChunkPosition, mut f: impl FnMut(TilePosition) -> Tile) -> Self {
        let tiles = std::array::from_fn(|index| f(position.tile_at(index)));
        Self::from_tiles(position, tiles)
    }

    /// The chunk's position.
    pub fn position(&self) -> ChunkPosition {
        self.position
    }

    /// The full tile array in index order.
    pub fn tiles(&self) -> &[Tile; CHUNK_AREA] {
        &self.tiles
    }

    /// Flat index of local `(x, y)`, or `None` if either axis is outside `[0, 16)`.
    pub fn index_of(x: usize, y: usize) -> Option<usize> {
        (x < CHUNK_SIZE && y < CHUNK_SIZE).then_some(x + y * CHUNK_SIZE)
    }

    /// Tile at a flat index, or `None` if `index >= 256`.
    pub fn try_get(&self, index: usize) -> Option<Tile> {
        self.tiles.get(index).copied()
    }

    /// Tile at local `(x, y)`, or `None` if out of range.
    pub fn try_get_at(&self, x: usize, y: usize) -> Option<Tile> {
        Self::index_of(x, y).map(|index| self.tiles[index])
    }

    /// Sets the tile at a flat index and notifies the subscriber if the
    /// value changed.
    ///
    /// Returns `false` without side effects if `index >= 256`.
    pub fn try_set(&mut self, index: usize, tile: Tile) -> bool {
        if index >= CHUNK_AREA {
            tracing::trace!(chunk = %self.position, index, "rejected out-of-range tile write");
            return false;
        }
        if self.tiles[index] != tile {
            self.tiles[index] = tile;
            self.notify(index, tile);
        }
        true
    }

    /// Sets the tile at local `(x, y)` and notifies the subscriber.
    pub fn try_set_at(&mut self, x: usize, y: usize, tile: Tile) -> bool {
        match Self::index_of(x, y) {
            Some(index) => self.try_set(index, tile),
            None => {
                tracing::trace!(chunk = %self.position, x, y, "rejected out-of-range tile write");
                false
            }
        }
    }

    /// Writes a tile without raising a change notification.
    ///
    /// The owning world uses this when it reports the mutation itself.
    pub(crate) fn set_silent(&mut self, index: usize, tile: Tile) {
        self.tiles[index] = tile;
    }

    /// Returns the tile shared by every cell, if the chunk is uniform.
    pub fn uniform_tile(&self) -> Option<Tile> {
        let first = self.tiles[0];
        self.tiles.iter().all(|t| *t == first).then_some(first)
    }

    /// Registers `tx` as the change subscriber, replacing any previous one.
    pub fn subscribe(&mut self, tx: Sender<TileChange>) -> SubscriptionId {
        let id = SubscriptionId(NEXT_SUBSCRIPTION.fetch_add(1, Ordering::Relaxed));
        self.subscription = Some(Subscription { id, tx });
        id
    }

    /// Removes the subscription `id`. Returns `false` if it is not the
    /// current subscription.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        if self.subscription.as_ref().is_some_and(|s| s.id == id) {
            self.subscription = None;
            true
        } else {
            false
        }
    }

    /// Whether a change subscriber is registered.
    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }

    fn notify(&mut self, index: usize, tile: Tile) {
        let Some(sub) = &self.subscription else {
            return;
        };
        let change = TileChange {
            chunk: self.position,
            index,
            tile,
        };
        if sub.tx.send(change).is_err() {
            // Receiver is gone; nobody is listening anymore.
            self.subscription = None;
        }
    }
}

impl Clone for Chunk {
    /// Copies position and tiles. The clone starts without a subscriber.
    fn clone(&self) -> Self {
        Self::from_tiles(self.position, self.tiles)
    }
}

impl Index<usize> for Chunk {
    type Output = Tile;

    fn index(&self, index: usize) -> &Tile {
        &self.tiles[index]
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_new_chunk_is_empty() {
        let chunk = Chunk::new(ChunkPosition::new(0, 0));
        assert_eq!(chunk.uniform_tile(), Some(Tile::EMPTY));
        assert_eq!(chunk.try_get(0), Some(Tile::EMPTY));
    }

    #[test]
    fn test_set_then_get() {
        let mut chunk = Chunk::new(ChunkPosition::new(1, 1));
        assert!(chunk.try_set_at(3, 4, Tile::new(9)));
        assert_eq!(chunk.try_get_at(3, 4), Some(Tile::new(9)));
        assert_eq!(chunk[3 + 4 * CHUNK_SIZE], Tile::new(9));
        assert_eq!(chunk.uniform_tile(), None);
    }

    #[test]
    fn test_out_of_range_is_rejected_without_panic() {
        let mut chunk = Chunk::new(ChunkPosition::new(0, 0));
        assert_eq!(chunk.try_get(CHUNK_AREA), None);
        assert_eq!(chunk.try_get_at(16, 0), None);
        assert_eq!(chunk.try_get_at(0, 16), None);
        assert!(!chunk.try_set(CHUNK_AREA, Tile::new(1)));
        assert!(!chunk.try_set_at(16, 15, Tile::new(1)));
        assert_eq!(chunk.uniform_tile(), Some(Tile::EMPTY));
    }

    #[test]
    fn test_index_of_bounds() {
        assert_eq!(Chunk::index_of(0, 0), Some(0));
        assert_eq!(Chunk::index_of(15, 15), Some(CHUNK_AREA - 1));
        assert_eq!(Chunk::index_of(16, 0), None);
    }

    #[test]
    fn test_from_fn_uses_absolute_positions() {
        let pos = ChunkPosition::new(-1, 2);
        let chunk = Chunk::from_fn(pos, |p| Tile::new((p.x + 100 + p.y) as u16));
        assert_eq!(chunk.try_get_at(0, 0), Some(Tile::new((-16 + 100 + 32) as u16)));
        assert_eq!(chunk.try_get_at(15, 1), Some(Tile::new((-1 + 100 + 33) as u16)));
    }

    #[test]
    fn test_set_notifies_subscriber() {
        let (tx, rx) = mpsc::channel();
        let mut chunk = Chunk::new(ChunkPosition::new(2, 0));
        chunk.subscribe(tx);

        chunk.try_set_at(1, 2, Tile::new(5));
        let change = rx.try_recv().unwrap();
        assert_eq!(change.chunk, ChunkPosition::new(2, 0));
        assert_eq!(change.index, 1 + 2 * CHUNK_SIZE);
        assert_eq!(change.tile, Tile::new(5));
        assert_eq!(change.position(), TilePosition::new(33, 2));
    }

    #[test]
    fn test_rewriting_same_tile_does_not_notify() {
        let (tx, rx) = mpsc::channel();
        let mut chunk = Chunk::filled(ChunkPosition::new(0, 0), Tile::GRASS);
        chunk.subscribe(tx);

        assert!(chunk.try_set_at(4, 4, Tile::GRASS));
        assert!(rx.try_recv().is_err());

        assert!(chunk.try_set_at(4, 4, Tile::SAND));
        assert_eq!(rx.try_recv().unwrap().tile, Tile::SAND);
        assert!(chunk.try_set_at(4, 4, Tile::SAND));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_rejected_set_does_not_notify() {
        let (tx, rx) = mpsc::channel();
        let mut chunk = Chunk::new(ChunkPosition::new(0, 0));
        chunk.subscribe(tx);
        chunk.try_set(999, Tile::new(1));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_silent_set_does_not_notify() {
        let (tx, rx) = mpsc::channel();
        let mut chunk = Chunk::new(ChunkPosition::new(0, 0));
        chunk.subscribe(tx);
        chunk.set_silent(7, Tile::new(2));
        assert_eq!(chunk[7], Tile::new(2));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_unsubscribe_requires_matching_id() {
        let (tx, rx) = mpsc::channel();
        let mut chunk = Chunk::new(ChunkPosition::new(0, 0));
        let first = chunk.subscribe(tx.clone());
        let second = chunk.subscribe(tx);
        assert_ne!(first, second);

        assert!(!chunk.unsubscribe(first));
        assert!(chunk.is_subscribed());
        assert!(chunk.unsubscribe(second));
        assert!(!chunk.is_subscribed());

        chunk.try_set(0, Tile::new(1));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_dropped_receiver_clears_subscription() {
        let (tx, rx) = mpsc::channel();
        let mut chunk = Chunk::new(ChunkPosition::new(0, 0));
        chunk.subscribe(tx);
        drop(rx);
        assert!(chunk.try_set(0, Tile::new(1)));
        assert!(!chunk.is_subscribed());
    }

    #[test]
    fn test_clone_has_no_subscriber() {
        let (tx, _rx) = mpsc::channel();
        let mut chunk = Chunk::filled(ChunkPosition::new(0, 0), Tile::GRASS);
        chunk.subscribe(tx);
        let copy = chunk.clone();
        assert!(!copy.is_subscribed());
        assert_eq!(copy.tiles(), chunk.tiles());
    }
}
