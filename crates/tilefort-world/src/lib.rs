//! Tile world storage: coordinates, fixed-size chunks, and the chunk-owning
//! [`World`] with on-demand chunk resolution and a deferred build-order queue.

pub mod chunk;
pub mod coords;
pub mod generator;
pub mod tile;
pub mod world;

pub use chunk::{Chunk, SubscriptionId, TileChange};
pub use coords::{CHUNK_AREA, CHUNK_SIZE, ChunkPosition, TilePosition};
pub use generator::TerrainGenerator;
pub use tile::{BuildOrder, Tile};
pub use world::{
    ChunkSupplier, MutationEvent, MutationSource, UpdateReport, World, WorldSettings,
};
