//! Chunk payload encoding.
//!
//! ```text
//! [kind][x: i32][y: i32][len: u16][len bytes of compressed tiles]
//! ```
//!
//! The uncompressed tiles are 256 little-endian `u16` ids in row-major
//! order, always exactly [`CHUNK_PAYLOAD_SIZE`] bytes.

use tilefort_net::{ChunkCodec, NetReader, message_writer};
use tilefort_world::{CHUNK_AREA, Chunk, ChunkPosition, Tile};

use crate::message::{DataMessageType, ProtocolError};

/// Size of a chunk's tiles before compression.
pub const CHUNK_PAYLOAD_SIZE: usize = CHUNK_AREA * 2;

/// Serializes a chunk's tiles to their fixed-size byte form.
pub fn tiles_to_bytes(chunk: &Chunk) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(CHUNK_PAYLOAD_SIZE);
    for tile in chunk.tiles() {
        bytes.extend_from_slice(&tile.id().to_le_bytes());
    }
    bytes
}

fn tiles_from_bytes(bytes: &[u8]) -> [Tile; CHUNK_AREA] {
    let mut tiles = [Tile::EMPTY; CHUNK_AREA];
    for (tile, pair) in tiles.iter_mut().zip(bytes.chunks_exact(2)) {
        *tile = Tile::new(u16::from_le_bytes([pair[0], pair[1]]));
    }
    tiles
}

/// Encodes a full chunk-data message.
pub fn encode_chunk_data(chunk: &Chunk, codec: &dyn ChunkCodec) -> Result<Vec<u8>, ProtocolError> {
    let compressed = codec.compress(&tiles_to_bytes(chunk));
    let len = u16::try_from(compressed.len())
        .map_err(|_| ProtocolError::ChunkTooLarge(compressed.len()))?;

    let position = chunk.position();
    let mut w = message_writer(DataMessageType::ChunkData);
    w.write_point(position.x, position.y);
    w.write_u16(len);
    w.write_bytes(&compressed);
    Ok(w.into_bytes())
}

/// Decodes a chunk-data body into a new chunk.
///
/// Fails if the body is truncated or the payload does not restore to
/// exactly [`CHUNK_PAYLOAD_SIZE`] bytes.
pub fn decode_chunk_data(
    reader: &mut NetReader<'_>,
    codec: &dyn ChunkCodec,
) -> Result<Chunk, ProtocolError> {
    let (x, y) = reader.read_point()?;
    let len = reader.read_u16()? as usize;
    let compressed = reader.read_bytes(len)?;
    let raw = codec.decompress(compressed, CHUNK_PAYLOAD_SIZE)?;
    Ok(Chunk::from_tiles(
        ChunkPosition::new(x, y),
        tiles_from_bytes(&raw),
    ))
}
