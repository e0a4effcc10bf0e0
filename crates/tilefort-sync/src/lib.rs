//! Client/server world synchronization for Tile Fortress.
//!
//! The server owns the authoritative [`World`](tilefort_world::World) and
//! answers chunk requests; clients mirror the chunks they ask for and send
//! their edits as build orders, which the server applies and rebroadcasts.

pub mod build_orders;
pub mod chunk_data;
pub mod client;
pub mod message;
pub mod remote;
pub mod request_queue;
pub mod server;

pub use build_orders::{
    BuildOrderBatcher, MAX_ORDERS_PER_MESSAGE, decode_build_orders, encode_build_order_batches,
    encode_build_orders,
};
pub use chunk_data::{CHUNK_PAYLOAD_SIZE, decode_chunk_data, encode_chunk_data, tiles_to_bytes};
pub use client::{ClientSession, ClientSettings, ClientTick};
pub use message::{
    ChunkRequest, DISCOVERY_REPLY, DISCOVERY_REQUEST, DataMessageType, ProtocolError, ServerInfo,
    decode_chat, encode_chat,
};
pub use remote::{RemoteChunkSupplier, STALE_RETRIES};
pub use request_queue::ChunkRequestQueue;
pub use server::{ServerSession, ServerSettings, ServerTick};
