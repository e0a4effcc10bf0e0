//! Message kinds, protocol errors, chat and discovery payloads.

use tilefort_net::{
    CodecError, ConnectionId, HandlerError, NetReader, NetWriter, ReadError, TagWidth, WireEnum,
    message_writer,
};
use tilefort_world::ChunkPosition;

/// Kind tag of every data message exchanged between server and clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataMessageType {
    Chat = 0,
    ChunkRequest = 1,
    ChunkData = 2,
    BuildOrders = 3,
}

impl WireEnum for DataMessageType {
    const WIDTH: TagWidth = TagWidth::for_max(Self::BuildOrders as u64);

    fn to_raw(self) -> u64 {
        self as u64
    }

    fn from_raw(raw: u64) -> Option<Self> {
        match raw {
            0 => Some(Self::Chat),
            1 => Some(Self::ChunkRequest),
            2 => Some(Self::ChunkData),
            3 => Some(Self::BuildOrders),
            _ => None,
        }
    }
}

/// Errors raised while encoding or decoding protocol messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The message body was truncated or malformed.
    #[error(transparent)]
    Read(#[from] ReadError),

    /// The chunk payload failed to decompress to the expected size.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// A compressed chunk did not fit the 16-bit length field.
    #[error("compressed chunk of {0} bytes exceeds the 65535 byte limit")]
    ChunkTooLarge(usize),

    /// More build orders than the 8-bit count field can carry.
    #[error("{0} build orders exceed the 255 per message limit")]
    TooManyOrders(usize),

    /// A discovery datagram did not have the expected prefix.
    #[error("not a discovery reply")]
    NotDiscovery,
}

impl From<ProtocolError> for HandlerError {
    fn from(error: ProtocolError) -> Self {
        match error {
            ProtocolError::Read(e) => HandlerError::Read(e),
            ProtocolError::Codec(e) => HandlerError::Codec(e),
            other => HandlerError::other(other),
        }
    }
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// Encodes a chat message: `[len: u32][utf-8]`.
pub fn encode_chat(text: &str) -> Vec<u8> {
    let mut w = message_writer(DataMessageType::Chat);
    w.write_str(text);
    w.into_bytes()
}

/// Decodes a chat message body.
pub fn decode_chat(reader: &mut NetReader<'_>) -> Result<String, ProtocolError> {
    Ok(reader.read_str()?.to_string())
}

// ---------------------------------------------------------------------------
// Chunk request
// ---------------------------------------------------------------------------

/// A request for one chunk. `sender` is only known on the receiving side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRequest {
    pub position: ChunkPosition,
    pub sender: Option<ConnectionId>,
}

impl ChunkRequest {
    /// An outgoing request (no sender).
    pub fn new(position: ChunkPosition) -> Self {
        Self {
            position,
            sender: None,
        }
    }

    /// Encodes the request: `[x: i32][y: i32]`.
    pub fn encode(&self) -> Vec<u8> {
        let mut w = message_writer(DataMessageType::ChunkRequest);
        w.write_point(self.position.x, self.position.y);
        w.into_bytes()
    }

    /// Decodes a request body received from `sender`.
    pub fn decode(reader: &mut NetReader<'_>, sender: ConnectionId) -> Result<Self, ProtocolError> {
        let (x, y) = reader.read_point()?;
        Ok(Self {
            position: ChunkPosition::new(x, y),
            sender: Some(sender),
        })
    }
}

// ---------------------------------------------------------------------------
// Discovery
// ---------------------------------------------------------------------------

/// Unconnected datagram asking servers to identify themselves.
pub const DISCOVERY_REQUEST: &[u8] = b"TF?";

/// Prefix of a discovery reply.
pub const DISCOVERY_REPLY: &[u8] = b"TF!";

/// What a server reports about itself in a discovery reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    pub app_id: String,
    pub version: String,
    pub clients: u32,
}

impl ServerInfo {
    /// Encodes `TF!` followed by app id, version and client count.
    pub fn encode(&self) -> Vec<u8> {
        let mut w = NetWriter::new();
        w.write_bytes(DISCOVERY_REPLY);
        w.write_str(&self.app_id);
        w.write_str(&self.version);
        w.write_u32(self.clients);
        w.into_bytes()
    }

    /// Decodes a discovery reply datagram.
    pub fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        let mut r = NetReader::new(payload);
        if r.read_bytes(DISCOVERY_REPLY.len()).ok() != Some(DISCOVERY_REPLY) {
            return Err(ProtocolError::NotDiscovery);
        }
        Ok(Self {
            app_id: r.read_str()?.to_string(),
            version: r.read_str()?.to_string(),
            clients: r.read_u32()?,
        })
    }
}
