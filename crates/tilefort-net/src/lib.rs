//! Networking: wire buffers, typed message kinds, TCP and in-memory
//! transports, and the per-tick message dispatcher.

pub mod buffer;
pub mod codec;
pub mod framing;
pub mod kind;
pub mod memory;
pub mod peer;
pub mod tcp;
pub mod transport;

pub use buffer::{NetReader, NetWriter, ReadError};
pub use codec::{ChunkCodec, CodecError, Lz4Codec};
pub use framing::{FrameConfig, FrameError, read_frame, write_frame};
pub use kind::{Kind, TagWidth, WireEnum, message_writer, read_kind, write_kind};
pub use memory::MemoryTransport;
pub use peer::{HandlerError, NetPeer, PeerEvent, PeerHandler};
pub use tcp::{IdGenerator, TcpConfig, TcpTransport};
pub use transport::{
    Channel, ConnectionId, ConnectionStatus, Inbox, Incoming, Outbox, Outgoing, OutgoingSink,
    Target, Transport, TransportError,
};
