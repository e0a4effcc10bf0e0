//! Transport-facing types shared by every transport implementation.
//!
//! A [`Transport`] delivers everything it receives into an [`Inbox`] (any
//! thread, never blocks) and accepts outgoing requests through the [`Outbox`]
//! it returns from [`Transport::start`]. Neither side blocks, so the network
//! never waits on the tick and the tick never waits on the network.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

/// Unique identifier for a connection within one transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Logical delivery channel.
///
/// Transports must not let `Tiles` traffic delay `Default` traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Control, chat and build orders.
    Default = 0,
    /// Chunk requests and chunk data.
    Tiles = 1,
}

impl Channel {
    /// Channel for a wire byte, or `None` if unknown.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Default),
            1 => Some(Self::Tiles),
            _ => None,
        }
    }
}

/// Connection lifecycle status reported by a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connected => f.write_str("connected"),
            Self::Disconnected => f.write_str("disconnected"),
        }
    }
}

/// A raw message delivered by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    /// Data from an established connection.
    Data {
        from: ConnectionId,
        channel: Channel,
        payload: Vec<u8>,
    },
    /// A connection changed status. `reason` carries the remote version on
    /// connect and the cause on disconnect.
    Status {
        connection: ConnectionId,
        status: ConnectionStatus,
        reason: String,
    },
    /// Out-of-band data from an address without a connection.
    Unconnected { from: SocketAddr, payload: Vec<u8> },
}

/// Recipients of an outgoing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    One(ConnectionId),
    All,
    AllExcept(ConnectionId),
}

impl Target {
    /// Whether `connection` is addressed.
    pub fn includes(self, connection: ConnectionId) -> bool {
        match self {
            Self::One(id) => id == connection,
            Self::All => true,
            Self::AllExcept(id) => id != connection,
        }
    }
}

/// A request for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    Send {
        target: Target,
        channel: Channel,
        payload: Arc<[u8]>,
    },
    SendUnconnected {
        to: SocketAddr,
        payload: Vec<u8>,
    },
    Disconnect {
        connection: ConnectionId,
        reason: String,
    },
}

/// Errors raised while starting a transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// `start` was called twice.
    #[error("transport already started")]
    AlreadyStarted,

    /// Binding a local socket failed.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// An I/O error occurred (e.g. building the runtime).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Thread-safe, non-blocking producer side of a peer's inbound queue.
#[derive(Debug, Clone)]
pub struct Inbox {
    tx: mpsc::UnboundedSender<Incoming>,
}

impl Inbox {
    /// Wraps the sending half of the peer's inbound queue.
    pub fn new(tx: mpsc::UnboundedSender<Incoming>) -> Self {
        Self { tx }
    }

    /// Queues a message. Returns `false` if the peer has gone away.
    pub fn push(&self, message: Incoming) -> bool {
        self.tx.send(message).is_ok()
    }
}

/// Destination of outgoing requests, implemented per transport.
pub trait OutgoingSink: Send + Sync {
    /// Accepts a request without blocking. Returns `false` if the transport
    /// has stopped.
    fn submit(&self, request: Outgoing) -> bool;

    fn is_closed(&self) -> bool;
}

impl OutgoingSink for mpsc::UnboundedSender<Outgoing> {
    fn submit(&self, request: Outgoing) -> bool {
        self.send(request).is_ok()
    }

    fn is_closed(&self) -> bool {
        mpsc::UnboundedSender::is_closed(self)
    }
}

/// Cloneable, non-blocking handle for sending through a running transport.
#[derive(Clone)]
pub struct Outbox {
    sink: Arc<dyn OutgoingSink>,
}

impl fmt::Debug for Outbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Outbox")
            .field("closed", &self.sink.is_closed())
            .finish()
    }
}

impl Outbox {
    /// Creates a channel-backed outbox and the receiver a transport drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Outgoing>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::from_sink(Arc::new(tx)), rx)
    }

    /// An outbox that hands requests straight to `sink`.
    pub fn from_sink(sink: Arc<dyn OutgoingSink>) -> Self {
        Self { sink }
    }

    fn push(&self, request: Outgoing) {
        if !self.sink.submit(request) {
            tracing::trace!("Outbox closed, dropping outgoing request");
        }
    }

    /// Queues `payload` for every connection `target` selects.
    pub fn send(&self, target: Target, channel: Channel, payload: Vec<u8>) {
        self.push(Outgoing::Send {
            target,
            channel,
            payload: payload.into(),
        });
    }

    /// Queues `payload` for one connection.
    pub fn send_to(&self, connection: ConnectionId, channel: Channel, payload: Vec<u8>) {
        self.send(Target::One(connection), channel, payload);
    }

    /// Queues `payload` for every connection.
    pub fn broadcast(&self, channel: Channel, payload: Vec<u8>) {
        self.send(Target::All, channel, payload);
    }

    /// Queues `payload` for every connection but `except`.
    pub fn broadcast_except(&self, except: ConnectionId, channel: Channel, payload: Vec<u8>) {
        self.send(Target::AllExcept(except), channel, payload);
    }

    /// Sends a datagram outside any connection.
    pub fn send_unconnected(&self, to: SocketAddr, payload: Vec<u8>) {
        self.push(Outgoing::SendUnconnected { to, payload });
    }

    /// Closes one connection.
    pub fn disconnect(&self, connection: ConnectionId, reason: impl Into<String>) {
        self.push(Outgoing::Disconnect {
            connection,
            reason: reason.into(),
        });
    }

    /// Whether the transport side has gone away.
    pub fn is_closed(&self) -> bool {
        self.sink.is_closed()
    }
}

/// A message transport driven independently of the tick.
pub trait Transport: Send {
    /// Starts delivering into `inbox` and returns the outbox for sending.
    fn start(&mut self, inbox: Inbox) -> Result<Outbox, TransportError>;

    /// Stops the transport, waiting up to `timeout` for in-flight work.
    ///
    /// Returns `true` if everything finished within the timeout.
    fn shutdown(&mut self, reason: &str, timeout: Duration) -> bool;

    /// Local address of the running transport, if it has one.
    fn local_addr(&self) -> Option<SocketAddr>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_includes() {
        let a = ConnectionId(1);
        let b = ConnectionId(2);
        assert!(Target::One(a).includes(a));
        assert!(!Target::One(a).includes(b));
        assert!(Target::All.includes(b));
        assert!(!Target::AllExcept(a).includes(a));
        assert!(Target::AllExcept(a).includes(b));
    }

    #[test]
    fn test_channel_from_byte() {
        assert_eq!(Channel::from_byte(0), Some(Channel::Default));
        assert_eq!(Channel::from_byte(1), Some(Channel::Tiles));
        assert_eq!(Channel::from_byte(2), None);
    }

    #[test]
    fn test_outbox_queues_requests_in_order() {
        let (outbox, mut rx) = Outbox::channel();
        outbox.send_to(ConnectionId(3), Channel::Tiles, vec![1]);
        outbox.disconnect(ConnectionId(3), "bye");

        assert_eq!(
            rx.try_recv().unwrap(),
            Outgoing::Send {
                target: Target::One(ConnectionId(3)),
                channel: Channel::Tiles,
                payload: Arc::from(vec![1u8]),
            }
        );
        assert!(matches!(rx.try_recv().unwrap(), Outgoing::Disconnect { .. }));
    }

    #[test]
    fn test_outbox_after_receiver_drop_is_silent() {
        let (outbox, rx) = Outbox::channel();
        drop(rx);
        assert!(outbox.is_closed());
        outbox.broadcast(Channel::Default, vec![0]);
    }
}
