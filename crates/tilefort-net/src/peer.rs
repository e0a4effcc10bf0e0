//! Network peer: a transport plus the inbound queue drained once per tick.
//!
//! Transports push [`Incoming`] messages from their own threads. The owner
//! calls [`NetPeer::drain_and_dispatch`] on its tick, which hands every
//! message queued at that moment to a [`PeerHandler`] in arrival order. A
//! handler error is reported as a [`PeerEvent::Error`] and the drain goes on
//! with the next message.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::buffer::{NetReader, ReadError};
use crate::codec::CodecError;
use crate::kind::{Kind, WireEnum, read_kind};
use crate::transport::{
    Channel, ConnectionId, ConnectionStatus, Inbox, Incoming, Outbox, Transport, TransportError,
};

/// Failure while handling one message.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// The message body was truncated or malformed.
    #[error("malformed message: {0}")]
    Read(#[from] ReadError),

    /// The compressed payload could not be restored.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Any other handler-defined failure.
    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl HandlerError {
    /// Wraps any other error raised while handling a message.
    pub fn other(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Other(Box::new(error))
    }
}

/// Lifecycle and failure events raised by a [`NetPeer`].
#[derive(Debug)]
pub enum PeerEvent {
    Opened { local_addr: Option<SocketAddr> },
    /// The peer closed. `clean` is `false` if the transport hit the timeout.
    Closed { clean: bool },
    /// A handler failed on `message`.
    Error {
        message: Incoming,
        error: HandlerError,
    },
}

/// Receives the messages of one drain.
///
/// Every callback gets the peer's [`Outbox`] so it can reply immediately.
pub trait PeerHandler {
    /// Message kinds this handler understands.
    type Kind: WireEnum;

    /// A data message whose kind tag decoded to a known kind. `reader` is
    /// positioned at the start of the body.
    fn on_data(
        &mut self,
        outbox: &Outbox,
        from: ConnectionId,
        channel: Channel,
        kind: Self::Kind,
        reader: &mut NetReader<'_>,
    ) -> Result<(), HandlerError>;

    /// A data message with a kind this peer does not know.
    fn on_unknown_data(
        &mut self,
        _outbox: &Outbox,
        from: ConnectionId,
        _channel: Channel,
        kind: u64,
        reader: &mut NetReader<'_>,
    ) -> Result<(), HandlerError> {
        tracing::debug!(
            "Ignoring message of unknown kind {kind} ({} bytes) from {from}",
            reader.remaining()
        );
        Ok(())
    }

    fn on_status(
        &mut self,
        _outbox: &Outbox,
        connection: ConnectionId,
        status: ConnectionStatus,
        reason: &str,
    ) -> Result<(), HandlerError> {
        tracing::debug!("Connection {connection} {status}: {reason}");
        Ok(())
    }

    fn on_unconnected(
        &mut self,
        _outbox: &Outbox,
        _from: SocketAddr,
        _payload: &[u8],
    ) -> Result<(), HandlerError> {
        Ok(())
    }
}

/// A transport, its inbound queue, and the events raised around them.
pub struct NetPeer<T> {
    transport: T,
    inbox_tx: mpsc::UnboundedSender<Incoming>,
    inbox_rx: mpsc::UnboundedReceiver<Incoming>,
    outbox: Outbox,
    open: bool,
    events: VecDeque<PeerEvent>,
    shutdown_timeout: Duration,
}

impl<T: Transport> NetPeer<T> {
    /// Wraps `transport`. `shutdown_timeout` bounds [`close`](Self::close).
    pub fn new(transport: T, shutdown_timeout: Duration) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        // Until opened, sends go nowhere.
        let (outbox, _) = Outbox::channel();
        Self {
            transport,
            inbox_tx,
            inbox_rx,
            outbox,
            open: false,
            events: VecDeque::new(),
            shutdown_timeout,
        }
    }

    /// Starts the transport and raises [`PeerEvent::Opened`].
    pub fn open(&mut self) -> Result<(), TransportError> {
        if self.open {
            return Err(TransportError::AlreadyStarted);
        }
        self.outbox = self.transport.start(self.inbox())?;
        self.open = true;
        let local_addr = self.transport.local_addr();
        match local_addr {
            Some(addr) => tracing::info!("Peer opened on {addr}"),
            None => tracing::info!("Peer opened"),
        }
        self.events.push_back(PeerEvent::Opened { local_addr });
        Ok(())
    }

    /// Shuts the transport down, waiting at most the shutdown timeout, and
    /// raises [`PeerEvent::Closed`] whether or not the timeout was hit.
    pub fn close(&mut self, reason: &str) -> bool {
        if !self.open {
            return true;
        }
        let clean = self.transport.shutdown(reason, self.shutdown_timeout);
        self.open = false;
        if clean {
            tracing::info!("Peer closed");
        } else {
            tracing::warn!("Peer closed after timing out ({:?})", self.shutdown_timeout);
        }
        self.events.push_back(PeerEvent::Closed { clean });
        clean
    }

    /// Whether the transport is running.
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// A handle for queueing inbound messages from any thread.
    pub fn inbox(&self) -> Inbox {
        Inbox::new(self.inbox_tx.clone())
    }

    /// Queues an inbound message directly.
    pub fn enqueue(&self, message: Incoming) {
        let _ = self.inbox_tx.send(message);
    }

    /// Number of queued inbound messages.
    pub fn queued(&self) -> usize {
        self.inbox_rx.len()
    }

    /// Sender for outgoing messages. Sends before [`open`](Self::open) are discarded.
    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    /// Dispatches every message queued right now, in arrival order.
    ///
    /// Messages arriving during the drain wait for the next call. Returns the
    /// number of messages dispatched.
    pub fn drain_and_dispatch<H: PeerHandler>(&mut self, handler: &mut H) -> usize {
        let count = self.inbox_rx.len();
        for _ in 0..count {
            let Ok(message) = self.inbox_rx.try_recv() else {
                return count;
            };
            if let Err(error) = dispatch(handler, &self.outbox, &message) {
                tracing::warn!("Failed to handle message: {error}");
                self.events.push_back(PeerEvent::Error { message, error });
            }
        }
        count
    }

    /// Removes and returns the events raised so far, oldest first.
    pub fn drain_events(&mut self) -> std::collections::vec_deque::Drain<'_, PeerEvent> {
        self.events.drain(..)
    }

    /// Address the transport is bound to, once open.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.transport.local_addr()
    }

    /// Port of [`local_addr`](Self::local_addr).
    pub fn port(&self) -> Option<u16> {
        self.local_addr().map(|addr| addr.port())
    }

    /// The underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }
}

fn dispatch<H: PeerHandler>(
    handler: &mut H,
    outbox: &Outbox,
    message: &Incoming,
) -> Result<(), HandlerError> {
    match message {
        Incoming::Data {
            from,
            channel,
            payload,
        } => {
            let mut reader = NetReader::new(payload);
            match read_kind::<H::Kind>(&mut reader)? {
                Kind::Known(kind) => handler.on_data(outbox, *from, *channel, kind, &mut reader),
                Kind::Unknown(raw) => {
                    handler.on_unknown_data(outbox, *from, *channel, raw, &mut reader)
                }
            }
        }
        Incoming::Status {
            connection,
            status,
            reason,
        } => handler.on_status(outbox, *connection, *status, reason),
        Incoming::Unconnected { from, payload } => handler.on_unconnected(outbox, *from, payload),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind::{TagWidth, message_writer};
    use crate::memory::MemoryTransport;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum TestKind {
        Number,
        Fail,
    }

    impl WireEnum for TestKind {
        const WIDTH: TagWidth = TagWidth::for_max(1);

        fn to_raw(self) -> u64 {
            self as u64
        }

        fn from_raw(raw: u64) -> Option<Self> {
            match raw {
                0 => Some(Self::Number),
                1 => Some(Self::Fail),
                _ => None,
            }
        }
    }

    #[derive(Default)]
    struct Recorder {
        numbers: Vec<u32>,
        unknown: Vec<u64>,
        statuses: Vec<ConnectionStatus>,
        unconnected: Vec<Vec<u8>>,
    }

    #[derive(Debug, thiserror::Error)]
    #[error("refused")]
    struct Refused;

    impl PeerHandler for Recorder {
        type Kind = TestKind;

        fn on_data(
            &mut self,
            _outbox: &Outbox,
            _from: ConnectionId,
            _channel: Channel,
            kind: TestKind,
            reader: &mut NetReader<'_>,
        ) -> Result<(), HandlerError> {
            match kind {
                TestKind::Number => self.numbers.push(reader.read_u32()?),
                TestKind::Fail => return Err(HandlerError::other(Refused)),
            }
            Ok(())
        }

        fn on_unknown_data(
            &mut self,
            _outbox: &Outbox,
            _from: ConnectionId,
            _channel: Channel,
            kind: u64,
            _reader: &mut NetReader<'_>,
        ) -> Result<(), HandlerError> {
            self.unknown.push(kind);
            Ok(())
        }

        fn on_status(
            &mut self,
            _outbox: &Outbox,
            _connection: ConnectionId,
            status: ConnectionStatus,
            _reason: &str,
        ) -> Result<(), HandlerError> {
            self.statuses.push(status);
            Ok(())
        }

        fn on_unconnected(
            &mut self,
            _outbox: &Outbox,
            _from: SocketAddr,
            payload: &[u8],
        ) -> Result<(), HandlerError> {
            self.unconnected.push(payload.to_vec());
            Ok(())
        }
    }

    fn data(payload: Vec<u8>) -> Incoming {
        Incoming::Data {
            from: ConnectionId(1),
            channel: Channel::Default,
            payload,
        }
    }

    fn number(n: u32) -> Incoming {
        let mut w = message_writer(TestKind::Number);
        w.write_u32(n);
        data(w.into_bytes())
    }

    fn detached_peer() -> NetPeer<MemoryTransport> {
        let (transport, _) = MemoryTransport::pair();
        NetPeer::new(transport, Duration::from_secs(1))
    }

    #[test]
    fn test_dispatches_in_arrival_order() {
        let mut peer = detached_peer();
        for n in [3, 1, 2] {
            peer.enqueue(number(n));
        }
        let mut recorder = Recorder::default();
        assert_eq!(peer.drain_and_dispatch(&mut recorder), 3);
        assert_eq!(recorder.numbers, vec![3, 1, 2]);
        assert_eq!(peer.queued(), 0);
    }

    #[test]
    fn test_handler_error_is_isolated() {
        let mut peer = detached_peer();
        peer.enqueue(number(1));
        peer.enqueue(data(message_writer(TestKind::Fail).into_bytes()));
        // Truncated body: the kind is known but the u32 is missing.
        peer.enqueue(data(message_writer(TestKind::Number).into_bytes()));
        peer.enqueue(number(2));

        let mut recorder = Recorder::default();
        peer.drain_and_dispatch(&mut recorder);
        assert_eq!(recorder.numbers, vec![1, 2]);

        let errors: Vec<_> = peer
            .drain_events()
            .filter_map(|event| match event {
                PeerEvent::Error { error, .. } => Some(error),
                _ => None,
            })
            .collect();
        assert_eq!(errors.len(), 2);
        assert!(matches!(errors[0], HandlerError::Other(_)));
        assert!(matches!(errors[1], HandlerError::Read(_)));
    }

    #[test]
    fn test_error_event_carries_offending_message() {
        let mut peer = detached_peer();
        let bad = data(vec![7]);
        peer.enqueue(bad.clone());
        peer.drain_and_dispatch(&mut Recorder::default());

        let events: Vec<_> = peer.drain_events().collect();
        assert!(matches!(&events[..], [PeerEvent::Error { message, .. }] if *message == bad));
    }

    #[test]
    fn test_unknown_kind_reaches_unknown_handler() {
        let mut peer = detached_peer();
        peer.enqueue(data(vec![0, 200, 1, 2]));
        let mut recorder = Recorder::default();
        peer.drain_and_dispatch(&mut recorder);
        assert_eq!(recorder.unknown, vec![200]);
        assert_eq!(peer.drain_events().count(), 0);
    }

    #[test]
    fn test_status_and_unconnected_routing() {
        let mut peer = detached_peer();
        peer.enqueue(Incoming::Status {
            connection: ConnectionId(4),
            status: ConnectionStatus::Connected,
            reason: "1.0".to_string(),
        });
        peer.enqueue(Incoming::Unconnected {
            from: "127.0.0.1:9".parse().unwrap(),
            payload: b"TF?".to_vec(),
        });

        let mut recorder = Recorder::default();
        peer.drain_and_dispatch(&mut recorder);
        assert_eq!(recorder.statuses, vec![ConnectionStatus::Connected]);
        assert_eq!(recorder.unconnected, vec![b"TF?".to_vec()]);
    }

    #[test]
    fn test_messages_arriving_during_drain_wait() {
        struct Requeue {
            inbox: Inbox,
            seen: u32,
        }

        impl PeerHandler for Requeue {
            type Kind = TestKind;

            fn on_data(
                &mut self,
                _outbox: &Outbox,
                _from: ConnectionId,
                _channel: Channel,
                _kind: TestKind,
                _reader: &mut NetReader<'_>,
            ) -> Result<(), HandlerError> {
                self.seen += 1;
                self.inbox.push(number(0));
                Ok(())
            }
        }

        let mut peer = detached_peer();
        peer.enqueue(number(0));
        let mut handler = Requeue {
            inbox: peer.inbox(),
            seen: 0,
        };
        peer.drain_and_dispatch(&mut handler);
        assert_eq!(handler.seen, 1);
        assert_eq!(peer.queued(), 1);
    }

    #[test]
    fn test_open_and_close_raise_events() {
        let (a, b) = MemoryTransport::pair();
        let mut peer = NetPeer::new(a, Duration::from_secs(1));
        let mut other = NetPeer::new(b, Duration::from_secs(1));
        peer.open().unwrap();
        other.open().unwrap();
        assert!(matches!(peer.open(), Err(TransportError::AlreadyStarted)));
        assert!(peer.port().is_some());

        let mut w = message_writer(TestKind::Number);
        w.write_u32(9);
        peer.outbox().broadcast(Channel::Default, w.into_bytes());
        let mut recorder = Recorder::default();
        other.drain_and_dispatch(&mut recorder);
        assert_eq!(recorder.statuses, vec![ConnectionStatus::Connected]);
        assert_eq!(recorder.numbers, vec![9]);

        assert!(peer.close("done"));
        assert!(!peer.is_open());
        let events: Vec<_> = peer.drain_events().collect();
        assert!(matches!(events[0], PeerEvent::Opened { .. }));
        assert!(matches!(events[1], PeerEvent::Closed { clean: true }));
    }

    struct StuckTransport;

    impl Transport for StuckTransport {
        fn start(&mut self, _inbox: Inbox) -> Result<Outbox, TransportError> {
            Ok(Outbox::channel().0)
        }

        fn shutdown(&mut self, _reason: &str, _timeout: Duration) -> bool {
            false
        }

        fn local_addr(&self) -> Option<SocketAddr> {
            None
        }
    }

    #[test]
    fn test_close_raises_closed_even_on_timeout() {
        let mut peer = NetPeer::new(StuckTransport, Duration::from_millis(1));
        peer.open().unwrap();
        assert!(!peer.close("stuck"));
        assert!(!peer.is_open());
        let events: Vec<_> = peer.drain_events().collect();
        assert!(matches!(events.last(), Some(PeerEvent::Closed { clean: false })));
    }
}
