//! TCP transport in listening (server) or connecting (client) mode.
//!
//! The transport owns a small multi-threaded tokio runtime. Inbound frames
//! are pushed into the peer's [`Inbox`] from runtime tasks, outbound requests
//! are routed from the [`Outbox`] to per-connection writer tasks.
//!
//! Connection setup is a hail exchange on the `Default` channel:
//!
//! ```text
//! client -> server   [app id: str][version: str]
//! server -> client   [app id: str][version: str]   (only when accepted)
//! ```
//!
//! The server drops connections whose app id differs from its own or that
//! exceed `max_connections`. A UDP socket bound to the same port carries
//! unconnected data.

use std::collections::HashMap;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::runtime::Runtime;
use tokio::sync::{RwLock, mpsc, watch};

use crate::buffer::{NetReader, NetWriter, ReadError};
use crate::framing::{FrameConfig, FrameError, read_frame, write_frame};
use crate::transport::{
    Channel, ConnectionId, ConnectionStatus, Inbox, Incoming, Outbox, Outgoing, Target, Transport,
    TransportError,
};

/// Largest datagram accepted as unconnected data.
const MAX_DATAGRAM: usize = 2048;

/// Configuration for [`TcpTransport`].
#[derive(Debug, Clone)]
pub struct TcpConfig {
    /// Application identifier exchanged in the hail. Default: `"TileFortress"`.
    pub app_id: String,
    /// Version string sent in the hail.
    pub version: String,
    /// Maximum concurrent connections (listening mode). Default: 64.
    pub max_connections: usize,
    /// Time allowed for connecting and the hail exchange. Default: 5 s.
    pub handshake_timeout: Duration,
    /// Framing limits.
    pub frame: FrameConfig,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            app_id: "TileFortress".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            max_connections: 64,
            handshake_timeout: Duration::from_secs(5),
            frame: FrameConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Connection bookkeeping
// ---------------------------------------------------------------------------

/// Atomic generator for monotonically increasing [`ConnectionId`]s.
pub struct IdGenerator {
    next: AtomicU64,
}

impl IdGenerator {
    /// Create a new generator starting at 1.
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Return the next unique [`ConnectionId`].
    pub fn next_id(&self) -> ConnectionId {
        ConnectionId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Why a connection could not be registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rejected {
    LimitReached,
    ShuttingDown,
}

type Payload = Arc<[u8]>;

/// Sending side of one connection's writer task.
struct ConnectionHandle {
    default_tx: mpsc::UnboundedSender<Payload>,
    tiles_tx: mpsc::UnboundedSender<Payload>,
    close_tx: watch::Sender<Option<String>>,
}

/// Receiving side, owned by the writer task.
struct ConnectionQueues {
    default_rx: mpsc::UnboundedReceiver<Payload>,
    tiles_rx: mpsc::UnboundedReceiver<Payload>,
    close_rx: watch::Receiver<Option<String>>,
}

impl ConnectionHandle {
    fn new() -> (Self, ConnectionQueues) {
        let (default_tx, default_rx) = mpsc::unbounded_channel();
        let (tiles_tx, tiles_rx) = mpsc::unbounded_channel();
        let (close_tx, close_rx) = watch::channel(None);
        (
            Self {
                default_tx,
                tiles_tx,
                close_tx,
            },
            ConnectionQueues {
                default_rx,
                tiles_rx,
                close_rx,
            },
        )
    }

    fn queue(&self, channel: Channel, payload: Payload) {
        let tx = match channel {
            Channel::Default => &self.default_tx,
            Channel::Tiles => &self.tiles_tx,
        };
        let _ = tx.send(payload);
    }

    fn close(&self, reason: String) {
        let _ = self.close_tx.send(Some(reason));
    }
}

struct MapState {
    connections: HashMap<ConnectionId, ConnectionHandle>,
    open: bool,
}

/// Map of active connections keyed by [`ConnectionId`].
struct ConnectionMap {
    inner: RwLock<MapState>,
    max_connections: usize,
}

impl ConnectionMap {
    fn new(max_connections: usize) -> Self {
        Self {
            inner: RwLock::new(MapState {
                connections: HashMap::new(),
                open: true,
            }),
            max_connections,
        }
    }

    async fn insert(&self, id: ConnectionId, handle: ConnectionHandle) -> Result<(), Rejected> {
        let mut state = self.inner.write().await;
        if !state.open {
            return Err(Rejected::ShuttingDown);
        }
        if state.connections.len() >= self.max_connections {
            return Err(Rejected::LimitReached);
        }
        state.connections.insert(id, handle);
        Ok(())
    }

    async fn remove(&self, id: &ConnectionId) {
        self.inner.write().await.connections.remove(id);
    }

    async fn route(&self, target: Target, channel: Channel, payload: &Payload) {
        let state = self.inner.read().await;
        if let Target::One(id) = target
            && !state.connections.contains_key(&id)
        {
            tracing::trace!("Dropping message for unknown connection {id}");
            return;
        }
        for (id, handle) in &state.connections {
            if target.includes(*id) {
                handle.queue(channel, Arc::clone(payload));
            }
        }
    }

    async fn close(&self, id: ConnectionId, reason: String) {
        if let Some(handle) = self.inner.read().await.connections.get(&id) {
            handle.close(reason);
        }
    }

    /// Closes every connection and refuses new ones.
    async fn close_all(&self, reason: &str) {
        let mut state = self.inner.write().await;
        state.open = false;
        for handle in state.connections.values() {
            handle.close(reason.to_string());
        }
    }
}

// ---------------------------------------------------------------------------
// Runtime-side state and tasks
// ---------------------------------------------------------------------------

struct Shared {
    config: TcpConfig,
    inbox: Inbox,
    connections: ConnectionMap,
    ids: IdGenerator,
    active: Arc<AtomicUsize>,
    shutdown_rx: watch::Receiver<Option<String>>,
}

struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Spawns a task counted in `active` until it finishes or is dropped.
fn spawn_tracked<F>(active: &Arc<AtomicUsize>, task: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    active.fetch_add(1, Ordering::AcqRel);
    let guard = ActiveGuard(Arc::clone(active));
    tokio::spawn(async move {
        let _guard = guard;
        task.await;
    });
}

/// Resolves with the reason once `rx` carries one.
async fn wait_for_reason(rx: &mut watch::Receiver<Option<String>>) -> String {
    match rx.wait_for(Option::is_some).await {
        Ok(reason) => (*reason).clone().unwrap_or_default(),
        Err(_) => "transport dropped".to_string(),
    }
}

#[derive(Debug, thiserror::Error)]
enum HandshakeError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("malformed hail: {0}")]
    Malformed(#[from] ReadError),
    #[error("hail arrived on the tiles channel")]
    WrongChannel,
    #[error("application id mismatch: expected {expected:?}, got {actual:?}")]
    AppMismatch { expected: String, actual: String },
    #[error("timed out")]
    Timeout,
    #[error("shutting down")]
    Shutdown,
}

struct Hail {
    app_id: String,
    version: String,
}

async fn write_hail(writer: &mut OwnedWriteHalf, config: &TcpConfig) -> Result<(), FrameError> {
    let mut w = NetWriter::new();
    w.write_str(&config.app_id);
    w.write_str(&config.version);
    write_frame(writer, Channel::Default, w.as_slice(), &config.frame).await
}

async fn read_hail(reader: &mut OwnedReadHalf, config: &TcpConfig) -> Result<Hail, HandshakeError> {
    let (channel, body) = read_frame(reader, &config.frame).await?;
    if channel != Channel::Default {
        return Err(HandshakeError::WrongChannel);
    }
    let mut r = NetReader::new(&body);
    let hail = Hail {
        app_id: r.read_str()?.to_string(),
        version: r.read_str()?.to_string(),
    };
    if hail.app_id != config.app_id {
        return Err(HandshakeError::AppMismatch {
            expected: config.app_id.clone(),
            actual: hail.app_id,
        });
    }
    Ok(hail)
}

/// Runs `handshake` bounded by the configured timeout and the shutdown signal.
async fn bounded<T>(
    shared: &Shared,
    handshake: impl Future<Output = Result<T, HandshakeError>>,
) -> Result<T, HandshakeError> {
    let mut shutdown_rx = shared.shutdown_rx.clone();
    tokio::select! {
        result = tokio::time::timeout(shared.config.handshake_timeout, handshake) => {
            result.unwrap_or(Err(HandshakeError::Timeout))
        }
        _ = wait_for_reason(&mut shutdown_rx) => Err(HandshakeError::Shutdown),
    }
}

async fn accept_loop(shared: Arc<Shared>, listener: TcpListener) {
    let mut shutdown_rx = shared.shutdown_rx.clone();
    loop {
        tokio::select! {
            result = listener.accept() => match result {
                Ok((stream, peer_addr)) => {
                    spawn_tracked(&shared.active, accept_connection(Arc::clone(&shared), stream, peer_addr));
                }
                Err(e) => tracing::warn!("Accept failed: {e}"),
            },
            _ = wait_for_reason(&mut shutdown_rx) => break,
        }
    }
    tracing::debug!("Accept loop stopped");
}

async fn accept_connection(shared: Arc<Shared>, stream: TcpStream, peer_addr: SocketAddr) {
    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!("Failed to set TCP_NODELAY for {peer_addr}: {e}");
    }
    let (mut reader, mut writer) = stream.into_split();

    let hail = match bounded(&shared, read_hail(&mut reader, &shared.config)).await {
        Ok(hail) => hail,
        Err(e) => {
            tracing::warn!("Rejecting {peer_addr}: {e}");
            return;
        }
    };

    let id = shared.ids.next_id();
    let (handle, queues) = ConnectionHandle::new();
    match shared.connections.insert(id, handle).await {
        Ok(()) => {}
        Err(Rejected::LimitReached) => {
            tracing::warn!("Connection limit reached, rejecting {peer_addr}");
            return;
        }
        Err(Rejected::ShuttingDown) => return,
    }
    if let Err(e) = write_hail(&mut writer, &shared.config).await {
        tracing::warn!("Failed to answer hail from {peer_addr}: {e}");
        shared.connections.remove(&id).await;
        return;
    }

    tracing::info!("Accepted connection {id} from {peer_addr}");
    run_connection(shared, id, hail.version, reader, writer, queues).await;
}

async fn connect_to(shared: Arc<Shared>, addr: SocketAddr) {
    let id = shared.ids.next_id();
    let handshake = async {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let (mut reader, mut writer) = stream.into_split();
        write_hail(&mut writer, &shared.config).await?;
        let hail = read_hail(&mut reader, &shared.config).await?;
        Ok::<_, HandshakeError>((reader, writer, hail))
    };

    let (reader, writer, hail) = match bounded(&shared, handshake).await {
        Ok(parts) => parts,
        Err(e) => {
            tracing::warn!("Connecting to {addr} failed: {e}");
            shared.inbox.push(Incoming::Status {
                connection: id,
                status: ConnectionStatus::Disconnected,
                reason: e.to_string(),
            });
            return;
        }
    };

    let (handle, queues) = ConnectionHandle::new();
    if shared.connections.insert(id, handle).await.is_err() {
        return;
    }
    tracing::info!("Connected to {addr} as connection {id}");
    run_connection(shared, id, hail.version, reader, writer, queues).await;
}

async fn run_connection(
    shared: Arc<Shared>,
    id: ConnectionId,
    remote_version: String,
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
    queues: ConnectionQueues,
) {
    shared.inbox.push(Incoming::Status {
        connection: id,
        status: ConnectionStatus::Connected,
        reason: remote_version,
    });

    let reason = tokio::select! {
        reason = read_loop(&shared, id, reader) => reason,
        reason = write_loop(&shared.config.frame, writer, queues) => reason,
    };

    shared.connections.remove(&id).await;
    tracing::info!("Connection {id} closed: {reason}");
    shared.inbox.push(Incoming::Status {
        connection: id,
        status: ConnectionStatus::Disconnected,
        reason,
    });
}

async fn read_loop(shared: &Shared, id: ConnectionId, mut reader: OwnedReadHalf) -> String {
    loop {
        match read_frame(&mut reader, &shared.config.frame).await {
            Ok((channel, payload)) => {
                if !shared.inbox.push(Incoming::Data {
                    from: id,
                    channel,
                    payload,
                }) {
                    return "peer dropped".to_string();
                }
            }
            Err(FrameError::ConnectionClosed) => return "remote closed the connection".to_string(),
            Err(e) => return format!("read failed: {e}"),
        }
    }
}

/// Writes queued frames, always preferring `Default` over `Tiles`.
///
/// On close, everything already queued is flushed before returning.
async fn write_loop(
    config: &FrameConfig,
    mut writer: OwnedWriteHalf,
    mut queues: ConnectionQueues,
) -> String {
    loop {
        let (channel, payload) = tokio::select! {
            biased;
            reason = wait_for_reason(&mut queues.close_rx) => {
                flush_queued(config, &mut writer, &mut queues).await;
                return reason;
            }
            Some(payload) = queues.default_rx.recv() => (Channel::Default, payload),
            Some(payload) = queues.tiles_rx.recv() => (Channel::Tiles, payload),
            else => return "connection dropped".to_string(),
        };
        match write_frame(&mut writer, channel, &payload, config).await {
            Ok(()) => {}
            Err(FrameError::PayloadTooLarge { size, max }) => {
                tracing::warn!("Dropping outgoing message of {size} bytes (max {max})");
            }
            Err(e) => return format!("write failed: {e}"),
        }
    }
}

async fn flush_queued(config: &FrameConfig, writer: &mut OwnedWriteHalf, queues: &mut ConnectionQueues) {
    for (channel, rx) in [
        (Channel::Default, &mut queues.default_rx),
        (Channel::Tiles, &mut queues.tiles_rx),
    ] {
        while let Ok(payload) = rx.try_recv() {
            if write_frame(writer, channel, &payload, config).await.is_err() {
                return;
            }
        }
    }
}

async fn receive_unconnected(shared: Arc<Shared>, udp: Arc<UdpSocket>) {
    let mut shutdown_rx = shared.shutdown_rx.clone();
    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        tokio::select! {
            result = udp.recv_from(&mut buf) => match result {
                Ok((len, from)) => {
                    shared.inbox.push(Incoming::Unconnected {
                        from,
                        payload: buf[..len].to_vec(),
                    });
                }
                Err(e) => tracing::debug!("UDP receive failed: {e}"),
            },
            _ = wait_for_reason(&mut shutdown_rx) => break,
        }
    }
}

async fn route_outgoing(
    shared: Arc<Shared>,
    udp: Arc<UdpSocket>,
    mut rx: mpsc::UnboundedReceiver<Outgoing>,
) {
    let mut shutdown_rx = shared.shutdown_rx.clone();
    let reason = loop {
        tokio::select! {
            request = rx.recv() => match request {
                Some(request) => route(&shared, &udp, request).await,
                None => break "outbox dropped".to_string(),
            },
            reason = wait_for_reason(&mut shutdown_rx) => break reason,
        }
    };

    // Requests queued before shutdown still go out.
    while let Ok(request) = rx.try_recv() {
        route(&shared, &udp, request).await;
    }
    shared.connections.close_all(&reason).await;
}

async fn route(shared: &Shared, udp: &UdpSocket, request: Outgoing) {
    match request {
        Outgoing::Send {
            target,
            channel,
            payload,
        } => shared.connections.route(target, channel, &payload).await,
        Outgoing::SendUnconnected { to, payload } => {
            if let Err(e) = udp.send_to(&payload, to).await {
                tracing::debug!("UDP send to {to} failed: {e}");
            }
        }
        Outgoing::Disconnect { connection, reason } => {
            shared.connections.close(connection, reason).await;
        }
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum Mode {
    Listen(SocketAddr),
    Connect(SocketAddr),
}

/// TCP transport with a UDP side socket for unconnected data.
pub struct TcpTransport {
    mode: Mode,
    config: TcpConfig,
    runtime: Option<Runtime>,
    shutdown_tx: Option<watch::Sender<Option<String>>>,
    active: Arc<AtomicUsize>,
    local_addr: Option<SocketAddr>,
}

impl TcpTransport {
    /// A transport accepting connections on `addr`.
    pub fn listen(addr: SocketAddr, config: TcpConfig) -> Self {
        Self::new(Mode::Listen(addr), config)
    }

    /// A transport opening a single connection to `addr`.
    pub fn connect(addr: SocketAddr, config: TcpConfig) -> Self {
        Self::new(Mode::Connect(addr), config)
    }

    fn new(mode: Mode, config: TcpConfig) -> Self {
        Self {
            mode,
            config,
            runtime: None,
            shutdown_tx: None,
            active: Arc::new(AtomicUsize::new(0)),
            local_addr: None,
        }
    }

    /// Whether the runtime is started and not shut down.
    pub fn is_running(&self) -> bool {
        self.runtime.is_some()
    }
}

impl Transport for TcpTransport {
    fn start(&mut self, inbox: Inbox) -> Result<Outbox, TransportError> {
        if self.runtime.is_some() {
            return Err(TransportError::AlreadyStarted);
        }

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("tilefort-net")
            .enable_all()
            .build()?;

        let (shutdown_tx, shutdown_rx) = watch::channel(None);
        let (outbox, outgoing_rx) = Outbox::channel();
        let shared = Arc::new(Shared {
            config: self.config.clone(),
            inbox,
            connections: ConnectionMap::new(self.config.max_connections),
            ids: IdGenerator::new(),
            active: Arc::clone(&self.active),
            shutdown_rx,
        });

        let mode = self.mode;
        let local_addr = runtime.block_on(async move {
            let udp = match mode {
                Mode::Listen(addr) => {
                    let listener = TcpListener::bind(addr)
                        .await
                        .map_err(|source| TransportError::Bind { addr, source })?;
                    let local = listener.local_addr()?;
                    let udp = UdpSocket::bind(local)
                        .await
                        .map_err(|source| TransportError::Bind { addr: local, source })?;
                    tracing::info!("Listening on {local}");
                    spawn_tracked(&shared.active, accept_loop(Arc::clone(&shared), listener));
                    udp
                }
                Mode::Connect(addr) => {
                    let bind: SocketAddr = if addr.is_ipv4() {
                        (Ipv4Addr::UNSPECIFIED, 0).into()
                    } else {
                        (Ipv6Addr::UNSPECIFIED, 0).into()
                    };
                    let udp = UdpSocket::bind(bind)
                        .await
                        .map_err(|source| TransportError::Bind { addr: bind, source })?;
                    spawn_tracked(&shared.active, connect_to(Arc::clone(&shared), addr));
                    udp
                }
            };

            let local = udp.local_addr()?;
            let udp = Arc::new(udp);
            spawn_tracked(
                &shared.active,
                receive_unconnected(Arc::clone(&shared), Arc::clone(&udp)),
            );
            let active = Arc::clone(&shared.active);
            spawn_tracked(&active, route_outgoing(shared, udp, outgoing_rx));
            Ok::<_, TransportError>(local)
        });

        let local_addr = match local_addr {
            Ok(addr) => addr,
            Err(e) => {
                runtime.shutdown_background();
                return Err(e);
            }
        };

        self.local_addr = Some(local_addr);
        self.shutdown_tx = Some(shutdown_tx);
        self.runtime = Some(runtime);
        Ok(outbox)
    }

    fn shutdown(&mut self, reason: &str, timeout: Duration) -> bool {
        let Some(runtime) = self.runtime.take() else {
            return true;
        };
        tracing::info!(reason, "Shutting down TCP transport");
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(Some(reason.to_string()));
        }

        let deadline = Instant::now() + timeout;
        let clean = loop {
            if self.active.load(Ordering::Acquire) == 0 {
                break true;
            }
            if Instant::now() >= deadline {
                break false;
            }
            std::thread::sleep(Duration::from_millis(1));
        };
        if !clean {
            tracing::warn!(
                tasks = self.active.load(Ordering::Acquire),
                "Transport tasks still running after {timeout:?}"
            );
        }

        runtime.shutdown_background();
        self.local_addr = None;
        clean
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(Some("transport dropped".to_string()));
        }
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn inbox() -> (Inbox, mpsc::UnboundedReceiver<Incoming>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Inbox::new(tx), rx)
    }

    fn wait_for(
        rx: &mut mpsc::UnboundedReceiver<Incoming>,
        mut pred: impl FnMut(&Incoming) -> bool,
    ) -> Incoming {
        let deadline = Instant::now() + TIMEOUT;
        loop {
            match rx.try_recv() {
                Ok(message) if pred(&message) => return message,
                Ok(_) => {}
                Err(_) => {
                    assert!(Instant::now() < deadline, "timed out waiting for message");
                    std::thread::sleep(Duration::from_millis(5));
                }
            }
        }
    }

    fn status_of(message: &Incoming) -> Option<(ConnectionId, ConnectionStatus)> {
        match message {
            Incoming::Status {
                connection, status, ..
            } => Some((*connection, *status)),
            _ => None,
        }
    }

    fn connected(rx: &mut mpsc::UnboundedReceiver<Incoming>) -> ConnectionId {
        let message = wait_for(rx, |m| {
            matches!(status_of(m), Some((_, ConnectionStatus::Connected)))
        });
        status_of(&message).map(|(id, _)| id).unwrap()
    }

    fn start_server(config: TcpConfig) -> (TcpTransport, Outbox, mpsc::UnboundedReceiver<Incoming>) {
        let mut server = TcpTransport::listen("127.0.0.1:0".parse().unwrap(), config);
        let (inbox, rx) = inbox();
        let outbox = server.start(inbox).unwrap();
        (server, outbox, rx)
    }

    fn start_client(
        server: &TcpTransport,
        config: TcpConfig,
    ) -> (TcpTransport, Outbox, mpsc::UnboundedReceiver<Incoming>) {
        let mut client = TcpTransport::connect(server.local_addr().unwrap(), config);
        let (inbox, rx) = inbox();
        let outbox = client.start(inbox).unwrap();
        (client, outbox, rx)
    }

    #[test]
    fn test_server_binds_ephemeral_port() {
        let (server, _outbox, _rx) = start_server(TcpConfig::default());
        assert_ne!(server.local_addr().unwrap().port(), 0);
    }

    #[test]
    fn test_start_twice_fails() {
        let (mut server, _outbox, _rx) = start_server(TcpConfig::default());
        let (inbox, _rx2) = inbox();
        assert!(matches!(server.start(inbox), Err(TransportError::AlreadyStarted)));
    }

    #[test]
    fn test_handshake_and_data_exchange() {
        let (mut server, server_out, mut server_rx) = start_server(TcpConfig::default());
        let client_config = TcpConfig {
            version: "9.9.9".to_string(),
            ..TcpConfig::default()
        };
        let (mut client, client_out, mut client_rx) = start_client(&server, client_config);

        let on_server = wait_for(&mut server_rx, |m| status_of(m).is_some());
        let Incoming::Status { reason, status, connection } = on_server else {
            panic!("expected status");
        };
        assert_eq!(status, ConnectionStatus::Connected);
        assert_eq!(reason, "9.9.9");
        let to_server = connected(&mut client_rx);

        client_out.send_to(to_server, Channel::Default, b"ping".to_vec());
        let message = wait_for(&mut server_rx, |m| matches!(m, Incoming::Data { .. }));
        assert_eq!(
            message,
            Incoming::Data {
                from: connection,
                channel: Channel::Default,
                payload: b"ping".to_vec(),
            }
        );

        server_out.broadcast(Channel::Tiles, b"chunk".to_vec());
        let message = wait_for(&mut client_rx, |m| matches!(m, Incoming::Data { .. }));
        assert!(matches!(
            message,
            Incoming::Data { channel: Channel::Tiles, ref payload, .. } if payload == b"chunk"
        ));

        assert!(client.shutdown("done", TIMEOUT));
        assert!(server.shutdown("done", TIMEOUT));
    }

    #[test]
    fn test_wrong_app_id_is_rejected() {
        let (server, _server_out, mut server_rx) = start_server(TcpConfig::default());
        let config = TcpConfig {
            app_id: "SomethingElse".to_string(),
            ..TcpConfig::default()
        };
        let (_client, _client_out, mut client_rx) = start_client(&server, config);

        let message = wait_for(&mut client_rx, |m| status_of(m).is_some());
        assert!(matches!(
            status_of(&message),
            Some((_, ConnectionStatus::Disconnected))
        ));
        assert!(server_rx.try_recv().is_err());
    }

    #[test]
    fn test_max_connections_enforced() {
        let config = TcpConfig {
            max_connections: 1,
            ..TcpConfig::default()
        };
        let (server, _server_out, mut server_rx) = start_server(config);

        let (_first, _first_out, mut first_rx) = start_client(&server, TcpConfig::default());
        connected(&mut first_rx);
        connected(&mut server_rx);

        let (_second, _second_out, mut second_rx) = start_client(&server, TcpConfig::default());
        let message = wait_for(&mut second_rx, |m| status_of(m).is_some());
        assert!(matches!(
            status_of(&message),
            Some((_, ConnectionStatus::Disconnected))
        ));
    }

    #[test]
    fn test_disconnect_request_closes_both_sides() {
        let (server, server_out, mut server_rx) = start_server(TcpConfig::default());
        let (_client, _client_out, mut client_rx) = start_client(&server, TcpConfig::default());
        let id = connected(&mut server_rx);
        connected(&mut client_rx);

        server_out.disconnect(id, "kicked");
        let on_server = wait_for(&mut server_rx, |m| status_of(m).is_some());
        assert!(matches!(
            on_server,
            Incoming::Status { status: ConnectionStatus::Disconnected, ref reason, .. } if reason == "kicked"
        ));
        let on_client = wait_for(&mut client_rx, |m| status_of(m).is_some());
        assert!(matches!(
            status_of(&on_client),
            Some((_, ConnectionStatus::Disconnected))
        ));
    }

    #[test]
    fn test_unconnected_datagrams_both_ways() {
        let (server, server_out, mut server_rx) = start_server(TcpConfig::default());
        let socket = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        socket.set_read_timeout(Some(TIMEOUT)).unwrap();
        socket.send_to(b"TF?", server.local_addr().unwrap()).unwrap();

        let message = wait_for(&mut server_rx, |m| matches!(m, Incoming::Unconnected { .. }));
        let Incoming::Unconnected { from, payload } = message else {
            panic!("expected unconnected data");
        };
        assert_eq!(payload, b"TF?");

        server_out.send_unconnected(from, b"TF!".to_vec());
        let mut buf = [0u8; 16];
        let (len, _) = socket.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[..len], b"TF!");
    }

    #[test]
    fn test_shutdown_flushes_and_disconnects_clients() {
        let (mut server, server_out, mut server_rx) = start_server(TcpConfig::default());
        let (_client, _client_out, mut client_rx) = start_client(&server, TcpConfig::default());
        connected(&mut server_rx);
        connected(&mut client_rx);

        server_out.broadcast(Channel::Default, b"last words".to_vec());
        assert!(server.shutdown("server closing", TIMEOUT));
        assert!(server.local_addr().is_none());

        let message = wait_for(&mut client_rx, |m| matches!(m, Incoming::Data { .. }));
        assert!(matches!(message, Incoming::Data { ref payload, .. } if payload == b"last words"));
        let message = wait_for(&mut client_rx, |m| status_of(m).is_some());
        assert!(matches!(
            status_of(&message),
            Some((_, ConnectionStatus::Disconnected))
        ));
    }

    #[test]
    fn test_connect_to_closed_port_reports_disconnect() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };
        let mut client = TcpTransport::connect(port, TcpConfig::default());
        let (inbox, mut rx) = inbox();
        client.start(inbox).unwrap();

        let message = wait_for(&mut rx, |m| status_of(m).is_some());
        assert!(matches!(
            status_of(&message),
            Some((_, ConnectionStatus::Disconnected))
        ));
        assert!(client.shutdown("done", TIMEOUT));
    }
}
