//! Client session: a local world mirror fed by the server.
//!
//! Chunks are fetched on demand through [`RemoteChunkSupplier`]. Build
//! orders from the server go through the world's queue and are never sent
//! back; direct edits made locally with [`ClientSession::paint`] are
//! forwarded to the server after each tick.

use std::net::SocketAddr;
use std::time::Duration;

use tilefort_net::{
    Channel, ConnectionId, ConnectionStatus, HandlerError, Lz4Codec, NetPeer, NetReader, Outbox,
    PeerEvent, PeerHandler, Transport, TransportError,
};
use tilefort_world::{
    ChunkPosition, MutationSource, Tile, TilePosition, UpdateReport, World, WorldSettings,
};

use crate::build_orders::{decode_build_orders, encode_build_order_batches};
use crate::chunk_data::decode_chunk_data;
use crate::message::{DISCOVERY_REQUEST, DataMessageType, ServerInfo, decode_chat, encode_chat};
use crate::remote::RemoteChunkSupplier;

/// Client session tuning.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// How long to wait for a chunk before asking again.
    pub chunk_retry: Duration,
    pub shutdown_timeout: Duration,
    pub world: WorldSettings,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            chunk_retry: Duration::from_secs(2),
            shutdown_timeout: Duration::from_secs(5),
            world: WorldSettings::default(),
        }
    }
}

/// What one client tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientTick {
    pub dispatched: usize,
    pub world: UpdateReport,
    /// Local edits forwarded to the server.
    pub orders_sent: usize,
    pub errors: usize,
}

struct ClientState {
    world: World<RemoteChunkSupplier>,
    server: Option<ConnectionId>,
    codec: Lz4Codec,
    chat: Vec<(ConnectionId, String)>,
    discovered: Vec<(SocketAddr, ServerInfo)>,
}

/// Client side of the protocol: a peer plus a world fed by the server.
pub struct ClientSession<T> {
    peer: NetPeer<T>,
    state: ClientState,
}

impl<T: Transport> ClientSession<T> {
    /// Creates a closed session over `transport`.
    pub fn new(transport: T, settings: ClientSettings) -> Self {
        Self {
            peer: NetPeer::new(transport, settings.shutdown_timeout),
            state: ClientState {
                world: World::with_settings(
                    RemoteChunkSupplier::new(settings.chunk_retry),
                    settings.world,
                ),
                server: None,
                codec: Lz4Codec,
                chat: Vec::new(),
                discovered: Vec::new(),
            },
        }
    }

    /// Starts the transport and loads the world.
    pub fn open(&mut self) -> Result<(), TransportError> {
        self.peer.open()?;
        self.state.world.load();
        Ok(())
    }

    /// Shuts the transport down and unloads the world. Returns whether the
    /// shutdown was clean.
    pub fn close(&mut self, reason: &str) -> bool {
        let clean = self.peer.close(reason);
        self.state.world.supplier_mut().detach();
        self.state.server = None;
        self.state.world.unload();
        clean
    }

    /// Runs one client tick: dispatch, world update, then edits to the server.
    pub fn update(&mut self) -> ClientTick {
        let mut tick = ClientTick {
            dispatched: self.peer.drain_and_dispatch(&mut self.state),
            ..ClientTick::default()
        };
        tick.world = self.state.world.update();

        let edits: Vec<_> = self
            .state
            .world
            .drain_mutations()
            .filter(|event| event.source == MutationSource::Direct)
            .map(|event| event.order)
            .collect();
        if let Some(server) = self.state.server {
            for message in encode_build_order_batches(&edits) {
                self.peer
                    .outbox()
                    .send_to(server, Channel::Default, message);
            }
            tick.orders_sent = edits.len();
        } else if !edits.is_empty() {
            tracing::debug!("Not connected, {} local edits stay local", edits.len());
        }

        tick.errors = self
            .peer
            .drain_events()
            .filter(|event| matches!(event, PeerEvent::Error { .. }))
            .count();
        tick
    }

    /// Makes sure every chunk within `radius` of `center` is loaded or
    /// requested. Returns how many are still missing.
    pub fn request_area(&mut self, center: ChunkPosition, radius: i32) -> usize {
        center
            .square(radius)
            .filter(|&position| self.state.world.try_get_chunk(position).is_none())
            .count()
    }

    /// Places `tile` at `position` if its chunk is loaded. The edit reaches
    /// the server on the next [`update`](Self::update).
    pub fn paint(&mut self, position: TilePosition, tile: Tile) -> bool {
        let chunk = position.chunk();
        if !self.state.world.is_loaded(chunk) {
            return false;
        }
        self.state
            .world
            .try_get_chunk(chunk)
            .is_some_and(|chunk| chunk.try_set(position.local_index(), tile))
    }

    /// Sends chat to the server. Returns `false` when not connected.
    pub fn send_chat(&self, text: &str) -> bool {
        let Some(server) = self.state.server else {
            return false;
        };
        self.peer
            .outbox()
            .send_to(server, Channel::Default, encode_chat(text));
        true
    }

    /// Asks whatever listens at `addr` to identify itself. Replies show up
    /// in [`discovered`](Self::discovered).
    pub fn discover(&self, addr: SocketAddr) {
        self.peer
            .outbox()
            .send_unconnected(addr, DISCOVERY_REQUEST.to_vec());
    }

    /// Servers that answered [`discover`](Self::discover).
    pub fn discovered(&self) -> &[(SocketAddr, ServerInfo)] {
        &self.state.discovered
    }

    /// Removes and returns received chat lines, oldest first.
    pub fn drain_chat(&mut self) -> std::vec::Drain<'_, (ConnectionId, String)> {
        self.state.chat.drain(..)
    }

    /// Whether the server's `Connected` status has arrived.
    pub fn is_connected(&self) -> bool {
        self.state.server.is_some()
    }

    /// Connection of the server, once connected.
    pub fn server(&self) -> Option<ConnectionId> {
        self.state.server
    }

    /// The client's copy of the world.
    pub fn world(&self) -> &World<RemoteChunkSupplier> {
        &self.state.world
    }

    /// Mutable access to the client's world.
    pub fn world_mut(&mut self) -> &mut World<RemoteChunkSupplier> {
        &mut self.state.world
    }

    /// The underlying peer.
    pub fn peer(&self) -> &NetPeer<T> {
        &self.peer
    }
}

impl PeerHandler for ClientState {
    type Kind = DataMessageType;

    fn on_data(
        &mut self,
        _outbox: &Outbox,
        from: ConnectionId,
        _channel: Channel,
        kind: DataMessageType,
        reader: &mut NetReader<'_>,
    ) -> Result<(), HandlerError> {
        match kind {
            DataMessageType::ChunkData => {
                let chunk = decode_chunk_data(reader, &self.codec)?;
                let position = chunk.position();
                if self.world.is_loaded(position) {
                    tracing::debug!("Ignoring chunk {position}: already loaded");
                } else if !self.world.supplier_mut().receive(chunk) {
                    tracing::debug!("Ignoring chunk {position}: not requested");
                } else {
                    self.world.try_get_chunk(position);
                }
            }
            DataMessageType::BuildOrders => {
                for order in decode_build_orders(reader)? {
                    self.world.enqueue_build_order(order);
                }
            }
            DataMessageType::Chat => {
                let text = decode_chat(reader)?;
                tracing::info!("Chat [{from}]: {text}");
                self.chat.push((from, text));
            }
            DataMessageType::ChunkRequest => {
                tracing::debug!("Ignoring chunk request from {from}");
            }
        }
        Ok(())
    }

    fn on_status(
        &mut self,
        outbox: &Outbox,
        connection: ConnectionId,
        status: ConnectionStatus,
        reason: &str,
    ) -> Result<(), HandlerError> {
        match status {
            ConnectionStatus::Connected => {
                tracing::info!("Connected to server {connection} (version {reason})");
                self.server = Some(connection);
                self.world
                    .supplier_mut()
                    .attach(outbox.clone(), connection);
            }
            ConnectionStatus::Disconnected => {
                tracing::info!("Disconnected from server {connection}: {reason}");
                if self.server == Some(connection) {
                    self.server = None;
                    self.world.supplier_mut().detach();
                }
            }
        }
        Ok(())
    }

    fn on_unconnected(
        &mut self,
        _outbox: &Outbox,
        from: SocketAddr,
        payload: &[u8],
    ) -> Result<(), HandlerError> {
        match ServerInfo::decode(payload) {
            Ok(info) => {
                tracing::info!(
                    "Found {} {} at {from} with {} clients",
                    info.app_id,
                    info.version,
                    info.clients
                );
                self.discovered.push((from, info));
            }
            Err(_) => tracing::trace!("Ignoring {} unconnected bytes from {from}", payload.len()),
        }
        Ok(())
    }
}
