//! Authoritative server session.
//!
//! Each [`ServerSession::update`] runs one tick:
//!
//! 1. dispatch every queued network message,
//! 2. answer up to `requests_per_tick` chunk requests on the tiles channel,
//! 3. apply pending build orders to the world,
//! 4. collect the applied mutations and broadcast them every
//!    `broadcast_interval` ticks.

use std::net::SocketAddr;
use std::time::Duration;

use rustc_hash::FxHashSet;
use tilefort_net::{
    Channel, ConnectionId, ConnectionStatus, HandlerError, Lz4Codec, NetPeer, NetReader, Outbox,
    PeerEvent, PeerHandler, Transport, TransportError,
};
use tilefort_world::{ChunkSupplier, TerrainGenerator, UpdateReport, World, WorldSettings};

use crate::build_orders::{BuildOrderBatcher, decode_build_orders};
use crate::chunk_data::encode_chunk_data;
use crate::message::{
    ChunkRequest, DISCOVERY_REQUEST, DataMessageType, ServerInfo, decode_chat, encode_chat,
};
use crate::request_queue::ChunkRequestQueue;

/// Tunables of a [`ServerSession`].
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Reported to discovery requests.
    pub app_id: String,
    pub version: String,
    /// Chunk requests answered per tick at most.
    pub requests_per_tick: usize,
    /// Ticks between build-order broadcasts.
    pub broadcast_interval: u32,
    pub shutdown_timeout: Duration,
    pub world: WorldSettings,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            app_id: "TileFortress".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            requests_per_tick: 250,
            broadcast_interval: 1,
            shutdown_timeout: Duration::from_secs(5),
            world: WorldSettings::default(),
        }
    }
}

/// What one server tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerTick {
    /// Network messages dispatched.
    pub dispatched: usize,
    pub chunks_sent: usize,
    /// Requests for chunks the supplier could not produce yet.
    pub chunks_withheld: usize,
    pub world: UpdateReport,
    /// Build-order messages broadcast.
    pub broadcasts: usize,
    /// Messages whose handling failed.
    pub errors: usize,
}

struct ServerState<S> {
    world: World<S>,
    requests: ChunkRequestQueue,
    batcher: BuildOrderBatcher,
    codec: Lz4Codec,
    clients: FxHashSet<ConnectionId>,
    app_id: String,
    version: String,
}

/// The server: world, peer and the request and broadcast queues.
pub struct ServerSession<T, S = TerrainGenerator> {
    peer: NetPeer<T>,
    state: ServerState<S>,
}

impl<T: Transport, S: ChunkSupplier> ServerSession<T, S> {
    /// Creates a closed session whose world is filled by `supplier`.
    pub fn new(transport: T, supplier: S, settings: ServerSettings) -> Self {
        Self {
            peer: NetPeer::new(transport, settings.shutdown_timeout),
            state: ServerState {
                world: World::with_settings(supplier, settings.world),
                requests: ChunkRequestQueue::new(settings.requests_per_tick),
                batcher: BuildOrderBatcher::new(settings.broadcast_interval),
                codec: Lz4Codec,
                clients: FxHashSet::default(),
                app_id: settings.app_id,
                version: settings.version,
            },
        }
    }

    /// Loads the world and starts accepting connections.
    pub fn open(&mut self) -> Result<(), TransportError> {
        self.peer.open()?;
        self.state.world.load();
        Ok(())
    }

    /// Stops the transport and unloads the world.
    pub fn close(&mut self, reason: &str) -> bool {
        let clean = self.peer.close(reason);
        self.state.world.unload();
        self.state.clients.clear();
        clean
    }

    /// Runs one server tick: dispatch, capped chunk service, world update, broadcast.
    pub fn update(&mut self) -> ServerTick {
        let mut tick = ServerTick {
            dispatched: self.peer.drain_and_dispatch(&mut self.state),
            ..ServerTick::default()
        };
        let outbox = self.peer.outbox();
        let state = &mut self.state;

        for request in state.requests.take_tick() {
            let Some(sender) = request.sender else {
                continue;
            };
            if !state.clients.contains(&sender) {
                continue;
            }
            let Some(chunk) = state.world.try_get_chunk(request.position) else {
                tracing::debug!("Chunk {} not available for {sender}", request.position);
                tick.chunks_withheld += 1;
                continue;
            };
            match encode_chunk_data(chunk, &state.codec) {
                Ok(bytes) => {
                    outbox.send_to(sender, Channel::Tiles, bytes);
                    tick.chunks_sent += 1;
                }
                Err(e) => tracing::warn!("Failed to encode chunk {}: {e}", request.position),
            }
        }

        tick.world = state.world.update();
        state
            .batcher
            .extend(state.world.drain_mutations().map(|event| event.order));
        if let Some(messages) = state.batcher.tick() {
            tick.broadcasts = messages.len();
            for message in messages {
                outbox.broadcast(Channel::Default, message);
            }
        }

        tick.errors = self
            .peer
            .drain_events()
            .filter(|event| matches!(event, PeerEvent::Error { .. }))
            .count();
        tick
    }

    /// Sends a chat line from the server to every client.
    pub fn broadcast_chat(&self, text: &str) {
        self.peer
            .outbox()
            .broadcast(Channel::Default, encode_chat(text));
    }

    /// The authoritative world.
    pub fn world(&self) -> &World<S> {
        &self.state.world
    }

    /// Mutable access to the authoritative world.
    pub fn world_mut(&mut self) -> &mut World<S> {
        &mut self.state.world
    }

    /// Connected clients.
    pub fn client_count(&self) -> usize {
        self.state.clients.len()
    }

    /// Chunk requests not serviced yet.
    pub fn pending_requests(&self) -> usize {
        self.state.requests.len()
    }

    /// The underlying peer.
    pub fn peer(&self) -> &NetPeer<T> {
        &self.peer
    }

    /// Address the transport is bound to, once open.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.peer.local_addr()
    }
}

impl<S: ChunkSupplier> PeerHandler for ServerState<S> {
    type Kind = DataMessageType;

    fn on_data(
        &mut self,
        outbox: &Outbox,
        from: ConnectionId,
        _channel: Channel,
        kind: DataMessageType,
        reader: &mut NetReader<'_>,
    ) -> Result<(), HandlerError> {
        match kind {
            DataMessageType::Chat => {
                let text = decode_chat(reader)?;
                tracing::info!("Chat [{from}]: {text}");
                outbox.broadcast_except(from, Channel::Default, encode_chat(&text));
            }
            DataMessageType::ChunkRequest => {
                self.requests.push(ChunkRequest::decode(reader, from)?);
            }
            DataMessageType::BuildOrders => {
                for order in decode_build_orders(reader)? {
                    self.world.enqueue_build_order(order);
                }
            }
            DataMessageType::ChunkData => {
                tracing::debug!("Ignoring chunk data sent by client {from}");
            }
        }
        Ok(())
    }

    fn on_status(
        &mut self,
        _outbox: &Outbox,
        connection: ConnectionId,
        status: ConnectionStatus,
        reason: &str,
    ) -> Result<(), HandlerError> {
        match status {
            ConnectionStatus::Connected => {
                self.clients.insert(connection);
                tracing::info!("\"{connection}\" connected (version {reason})");
            }
            ConnectionStatus::Disconnected => {
                self.clients.remove(&connection);
                let dropped = self.requests.remove_sender(connection);
                tracing::info!(
                    "\"{connection}\" disconnected: {reason} ({dropped} requests dropped)"
                );
            }
        }
        Ok(())
    }

    fn on_unconnected(
        &mut self,
        outbox: &Outbox,
        from: SocketAddr,
        payload: &[u8],
    ) -> Result<(), HandlerError> {
        if payload != DISCOVERY_REQUEST {
            tracing::trace!("Ignoring {} unconnected bytes from {from}", payload.len());
            return Ok(());
        }
        let info = ServerInfo {
            app_id: self.app_id.clone(),
            version: self.version.clone(),
            clients: self.clients.len() as u32,
        };
        tracing::debug!("Answering discovery from {from}");
        outbox.send_unconnected(from, info.encode());
        Ok(())
    }
}
