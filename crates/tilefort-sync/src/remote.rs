//! Client-side chunk supplier backed by server requests.
//!
//! [`RemoteChunkSupplier`] answers the world's lookups from chunks already
//! received, and otherwise asks the server and reports "not yet". A request
//! is not repeated until the retry interval has passed. Requests left
//! unanswered for [`STALE_RETRIES`] intervals are forgotten, so positions the
//! world stopped asking for do not accumulate.

use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;
use tilefort_net::{Channel, ConnectionId, Outbox};
use tilefort_world::{Chunk, ChunkPosition, ChunkSupplier};

use crate::message::ChunkRequest;

/// Retry intervals after which an unanswered request is forgotten.
pub const STALE_RETRIES: u32 = 4;

struct Link {
    outbox: Outbox,
    server: ConnectionId,
}

/// Client world's [`ChunkSupplier`]: serves received chunks and requests
/// missing ones from the server.
pub struct RemoteChunkSupplier {
    link: Option<Link>,
    requested: FxHashMap<ChunkPosition, Instant>,
    received: FxHashMap<ChunkPosition, Chunk>,
    retry: Duration,
}

impl RemoteChunkSupplier {
    /// A detached supplier that re-sends a request after `retry`.
    pub fn new(retry: Duration) -> Self {
        Self {
            link: None,
            requested: FxHashMap::default(),
            received: FxHashMap::default(),
            retry,
        }
    }

    /// Starts sending requests to `server`.
    pub fn attach(&mut self, outbox: Outbox, server: ConnectionId) {
        self.link = Some(Link { outbox, server });
    }

    /// Stops sending and forgets outstanding requests and unclaimed chunks.
    pub fn detach(&mut self) {
        self.link = None;
        self.requested.clear();
        self.received.clear();
    }

    /// Whether a server connection is attached.
    pub fn is_attached(&self) -> bool {
        self.link.is_some()
    }

    /// Sends a request for `position` unless one is already in flight.
    ///
    /// Returns `true` if a request was sent.
    pub fn request(&mut self, position: ChunkPosition) -> bool {
        if self.link.is_none() {
            return false;
        }
        let now = Instant::now();
        self.prune(now);
        if let Some(sent) = self.requested.get(&position)
            && now.duration_since(*sent) < self.retry
        {
            return false;
        }
        let Some(link) = &self.link else {
            return false;
        };
        link.outbox.send_to(
            link.server,
            Channel::Tiles,
            ChunkRequest::new(position).encode(),
        );
        self.requested.insert(position, now);
        tracing::trace!("Requested chunk {position}");
        true
    }

    /// Accepts a chunk from the server. Chunks that were never requested are
    /// refused and `false` is returned.
    pub fn receive(&mut self, chunk: Chunk) -> bool {
        if self.requested.remove(&chunk.position()).is_none() {
            return false;
        }
        self.received.insert(chunk.position(), chunk);
        true
    }

    /// Whether a request for `position` is waiting for an answer.
    pub fn is_requested(&self, position: ChunkPosition) -> bool {
        self.requested.contains_key(&position)
    }

    /// Requests still waiting for an answer.
    pub fn outstanding(&self) -> usize {
        self.requested.len()
    }

    /// Forgets requests older than [`STALE_RETRIES`] retry intervals.
    fn prune(&mut self, now: Instant) {
        let stale_after = self.retry * STALE_RETRIES;
        if stale_after.is_zero() {
            return;
        }
        let before = self.requested.len();
        self.requested.retain(|_, sent| now.duration_since(*sent) < stale_after);
        let pruned = before - self.requested.len();
        if pruned > 0 {
            tracing::debug!("Forgot {pruned} unanswered chunk requests");
        }
    }
}

impl ChunkSupplier for RemoteChunkSupplier {
    fn supply(&mut self, position: ChunkPosition) -> Option<Chunk> {
        if let Some(chunk) = self.received.remove(&position) {
            return Some(chunk);
        }
        self.request(position);
        None
    }
}
