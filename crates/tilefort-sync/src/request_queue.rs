//! Server-side queue of chunk requests, serviced a bounded number per tick.

use std::collections::VecDeque;

use tilefort_net::ConnectionId;

use crate::message::ChunkRequest;

/// FIFO of pending chunk requests.
#[derive(Debug)]
pub struct ChunkRequestQueue {
    queue: VecDeque<ChunkRequest>,
    per_tick: usize,
}

impl ChunkRequestQueue {
    /// A queue releasing at most `per_tick` requests per [`take_tick`](Self::take_tick).
    pub fn new(per_tick: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            per_tick,
        }
    }

    /// Queues a request behind all earlier ones.
    pub fn push(&mut self, request: ChunkRequest) {
        self.queue.push_back(request);
    }

    /// Removes and returns this tick's share of requests, oldest first.
    pub fn take_tick(&mut self) -> Vec<ChunkRequest> {
        let n = self.per_tick.min(self.queue.len());
        self.queue.drain(..n).collect()
    }

    /// Drops every request from `sender`. Returns how many were removed.
    pub fn remove_sender(&mut self, sender: ConnectionId) -> usize {
        let before = self.queue.len();
        self.queue.retain(|r| r.sender != Some(sender));
        before - self.queue.len()
    }

    /// Requests still queued.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether no request is queued.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Maximum requests returned by one [`take_tick`](Self::take_tick).
    pub fn per_tick(&self) -> usize {
        self.per_tick
    }
}
