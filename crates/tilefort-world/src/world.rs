//! The chunk-owning world: on-demand chunk resolution and the deferred
//! build-order queue.
//!
//! [`World`] is the single owner of every loaded [`Chunk`]. Missing chunks
//! are resolved through an injected [`ChunkSupplier`]; an absent result means
//! "not yet available" and is never cached, so the next lookup asks again.
//!
//! Build orders are queued with [`World::enqueue_build_order`] and applied by
//! [`World::update`] once per tick. An order whose chunk cannot be resolved is
//! re-queued for the next tick instead of being dropped, until it has waited
//! longer than [`WorldSettings::max_pending_ticks`].
//!
//! Both applied orders and direct edits on loaded chunks surface as
//! [`MutationEvent`]s, drained by the owner with [`World::drain_mutations`].

use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, Sender};

use rustc_hash::{FxHashMap, FxHashSet};

use crate::chunk::{Chunk, SubscriptionId, TileChange};
use crate::coords::ChunkPosition;
use crate::tile::BuildOrder;

// ---------------------------------------------------------------------------
// Supplier
// ---------------------------------------------------------------------------

/// Produces chunks for positions the world has not loaded yet.
///
/// Returning `None` means the chunk is not available *yet* (still being
/// fetched or generated). The world will ask again on a later lookup.
pub trait ChunkSupplier {
    /// Supply the chunk at `position`, if available.
    fn supply(&mut self, position: ChunkPosition) -> Option<Chunk>;
}

/// Blanket implementation for closures.
impl<F> ChunkSupplier for F
where
    F: FnMut(ChunkPosition) -> Option<Chunk>,
{
    fn supply(&mut self, position: ChunkPosition) -> Option<Chunk> {
        self(position)
    }
}

// ---------------------------------------------------------------------------
// Events and reports
// ---------------------------------------------------------------------------

/// Where a mutation came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MutationSource {
    /// Applied from the build-order queue by [`World::update`].
    Queued,
    /// A direct `try_set*` call on a loaded chunk.
    Direct,
}

/// A tile mutation that has been applied to a loaded chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MutationEvent {
    /// The chunk that was modified.
    pub chunk: ChunkPosition,
    /// The mutation, with an absolute tile position.
    pub order: BuildOrder,
    /// How the mutation reached the chunk.
    pub source: MutationSource,
}

/// Outcome of a single [`World::update`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UpdateReport {
    /// Orders applied this tick.
    pub applied: usize,
    /// Orders re-queued because their chunk is not available yet.
    pub deferred: usize,
    /// Orders given up on after waiting longer than `max_pending_ticks`.
    pub dropped: Vec<BuildOrder>,
}

/// Tunables for [`World`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorldSettings {
    /// How many ticks an order may be deferred before it is dropped.
    pub max_pending_ticks: u32,
}

impl Default for WorldSettings {
    fn default() -> Self {
        Self {
            max_pending_ticks: 400,
        }
    }
}

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct LoadedChunk {
    chunk: Chunk,
    subscription: SubscriptionId,
}

#[derive(Clone, Copy, Debug)]
struct PendingOrder {
    order: BuildOrder,
    deferred_ticks: u32,
}

/// Sparse map of loaded chunks plus the pending build-order queue.
pub struct World<S> {
    chunks: FxHashMap<ChunkPosition, LoadedChunk>,
    pending: VecDeque<PendingOrder>,
    supplier: S,
    settings: WorldSettings,
    changes_tx: Sender<TileChange>,
    changes_rx: Receiver<TileChange>,
    mutations: Vec<MutationEvent>,
}

impl<S: ChunkSupplier> World<S> {
    /// Creates an empty world resolving missing chunks through `supplier`.
    pub fn new(supplier: S) -> Self {
        Self::with_settings(supplier, WorldSettings::default())
    }

    /// Creates an empty world with explicit settings.
    pub fn with_settings(supplier: S, settings: WorldSettings) -> Self {
        let (changes_tx, changes_rx) = mpsc::channel();
        Self {
            chunks: FxHashMap::default(),
            pending: VecDeque::new(),
            supplier,
            settings,
            changes_tx,
            changes_rx,
            mutations: Vec::new(),
        }
    }

    /// Logs the world coming online.
    pub fn load(&mut self) {
        tracing::info!("World loaded");
    }

    /// Drops every loaded chunk and pending order.
    pub fn unload(&mut self) {
        let chunks = self.chunks.len();
        let pending = self.pending.len();
        for (_, mut entry) in self.chunks.drain() {
            entry.chunk.unsubscribe(entry.subscription);
        }
        self.pending.clear();
        self.mutations.clear();
        while self.changes_rx.try_recv().is_ok() {}
        tracing::info!(chunks, pending, "World unloaded");
    }

    /// Returns the chunk at `position`, asking the supplier on a miss.
    ///
    /// A supplied chunk is inserted and subscribed to; an absent result
    /// inserts nothing.
    pub fn try_get_chunk(&mut self, position: ChunkPosition) -> Option<&mut Chunk> {
        if !self.chunks.contains_key(&position) {
            let chunk = self.supplier.supply(position)?;
            if chunk.position() != position {
                tracing::warn!(
                    requested = %position,
                    supplied = %chunk.position(),
                    "Supplier returned a chunk for the wrong position, discarding"
                );
                return None;
            }
            self.insert(chunk);
        }
        self.chunks.get_mut(&position).map(|entry| &mut entry.chunk)
    }

    /// Returns a loaded chunk without consulting the supplier.
    pub fn get_chunk(&self, position: ChunkPosition) -> Option<&Chunk> {
        self.chunks.get(&position).map(|entry| &entry.chunk)
    }

    /// Whether a chunk is loaded at `position`.
    pub fn is_loaded(&self, position: ChunkPosition) -> bool {
        self.chunks.contains_key(&position)
    }

    /// Number of loaded chunks.
    pub fn loaded_count(&self) -> usize {
        self.chunks.len()
    }

    /// Iterates over loaded chunk positions.
    pub fn loaded_positions(&self) -> impl Iterator<Item = &ChunkPosition> {
        self.chunks.keys()
    }

    /// Removes a chunk and deregisters the world's subscription to it.
    pub fn unload_chunk(&mut self, position: ChunkPosition) -> Option<Chunk> {
        let mut entry = self.chunks.remove(&position)?;
        entry.chunk.unsubscribe(entry.subscription);
        Some(entry.chunk)
    }

    /// Appends a build order to the pending queue.
    pub fn enqueue_build_order(&mut self, order: BuildOrder) {
        self.pending.push_back(PendingOrder {
            order,
            deferred_ticks: 0,
        });
    }

    /// Number of orders waiting for [`update`](Self::update).
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Drains the pending queue once, applying every order whose chunk
    /// resolves and re-queueing the rest.
    ///
    /// The supplier is consulted at most once per missing chunk per call.
    pub fn update(&mut self) -> UpdateReport {
        self.collect_direct_changes();

        let mut report = UpdateReport::default();
        let mut unresolved = FxHashSet::default();
        let mut requeue = VecDeque::new();

        for mut entry in std::mem::take(&mut self.pending) {
            let chunk_pos = entry.order.position.chunk();
            let chunk = if unresolved.contains(&chunk_pos) {
                None
            } else {
                self.try_get_chunk(chunk_pos)
            };

            match chunk {
                Some(chunk) => {
                    chunk.set_silent(entry.order.position.local_index(), entry.order.tile);
                    self.mutations.push(MutationEvent {
                        chunk: chunk_pos,
                        order: entry.order,
                        source: MutationSource::Queued,
                    });
                    report.applied += 1;
                }
                None => {
                    unresolved.insert(chunk_pos);
                    entry.deferred_ticks += 1;
                    if entry.deferred_ticks > self.settings.max_pending_ticks {
                        tracing::warn!(
                            position = %entry.order.position,
                            chunk = %chunk_pos,
                            ticks = entry.deferred_ticks,
                            "Dropping build order, chunk never became available"
                        );
                        report.dropped.push(entry.order);
                    } else {
                        requeue.push_back(entry);
                    }
                }
            }
        }

        report.deferred = requeue.len();
        self.pending = requeue;

        if report.applied > 0 || report.deferred > 0 {
            tracing::trace!(
                applied = report.applied,
                deferred = report.deferred,
                "Build orders processed"
            );
        }
        report
    }

    /// Removes and returns all mutation events recorded so far, oldest first.
    pub fn drain_mutations(&mut self) -> std::vec::Drain<'_, MutationEvent> {
        self.collect_direct_changes();
        self.mutations.drain(..)
    }

    /// The injected chunk supplier.
    pub fn supplier(&self) -> &S {
        &self.supplier
    }

    /// Mutable access to the supplier, e.g. to hand it received chunks.
    pub fn supplier_mut(&mut self) -> &mut S {
        &mut self.supplier
    }

    /// The world's settings.
    pub fn settings(&self) -> &WorldSettings {
        &self.settings
    }

    fn insert(&mut self, mut chunk: Chunk) {
        let position = chunk.position();
        let subscription = chunk.subscribe(self.changes_tx.clone());
        tracing::debug!(chunk = %position, "Chunk loaded");
        self.chunks.insert(
            position,
            LoadedChunk {
                chunk,
                subscription,
            },
        );
    }

    fn collect_direct_changes(&mut self) {
        while let Ok(change) = self.changes_rx.try_recv() {
            self.mutations.push(MutationEvent {
                chunk: change.chunk,
                order: BuildOrder::new(change.position(), change.tile),
                source: MutationSource::Direct,
            });
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
