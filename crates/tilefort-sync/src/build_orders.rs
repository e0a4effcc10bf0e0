//! Build-order messages and the server-side broadcast batcher.
//!
//! ```text
//! [kind][count: u8] then count × [x: i32][y: i32][tile: u16]
//! ```

use tilefort_net::{NetReader, message_writer};
use tilefort_world::{BuildOrder, Tile, TilePosition};

use crate::message::{DataMessageType, ProtocolError};

/// Most orders one message can carry.
pub const MAX_ORDERS_PER_MESSAGE: usize = u8::MAX as usize;

/// Encodes up to [`MAX_ORDERS_PER_MESSAGE`] orders into one message.
pub fn encode_build_orders(orders: &[BuildOrder]) -> Result<Vec<u8>, ProtocolError> {
    let count =
        u8::try_from(orders.len()).map_err(|_| ProtocolError::TooManyOrders(orders.len()))?;
    let mut w = message_writer(DataMessageType::BuildOrders);
    w.write_u8(count);
    for order in orders {
        w.write_point(order.position.x, order.position.y);
        w.write_u16(order.tile.id());
    }
    Ok(w.into_bytes())
}

/// Encodes any number of orders, split into as many messages as needed.
pub fn encode_build_order_batches(orders: &[BuildOrder]) -> Vec<Vec<u8>> {
    orders
        .chunks(MAX_ORDERS_PER_MESSAGE)
        .filter_map(|batch| encode_build_orders(batch).ok())
        .collect()
}

/// Decodes one build-order message body.
pub fn decode_build_orders(reader: &mut NetReader<'_>) -> Result<Vec<BuildOrder>, ProtocolError> {
    let count = reader.read_u8()?;
    let mut orders = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let (x, y) = reader.read_point()?;
        let tile = Tile::new(reader.read_u16()?);
        orders.push(BuildOrder::new(TilePosition::new(x, y), tile));
    }
    Ok(orders)
}

/// Collects applied orders and releases them every `interval` ticks.
#[derive(Debug)]
pub struct BuildOrderBatcher {
    pending: Vec<BuildOrder>,
    interval: u32,
    ticks: u32,
}

impl BuildOrderBatcher {
    /// A batcher flushing every `interval` ticks (at least one).
    pub fn new(interval: u32) -> Self {
        Self {
            pending: Vec::new(),
            interval: interval.max(1),
            ticks: 0,
        }
    }

    /// Adds an order to the next flush.
    pub fn push(&mut self, order: BuildOrder) {
        self.pending.push(order);
    }

    /// Orders waiting for the next flush.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Advances one tick. On a flush tick with orders pending, returns the
    /// encoded messages in application order.
    pub fn tick(&mut self) -> Option<Vec<Vec<u8>>> {
        self.ticks += 1;
        if self.ticks < self.interval {
            return None;
        }
        self.ticks = 0;
        if self.pending.is_empty() {
            return None;
        }
        let messages = encode_build_order_batches(&self.pending);
        tracing::trace!(
            "Flushing {} build orders in {} messages",
            self.pending.len(),
            messages.len()
        );
        self.pending.clear();
        Some(messages)
    }
}

impl Extend<BuildOrder> for BuildOrderBatcher {
    fn extend<I: IntoIterator<Item = BuildOrder>>(&mut self, iter: I) {
        self.pending.extend(iter);
    }
}
