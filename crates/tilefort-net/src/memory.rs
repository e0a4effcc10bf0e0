//! In-process loopback transport pair.
//!
//! Two [`MemoryTransport`]s created by [`MemoryTransport::pair`] exchange
//! messages without sockets. Sends are delivered straight into the other
//! side's inbox, so ordering is exactly the order of the calls.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::transport::{
    ConnectionId, ConnectionStatus, Inbox, Incoming, Outbox, Outgoing, OutgoingSink, Transport,
    TransportError,
};

#[derive(Default)]
struct PairState {
    inboxes: [Option<Inbox>; 2],
    connected: bool,
}

fn lock(state: &Mutex<PairState>) -> MutexGuard<'_, PairState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Connection id under which the other side sees `side`.
fn id_of(side: usize) -> ConnectionId {
    ConnectionId(side as u64 + 1)
}

/// Synthetic loopback address of `side`, used for unconnected data.
fn addr_of(side: usize) -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, side as u16 + 1))
}

fn set_status(state: &mut PairState, status: ConnectionStatus, reason: &str) {
    state.connected = status == ConnectionStatus::Connected;
    for side in 0..2 {
        if let Some(inbox) = &state.inboxes[side] {
            inbox.push(Incoming::Status {
                connection: id_of(1 - side),
                status,
                reason: reason.to_string(),
            });
        }
    }
}

/// One end of an in-memory connection.
pub struct MemoryTransport {
    side: usize,
    state: Arc<Mutex<PairState>>,
}

impl MemoryTransport {
    /// Creates two connected ends. Each reports `Connected` once both started.
    pub fn pair() -> (Self, Self) {
        let state = Arc::new(Mutex::new(PairState::default()));
        (
            Self {
                side: 0,
                state: Arc::clone(&state),
            },
            Self { side: 1, state },
        )
    }

    /// The id this end uses for the other end.
    pub fn remote_id(&self) -> ConnectionId {
        id_of(1 - self.side)
    }
}

impl Transport for MemoryTransport {
    fn start(&mut self, inbox: Inbox) -> Result<Outbox, TransportError> {
        let mut state = lock(&self.state);
        if state.inboxes[self.side].is_some() {
            return Err(TransportError::AlreadyStarted);
        }
        state.inboxes[self.side] = Some(inbox);
        if state.inboxes.iter().all(Option::is_some) {
            set_status(&mut state, ConnectionStatus::Connected, "memory");
        }
        drop(state);

        Ok(Outbox::from_sink(Arc::new(MemoryLink {
            side: self.side,
            state: Arc::clone(&self.state),
        })))
    }

    fn shutdown(&mut self, reason: &str, _timeout: Duration) -> bool {
        let mut state = lock(&self.state);
        if state.connected {
            set_status(&mut state, ConnectionStatus::Disconnected, reason);
        }
        state.inboxes[self.side] = None;
        true
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        lock(&self.state).inboxes[self.side]
            .is_some()
            .then(|| addr_of(self.side))
    }
}

struct MemoryLink {
    side: usize,
    state: Arc<Mutex<PairState>>,
}

impl OutgoingSink for MemoryLink {
    fn submit(&self, request: Outgoing) -> bool {
        let mut state = lock(&self.state);
        if state.inboxes[self.side].is_none() {
            return false;
        }
        let other = 1 - self.side;

        match request {
            Outgoing::Send {
                target,
                channel,
                payload,
            } => {
                if state.connected
                    && target.includes(id_of(other))
                    && let Some(inbox) = &state.inboxes[other]
                {
                    inbox.push(Incoming::Data {
                        from: id_of(self.side),
                        channel,
                        payload: payload.to_vec(),
                    });
                }
            }
            Outgoing::SendUnconnected { to, payload } => {
                if to == addr_of(other)
                    && let Some(inbox) = &state.inboxes[other]
                {
                    inbox.push(Incoming::Unconnected {
                        from: addr_of(self.side),
                        payload,
                    });
                }
            }
            Outgoing::Disconnect { connection, reason } => {
                if state.connected && connection == id_of(other) {
                    set_status(&mut state, ConnectionStatus::Disconnected, &reason);
                }
            }
        }
        true
    }

    fn is_closed(&self) -> bool {
        lock(&self.state).inboxes[self.side].is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Channel;
    use tokio::sync::mpsc;

    fn start(transport: &mut MemoryTransport) -> (Outbox, mpsc::UnboundedReceiver<Incoming>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (transport.start(Inbox::new(tx)).unwrap(), rx)
    }

    fn expect_status(rx: &mut mpsc::UnboundedReceiver<Incoming>, expected: ConnectionStatus) {
        match rx.try_recv().unwrap() {
            Incoming::Status { status, .. } => assert_eq!(status, expected),
            other => panic!("expected status, got {other:?}"),
        }
    }

    #[test]
    fn test_connected_after_both_start() {
        let (mut a, mut b) = MemoryTransport::pair();
        let (_a_out, mut a_rx) = start(&mut a);
        assert!(a_rx.try_recv().is_err());

        let (_b_out, mut b_rx) = start(&mut b);
        expect_status(&mut a_rx, ConnectionStatus::Connected);
        expect_status(&mut b_rx, ConnectionStatus::Connected);
    }

    #[test]
    fn test_send_arrives_in_order_with_sender_id() {
        let (mut a, mut b) = MemoryTransport::pair();
        let (a_out, _a_rx) = start(&mut a);
        let (_b_out, mut b_rx) = start(&mut b);
        expect_status(&mut b_rx, ConnectionStatus::Connected);

        a_out.send_to(a.remote_id(), Channel::Tiles, vec![1]);
        a_out.broadcast(Channel::Default, vec![2]);
        a_out.broadcast_except(a.remote_id(), Channel::Default, vec![3]);

        assert_eq!(
            b_rx.try_recv().unwrap(),
            Incoming::Data {
                from: b.remote_id(),
                channel: Channel::Tiles,
                payload: vec![1],
            }
        );
        assert!(matches!(b_rx.try_recv().unwrap(), Incoming::Data { ref payload, .. } if payload == &[2u8]));
        assert!(b_rx.try_recv().is_err());
    }

    #[test]
    fn test_unconnected_data_uses_synthetic_addresses() {
        let (mut a, mut b) = MemoryTransport::pair();
        let (a_out, _a_rx) = start(&mut a);
        let (_b_out, mut b_rx) = start(&mut b);
        expect_status(&mut b_rx, ConnectionStatus::Connected);

        a_out.send_unconnected(b.local_addr().unwrap(), b"TF?".to_vec());
        assert_eq!(
            b_rx.try_recv().unwrap(),
            Incoming::Unconnected {
                from: a.local_addr().unwrap(),
                payload: b"TF?".to_vec(),
            }
        );
    }

    #[test]
    fn test_disconnect_notifies_both_sides() {
        let (mut a, mut b) = MemoryTransport::pair();
        let (a_out, mut a_rx) = start(&mut a);
        let (_b_out, mut b_rx) = start(&mut b);
        expect_status(&mut a_rx, ConnectionStatus::Connected);
        expect_status(&mut b_rx, ConnectionStatus::Connected);

        a_out.disconnect(a.remote_id(), "bye");
        expect_status(&mut a_rx, ConnectionStatus::Disconnected);
        expect_status(&mut b_rx, ConnectionStatus::Disconnected);

        a_out.broadcast(Channel::Default, vec![1]);
        assert!(b_rx.try_recv().is_err());
    }

    #[test]
    fn test_shutdown_closes_outbox() {
        let (mut a, mut b) = MemoryTransport::pair();
        let (a_out, mut a_rx) = start(&mut a);
        let (_b_out, mut b_rx) = start(&mut b);
        expect_status(&mut a_rx, ConnectionStatus::Connected);
        expect_status(&mut b_rx, ConnectionStatus::Connected);

        assert!(a.shutdown("closing", Duration::from_secs(1)));
        expect_status(&mut a_rx, ConnectionStatus::Disconnected);
        expect_status(&mut b_rx, ConnectionStatus::Disconnected);
        assert!(a_out.is_closed());
        assert!(a.local_addr().is_none());
    }

    #[test]
    fn test_start_twice_fails() {
        let (mut a, _b) = MemoryTransport::pair();
        let (_out, _rx) = start(&mut a);
        let (tx, _rx2) = mpsc::unbounded_channel();
        assert!(matches!(
            a.start(Inbox::new(tx)),
            Err(TransportError::AlreadyStarted)
        ));
    }
}
