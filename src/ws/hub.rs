//! Connection hub - routes outbound messages to live WebSocket sessions

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::protocol::{PlayerId, ServerMsg};

/// Outbound queue depth per connection (about a second of snapshots)
pub const OUTBOUND_BUFFER: usize = 256;

/// Who should receive a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipient {
    /// Every connected client
    Everyone,
    /// A fixed group, e.g. the two players of a match
    Players(Vec<PlayerId>),
    Player(PlayerId),
}

/// A message addressed to its recipients
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub to: Recipient,
    pub msg: ServerMsg,
}

impl Envelope {
    pub fn new(to: Recipient, msg: ServerMsg) -> Self {
        Self { to, msg }
    }

    pub fn everyone(msg: ServerMsg) -> Self {
        Self::new(Recipient::Everyone, msg)
    }

    pub fn player(player_id: PlayerId, msg: ServerMsg) -> Self {
        Self::new(Recipient::Player(player_id), msg)
    }

    pub fn players(player_ids: impl Into<Vec<PlayerId>>, msg: ServerMsg) -> Self {
        Self::new(Recipient::Players(player_ids.into()), msg)
    }
}

/// Registry of connected clients
pub struct ConnectionHub {
    connections: DashMap<PlayerId, mpsc::Sender<ServerMsg>>,
}

impl ConnectionHub {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    /// Register a connection and return the receiving end of its outbound queue
    pub fn register(&self, player_id: PlayerId) -> mpsc::Receiver<ServerMsg> {
        let (tx, rx) = mpsc::channel(OUTBOUND_BUFFER);
        self.connections.insert(player_id, tx);
        rx
    }

    pub fn unregister(&self, player_id: PlayerId) {
        self.connections.remove(&player_id);
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Queue a message for delivery. Never blocks: a full queue drops the frame.
    pub fn deliver(&self, envelope: Envelope) {
        match envelope.to {
            Recipient::Everyone => {
                for entry in self.connections.iter() {
                    Self::push(*entry.key(), entry.value(), envelope.msg.clone());
                }
            }
            Recipient::Players(ids) => {
                for id in ids {
                    self.send_to(id, envelope.msg.clone());
                }
            }
            Recipient::Player(id) => self.send_to(id, envelope.msg),
        }
    }

    pub fn deliver_all(&self, envelopes: impl IntoIterator<Item = Envelope>) {
        for envelope in envelopes {
            self.deliver(envelope);
        }
    }

    fn send_to(&self, player_id: PlayerId, msg: ServerMsg) {
        match self.connections.get(&player_id) {
            Some(tx) => Self::push(player_id, tx.value(), msg),
            None => debug!(player_id = %player_id, "Dropping message for unknown connection"),
        }
    }

    fn push(player_id: PlayerId, tx: &mpsc::Sender<ServerMsg>, msg: ServerMsg) {
        match tx.try_send(msg) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(player_id = %player_id, "Client lagged, dropping outbound message");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(player_id = %player_id, "Outbound channel closed");
            }
        }
    }
}

impl Default for ConnectionHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn routes_by_recipient() {
        let hub = ConnectionHub::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut rx_a = hub.register(a);
        let mut rx_b = hub.register(b);

        hub.deliver(Envelope::player(a, ServerMsg::PointScored));
        hub.deliver(Envelope::everyone(ServerMsg::ReadyRoomAborted));

        assert_eq!(rx_a.recv().await, Some(ServerMsg::PointScored));
        assert_eq!(rx_a.recv().await, Some(ServerMsg::ReadyRoomAborted));
        assert_eq!(rx_b.recv().await, Some(ServerMsg::ReadyRoomAborted));
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn full_queue_drops_instead_of_blocking() {
        let hub = ConnectionHub::new();
        let a = Uuid::new_v4();
        let mut rx = hub.register(a);

        for _ in 0..OUTBOUND_BUFFER + 10 {
            hub.deliver(Envelope::player(a, ServerMsg::PointScored));
        }

        let mut received = 0;
        while rx.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, OUTBOUND_BUFFER);
    }

    #[test]
    fn unknown_recipients_are_ignored() {
        let hub = ConnectionHub::new();
        hub.deliver(Envelope::players(vec![Uuid::new_v4()], ServerMsg::PointScored));
        assert_eq!(hub.connection_count(), 0);
    }
}
