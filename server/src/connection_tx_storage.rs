use crate::connection::{ConnectionEvent, ConnectionTx};
use std::collections::HashMap;
use system::ConnectionId;

/// Egress channels of the connections joined to one session.
pub struct ConnectionTxStorage {
    connection_txs: HashMap<ConnectionId, ConnectionTx>,
}

impl ConnectionTxStorage {
    pub fn new() -> Self {
        Self {
            connection_txs: HashMap::new(),
        }
    }

    pub fn insert(&mut self, connection_id: ConnectionId, tx: ConnectionTx) {
        self.connection_txs.insert(connection_id, tx);
    }

    pub fn remove(&mut self, connection_id: &ConnectionId) -> Option<ConnectionTx> {
        self.connection_txs.remove(connection_id)
    }

    pub fn len(&self) -> usize {
        self.connection_txs.len()
    }

    /// A connection whose channel is closed is dropped from the storage.
    pub fn send(&mut self, to: &ConnectionId, event: ConnectionEvent) -> bool {
        let delivered = match self.connection_txs.get(to) {
            Some(tx) => tx.send(event).is_ok(),
            None => {
                log::warn!("no egress channel for connection {}", to);
                return false;
            }
        };
        if !delivered {
            log::info!("connection {} is gone, dropping it", to);
            self.connection_txs.remove(to);
        }
        delivered
    }

    /// Sends `text` to every connection, dropping the ones that are gone.
    pub fn broadcast(&mut self, text: &str) {
        let mut gone = Vec::new();
        for (connection_id, tx) in self.connection_txs.iter() {
            if tx.send(ConnectionEvent::Text(text.to_owned())).is_err() {
                gone.push(*connection_id);
            }
        }
        for connection_id in gone {
            log::info!("connection {} is gone, dropping it", connection_id);
            self.connection_txs.remove(&connection_id);
        }
    }
}

impl Default for ConnectionTxStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::unbounded_channel;

    fn text(event: ConnectionEvent) -> String {
        match event {
            ConnectionEvent::Text(text) => text,
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn it_broadcasts_to_every_connection() {
        let mut storage = ConnectionTxStorage::new();
        let (tx1, mut rx1) = unbounded_channel();
        let (tx2, mut rx2) = unbounded_channel();
        storage.insert(1, tx1);
        storage.insert(2, tx2);

        storage.broadcast("hello");
        assert_eq!(text(rx1.try_recv().expect("")), "hello");
        assert_eq!(text(rx2.try_recv().expect("")), "hello");
    }

    #[test]
    fn it_drops_closed_connections() {
        let mut storage = ConnectionTxStorage::new();
        let (tx1, rx1) = unbounded_channel();
        let (tx2, mut rx2) = unbounded_channel();
        storage.insert(1, tx1);
        storage.insert(2, tx2);
        drop(rx1);

        storage.broadcast("hello");
        assert_eq!(storage.len(), 1);
        assert_eq!(text(rx2.try_recv().expect("")), "hello");
        assert!(!storage.send(&1, ConnectionEvent::Text("again".into())));
        assert!(storage.send(&2, ConnectionEvent::Text("again".into())));
    }
}
