// Push channel over per-connection outbound queues.

use crate::domain::ports::PushChannel;
use crate::domain::{ConnectionId, GameId, Notification, UserId};
use crate::interface_adapters::protocol::ServerMessage;
use axum::extract::ws::{Message, Utf8Bytes};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error};

struct Connection {
    game: GameId,
    user: UserId,
    tx: mpsc::Sender<Message>,
}

/// Routes serialized push messages to the sockets of connected users.
///
/// One hub serves every running game; each connection is tagged with the game
/// it was opened for and user sends never cross games.
///
/// Each connection owns a bounded queue drained by its writer task; sends never
/// wait, a full or closed queue is reported as an error.
#[derive(Default)]
pub struct ConnectionHub {
    connections: RwLock<HashMap<ConnectionId, Connection>>,
}

impl ConnectionHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<ConnectionId, Connection>> {
        self.connections.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<ConnectionId, Connection>> {
        self.connections.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(
        &self,
        id: ConnectionId,
        game: GameId,
        user: UserId,
        tx: mpsc::Sender<Message>,
    ) {
        self.write().insert(id, Connection { game, user, tx });
    }

    pub fn unregister(&self, id: ConnectionId) -> bool {
        self.write().remove(&id).is_some()
    }

    pub fn connection_count(&self) -> usize {
        self.read().len()
    }

    pub fn connections_of(&self, game: &GameId, user: &UserId) -> Vec<ConnectionId> {
        let mut ids: Vec<ConnectionId> = self
            .read()
            .iter()
            .filter(|(_, conn)| &conn.game == game && &conn.user == user)
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Serializes a message once so every recipient shares the same bytes.
    pub fn encode(message: &ServerMessage) -> Result<Utf8Bytes, String> {
        serde_json::to_string(message)
            .map(Utf8Bytes::from)
            .map_err(|e| {
                error!(error = ?e, "failed to serialize push message");
                format!("serialization failed: {e}")
            })
    }

    fn enqueue(id: ConnectionId, conn: &Connection, bytes: &Utf8Bytes) -> Result<(), String> {
        match conn.tx.try_send(Message::Text(bytes.clone())) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                debug!(conn_id = id, "outbound queue full; dropping message");
                Err(format!("connection {id} queue full"))
            }
            Err(TrySendError::Closed(_)) => Err(format!("connection {id} closed")),
        }
    }

    // Tries every target; the first failure is reported after all were attempted.
    fn fan_out<'a, I>(targets: I, bytes: &Utf8Bytes) -> Result<(), String>
    where
        I: IntoIterator<Item = (&'a ConnectionId, &'a Connection)>,
    {
        let mut first_error = None;
        for (id, conn) in targets {
            if let Err(e) = Self::enqueue(*id, conn, bytes) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Sends a message straight to one connection, bypassing notification routing.
    pub fn send_raw(&self, id: ConnectionId, message: &ServerMessage) -> Result<(), String> {
        let bytes = Self::encode(message)?;
        let connections = self.read();
        let conn = connections
            .get(&id)
            .ok_or_else(|| format!("connection {id} not registered"))?;
        Self::enqueue(id, conn, &bytes)
    }
}

impl PushChannel for ConnectionHub {
    fn send_to_user(
        &self,
        game: &GameId,
        user: &UserId,
        message: &Notification,
    ) -> Result<(), String> {
        let bytes = Self::encode(&ServerMessage::from(message))?;
        let connections = self.read();
        Self::fan_out(
            connections
                .iter()
                .filter(|(_, conn)| &conn.game == game && &conn.user == user),
            &bytes,
        )
    }

    fn send_to_connection(
        &self,
        connection: ConnectionId,
        message: &Notification,
    ) -> Result<(), String> {
        self.send_raw(connection, &ServerMessage::from(message))
    }

    fn broadcast(&self, game: &GameId, message: &Notification) -> Result<(), String> {
        let bytes = Self::encode(&ServerMessage::from(message))?;
        let connections = self.read();
        Self::fan_out(connections.iter().filter(|(_, conn)| &conn.game == game), &bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PointId;

    fn user(n: u8) -> UserId {
        UserId::parse(&format!("{n:024x}")).expect("valid id")
    }

    fn game(n: u8) -> GameId {
        GameId::parse(&format!("{:024x}", 0xa00 + u32::from(n))).expect("valid id")
    }

    fn removed() -> Notification {
        Notification::PointRemoved {
            game: game(1),
            point: PointId::parse("00000000000000000000000b").expect("valid id"),
        }
    }

    #[tokio::test]
    async fn when_sending_to_user_then_every_connection_of_that_user_receives_it() {
        let hub = ConnectionHub::new();
        let (tx1, mut rx1) = mpsc::channel(4);
        let (tx2, mut rx2) = mpsc::channel(4);
        let (tx3, mut rx3) = mpsc::channel(4);
        hub.register(1, game(1), user(1), tx1);
        hub.register(2, game(1), user(1), tx2);
        hub.register(3, game(1), user(2), tx3);

        hub.send_to_user(&game(1), &user(1), &removed()).expect("send");

        let first = rx1.recv().await.expect("message");
        let second = rx2.recv().await.expect("message");
        assert_eq!(first, second);
        let Message::Text(text) = first else {
            panic!("expected a text frame");
        };
        assert!(text.as_str().contains("\"type\":\"PointRemoved\""));
        assert!(rx3.try_recv().is_err());
        assert_eq!(hub.connections_of(&game(1), &user(1)), vec![1, 2]);
    }

    #[tokio::test]
    async fn when_user_follows_two_games_then_each_game_reaches_only_its_own_socket() {
        let hub = ConnectionHub::new();
        let (first_tx, mut first_rx) = mpsc::channel(4);
        let (second_tx, mut second_rx) = mpsc::channel(4);
        hub.register(1, game(1), user(1), first_tx);
        hub.register(2, game(2), user(1), second_tx);

        hub.send_to_user(&game(1), &user(1), &removed()).expect("send");
        hub.broadcast(&game(1), &removed()).expect("broadcast");

        assert!(first_rx.recv().await.is_some());
        assert!(first_rx.recv().await.is_some());
        assert!(second_rx.try_recv().is_err());
        assert_eq!(hub.connections_of(&game(2), &user(1)), vec![2]);
    }

    #[tokio::test]
    async fn when_queue_is_full_then_send_fails_without_blocking_others() {
        let hub = ConnectionHub::new();
        let (full_tx, _full_rx) = mpsc::channel(1);
        let (ok_tx, mut ok_rx) = mpsc::channel(4);
        hub.register(1, game(1), user(1), full_tx);
        hub.register(2, game(1), user(2), ok_tx);
        hub.send_to_connection(1, &removed()).expect("first fits");

        let result = hub.broadcast(&game(1), &removed());

        assert!(result.is_err());
        assert!(ok_rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn when_connection_is_unregistered_then_direct_sends_fail() {
        let hub = ConnectionHub::new();
        let (tx, _rx) = mpsc::channel(1);
        hub.register(7, game(1), user(1), tx);

        assert!(hub.unregister(7));
        assert!(!hub.unregister(7));
        assert!(hub.send_to_connection(7, &removed()).is_err());
        assert_eq!(hub.connection_count(), 0);
    }

    #[tokio::test]
    async fn when_user_has_no_connections_then_send_is_a_no_op() {
        let hub = ConnectionHub::new();
        assert!(hub.send_to_user(&game(1), &user(3), &removed()).is_ok());
    }
}
