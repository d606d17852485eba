use crate::connection::{ConnectionEvent, ConnectionTx};
use crate::connection_tx_storage::ConnectionTxStorage;
use system::{
    ConnectionId, ServerLeaderDocument, SessionCommand, SessionEvent, SessionId, UserIndex,
};
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tokio::task::JoinHandle;

pub type SessionTx = UnboundedSender<SessionMessage>;

#[derive(Debug)]
pub enum SessionMessage {
    Join {
        connection_id: ConnectionId,
        tx: ConnectionTx,
    },
    Leave {
        connection_id: ConnectionId,
    },
    Command {
        from: ConnectionId,
        command: SessionCommand,
    },
    ParticipantJoined {
        user_index: UserIndex,
        name: String,
    },
    Shutdown,
}

/// In-memory state of one live session. Owned by exactly one task, so every
/// message is applied to completion before the next one is looked at.
pub struct Session {
    session_id: SessionId,
    participants: Vec<String>,
    document: ServerLeaderDocument,
    connections: ConnectionTxStorage,
}

impl Session {
    pub fn new(session_id: SessionId, participants: Vec<String>) -> Self {
        Self {
            session_id,
            participants,
            document: ServerLeaderDocument::new(),
            connections: ConnectionTxStorage::new(),
        }
    }

    pub fn document(&self) -> &ServerLeaderDocument {
        &self.document
    }

    pub fn participants(&self) -> &[String] {
        &self.participants
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Returns `false` once the session must stop.
    pub fn handle_message(&mut self, message: SessionMessage) -> bool {
        match message {
            SessionMessage::Join { connection_id, tx } => {
                self.connections.insert(connection_id, tx);
                if !self.document.is_empty() {
                    let sync = SessionEvent::Sync(self.document.snapshot());
                    if let Some(text) = self.serialize(&sync) {
                        self.connections
                            .send(&connection_id, ConnectionEvent::Text(text));
                    }
                }
            }
            SessionMessage::Leave { connection_id } => {
                self.connections.remove(&connection_id);
            }
            SessionMessage::Command { from, command } => self.handle_command(from, command),
            SessionMessage::ParticipantJoined { user_index, name } => {
                if user_index < self.participants.len() {
                    // Loaded after the join was stored.
                    log::debug!(
                        "user {} already known in session {}",
                        user_index,
                        self.session_id
                    );
                } else {
                    log::info!(
                        "{} joined session {} as user {}",
                        name,
                        self.session_id,
                        user_index
                    );
                    self.participants.push(name);
                }
            }
            SessionMessage::Shutdown => return false,
        }
        true
    }

    fn handle_command(&mut self, from: ConnectionId, command: SessionCommand) {
        let events = match command {
            SessionCommand::Draw {
                user_index,
                payload,
            } => {
                self.check_user(from, user_index);
                self.document.draw(user_index, payload)
            }
            SessionCommand::Undo { user_index } => {
                self.check_user(from, user_index);
                self.document.undo(user_index)
            }
            SessionCommand::Redo { user_index } => {
                self.check_user(from, user_index);
                self.document.redo(user_index)
            }
            SessionCommand::Passthrough { action, raw } => {
                log::debug!(
                    "relaying {:?} from connection {} in session {}",
                    action,
                    from,
                    self.session_id
                );
                self.connections.broadcast(&raw);
                return;
            }
        };
        for event in events {
            if let Some(text) = self.serialize(&event) {
                self.connections.broadcast(&text);
            }
        }
    }

    // userIndex is taken on trust from the client; it is not bound to the
    // connection that sent it.
    fn check_user(&self, from: ConnectionId, user_index: UserIndex) {
        if user_index >= self.participants.len() {
            log::debug!(
                "connection {} acts as unknown user {} in session {}",
                from,
                user_index,
                self.session_id
            );
        }
    }

    fn serialize(&self, event: &SessionEvent) -> Option<String> {
        match event.to_text() {
            Ok(text) => Some(text),
            Err(err) => {
                log::error!("cannot serialize event in session {}: {}", self.session_id, err);
                None
            }
        }
    }
}

pub fn spawn_session(mut session: Session) -> (SessionTx, JoinHandle<()>) {
    let (tx, mut rx) = unbounded_channel::<SessionMessage>();
    let handle = tokio::spawn(async move {
        log::info!("session {} - started", session.session_id);
        while let Some(message) = rx.recv().await {
            if !session.handle_message(message) {
                break;
            }
        }
        log::info!("session {} - terminated", session.session_id);
    });
    (tx, handle)
}
