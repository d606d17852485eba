use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use system::{ConnectionId, SessionId, UserIndex};

use crate::config::ServerConfig;
use crate::connection::{ConnectionEvent, ConnectionTx};
use crate::lifecycle::Lifecycle;
use crate::session::{spawn_session, Session, SessionMessage, SessionTx};
use crate::session_store::{SessionRecord, SessionStore, StoreError};

pub type ServerTx = UnboundedSender<ServerCommand>;

#[derive(Debug)]
pub enum ServerCommand {
    Connect {
        session_id: SessionId,
        connection_id: ConnectionId,
        tx: ConnectionTx,
    },
    Disconnect {
        session_id: SessionId,
        connection_id: ConnectionId,
    },
    /// `user_index` is the participant's position in the stored record.
    ParticipantJoined {
        session_id: SessionId,
        user_index: UserIndex,
        name: String,
    },
}

/// Results of work the registry hands off to other tasks.
enum Completion {
    GraceElapsed {
        session_id: SessionId,
        generation: u64,
    },
    Loaded {
        session_id: SessionId,
        result: Result<Option<SessionRecord>, StoreError>,
    },
    Deleted {
        session_id: SessionId,
    },
}

struct SessionEntry {
    tx: SessionTx,
    lifecycle: Lifecycle,
}

/// Connections waiting on a store call for their session.
#[derive(Default)]
struct Pending {
    waiting: Vec<(ConnectionId, ConnectionTx)>,
    joined: Vec<(UserIndex, String)>,
}

impl Pending {
    fn remove(&mut self, connection_id: ConnectionId) -> bool {
        let before = self.waiting.len();
        self.waiting.retain(|(id, _)| *id != connection_id);
        self.waiting.len() != before
    }
}

/// Owns every live session of the process. Bootstraps sessions from the store
/// on first connect, accounts connections, and tears sessions down once the
/// grace period after their last disconnect has passed.
///
/// Store calls run in their own tasks; a session with a load or delete in
/// flight queues its connects until the result comes back.
struct Server {
    sessions: HashMap<SessionId, SessionEntry>,
    loading: HashMap<SessionId, Pending>,
    deleting: HashMap<SessionId, Pending>,
    store: Arc<dyn SessionStore>,
    config: ServerConfig,
    completion_tx: UnboundedSender<Completion>,
}

impl Server {
    fn new(
        store: Arc<dyn SessionStore>,
        config: ServerConfig,
        completion_tx: UnboundedSender<Completion>,
    ) -> Self {
        Self {
            sessions: HashMap::new(),
            loading: HashMap::new(),
            deleting: HashMap::new(),
            store,
            config,
            completion_tx,
        }
    }

    fn handle_server_command(&mut self, command: ServerCommand) {
        match command {
            ServerCommand::Connect {
                session_id,
                connection_id,
                tx,
            } => self.connect(session_id, connection_id, tx),
            ServerCommand::Disconnect {
                session_id,
                connection_id,
            } => self.disconnect(&session_id, connection_id),
            ServerCommand::ParticipantJoined {
                session_id,
                user_index,
                name,
            } => {
                if let Some(entry) = self.sessions.get(&session_id) {
                    let _ = entry
                        .tx
                        .send(SessionMessage::ParticipantJoined { user_index, name });
                } else if let Some(pending) = self.loading.get_mut(&session_id) {
                    pending.joined.push((user_index, name));
                }
            }
        }
    }

    fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::GraceElapsed {
                session_id,
                generation,
            } => self.grace_elapsed(session_id, generation),
            Completion::Loaded { session_id, result } => self.loaded(session_id, result),
            Completion::Deleted { session_id } => self.deleted(session_id),
        }
    }

    fn connect(&mut self, session_id: SessionId, connection_id: ConnectionId, tx: ConnectionTx) {
        if let Some(entry) = self.sessions.get_mut(&session_id) {
            attach(&session_id, entry, connection_id, tx);
        } else if let Some(pending) = self.loading.get_mut(&session_id) {
            pending.waiting.push((connection_id, tx));
        } else if let Some(pending) = self.deleting.get_mut(&session_id) {
            log::debug!(
                "connection {} waits for deletion of session {}",
                connection_id,
                session_id
            );
            pending.waiting.push((connection_id, tx));
        } else {
            let pending = Pending {
                waiting: vec![(connection_id, tx)],
                joined: Vec::new(),
            };
            self.load(session_id, pending);
        }
    }

    fn load(&mut self, session_id: SessionId, pending: Pending) {
        self.loading.insert(session_id.clone(), pending);
        let store = self.store.clone();
        let completion_tx = self.completion_tx.clone();
        tokio::spawn(async move {
            let result = store.load(&session_id).await;
            let _ = completion_tx.send(Completion::Loaded { session_id, result });
        });
    }

    fn loaded(
        &mut self,
        session_id: SessionId,
        result: Result<Option<SessionRecord>, StoreError>,
    ) {
        let pending = match self.loading.remove(&session_id) {
            Some(pending) => pending,
            None => return,
        };
        if pending.waiting.is_empty() {
            log::debug!("nobody waits for session {} any more", session_id);
            return;
        }

        let record = match result {
            Ok(Some(record)) => record,
            Ok(None) => {
                log::info!("rejecting connection to unknown session {}", session_id);
                reject(pending, "session not found");
                return;
            }
            Err(err) => {
                log::error!("cannot load session {}: {}", session_id, err);
                reject(pending, "session unavailable");
                return;
            }
        };

        let (tx, _) = spawn_session(Session::new(session_id.clone(), record.users));
        for (user_index, name) in pending.joined {
            let _ = tx.send(SessionMessage::ParticipantJoined { user_index, name });
        }
        let mut entry = SessionEntry {
            tx,
            lifecycle: Lifecycle::new(),
        };
        for (connection_id, tx) in pending.waiting {
            attach(&session_id, &mut entry, connection_id, tx);
        }
        self.sessions.insert(session_id, entry);
    }

    fn disconnect(&mut self, session_id: &SessionId, connection_id: ConnectionId) {
        let entry = match self.sessions.get_mut(session_id) {
            Some(entry) => entry,
            None => {
                let queued = match self.loading.get_mut(session_id) {
                    Some(pending) => pending.remove(connection_id),
                    None => self
                        .deleting
                        .get_mut(session_id)
                        .map_or(false, |pending| pending.remove(connection_id)),
                };
                if queued {
                    log::info!(
                        "connection {} left session {} before it was ready",
                        connection_id,
                        session_id
                    );
                }
                return;
            }
        };
        let _ = entry.tx.send(SessionMessage::Leave { connection_id });
        let generation = match entry.lifecycle.disconnect(connection_id) {
            Some(generation) => generation,
            None => {
                log::info!(
                    "connection {} left session {} ({} connected)",
                    connection_id,
                    session_id,
                    entry.lifecycle.connection_count()
                );
                return;
            }
        };

        log::info!(
            "last connection left session {}, deleting in {:?}",
            session_id,
            self.config.grace_period
        );
        let completion_tx = self.completion_tx.clone();
        let grace_period = self.config.grace_period;
        let session_id = session_id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(grace_period).await;
            let _ = completion_tx.send(Completion::GraceElapsed {
                session_id,
                generation,
            });
        });
    }

    fn grace_elapsed(&mut self, session_id: SessionId, generation: u64) {
        let expired = self
            .sessions
            .get_mut(&session_id)
            .map_or(false, |entry| entry.lifecycle.expire(generation));
        if !expired {
            log::debug!("stale deletion timer for session {}", session_id);
            return;
        }

        if let Some(entry) = self.sessions.remove(&session_id) {
            let _ = entry.tx.send(SessionMessage::Shutdown);
        }
        log::info!("deleting session {}", session_id);
        self.deleting.insert(session_id.clone(), Pending::default());
        let store = self.store.clone();
        let completion_tx = self.completion_tx.clone();
        tokio::spawn(async move {
            if let Err(err) = store.delete(&session_id).await {
                log::warn!("cannot delete stored session {}: {}", session_id, err);
            }
            let _ = completion_tx.send(Completion::Deleted { session_id });
        });
    }

    // Connects that arrived mid-deletion load whatever the store kept.
    fn deleted(&mut self, session_id: SessionId) {
        match self.deleting.remove(&session_id) {
            Some(pending) if !pending.waiting.is_empty() => self.load(session_id, pending),
            _ => {}
        }
    }

    async fn run(
        mut self,
        mut srv_rx: UnboundedReceiver<ServerCommand>,
        mut completion_rx: UnboundedReceiver<Completion>,
    ) {
        loop {
            tokio::select! {
                command = srv_rx.recv() => match command {
                    Some(command) => self.handle_server_command(command),
                    None => break,
                },
                Some(completion) = completion_rx.recv() => self.handle_completion(completion),
            }
        }
        for (_, entry) in self.sessions.drain() {
            let _ = entry.tx.send(SessionMessage::Shutdown);
        }
    }
}

fn attach(
    session_id: &SessionId,
    entry: &mut SessionEntry,
    connection_id: ConnectionId,
    tx: ConnectionTx,
) {
    if entry.lifecycle.connect(connection_id) {
        log::info!("cancelled deletion of session {}", session_id);
    }
    log::info!(
        "connection {} joined session {} ({} connected)",
        connection_id,
        session_id,
        entry.lifecycle.connection_count()
    );
    // Connected goes out first, so the late-join sync always follows it
    let _ = tx.send(ConnectionEvent::Connected {
        session_tx: entry.tx.clone(),
    });
    if entry
        .tx
        .send(SessionMessage::Join { connection_id, tx })
        .is_err()
    {
        log::error!("session {} stopped unexpectedly", session_id);
    }
}

fn reject(pending: Pending, reason: &str) {
    for (_, tx) in pending.waiting {
        let _ = tx.send(ConnectionEvent::Rejected {
            reason: reason.to_owned(),
        });
    }
}

/// Spawns the session registry. It stops once every `ServerTx` is dropped.
pub fn spawn_server(
    store: Arc<dyn SessionStore>,
    config: ServerConfig,
) -> (ServerTx, JoinHandle<()>) {
    let (srv_tx, srv_rx) = unbounded_channel::<ServerCommand>();
    let (completion_tx, completion_rx) = unbounded_channel::<Completion>();

    let server = Server::new(store, config, completion_tx);
    let handle = tokio::spawn(server.run(srv_rx, completion_rx));

    (srv_tx, handle)
}
