use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tokio::time::{sleep, timeout};

use server::config::ServerConfig;
use server::connection::ConnectionEvent;
use server::server::{spawn_server, ServerCommand, ServerTx};
use server::session::{SessionMessage, SessionTx};
use server::session_store::{
    MemorySessionStore, SessionRecord, SessionStore, StoreError, UpdateFn,
};
use system::serde_json::{self, Value};
use system::{Background, ConnectionId, SessionCommand};

const GRACE: Duration = Duration::from_millis(100);
const SESSION: &str = "canvas";

struct FakeConnection {
    connection_id: ConnectionId,
    rx: UnboundedReceiver<ConnectionEvent>,
    session_tx: SessionTx,
}

impl FakeConnection {
    fn send(&self, text: &str) {
        let command = SessionCommand::parse(text).expect("");
        self.session_tx
            .send(SessionMessage::Command {
                from: self.connection_id,
                command,
            })
            .expect("session must be running");
    }

    async fn next(&mut self) -> Value {
        let event = timeout(Duration::from_secs(1), self.rx.recv())
            .await
            .expect("timed out")
            .expect("channel closed");
        match event {
            ConnectionEvent::Text(text) => serde_json::from_str(&text).expect(""),
            other => panic!("unexpected {:?}", other),
        }
    }

    async fn assert_silent(&mut self) {
        assert!(timeout(Duration::from_millis(50), self.rx.recv())
            .await
            .is_err());
    }
}

async fn setup() -> (Arc<MemorySessionStore>, ServerTx) {
    let store = Arc::new(MemorySessionStore::new());
    let record = SessionRecord {
        users: vec!["alice".into(), "bob".into()],
        image: Background::blank(2, 2),
    };
    store.insert(SESSION, record).await;
    let (srv_tx, _) = spawn_server(
        store.clone() as Arc<dyn SessionStore>,
        ServerConfig {
            grace_period: GRACE,
        },
    );
    (store, srv_tx)
}

async fn open(
    srv_tx: &ServerTx,
    session_id: &str,
    connection_id: ConnectionId,
) -> UnboundedReceiver<ConnectionEvent> {
    let (tx, rx) = unbounded_channel();
    srv_tx
        .send(ServerCommand::Connect {
            session_id: session_id.into(),
            connection_id,
            tx,
        })
        .expect("");
    rx
}

async fn connect(srv_tx: &ServerTx, connection_id: ConnectionId) -> FakeConnection {
    let mut rx = open(srv_tx, SESSION, connection_id).await;
    let event = timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("timed out")
        .expect("channel closed");
    match event {
        ConnectionEvent::Connected { session_tx } => FakeConnection {
            connection_id,
            rx,
            session_tx,
        },
        other => panic!("unexpected {:?}", other),
    }
}

fn disconnect(srv_tx: &ServerTx, connection_id: ConnectionId) {
    leave(srv_tx, SESSION, connection_id);
}

fn leave(srv_tx: &ServerTx, session_id: &str, connection_id: ConnectionId) {
    srv_tx
        .send(ServerCommand::Disconnect {
            session_id: session_id.into(),
            connection_id,
        })
        .expect("");
}

async fn connected(rx: &mut UnboundedReceiver<ConnectionEvent>, within: Duration) -> SessionTx {
    match timeout(within, rx.recv()).await.expect("timed out") {
        Some(ConnectionEvent::Connected { session_tx }) => session_tx,
        other => panic!("unexpected {:?}", other),
    }
}

fn draw(user_index: usize, color: &str) -> String {
    format!(
        r#"{{"action":"draw","userIndex":{},"command":{{"type":"stroke","segments":[{{"startX":0,"startY":0,"endX":5,"endY":5}}],"color":"{}","brushSize":2,"isEraser":false}}}}"#,
        user_index, color
    )
}

#[tokio::test]
async fn it_converges_two_participants_on_undo() {
    let (_store, srv_tx) = setup().await;
    let mut alice = connect(&srv_tx, 1).await;
    let mut bob = connect(&srv_tx, 2).await;

    alice.send(&draw(0, "#aa0000"));
    alice.next().await;
    bob.next().await;
    bob.send(&draw(1, "#00bb00"));
    alice.next().await;
    bob.next().await;

    alice.send(r#"{"action":"undo","userIndex":0}"#);
    for connection in [&mut alice, &mut bob].iter_mut() {
        let operation = connection.next().await;
        assert_eq!(operation["action"], "undoOperation");
        assert_eq!(operation["cmdIndex"], 0);

        let sync = connection.next().await;
        assert_eq!(sync["action"], "sync");
        assert_eq!(sync["stack"][0]["color"], "#aa0000");
        assert_eq!(sync["stack"][0]["active"], false);
        assert_eq!(sync["stack"][1]["color"], "#00bb00");
        assert_eq!(sync["stack"][1]["active"], true);
        assert_eq!(sync["pointerMap"]["0"], 0);
        assert_eq!(sync["pointerMap"]["1"], 1);
    }
}

#[tokio::test]
async fn it_sends_nothing_for_undo_without_history() {
    let (_store, srv_tx) = setup().await;
    let mut alice = connect(&srv_tx, 1).await;
    alice.send(r#"{"action":"undo","userIndex":0}"#);
    alice.assert_silent().await;
}

#[tokio::test]
async fn it_catches_up_a_late_joiner() {
    let (_store, srv_tx) = setup().await;
    let mut alice = connect(&srv_tx, 1).await;
    for i in 0..3 {
        alice.send(&draw(i % 2, "#000000"));
        alice.next().await;
    }

    let mut late = connect(&srv_tx, 2).await;
    let sync = late.next().await;
    assert_eq!(sync["action"], "sync");
    assert_eq!(sync["stack"].as_array().expect("").len(), 3);
}

#[tokio::test]
async fn it_keeps_sessions_apart() {
    let (store, srv_tx) = setup().await;
    store
        .insert(
            "other",
            SessionRecord::new("carol".into(), Background::blank(1, 1)),
        )
        .await;
    let mut alice = connect(&srv_tx, 1).await;
    let mut rx = open(&srv_tx, "other", 2).await;
    match rx.recv().await {
        Some(ConnectionEvent::Connected { .. }) => {}
        other => panic!("unexpected {:?}", other),
    }

    alice.send(&draw(0, "#000000"));
    alice.next().await;
    assert!(timeout(Duration::from_millis(50), rx.recv()).await.is_err());
}

#[tokio::test]
async fn it_rejects_unknown_sessions() {
    let (_store, srv_tx) = setup().await;
    let mut rx = open(&srv_tx, "missing", 1).await;
    match rx.recv().await {
        Some(ConnectionEvent::Rejected { reason }) => assert_eq!(reason, "session not found"),
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn it_deletes_the_session_after_the_grace_period() {
    let (store, srv_tx) = setup().await;
    let mut alice = connect(&srv_tx, 1).await;
    alice.send(&draw(0, "#000000"));
    alice.next().await;

    disconnect(&srv_tx, 1);
    sleep(GRACE * 3).await;
    assert!(!store.contains(SESSION).await);

    let mut rx = open(&srv_tx, SESSION, 2).await;
    match rx.recv().await {
        Some(ConnectionEvent::Rejected { .. }) => {}
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn it_survives_a_reconnect_within_the_grace_period() {
    let (store, srv_tx) = setup().await;
    let mut alice = connect(&srv_tx, 1).await;
    alice.send(&draw(0, "#000000"));
    alice.next().await;
    alice.send(&draw(0, "#111111"));
    alice.next().await;
    alice.send(r#"{"action":"undo","userIndex":0}"#);
    alice.next().await;
    alice.next().await;

    disconnect(&srv_tx, 1);
    sleep(GRACE / 4).await;
    let mut again = connect(&srv_tx, 2).await;
    let sync = again.next().await;
    assert_eq!(sync["stack"].as_array().expect("").len(), 2);
    assert_eq!(sync["stack"][1]["active"], false);
    assert_eq!(sync["pointerMap"]["0"], 1);

    sleep(GRACE * 3).await;
    assert!(store.contains(SESSION).await);

    again.send(r#"{"action":"redo","userIndex":0}"#);
    assert_eq!(again.next().await["action"], "redoOperation");
    assert_eq!(again.next().await["stack"][1]["active"], true);
}

#[tokio::test]
async fn it_relays_unknown_actions_to_the_session() {
    let (_store, srv_tx) = setup().await;
    let mut alice = connect(&srv_tx, 1).await;
    let mut bob = connect(&srv_tx, 2).await;
    bob.send(r#"{"action":"pointer","x":3,"y":4}"#);
    assert_eq!(alice.next().await["action"], "pointer");
    assert_eq!(bob.next().await["x"], 3);
}

const SLOW: &str = "slow";
const STORE_DELAY: Duration = Duration::from_millis(200);

/// Memory store whose load and delete of `SLOW` take `STORE_DELAY`.
struct SlowStore {
    inner: MemorySessionStore,
}

impl SlowStore {
    async fn delay(&self, session_id: &str) {
        if session_id == SLOW {
            sleep(STORE_DELAY).await;
        }
    }
}

#[async_trait]
impl SessionStore for SlowStore {
    async fn create(&self, record: SessionRecord) -> Result<String, StoreError> {
        self.inner.create(record).await
    }

    async fn load(&self, session_id: &str) -> Result<Option<SessionRecord>, StoreError> {
        self.delay(session_id).await;
        self.inner.load(session_id).await
    }

    async fn update(
        &self,
        session_id: &str,
        update: UpdateFn,
    ) -> Result<SessionRecord, StoreError> {
        self.inner.update(session_id, update).await
    }

    async fn list(&self) -> Result<Vec<(String, SessionRecord)>, StoreError> {
        self.inner.list().await
    }

    async fn delete(&self, session_id: &str) -> Result<(), StoreError> {
        self.delay(session_id).await;
        self.inner.delete(session_id).await
    }
}

async fn setup_slow() -> (Arc<SlowStore>, ServerTx) {
    let store = Arc::new(SlowStore {
        inner: MemorySessionStore::new(),
    });
    for session_id in [SESSION, SLOW].iter() {
        store
            .inner
            .insert(
                *session_id,
                SessionRecord::new("alice".into(), Background::blank(1, 1)),
            )
            .await;
    }
    let (srv_tx, _) = spawn_server(
        store.clone() as Arc<dyn SessionStore>,
        ServerConfig {
            grace_period: GRACE,
        },
    );
    (store, srv_tx)
}

#[tokio::test]
async fn it_serves_other_sessions_while_one_is_loading() {
    let (_store, srv_tx) = setup_slow().await;
    let mut slow = open(&srv_tx, SLOW, 1).await;

    let mut fast = open(&srv_tx, SESSION, 2).await;
    connected(&mut fast, STORE_DELAY / 2).await;
    connected(&mut slow, STORE_DELAY * 5).await;
}

#[tokio::test]
async fn it_connects_everyone_queued_behind_a_load() {
    let (_store, srv_tx) = setup_slow().await;
    let mut first = open(&srv_tx, SLOW, 1).await;
    let mut second = open(&srv_tx, SLOW, 2).await;

    let session_tx = connected(&mut first, STORE_DELAY * 5).await;
    connected(&mut second, STORE_DELAY * 5).await;

    session_tx
        .send(SessionMessage::Command {
            from: 1,
            command: SessionCommand::parse(&draw(0, "#000000")).expect(""),
        })
        .expect("");
    for rx in [&mut first, &mut second].iter_mut() {
        match timeout(Duration::from_secs(1), rx.recv()).await.expect("timed out") {
            Some(ConnectionEvent::Text(text)) => assert!(text.contains("\"sync\"")),
            other => panic!("unexpected {:?}", other),
        }
    }
}

#[tokio::test]
async fn it_forgets_connections_that_leave_while_loading() {
    let (store, srv_tx) = setup_slow().await;
    let _gone = open(&srv_tx, SLOW, 1).await;
    leave(&srv_tx, SLOW, 1);

    let mut rx = open(&srv_tx, SLOW, 2).await;
    connected(&mut rx, STORE_DELAY * 5).await;
    leave(&srv_tx, SLOW, 2);

    // Connection 1 was never counted, so the session drains and is deleted.
    sleep(GRACE + STORE_DELAY * 2).await;
    assert!(!store.inner.contains(SLOW).await);
}

#[tokio::test]
async fn it_holds_connects_until_a_deletion_finishes() {
    let (store, srv_tx) = setup_slow().await;
    let mut rx = open(&srv_tx, SLOW, 1).await;
    connected(&mut rx, STORE_DELAY * 5).await;
    leave(&srv_tx, SLOW, 1);

    // The grace period is over and the store is still deleting.
    sleep(GRACE + STORE_DELAY / 2).await;
    assert!(store.inner.contains(SLOW).await);
    let mut late = open(&srv_tx, SLOW, 2).await;
    match timeout(STORE_DELAY * 5, late.recv()).await.expect("timed out") {
        Some(ConnectionEvent::Rejected { reason }) => assert_eq!(reason, "session not found"),
        other => panic!("unexpected {:?}", other),
    }
}
