use actix::{Actor, ActorContext, AsyncContext, Handler, Message, Running, StreamHandler};
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use actix_web_actors::ws::{CloseCode, CloseReason};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use system::{ConnectionId, SessionCommand, SessionId};

use crate::config::ConnectionConfig;
use crate::server::{ServerCommand, ServerTx};
use crate::session::{SessionMessage, SessionTx};

pub type ConnectionTx = tokio::sync::mpsc::UnboundedSender<ConnectionEvent>;

static CONNECTION_ID_SOURCE: AtomicU64 = AtomicU64::new(1);

pub fn next_connection_id() -> ConnectionId {
    CONNECTION_ID_SOURCE.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug)]
pub enum ConnectionEvent {
    Connected { session_tx: SessionTx },
    Text(String),
    Rejected { reason: String },
}

#[derive(Message)]
#[rtype(result = "()")]
struct ConnectionActorMessage(ConnectionEvent);

enum ConnectionState {
    /// Waiting for the registry. Commands are held back until then.
    Idle(Vec<SessionCommand>),
    Connected(SessionTx),
}

struct ConnectionActor {
    connection_id: ConnectionId,
    session_id: SessionId,
    state: ConnectionState,
    srv_tx: ServerTx,
    heartbeat_interval: Duration,
}

impl ConnectionActor {
    fn dispatch(&mut self, command: SessionCommand, ctx: &mut ws::WebsocketContext<Self>) {
        match &mut self.state {
            ConnectionState::Idle(pending) => pending.push(command),
            ConnectionState::Connected(session_tx) => {
                let message = SessionMessage::Command {
                    from: self.connection_id,
                    command,
                };
                if session_tx.send(message).is_err() {
                    log::warn!(
                        "session {} is gone, closing connection {}",
                        self.session_id,
                        self.connection_id
                    );
                    ctx.stop();
                }
            }
        }
    }
}

impl Actor for ConnectionActor {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<ConnectionEvent>();

        let connect = ServerCommand::Connect {
            session_id: self.session_id.clone(),
            connection_id: self.connection_id,
            tx,
        };
        if self.srv_tx.send(connect).is_err() {
            log::error!("server is not running, closing connection {}", self.connection_id);
            ctx.stop();
            return;
        }

        let addr = ctx.address().recipient();
        let connection_id = self.connection_id;
        actix::spawn(async move {
            log::debug!("connection {} egress - started", connection_id);
            while let Some(event) = rx.recv().await {
                if addr.send(ConnectionActorMessage(event)).await.is_err() {
                    break;
                }
            }
            log::debug!("connection {} egress - terminated", connection_id);
        });

        ctx.run_interval(self.heartbeat_interval, |act, ctx| {
            log::trace!("ping connection {}", act.connection_id);
            ctx.ping(b"");
        });
    }

    fn stopping(&mut self, _: &mut Self::Context) -> Running {
        let _ = self.srv_tx.send(ServerCommand::Disconnect {
            session_id: self.session_id.clone(),
            connection_id: self.connection_id,
        });
        Running::Stop
    }
}

/// Ingress
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for ConnectionActor {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => ctx.pong(&msg),
            Ok(ws::Message::Pong(_)) => log::trace!("pong from connection {}", self.connection_id),
            Ok(ws::Message::Text(text)) => match SessionCommand::parse(&text) {
                Ok(command) => self.dispatch(command, ctx),
                Err(err) => log::warn!(
                    "dropping malformed frame from connection {}: {}",
                    self.connection_id,
                    err
                ),
            },
            Ok(ws::Message::Binary(bin)) => log::warn!(
                "dropping binary frame of {} bytes from connection {}",
                bin.len(),
                self.connection_id
            ),
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) | Ok(ws::Message::Nop) => (),
            Err(err) => {
                log::warn!("protocol error on connection {}: {}", self.connection_id, err);
                ctx.stop();
            }
        }
    }
}

/// Egress
impl Handler<ConnectionActorMessage> for ConnectionActor {
    type Result = ();

    fn handle(
        &mut self,
        msg: ConnectionActorMessage,
        ctx: &mut ws::WebsocketContext<Self>,
    ) -> Self::Result {
        match msg.0 {
            ConnectionEvent::Connected { session_tx } => {
                let previous =
                    std::mem::replace(&mut self.state, ConnectionState::Connected(session_tx));
                if let ConnectionState::Idle(pending) = previous {
                    for command in pending {
                        self.dispatch(command, ctx);
                    }
                }
            }
            ConnectionEvent::Text(text) => ctx.text(text),
            ConnectionEvent::Rejected { reason } => {
                log::info!("closing connection {}: {}", self.connection_id, reason);
                ctx.close(Some(CloseReason {
                    code: CloseCode::Policy,
                    description: Some(reason),
                }));
                ctx.stop();
            }
        }
    }
}

pub async fn ws_index(
    req: HttpRequest,
    stream: web::Payload,
    path: web::Path<String>,
    srv_tx: web::Data<ServerTx>,
    config: web::Data<ConnectionConfig>,
) -> Result<HttpResponse, Error> {
    let session_id: SessionId = path.into_inner();
    let connection_id = next_connection_id();
    log::info!("connection {} opened to session {}", connection_id, session_id);
    ws::start(
        ConnectionActor {
            connection_id,
            session_id,
            state: ConnectionState::Idle(Vec::new()),
            srv_tx: srv_tx.get_ref().clone(),
            heartbeat_interval: config.heartbeat_interval,
        },
        &req,
        stream,
    )
}
