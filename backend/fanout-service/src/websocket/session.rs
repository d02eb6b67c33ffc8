use actix::{Actor, ActorContext, Addr, AsyncContext, Handler, Message as ActixMessage, StreamHandler};
use actix_web_actors::ws;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::connection::Connection;
use super::gateway::{ConnectionSink, DeliveryError, DeliveryGateway};
use super::messages::{self, ClientMessage, ServerMessage};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

/// Frame queued by the connection's writer task
#[derive(ActixMessage)]
#[rtype(result = "()")]
pub struct Push(pub ServerMessage);

#[derive(ActixMessage)]
#[rtype(result = "()")]
pub struct CloseSocket;

/// One client WebSocket. Unbound until the client sends `subscribe`.
pub struct FeedSocket {
    gateway: Arc<DeliveryGateway>,
    conn: Option<Arc<Connection>>,
    hb: Instant,
}

impl FeedSocket {
    pub fn new(gateway: Arc<DeliveryGateway>) -> Self {
        Self {
            gateway,
            conn: None,
            hb: Instant::now(),
        }
    }

    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.hb) > CLIENT_TIMEOUT {
                warn!("WebSocket heartbeat failed, disconnecting");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    fn send(&self, message: &ServerMessage, ctx: &mut ws::WebsocketContext<Self>) {
        match message.to_json() {
            Ok(text) => ctx.text(text),
            Err(e) => warn!(error = %e, "Failed to encode frame"),
        }
    }

    fn handle_text(&mut self, text: &str, ctx: &mut ws::WebsocketContext<Self>) {
        let Some(conn) = self.conn.clone() else {
            return;
        };

        match ClientMessage::from_json(text) {
            Ok(ClientMessage::Subscribe { user_id }) => {
                let gateway = Arc::clone(&self.gateway);
                actix::spawn(async move {
                    if let Err(e) = gateway.subscribe(&conn, &user_id).await {
                        debug!(connection_id = %conn.id(), error = %e, "Subscribe rejected");
                    }
                });
            }
            Ok(ClientMessage::Ping { timestamp }) => {
                self.send(&ServerMessage::pong(timestamp), ctx);
            }
            Ok(ClientMessage::Pong { .. }) => {}
            Err(e) => {
                debug!(error = %e, "Unparseable client frame");
                self.send(
                    &ServerMessage::error(messages::BAD_FRAME, "unrecognized message"),
                    ctx,
                );
            }
        }
    }
}

impl Actor for FeedSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.hb(ctx);

        let conn = self.gateway.open_connection(ctx.address());
        info!(connection_id = %conn.id(), "WebSocket session started");
        self.send(
            &ServerMessage::Connected {
                connection_id: conn.id().0,
            },
            ctx,
        );
        self.conn = Some(conn);
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        if let Some(conn) = self.conn.take() {
            info!(connection_id = %conn.id(), "WebSocket session stopped");
            self.gateway.unsubscribe(&conn);
        }
    }
}

impl Handler<Push> for FeedSocket {
    type Result = ();

    fn handle(&mut self, msg: Push, ctx: &mut Self::Context) {
        self.send(&msg.0, ctx);
    }
}

impl Handler<CloseSocket> for FeedSocket {
    type Result = ();

    fn handle(&mut self, _msg: CloseSocket, ctx: &mut Self::Context) {
        ctx.close(None);
        ctx.stop();
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for FeedSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(text)) => {
                self.hb = Instant::now();
                self.handle_text(&text, ctx);
            }
            Ok(ws::Message::Binary(_)) => {
                warn!("Binary WebSocket messages not supported");
            }
            Ok(ws::Message::Close(reason)) => {
                debug!(?reason, "WebSocket close message received");
                ctx.close(reason);
                ctx.stop();
            }
            Err(e) => {
                warn!(error = %e, "WebSocket protocol error");
                ctx.stop();
            }
            _ => {}
        }
    }
}

/// The writer task reaches the socket through the actor's mailbox.
#[async_trait]
impl ConnectionSink for Addr<FeedSocket> {
    async fn write(&mut self, message: &ServerMessage) -> Result<(), DeliveryError> {
        self.send(Push(message.clone()))
            .await
            .map_err(|e| DeliveryError::Write(e.to_string()))
    }

    async fn close(&mut self) {
        self.do_send(CloseSocket);
    }
}
