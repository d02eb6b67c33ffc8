/// Delivery gateway
///
/// Consumes fan-out events and pushes a `new_post` frame to every live
/// connection bound to a follower in the event's snapshot. Delivery is best
/// effort: a follower with no connection simply misses the push and reads the
/// post from their feed later.
///
/// Per connection:
/// 1. `open_connection` registers it and spawns a writer task that drains a
///    bounded outbox into the socket, each write bounded by a timeout
/// 2. `subscribe` binds it to a validated identity
/// 3. the dispatch loop enqueues without blocking; a full outbox marks the
///    client slow and drops it, other clients are unaffected
/// 4. `unsubscribe` (or any write failure) removes it; no further frames
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::connection::{Connection, ConnectionId, Enqueue};
use super::directory::ConnectionDirectory;
use super::messages::{self, ServerMessage};
use crate::config::GatewayConfig;
use crate::metrics;
use crate::models::{FanoutEvent, UserRole};
use crate::repository::UserDirectory;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("connection sink closed")]
    SinkClosed,

    #[error("write failed: {0}")]
    Write(String),
}

/// Where a connection's writer task puts frames: the socket, or a channel in tests.
#[async_trait]
pub trait ConnectionSink: Send + 'static {
    async fn write(&mut self, message: &ServerMessage) -> Result<(), DeliveryError>;

    /// Called once after the writer stops
    async fn close(&mut self) {}
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubscribeError {
    #[error("identity is not a valid user id")]
    InvalidIdentity,

    #[error("identity is not known")]
    UnknownIdentity,

    #[error("user directory unavailable")]
    Unavailable,

    #[error("connection already closed")]
    ConnectionClosed,

    /// A later subscribe on the same connection took over
    #[error("superseded by a newer subscribe")]
    Superseded,
}

impl SubscribeError {
    pub fn code(&self) -> &'static str {
        match self {
            SubscribeError::InvalidIdentity => messages::INVALID_IDENTITY,
            SubscribeError::UnknownIdentity | SubscribeError::ConnectionClosed => {
                messages::UNKNOWN_IDENTITY
            }
            SubscribeError::Unavailable | SubscribeError::Superseded => messages::UNAVAILABLE,
        }
    }
}

/// Per-event delivery summary
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Distinct followers in the snapshot
    pub recipients: usize,
    pub queued: usize,
    pub dropped_slow: usize,
    pub skipped_closed: usize,
}

pub struct DeliveryGateway {
    directory: Arc<ConnectionDirectory>,
    users: Arc<dyn UserDirectory>,
    config: GatewayConfig,
    shutdown: watch::Sender<bool>,
}

impl DeliveryGateway {
    pub fn new(users: Arc<dyn UserDirectory>, config: GatewayConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            directory: Arc::new(ConnectionDirectory::new()),
            users,
            config,
            shutdown,
        }
    }

    pub fn directory(&self) -> &ConnectionDirectory {
        &self.directory
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Register a new connection and start its writer.
    pub fn open_connection<S: ConnectionSink>(&self, sink: S) -> Arc<Connection> {
        let (tx, rx) = mpsc::channel(self.config.connection_buffer);
        let conn = Arc::new(Connection::new(ConnectionId::new(), tx));
        self.directory.register(Arc::clone(&conn));

        tokio::spawn(run_writer(
            Arc::clone(&conn),
            rx,
            sink,
            Arc::clone(&self.directory),
            self.config.write_timeout(),
        ));

        metrics::set_active_connections(self.directory.open_connections());
        debug!(connection_id = %conn.id(), "Connection opened");
        conn
    }

    /// Validate `raw_identity` and bind the connection to it.
    ///
    /// On success the client gets a `subscribed` frame. On failure it gets an
    /// `error` frame and the connection stays open but unbound (or keeps any
    /// earlier binding). When several subscribes race on one connection the
    /// last one sent wins; earlier ones resolve to `Superseded` with no reply.
    pub async fn subscribe(
        &self,
        conn: &Arc<Connection>,
        raw_identity: &str,
    ) -> Result<Uuid, SubscribeError> {
        let ticket = conn.begin_subscribe();
        let result = self.bind(conn, ticket, raw_identity).await;
        let reply = match &result {
            Ok(user_id) => Some(ServerMessage::Subscribed { user_id: *user_id }),
            Err(SubscribeError::Superseded) => None,
            Err(e) => Some(ServerMessage::error(e.code(), e.to_string())),
        };
        if let Some(reply) = reply {
            self.reply(conn, reply);
        }
        result
    }

    async fn bind(
        &self,
        conn: &Arc<Connection>,
        ticket: u64,
        raw_identity: &str,
    ) -> Result<Uuid, SubscribeError> {
        let user_id =
            Uuid::parse_str(raw_identity.trim()).map_err(|_| SubscribeError::InvalidIdentity)?;

        let known = self.users.role_of(user_id).await;
        self.commit_binding(conn, ticket, user_id, known)
    }

    fn commit_binding(
        &self,
        conn: &Arc<Connection>,
        ticket: u64,
        user_id: Uuid,
        known: anyhow::Result<Option<UserRole>>,
    ) -> Result<Uuid, SubscribeError> {
        let _binding = conn.lock_binding();
        if !conn.is_current_subscribe(ticket) {
            debug!(connection_id = %conn.id(), %user_id, "Stale subscribe discarded");
            return Err(SubscribeError::Superseded);
        }

        match known {
            Ok(Some(_)) => {}
            Ok(None) => {
                debug!(connection_id = %conn.id(), %user_id, "Subscribe with unknown identity");
                return Err(SubscribeError::UnknownIdentity);
            }
            Err(e) => {
                warn!(error = %format!("{:#}", e), "Identity check failed");
                return Err(SubscribeError::Unavailable);
            }
        }

        if !self.directory.subscribe(conn, user_id) {
            return Err(SubscribeError::ConnectionClosed);
        }
        debug!(connection_id = %conn.id(), %user_id, "Connection subscribed");
        Ok(user_id)
    }

    /// Remove the connection. Safe to call more than once.
    pub fn unsubscribe(&self, conn: &Connection) {
        if let Some(user_id) = self.directory.unsubscribe(conn) {
            debug!(connection_id = %conn.id(), %user_id, "Connection unsubscribed");
        }
        metrics::set_active_connections(self.directory.open_connections());
    }

    /// Queue a control frame to one connection through its outbox.
    pub fn reply(&self, conn: &Connection, message: ServerMessage) {
        match conn.try_enqueue(message) {
            Enqueue::Queued => {}
            Enqueue::Full => {
                warn!(connection_id = %conn.id(), "Outbox full on reply; dropping slow client");
                metrics::record_delivery("slow");
                self.unsubscribe(conn);
            }
            Enqueue::Closed => {}
        }
    }

    /// Push one event to every connection of every follower in its snapshot.
    pub fn on_event(&self, event: &FanoutEvent) -> DeliveryReport {
        let message = ServerMessage::new_post(event.notification());
        let mut report = DeliveryReport::default();
        let mut seen = HashSet::with_capacity(event.followers.len());

        for follower in &event.followers {
            if !seen.insert(*follower) {
                continue;
            }
            report.recipients += 1;

            for conn in self.directory.connections_for(*follower) {
                match conn.try_enqueue(message.clone()) {
                    Enqueue::Queued => {
                        report.queued += 1;
                        metrics::record_delivery("queued");
                    }
                    Enqueue::Full => {
                        report.dropped_slow += 1;
                        metrics::record_delivery("slow");
                        warn!(
                            connection_id = %conn.id(),
                            user_id = %follower,
                            post_id = %event.post.id,
                            "Slow client dropped"
                        );
                        self.unsubscribe(&conn);
                    }
                    Enqueue::Closed => {
                        report.skipped_closed += 1;
                        metrics::record_delivery("closed");
                        self.unsubscribe(&conn);
                    }
                }
            }
        }

        debug!(
            event_id = %event.event_id,
            post_id = %event.post.id,
            recipients = report.recipients,
            queued = report.queued,
            dropped_slow = report.dropped_slow,
            "Event dispatched"
        );
        report
    }

    /// Bounded channel feeding the dispatch loop
    pub fn dispatch_channel(&self) -> (mpsc::Sender<FanoutEvent>, mpsc::Receiver<FanoutEvent>) {
        mpsc::channel(self.config.dispatch_buffer)
    }

    /// Run the single dispatch loop until the channel closes or shutdown.
    pub fn spawn_dispatcher(self: &Arc<Self>, mut events: mpsc::Receiver<FanoutEvent>) -> JoinHandle<()> {
        let gateway = Arc::clone(self);
        let mut shutdown = self.shutdown.subscribe();

        tokio::spawn(async move {
            if *shutdown.borrow_and_update() {
                info!("Gateway already shut down; dispatcher not started");
                return;
            }
            info!("Delivery dispatcher started");
            loop {
                tokio::select! {
                    maybe_event = events.recv() => match maybe_event {
                        Some(event) => {
                            gateway.on_event(&event);
                        }
                        None => break,
                    },
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("Delivery dispatcher stopped");
        })
    }

    /// Stop the dispatcher and close every connection.
    pub fn shutdown(&self) -> usize {
        self.shutdown.send_replace(true);
        let closed = self.directory.close_all();
        metrics::set_active_connections(0);
        info!(closed, "Delivery gateway shut down");
        closed
    }
}

async fn run_writer<S: ConnectionSink>(
    conn: Arc<Connection>,
    mut outbox: mpsc::Receiver<ServerMessage>,
    mut sink: S,
    directory: Arc<ConnectionDirectory>,
    write_timeout: std::time::Duration,
) {
    while let Some(message) = outbox.recv().await {
        if conn.is_closed() {
            break;
        }

        let failure = match timeout(write_timeout, sink.write(&message)).await {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(_) => Some(format!("write timed out after {:?}", write_timeout)),
        };

        match failure {
            None => {
                if matches!(message, ServerMessage::NewPost { .. }) {
                    metrics::record_delivery("written");
                }
            }
            Some(reason) => {
                metrics::record_delivery("write_failed");
                debug!(connection_id = %conn.id(), reason = %reason, "Write failed; dropping connection");
                directory.unsubscribe(&conn);
                metrics::set_active_connections(directory.open_connections());
                break;
            }
        }
    }

    sink.close().await;
}
