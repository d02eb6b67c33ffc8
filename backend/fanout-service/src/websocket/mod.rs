/// Real-time delivery of new posts to connected followers
///
/// Components:
/// 1. `ConnectionDirectory`: identity -> live connections, sharded
/// 2. `DeliveryGateway`: subscribe/unsubscribe and the dispatch loop
/// 3. `spawn_bus_bridge`: event bus subscription feeding the dispatcher
/// 4. `FeedSocket`: actix WebSocket session bound to one connection
pub mod bridge;
pub mod connection;
pub mod directory;
pub mod gateway;
pub mod messages;
pub mod session;

pub use bridge::spawn_bus_bridge;
pub use connection::{Connection, ConnectionId, ConnectionState, Enqueue};
pub use directory::ConnectionDirectory;
pub use gateway::{ConnectionSink, DeliveryError, DeliveryGateway, DeliveryReport, SubscribeError};
pub use messages::{ClientMessage, ServerMessage};
pub use session::FeedSocket;
