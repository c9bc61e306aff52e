//! WebSocket front end that runs commit tests for chat sessions.

pub mod protocol;
pub mod server;
pub mod service;
pub mod session;

pub use protocol::ServerMessage;
pub use server::{create_app, serve};
pub use service::{NamespaceLocks, OrchestratorService, RequestHandler};
pub use session::{Connection, ConnectionState, Frame, Transport, WsTransport};
