//! HTTP surface for Scribe: `POST /api/chat` streams a research run to the
//! browser as data-stream protocol lines.

/// `POST /api/chat`.
pub mod chat;
/// Router, state and CORS.
pub mod server;

pub use chat::{ChatError, ClientMessage, ClientRequest};
pub use server::{AppState, GatewayConfig, GatewayServer};
