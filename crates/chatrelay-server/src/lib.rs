//! The ChatRelay HTTP server: accepts a conversation history and relays
//! the upstream provider's incremental output as a plain-text byte
//! stream.

pub mod api;
pub mod error;
pub mod router;
pub mod server;
pub mod state;

pub use error::ApiError;
pub use router::build_router;
pub use server::{HttpConfig, HttpServer};
pub use state::{AppState, RequestDefaults};
