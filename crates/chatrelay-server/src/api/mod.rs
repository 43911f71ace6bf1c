pub mod chat;

use axum::Router;

/// Build the API router
pub fn router() -> Router {
    Router::new().nest("/chat", chat::router())
}
