use anyhow::Result;
use axum::Router;
use tokio::sync::broadcast;
use tracing::info;

use crate::router;
use crate::state::AppState;

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Host to bind to (default: 127.0.0.1)
    pub host: String,
    /// Port to listen on (default: 3000)
    pub port: u16,
    /// CORS allowed origins
    pub cors_origins: Vec<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        let host = std::env::var("CHATRELAY_HTTP_HOST")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| "127.0.0.1".to_string());

        Self {
            host,
            port: 3000,
            cors_origins: Vec::new(),
        }
    }
}

/// HTTP server for the relay
pub struct HttpServer {
    config: HttpConfig,
    state: AppState,
}

impl HttpServer {
    pub fn new(config: HttpConfig, state: AppState) -> Self {
        Self { config, state }
    }

    fn build_router(&self) -> Router {
        router::build_router(self.state.clone(), &self.config)
    }

    /// Run the HTTP server until the shutdown channel fires.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        let app = self.build_router();
        let addr = format!("{}:{}", self.config.host, self.config.port);

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        info!("HTTP server listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                info!("HTTP server shutting down");
            })
            .await?;

        Ok(())
    }
}
