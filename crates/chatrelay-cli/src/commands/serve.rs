use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tokio::sync::broadcast;
use tracing::info;

use chatrelay_provider::OpenAiProvider;
use chatrelay_server::{AppState, HttpConfig, HttpServer};

use crate::cli::ServeArgs;
use crate::config::CliConfig;

pub async fn run(args: ServeArgs, config: &CliConfig) -> Result<()> {
    let api_key = args
        .api_key
        .or_else(|| config.api_keys.openrouter.clone());
    let Some(api_key) = api_key else {
        bail!("no API key: pass --api-key, set CHATRELAY_API_KEY, or add it to the config file");
    };

    let mut provider = OpenAiProvider::new(api_key);
    if let Some(model) = args.model.or_else(|| config.default.model.clone()) {
        provider = provider.with_model(model);
    }
    if let Some(base_url) = args.base_url.or_else(|| config.default.base_url.clone()) {
        provider = provider.with_base_url(base_url);
    }

    let http_config = HttpConfig {
        host: args.host,
        port: args.port,
        ..HttpConfig::default()
    };
    let state = AppState::new(Arc::new(provider));
    let server = HttpServer::new(http_config, state);

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received Ctrl-C, shutting down");
            let _ = shutdown_tx.send(());
        }
    });

    server
        .run(shutdown_rx)
        .await
        .context("relay server exited with an error")
}
