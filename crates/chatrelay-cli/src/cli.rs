use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "chatrelay")]
#[command(version, about = "ChatRelay - streaming chat relay and terminal client")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the relay server
    Serve(ServeArgs),

    /// Chat through a relay from the terminal
    Chat(ChatArgs),
}

#[derive(Args)]
pub struct ServeArgs {
    /// Host to bind to
    #[arg(long, env = "CHATRELAY_HTTP_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "CHATRELAY_HTTP_PORT", default_value_t = 3000)]
    pub port: u16,

    /// Upstream provider API key
    #[arg(long, env = "CHATRELAY_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Upstream provider base URL
    #[arg(long, env = "CHATRELAY_BASE_URL")]
    pub base_url: Option<String>,

    /// Model identifier sent upstream
    #[arg(short, long, env = "CHATRELAY_MODEL")]
    pub model: Option<String>,
}

#[derive(Args)]
pub struct ChatArgs {
    /// Relay server to talk to
    #[arg(long, env = "CHATRELAY_URL", default_value = "http://127.0.0.1:3000")]
    pub relay_url: String,

    /// Ask for the whole reply in one response instead of streaming
    #[arg(long)]
    pub no_stream: bool,

    /// Send a single message and exit instead of opening the prompt loop
    #[arg(short = 'm', long)]
    pub message: Option<String>,
}
