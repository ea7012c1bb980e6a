use clap::Parser;
use tileforge::prelude::*;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(
    name = "tileforge-server",
    about = "Authoritative UDP server for a chunked multiplayer tile world"
)]
struct Args {
    /// UDP port to listen on.
    #[arg(default_value_t = DEFAULT_PORT)]
    port: u16,
}

fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true).with_level(true))
        .init();
}

#[tokio::main]
async fn main() -> Result<(), ForgeError> {
    init_logging();
    let args = Args::parse();

    let server = GameServer::bind(ServerConfig::from_env(args.port)).await?;
    server
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "cannot listen for ctrl-c; running until killed");
                std::future::pending::<()>().await;
            }
        })
        .await
}
