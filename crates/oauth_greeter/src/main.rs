// OAuth Greeter Server
//
// Standalone gateway that signs callers in through the provider's
// authorization-code flow and greets them by login

use clap::Parser;
use oauth_greeter::{start_server, Cli, GatewayConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    // Bad credentials are fatal: never start listening without them.
    let config = GatewayConfig::from_cli(cli)?;
    tracing::info!(
        "[OK] Credentials loaded for client_id {}",
        config.credentials.client_id
    );

    start_server(config).await?;

    Ok(())
}
