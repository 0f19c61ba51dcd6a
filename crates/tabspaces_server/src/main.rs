use tabspaces_server::ServerConfig;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let addr = tabspaces_server::listen_addr_from_env()?;
    let config = ServerConfig::from_env()?;
    tracing::info!(
        store = ?config.store,
        host = ?config.host,
        root = ?config.root,
        "starting tabspaces_server"
    );

    let server = tabspaces_server::start_server_with_config(addr, config).await?;
    tracing::info!(addr = %server.addr, "tabspaces_server listening");
    server.wait().await?;
    Ok(())
}
