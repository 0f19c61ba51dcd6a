use anyhow::Context as _;
use axum::Router;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tabspaces_backend::{duration_ms_from_env, optional_trimmed_path_from_env, paths};

pub mod engine;
mod host_bridge;
pub mod server;

pub use engine::EngineConfig;
pub use host_bridge::HostBridge;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StoreMode {
    Sqlite,
    Memory,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HostMode {
    /// The browser extension connects to `/api/host`.
    Bridge,
    /// A simulated browser with a single new-tab window.
    Memory,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub store: StoreMode,
    pub host: HostMode,
    /// Data directory for the sqlite store. Defaults to `$HOME/tabspaces`.
    pub root: Option<PathBuf>,
    pub web_dist: Option<PathBuf>,
    pub engine: EngineConfig,
    pub host_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            store: StoreMode::Sqlite,
            host: HostMode::Bridge,
            root: None,
            web_dist: None,
            engine: EngineConfig::default(),
            host_timeout: Duration::from_secs(5),
        }
    }
}

impl ServerConfig {
    /// Everything in process, nothing on disk.
    pub fn in_memory() -> Self {
        Self {
            store: StoreMode::Memory,
            host: HostMode::Memory,
            ..Self::default()
        }
    }

    pub fn from_env() -> anyhow::Result<Self> {
        let mut out = Self::default();

        let store = std::env::var("TABSPACES_STORE").unwrap_or_default();
        out.store = match store.trim().to_ascii_lowercase().as_str() {
            "memory" | "mem" => StoreMode::Memory,
            "" | "sqlite" => StoreMode::Sqlite,
            other => {
                tracing::warn!(value = other, "unknown TABSPACES_STORE, using sqlite");
                StoreMode::Sqlite
            }
        };

        let host = std::env::var("TABSPACES_HOST").unwrap_or_default();
        out.host = match host.trim().to_ascii_lowercase().as_str() {
            "memory" | "mem" | "simulated" => HostMode::Memory,
            "" | "bridge" => HostMode::Bridge,
            other => {
                tracing::warn!(value = other, "unknown TABSPACES_HOST, using bridge");
                HostMode::Bridge
            }
        };

        out.root = optional_trimmed_path_from_env(paths::ROOT_ENV)?;
        out.web_dist = optional_trimmed_path_from_env("TABSPACES_WEB_DIST_DIR")?;

        out.engine.swap_timeout =
            duration_ms_from_env("TABSPACES_SWAP_TIMEOUT_MS", out.engine.swap_timeout);
        out.engine.sync_debounce =
            duration_ms_from_env("TABSPACES_SYNC_DEBOUNCE_MS", out.engine.sync_debounce);
        out.host_timeout = duration_ms_from_env("TABSPACES_HOST_TIMEOUT_MS", out.host_timeout);

        Ok(out)
    }
}

pub struct StartedServer {
    pub addr: SocketAddr,
    handle: Option<tokio::task::JoinHandle<anyhow::Result<()>>>,
}

impl StartedServer {
    pub async fn wait(self) -> anyhow::Result<()> {
        let mut this = self;
        let handle = this.handle.take().context("server task already consumed")?;

        handle
            .await
            .context("server task panicked")?
            .context("server failed")?;
        Ok(())
    }
}

impl Drop for StartedServer {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

pub const DEFAULT_ADDR: &str = "127.0.0.1:8422";

/// Listen address from `TABSPACES_SERVER_ADDR`, or [`DEFAULT_ADDR`] when unset or blank.
pub fn listen_addr_from_env() -> anyhow::Result<SocketAddr> {
    let raw = std::env::var("TABSPACES_SERVER_ADDR").unwrap_or_default();
    let raw = match raw.trim() {
        "" => DEFAULT_ADDR,
        raw => raw,
    };
    raw.parse()
        .with_context(|| format!("invalid TABSPACES_SERVER_ADDR: {raw}"))
}

pub async fn start_server_with_config(
    addr: SocketAddr,
    config: ServerConfig,
) -> anyhow::Result<StartedServer> {
    let app: Router = server::router(config).await?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    let actual = listener.local_addr().context("failed to read local addr")?;

    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.context("server failed")?;
        Ok(())
    });

    Ok(StartedServer {
        addr: actual,
        handle: Some(handle),
    })
}
