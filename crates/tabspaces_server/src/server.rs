use crate::engine::{Engine, EngineHandle};
use crate::host_bridge::{HostBridge, host_ws_task};
use crate::{HostMode, ServerConfig, StoreMode};
use anyhow::anyhow;
use axum::{
    Json, Router,
    extract::{State, ws::WebSocketUpgrade},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use std::sync::Arc;
use tabspaces_api::{ClientRequest, ServerMessage};
use tabspaces_backend::{MemoryBrowser, MemoryStore, SqliteStore, paths};
use tabspaces_domain::{BrowserHost, KeyValueStore};
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

pub const NEW_TAB_URL: &str = "chrome://newtab/";

pub async fn router(config: ServerConfig) -> anyhow::Result<Router> {
    let store: Arc<dyn KeyValueStore> = match config.store {
        StoreMode::Sqlite => {
            let root = match config.root.clone() {
                Some(root) => root,
                None => paths::data_root()?,
            };
            let db_path = paths::sqlite_path(&root);
            tracing::info!(path = %db_path.display(), "using sqlite store");
            Arc::new(SqliteStore::new(db_path)?)
        }
        StoreMode::Memory => Arc::new(MemoryStore::new()),
    };

    let (engine, inbox) = EngineHandle::channel();
    let (host, bridge): (Arc<dyn BrowserHost>, Option<HostBridge>) = match config.host {
        HostMode::Bridge => {
            let bridge = HostBridge::new(config.host_timeout);
            (Arc::new(bridge.clone()), Some(bridge))
        }
        HostMode::Memory => {
            let browser = MemoryBrowser::new(engine.event_sink())?;
            browser
                .open_window(&[NEW_TAB_URL])
                .map_err(|message| anyhow!(message))?;
            (Arc::new(browser), None)
        }
    };

    let events = Engine::start(&engine, inbox, store, host, config.engine);

    let state = AppStateHolder {
        engine,
        events,
        bridge,
    };

    let api = Router::new()
        .route("/health", get(health))
        .route("/model", get(get_model))
        .route("/events", get(ws_events))
        .route("/host", get(ws_host))
        .with_state(state);

    let mut app = Router::new().nest("/api", api);
    if let Some(web_dist) = config.web_dist.clone() {
        let web_index = web_dist.join("index.html");
        let web = ServeDir::new(web_dist).not_found_service(ServeFile::new(web_index));
        app = app.fallback_service(web);
    }

    Ok(app
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http()))
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Clone)]
struct AppStateHolder {
    engine: EngineHandle,
    events: broadcast::Sender<ServerMessage>,
    bridge: Option<HostBridge>,
}

async fn get_model(State(state): State<AppStateHolder>) -> impl IntoResponse {
    match state.engine.model_snapshot().await {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}

async fn ws_events(ws: WebSocketUpgrade, State(state): State<AppStateHolder>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws_events_task(socket, state))
}

async fn ws_host(ws: WebSocketUpgrade, State(state): State<AppStateHolder>) -> impl IntoResponse {
    let Some(bridge) = state.bridge.clone() else {
        return (StatusCode::NOT_FOUND, "browser host bridge disabled").into_response();
    };
    let engine = state.engine.clone();
    ws.on_upgrade(move |socket| host_ws_task(socket, bridge, engine))
        .into_response()
}

async fn ws_events_task(mut socket: axum::extract::ws::WebSocket, state: AppStateHolder) {
    let mut rx = state.events.subscribe();
    let engine = state.engine.clone();

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                let Some(Ok(msg)) = incoming else { break };
                if handle_ws_incoming(msg, &engine, &mut socket).await.is_err() {
                    break;
                }
            }
            outgoing = rx.recv() => {
                let outgoing = match outgoing {
                    Ok(outgoing) => outgoing,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "ui connection lagged, resending model");
                        let Ok(snapshot) = engine.model_snapshot().await else { break };
                        ServerMessage::ModelUpdated(Box::new(snapshot))
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                if socket.send(json_text(&outgoing)).await.is_err() {
                    break;
                }
            }
        }
    }
}

pub(crate) fn json_text<T: serde::Serialize>(value: &T) -> axum::extract::ws::Message {
    axum::extract::ws::Message::Text(serde_json::to_string(value).unwrap_or_default().into())
}

async fn handle_ws_incoming(
    msg: axum::extract::ws::Message,
    engine: &EngineHandle,
    socket: &mut axum::extract::ws::WebSocket,
) -> anyhow::Result<()> {
    let axum::extract::ws::Message::Text(text) = msg else {
        return Ok(());
    };

    let request: ClientRequest = match serde_json::from_str(&text) {
        Ok(v) => v,
        Err(err) => {
            let _ = socket
                .send(json_text(&ServerMessage::Error {
                    message: format!("invalid ws message: {err}"),
                }))
                .await;
            return Ok(());
        }
    };

    if let Some(reply) = engine.apply_client_request(request).await? {
        socket.send(json_text(&reply)).await?;
    }
    Ok(())
}
