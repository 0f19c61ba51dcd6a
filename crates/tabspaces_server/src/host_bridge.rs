use crate::engine::EngineHandle;
use crate::server::json_text;
use axum::extract::ws::{Message, WebSocket};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tabspaces_api::{
    HostClientMessage, HostRequest, HostResponse, HostServerMessage, HostTabSnapshot,
};
use tabspaces_domain::{BrowserEvent, BrowserHost, HostTab, TabId, TabStatus, WindowId};
use tokio::sync::mpsc::{UnboundedSender, unbounded_channel};

/// [`BrowserHost`] backed by the extension connected on `/api/host`.
///
/// Calls block the caller until the host answers or the timeout elapses, so
/// they must run on a blocking thread.
#[derive(Clone)]
pub struct HostBridge {
    inner: Arc<BridgeInner>,
}

struct BridgeInner {
    timeout: Duration,
    next_request_id: AtomicU64,
    next_connection_id: AtomicU64,
    pending: Mutex<HashMap<u64, mpsc::Sender<HostResponse>>>,
    connection: Mutex<Option<HostConnection>>,
}

struct HostConnection {
    id: u64,
    outgoing: UnboundedSender<HostServerMessage>,
}

impl HostBridge {
    pub fn new(timeout: Duration) -> Self {
        Self {
            inner: Arc::new(BridgeInner {
                timeout,
                next_request_id: AtomicU64::new(1),
                next_connection_id: AtomicU64::new(1),
                pending: Mutex::new(HashMap::new()),
                connection: Mutex::new(None),
            }),
        }
    }

    fn lock_connection(&self) -> Result<MutexGuard<'_, Option<HostConnection>>, String> {
        self.inner
            .connection
            .lock()
            .map_err(|_| "host connection poisoned".to_owned())
    }

    fn lock_pending(
        &self,
    ) -> Result<MutexGuard<'_, HashMap<u64, mpsc::Sender<HostResponse>>>, String> {
        self.inner
            .pending
            .lock()
            .map_err(|_| "host requests poisoned".to_owned())
    }

    /// Makes `outgoing` the active host. A newer connection replaces an older one.
    fn attach(&self, outgoing: UnboundedSender<HostServerMessage>) -> u64 {
        let id = self.inner.next_connection_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut connection) = self.lock_connection() {
            if connection.is_some() {
                tracing::warn!(connection_id = id, "browser host replaced an existing connection");
            }
            *connection = Some(HostConnection { id, outgoing });
        }
        id
    }

    fn detach(&self, id: u64) {
        let Ok(mut connection) = self.lock_connection() else {
            return;
        };
        if connection.as_ref().is_some_and(|current| current.id == id) {
            *connection = None;
            drop(connection);
            // Dropping the senders wakes every waiting call with a disconnect.
            if let Ok(mut pending) = self.lock_pending() {
                pending.clear();
            }
        }
    }

    fn resolve(&self, request_id: u64, response: HostResponse) {
        let waiter = self
            .lock_pending()
            .ok()
            .and_then(|mut pending| pending.remove(&request_id));
        match waiter {
            Some(waiter) => {
                let _ = waiter.send(response);
            }
            None => tracing::debug!(request_id, "late or unknown host response"),
        }
    }

    fn forget(&self, request_id: u64) {
        if let Ok(mut pending) = self.lock_pending() {
            pending.remove(&request_id);
        }
    }

    fn call(&self, request: HostRequest) -> Result<HostResponse, String> {
        let outgoing = self
            .lock_connection()?
            .as_ref()
            .map(|connection| connection.outgoing.clone())
            .ok_or_else(|| "no browser host connected".to_owned())?;

        let request_id = self.inner.next_request_id.fetch_add(1, Ordering::Relaxed);
        let (reply_tx, reply_rx) = mpsc::channel();
        self.lock_pending()?.insert(request_id, reply_tx);

        if outgoing
            .send(HostServerMessage::HostRequest {
                request_id,
                request,
            })
            .is_err()
        {
            self.forget(request_id);
            return Err("browser host disconnected".to_owned());
        }

        match reply_rx.recv_timeout(self.inner.timeout) {
            Ok(HostResponse::Failed { message }) => Err(message),
            Ok(response) => Ok(response),
            Err(RecvTimeoutError::Timeout) => {
                self.forget(request_id);
                Err(format!(
                    "browser host did not answer within {}ms",
                    self.inner.timeout.as_millis()
                ))
            }
            Err(RecvTimeoutError::Disconnected) => Err("browser host disconnected".to_owned()),
        }
    }

    fn call_done(&self, request: HostRequest) -> Result<(), String> {
        match self.call(request)? {
            HostResponse::Done => Ok(()),
            other => Err(unexpected(&other)),
        }
    }
}

fn unexpected(response: &HostResponse) -> String {
    format!("unexpected host response: {response:?}")
}

impl BrowserHost for HostBridge {
    fn list_windows(&self) -> Result<Vec<WindowId>, String> {
        match self.call(HostRequest::ListWindows)? {
            HostResponse::Windows { windows } => Ok(windows
                .into_iter()
                .map(|id| WindowId::from_u64(id.0))
                .collect()),
            other => Err(unexpected(&other)),
        }
    }

    fn query_tabs(&self, window_id: WindowId) -> Result<Vec<HostTab>, String> {
        let request = HostRequest::QueryTabs {
            window: tabspaces_api::WindowId(window_id.as_u64()),
        };
        match self.call(request)? {
            HostResponse::Tabs { tabs } => Ok(tabs.into_iter().map(map_host_tab).collect()),
            other => Err(unexpected(&other)),
        }
    }

    fn create_tabs(&self, window_id: WindowId, urls: Vec<String>) -> Result<(), String> {
        if urls.is_empty() {
            return Ok(());
        }
        self.call_done(HostRequest::CreateTabs {
            window: tabspaces_api::WindowId(window_id.as_u64()),
            urls,
        })
    }

    fn remove_tabs(&self, tab_ids: Vec<TabId>) -> Result<(), String> {
        if tab_ids.is_empty() {
            return Ok(());
        }
        self.call_done(HostRequest::RemoveTabs {
            tabs: tab_ids
                .into_iter()
                .map(|id| tabspaces_api::TabId(id.as_u64()))
                .collect(),
        })
    }

    fn open_page(&self, window_id: WindowId, url: String) -> Result<(), String> {
        self.call_done(HostRequest::OpenPage {
            window: tabspaces_api::WindowId(window_id.as_u64()),
            url,
        })
    }
}

fn map_host_tab(tab: HostTabSnapshot) -> HostTab {
    HostTab {
        id: TabId::from_u64(tab.id.0),
        title: tab.title,
        url: tab.url,
        fav_icon_url: tab.fav_icon_url,
    }
}

fn map_browser_event(event: tabspaces_api::BrowserEvent) -> BrowserEvent {
    match event {
        tabspaces_api::BrowserEvent::WindowCreated { window } => BrowserEvent::WindowCreated {
            window_id: WindowId::from_u64(window.0),
        },
        tabspaces_api::BrowserEvent::WindowRemoved { window } => BrowserEvent::WindowRemoved {
            window_id: WindowId::from_u64(window.0),
        },
        tabspaces_api::BrowserEvent::TabUpdated {
            window,
            tab,
            status,
        } => BrowserEvent::TabUpdated {
            window_id: WindowId::from_u64(window.0),
            tab_id: TabId::from_u64(tab.0),
            status: match status {
                tabspaces_api::TabStatus::Loading => TabStatus::Loading,
                tabspaces_api::TabStatus::Complete => TabStatus::Complete,
            },
        },
        tabspaces_api::BrowserEvent::TabRemoved {
            window,
            tab,
            is_window_closing,
        } => BrowserEvent::TabRemoved {
            window_id: WindowId::from_u64(window.0),
            tab_id: TabId::from_u64(tab.0),
            is_window_closing,
        },
    }
}

pub(crate) async fn host_ws_task(mut socket: WebSocket, bridge: HostBridge, engine: EngineHandle) {
    let (outgoing_tx, mut outgoing_rx) = unbounded_channel::<HostServerMessage>();
    let connection_id = bridge.attach(outgoing_tx);
    tracing::info!(connection_id, "browser host connected");

    // Events are forwarded from a separate task so a busy engine never stalls
    // the responses it is waiting for. The window re-check goes first.
    let (events_tx, mut events_rx) = unbounded_channel::<BrowserEvent>();
    let forwarder = tokio::spawn(async move {
        if engine.host_connected().await.is_err() {
            return;
        }
        while let Some(event) = events_rx.recv().await {
            if engine.browser_event(event).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                let Some(Ok(msg)) = incoming else { break };
                let Message::Text(text) = msg else { continue };
                match serde_json::from_str::<HostClientMessage>(&text) {
                    Ok(HostClientMessage::BrowserEvent { event }) => {
                        if events_tx.send(map_browser_event(event)).is_err() {
                            break;
                        }
                    }
                    Ok(HostClientMessage::HostResponse { request_id, response }) => {
                        bridge.resolve(request_id, response);
                    }
                    Err(err) => {
                        let message = HostServerMessage::Error {
                            message: format!("invalid host message: {err}"),
                        };
                        if socket.send(json_text(&message)).await.is_err() {
                            break;
                        }
                    }
                }
            }
            outgoing = outgoing_rx.recv() => {
                let Some(outgoing) = outgoing else { break };
                if socket.send(json_text(&outgoing)).await.is_err() {
                    break;
                }
            }
        }
    }

    bridge.detach(connection_id);
    drop(events_tx);
    let _ = forwarder.await;
    tracing::info!(connection_id, "browser host disconnected");
}
