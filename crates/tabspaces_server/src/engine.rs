use anyhow::{Context as _, anyhow};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tabspaces_api::{
    AppState, ClientCommand, ClientRequest, ModelSnapshot, ServerMessage, SettingsSnapshot,
    TabSnapshot, WindowSnapshot, WindowStatus, WorkspaceSnapshot,
};
use tabspaces_domain::{
    Action, AppLifecycleState, BrowserEvent, BrowserEventSink, BrowserHost, Effect, HostTab,
    KeyValueStore, LoadedData, Model, Tab, Theme, WindowId, WindowRuntimeState, WindowState,
    Workspace, WorkspaceColor, WorkspaceDraft, WorkspaceId, WorkspaceRepository, reduce,
};
use tokio::sync::{broadcast, mpsc, oneshot};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct EngineConfig {
    /// How long a swap may wait for tab events before it is forced to settle.
    pub swap_timeout: Duration,
    /// Delay before an edited workspace is re-saved. Zero saves on the first event.
    pub sync_debounce: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            swap_timeout: Duration::from_secs(10),
            sync_debounce: Duration::from_millis(250),
        }
    }
}

#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineCommand>,
}

/// Receiving side of the engine's command channel, handed to [`Engine::start`].
pub struct EngineInbox {
    rx: mpsc::Receiver<EngineCommand>,
}

impl EngineHandle {
    pub fn channel() -> (Self, EngineInbox) {
        let (tx, rx) = mpsc::channel::<EngineCommand>(256);
        (Self { tx }, EngineInbox { rx })
    }

    pub async fn model_snapshot(&self) -> anyhow::Result<ModelSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(EngineCommand::GetModelSnapshot { reply: tx })
            .await
            .context("engine unavailable")?;
        rx.await.context("engine stopped")
    }

    /// Applies a UI command. Returns the reply addressed to the sender, if any.
    pub async fn apply_client_request(
        &self,
        request: ClientRequest,
    ) -> anyhow::Result<Option<ServerMessage>> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(EngineCommand::ApplyClientRequest { request, reply: tx })
            .await
            .context("engine unavailable")?;
        rx.await.context("engine stopped")
    }

    pub async fn browser_event(&self, event: BrowserEvent) -> anyhow::Result<()> {
        self.dispatch(event.into()).await
    }

    /// Reconciles the tracked windows after a browser host (re)attaches.
    pub async fn host_connected(&self) -> anyhow::Result<()> {
        self.dispatch(Action::HostConnected).await
    }

    async fn dispatch(&self, action: Action) -> anyhow::Result<()> {
        self.tx
            .send(EngineCommand::Dispatch {
                action: Box::new(action),
            })
            .await
            .context("engine unavailable")
    }

    /// A sink for hosts that report events from plain threads.
    pub fn event_sink(&self) -> BrowserEventSink {
        let tx = self.tx.clone();
        Arc::new(move |event: BrowserEvent| {
            let cmd = EngineCommand::Dispatch {
                action: Box::new(event.into()),
            };
            if tx.blocking_send(cmd).is_err() {
                tracing::debug!("engine stopped, dropping browser event");
            }
        })
    }
}

enum EngineCommand {
    GetModelSnapshot {
        reply: oneshot::Sender<ModelSnapshot>,
    },
    ApplyClientRequest {
        request: ClientRequest,
        reply: oneshot::Sender<Option<ServerMessage>>,
    },
    Dispatch {
        action: Box<Action>,
    },
}

pub struct Engine {
    model: Arc<Model>,
    rev: u64,
    repository: WorkspaceRepository,
    host: Arc<dyn BrowserHost>,
    events: broadcast::Sender<ServerMessage>,
    tx: mpsc::Sender<EngineCommand>,
    config: EngineConfig,
}

impl Engine {
    pub fn start(
        handle: &EngineHandle,
        inbox: EngineInbox,
        store: Arc<dyn KeyValueStore>,
        host: Arc<dyn BrowserHost>,
        config: EngineConfig,
    ) -> broadcast::Sender<ServerMessage> {
        let (events, _) = broadcast::channel::<ServerMessage>(256);

        let mut engine = Self {
            model: Arc::new(Model::new()),
            rev: 0,
            repository: WorkspaceRepository::new(store),
            host,
            events: events.clone(),
            tx: handle.tx.clone(),
            config,
        };

        let EngineInbox { mut rx } = inbox;
        tokio::spawn(async move {
            engine.bootstrap().await;
            while let Some(cmd) = rx.recv().await {
                engine.handle(cmd).await;
            }
        });

        events
    }

    async fn bootstrap(&mut self) {
        self.process_action_queue(Action::AppStarted).await;
        tracing::info!(
            workspaces = self.model.workspace_ids.len(),
            windows = self.model.windows.len(),
            "engine loaded"
        );
    }

    async fn handle(&mut self, cmd: EngineCommand) {
        match cmd {
            EngineCommand::GetModelSnapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            EngineCommand::ApplyClientRequest { request, reply } => {
                let out = self.apply_client_request(request).await;
                let _ = reply.send(out);
            }
            EngineCommand::Dispatch { action } => {
                self.process_action_queue(*action).await;
            }
        }
    }

    async fn apply_client_request(&mut self, request: ClientRequest) -> Option<ServerMessage> {
        let window_id = WindowId::from_u64(request.window.id.0);
        let action = match request.command {
            ClientCommand::PopupOpened => {
                return self
                    .model
                    .is_loaded()
                    .then(|| ServerMessage::InitPopup(Box::new(self.snapshot())));
            }
            ClientCommand::NewtabOpened => {
                return self
                    .model
                    .is_loaded()
                    .then(|| ServerMessage::InitNewtab(Box::new(self.snapshot())));
            }
            ClientCommand::GetModel => {
                if self.model.is_loaded() {
                    self.publish_model();
                }
                return None;
            }
            ClientCommand::UseWorkspace(id) => Action::UseWorkspace {
                window_id,
                workspace_id: WorkspaceId::from_u64(id.0),
            },
            ClientCommand::CreateWorkspace(new) => Action::CreateWorkspace {
                window_id,
                name: new.name,
                color: map_api_color(new.color),
            },
            ClientCommand::UpdateWorkspace(update) => {
                let Some(id) = update.id else {
                    return Some(ServerMessage::Error {
                        message: "update_workspace requires an id".to_owned(),
                    });
                };
                Action::UpdateWorkspace {
                    window_id,
                    workspace: Workspace {
                        id: WorkspaceId::from_u64(id.0),
                        name: update.name,
                        color: map_api_color(update.color),
                        tabs: update.tabs.into_iter().map(map_api_tab).collect(),
                    },
                }
            }
            ClientCommand::DeleteWorkspace(id) => Action::DeleteWorkspace {
                window_id,
                workspace_id: WorkspaceId::from_u64(id.0),
            },
            ClientCommand::DisconnectWorkspace => Action::DisconnectWorkspace { window_id },
            ClientCommand::OpenChromePage(url) => Action::OpenPage { window_id, url },
            ClientCommand::ChangeTheme(theme) => Action::ChangeTheme {
                theme: map_api_theme(theme),
            },
        };
        self.process_action_queue(action).await;
        None
    }

    async fn process_action_queue(&mut self, initial: Action) {
        let mut actions = VecDeque::from([initial]);
        let mut effects = VecDeque::<Effect>::new();

        while let Some(action) = actions.pop_front() {
            let described = tracing::enabled!(tracing::Level::DEBUG).then(|| format!("{action:?}"));
            let transition = reduce(&self.model, action);
            if transition.is_unchanged(&self.model) && transition.effects.is_empty() {
                if let Some(action) = described {
                    tracing::debug!(action, "action ignored");
                }
            }
            effects.extend(transition.effects);
            self.set_model(transition.model);

            while let Some(effect) = effects.pop_front() {
                match self.run_effect(effect).await {
                    Ok(mut followups) => actions.append(&mut followups),
                    Err(err) => {
                        tracing::warn!(error = %format!("{err:#}"), "effect failed");
                    }
                }
            }
        }
    }

    fn set_model(&mut self, next: Arc<Model>) {
        if Arc::ptr_eq(&self.model, &next) {
            return;
        }
        self.model = next;
        self.rev = self.rev.saturating_add(1);
        if self.model.is_loaded() {
            self.publish_model();
        }
    }

    fn publish_model(&self) {
        let _ = self
            .events
            .send(ServerMessage::ModelUpdated(Box::new(self.snapshot())));
    }

    fn dispatch_later(&self, delay: Duration, action: Action) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx
                .send(EngineCommand::Dispatch {
                    action: Box::new(action),
                })
                .await;
        });
    }

    async fn run_effect(&mut self, effect: Effect) -> anyhow::Result<VecDeque<Action>> {
        match effect {
            Effect::LoadData => {
                let repository = self.repository.clone();
                let loaded =
                    blocking("load data", move || repository.load_all().map_err(|e| e.to_string()))
                        .await;
                let data = loaded.unwrap_or_else(|message| {
                    tracing::warn!(error = %message, "failed to load workspaces, starting empty");
                    LoadedData::default()
                });
                Ok(VecDeque::from([Action::DataLoaded {
                    workspaces: data.workspaces,
                    workspace_ids: data.workspace_ids,
                    settings: data.settings,
                }]))
            }
            Effect::CheckOpenedWindows => {
                let windows = list_open_windows(self.host.clone()).await.unwrap_or_else(|message| {
                    tracing::warn!(error = %message, "failed to list open windows");
                    Vec::new()
                });
                Ok(VecDeque::from([Action::OpenedWindowsChecked { windows }]))
            }
            Effect::RecheckWindows => match list_open_windows(self.host.clone()).await {
                Ok(windows) => Ok(VecDeque::from([Action::WindowsRechecked { windows }])),
                Err(message) => {
                    tracing::warn!(error = %message, "failed to re-check open windows");
                    Ok(VecDeque::new())
                }
            },
            Effect::SubscribeEvents => Ok(VecDeque::from([Action::SubscribedToEvents])),

            Effect::PlanSwap {
                window_id,
                workspace_id,
                swap_seq,
            } => {
                let cached = if workspace_id.is_last_session() {
                    self.model.last_session().map(|workspace| (**workspace).clone())
                } else {
                    None
                };
                let repository = self.repository.clone();
                let host = self.host.clone();
                let planned = blocking("plan swap", move || {
                    let workspace = match cached {
                        Some(workspace) => workspace,
                        None => repository
                            .get(workspace_id)
                            .map_err(|e| e.to_string())?
                            .ok_or_else(|| {
                                format!("workspace {} not found", workspace_id.as_u64())
                            })?,
                    };
                    let current_tabs = host.query_tabs(window_id)?;
                    Ok((workspace, current_tabs))
                })
                .await;
                let action = match planned {
                    Ok((workspace, current_tabs)) => Action::SwapPlanned {
                        window_id,
                        swap_seq,
                        workspace,
                        current_tabs,
                    },
                    Err(message) => {
                        tracing::warn!(
                            window_id = window_id.as_u64(),
                            error = %message,
                            "swap aborted"
                        );
                        Action::SwapPlanFailed {
                            window_id,
                            swap_seq,
                            message,
                        }
                    }
                };
                Ok(VecDeque::from([action]))
            }
            Effect::ExecuteSwap {
                window_id,
                swap_seq,
                urls,
                tab_ids,
            } => {
                let host = self.host.clone();
                let executed = blocking("execute swap", move || {
                    host.create_tabs(window_id, urls)
                        .map_err(|message| format!("create tabs: {message}"))?;
                    host.remove_tabs(tab_ids)
                        .map_err(|message| format!("remove tabs: {message}"))
                })
                .await;
                let Err(message) = executed else {
                    return Ok(VecDeque::new());
                };
                tracing::warn!(
                    window_id = window_id.as_u64(),
                    error = %message,
                    "swap aborted"
                );
                Ok(VecDeque::from([Action::SwapPlanFailed {
                    window_id,
                    swap_seq,
                    message,
                }]))
            }
            Effect::ArmSwapTimeout {
                window_id,
                swap_seq,
            } => {
                self.dispatch_later(
                    self.config.swap_timeout,
                    Action::SwapTimedOut {
                        window_id,
                        swap_seq,
                    },
                );
                Ok(VecDeque::new())
            }
            Effect::SettleSwap {
                window_id,
                swap_seq,
            } => {
                let host = self.host.clone();
                let counted = blocking("settle swap", move || host.query_tabs(window_id)).await;
                let num_tabs = match counted {
                    Ok(tabs) => Some(tabs.len()),
                    Err(message) => {
                        tracing::warn!(
                            window_id = window_id.as_u64(),
                            error = %message,
                            "failed to re-query tabs after swap"
                        );
                        None
                    }
                };
                Ok(VecDeque::from([Action::SwapSettled {
                    window_id,
                    swap_seq,
                    num_tabs,
                }]))
            }

            Effect::CreateWorkspace {
                window_id,
                name,
                color,
            } => {
                let repository = self.repository.clone();
                let host = self.host.clone();
                let (saved, num_tabs) = blocking("create workspace", move || {
                    let tabs = host.query_tabs(window_id)?;
                    let num_tabs = tabs.len();
                    let saved = repository
                        .save(
                            WorkspaceDraft {
                                id: None,
                                name,
                                color,
                            },
                            tabs.iter().map(HostTab::to_tab).collect(),
                        )
                        .map_err(|e| e.to_string())?;
                    Ok((saved, num_tabs))
                })
                .await
                .map_err(|message| anyhow!(message))
                .context("failed to create workspace")?;
                Ok(VecDeque::from([Action::WorkspaceCreated {
                    window_id,
                    workspace: saved.workspace,
                    workspace_ids: saved.workspace_ids,
                    num_tabs,
                }]))
            }
            Effect::UpdateWorkspace { workspace } => {
                let repository = self.repository.clone();
                let id = workspace.id;
                let workspace = blocking("update workspace", move || {
                    repository.update(workspace).map_err(|e| e.to_string())
                })
                .await
                .map_err(|message| anyhow!(message))
                .with_context(|| format!("failed to update workspace {}", id.as_u64()))?;
                Ok(VecDeque::from([Action::WorkspaceUpdated { workspace }]))
            }
            Effect::PromoteLastSession { workspace } => {
                let repository = self.repository.clone();
                let saved = blocking("promote last session", move || {
                    repository
                        .save(
                            WorkspaceDraft {
                                id: None,
                                name: workspace.name,
                                color: workspace.color,
                            },
                            workspace.tabs,
                        )
                        .map_err(|e| e.to_string())
                })
                .await
                .map_err(|message| anyhow!(message))
                .context("failed to save last session")?;
                Ok(VecDeque::from([Action::LastSessionPromoted {
                    workspace: saved.workspace,
                    workspace_ids: saved.workspace_ids,
                }]))
            }
            Effect::DeleteWorkspace { workspace_id } => {
                let repository = self.repository.clone();
                let workspace_ids = blocking("delete workspace", move || {
                    repository.remove(workspace_id).map_err(|e| e.to_string())
                })
                .await
                .map_err(|message| anyhow!(message))
                .with_context(|| format!("failed to delete workspace {}", workspace_id.as_u64()))?;
                Ok(VecDeque::from([Action::WorkspaceDeleted {
                    workspace_id,
                    workspace_ids,
                }]))
            }
            Effect::ScheduleWorkspaceSync { window_id } => {
                let due = Action::WorkspaceSyncDue { window_id };
                if self.config.sync_debounce.is_zero() {
                    return Ok(VecDeque::from([due]));
                }
                self.dispatch_later(self.config.sync_debounce, due);
                Ok(VecDeque::new())
            }
            Effect::SyncWorkspaceTabs {
                window_id,
                workspace_id,
            } => {
                let Some(current) = self.model.workspace(workspace_id).map(|w| (**w).clone()) else {
                    return Ok(VecDeque::new());
                };
                let repository = self.repository.clone();
                let host = self.host.clone();
                let (workspace, num_tabs) = blocking("sync workspace", move || {
                    let tabs = host.query_tabs(window_id)?;
                    let num_tabs = tabs.len();
                    let workspace = Workspace {
                        tabs: tabs.iter().map(HostTab::to_tab).collect(),
                        ..current
                    };
                    if !workspace.id.is_last_session() {
                        repository
                            .update(workspace.clone())
                            .map_err(|e| e.to_string())?;
                    }
                    Ok((workspace, num_tabs))
                })
                .await
                .map_err(|message| anyhow!(message))
                .with_context(|| format!("failed to sync workspace {}", workspace_id.as_u64()))?;
                Ok(VecDeque::from([Action::WorkspaceTabsSynced {
                    window_id,
                    workspace,
                    num_tabs,
                }]))
            }
            Effect::CountWindowTabs { window_id } => {
                let host = self.host.clone();
                match blocking("count tabs", move || host.query_tabs(window_id)).await {
                    Ok(tabs) => Ok(VecDeque::from([Action::WindowTabsCounted {
                        window_id,
                        num_tabs: tabs.len(),
                    }])),
                    Err(message) => {
                        tracing::debug!(
                            window_id = window_id.as_u64(),
                            error = %message,
                            "failed to count tabs"
                        );
                        Ok(VecDeque::new())
                    }
                }
            }
            Effect::OpenPage { window_id, url } => {
                let host = self.host.clone();
                blocking("open page", move || host.open_page(window_id, url))
                    .await
                    .map_err(|message| anyhow!(message))
                    .context("failed to open page")?;
                Ok(VecDeque::new())
            }
            Effect::SaveTheme { theme } => {
                let repository = self.repository.clone();
                let settings = blocking("save theme", move || {
                    repository.set_theme(theme).map_err(|e| e.to_string())
                })
                .await
                .map_err(|message| anyhow!(message))
                .context("failed to save theme")?;
                Ok(VecDeque::from([Action::SettingsSaved { settings }]))
            }
        }
    }

    fn snapshot(&self) -> ModelSnapshot {
        let model = &self.model;
        ModelSnapshot {
            rev: self.rev,
            state: map_app_state(model.app_state()),
            workspace_ids: model
                .workspace_ids
                .iter()
                .map(|id| tabspaces_api::WorkspaceId(id.as_u64()))
                .collect(),
            workspaces: model.workspaces().map(|w| map_workspace(w)).collect(),
            last_session: model.last_session().map(|w| map_workspace(w)),
            windows: model.windows.values().map(map_window).collect(),
            settings: SettingsSnapshot {
                theme: map_theme(model.settings.theme),
            },
        }
    }
}

async fn blocking<T, F>(label: &'static str, f: F) -> Result<T, String>
where
    F: FnOnce() -> Result<T, String> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .ok()
        .unwrap_or_else(|| Err(format!("failed to join {label} task")))
}

/// Every open window with its tab count. A window whose tabs cannot be
/// queried is reported with zero tabs.
async fn list_open_windows(host: Arc<dyn BrowserHost>) -> Result<Vec<(WindowId, usize)>, String> {
    blocking("list windows", move || {
        let mut windows = Vec::new();
        for window_id in host.list_windows()? {
            let num_tabs = host.query_tabs(window_id).map(|tabs| tabs.len()).unwrap_or(0);
            windows.push((window_id, num_tabs));
        }
        Ok(windows)
    })
    .await
}

fn map_app_state(state: AppLifecycleState) -> AppState {
    match state {
        AppLifecycleState::LoadingApp => AppState::LoadingApp,
        AppLifecycleState::CheckingForOpenedWindows => AppState::CheckingForOpenedWindows,
        AppLifecycleState::SubscribingEvents => AppState::SubscribingEvents,
        AppLifecycleState::AppLoaded => AppState::AppLoaded,
    }
}

fn map_window_state(state: WindowState) -> WindowStatus {
    match state {
        WindowState::Idle => WindowStatus::Idle,
        WindowState::NoData => WindowStatus::NoData,
        WindowState::OpeningWorkspace => WindowStatus::OpeningWorkspace,
        WindowState::WorkspaceInUse => WindowStatus::WorkspaceInUse,
    }
}

fn map_window(window: &WindowRuntimeState) -> WindowSnapshot {
    WindowSnapshot {
        window_id: tabspaces_api::WindowId(window.window_id.as_u64()),
        state: map_window_state(window.machine.current()),
        workspace_id_in_use: window
            .workspace_id_in_use
            .map(|id| tabspaces_api::WorkspaceId(id.as_u64())),
        num_tabs: window.num_tabs,
        num_tabs_opening: window.num_tabs_opening,
        num_tabs_closing: window.num_tabs_closing,
    }
}

fn map_workspace(workspace: &Workspace) -> WorkspaceSnapshot {
    WorkspaceSnapshot {
        id: tabspaces_api::WorkspaceId(workspace.id.as_u64()),
        name: workspace.name.clone(),
        color: map_color(workspace.color),
        tabs: workspace
            .tabs
            .iter()
            .map(|tab| TabSnapshot {
                title: tab.title.clone(),
                url: tab.url.clone(),
                fav_icon_url: tab.fav_icon_url.clone(),
            })
            .collect(),
    }
}

fn map_color(color: WorkspaceColor) -> tabspaces_api::WorkspaceColor {
    match color {
        WorkspaceColor::Green => tabspaces_api::WorkspaceColor::Green,
        WorkspaceColor::Blue => tabspaces_api::WorkspaceColor::Blue,
        WorkspaceColor::Orange => tabspaces_api::WorkspaceColor::Orange,
        WorkspaceColor::Purple => tabspaces_api::WorkspaceColor::Purple,
        WorkspaceColor::Yellow => tabspaces_api::WorkspaceColor::Yellow,
        WorkspaceColor::Red => tabspaces_api::WorkspaceColor::Red,
        WorkspaceColor::Gray => tabspaces_api::WorkspaceColor::Gray,
        WorkspaceColor::Cyan => tabspaces_api::WorkspaceColor::Cyan,
    }
}

fn map_api_color(color: tabspaces_api::WorkspaceColor) -> WorkspaceColor {
    match color {
        tabspaces_api::WorkspaceColor::Green => WorkspaceColor::Green,
        tabspaces_api::WorkspaceColor::Blue => WorkspaceColor::Blue,
        tabspaces_api::WorkspaceColor::Orange => WorkspaceColor::Orange,
        tabspaces_api::WorkspaceColor::Purple => WorkspaceColor::Purple,
        tabspaces_api::WorkspaceColor::Yellow => WorkspaceColor::Yellow,
        tabspaces_api::WorkspaceColor::Red => WorkspaceColor::Red,
        tabspaces_api::WorkspaceColor::Gray => WorkspaceColor::Gray,
        tabspaces_api::WorkspaceColor::Cyan => WorkspaceColor::Cyan,
    }
}

fn map_theme(theme: Theme) -> tabspaces_api::Theme {
    match theme {
        Theme::Light => tabspaces_api::Theme::Light,
        Theme::Dark => tabspaces_api::Theme::Dark,
    }
}

fn map_api_theme(theme: tabspaces_api::Theme) -> Theme {
    match theme {
        tabspaces_api::Theme::Light => Theme::Light,
        tabspaces_api::Theme::Dark => Theme::Dark,
    }
}

fn map_api_tab(tab: TabSnapshot) -> Tab {
    Tab {
        title: tab.title,
        url: tab.url,
        fav_icon_url: tab.fav_icon_url,
    }
}
