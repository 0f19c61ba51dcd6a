use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkspaceId(pub u64);

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowId(pub u64);

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(pub u64);

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkspaceColor {
    Green,
    Blue,
    Orange,
    Purple,
    Yellow,
    Red,
    Gray,
    Cyan,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AppState {
    LoadingApp,
    CheckingForOpenedWindows,
    SubscribingEvents,
    AppLoaded,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WindowStatus {
    Idle,
    NoData,
    OpeningWorkspace,
    WorkspaceInUse,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabSnapshot {
    pub title: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fav_icon_url: Option<String>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceSnapshot {
    pub id: WorkspaceId,
    pub name: String,
    pub color: WorkspaceColor,
    #[serde(default)]
    pub tabs: Vec<TabSnapshot>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowSnapshot {
    pub window_id: WindowId,
    pub state: WindowStatus,
    #[serde(default)]
    pub workspace_id_in_use: Option<WorkspaceId>,
    pub num_tabs: usize,
    pub num_tabs_opening: usize,
    pub num_tabs_closing: usize,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SettingsSnapshot {
    pub theme: Theme,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelSnapshot {
    pub rev: u64,
    pub state: AppState,
    pub workspace_ids: Vec<WorkspaceId>,
    /// Workspaces in index order.
    pub workspaces: Vec<WorkspaceSnapshot>,
    #[serde(default)]
    pub last_session: Option<WorkspaceSnapshot>,
    pub windows: Vec<WindowSnapshot>,
    pub settings: SettingsSnapshot,
}

/// What a popup or new-tab page of one window renders.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowView {
    pub workspace_ids: Vec<WorkspaceId>,
    pub workspaces: Vec<WorkspaceSnapshot>,
    #[serde(default)]
    pub last_session: Option<WorkspaceSnapshot>,
    pub status: WindowSnapshot,
    pub num_tabs: usize,
    pub settings: SettingsSnapshot,
}

impl ModelSnapshot {
    pub fn window(&self, window_id: WindowId) -> Option<&WindowSnapshot> {
        self.windows
            .iter()
            .find(|window| window.window_id == window_id)
    }

    pub fn window_view(&self, window_id: WindowId) -> Option<WindowView> {
        let status = self.window(window_id)?.clone();
        Some(WindowView {
            workspace_ids: self.workspace_ids.clone(),
            workspaces: self.workspaces.clone(),
            last_session: self.last_session.clone(),
            num_tabs: status.num_tabs,
            status,
            settings: self.settings,
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct NewWorkspace {
    pub name: String,
    pub color: WorkspaceColor,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceUpdate {
    /// `0` promotes the last session.
    #[serde(default)]
    pub id: Option<WorkspaceId>,
    pub name: String,
    pub color: WorkspaceColor,
    #[serde(default)]
    pub tabs: Vec<TabSnapshot>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientCommand {
    PopupOpened,
    NewtabOpened,
    UseWorkspace(WorkspaceId),
    CreateWorkspace(NewWorkspace),
    UpdateWorkspace(WorkspaceUpdate),
    DeleteWorkspace(WorkspaceId),
    DisconnectWorkspace,
    OpenChromePage(String),
    ChangeTheme(Theme),
    GetModel,
}

/// The window a UI page lives in. Extra browser fields are ignored.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct WindowRef {
    pub id: WindowId,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ClientRequest {
    #[serde(flatten)]
    pub command: ClientCommand,
    pub window: WindowRef,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    ModelUpdated(Box<ModelSnapshot>),
    InitPopup(Box<ModelSnapshot>),
    InitNewtab(Box<ModelSnapshot>),
    Error { message: String },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TabStatus {
    Loading,
    Complete,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BrowserEvent {
    WindowCreated {
        window: WindowId,
    },
    WindowRemoved {
        window: WindowId,
    },
    TabUpdated {
        window: WindowId,
        tab: TabId,
        status: TabStatus,
    },
    TabRemoved {
        window: WindowId,
        tab: TabId,
        #[serde(default)]
        is_window_closing: bool,
    },
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostTabSnapshot {
    pub id: TabId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fav_icon_url: Option<String>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostRequest {
    ListWindows,
    QueryTabs { window: WindowId },
    CreateTabs { window: WindowId, urls: Vec<String> },
    RemoveTabs { tabs: Vec<TabId> },
    OpenPage { window: WindowId, url: String },
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostResponse {
    Windows { windows: Vec<WindowId> },
    Tabs { tabs: Vec<HostTabSnapshot> },
    Done,
    Failed { message: String },
}

/// Messages the browser host sends over `/api/host`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostClientMessage {
    BrowserEvent {
        event: BrowserEvent,
    },
    HostResponse {
        request_id: u64,
        response: HostResponse,
    },
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostServerMessage {
    HostRequest {
        request_id: u64,
        request: HostRequest,
    },
    Error {
        message: String,
    },
}
