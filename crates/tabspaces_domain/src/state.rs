use crate::machine::{AppLifecycle, AppLifecycleState, Machine, WindowGuard, WindowLifecycle};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkspaceId(pub(crate) u64);

impl WorkspaceId {
    /// Slot holding the tabs a window had before its first swap. Never persisted.
    pub const LAST_SESSION: Self = Self(0);

    pub fn as_u64(self) -> u64 {
        self.0
    }

    pub fn from_u64(id: u64) -> Self {
        Self(id)
    }

    pub fn is_last_session(self) -> bool {
        self == Self::LAST_SESSION
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct WindowId(pub(crate) u64);

impl WindowId {
    pub fn as_u64(self) -> u64 {
        self.0
    }

    pub fn from_u64(id: u64) -> Self {
        Self(id)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TabId(pub(crate) u64);

impl TabId {
    pub fn as_u64(self) -> u64 {
        self.0
    }

    pub fn from_u64(id: u64) -> Self {
        Self(id)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
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

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    #[default]
    Dark,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub theme: Theme,
}

/// A tab as stored inside a workspace record.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Tab {
    pub title: String,
    pub url: String,
    #[serde(rename = "favIconUrl", default, skip_serializing_if = "Option::is_none")]
    pub fav_icon_url: Option<String>,
}

/// A live tab reported by the browser.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HostTab {
    pub id: TabId,
    pub title: String,
    pub url: String,
    pub fav_icon_url: Option<String>,
}

impl HostTab {
    pub fn to_tab(&self) -> Tab {
        Tab {
            title: self.title.clone(),
            url: self.url.clone(),
            fav_icon_url: self.fav_icon_url.clone(),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TabStatus {
    Loading,
    Complete,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: WorkspaceId,
    pub name: String,
    pub color: WorkspaceColor,
    #[serde(default)]
    pub tabs: Vec<Tab>,
}

impl Workspace {
    pub fn last_session(tabs: Vec<Tab>) -> Self {
        Self {
            id: WorkspaceId::LAST_SESSION,
            name: "Last session".to_owned(),
            color: WorkspaceColor::Gray,
            tabs,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct WindowRuntimeState {
    pub window_id: WindowId,
    pub machine: Machine<WindowLifecycle>,
    pub workspace_id_in_use: Option<WorkspaceId>,
    pub pending_workspace_id: Option<WorkspaceId>,
    pub num_tabs: usize,
    pub num_tabs_opening: usize,
    pub num_tabs_closing: usize,
    pub swap_seq: u64,
    pub sync_pending: bool,
}

impl WindowRuntimeState {
    pub fn new(window_id: WindowId, has_workspaces: bool, num_tabs: usize) -> Self {
        Self {
            window_id,
            machine: Machine::from_state(WindowLifecycle::resting_state(has_workspaces)),
            workspace_id_in_use: None,
            pending_workspace_id: None,
            num_tabs,
            num_tabs_opening: 0,
            num_tabs_closing: 0,
            swap_seq: 0,
            sync_pending: false,
        }
    }

    pub fn guard(&self, has_workspaces: bool) -> WindowGuard {
        WindowGuard {
            attached: self.workspace_id_in_use.is_some(),
            has_workspaces,
        }
    }

    pub fn is_quiescent(&self) -> bool {
        self.num_tabs_opening == 0 && self.num_tabs_closing == 0
    }
}

/// Immutable snapshot of everything the UIs render. Transitions either return
/// the same `Arc` (nothing changed) or a fresh one.
#[derive(Clone, Debug)]
pub struct Model {
    pub app: Machine<AppLifecycle>,
    pub workspaces_by_id: Arc<BTreeMap<WorkspaceId, Arc<Workspace>>>,
    pub workspace_ids: Arc<Vec<WorkspaceId>>,
    pub windows: Arc<BTreeMap<WindowId, WindowRuntimeState>>,
    pub settings: Arc<Settings>,
}

impl Model {
    pub fn new() -> Self {
        Self {
            app: Machine::new(),
            workspaces_by_id: Arc::new(BTreeMap::new()),
            workspace_ids: Arc::new(Vec::new()),
            windows: Arc::new(BTreeMap::new()),
            settings: Arc::new(Settings::default()),
        }
    }

    pub fn app_state(&self) -> AppLifecycleState {
        self.app.current()
    }

    pub fn is_loaded(&self) -> bool {
        self.app_state() == AppLifecycleState::AppLoaded
    }

    pub fn has_workspaces(&self) -> bool {
        !self.workspace_ids.is_empty()
    }

    pub fn workspace(&self, id: WorkspaceId) -> Option<&Arc<Workspace>> {
        self.workspaces_by_id.get(&id)
    }

    pub fn last_session(&self) -> Option<&Arc<Workspace>> {
        self.workspace(WorkspaceId::LAST_SESSION)
    }

    /// Workspaces in index order.
    pub fn workspaces(&self) -> impl Iterator<Item = &Arc<Workspace>> {
        self.workspace_ids
            .iter()
            .filter_map(|id| self.workspaces_by_id.get(id))
    }

    pub fn window(&self, id: WindowId) -> Option<&WindowRuntimeState> {
        self.windows.get(&id)
    }
}

impl Default for Model {
    fn default() -> Self {
        Self::new()
    }
}
