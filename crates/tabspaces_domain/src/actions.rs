use crate::{
    BrowserEvent, HostTab, Settings, TabId, TabStatus, Theme, WindowId, Workspace, WorkspaceColor,
    WorkspaceId,
};

#[derive(Clone, Debug)]
pub enum Action {
    AppStarted,
    DataLoaded {
        workspaces: Vec<Workspace>,
        workspace_ids: Vec<WorkspaceId>,
        settings: Settings,
    },
    OpenedWindowsChecked {
        windows: Vec<(WindowId, usize)>,
    },
    SubscribedToEvents,
    /// The browser host (re)attached; its window list may have moved on.
    HostConnected,
    WindowsRechecked {
        windows: Vec<(WindowId, usize)>,
    },

    UseWorkspace {
        window_id: WindowId,
        workspace_id: WorkspaceId,
    },
    CreateWorkspace {
        window_id: WindowId,
        name: String,
        color: WorkspaceColor,
    },
    UpdateWorkspace {
        window_id: WindowId,
        workspace: Workspace,
    },
    DeleteWorkspace {
        window_id: WindowId,
        workspace_id: WorkspaceId,
    },
    DisconnectWorkspace {
        window_id: WindowId,
    },
    OpenPage {
        window_id: WindowId,
        url: String,
    },
    ChangeTheme {
        theme: Theme,
    },

    WindowCreated {
        window_id: WindowId,
    },
    WindowRemoved {
        window_id: WindowId,
    },
    TabUpdated {
        window_id: WindowId,
        tab_id: TabId,
        status: TabStatus,
    },
    TabRemoved {
        window_id: WindowId,
        tab_id: TabId,
        is_window_closing: bool,
    },

    SwapPlanned {
        window_id: WindowId,
        swap_seq: u64,
        workspace: Workspace,
        current_tabs: Vec<HostTab>,
    },
    SwapPlanFailed {
        window_id: WindowId,
        swap_seq: u64,
        message: String,
    },
    SwapTimedOut {
        window_id: WindowId,
        swap_seq: u64,
    },
    SwapSettled {
        window_id: WindowId,
        swap_seq: u64,
        num_tabs: Option<usize>,
    },
    WorkspaceCreated {
        window_id: WindowId,
        workspace: Workspace,
        workspace_ids: Vec<WorkspaceId>,
        num_tabs: usize,
    },
    WorkspaceUpdated {
        workspace: Workspace,
    },
    LastSessionPromoted {
        workspace: Workspace,
        workspace_ids: Vec<WorkspaceId>,
    },
    WorkspaceDeleted {
        workspace_id: WorkspaceId,
        workspace_ids: Vec<WorkspaceId>,
    },
    WorkspaceSyncDue {
        window_id: WindowId,
    },
    WorkspaceTabsSynced {
        window_id: WindowId,
        workspace: Workspace,
        num_tabs: usize,
    },
    WindowTabsCounted {
        window_id: WindowId,
        num_tabs: usize,
    },
    SettingsSaved {
        settings: Settings,
    },
}

impl From<BrowserEvent> for Action {
    fn from(event: BrowserEvent) -> Self {
        match event {
            BrowserEvent::WindowCreated { window_id } => Self::WindowCreated { window_id },
            BrowserEvent::WindowRemoved { window_id } => Self::WindowRemoved { window_id },
            BrowserEvent::TabUpdated {
                window_id,
                tab_id,
                status,
            } => Self::TabUpdated {
                window_id,
                tab_id,
                status,
            },
            BrowserEvent::TabRemoved {
                window_id,
                tab_id,
                is_window_closing,
            } => Self::TabRemoved {
                window_id,
                tab_id,
                is_window_closing,
            },
        }
    }
}
