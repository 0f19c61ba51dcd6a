use crate::{TabId, Theme, WindowId, Workspace, WorkspaceColor, WorkspaceId};

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Effect {
    LoadData,
    CheckOpenedWindows,
    SubscribeEvents,
    RecheckWindows,

    PlanSwap {
        window_id: WindowId,
        workspace_id: WorkspaceId,
        swap_seq: u64,
    },
    ExecuteSwap {
        window_id: WindowId,
        swap_seq: u64,
        urls: Vec<String>,
        tab_ids: Vec<TabId>,
    },
    ArmSwapTimeout {
        window_id: WindowId,
        swap_seq: u64,
    },
    SettleSwap {
        window_id: WindowId,
        swap_seq: u64,
    },

    CreateWorkspace {
        window_id: WindowId,
        name: String,
        color: WorkspaceColor,
    },
    UpdateWorkspace {
        workspace: Workspace,
    },
    PromoteLastSession {
        workspace: Workspace,
    },
    DeleteWorkspace {
        workspace_id: WorkspaceId,
    },
    ScheduleWorkspaceSync {
        window_id: WindowId,
    },
    SyncWorkspaceTabs {
        window_id: WindowId,
        workspace_id: WorkspaceId,
    },
    CountWindowTabs {
        window_id: WindowId,
    },
    OpenPage {
        window_id: WindowId,
        url: String,
    },
    SaveTheme {
        theme: Theme,
    },
}
