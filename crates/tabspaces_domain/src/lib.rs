mod actions;
pub use actions::Action;
mod adapters;
pub use adapters::{BrowserEvent, BrowserEventSink, BrowserHost, KeyValueStore, StoreBatch};
mod effects;
pub use effects::Effect;
mod machine;
pub use machine::{
    AppEvent, AppLifecycle, AppLifecycleState, Machine, TransitionTable, WindowEvent, WindowGuard,
    WindowLifecycle, WindowState,
};
mod reducer;
pub use reducer::{Transition, reduce};
mod repository;
pub use repository::{
    LoadedData, RepositoryError, SETTINGS_KEY, SavedWorkspace, WORKSPACE_IDS_KEY,
    WORKSPACE_LAST_ID_KEY, WorkspaceDraft, WorkspaceRepository, next_workspace_id, workspace_key,
};
mod state;
pub use state::*;
