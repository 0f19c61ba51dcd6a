use crate::machine::{AppEvent, Machine, WindowEvent, WindowGuard, WindowLifecycle, WindowState};
use crate::{
    Action, Effect, HostTab, Model, TabStatus, WindowId, WindowRuntimeState, Workspace, WorkspaceId,
};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Result of applying one action: the next model (the same `Arc` when nothing
/// changed) and the effects to run, in order.
#[derive(Debug)]
pub struct Transition {
    pub model: Arc<Model>,
    pub effects: Vec<Effect>,
}

impl Transition {
    fn unchanged(model: &Arc<Model>) -> Self {
        Self {
            model: model.clone(),
            effects: Vec::new(),
        }
    }

    fn effects_only(model: &Arc<Model>, effects: Vec<Effect>) -> Self {
        Self {
            model: model.clone(),
            effects,
        }
    }

    fn changed(model: Model, effects: Vec<Effect>) -> Self {
        Self {
            model: Arc::new(model),
            effects,
        }
    }

    pub fn is_unchanged(&self, previous: &Arc<Model>) -> bool {
        Arc::ptr_eq(&self.model, previous)
    }
}

pub fn reduce(model: &Arc<Model>, action: Action) -> Transition {
    match action {
        Action::AppStarted => {
            if model.app.can(AppEvent::DataLoaded, &()) {
                Transition::effects_only(model, vec![Effect::LoadData])
            } else {
                Transition::unchanged(model)
            }
        }
        Action::DataLoaded {
            workspaces,
            workspace_ids,
            settings,
        } => {
            let mut next = (**model).clone();
            if !next.app.send(AppEvent::DataLoaded, &()) {
                return Transition::unchanged(model);
            }
            let by_id = workspaces
                .into_iter()
                .filter(|workspace| !workspace.id.is_last_session())
                .map(|workspace| (workspace.id, Arc::new(workspace)))
                .collect::<BTreeMap<_, _>>();
            let ids = index_of_known(&workspace_ids, &by_id);
            let by_id = by_id
                .into_iter()
                .filter(|(id, _)| ids.contains(id))
                .collect();
            next.workspaces_by_id = Arc::new(by_id);
            next.workspace_ids = Arc::new(ids);
            next.settings = Arc::new(settings);
            Transition::changed(next, vec![Effect::CheckOpenedWindows])
        }
        Action::OpenedWindowsChecked { windows } => {
            let mut next = (**model).clone();
            if !next.app.send(AppEvent::CheckCompleted, &()) {
                return Transition::unchanged(model);
            }
            let has_workspaces = next.has_workspaces();
            let map = Arc::make_mut(&mut next.windows);
            for (window_id, num_tabs) in windows {
                map.entry(window_id)
                    .or_insert_with(|| WindowRuntimeState::new(window_id, has_workspaces, num_tabs));
            }
            Transition::changed(next, vec![Effect::SubscribeEvents])
        }
        Action::SubscribedToEvents => {
            let mut next = (**model).clone();
            if !next.app.send(AppEvent::SubscribedToEvents, &()) {
                return Transition::unchanged(model);
            }
            Transition::changed(next, Vec::new())
        }
        Action::HostConnected => Transition::effects_only(model, vec![Effect::RecheckWindows]),
        Action::WindowsRechecked { windows } => windows_rechecked(model, windows),

        Action::UseWorkspace {
            window_id,
            workspace_id,
        } => use_workspace(model, window_id, workspace_id),
        Action::CreateWorkspace {
            window_id,
            name,
            color,
        } => {
            let Some(window) = model.window(window_id) else {
                return Transition::unchanged(model);
            };
            if !window
                .machine
                .can(WindowEvent::Create, &window.guard(model.has_workspaces()))
            {
                return Transition::unchanged(model);
            }
            Transition::effects_only(
                model,
                vec![Effect::CreateWorkspace {
                    window_id,
                    name,
                    color,
                }],
            )
        }
        Action::UpdateWorkspace {
            window_id,
            workspace,
        } => {
            let Some(window) = model.window(window_id) else {
                return Transition::unchanged(model);
            };
            if !window
                .machine
                .can(WindowEvent::Update, &window.guard(model.has_workspaces()))
            {
                return Transition::unchanged(model);
            }
            if workspace.id.is_last_session() {
                if model.last_session().is_none() {
                    return Transition::unchanged(model);
                }
                return Transition::effects_only(model, vec![Effect::PromoteLastSession { workspace }]);
            }
            if !model.workspace_ids.contains(&workspace.id) {
                return Transition::unchanged(model);
            }
            Transition::effects_only(model, vec![Effect::UpdateWorkspace { workspace }])
        }
        Action::DeleteWorkspace {
            window_id,
            workspace_id,
        } => {
            let Some(window) = model.window(window_id) else {
                return Transition::unchanged(model);
            };
            let available = window
                .machine
                .can(WindowEvent::Delete, &window.guard(model.has_workspaces()));
            if !available || !model.workspace_ids.contains(&workspace_id) {
                return Transition::unchanged(model);
            }
            Transition::effects_only(model, vec![Effect::DeleteWorkspace { workspace_id }])
        }
        Action::DisconnectWorkspace { window_id } => {
            let Some(window) = model.window(window_id) else {
                return Transition::unchanged(model);
            };
            let mut window = *window;
            if !window
                .machine
                .send(WindowEvent::Disconnect, &window.guard(model.has_workspaces()))
            {
                return Transition::unchanged(model);
            }
            window.workspace_id_in_use = None;
            window.sync_pending = false;
            replace_window(model, window, Vec::new())
        }
        Action::OpenPage { window_id, url } => {
            Transition::effects_only(model, vec![Effect::OpenPage { window_id, url }])
        }
        Action::ChangeTheme { theme } => {
            Transition::effects_only(model, vec![Effect::SaveTheme { theme }])
        }

        Action::WindowCreated { window_id } => {
            if model.window(window_id).is_some() {
                return Transition::unchanged(model);
            }
            let window = WindowRuntimeState::new(window_id, model.has_workspaces(), 0);
            replace_window(model, window, vec![Effect::CountWindowTabs { window_id }])
        }
        Action::WindowRemoved { window_id } => {
            if model.window(window_id).is_none() {
                return Transition::unchanged(model);
            }
            let mut next = (**model).clone();
            Arc::make_mut(&mut next.windows).remove(&window_id);
            Transition::changed(next, Vec::new())
        }
        Action::TabUpdated {
            window_id, status, ..
        } => {
            if status != TabStatus::Complete {
                return Transition::unchanged(model);
            }
            tab_changed(model, window_id, SwapCounter::Opening)
        }
        Action::TabRemoved {
            window_id,
            is_window_closing,
            ..
        } => {
            if is_window_closing {
                return Transition::unchanged(model);
            }
            tab_changed(model, window_id, SwapCounter::Closing)
        }

        Action::SwapPlanned {
            window_id,
            swap_seq,
            workspace,
            current_tabs,
        } => swap_planned(model, window_id, swap_seq, workspace, current_tabs),
        Action::SwapPlanFailed {
            window_id,
            swap_seq,
            ..
        } => {
            let Some(window) = in_flight_swap(model, window_id, swap_seq) else {
                return Transition::unchanged(model);
            };
            let mut window = *window;
            let guard = window.guard(model.has_workspaces());
            window.machine.send(WindowEvent::SwapAborted, &guard);
            window.pending_workspace_id = None;
            window.num_tabs_opening = 0;
            window.num_tabs_closing = 0;
            replace_window(model, window, Vec::new())
        }
        Action::SwapTimedOut {
            window_id,
            swap_seq,
        } => {
            let Some(window) = in_flight_swap(model, window_id, swap_seq) else {
                return Transition::unchanged(model);
            };
            if window.is_quiescent() {
                return Transition::unchanged(model);
            }
            let mut window = *window;
            window.num_tabs_opening = 0;
            window.num_tabs_closing = 0;
            replace_window(
                model,
                window,
                vec![Effect::SettleSwap {
                    window_id,
                    swap_seq,
                }],
            )
        }
        Action::SwapSettled {
            window_id,
            swap_seq,
            num_tabs,
        } => {
            let Some(window) = in_flight_swap(model, window_id, swap_seq) else {
                return Transition::unchanged(model);
            };
            let mut window = *window;
            let target = window
                .pending_workspace_id
                .filter(|id| model.workspace(*id).is_some());
            match target {
                Some(id) => {
                    window.machine.send(
                        WindowEvent::WorkspaceOpened,
                        &window.guard(model.has_workspaces()),
                    );
                    window.workspace_id_in_use = Some(id);
                }
                None => {
                    let guard = WindowGuard {
                        attached: false,
                        has_workspaces: model.has_workspaces(),
                    };
                    window.machine.send(WindowEvent::SwapAborted, &guard);
                    window.workspace_id_in_use = None;
                }
            }
            window.pending_workspace_id = None;
            window.num_tabs_opening = 0;
            window.num_tabs_closing = 0;
            if let Some(num_tabs) = num_tabs {
                window.num_tabs = num_tabs;
            }
            replace_window(model, window, Vec::new())
        }

        Action::WorkspaceCreated {
            window_id,
            workspace,
            workspace_ids,
            num_tabs,
        } => {
            let mut next = (**model).clone();
            let id = workspace.id;
            Arc::make_mut(&mut next.workspaces_by_id).insert(id, Arc::new(workspace));
            next.workspace_ids = Arc::new(index_of_known(&workspace_ids, &*next.workspaces_by_id));
            let has_workspaces = next.has_workspaces();
            if let Some(window) = Arc::make_mut(&mut next.windows).get_mut(&window_id) {
                let guard = window.guard(has_workspaces);
                if window.machine.send(WindowEvent::Create, &guard) {
                    window.workspace_id_in_use = Some(id);
                    window.num_tabs = num_tabs;
                }
            }
            rehint_resting_windows(&mut next);
            Transition::changed(next, Vec::new())
        }
        Action::WorkspaceUpdated { workspace } => {
            if !model.workspace_ids.contains(&workspace.id) {
                return Transition::unchanged(model);
            }
            if model
                .workspace(workspace.id)
                .is_some_and(|current| **current == workspace)
            {
                return Transition::unchanged(model);
            }
            let mut next = (**model).clone();
            Arc::make_mut(&mut next.workspaces_by_id).insert(workspace.id, Arc::new(workspace));
            Transition::changed(next, Vec::new())
        }
        Action::LastSessionPromoted {
            workspace,
            workspace_ids,
        } => {
            let mut next = (**model).clone();
            let id = workspace.id;
            let by_id = Arc::make_mut(&mut next.workspaces_by_id);
            by_id.remove(&WorkspaceId::LAST_SESSION);
            by_id.insert(id, Arc::new(workspace));
            next.workspace_ids = Arc::new(index_of_known(&workspace_ids, &*next.workspaces_by_id));
            for window in Arc::make_mut(&mut next.windows).values_mut() {
                if window.workspace_id_in_use == Some(WorkspaceId::LAST_SESSION) {
                    window.workspace_id_in_use = Some(id);
                }
                if window.pending_workspace_id == Some(WorkspaceId::LAST_SESSION) {
                    window.pending_workspace_id = Some(id);
                }
            }
            rehint_resting_windows(&mut next);
            Transition::changed(next, Vec::new())
        }
        Action::WorkspaceDeleted {
            workspace_id,
            workspace_ids,
        } => {
            let mut next = (**model).clone();
            Arc::make_mut(&mut next.workspaces_by_id).remove(&workspace_id);
            next.workspace_ids = Arc::new(index_of_known(&workspace_ids, &*next.workspaces_by_id));
            let has_workspaces = next.has_workspaces();
            for window in Arc::make_mut(&mut next.windows).values_mut() {
                if window.workspace_id_in_use != Some(workspace_id) {
                    continue;
                }
                let guard = window.guard(has_workspaces);
                window.machine.send(WindowEvent::Delete, &guard);
                if window.machine.current() == WindowState::WorkspaceInUse {
                    window.machine.send(WindowEvent::Disconnect, &guard);
                }
                window.workspace_id_in_use = None;
                window.sync_pending = false;
            }
            rehint_resting_windows(&mut next);
            Transition::changed(next, Vec::new())
        }
        Action::WorkspaceSyncDue { window_id } => {
            let Some(window) = model.window(window_id) else {
                return Transition::unchanged(model);
            };
            let mut window = *window;
            window.sync_pending = false;
            let effects = match window.workspace_id_in_use {
                Some(workspace_id)
                    if window.machine.current() == WindowState::WorkspaceInUse
                        && model.workspace(workspace_id).is_some() =>
                {
                    vec![Effect::SyncWorkspaceTabs {
                        window_id,
                        workspace_id,
                    }]
                }
                _ => Vec::new(),
            };
            replace_window(model, window, effects)
        }
        Action::WorkspaceTabsSynced {
            window_id,
            workspace,
            num_tabs,
        } => {
            let known = if workspace.id.is_last_session() {
                model.last_session().is_some()
            } else {
                model.workspace_ids.contains(&workspace.id)
            };
            let workspace_changed =
                known && model.workspace(workspace.id).is_none_or(|stored| **stored != workspace);
            let count_changed = model
                .window(window_id)
                .is_some_and(|window| window.num_tabs != num_tabs);
            if !workspace_changed && !count_changed {
                return Transition::unchanged(model);
            }
            let mut next = (**model).clone();
            if workspace_changed {
                Arc::make_mut(&mut next.workspaces_by_id).insert(workspace.id, Arc::new(workspace));
            }
            if let Some(window) = Arc::make_mut(&mut next.windows).get_mut(&window_id) {
                window.num_tabs = num_tabs;
            }
            Transition::changed(next, Vec::new())
        }
        Action::WindowTabsCounted {
            window_id,
            num_tabs,
        } => {
            let Some(window) = model.window(window_id) else {
                return Transition::unchanged(model);
            };
            if window.machine.current() == WindowState::OpeningWorkspace {
                return Transition::unchanged(model);
            }
            let mut window = *window;
            window.num_tabs = num_tabs;
            replace_window(model, window, Vec::new())
        }
        Action::SettingsSaved { settings } => {
            if *model.settings == settings {
                return Transition::unchanged(model);
            }
            let mut next = (**model).clone();
            next.settings = Arc::new(settings);
            Transition::changed(next, Vec::new())
        }
    }
}

fn use_workspace(model: &Arc<Model>, window_id: WindowId, workspace_id: WorkspaceId) -> Transition {
    let Some(window) = model.window(window_id) else {
        return Transition::unchanged(model);
    };
    let exists = if workspace_id.is_last_session() {
        model.last_session().is_some()
    } else {
        model.workspace_ids.contains(&workspace_id)
    };
    if !exists {
        return Transition::unchanged(model);
    }
    let mut window = *window;
    if !window
        .machine
        .send(WindowEvent::Open, &window.guard(model.has_workspaces()))
    {
        return Transition::unchanged(model);
    }
    window.pending_workspace_id = Some(workspace_id);
    window.swap_seq = window.swap_seq.wrapping_add(1);
    window.num_tabs_opening = 0;
    window.num_tabs_closing = 0;
    let swap_seq = window.swap_seq;
    replace_window(
        model,
        window,
        vec![Effect::PlanSwap {
            window_id,
            workspace_id,
            swap_seq,
        }],
    )
}

fn swap_planned(
    model: &Arc<Model>,
    window_id: WindowId,
    swap_seq: u64,
    workspace: Workspace,
    current_tabs: Vec<HostTab>,
) -> Transition {
    let Some(window) = in_flight_swap(model, window_id, swap_seq) else {
        return Transition::unchanged(model);
    };
    let mut window = *window;
    let mut next = (**model).clone();
    if window.workspace_id_in_use.is_none() {
        let captured = Workspace::last_session(current_tabs.iter().map(HostTab::to_tab).collect());
        Arc::make_mut(&mut next.workspaces_by_id)
            .insert(WorkspaceId::LAST_SESSION, Arc::new(captured));
    }

    let urls = workspace
        .tabs
        .iter()
        .map(|tab| tab.url.clone())
        .collect::<Vec<_>>();
    let tab_ids = current_tabs.iter().map(|tab| tab.id).collect::<Vec<_>>();
    window.num_tabs_opening = urls.len();
    window.num_tabs_closing = tab_ids.len();

    let effects = if window.is_quiescent() {
        vec![Effect::SettleSwap {
            window_id,
            swap_seq,
        }]
    } else {
        vec![
            Effect::ExecuteSwap {
                window_id,
                swap_seq,
                urls,
                tab_ids,
            },
            Effect::ArmSwapTimeout {
                window_id,
                swap_seq,
            },
        ]
    };
    Arc::make_mut(&mut next.windows).insert(window_id, window);
    Transition::changed(next, effects)
}

/// Reconciles the tracked windows with what the host reports right now.
/// Unknown windows are added, vanished ones dropped, resting ones recounted.
fn windows_rechecked(model: &Arc<Model>, windows: Vec<(WindowId, usize)>) -> Transition {
    let has_workspaces = model.has_workspaces();
    let mut map = (*model.windows).clone();
    let before = map.len();
    map.retain(|id, _| windows.iter().any(|(open, _)| open == id));
    let mut changed = map.len() != before;
    for (window_id, num_tabs) in windows {
        match map.get_mut(&window_id) {
            None => {
                map.insert(
                    window_id,
                    WindowRuntimeState::new(window_id, has_workspaces, num_tabs),
                );
                changed = true;
            }
            Some(window) if window.machine.current().is_resting() && window.num_tabs != num_tabs => {
                window.num_tabs = num_tabs;
                changed = true;
            }
            Some(_) => {}
        }
    }
    if !changed {
        return Transition::unchanged(model);
    }
    let mut next = (**model).clone();
    next.windows = Arc::new(map);
    Transition::changed(next, Vec::new())
}

#[derive(Clone, Copy)]
enum SwapCounter {
    Opening,
    Closing,
}

fn tab_changed(model: &Arc<Model>, window_id: WindowId, counter: SwapCounter) -> Transition {
    let Some(window) = model.window(window_id) else {
        return Transition::unchanged(model);
    };
    match window.machine.current() {
        WindowState::OpeningWorkspace => {
            let mut window = *window;
            let slot = match counter {
                SwapCounter::Opening => &mut window.num_tabs_opening,
                SwapCounter::Closing => &mut window.num_tabs_closing,
            };
            if *slot == 0 {
                return Transition::unchanged(model);
            }
            *slot -= 1;
            let effects = if window.is_quiescent() {
                vec![Effect::SettleSwap {
                    window_id,
                    swap_seq: window.swap_seq,
                }]
            } else {
                Vec::new()
            };
            replace_window(model, window, effects)
        }
        WindowState::WorkspaceInUse => {
            if window.sync_pending {
                return Transition::unchanged(model);
            }
            let mut window = *window;
            window.sync_pending = true;
            replace_window(model, window, vec![Effect::ScheduleWorkspaceSync { window_id }])
        }
        WindowState::Idle | WindowState::NoData => {
            Transition::effects_only(model, vec![Effect::CountWindowTabs { window_id }])
        }
    }
}

fn in_flight_swap(
    model: &Arc<Model>,
    window_id: WindowId,
    swap_seq: u64,
) -> Option<&WindowRuntimeState> {
    model.window(window_id).filter(|window| {
        window.machine.current() == WindowState::OpeningWorkspace && window.swap_seq == swap_seq
    })
}

fn replace_window(
    model: &Arc<Model>,
    window: WindowRuntimeState,
    effects: Vec<Effect>,
) -> Transition {
    if model.window(window.window_id) == Some(&window) {
        return Transition::effects_only(model, effects);
    }
    let mut next = (**model).clone();
    Arc::make_mut(&mut next.windows).insert(window.window_id, window);
    Transition::changed(next, effects)
}

/// Keeps `ids` in order, dropping duplicates and ids with no record.
fn index_of_known<V>(ids: &[WorkspaceId], by_id: &BTreeMap<WorkspaceId, V>) -> Vec<WorkspaceId> {
    let mut index = Vec::with_capacity(ids.len());
    for id in ids {
        if !id.is_last_session() && by_id.contains_key(id) && !index.contains(id) {
            index.push(*id);
        }
    }
    index
}

fn rehint_resting_windows(model: &mut Model) {
    let resting = WindowLifecycle::resting_state(model.has_workspaces());
    let stale = model.windows.values().any(|window| {
        let state = window.machine.current();
        state.is_resting() && state != resting
    });
    if !stale {
        return;
    }
    for window in Arc::make_mut(&mut model.windows).values_mut() {
        if window.machine.current().is_resting() {
            window.machine = Machine::from_state(resting);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Settings, Tab, TabId, WorkspaceColor};

    fn workspace(id: u64, urls: &[&str]) -> Workspace {
        Workspace {
            id: WorkspaceId::from_u64(id),
            name: format!("workspace {id}"),
            color: WorkspaceColor::Blue,
            tabs: urls
                .iter()
                .map(|url| Tab {
                    title: url.to_string(),
                    url: url.to_string(),
                    fav_icon_url: None,
                })
                .collect(),
        }
    }

    fn host_tabs(ids: &[u64]) -> Vec<HostTab> {
        ids.iter()
            .map(|id| HostTab {
                id: TabId::from_u64(*id),
                title: format!("tab {id}"),
                url: format!("https://tab{id}.example"),
                fav_icon_url: None,
            })
            .collect()
    }

    fn run(model: Arc<Model>, action: Action) -> (Arc<Model>, Vec<Effect>) {
        let transition = reduce(&model, action);
        (transition.model, transition.effects)
    }

    /// A loaded model with the given workspaces and windows (id, num_tabs).
    fn loaded(workspaces: Vec<Workspace>, windows: &[(u64, usize)]) -> Arc<Model> {
        let ids = workspaces.iter().map(|w| w.id).collect();
        let (model, effects) = run(Arc::new(Model::new()), Action::AppStarted);
        assert_eq!(effects, vec![Effect::LoadData]);
        let (model, effects) = run(
            model,
            Action::DataLoaded {
                workspaces,
                workspace_ids: ids,
                settings: Settings::default(),
            },
        );
        assert_eq!(effects, vec![Effect::CheckOpenedWindows]);
        let (model, effects) = run(
            model,
            Action::OpenedWindowsChecked {
                windows: windows
                    .iter()
                    .map(|(id, n)| (WindowId::from_u64(*id), *n))
                    .collect(),
            },
        );
        assert_eq!(effects, vec![Effect::SubscribeEvents]);
        let (model, _) = run(model, Action::SubscribedToEvents);
        assert!(model.is_loaded());
        model
    }

    fn window(model: &Model, id: u64) -> WindowRuntimeState {
        *model.window(WindowId::from_u64(id)).unwrap()
    }

    fn tab_complete(window_id: u64, tab_id: u64) -> Action {
        Action::TabUpdated {
            window_id: WindowId::from_u64(window_id),
            tab_id: TabId::from_u64(tab_id),
            status: TabStatus::Complete,
        }
    }

    fn tab_removed(window_id: u64, tab_id: u64) -> Action {
        Action::TabRemoved {
            window_id: WindowId::from_u64(window_id),
            tab_id: TabId::from_u64(tab_id),
            is_window_closing: false,
        }
    }

    /// Starts a swap of `window_id` to workspace `target` with the window
    /// currently showing `current` tabs.
    fn start_swap(model: Arc<Model>, window_id: u64, target: Workspace, current: &[u64]) -> Arc<Model> {
        let (model, effects) = run(
            model,
            Action::UseWorkspace {
                window_id: WindowId::from_u64(window_id),
                workspace_id: target.id,
            },
        );
        let swap_seq = window(&model, window_id).swap_seq;
        assert_eq!(
            effects,
            vec![Effect::PlanSwap {
                window_id: WindowId::from_u64(window_id),
                workspace_id: target.id,
                swap_seq,
            }]
        );
        let (model, _) = run(
            model,
            Action::SwapPlanned {
                window_id: WindowId::from_u64(window_id),
                swap_seq,
                workspace: target,
                current_tabs: host_tabs(current),
            },
        );
        model
    }

    #[test]
    fn lifecycle_events_out_of_order_are_ignored() {
        let model = Arc::new(Model::new());
        let transition = reduce(&model, Action::SubscribedToEvents);
        assert!(transition.is_unchanged(&model));
        let transition = reduce(&model, Action::OpenedWindowsChecked { windows: Vec::new() });
        assert!(transition.is_unchanged(&model));
    }

    #[test]
    fn windows_rest_in_no_data_until_a_workspace_exists() {
        let model = loaded(Vec::new(), &[(1, 1)]);
        assert_eq!(window(&model, 1).machine.current(), WindowState::NoData);

        let model = loaded(vec![workspace(1, &["https://a"])], &[(1, 1)]);
        assert_eq!(window(&model, 1).machine.current(), WindowState::Idle);
    }

    #[test]
    fn swap_records_counters_before_issuing_host_calls() {
        let target = workspace(1, &["https://a", "https://b"]);
        let model = loaded(vec![target.clone()], &[(1, 3)]);
        let (model, effects) = run(
            model,
            Action::UseWorkspace {
                window_id: WindowId::from_u64(1),
                workspace_id: target.id,
            },
        );
        assert_eq!(window(&model, 1).machine.current(), WindowState::OpeningWorkspace);
        let swap_seq = window(&model, 1).swap_seq;
        assert!(matches!(effects[..], [Effect::PlanSwap { .. }]));

        let (model, effects) = run(
            model,
            Action::SwapPlanned {
                window_id: WindowId::from_u64(1),
                swap_seq,
                workspace: target,
                current_tabs: host_tabs(&[10, 11, 12]),
            },
        );
        let state = window(&model, 1);
        assert_eq!(state.num_tabs_opening, 2);
        assert_eq!(state.num_tabs_closing, 3);
        assert_eq!(
            effects,
            vec![
                Effect::ExecuteSwap {
                    window_id: WindowId::from_u64(1),
                    swap_seq,
                    urls: vec!["https://a".to_owned(), "https://b".to_owned()],
                    tab_ids: host_tabs(&[10, 11, 12]).iter().map(|t| t.id).collect(),
                },
                Effect::ArmSwapTimeout {
                    window_id: WindowId::from_u64(1),
                    swap_seq,
                },
            ]
        );
    }

    #[test]
    fn quiescence_is_reached_only_after_every_event_in_any_order() {
        let target = workspace(1, &["https://a", "https://b"]);
        let orders: [&[char]; 4] = [
            &['c', 'c', 'r', 'r', 'r'],
            &['r', 'r', 'r', 'c', 'c'],
            &['r', 'c', 'r', 'c', 'r'],
            &['c', 'r', 'r', 'c', 'r'],
        ];
        for order in orders {
            let mut model = start_swap(
                loaded(vec![target.clone()], &[(1, 3)]),
                1,
                target.clone(),
                &[10, 11, 12],
            );
            for (step, kind) in order.iter().enumerate() {
                let action = match *kind {
                    'c' => tab_complete(1, 100 + step as u64),
                    _ => tab_removed(1, 10 + step as u64),
                };
                let (next, effects) = run(model, action);
                model = next;
                let last = step + 1 == order.len();
                assert_eq!(
                    effects
                        .iter()
                        .any(|effect| matches!(effect, Effect::SettleSwap { .. })),
                    last,
                    "order {order:?} step {step}"
                );
                assert_eq!(
                    window(&model, 1).machine.current(),
                    WindowState::OpeningWorkspace
                );
            }
            assert!(window(&model, 1).is_quiescent());
        }
    }

    #[test]
    fn settling_attaches_the_workspace_and_requeried_count() {
        let target = workspace(1, &["https://a", "https://b"]);
        let mut model = start_swap(
            loaded(vec![target.clone()], &[(1, 3)]),
            1,
            target.clone(),
            &[10, 11, 12],
        );
        for action in [
            tab_complete(1, 20),
            tab_removed(1, 10),
            tab_removed(1, 11),
            tab_complete(1, 21),
            tab_removed(1, 12),
        ] {
            model = run(model, action).0;
        }
        let swap_seq = window(&model, 1).swap_seq;
        let (model, _) = run(
            model,
            Action::SwapSettled {
                window_id: WindowId::from_u64(1),
                swap_seq,
                num_tabs: Some(2),
            },
        );
        let state = window(&model, 1);
        assert_eq!(state.machine.current(), WindowState::WorkspaceInUse);
        assert_eq!(state.workspace_id_in_use, Some(target.id));
        assert_eq!(state.pending_workspace_id, None);
        assert_eq!(state.num_tabs, 2);
    }

    #[test]
    fn first_swap_captures_the_last_session() {
        let target = workspace(1, &["https://a"]);
        let model = start_swap(loaded(vec![target.clone()], &[(1, 2)]), 1, target, &[10, 11]);
        let last = model.last_session().unwrap();
        assert_eq!(last.tabs.len(), 2);
        assert!(!model.workspace_ids.contains(&WorkspaceId::LAST_SESSION));
    }

    #[test]
    fn counters_saturate_and_ignore_loading_and_window_closing_events() {
        let target = workspace(1, &["https://a"]);
        let model = start_swap(loaded(vec![target.clone()], &[(1, 2)]), 1, target, &[10, 11]);
        let before = window(&model, 1);

        let (model, _) = run(
            model,
            Action::TabUpdated {
                window_id: WindowId::from_u64(1),
                tab_id: TabId::from_u64(50),
                status: TabStatus::Loading,
            },
        );
        let (model, _) = run(
            model,
            Action::TabRemoved {
                window_id: WindowId::from_u64(1),
                tab_id: TabId::from_u64(10),
                is_window_closing: true,
            },
        );
        assert_eq!(window(&model, 1), before);

        let (model, _) = run(model, tab_complete(1, 50));
        let (model, effects) = run(model, tab_complete(1, 51));
        assert!(effects.is_empty());
        assert_eq!(window(&model, 1).num_tabs_opening, 0);
        assert_eq!(window(&model, 1).num_tabs_closing, 2);
    }

    #[test]
    fn concurrent_swaps_keep_per_window_counters() {
        let target = workspace(1, &["https://a", "https://b"]);
        let model = loaded(vec![target.clone()], &[(1, 1), (2, 4)]);
        let model = start_swap(model, 1, target.clone(), &[10]);
        let model = start_swap(model, 2, target.clone(), &[20, 21, 22, 23]);

        let (model, effects) = run(model, tab_removed(1, 10));
        assert!(effects.is_empty());
        let (model, _) = run(model, tab_complete(1, 30));
        let (model, effects) = run(model, tab_complete(1, 31));
        assert!(matches!(
            effects[..],
            [Effect::SettleSwap { window_id, .. }] if window_id == WindowId::from_u64(1)
        ));

        let other = window(&model, 2);
        assert_eq!(other.num_tabs_opening, 2);
        assert_eq!(other.num_tabs_closing, 4);
    }

    #[test]
    fn swap_to_an_identical_empty_window_settles_immediately() {
        let target = workspace(1, &[]);
        let model = loaded(vec![target.clone()], &[(1, 0)]);
        let (model, _) = run(
            model,
            Action::UseWorkspace {
                window_id: WindowId::from_u64(1),
                workspace_id: target.id,
            },
        );
        let swap_seq = window(&model, 1).swap_seq;
        let (_, effects) = run(
            model,
            Action::SwapPlanned {
                window_id: WindowId::from_u64(1),
                swap_seq,
                workspace: target,
                current_tabs: Vec::new(),
            },
        );
        assert_eq!(
            effects,
            vec![Effect::SettleSwap {
                window_id: WindowId::from_u64(1),
                swap_seq,
            }]
        );
    }

    #[test]
    fn timeout_forces_quiescence_once_and_ignores_stale_swaps() {
        let target = workspace(1, &["https://a", "https://b"]);
        let model = start_swap(loaded(vec![target.clone()], &[(1, 1)]), 1, target, &[10]);
        let swap_seq = window(&model, 1).swap_seq;

        let stale = reduce(
            &model,
            Action::SwapTimedOut {
                window_id: WindowId::from_u64(1),
                swap_seq: swap_seq - 1,
            },
        );
        assert!(stale.is_unchanged(&model));

        let (model, effects) = run(
            model,
            Action::SwapTimedOut {
                window_id: WindowId::from_u64(1),
                swap_seq,
            },
        );
        assert!(window(&model, 1).is_quiescent());
        assert_eq!(
            effects,
            vec![Effect::SettleSwap {
                window_id: WindowId::from_u64(1),
                swap_seq,
            }]
        );

        let again = reduce(
            &model,
            Action::SwapTimedOut {
                window_id: WindowId::from_u64(1),
                swap_seq,
            },
        );
        assert!(again.is_unchanged(&model));
        assert!(again.effects.is_empty());
    }

    #[test]
    fn failed_plan_returns_window_to_rest() {
        let target = workspace(1, &["https://a"]);
        let model = loaded(vec![target.clone()], &[(1, 1)]);
        let (model, _) = run(
            model,
            Action::UseWorkspace {
                window_id: WindowId::from_u64(1),
                workspace_id: target.id,
            },
        );
        let swap_seq = window(&model, 1).swap_seq;
        let (model, _) = run(
            model,
            Action::SwapPlanFailed {
                window_id: WindowId::from_u64(1),
                swap_seq,
                message: "storage offline".to_owned(),
            },
        );
        let state = window(&model, 1);
        assert_eq!(state.machine.current(), WindowState::Idle);
        assert_eq!(state.pending_workspace_id, None);
    }

    #[test]
    fn closing_a_window_mid_swap_drops_it_and_late_results_are_ignored() {
        let target = workspace(1, &["https://a"]);
        let model = start_swap(loaded(vec![target.clone()], &[(1, 1)]), 1, target, &[10]);
        let swap_seq = window(&model, 1).swap_seq;
        let (model, _) = run(
            model,
            Action::WindowRemoved {
                window_id: WindowId::from_u64(1),
            },
        );
        assert!(model.window(WindowId::from_u64(1)).is_none());

        let late = reduce(
            &model,
            Action::SwapSettled {
                window_id: WindowId::from_u64(1),
                swap_seq,
                num_tabs: Some(1),
            },
        );
        assert!(late.is_unchanged(&model));
        assert!(reduce(&model, tab_complete(1, 30)).is_unchanged(&model));
    }

    #[test]
    fn use_workspace_is_a_no_op_when_unavailable() {
        let model = loaded(Vec::new(), &[(1, 1)]);
        let transition = reduce(
            &model,
            Action::UseWorkspace {
                window_id: WindowId::from_u64(1),
                workspace_id: WorkspaceId::from_u64(1),
            },
        );
        assert!(transition.is_unchanged(&model));
        assert!(transition.effects.is_empty());

        let target = workspace(1, &["https://a"]);
        let model = start_swap(loaded(vec![target.clone()], &[(1, 1)]), 1, target.clone(), &[10]);
        let transition = reduce(
            &model,
            Action::UseWorkspace {
                window_id: WindowId::from_u64(1),
                workspace_id: target.id,
            },
        );
        assert!(transition.is_unchanged(&model));
    }

    #[test]
    fn disconnecting_an_idle_window_keeps_the_same_model() {
        let model = loaded(vec![workspace(1, &["https://a"])], &[(1, 1)]);
        let transition = reduce(
            &model,
            Action::DisconnectWorkspace {
                window_id: WindowId::from_u64(1),
            },
        );
        assert!(transition.is_unchanged(&model));
    }

    #[test]
    fn creating_the_first_workspace_attaches_and_rehints_other_windows() {
        let model = loaded(Vec::new(), &[(1, 2), (2, 5)]);
        let (model, effects) = run(
            model,
            Action::CreateWorkspace {
                window_id: WindowId::from_u64(1),
                name: "Work".to_owned(),
                color: WorkspaceColor::Green,
            },
        );
        assert_eq!(model.workspace_ids.len(), 0);
        assert!(matches!(effects[..], [Effect::CreateWorkspace { .. }]));

        let created = workspace(1, &["https://a", "https://b"]);
        let (model, _) = run(
            model,
            Action::WorkspaceCreated {
                window_id: WindowId::from_u64(1),
                workspace: created.clone(),
                workspace_ids: vec![created.id],
                num_tabs: 2,
            },
        );
        let first = window(&model, 1);
        assert_eq!(first.machine.current(), WindowState::WorkspaceInUse);
        assert_eq!(first.workspace_id_in_use, Some(created.id));
        assert_eq!(window(&model, 2).machine.current(), WindowState::Idle);
        assert_eq!(*model.workspace_ids, vec![created.id]);
    }

    #[test]
    fn create_is_rejected_while_a_workspace_is_in_use() {
        let target = workspace(1, &["https://a"]);
        let mut model = start_swap(loaded(vec![target.clone()], &[(1, 1)]), 1, target, &[10]);
        model = run(model, tab_complete(1, 20)).0;
        model = run(model, tab_removed(1, 10)).0;
        let swap_seq = window(&model, 1).swap_seq;
        model = run(
            model,
            Action::SwapSettled {
                window_id: WindowId::from_u64(1),
                swap_seq,
                num_tabs: Some(1),
            },
        )
        .0;
        let transition = reduce(
            &model,
            Action::CreateWorkspace {
                window_id: WindowId::from_u64(1),
                name: "x".to_owned(),
                color: WorkspaceColor::Red,
            },
        );
        assert!(transition.effects.is_empty());
    }

    #[test]
    fn deleting_the_last_workspace_detaches_windows_and_marks_no_data() {
        let target = workspace(1, &["https://a"]);
        let mut model = start_swap(loaded(vec![target.clone()], &[(1, 1), (2, 1)]), 1, target.clone(), &[10]);
        model = run(model, tab_complete(1, 20)).0;
        model = run(model, tab_removed(1, 10)).0;
        let swap_seq = window(&model, 1).swap_seq;
        model = run(
            model,
            Action::SwapSettled {
                window_id: WindowId::from_u64(1),
                swap_seq,
                num_tabs: Some(1),
            },
        )
        .0;

        let (model, effects) = run(
            model,
            Action::DeleteWorkspace {
                window_id: WindowId::from_u64(2),
                workspace_id: target.id,
            },
        );
        assert_eq!(
            effects,
            vec![Effect::DeleteWorkspace {
                workspace_id: target.id
            }]
        );
        let (model, _) = run(
            model,
            Action::WorkspaceDeleted {
                workspace_id: target.id,
                workspace_ids: Vec::new(),
            },
        );
        assert!(model.workspace_ids.is_empty());
        assert!(model.workspace(target.id).is_none());
        for id in [1, 2] {
            let state = window(&model, id);
            assert_eq!(state.machine.current(), WindowState::NoData);
            assert_eq!(state.workspace_id_in_use, None);
        }
    }

    #[test]
    fn workspace_deleted_mid_swap_settles_detached() {
        let target = workspace(1, &["https://a"]);
        let keep = workspace(2, &["https://b"]);
        let model = start_swap(
            loaded(vec![target.clone(), keep], &[(1, 1)]),
            1,
            target.clone(),
            &[10],
        );
        let swap_seq = window(&model, 1).swap_seq;
        let (model, _) = run(
            model,
            Action::WorkspaceDeleted {
                workspace_id: target.id,
                workspace_ids: vec![WorkspaceId::from_u64(2)],
            },
        );
        let (model, _) = run(
            model,
            Action::SwapSettled {
                window_id: WindowId::from_u64(1),
                swap_seq,
                num_tabs: Some(1),
            },
        );
        let state = window(&model, 1);
        assert_eq!(state.machine.current(), WindowState::Idle);
        assert_eq!(state.workspace_id_in_use, None);
    }

    #[test]
    fn ambient_edits_are_coalesced_into_one_sync() {
        let target = workspace(1, &["https://a"]);
        let mut model = start_swap(loaded(vec![target.clone()], &[(1, 1)]), 1, target.clone(), &[10]);
        model = run(model, tab_complete(1, 20)).0;
        model = run(model, tab_removed(1, 10)).0;
        let swap_seq = window(&model, 1).swap_seq;
        model = run(
            model,
            Action::SwapSettled {
                window_id: WindowId::from_u64(1),
                swap_seq,
                num_tabs: Some(1),
            },
        )
        .0;

        let (model, effects) = run(model, tab_complete(1, 21));
        assert_eq!(
            effects,
            vec![Effect::ScheduleWorkspaceSync {
                window_id: WindowId::from_u64(1)
            }]
        );
        let absorbed = reduce(&model, tab_removed(1, 20));
        assert!(absorbed.is_unchanged(&model));

        let (model, effects) = run(
            model,
            Action::WorkspaceSyncDue {
                window_id: WindowId::from_u64(1),
            },
        );
        assert_eq!(
            effects,
            vec![Effect::SyncWorkspaceTabs {
                window_id: WindowId::from_u64(1),
                workspace_id: target.id,
            }]
        );
        assert!(!window(&model, 1).sync_pending);

        let mut synced = target.clone();
        synced.tabs.push(Tab {
            title: "c".to_owned(),
            url: "https://c".to_owned(),
            fav_icon_url: None,
        });
        let (model, _) = run(
            model,
            Action::WorkspaceTabsSynced {
                window_id: WindowId::from_u64(1),
                workspace: synced.clone(),
                num_tabs: 2,
            },
        );
        assert_eq!(**model.workspace(target.id).unwrap(), synced);
        assert_eq!(window(&model, 1).num_tabs, 2);
    }

    #[test]
    fn idle_window_tab_events_only_recount() {
        let model = loaded(vec![workspace(1, &["https://a"])], &[(1, 1)]);
        let transition = reduce(&model, tab_complete(1, 5));
        assert!(transition.is_unchanged(&model));
        assert_eq!(
            transition.effects,
            vec![Effect::CountWindowTabs {
                window_id: WindowId::from_u64(1)
            }]
        );
        let (model, _) = run(
            model,
            Action::WindowTabsCounted {
                window_id: WindowId::from_u64(1),
                num_tabs: 4,
            },
        );
        assert_eq!(window(&model, 1).num_tabs, 4);
    }

    #[test]
    fn promoting_the_last_session_reattaches_windows() {
        let target = workspace(1, &["https://a"]);
        let model = start_swap(loaded(vec![target.clone()], &[(1, 2)]), 1, target.clone(), &[10, 11]);
        assert!(model.last_session().is_some());

        let update = Workspace {
            id: WorkspaceId::LAST_SESSION,
            name: "Saved".to_owned(),
            color: WorkspaceColor::Purple,
            tabs: model.last_session().unwrap().tabs.clone(),
        };
        let (_, effects) = run(
            model,
            Action::UpdateWorkspace {
                window_id: WindowId::from_u64(1),
                workspace: update.clone(),
            },
        );
        // mid-swap, so unavailable
        assert!(effects.is_empty());

        let model = loaded(vec![target.clone()], &[(2, 1)]);
        let mut next = (*model).clone();
        Arc::make_mut(&mut next.workspaces_by_id).insert(
            WorkspaceId::LAST_SESSION,
            Arc::new(Workspace::last_session(Vec::new())),
        );
        let model = Arc::new(next);
        let (model, effects) = run(
            model,
            Action::UpdateWorkspace {
                window_id: WindowId::from_u64(2),
                workspace: update.clone(),
            },
        );
        assert_eq!(effects, vec![Effect::PromoteLastSession { workspace: update }]);

        let promoted = workspace(2, &["https://tab10.example"]);
        let (model, _) = run(
            model,
            Action::LastSessionPromoted {
                workspace: promoted.clone(),
                workspace_ids: vec![promoted.id, target.id],
            },
        );
        assert!(model.last_session().is_none());
        assert_eq!(*model.workspace_ids, vec![promoted.id, target.id]);
    }

    #[test]
    fn window_created_twice_is_ignored() {
        let model = loaded(Vec::new(), &[]);
        let (model, effects) = run(
            model,
            Action::WindowCreated {
                window_id: WindowId::from_u64(7),
            },
        );
        assert_eq!(
            effects,
            vec![Effect::CountWindowTabs {
                window_id: WindowId::from_u64(7)
            }]
        );
        let again = reduce(
            &model,
            Action::WindowCreated {
                window_id: WindowId::from_u64(7),
            },
        );
        assert!(again.is_unchanged(&model));
    }

    #[test]
    fn unchanged_settings_do_not_produce_a_new_model() {
        let model = loaded(Vec::new(), &[]);
        let same = reduce(
            &model,
            Action::SettingsSaved {
                settings: Settings::default(),
            },
        );
        assert!(same.is_unchanged(&model));
    }

    #[test]
    fn failed_tab_execution_aborts_without_syncing_later_edits() {
        let target = workspace(1, &["https://a"]);
        let model = start_swap(loaded(vec![target.clone()], &[(1, 1)]), 1, target, &[10]);
        let swap_seq = window(&model, 1).swap_seq;
        assert_eq!(window(&model, 1).num_tabs_opening, 1);

        let (model, _) = run(
            model,
            Action::SwapPlanFailed {
                window_id: WindowId::from_u64(1),
                swap_seq,
                message: "create tabs: host went away".to_owned(),
            },
        );
        let state = window(&model, 1);
        assert_eq!(state.machine.current(), WindowState::Idle);
        assert_eq!(state.workspace_id_in_use, None);
        assert!(state.is_quiescent());

        let (_, effects) = run(model, tab_complete(1, 10));
        assert_eq!(
            effects,
            vec![Effect::CountWindowTabs {
                window_id: WindowId::from_u64(1)
            }]
        );
    }

    #[test]
    fn no_data_window_can_reopen_or_save_the_last_session() {
        let model = loaded(Vec::new(), &[(1, 2)]);
        let mut next = (*model).clone();
        Arc::make_mut(&mut next.workspaces_by_id).insert(
            WorkspaceId::LAST_SESSION,
            Arc::new(Workspace::last_session(Vec::new())),
        );
        let model = Arc::new(next);
        assert_eq!(window(&model, 1).machine.current(), WindowState::NoData);

        let (reopened, effects) = run(
            model.clone(),
            Action::UseWorkspace {
                window_id: WindowId::from_u64(1),
                workspace_id: WorkspaceId::LAST_SESSION,
            },
        );
        assert_eq!(
            effects,
            vec![Effect::PlanSwap {
                window_id: WindowId::from_u64(1),
                workspace_id: WorkspaceId::LAST_SESSION,
                swap_seq: 1,
            }]
        );
        assert_eq!(
            window(&reopened, 1).machine.current(),
            WindowState::OpeningWorkspace
        );

        let update = Workspace {
            name: "Kept".to_owned(),
            ..Workspace::last_session(Vec::new())
        };
        let (_, effects) = run(
            model,
            Action::UpdateWorkspace {
                window_id: WindowId::from_u64(1),
                workspace: update.clone(),
            },
        );
        assert_eq!(effects, vec![Effect::PromoteLastSession { workspace: update }]);
    }

    #[test]
    fn syncing_identical_tabs_keeps_the_same_model() {
        let target = workspace(1, &["https://a"]);
        let model = loaded(vec![target.clone()], &[(1, 1)]);
        let same = reduce(
            &model,
            Action::WorkspaceTabsSynced {
                window_id: WindowId::from_u64(1),
                workspace: target.clone(),
                num_tabs: 1,
            },
        );
        assert!(same.is_unchanged(&model));

        let recounted = reduce(
            &model,
            Action::WorkspaceTabsSynced {
                window_id: WindowId::from_u64(1),
                workspace: target.clone(),
                num_tabs: 3,
            },
        );
        assert!(!recounted.is_unchanged(&model));
        assert_eq!(window(&recounted.model, 1).num_tabs, 3);
        assert!(Arc::ptr_eq(
            recounted.model.workspace(target.id).unwrap(),
            model.workspace(target.id).unwrap()
        ));
    }

    #[test]
    fn host_reconnect_rechecks_open_windows() {
        let target = workspace(1, &["https://a"]);
        let model = loaded(vec![target], &[(1, 1), (2, 3)]);
        let transition = reduce(&model, Action::HostConnected);
        assert!(transition.is_unchanged(&model));
        assert_eq!(transition.effects, vec![Effect::RecheckWindows]);

        let reported = vec![(WindowId::from_u64(2), 4), (WindowId::from_u64(5), 2)];
        let (model, effects) = run(
            model,
            Action::WindowsRechecked {
                windows: reported.clone(),
            },
        );
        assert!(effects.is_empty());
        assert!(model.window(WindowId::from_u64(1)).is_none());
        assert_eq!(window(&model, 2).num_tabs, 4);
        let added = window(&model, 5);
        assert_eq!(added.machine.current(), WindowState::Idle);
        assert_eq!(added.num_tabs, 2);

        let again = reduce(&model, Action::WindowsRechecked { windows: reported });
        assert!(again.is_unchanged(&model));
    }
}
