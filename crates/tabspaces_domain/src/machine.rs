use std::fmt;
use std::marker::PhantomData;

/// A finite-state table: which events are available in which states, and
/// where they lead. Guards receive read-only context about the surroundings.
pub trait TransitionTable {
    type State: Copy + Eq + fmt::Debug;
    type Event: Copy + Eq + fmt::Debug;
    type Guard;

    fn initial() -> Self::State;

    fn next(state: Self::State, event: Self::Event, guard: &Self::Guard) -> Option<Self::State>;
}

pub struct Machine<T: TransitionTable> {
    current: T::State,
    _table: PhantomData<fn() -> T>,
}

impl<T: TransitionTable> Machine<T> {
    pub fn new() -> Self {
        Self::from_state(T::initial())
    }

    pub fn from_state(state: T::State) -> Self {
        Self {
            current: state,
            _table: PhantomData,
        }
    }

    pub fn current(&self) -> T::State {
        self.current
    }

    pub fn can(&self, event: T::Event, guard: &T::Guard) -> bool {
        T::next(self.current, event, guard).is_some()
    }

    /// Applies `event`. Returns false and leaves the state untouched when the
    /// event is unavailable.
    pub fn send(&mut self, event: T::Event, guard: &T::Guard) -> bool {
        match T::next(self.current, event, guard) {
            Some(next) => {
                self.current = next;
                true
            }
            None => false,
        }
    }
}

impl<T: TransitionTable> Default for Machine<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TransitionTable> Clone for Machine<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: TransitionTable> Copy for Machine<T> {}

impl<T: TransitionTable> PartialEq for Machine<T> {
    fn eq(&self, other: &Self) -> bool {
        self.current == other.current
    }
}

impl<T: TransitionTable> Eq for Machine<T> {}

impl<T: TransitionTable> fmt::Debug for Machine<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Machine").field(&self.current).finish()
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AppLifecycleState {
    LoadingApp,
    CheckingForOpenedWindows,
    SubscribingEvents,
    AppLoaded,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AppEvent {
    DataLoaded,
    CheckCompleted,
    SubscribedToEvents,
}

pub enum AppLifecycle {}

impl TransitionTable for AppLifecycle {
    type State = AppLifecycleState;
    type Event = AppEvent;
    type Guard = ();

    fn initial() -> Self::State {
        AppLifecycleState::LoadingApp
    }

    fn next(state: Self::State, event: Self::Event, _guard: &()) -> Option<Self::State> {
        use AppEvent as E;
        use AppLifecycleState as S;
        match (state, event) {
            (S::LoadingApp, E::DataLoaded) => Some(S::CheckingForOpenedWindows),
            (S::CheckingForOpenedWindows, E::CheckCompleted) => Some(S::SubscribingEvents),
            (S::SubscribingEvents, E::SubscribedToEvents) => Some(S::AppLoaded),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WindowState {
    Idle,
    NoData,
    OpeningWorkspace,
    WorkspaceInUse,
}

impl WindowState {
    pub fn is_resting(self) -> bool {
        matches!(self, Self::Idle | Self::NoData)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WindowEvent {
    Open,
    WorkspaceOpened,
    SwapAborted,
    Create,
    Update,
    Delete,
    Disconnect,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct WindowGuard {
    pub attached: bool,
    pub has_workspaces: bool,
}

pub enum WindowLifecycle {}

impl WindowLifecycle {
    /// The unattached state a window rests in given whether any workspace exists.
    pub fn resting_state(has_workspaces: bool) -> WindowState {
        if has_workspaces {
            WindowState::Idle
        } else {
            WindowState::NoData
        }
    }
}

impl TransitionTable for WindowLifecycle {
    type State = WindowState;
    type Event = WindowEvent;
    type Guard = WindowGuard;

    fn initial() -> Self::State {
        WindowState::NoData
    }

    fn next(state: Self::State, event: Self::Event, guard: &WindowGuard) -> Option<Self::State> {
        use WindowEvent as E;
        use WindowState as S;
        let resting = WindowLifecycle::resting_state(guard.has_workspaces);
        match (state, event) {
            (S::Idle | S::NoData | S::WorkspaceInUse, E::Open) => Some(S::OpeningWorkspace),
            (S::OpeningWorkspace, E::WorkspaceOpened) => Some(S::WorkspaceInUse),
            (S::OpeningWorkspace, E::SwapAborted) if guard.attached => Some(S::WorkspaceInUse),
            (S::OpeningWorkspace, E::SwapAborted) => Some(resting),
            (S::Idle | S::NoData, E::Create) => Some(S::WorkspaceInUse),
            (S::Idle | S::NoData | S::WorkspaceInUse, E::Update) => Some(state),
            (_, E::Delete) => Some(state),
            (S::WorkspaceInUse, E::Disconnect) => Some(resting),
            _ => None,
        }
    }
}
