use anyhow::Context as _;
use std::collections::BTreeMap;
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard};
use tabspaces_domain::{
    BrowserEvent, BrowserEventSink, BrowserHost, HostTab, TabId, TabStatus, WindowId,
};

#[derive(Default)]
struct BrowserState {
    next_window_id: u64,
    next_tab_id: u64,
    windows: BTreeMap<WindowId, Vec<HostTab>>,
}

impl BrowserState {
    fn new_tab(&mut self, url: &str) -> HostTab {
        self.next_tab_id += 1;
        HostTab {
            id: TabId::from_u64(self.next_tab_id),
            title: url.to_owned(),
            url: url.to_owned(),
            fav_icon_url: None,
        }
    }
}

/// A simulated browser. Every tab it creates finishes loading immediately,
/// and events reach the sink from a dedicated thread in the order they were
/// produced.
#[derive(Clone)]
pub struct MemoryBrowser {
    state: Arc<Mutex<BrowserState>>,
    events: mpsc::Sender<BrowserEvent>,
}

impl MemoryBrowser {
    pub fn new(sink: BrowserEventSink) -> anyhow::Result<Self> {
        let (events, rx) = mpsc::channel::<BrowserEvent>();
        std::thread::Builder::new()
            .name("tabspaces-memory-browser".to_owned())
            .spawn(move || {
                while let Ok(event) = rx.recv() {
                    sink(event);
                }
            })
            .context("failed to spawn memory browser event thread")?;
        Ok(Self {
            state: Arc::new(Mutex::new(BrowserState::default())),
            events,
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, BrowserState>, String> {
        self.state
            .lock()
            .map_err(|_| "memory browser state poisoned".to_owned())
    }

    fn emit(&self, event: BrowserEvent) {
        if self.events.send(event).is_err() {
            tracing::warn!("memory browser event thread stopped");
        }
    }

    pub fn open_window(&self, urls: &[&str]) -> Result<WindowId, String> {
        let (window_id, tabs) = {
            let mut state = self.lock()?;
            state.next_window_id += 1;
            let window_id = WindowId::from_u64(state.next_window_id);
            let tabs = urls.iter().map(|url| state.new_tab(url)).collect::<Vec<_>>();
            state.windows.insert(window_id, tabs.clone());
            (window_id, tabs)
        };
        self.emit(BrowserEvent::WindowCreated { window_id });
        for tab in tabs {
            self.emit(BrowserEvent::TabUpdated {
                window_id,
                tab_id: tab.id,
                status: TabStatus::Complete,
            });
        }
        Ok(window_id)
    }

    pub fn close_window(&self, window_id: WindowId) -> Result<(), String> {
        let tabs = self
            .lock()?
            .windows
            .remove(&window_id)
            .ok_or_else(|| format!("no window {}", window_id.as_u64()))?;
        for tab in tabs {
            self.emit(BrowserEvent::TabRemoved {
                window_id,
                tab_id: tab.id,
                is_window_closing: true,
            });
        }
        self.emit(BrowserEvent::WindowRemoved { window_id });
        Ok(())
    }

    /// Opens a tab the way a user would, outside of any swap.
    pub fn open_tab(&self, window_id: WindowId, url: &str) -> Result<TabId, String> {
        let tab = {
            let mut state = self.lock()?;
            if !state.windows.contains_key(&window_id) {
                return Err(format!("no window {}", window_id.as_u64()));
            }
            let tab = state.new_tab(url);
            if let Some(tabs) = state.windows.get_mut(&window_id) {
                tabs.push(tab.clone());
            }
            tab
        };
        self.emit(BrowserEvent::TabUpdated {
            window_id,
            tab_id: tab.id,
            status: TabStatus::Loading,
        });
        self.emit(BrowserEvent::TabUpdated {
            window_id,
            tab_id: tab.id,
            status: TabStatus::Complete,
        });
        Ok(tab.id)
    }

    pub fn tabs(&self, window_id: WindowId) -> Vec<HostTab> {
        self.lock()
            .ok()
            .and_then(|state| state.windows.get(&window_id).cloned())
            .unwrap_or_default()
    }
}

impl BrowserHost for MemoryBrowser {
    fn list_windows(&self) -> Result<Vec<WindowId>, String> {
        Ok(self.lock()?.windows.keys().copied().collect())
    }

    fn query_tabs(&self, window_id: WindowId) -> Result<Vec<HostTab>, String> {
        self.lock()?
            .windows
            .get(&window_id)
            .cloned()
            .ok_or_else(|| format!("no window {}", window_id.as_u64()))
    }

    fn create_tabs(&self, window_id: WindowId, urls: Vec<String>) -> Result<(), String> {
        let created = {
            let mut state = self.lock()?;
            if !state.windows.contains_key(&window_id) {
                return Err(format!("no window {}", window_id.as_u64()));
            }
            let created = urls.iter().map(|url| state.new_tab(url)).collect::<Vec<_>>();
            if let Some(tabs) = state.windows.get_mut(&window_id) {
                tabs.extend(created.iter().cloned());
            }
            created
        };
        for tab in created {
            self.emit(BrowserEvent::TabUpdated {
                window_id,
                tab_id: tab.id,
                status: TabStatus::Complete,
            });
        }
        Ok(())
    }

    fn remove_tabs(&self, tab_ids: Vec<TabId>) -> Result<(), String> {
        let removed = {
            let mut state = self.lock()?;
            let mut removed = Vec::new();
            for (window_id, tabs) in state.windows.iter_mut() {
                tabs.retain(|tab| {
                    let hit = tab_ids.contains(&tab.id);
                    if hit {
                        removed.push((*window_id, tab.id));
                    }
                    !hit
                });
            }
            removed
        };
        for (window_id, tab_id) in removed {
            self.emit(BrowserEvent::TabRemoved {
                window_id,
                tab_id,
                is_window_closing: false,
            });
        }
        Ok(())
    }

    fn open_page(&self, window_id: WindowId, url: String) -> Result<(), String> {
        self.open_tab(window_id, &url).map(|_| ())
    }
}
