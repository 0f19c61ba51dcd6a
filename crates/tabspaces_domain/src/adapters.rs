use crate::{HostTab, TabId, TabStatus, WindowId};
use serde_json::Value;
use std::sync::Arc;

/// Browser notifications the engine reacts to.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum BrowserEvent {
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
}

/// Callback a host uses to push events into the engine. Called from plain
/// threads, never from inside an async task.
pub type BrowserEventSink = Arc<dyn Fn(BrowserEvent) + Send + Sync>;

/// The tab and window capabilities of the hosting browser.
pub trait BrowserHost: Send + Sync {
    fn list_windows(&self) -> Result<Vec<WindowId>, String>;

    fn query_tabs(&self, window_id: WindowId) -> Result<Vec<HostTab>, String>;

    fn create_tabs(&self, window_id: WindowId, urls: Vec<String>) -> Result<(), String>;

    fn remove_tabs(&self, tab_ids: Vec<TabId>) -> Result<(), String>;

    fn open_page(&self, window_id: WindowId, url: String) -> Result<(), String>;
}

/// Sets and removals applied together.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StoreBatch {
    pub set: Vec<(String, Value)>,
    pub remove: Vec<String>,
}

impl StoreBatch {
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.remove.is_empty()
    }
}

/// A string-keyed JSON value store. `write` must apply the whole batch or none of it.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>, String>;

    fn write(&self, batch: StoreBatch) -> Result<(), String>;

    fn set(&self, entries: Vec<(String, Value)>) -> Result<(), String> {
        self.write(StoreBatch {
            set: entries,
            remove: Vec::new(),
        })
    }

    fn remove(&self, keys: Vec<String>) -> Result<(), String> {
        self.write(StoreBatch {
            set: Vec::new(),
            remove: keys,
        })
    }
}
