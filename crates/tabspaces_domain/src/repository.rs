use crate::{KeyValueStore, Settings, StoreBatch, Tab, Theme, Workspace, WorkspaceColor, WorkspaceId};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

pub const WORKSPACE_IDS_KEY: &str = "__workspaces_ids__";
pub const WORKSPACE_LAST_ID_KEY: &str = "__workspaces_last_id__";
pub const SETTINGS_KEY: &str = "__settings__";

#[derive(Debug)]
pub enum RepositoryError {
    Store(String),
    Decode { key: String, message: String },
    Encode { key: String, message: String },
    LastSessionNotPersisted,
}

impl fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Store(message) => write!(f, "store error: {message}"),
            Self::Decode { key, message } => write!(f, "failed to decode {key}: {message}"),
            Self::Encode { key, message } => write!(f, "failed to encode {key}: {message}"),
            Self::LastSessionNotPersisted => write!(f, "the last session is never persisted"),
        }
    }
}

impl std::error::Error for RepositoryError {}

/// New workspace content before an id is assigned.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WorkspaceDraft {
    pub id: Option<WorkspaceId>,
    pub name: String,
    pub color: WorkspaceColor,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SavedWorkspace {
    pub workspace: Workspace,
    pub workspace_ids: Vec<WorkspaceId>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct LoadedData {
    pub workspaces: Vec<Workspace>,
    pub workspace_ids: Vec<WorkspaceId>,
    pub settings: Settings,
}

/// Picks the id for a new workspace. Ids are never handed out twice as long
/// as `last_id` is the persisted high-water mark.
pub fn next_workspace_id(ids: &[WorkspaceId], last_id: u64) -> WorkspaceId {
    let highest = ids.iter().map(|id| id.as_u64()).max().unwrap_or(0);
    WorkspaceId(highest.max(last_id).saturating_add(1))
}

pub fn workspace_key(id: WorkspaceId) -> String {
    id.as_u64().to_string()
}

#[derive(Clone)]
pub struct WorkspaceRepository {
    store: Arc<dyn KeyValueStore>,
}

impl WorkspaceRepository {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn get_ids(&self) -> Result<Vec<WorkspaceId>, RepositoryError> {
        Ok(self.read(WORKSPACE_IDS_KEY)?.unwrap_or_default())
    }

    pub fn get(&self, id: WorkspaceId) -> Result<Option<Workspace>, RepositoryError> {
        if id.is_last_session() {
            return Ok(None);
        }
        self.read(&workspace_key(id))
    }

    /// Persists a new workspace (or promotes the last session) with `tabs`.
    /// Record, index and high-water mark land in one write.
    pub fn save(
        &self,
        draft: WorkspaceDraft,
        tabs: Vec<Tab>,
    ) -> Result<SavedWorkspace, RepositoryError> {
        let ids = self.get_ids()?;
        let last_id = self.last_id()?;
        let id = match draft.id {
            Some(id) if !id.is_last_session() => id,
            _ => next_workspace_id(&ids, last_id),
        };

        let workspace = Workspace {
            id,
            name: draft.name,
            color: draft.color,
            tabs,
        };
        let mut workspace_ids = Vec::with_capacity(ids.len() + 1);
        workspace_ids.push(id);
        workspace_ids.extend(ids.into_iter().filter(|existing| *existing != id));

        let batch = StoreBatch {
            set: vec![
                (workspace_key(id), encode(&workspace_key(id), &workspace)?),
                (
                    WORKSPACE_IDS_KEY.to_owned(),
                    encode(WORKSPACE_IDS_KEY, &workspace_ids)?,
                ),
                (
                    WORKSPACE_LAST_ID_KEY.to_owned(),
                    Value::from(last_id.max(id.as_u64())),
                ),
            ],
            remove: Vec::new(),
        };
        self.store.write(batch).map_err(RepositoryError::Store)?;

        Ok(SavedWorkspace {
            workspace,
            workspace_ids,
        })
    }

    /// Overwrites an existing record. The index is left alone.
    pub fn update(&self, workspace: Workspace) -> Result<Workspace, RepositoryError> {
        if workspace.id.is_last_session() {
            return Err(RepositoryError::LastSessionNotPersisted);
        }
        let key = workspace_key(workspace.id);
        let value = encode(&key, &workspace)?;
        self.store
            .set(vec![(key, value)])
            .map_err(RepositoryError::Store)?;
        Ok(workspace)
    }

    /// Deletes the record and its index entry. Returns the new index.
    pub fn remove(&self, id: WorkspaceId) -> Result<Vec<WorkspaceId>, RepositoryError> {
        let ids = self.get_ids()?;
        let last_id = self.last_id()?;
        let high_water = ids
            .iter()
            .map(|id| id.as_u64())
            .chain([last_id, id.as_u64()])
            .max()
            .unwrap_or(0);
        let workspace_ids = ids
            .into_iter()
            .filter(|existing| *existing != id)
            .collect::<Vec<_>>();

        let batch = StoreBatch {
            set: vec![
                (
                    WORKSPACE_IDS_KEY.to_owned(),
                    encode(WORKSPACE_IDS_KEY, &workspace_ids)?,
                ),
                (WORKSPACE_LAST_ID_KEY.to_owned(), Value::from(high_water)),
            ],
            remove: vec![workspace_key(id)],
        };
        self.store.write(batch).map_err(RepositoryError::Store)?;
        Ok(workspace_ids)
    }

    /// Reads the index, every record it names, and the settings. Ids without a
    /// record are dropped from the returned index.
    pub fn load_all(&self) -> Result<LoadedData, RepositoryError> {
        let mut workspace_ids = Vec::new();
        let mut workspaces = Vec::new();
        for id in self.get_ids()? {
            if id.is_last_session() || workspace_ids.contains(&id) {
                continue;
            }
            if let Some(workspace) = self.get(id)? {
                workspace_ids.push(id);
                workspaces.push(workspace);
            }
        }
        Ok(LoadedData {
            workspaces,
            workspace_ids,
            settings: self.get_settings()?,
        })
    }

    pub fn get_settings(&self) -> Result<Settings, RepositoryError> {
        Ok(self.read(SETTINGS_KEY)?.unwrap_or_default())
    }

    pub fn set_theme(&self, theme: Theme) -> Result<Settings, RepositoryError> {
        let settings = Settings { theme };
        self.store
            .set(vec![(SETTINGS_KEY.to_owned(), encode(SETTINGS_KEY, &settings)?)])
            .map_err(RepositoryError::Store)?;
        Ok(settings)
    }

    fn last_id(&self) -> Result<u64, RepositoryError> {
        Ok(self.read(WORKSPACE_LAST_ID_KEY)?.unwrap_or(0))
    }

    fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, RepositoryError> {
        let Some(value) = self.store.get(key).map_err(RepositoryError::Store)? else {
            return Ok(None);
        };
        serde_json::from_value(value)
            .map(Some)
            .map_err(|err| RepositoryError::Decode {
                key: key.to_owned(),
                message: err.to_string(),
            })
    }
}

fn encode<T: Serialize>(key: &str, value: &T) -> Result<Value, RepositoryError> {
    serde_json::to_value(value).map_err(|err| RepositoryError::Encode {
        key: key.to_owned(),
        message: err.to_string(),
    })
}
