mod env;
mod memory_browser;
mod memory_store;
pub mod paths;
mod sqlite_store;
mod time;

pub use env::{duration_ms_from_env, optional_trimmed_path_from_env};
pub use memory_browser::MemoryBrowser;
pub use memory_store::MemoryStore;
pub use sqlite_store::SqliteStore;
