use crate::env::optional_trimmed_path_from_env;
use anyhow::anyhow;
use std::path::{Path, PathBuf};

pub const ROOT_ENV: &str = "TABSPACES_ROOT";

/// `$TABSPACES_ROOT`, or `$HOME/tabspaces` when unset.
pub fn data_root() -> anyhow::Result<PathBuf> {
    if let Some(root) = optional_trimmed_path_from_env(ROOT_ENV)? {
        return Ok(root);
    }
    let home = std::env::var_os("HOME").ok_or_else(|| anyhow!("HOME is not set"))?;
    Ok(PathBuf::from(home).join("tabspaces"))
}

pub fn sqlite_path(root: &Path) -> PathBuf {
    root.join("tabspaces.db")
}
