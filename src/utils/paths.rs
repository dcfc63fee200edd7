//! Local filesystem locations for dockhand's own state.

use std::path::PathBuf;

use crate::error::{Error, Result};

/// Root config directory, `~/.config/dockhand` on Linux.
pub fn config_dir() -> Result<PathBuf> {
    let base = dirs::config_dir()
        .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))?;
    Ok(base.join("dockhand"))
}

/// JSON registry of known servers.
pub fn servers_file() -> Result<PathBuf> {
    Ok(config_dir()?.join("servers.json"))
}

/// SQLite database holding audit records.
pub fn audit_db() -> Result<PathBuf> {
    Ok(config_dir()?.join("audit.db"))
}

/// Create the config directory if it does not exist yet.
pub fn ensure_config_dir() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
