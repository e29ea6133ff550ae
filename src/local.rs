//! Local filesystem helpers for the mirror target

use crate::error::Result;
use filetime::FileTime;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Create directory and all parents if needed
pub fn ensure_dir_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

/// Apply a remote modification time as the local access and write time.
///
/// Creation time cannot be set portably and stays whatever the platform
/// recorded.
pub fn stamp(path: &Path, modified: SystemTime) -> Result<()> {
    let time = FileTime::from_system_time(modified);
    filetime::set_file_times(path, time, time)?;
    Ok(())
}

/// Map a `/`-separated remote relative directory under a local root
pub fn local_directory(root: &Path, relative_directory: &str) -> PathBuf {
    relative_directory
        .split('/')
        .filter(|part| !part.is_empty())
        .fold(root.to_path_buf(), |path, part| path.join(part))
}
