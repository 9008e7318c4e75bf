//! File system-related utilities.

use std::fs;
use std::path::{Component, Path, PathBuf};

use log::debug;

/// Resolve the given path to an absolute, normalized path without touching
/// the file system. Relative paths are resolved against the current working
/// directory, and `.`/`..` components are collapsed lexically so that paths
/// which do not exist yet can still be compared.
pub fn absolute<P: AsRef<Path>>(path: P) -> std::io::Result<PathBuf> {
    let path = path.as_ref();
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::ParentDir => {
                normalized.pop();
            }
            Component::CurDir => {}
            other => normalized.push(other.as_os_str()),
        }
    }
    Ok(normalized)
}

/// Create the parent directory of the given path, including any missing
/// ancestors.
pub fn ensure_parent_path_exists(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.is_dir() => {
            fs::create_dir_all(parent)?;
            debug!("Created path: {}", parent.display());
            Ok(())
        }
        _ => Ok(()),
    }
}
