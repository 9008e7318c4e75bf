//! Materialization of binary assets embedded in the configuration (images
//! referenced by styles and print layouts).

use std::fs;
use std::path::{Path, PathBuf};

use base64::Engine;
use log::{debug, warn};
use thiserror::Error;

use crate::config::AssetConfig;
use crate::fs::{absolute, ensure_parent_path_exists};

/// Errors produced while saving a single asset.
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("asset path {path} is outside of the allowed directory {root}")]
    Path { path: PathBuf, root: PathBuf },
    #[error("cannot resolve asset path {0}: {1}")]
    Resolve(String, std::io::Error),
    #[error("failed to decode asset payload: {0}")]
    Decode(#[from] base64::DecodeError),
    #[error("failed to write asset {0}: {1}")]
    Write(PathBuf, std::io::Error),
}

/// Decode a base64 payload and write it to `path`, which must lie within
/// `allowed_root`. Missing intermediate directories are created and an
/// existing file is overwritten.
///
/// Nothing is written if the path check or the decoding fails.
pub fn save_asset<P, R>(path: P, payload_base64: &str, allowed_root: R) -> Result<PathBuf, AssetError>
where
    P: AsRef<Path>,
    R: AsRef<Path>,
{
    let path = path.as_ref();
    let root = allowed_root.as_ref();
    let path =
        absolute(path).map_err(|e| AssetError::Resolve(path.display().to_string(), e))?;
    let root =
        absolute(root).map_err(|e| AssetError::Resolve(root.display().to_string(), e))?;
    if path == root || !path.starts_with(&root) {
        return Err(AssetError::Path { path, root });
    }

    let content = base64::engine::general_purpose::STANDARD.decode(payload_base64.trim())?;
    ensure_parent_path_exists(&path).map_err(|e| AssetError::Write(path.clone(), e))?;
    fs::write(&path, content).map_err(|e| AssetError::Write(path.clone(), e))?;
    debug!("Wrote asset {}", path.display());
    Ok(path)
}

/// Saves assets below a fixed root directory, logging and skipping any asset
/// that cannot be written.
#[derive(Debug, Clone)]
pub struct AssetMaterializer {
    allowed_root: PathBuf,
}

impl AssetMaterializer {
    pub fn new<P: AsRef<Path>>(allowed_root: P) -> Self {
        Self {
            allowed_root: allowed_root.as_ref().to_path_buf(),
        }
    }

    pub fn allowed_root(&self) -> &Path {
        &self.allowed_root
    }

    /// Saves every asset belonging to `owner` (a layer or print layout
    /// description used in log messages). Returns the number of assets
    /// written.
    pub fn save_all(&self, owner: &str, assets: &[AssetConfig]) -> usize {
        let mut saved = 0;
        for asset in assets {
            match save_asset(&asset.path, &asset.base64, &self.allowed_root) {
                Ok(_) => saved += 1,
                Err(e) => warn!(
                    "[{}] An error occurred when trying to save {}: {}",
                    owner, asset.path, e
                ),
            }
        }
        saved
    }
}

#[cfg(test)]
mod test {
    use super::*;

    // "hello" in base64
    const HELLO: &str = "aGVsbG8=";

    #[test]
    fn asset_is_written_below_the_allowed_root() {
        let root = tempfile::tempdir().unwrap();
        let target = root.path().join("assets/icons/hello.bin");
        let written = save_asset(&target, HELLO, root.path()).unwrap();
        assert_eq!(written, target);
        assert_eq!(fs::read(&target).unwrap(), b"hello");
    }

    #[test]
    fn existing_asset_is_overwritten() {
        let root = tempfile::tempdir().unwrap();
        let target = root.path().join("hello.bin");
        fs::write(&target, b"stale content").unwrap();
        save_asset(&target, HELLO, root.path()).unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"hello");
    }

    #[test]
    fn path_outside_the_allowed_root_is_rejected_without_writing() {
        let parent = tempfile::tempdir().unwrap();
        let root = parent.path().join("root");
        fs::create_dir(&root).unwrap();
        let escaped = root.join("../outside/hello.bin");

        let err = save_asset(&escaped, HELLO, &root).unwrap_err();
        assert!(matches!(err, AssetError::Path { .. }), "{:?}", err);
        assert!(!parent.path().join("outside").exists());
    }

    #[test]
    fn sibling_directory_with_common_prefix_is_rejected() {
        let parent = tempfile::tempdir().unwrap();
        let root = parent.path().join("assets");
        let sibling = parent.path().join("assets-other/hello.bin");
        let err = save_asset(&sibling, HELLO, &root).unwrap_err();
        assert!(matches!(err, AssetError::Path { .. }), "{:?}", err);
    }

    #[test]
    fn undecodable_payload_is_reported_without_creating_directories() {
        let root = tempfile::tempdir().unwrap();
        let target = root.path().join("nested/hello.bin");
        let err = save_asset(&target, "not base64 at all!", root.path()).unwrap_err();
        assert!(matches!(err, AssetError::Decode(_)), "{:?}", err);
        assert!(!root.path().join("nested").exists());
    }

    #[test]
    fn materializer_skips_failing_assets() {
        let root = tempfile::tempdir().unwrap();
        let materializer = AssetMaterializer::new(root.path());
        let assets = vec![
            AssetConfig {
                path: "/etc/json2qgs-should-not-exist.png".to_string(),
                base64: HELLO.to_string(),
            },
            AssetConfig {
                path: root.path().join("ok.bin").display().to_string(),
                base64: HELLO.to_string(),
            },
        ];
        assert_eq!(materializer.save_all("Layer: test", &assets), 1);
        assert!(root.path().join("ok.bin").exists());
    }
}
