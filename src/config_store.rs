//! Load/save for `VendorConfig` and `VendorLock`, and the persisted-layout
//! helper (spec §6). Format is an explicit out-of-scope implementation
//! decision (spec §1); this crate resolves it to JSON (see DESIGN.md) so
//! the engine is runnable end-to-end without an unvendored YAML dependency.

use std::path::{Path, PathBuf};

use crate::model::{VendorConfig, VendorLock};

/// Layout of the persisted directory under a project root (spec §6).
#[derive(Debug, Clone)]
pub struct ProjectLayout {
    root: PathBuf,
}

impl ProjectLayout {
    /// `dir_name` is typically `.git-vendor`, but spec §6 allows it to be
    /// configurable (e.g. `"vendor/"`).
    pub fn new(root: impl Into<PathBuf>, dir_name: &str) -> Self {
        ProjectLayout {
            root: root.into().join(dir_name),
        }
    }

    pub fn project_root(&self) -> &Path {
        self.root.parent().unwrap_or(&self.root)
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join("vendor.json")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.root.join("vendor.lock.json")
    }

    pub fn licenses_dir(&self) -> PathBuf {
        self.root.join("licenses")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root.join(".cache")
    }
}

/// Writes `bytes` to `path` atomically: temp file in the same directory,
/// then rename (spec §5's atomicity requirement — a crash before rename
/// leaves the old file intact).
fn write_atomic(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

pub fn load_config(path: &Path) -> anyhow::Result<VendorConfig> {
    match std::fs::read(path) {
        Ok(bytes) => {
            let config: VendorConfig = serde_json::from_slice(&bytes)
                .map_err(|e| anyhow::anyhow!("corrupt config file {}: {e}", path.display()))?;
            Ok(config)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(VendorConfig::default()),
        Err(e) => Err(e.into()),
    }
}

pub fn save_config(path: &Path, config: &VendorConfig) -> anyhow::Result<()> {
    let json = serde_json::to_vec_pretty(config)?;
    write_atomic(path, &json)
}

/// Absence of a lockfile is not an error — spec §4.9 step 1 treats "no
/// lockfile exists (or is empty)" as the trigger for an initial `UpdateAll`.
pub fn load_lock(path: &Path) -> anyhow::Result<VendorLock> {
    match std::fs::read(path) {
        Ok(bytes) if bytes.is_empty() => Ok(VendorLock::default()),
        Ok(bytes) => {
            let lock: VendorLock = serde_json::from_slice(&bytes)
                .map_err(|e| anyhow::anyhow!("corrupt lockfile {}: {e}", path.display()))?;
            Ok(lock)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(VendorLock::default()),
        Err(e) => Err(e.into()),
    }
}

pub fn save_lock(path: &Path, lock: &VendorLock) -> anyhow::Result<()> {
    let json = serde_json::to_vec_pretty(lock)?;
    write_atomic(path, &json)
}
