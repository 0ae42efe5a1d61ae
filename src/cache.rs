//! Per-vendor-ref checksum manifest persisted under `<root>/<vendor-dir>/.cache/`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::checksum::compute_file_checksum;
use crate::model::{CacheFileEntry, IncrementalSyncCache};
use crate::safety::sanitize_filename;

/// Upper bound on files hashed into one cache entry; the cache is advisory,
/// so anything beyond this is simply not cached (a cache miss, not an
/// error).
pub const MAX_CACHE_FILES: usize = 1000;

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        CacheStore { dir: dir.into() }
    }

    fn path_for(&self, vendor: &str, r#ref: &str) -> PathBuf {
        let name = sanitize_filename(&format!("{vendor}-{ref}"));
        self.dir.join(format!("{name}.json"))
    }

    /// Returns the previously stored manifest, or `Ok(None)` when absent
    /// (absence is not an error). Corrupt JSON is an error naming the file.
    pub fn load(&self, vendor: &str, r#ref: &str) -> anyhow::Result<Option<IncrementalSyncCache>> {
        let path = self.path_for(vendor, r#ref);
        let bytes = match std::fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let entry: IncrementalSyncCache = serde_json::from_slice(&bytes)
            .map_err(|e| anyhow::anyhow!("corrupt cache file {}: {e}", path.display()))?;
        Ok(Some(entry))
    }

    /// Writes atomically (temp file + rename) to the sanitized filename.
    pub fn save(&self, entry: &IncrementalSyncCache) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(&entry.vendor_name, &entry.r#ref);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(entry)?;
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Builds a new entry by hashing up to [`MAX_CACHE_FILES`] files.
    /// Unreadable files are skipped silently — the cache is advisory.
    /// `now` is supplied by the caller (RFC3339 UTC) so this module has no
    /// direct dependency on wall-clock time.
    pub fn build_cache(
        vendor: &str,
        r#ref: &str,
        commit_hash: &str,
        files: &[(String, PathBuf)],
        now: &str,
    ) -> IncrementalSyncCache {
        let mut entries = Vec::new();
        for (dest_path, disk_path) in files.iter().take(MAX_CACHE_FILES) {
            if let Ok(hash) = compute_file_checksum(disk_path) {
                entries.push(CacheFileEntry {
                    path: dest_path.clone(),
                    hash,
                });
            }
        }
        IncrementalSyncCache {
            vendor_name: vendor.to_string(),
            r#ref: r#ref.to_string(),
            commit_hash: commit_hash.to_string(),
            cached_at: now.to_string(),
            files: entries,
        }
    }
}

/// Cache-skip rule: a valid cache entry for `resolved_commit_hash` whose
/// every mapped destination file currently hashes to the cached value means
/// the sync for this (vendor, ref) can be skipped. Any absent file, hash
/// mismatch, or differing commit forces a full fetch-and-copy.
pub fn can_skip_sync(
    cache: &IncrementalSyncCache,
    resolved_commit_hash: &str,
    project_root: &Path,
) -> bool {
    if cache.commit_hash != resolved_commit_hash {
        return false;
    }
    if cache.files.is_empty() {
        return false;
    }
    cache.files.iter().all(|entry| {
        let disk_path = project_root.join(&entry.path);
        compute_file_checksum(&disk_path)
            .map(|h| h == entry.hash)
            .unwrap_or(false)
    })
}

/// Parses `GIT_VENDOR_CACHE_TTL` — a small subset of Go-style durations:
/// `Nh`, `Nm`, `Ns`, `Nd`. Returns [`DEFAULT_CACHE_TTL`] when unset or
/// unparseable.
pub fn parse_ttl(value: Option<&str>) -> Duration {
    let Some(value) = value else {
        return DEFAULT_CACHE_TTL;
    };
    let value = value.trim();
    if value.is_empty() {
        return DEFAULT_CACHE_TTL;
    }
    let (digits, unit) = value.split_at(value.len() - 1);
    let Ok(n) = digits.parse::<u64>() else {
        return DEFAULT_CACHE_TTL;
    };
    match unit {
        "s" => Duration::from_secs(n),
        "m" => Duration::from_secs(n * 60),
        "h" => Duration::from_secs(n * 3600),
        "d" => Duration::from_secs(n * 86400),
        _ => DEFAULT_CACHE_TTL,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn load_returns_none_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path());
        assert!(store.load("lib", "main").unwrap().is_none());
    }

    #[test]
    fn load_errors_on_corrupt_json() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path());
        std::fs::create_dir_all(dir.path()).unwrap();
        let path = dir.path().join("lib-main.json");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(b"not json").unwrap();
        assert!(store.load("lib", "main").is_err());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = CacheStore::new(dir.path());
        let entry = IncrementalSyncCache {
            vendor_name: "lib".into(),
            r#ref: "main".into(),
            commit_hash: "abc123".into(),
            cached_at: "2026-01-01T00:00:00Z".into(),
            files: vec![CacheFileEntry {
                path: "vendor/lib/api.go".into(),
                hash: "sha256:deadbeef".into(),
            }],
        };
        store.save(&entry).unwrap();
        let loaded = store.load("lib", "main").unwrap().unwrap();
        assert_eq!(loaded.commit_hash, "abc123");
    }

    #[test]
    fn can_skip_sync_requires_matching_commit_and_hashes() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("vendor/lib/api.go");
        std::fs::create_dir_all(dest.parent().unwrap()).unwrap();
        std::fs::write(&dest, b"content").unwrap();
        let hash = compute_file_checksum(&dest).unwrap();

        let cache = IncrementalSyncCache {
            vendor_name: "lib".into(),
            r#ref: "main".into(),
            commit_hash: "abc123".into(),
            cached_at: "now".into(),
            files: vec![CacheFileEntry {
                path: "vendor/lib/api.go".into(),
                hash: hash.clone(),
            }],
        };

        assert!(can_skip_sync(&cache, "abc123", dir.path()));
        assert!(!can_skip_sync(&cache, "different", dir.path()));

        std::fs::write(&dest, b"changed").unwrap();
        assert!(!can_skip_sync(&cache, "abc123", dir.path()));
    }

    #[test]
    fn parse_ttl_handles_units_and_fallback() {
        assert_eq!(parse_ttl(Some("2h")), Duration::from_secs(7200));
        assert_eq!(parse_ttl(Some("30m")), Duration::from_secs(1800));
        assert_eq!(parse_ttl(None), DEFAULT_CACHE_TTL);
        assert_eq!(parse_ttl(Some("garbage")), DEFAULT_CACHE_TTL);
    }
}
