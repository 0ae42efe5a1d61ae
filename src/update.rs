//! Update engine (spec §4.11): forces a fresh resolve of every selected
//! vendor (the lock is not consulted for checkout) and folds the result
//! into new `LockDetails`, preserving first-sync provenance and
//! still-valid accepted-drift entries.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

use crate::config_store::ProjectLayout;
use crate::error::VendorError;
use crate::model::{LockDetails, RefMetadata, Source, VendorConfig, VendorLock};
use crate::sync::{self, SyncOptions, SyncServices};

#[derive(Debug, Clone)]
pub struct UpdateOptions {
    pub names: Option<HashSet<String>>,
    pub groups: Option<HashSet<String>>,
    pub internal_only: bool,
    pub hook_timeout: Duration,
    /// Stamped into a new entry's `VendoredBy`; the git user identity or
    /// `"unknown"` (spec §4.11 step 2).
    pub identity: String,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        UpdateOptions {
            names: None,
            groups: None,
            internal_only: false,
            hook_timeout: crate::hooks::DEFAULT_HOOK_TIMEOUT,
            identity: "unknown".to_string(),
        }
    }
}

pub struct UpdateRunResult {
    pub lock: VendorLock,
    pub warnings: Vec<String>,
    /// Per-vendor failures; a failure here does not abort the other
    /// vendors' updates (spec §4.13's non-short-circuiting contract applies
    /// here too since update is built on the same per-vendor unit of work).
    pub errors: Vec<(String, VendorError)>,
}

fn merge_lock_details(
    vendor: &str,
    r#ref: &str,
    metadata: RefMetadata,
    prior: Option<&LockDetails>,
    identity: &str,
    now: &str,
) -> LockDetails {
    let (vendored_at, vendored_by) = match prior {
        Some(p) => (p.vendored_at.clone(), p.vendored_by.clone()),
        None => (now.to_string(), identity.to_string()),
    };
    let accepted_drift = match prior {
        Some(p) => p
            .accepted_drift
            .iter()
            .filter(|(path, hash)| metadata.file_hashes.get(*path) == Some(*hash))
            .map(|(path, hash)| (path.clone(), hash.clone()))
            .collect(),
        None => BTreeMap::new(),
    };

    LockDetails {
        name: vendor.to_string(),
        r#ref: r#ref.to_string(),
        commit_hash: metadata.commit_hash,
        updated: now.to_string(),
        license_spdx: metadata.license_spdx,
        license_path: metadata.license_path,
        source_version_tag: metadata.source_version_tag,
        source_url: metadata.source_url,
        vendored_at,
        vendored_by,
        last_synced_at: now.to_string(),
        file_hashes: metadata.file_hashes,
        accepted_drift,
        positions: metadata.positions,
    }
}

/// Re-orders `lock.vendors` into the config's declaration order (spec
/// §4.13): vendors not present in `config` (orphaned entries) sort last, in
/// their prior relative order.
fn sort_to_declaration_order(lock: &mut VendorLock, config: &VendorConfig) {
    let order: HashMap<&str, usize> = config
        .vendors
        .iter()
        .enumerate()
        .map(|(i, v)| (v.name.as_str(), i))
        .collect();
    lock.vendors.sort_by(|a, b| {
        let ia = order.get(a.name.as_str()).copied().unwrap_or(usize::MAX);
        let ib = order.get(b.name.as_str()).copied().unwrap_or(usize::MAX);
        ia.cmp(&ib).then_with(|| a.r#ref.cmp(&b.r#ref))
    });
}

/// Regenerates the lockfile for every vendor selected by `options` (spec
/// §4.11). Vendors not selected keep their prior lock entries untouched.
pub fn update_all(
    services: &SyncServices,
    layout: &ProjectLayout,
    config: &VendorConfig,
    prior_lock: &VendorLock,
    options: &UpdateOptions,
    now: &str,
) -> UpdateRunResult {
    let sync_options = SyncOptions {
        force: true,
        no_cache: true,
        names: options.names.clone(),
        groups: options.groups.clone(),
        internal_only: options.internal_only,
        hook_timeout: options.hook_timeout,
    };

    let selected = sync::select_vendors(config, &sync_options);
    let selected_names: HashSet<&str> = selected.iter().map(|v| v.name.as_str()).collect();

    let mut new_lock = VendorLock::default();
    for detail in &prior_lock.vendors {
        if !selected_names.contains(detail.name.as_str()) {
            new_lock.vendors.push(detail.clone());
        }
    }

    let mut warnings = Vec::new();
    let mut errors = Vec::new();

    for vendor in selected {
        let enforcement = config.enforcement_for(vendor);
        let result = if vendor.source == Source::Internal {
            sync::sync_vendor_internal(layout, vendor, &sync_options)
        } else {
            sync::sync_vendor(
                services,
                layout,
                vendor,
                enforcement,
                config.compliance.as_ref(),
                &BTreeMap::new(),
                &sync_options,
                now,
            )
        };

        match result {
            Ok(outcome) => {
                warnings.extend(outcome.warnings);
                for (r#ref, metadata) in outcome.refs {
                    let prior = prior_lock.find(&vendor.name, &r#ref);
                    new_lock
                        .vendors
                        .push(merge_lock_details(&vendor.name, &r#ref, metadata, prior, &options.identity, now));
                }
            }
            Err(e) => errors.push((vendor.name.clone(), e)),
        }
    }

    sort_to_declaration_order(&mut new_lock, config);

    UpdateRunResult {
        lock: new_lock,
        warnings,
        errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheStore;
    use crate::git::{FakeGitClient, FakeRepo};
    use crate::license::TextPatternDetector;
    use crate::model::{BranchSpec, Hooks, PathMapping, VendorSpec};

    fn config_with_one_vendor() -> VendorConfig {
        VendorConfig {
            compliance: None,
            vendors: vec![VendorSpec {
                name: "lib".into(),
                url: Some("https://example.com/repo".into()),
                mirrors: vec![],
                license: None,
                groups: vec![],
                hooks: Hooks::default(),
                source: Source::Git,
                enforcement: None,
                specs: vec![BranchSpec {
                    r#ref: "main".into(),
                    default_target: None,
                    mapping: vec![PathMapping {
                        from: "api.go".into(),
                        to: "vendor/lib/api.go".into(),
                    }],
                }],
            }],
        }
    }

    #[test]
    fn first_update_stamps_vendored_at_and_by() {
        let client = FakeGitClient::new();
        client.add_repo(
            "https://example.com/repo",
            FakeRepo::default().with_commit("main", "cafebabe", &[("api.go", "package api")]),
        );
        let cache_dir = tempfile::tempdir().unwrap();
        let project_dir = tempfile::tempdir().unwrap();
        let services = SyncServices {
            client: &client,
            license_detector: &TextPatternDetector,
            cache: &CacheStore::new(cache_dir.path()),
        };
        let layout = ProjectLayout::new(project_dir.path(), ".git-vendor");
        let config = config_with_one_vendor();

        let result = update_all(
            &services,
            &layout,
            &config,
            &VendorLock::default(),
            &UpdateOptions {
                identity: "tester".into(),
                ..Default::default()
            },
            "2026-01-01T00:00:00Z",
        );

        assert!(result.errors.is_empty());
        let entry = result.lock.find("lib", "main").unwrap();
        assert_eq!(entry.vendored_at, "2026-01-01T00:00:00Z");
        assert_eq!(entry.vendored_by, "tester");
        assert_eq!(entry.commit_hash, "cafebabe");
    }

    #[test]
    fn second_update_preserves_vendored_at_and_by_and_is_idempotent() {
        let client = FakeGitClient::new();
        client.add_repo(
            "https://example.com/repo",
            FakeRepo::default().with_commit("main", "cafebabe", &[("api.go", "package api")]),
        );
        let cache_dir = tempfile::tempdir().unwrap();
        let project_dir = tempfile::tempdir().unwrap();
        let services = SyncServices {
            client: &client,
            license_detector: &TextPatternDetector,
            cache: &CacheStore::new(cache_dir.path()),
        };
        let layout = ProjectLayout::new(project_dir.path(), ".git-vendor");
        let config = config_with_one_vendor();

        let first = update_all(
            &services,
            &layout,
            &config,
            &VendorLock::default(),
            &UpdateOptions {
                identity: "tester".into(),
                ..Default::default()
            },
            "2026-01-01T00:00:00Z",
        );
        let second = update_all(
            &services,
            &layout,
            &config,
            &first.lock,
            &UpdateOptions {
                identity: "tester".into(),
                ..Default::default()
            },
            "2026-01-02T00:00:00Z",
        );

        let a = first.lock.find("lib", "main").unwrap();
        let b = second.lock.find("lib", "main").unwrap();
        assert_eq!(a.vendored_at, b.vendored_at);
        assert_eq!(a.vendored_by, b.vendored_by);
        assert_eq!(a.commit_hash, b.commit_hash);
        assert_eq!(a.file_hashes, b.file_hashes);
        assert_ne!(a.last_synced_at, b.last_synced_at);
    }

    #[test]
    fn accepted_drift_survives_only_when_hash_still_matches() {
        let mut prior = VendorLock::default();
        prior.vendors.push(LockDetails {
            name: "lib".into(),
            r#ref: "main".into(),
            commit_hash: "old".into(),
            updated: "2025-01-01T00:00:00Z".into(),
            license_spdx: None,
            license_path: None,
            source_version_tag: None,
            source_url: "https://example.com/repo".into(),
            vendored_at: "2025-01-01T00:00:00Z".into(),
            vendored_by: "alice".into(),
            last_synced_at: "2025-01-01T00:00:00Z".into(),
            file_hashes: BTreeMap::from([("vendor/lib/api.go".to_string(), "sha256:stale".to_string())]),
            accepted_drift: BTreeMap::from([("vendor/lib/api.go".to_string(), "sha256:stale".to_string())]),
            positions: vec![],
        });

        let client = FakeGitClient::new();
        client.add_repo(
            "https://example.com/repo",
            FakeRepo::default().with_commit("main", "cafebabe", &[("api.go", "changed content")]),
        );
        let cache_dir = tempfile::tempdir().unwrap();
        let project_dir = tempfile::tempdir().unwrap();
        let services = SyncServices {
            client: &client,
            license_detector: &TextPatternDetector,
            cache: &CacheStore::new(cache_dir.path()),
        };
        let layout = ProjectLayout::new(project_dir.path(), ".git-vendor");
        let config = config_with_one_vendor();

        let result = update_all(
            &services,
            &layout,
            &config,
            &prior,
            &UpdateOptions::default(),
            "2026-01-01T00:00:00Z",
        );
        let entry = result.lock.find("lib", "main").unwrap();
        assert!(entry.accepted_drift.is_empty());
        assert_eq!(entry.vendored_by, "alice");
    }

    #[test]
    fn unselected_vendors_keep_their_prior_entry_untouched() {
        let mut config = config_with_one_vendor();
        config.vendors.push(VendorSpec {
            name: "other".into(),
            url: Some("https://example.com/other".into()),
            mirrors: vec![],
            license: None,
            groups: vec![],
            hooks: Hooks::default(),
            source: Source::Git,
            enforcement: None,
            specs: vec![BranchSpec {
                r#ref: "main".into(),
                default_target: None,
                mapping: vec![],
            }],
        });

        let mut prior = VendorLock::default();
        prior.vendors.push(LockDetails {
            name: "other".into(),
            r#ref: "main".into(),
            commit_hash: "untouched".into(),
            updated: "2025-01-01T00:00:00Z".into(),
            license_spdx: None,
            license_path: None,
            source_version_tag: None,
            source_url: "https://example.com/other".into(),
            vendored_at: "2025-01-01T00:00:00Z".into(),
            vendored_by: "alice".into(),
            last_synced_at: "2025-01-01T00:00:00Z".into(),
            file_hashes: BTreeMap::new(),
            accepted_drift: BTreeMap::new(),
            positions: vec![],
        });

        let client = FakeGitClient::new();
        client.add_repo(
            "https://example.com/repo",
            FakeRepo::default().with_commit("main", "cafebabe", &[("api.go", "package api")]),
        );
        let cache_dir = tempfile::tempdir().unwrap();
        let project_dir = tempfile::tempdir().unwrap();
        let services = SyncServices {
            client: &client,
            license_detector: &TextPatternDetector,
            cache: &CacheStore::new(cache_dir.path()),
        };
        let layout = ProjectLayout::new(project_dir.path(), ".git-vendor");

        let result = update_all(
            &services,
            &layout,
            &config,
            &prior,
            &UpdateOptions {
                names: Some(HashSet::from(["lib".to_string()])),
                ..Default::default()
            },
            "2026-01-01T00:00:00Z",
        );
        assert_eq!(result.lock.find("other", "main").unwrap().commit_hash, "untouched");
        assert_eq!(result.lock.find("lib", "main").unwrap().commit_hash, "cafebabe");
    }
}
