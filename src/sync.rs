//! Sync engine (spec §4.9): per-vendor, per-ref materialization —
//! cache-skip, lazy clone shared across a vendor's refs, shallow-then-full
//! fetch retry, locked-vs-latest checkout with stale-commit detection,
//! license propagation and compliance gating, mapping copy, hashing, and
//! hook orchestration.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::cache::{CacheStore, can_skip_sync};
use crate::checksum::compute_file_checksum;
use crate::config_store::ProjectLayout;
use crate::copy::copy_mappings;
use crate::error::{HookStage, VendorError};
use crate::fetch::fetch_with_fallback;
use crate::git::{CancelToken, GitClient};
use crate::hooks::{self, HookContext};
use crate::license::{ComplianceChecker, LicenseDetector, propagate_license};
use crate::model::{ComplianceConfig, Enforcement, RefMetadata, Source, VendorConfig, VendorLock, VendorSpec};

/// Injectable collaborators a sync run needs, mirroring the teacher's
/// pattern of threading service interfaces through rather than reaching for
/// globals.
pub struct SyncServices<'a> {
    pub client: &'a dyn GitClient,
    pub license_detector: &'a dyn LicenseDetector,
    pub cache: &'a CacheStore,
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub force: bool,
    pub no_cache: bool,
    pub names: Option<std::collections::HashSet<String>>,
    pub groups: Option<std::collections::HashSet<String>>,
    pub internal_only: bool,
    pub hook_timeout: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        SyncOptions {
            force: false,
            no_cache: false,
            names: None,
            groups: None,
            internal_only: false,
            hook_timeout: hooks::DEFAULT_HOOK_TIMEOUT,
        }
    }
}

/// Outcome of syncing every ref of one vendor.
#[derive(Debug, Clone, Default)]
pub struct VendorSyncOutcome {
    pub refs: BTreeMap<String, RefMetadata>,
    pub warnings: Vec<String>,
    /// Refs skipped entirely via the incremental cache (property 6).
    pub skipped: Vec<String>,
}

/// Vendors selected per spec §4.9 step 3: by name, by group, by
/// `internal_only`, by source type.
pub fn select_vendors<'a>(config: &'a VendorConfig, options: &SyncOptions) -> Vec<&'a VendorSpec> {
    config
        .vendors
        .iter()
        .filter(|v| {
            if options.internal_only && v.source != Source::Internal {
                return false;
            }
            if let Some(names) = &options.names {
                if !names.contains(&v.name) {
                    return false;
                }
            }
            if let Some(groups) = &options.groups {
                if !v.groups.iter().any(|g| groups.contains(g)) {
                    return false;
                }
            }
            true
        })
        .collect()
}

/// `lockMap: vendor -> ref -> commitHash` (spec §4.9 step 2).
pub fn build_lock_map(lock: &VendorLock) -> BTreeMap<(String, String), String> {
    lock.commit_map()
}

fn hook_context(vendor: &VendorSpec, r#ref: &str, project_root: &Path, commit: &str, files_copied: usize) -> HookContext {
    HookContext {
        name: vendor.name.clone(),
        url: vendor.url.clone().unwrap_or_default(),
        r#ref: r#ref.to_string(),
        commit: commit.to_string(),
        root: project_root.display().to_string(),
        files_copied,
        dirs_created: 0,
        extra: Default::default(),
    }
}

/// Syncs every ref of one Git-sourced vendor (spec §4.9 `SyncVendor`).
#[allow(clippy::too_many_arguments)]
pub fn sync_vendor(
    services: &SyncServices,
    layout: &ProjectLayout,
    vendor: &VendorSpec,
    enforcement: Enforcement,
    compliance: Option<&ComplianceConfig>,
    prior_commits: &BTreeMap<(String, String), String>,
    options: &SyncOptions,
    now: &str,
) -> Result<VendorSyncOutcome, VendorError> {
    let temp_dir = tempfile::tempdir().map_err(|e| VendorError::internal(format!("creating temp dir: {e}")))?;
    let cancel = CancelToken::new();
    let mut initialized = false;
    let mut remote_configured = false;

    let mut urls = Vec::new();
    if let Some(u) = &vendor.url {
        urls.push(u.clone());
    }
    urls.extend(vendor.mirrors.iter().cloned());

    let mut outcome = VendorSyncOutcome::default();

    for branch_spec in &vendor.specs {
        let key = (vendor.name.clone(), branch_spec.r#ref.clone());

        if !options.force && !options.no_cache {
            if let Some(prior_hash) = prior_commits.get(&key) {
                match services.cache.load(&vendor.name, &branch_spec.r#ref) {
                    Ok(Some(entry)) if can_skip_sync(&entry, prior_hash, layout.project_root()) => {
                        outcome.skipped.push(branch_spec.r#ref.clone());
                        continue;
                    }
                    Ok(_) => {}
                    Err(e) => log::warn!("cache load failed for {}@{}: {e}", vendor.name, branch_spec.r#ref),
                }
            }
        }

        let pre_ctx = hook_context(vendor, &branch_spec.r#ref, layout.project_root(), "", 0);
        hooks::run_all(
            &vendor.name,
            HookStage::PreSync,
            &vendor.hooks.pre_sync,
            layout.project_root(),
            &pre_ctx,
            options.hook_timeout,
        )?;

        if !initialized {
            services
                .client
                .init(temp_dir.path(), &cancel)
                .map_err(|e| VendorError::internal(format!("initializing clone for {}: {e}", vendor.name)))?;
            initialized = true;
        }

        let used_url = match fetch_with_fallback(
            services.client,
            temp_dir.path(),
            &urls,
            Some(1),
            &branch_spec.r#ref,
            &cancel,
            &mut remote_configured,
        ) {
            Ok(result) => result.used_url,
            Err(_shallow_err) => fetch_with_fallback(
                services.client,
                temp_dir.path(),
                &urls,
                None,
                &branch_spec.r#ref,
                &cancel,
                &mut remote_configured,
            )
            .map_err(|e| VendorError::internal(format!("fetching '{}' for {}: {e}", branch_spec.r#ref, vendor.name)))?
            .used_url,
        };

        let locked_hash = prior_commits.get(&key);
        if let (Some(locked_hash), false) = (locked_hash, options.force) {
            if let Err(e) = services.client.checkout(temp_dir.path(), locked_hash, &cancel) {
                let msg = e.to_string();
                if msg.contains("reference is not a tree") || msg.contains("not a valid object") {
                    return Err(VendorError::StaleCommit {
                        vendor: vendor.name.clone(),
                        short_sha: locked_hash.chars().take(7).collect(),
                    });
                }
                return Err(VendorError::CheckoutFailed {
                    vendor: vendor.name.clone(),
                    r#ref: branch_spec.r#ref.clone(),
                    underlying: msg,
                });
            }
        } else {
            let checked_out = services.client.checkout(temp_dir.path(), "FETCH_HEAD", &cancel);
            if let Err(fetch_head_err) = checked_out {
                services
                    .client
                    .checkout(temp_dir.path(), &branch_spec.r#ref, &cancel)
                    .map_err(|e| VendorError::RefCheckoutFailed {
                        vendor: vendor.name.clone(),
                        r#ref: branch_spec.r#ref.clone(),
                        underlying: format!("{fetch_head_err}; {e}"),
                    })?;
            }
        }

        let commit_hash = services
            .client
            .get_head_hash(temp_dir.path(), &cancel)
            .map_err(|e| VendorError::internal(format!("reading HEAD for {}: {e}", vendor.name)))?;
        let source_version_tag = services
            .client
            .get_tag_for_commit(temp_dir.path(), &commit_hash, &cancel)
            .unwrap_or(None);

        let detected = propagate_license(services.license_detector, temp_dir.path(), &layout.licenses_dir(), &vendor.name)
            .map_err(|e| VendorError::internal(format!("license propagation for {}: {e}", vendor.name)))?;

        if let Some(detected) = &detected {
            ComplianceChecker.check(compliance, enforcement, &vendor.name, &detected.spdx)?;
        }

        let stats = copy_mappings(
            temp_dir.path(),
            layout.project_root(),
            &vendor.name,
            &branch_spec.r#ref,
            branch_spec,
        )?;
        outcome.warnings.extend(stats.warnings.clone());

        let mut dest_paths: std::collections::BTreeSet<String> = stats.whole_file_destinations.iter().cloned().collect();
        dest_paths.extend(stats.positions.iter().map(|p| p.to.clone()));

        let mut file_hashes = BTreeMap::new();
        for dest in &dest_paths {
            let hash = compute_file_checksum(&layout.project_root().join(dest))
                .map_err(|e| VendorError::internal(format!("hashing {dest}: {e}")))?;
            file_hashes.insert(dest.clone(), hash);
        }

        let post_ctx = hook_context(vendor, &branch_spec.r#ref, layout.project_root(), &commit_hash, stats.file_count);
        if let Err(e) = hooks::run_all(
            &vendor.name,
            HookStage::PostSync,
            &vendor.hooks.post_sync,
            layout.project_root(),
            &post_ctx,
            options.hook_timeout,
        ) {
            outcome.warnings.push(e.to_string());
        }

        if !options.no_cache {
            let files: Vec<(String, std::path::PathBuf)> = dest_paths
                .iter()
                .map(|d| (d.clone(), layout.project_root().join(d)))
                .collect();
            let entry = CacheStore::build_cache(&vendor.name, &branch_spec.r#ref, &commit_hash, &files, now);
            if let Err(e) = services.cache.save(&entry) {
                log::warn!("saving cache for {}@{}: {e}", vendor.name, branch_spec.r#ref);
            }
        }

        let positions = stats.positions.into_iter().map(Into::into).collect();
        outcome.refs.insert(
            branch_spec.r#ref.clone(),
            RefMetadata {
                commit_hash,
                source_version_tag,
                source_url: used_url,
                license_spdx: detected.as_ref().map(|d| d.spdx.clone()),
                license_path: detected.as_ref().map(|d| d.path.display().to_string()),
                positions,
                file_hashes,
            },
        );
    }

    Ok(outcome)
}

/// Syncs every ref of one internal-source vendor (spec §4.10), dispatched
/// from the same vendor loop so `sync_all` never special-cases the source
/// type beyond this one branch.
pub fn sync_vendor_internal(
    layout: &ProjectLayout,
    vendor: &VendorSpec,
    options: &SyncOptions,
) -> Result<VendorSyncOutcome, VendorError> {
    let mut outcome = VendorSyncOutcome::default();
    for branch_spec in &vendor.specs {
        let ctx = hook_context(vendor, &branch_spec.r#ref, layout.project_root(), "", 0);
        hooks::run_all(
            &vendor.name,
            HookStage::PreSync,
            &vendor.hooks.pre_sync,
            layout.project_root(),
            &ctx,
            options.hook_timeout,
        )?;

        let metadata = crate::internal_sync::sync_internal_ref(layout.project_root(), &vendor.name, branch_spec)?;

        let ctx = hook_context(
            vendor,
            &branch_spec.r#ref,
            layout.project_root(),
            &metadata.commit_hash,
            metadata.file_hashes.len(),
        );
        if let Err(e) = hooks::run_all(
            &vendor.name,
            HookStage::PostSync,
            &vendor.hooks.post_sync,
            layout.project_root(),
            &ctx,
            options.hook_timeout,
        ) {
            outcome.warnings.push(e.to_string());
        }

        outcome.refs.insert(branch_spec.r#ref.clone(), metadata);
    }
    Ok(outcome)
}

/// Per-vendor result of a full run: `Err` for a vendor never short-circuits
/// the others (spec §7) — the orchestrator collects every outcome.
pub struct SyncRunResult {
    pub outcomes: Vec<(String, Result<VendorSyncOutcome, VendorError>)>,
}

/// Serial top-level orchestrator (spec §4.9 steps 1-4, minus the parallel
/// executor of §4.13, which wraps this per-vendor unit of work instead).
pub fn sync_all(
    services: &SyncServices,
    layout: &ProjectLayout,
    config: &VendorConfig,
    lock: &VendorLock,
    options: &SyncOptions,
    now: &str,
) -> SyncRunResult {
    let prior_commits = build_lock_map(lock);
    let mut outcomes = Vec::new();

    for vendor in select_vendors(config, options) {
        let enforcement = config.enforcement_for(vendor);
        let result = if vendor.source == Source::Internal {
            sync_vendor_internal(layout, vendor, options)
        } else {
            sync_vendor(
                services,
                layout,
                vendor,
                enforcement,
                config.compliance.as_ref(),
                &prior_commits,
                options,
                now,
            )
        };
        outcomes.push((vendor.name.clone(), result));
    }

    SyncRunResult { outcomes }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::{FakeGitClient, FakeRepo};
    use crate::license::TextPatternDetector;
    use crate::model::{BranchSpec, Hooks, PathMapping};

    fn vendor(name: &str, url: &str, r#ref: &str, mapping: Vec<PathMapping>) -> VendorSpec {
        VendorSpec {
            name: name.into(),
            url: Some(url.into()),
            mirrors: vec![],
            license: None,
            groups: vec![],
            hooks: Hooks::default(),
            source: Source::Git,
            enforcement: None,
            specs: vec![BranchSpec {
                r#ref: r#ref.into(),
                default_target: None,
                mapping,
            }],
        }
    }

    #[test]
    fn syncs_one_vendor_and_materializes_the_mapping() {
        let client = FakeGitClient::new();
        client.add_repo(
            "https://example.com/repo",
            FakeRepo::default().with_commit("main", "cafebabe", &[("src/api.go", "package api")]),
        );
        let cache_dir = tempfile::tempdir().unwrap();
        let project_dir = tempfile::tempdir().unwrap();
        let services = SyncServices {
            client: &client,
            license_detector: &TextPatternDetector,
            cache: &CacheStore::new(cache_dir.path()),
        };
        let layout = ProjectLayout::new(project_dir.path(), ".git-vendor");

        let v = vendor(
            "lib",
            "https://example.com/repo",
            "main",
            vec![PathMapping {
                from: "src/api.go".into(),
                to: "vendor/lib/api.go".into(),
            }],
        );
        let outcome = sync_vendor(
            &services,
            &layout,
            &v,
            Enforcement::Lenient,
            None,
            &BTreeMap::new(),
            &SyncOptions::default(),
            "2026-01-01T00:00:00Z",
        )
        .unwrap();

        let meta = outcome.refs.get("main").unwrap();
        assert_eq!(meta.commit_hash, "cafebabe");
        assert_eq!(meta.source_url, "https://example.com/repo");
        assert!(
            std::fs::read_to_string(project_dir.path().join("vendor/lib/api.go"))
                .unwrap()
                .contains("package api")
        );
    }

    #[test]
    fn cache_hit_performs_zero_network_operations() {
        let client = FakeGitClient::new();
        client.add_repo(
            "https://example.com/repo",
            FakeRepo::default().with_commit("main", "cafebabe", &[("src/api.go", "package api")]),
        );
        let cache_dir = tempfile::tempdir().unwrap();
        let project_dir = tempfile::tempdir().unwrap();
        let services = SyncServices {
            client: &client,
            license_detector: &TextPatternDetector,
            cache: &CacheStore::new(cache_dir.path()),
        };
        let layout = ProjectLayout::new(project_dir.path(), ".git-vendor");
        let v = vendor(
            "lib",
            "https://example.com/repo",
            "main",
            vec![PathMapping {
                from: "src/api.go".into(),
                to: "vendor/lib/api.go".into(),
            }],
        );

        let first = sync_vendor(
            &services,
            &layout,
            &v,
            Enforcement::Lenient,
            None,
            &BTreeMap::new(),
            &SyncOptions::default(),
            "2026-01-01T00:00:00Z",
        )
        .unwrap();
        let prior: BTreeMap<(String, String), String> =
            BTreeMap::from([(("lib".to_string(), "main".to_string()), first.refs["main"].commit_hash.clone())]);

        let fetch_calls_before = client.call_count("fetch");
        let second = sync_vendor(
            &services,
            &layout,
            &v,
            Enforcement::Lenient,
            None,
            &prior,
            &SyncOptions::default(),
            "2026-01-02T00:00:00Z",
        )
        .unwrap();
        assert_eq!(client.call_count("fetch"), fetch_calls_before);
        assert_eq!(second.skipped, vec!["main".to_string()]);
    }

    #[test]
    fn stale_locked_commit_surfaces_as_stale_commit_error() {
        let client = FakeGitClient::new();
        client.add_repo(
            "https://example.com/repo",
            FakeRepo::default().with_commit("main", "cafebabe", &[("a", "1")]),
        );
        let cache_dir = tempfile::tempdir().unwrap();
        let project_dir = tempfile::tempdir().unwrap();
        let services = SyncServices {
            client: &client,
            license_detector: &TextPatternDetector,
            cache: &CacheStore::new(cache_dir.path()),
        };
        let layout = ProjectLayout::new(project_dir.path(), ".git-vendor");
        let v = vendor(
            "lib",
            "https://example.com/repo",
            "main",
            vec![PathMapping {
                from: "a".into(),
                to: "vendor/a".into(),
            }],
        );
        let prior: BTreeMap<(String, String), String> =
            BTreeMap::from([(("lib".to_string(), "main".to_string()), "deadbeef".to_string())]);

        let err = sync_vendor(
            &services,
            &layout,
            &v,
            Enforcement::Lenient,
            None,
            &prior,
            &SyncOptions::default(),
            "2026-01-01T00:00:00Z",
        )
        .unwrap_err();
        assert!(matches!(err, VendorError::StaleCommit { .. }));
    }

    #[test]
    fn internal_vendor_dispatches_to_internal_sync() {
        let project_dir = tempfile::tempdir().unwrap();
        std::fs::write(project_dir.path().join("shared.txt"), "hi").unwrap();
        let layout = ProjectLayout::new(project_dir.path(), ".git-vendor");
        let mut v = vendor(
            "shared",
            "unused",
            "internal",
            vec![PathMapping {
                from: "shared.txt".into(),
                to: "copy.txt".into(),
            }],
        );
        v.source = Source::Internal;
        v.url = None;

        let outcome = sync_vendor_internal(&layout, &v, &SyncOptions::default()).unwrap();
        assert!(outcome.refs.contains_key("internal"));
        assert!(project_dir.path().join("copy.txt").is_file());
    }
}
