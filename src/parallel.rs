//! Bounded worker pool over vendors (spec §4.13), each with per-vendor temp
//! isolation. Grounded in `commands/list/collect/mod.rs`'s `rayon::scope` +
//! cell-gathering shape (teacher's only parallel-fan-out pattern), adapted
//! from a fixed set of independent git reads to a dynamic list of vendor
//! sync jobs collected through a `crossbeam_channel` sink, matching
//! SPEC_FULL.md §5's description of this module.

use std::collections::HashMap;

use crate::config_store::ProjectLayout;
use crate::error::VendorError;
use crate::git::CancelToken;
use crate::model::{Source, VendorConfig, VendorLock};
use crate::sync::{self, SyncOptions, SyncRunResult, SyncServices, VendorSyncOutcome};

/// Fixed worker count; default is `min(4, cpu)` per spec §4.13.
#[derive(Debug, Clone, Copy)]
pub struct ParallelOptions {
    pub worker_count: usize,
}

impl Default for ParallelOptions {
    fn default() -> Self {
        ParallelOptions {
            worker_count: std::thread::available_parallelism()
                .map(|n| n.get().min(4))
                .unwrap_or(1),
        }
    }
}

/// One vendor's result as produced by a worker, sent over the channel sink.
struct VendorJobResult {
    name: String,
    declaration_index: usize,
    outcome: Result<VendorSyncOutcome, VendorError>,
}

/// Runs `sync_vendor`/`sync_vendor_internal` for every selected vendor
/// across a bounded pool of `options.worker_count` threads. Each vendor is
/// an independent unit of work with its own temp directory (spec §4.13:
/// "no shared mutable state during execution"); results are gathered via a
/// channel and re-sorted into the config's declaration order once every
/// worker has drained (spec §5's ordering guarantee — completion order
/// inside the pool is unspecified, but the final result never is).
///
/// `cancel` is checked before each vendor's unit of work starts; once set,
/// in-flight vendors still finish their current `GitClient` call (which
/// observes cancellation on its own next invocation) but no new vendor is
/// started.
pub fn sync_all_parallel(
    services: &SyncServices,
    layout: &ProjectLayout,
    config: &VendorConfig,
    lock: &VendorLock,
    options: &SyncOptions,
    parallel: &ParallelOptions,
    cancel: &CancelToken,
    now: &str,
) -> SyncRunResult {
    let prior_commits = sync::build_lock_map(lock);
    let selected = sync::select_vendors(config, options);

    let declaration_index: HashMap<&str, usize> = config
        .vendors
        .iter()
        .enumerate()
        .map(|(i, v)| (v.name.as_str(), i))
        .collect();

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(parallel.worker_count.max(1))
        .build()
        .expect("building the vendor worker pool");

    let (tx, rx) = crossbeam_channel::unbounded::<VendorJobResult>();

    pool.install(|| {
        use rayon::prelude::*;
        selected.par_iter().for_each(|vendor| {
            let idx = declaration_index.get(vendor.name.as_str()).copied().unwrap_or(usize::MAX);

            if cancel.is_cancelled() {
                let _ = tx.send(VendorJobResult {
                    name: vendor.name.clone(),
                    declaration_index: idx,
                    outcome: Err(VendorError::internal("sync cancelled before this vendor started")),
                });
                return;
            }

            let enforcement = config.enforcement_for(vendor);
            let outcome = if vendor.source == Source::Internal {
                sync::sync_vendor_internal(layout, vendor, options)
            } else {
                sync::sync_vendor(
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

            let _ = tx.send(VendorJobResult {
                name: vendor.name.clone(),
                declaration_index: idx,
                outcome,
            });
        });
    });
    drop(tx);

    let mut results: Vec<VendorJobResult> = rx.iter().collect();
    results.sort_by_key(|r| r.declaration_index);

    SyncRunResult {
        outcomes: results.into_iter().map(|r| (r.name, r.outcome)).collect(),
    }
}

/// Signals `cancel` and lets already-dispatched workers observe it on
/// their next `GitClient` call, per spec §5's cancellation model.
pub fn request_cancellation(cancel: &CancelToken) {
    cancel.cancel();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheStore;
    use crate::git::{FakeGitClient, FakeRepo};
    use crate::license::TextPatternDetector;
    use crate::model::{BranchSpec, Hooks, PathMapping, VendorSpec};

    fn vendor(name: &str, url: &str) -> VendorSpec {
        VendorSpec {
            name: name.into(),
            url: Some(url.into()),
            mirrors: vec![],
            license: None,
            groups: vec![],
            hooks: Hooks::default(),
            source: crate::model::Source::Git,
            enforcement: None,
            specs: vec![BranchSpec {
                r#ref: "main".into(),
                default_target: None,
                mapping: vec![PathMapping {
                    from: "a.txt".into(),
                    to: format!("vendor/{name}/a.txt"),
                }],
            }],
        }
    }

    #[test]
    fn runs_every_vendor_and_preserves_declaration_order_in_the_result() {
        let client = FakeGitClient::new();
        client.add_repo(
            "https://example.com/one",
            FakeRepo::default().with_commit("main", "c1", &[("a.txt", "one")]),
        );
        client.add_repo(
            "https://example.com/two",
            FakeRepo::default().with_commit("main", "c2", &[("a.txt", "two")]),
        );

        let cache_dir = tempfile::tempdir().unwrap();
        let project_dir = tempfile::tempdir().unwrap();
        let services = SyncServices {
            client: &client,
            license_detector: &TextPatternDetector,
            cache: &CacheStore::new(cache_dir.path()),
        };
        let layout = ProjectLayout::new(project_dir.path(), ".git-vendor");

        let config = VendorConfig {
            compliance: None,
            vendors: vec![
                vendor("one", "https://example.com/one"),
                vendor("two", "https://example.com/two"),
            ],
        };

        let cancel = CancelToken::new();
        let result = sync_all_parallel(
            &services,
            &layout,
            &config,
            &VendorLock::default(),
            &SyncOptions::default(),
            &ParallelOptions { worker_count: 2 },
            &cancel,
            "2026-01-01T00:00:00Z",
        );

        assert_eq!(result.outcomes.len(), 2);
        assert_eq!(result.outcomes[0].0, "one");
        assert_eq!(result.outcomes[1].0, "two");
        assert!(result.outcomes.iter().all(|(_, r)| r.is_ok()));
    }

    #[test]
    fn one_vendors_failure_does_not_short_circuit_the_others() {
        let client = FakeGitClient::new();
        client.add_repo("https://example.com/bad", FakeRepo::default());
        client.fail("https://example.com/bad");
        client.add_repo(
            "https://example.com/good",
            FakeRepo::default().with_commit("main", "c2", &[("a.txt", "two")]),
        );

        let cache_dir = tempfile::tempdir().unwrap();
        let project_dir = tempfile::tempdir().unwrap();
        let services = SyncServices {
            client: &client,
            license_detector: &TextPatternDetector,
            cache: &CacheStore::new(cache_dir.path()),
        };
        let layout = ProjectLayout::new(project_dir.path(), ".git-vendor");

        let config = VendorConfig {
            compliance: None,
            vendors: vec![
                vendor("bad", "https://example.com/bad"),
                vendor("good", "https://example.com/good"),
            ],
        };

        let cancel = CancelToken::new();
        let result = sync_all_parallel(
            &services,
            &layout,
            &config,
            &VendorLock::default(),
            &SyncOptions::default(),
            &ParallelOptions { worker_count: 2 },
            &cancel,
            "2026-01-01T00:00:00Z",
        );

        let ok_count = result.outcomes.iter().filter(|(_, r)| r.is_ok()).count();
        let err_count = result.outcomes.iter().filter(|(_, r)| r.is_err()).count();
        assert_eq!(ok_count, 1);
        assert_eq!(err_count, 1);
    }

    #[test]
    fn pre_cancelled_token_fails_every_vendor_without_network_calls() {
        let client = FakeGitClient::new();
        client.add_repo(
            "https://example.com/one",
            FakeRepo::default().with_commit("main", "c1", &[("a.txt", "one")]),
        );
        let cache_dir = tempfile::tempdir().unwrap();
        let project_dir = tempfile::tempdir().unwrap();
        let services = SyncServices {
            client: &client,
            license_detector: &TextPatternDetector,
            cache: &CacheStore::new(cache_dir.path()),
        };
        let layout = ProjectLayout::new(project_dir.path(), ".git-vendor");
        let config = VendorConfig {
            compliance: None,
            vendors: vec![vendor("one", "https://example.com/one")],
        };

        let cancel = CancelToken::new();
        request_cancellation(&cancel);
        let result = sync_all_parallel(
            &services,
            &layout,
            &config,
            &VendorLock::default(),
            &SyncOptions::default(),
            &ParallelOptions { worker_count: 1 },
            &cancel,
            "2026-01-01T00:00:00Z",
        );

        assert!(result.outcomes[0].1.is_err());
        assert_eq!(client.call_count("fetch"), 0);
    }
}
