//! Top-level `sync` orchestration (spec §4.9 step 1 and the `StaleCommit`
//! recovery loop): bootstraps an empty lockfile via [`update::update_all`]
//! before the first sync, and retries a vendor once through `update_all`
//! when its sync attempt reports `StaleCommit`. This sits above both
//! `sync` and `update` — neither of those modules may depend on the other,
//! so the "caller treats `StaleCommit` as a signal to auto-run `UpdateAll`
//! and retry" behavior lives here instead of inside `sync_all` itself.

use std::collections::HashSet;

use crate::config_store::ProjectLayout;
use crate::error::VendorError;
use crate::git::CancelToken;
use crate::model::{VendorConfig, VendorLock};
use crate::parallel::{self, ParallelOptions};
use crate::sync::{self, SyncOptions, SyncRunResult, SyncServices};
use crate::update::{self, UpdateOptions};

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub sync: SyncOptions,
    /// `Some` runs vendors across a bounded worker pool (spec §4.13)
    /// instead of the serial loop.
    pub parallel: Option<ParallelOptions>,
    /// When true, an empty lockfile is left empty rather than bootstrapped
    /// via `update_all` (spec §4.9 step 1).
    pub dry_run: bool,
    pub identity: String,
}

fn sync_pass(
    services: &SyncServices,
    layout: &ProjectLayout,
    config: &VendorConfig,
    lock: &VendorLock,
    options: &SyncOptions,
    run_options: &RunOptions,
    now: &str,
) -> SyncRunResult {
    match &run_options.parallel {
        Some(parallel_options) => {
            let cancel = CancelToken::new();
            parallel::sync_all_parallel(services, layout, config, lock, options, parallel_options, &cancel, now)
        }
        None => sync::sync_all(services, layout, config, lock, options, now),
    }
}

pub struct RunResult {
    pub lock: VendorLock,
    pub sync: SyncRunResult,
    /// True if the run bootstrapped an empty lockfile before syncing.
    pub bootstrapped: bool,
    /// Vendors whose initial `StaleCommit` failure was resolved by an
    /// automatic `UpdateAll` and a second sync attempt.
    pub recovered: Vec<String>,
}

fn update_options_for(names: Option<HashSet<String>>, run: &RunOptions) -> UpdateOptions {
    UpdateOptions {
        names,
        groups: run.sync.groups.clone(),
        internal_only: run.sync.internal_only,
        hook_timeout: run.sync.hook_timeout,
        identity: run.identity.clone(),
    }
}

/// The `Sync(options)` entry point of spec §4.9: bootstrap-if-empty, run
/// every selected vendor, then auto-recover any vendor that failed with
/// `StaleCommit` by regenerating its lock entry and syncing it once more.
pub fn run_sync(
    services: &SyncServices,
    layout: &ProjectLayout,
    config: &VendorConfig,
    lock: VendorLock,
    options: &RunOptions,
    now: &str,
) -> RunResult {
    let mut lock = lock;
    let mut bootstrapped = false;

    if lock.vendors.is_empty() && !options.dry_run && !config.vendors.is_empty() {
        let update_opts = update_options_for(options.sync.names.clone(), options);
        let bootstrap = update::update_all(services, layout, config, &lock, &update_opts, now);
        lock = bootstrap.lock;
        bootstrapped = true;
    }

    let mut result = sync_pass(services, layout, config, &lock, &options.sync, options, now);

    let stale_vendors: HashSet<String> = result
        .outcomes
        .iter()
        .filter(|(_, r)| matches!(r, Err(VendorError::StaleCommit { .. })))
        .map(|(name, _)| name.clone())
        .collect();

    let mut recovered = Vec::new();
    if !stale_vendors.is_empty() {
        let update_opts = update_options_for(Some(stale_vendors.clone()), options);
        let recovery = update::update_all(services, layout, config, &lock, &update_opts, now);
        for (name, err) in &recovery.errors {
            log::warn!("auto-recovery for vendor '{name}' after a stale locked commit failed: {err}");
        }
        lock = recovery.lock;

        let retry_options = SyncOptions {
            names: Some(stale_vendors),
            force: true,
            ..options.sync.clone()
        };
        let retry = sync_pass(services, layout, config, &lock, &retry_options, options, now);
        for (name, outcome) in retry.outcomes {
            if let Some(slot) = result.outcomes.iter_mut().find(|(n, _)| *n == name) {
                slot.1 = outcome;
                recovered.push(name);
            }
        }
    }

    RunResult {
        lock,
        sync: result,
        bootstrapped,
        recovered,
    }
}
