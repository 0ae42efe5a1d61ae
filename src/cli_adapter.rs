//! Pure translation from core results to process exit codes (spec §6/§9):
//! the only place `std::process::exit` semantics are decided, so the CLI
//! binary stays a thin wrapper and every other module stays testable
//! without caring what number a shell sees.

use crate::error::VendorError;
use crate::sync::SyncRunResult;
use crate::update::UpdateRunResult;
use crate::verify::{Summary, VerifyResult};

/// Exit code for a single operation's error, per `VendorError::exit_code`.
pub fn error_exit_code(err: &VendorError) -> i32 {
    err.exit_code()
}

/// Worst exit code across every vendor's outcome in a `sync`/`update` run:
/// 0 if every vendor succeeded, else the highest-severity individual code.
pub fn sync_run_exit_code(result: &SyncRunResult) -> i32 {
    result
        .outcomes
        .iter()
        .filter_map(|(_, r)| r.as_ref().err())
        .map(error_exit_code)
        .max()
        .unwrap_or(0)
}

/// `update` surfaces per-vendor errors the same way a sync run does; a
/// non-empty `errors` list takes the worst individual exit code.
pub fn update_run_exit_code(result: &UpdateRunResult) -> i32 {
    result.errors.iter().map(|(_, e)| error_exit_code(e)).max().unwrap_or(0)
}

/// `verify`/`status` exit codes per spec §6's table: `Pass` exits 0,
/// `Fail` (modified/missing/stale) exits 1, `Warn` (accepted drift, added
/// files) exits 2.
pub fn verify_exit_code(result: &VerifyResult) -> i32 {
    summary_exit_code(result.summary)
}

pub fn summary_exit_code(summary: Summary) -> i32 {
    match summary {
        Summary::Pass => 0,
        Summary::Fail => 1,
        Summary::Warn => 2,
    }
}
