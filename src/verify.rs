//! Verify, accept, and status (spec §4.12): disk-vs-lockfile
//! classification, drift acceptance, and the upstream-staleness-aware
//! enforcement summary.

use std::collections::HashSet;
use std::path::Path;

use crate::checksum::compute_file_checksum;
use crate::error::VendorError;
use crate::git::{CancelToken, GitClient};
use crate::model::{BranchSpec, Enforcement, VendorConfig, VendorLock, VendorSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    Verified,
    Modified,
    Accepted,
    Missing,
    Added,
    /// The destination is no longer produced by any current mapping of a
    /// ref that still exists in config (mapping renamed/removed).
    Stale,
    /// The `(vendor, ref)` itself no longer exists in config.
    Orphaned,
}

#[derive(Debug, Clone)]
pub struct FileVerification {
    pub vendor: String,
    pub r#ref: String,
    pub path: String,
    pub status: FileStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Summary {
    Pass,
    Warn,
    Fail,
}

#[derive(Debug, Clone)]
pub struct VerifyResult {
    pub files: Vec<FileVerification>,
    pub summary: Summary,
}

/// Destinations the current config would produce for this ref, reused to
/// detect `added` (in config, not yet locked) and `stale` (locked, no
/// longer in config) files. Directory mappings can't be expanded without
/// reading the source tree, so a locked path is also considered "expected"
/// when it falls under a mapped destination used as a directory prefix.
fn expected_destinations(vendor: &VendorSpec, branch_spec: &BranchSpec) -> HashSet<String> {
    branch_spec
        .mapping
        .iter()
        .map(|m| {
            let (src_file, _) = crate::position::split_position_suffix(&m.from);
            let dest_file = if m.to.is_empty() || m.to == "." {
                String::new()
            } else {
                crate::position::split_position_suffix(&m.to).0.to_string()
            };
            if dest_file.is_empty() || dest_file == "." {
                crate::copy::compute_auto_path(src_file, branch_spec.default_target.as_deref(), &vendor.name)
            } else {
                dest_file
            }
        })
        .collect()
}

fn matches_expected(path: &str, expected: &HashSet<String>) -> bool {
    expected.iter().any(|e| path == e || path.starts_with(&format!("{e}/")))
}

/// Disk-only verification: no network calls (spec §4.12; `status` layers
/// the remote check on top).
pub fn verify(config: &VendorConfig, lock: &VendorLock, project_root: &Path) -> VerifyResult {
    let mut files = Vec::new();

    for detail in &lock.vendors {
        let vendor_cfg = config.find(&detail.name);
        let ref_cfg = vendor_cfg.and_then(|v| v.specs.iter().find(|s| s.r#ref == detail.r#ref));
        let orphaned = ref_cfg.is_none();
        let expected = match (vendor_cfg, ref_cfg) {
            (Some(v), Some(spec)) => expected_destinations(v, spec),
            _ => HashSet::new(),
        };

        for (path, hash) in &detail.file_hashes {
            let status = if orphaned {
                FileStatus::Orphaned
            } else {
                let disk_path = project_root.join(path);
                match compute_file_checksum(&disk_path) {
                    Err(_) => FileStatus::Missing,
                    Ok(disk_hash) if disk_hash == *hash => FileStatus::Verified,
                    Ok(disk_hash) if detail.accepted_drift.get(path) == Some(&disk_hash) => FileStatus::Accepted,
                    Ok(_) if !matches_expected(path, &expected) => FileStatus::Stale,
                    Ok(_) => FileStatus::Modified,
                }
            };
            files.push(FileVerification {
                vendor: detail.name.clone(),
                r#ref: detail.r#ref.clone(),
                path: path.clone(),
                status,
            });
        }

        if !orphaned {
            for dest in &expected {
                let locked = detail
                    .file_hashes
                    .keys()
                    .any(|p| p == dest || p.starts_with(&format!("{dest}/")));
                if !locked {
                    files.push(FileVerification {
                        vendor: detail.name.clone(),
                        r#ref: detail.r#ref.clone(),
                        path: dest.clone(),
                        status: FileStatus::Added,
                    });
                }
            }
        }
    }

    let summary = summarize(&files);
    VerifyResult { files, summary }
}

fn summarize(files: &[FileVerification]) -> Summary {
    let mut warn = false;
    for f in files {
        match f.status {
            FileStatus::Modified | FileStatus::Missing | FileStatus::Stale | FileStatus::Orphaned => return Summary::Fail,
            FileStatus::Accepted | FileStatus::Added => warn = true,
            FileStatus::Verified => {}
        }
    }
    if warn { Summary::Warn } else { Summary::Pass }
}

#[derive(Debug, Clone, Default)]
pub struct AcceptOptions<'a> {
    pub file: Option<&'a str>,
    pub clear: bool,
}

/// Accepts (or clears acceptance of) drift for `vendor`, across every ref
/// it has locked. Returns the affected destination paths.
pub fn accept(
    lock: &mut VendorLock,
    project_root: &Path,
    vendor: &str,
    options: &AcceptOptions,
) -> Result<Vec<String>, VendorError> {
    let indices: Vec<usize> = lock
        .vendors
        .iter()
        .enumerate()
        .filter(|(_, d)| d.name == vendor)
        .map(|(i, _)| i)
        .collect();
    if indices.is_empty() {
        return Err(VendorError::VendorNotFound { name: vendor.to_string() });
    }

    let mut affected = Vec::new();

    if options.clear {
        for idx in &indices {
            let detail = &mut lock.vendors[*idx];
            match options.file {
                Some(f) => {
                    if detail.accepted_drift.remove(f).is_some() {
                        affected.push(f.to_string());
                    }
                }
                None => {
                    affected.extend(detail.accepted_drift.keys().cloned());
                    detail.accepted_drift.clear();
                }
            }
        }
        return Ok(affected);
    }

    for idx in &indices {
        let detail = &mut lock.vendors[*idx];
        let paths: Vec<String> = match options.file {
            Some(f) => vec![f.to_string()],
            None => detail.file_hashes.keys().cloned().collect(),
        };
        for path in paths {
            let Some(expected_hash) = detail.file_hashes.get(&path).cloned() else {
                continue;
            };
            let Ok(disk_hash) = compute_file_checksum(&project_root.join(&path)) else {
                continue;
            };
            if disk_hash != expected_hash {
                detail.accepted_drift.insert(path.clone(), disk_hash);
                affected.push(path);
            }
        }
    }

    if affected.is_empty() {
        return Err(VendorError::ValidationFailed {
            vendor: vendor.to_string(),
            field: "file".into(),
            message: "no modified files to accept".into(),
        });
    }
    Ok(affected)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StatusOptions {
    pub offline: bool,
}

#[derive(Debug, Clone)]
pub struct VendorStatus {
    pub vendor: String,
    pub summary: Summary,
    pub outdated: bool,
    pub files: Vec<FileVerification>,
}

/// Composes disk verification with a remote-HEAD comparison per vendor
/// (skipped entirely when `options.offline`), then derives the final
/// per-vendor summary via spec §4.12's enforcement table.
pub fn status(
    client: Option<&dyn GitClient>,
    config: &VendorConfig,
    lock: &VendorLock,
    project_root: &Path,
    options: &StatusOptions,
) -> Vec<VendorStatus> {
    let verified = verify(config, lock, project_root);
    let cancel = CancelToken::new();

    let mut reports: Vec<VendorStatus> = config
        .vendors
        .iter()
        .map(|vendor| {
            let files: Vec<FileVerification> = verified
                .files
                .iter()
                .filter(|f| f.vendor == vendor.name)
                .cloned()
                .collect();
            let enforcement = config.enforcement_for(vendor);

            let outdated = if options.offline {
                false
            } else {
                client
                    .map(|c| vendor_is_outdated(c, vendor, lock, &cancel))
                    .unwrap_or(false)
            };

            let mut summary = derive_summary(&files, enforcement);
            if outdated && summary == Summary::Pass {
                summary = Summary::Fail;
            }

            VendorStatus {
                vendor: vendor.name.clone(),
                summary,
                outdated,
                files,
            }
        })
        .collect();

    // Lock entries whose vendor no longer exists in config produce
    // `Orphaned` files in `verify()` but are never visited by the loop
    // above (it only walks `config.vendors`). Surface one report per such
    // vendor name so `status` fails the same way `verify` does instead of
    // silently dropping the orphaned files.
    let mut orphaned_names: Vec<&str> = lock
        .vendors
        .iter()
        .filter(|d| config.find(&d.name).is_none())
        .map(|d| d.name.as_str())
        .collect();
    orphaned_names.sort_unstable();
    orphaned_names.dedup();
    for name in orphaned_names {
        let files: Vec<FileVerification> = verified.files.iter().filter(|f| f.vendor == name).cloned().collect();
        reports.push(VendorStatus {
            vendor: name.to_string(),
            summary: Summary::Fail,
            outdated: false,
            files,
        });
    }

    reports
}

fn vendor_is_outdated(client: &dyn GitClient, vendor: &VendorSpec, lock: &VendorLock, cancel: &CancelToken) -> bool {
    let Some(url) = &vendor.url else { return false };
    vendor.specs.iter().any(|spec| {
        let Some(locked) = lock.find(&vendor.name, &spec.r#ref) else {
            return false;
        };
        match client.remote_head(url, &spec.r#ref, cancel) {
            Ok(remote_sha) => remote_sha != locked.commit_hash,
            Err(e) => {
                log::warn!("checking upstream staleness for {}@{}: {e}", vendor.name, spec.r#ref);
                false
            }
        }
    })
}

/// Spec §4.12 steps 1-4 (step 5, upstream staleness, is layered on by the
/// caller once `outdated` is known).
fn derive_summary(files: &[FileVerification], enforcement: Enforcement) -> Summary {
    let has_modified = files.iter().any(|f| f.status == FileStatus::Modified);
    let has_hard_fail = files
        .iter()
        .any(|f| matches!(f.status, FileStatus::Missing | FileStatus::Stale | FileStatus::Orphaned));
    if has_hard_fail {
        return Summary::Fail;
    }
    if has_modified {
        return match enforcement {
            Enforcement::Strict => Summary::Fail,
            Enforcement::Lenient => Summary::Warn,
            Enforcement::Info => Summary::Pass,
        };
    }
    if files.iter().any(|f| matches!(f.status, FileStatus::Accepted | FileStatus::Added)) {
        return Summary::Warn;
    }
    Summary::Pass
}
