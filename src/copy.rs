//! File-copy service (spec §4.8): whole-file, directory, and position-range
//! copies; local-modification detection; `ComputeAutoPath`.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::checksum::{compute_bytes_checksum, compute_file_checksum, is_binary_content};
use crate::error::VendorError;
use crate::model::{BranchSpec, PositionRecord};
use crate::position::{extract_position, parse_position_spec, place_content, split_position_suffix};
use crate::safety::validate_dest_path;

/// One recorded position mapping applied during this copy pass.
#[derive(Debug, Clone)]
pub struct PositionCopyRecord {
    pub from: String,
    pub to: String,
    pub source_hash: String,
}

impl From<PositionCopyRecord> for PositionRecord {
    fn from(r: PositionCopyRecord) -> Self {
        PositionRecord {
            from: r.from,
            to: r.to,
            source_hash: r.source_hash,
        }
    }
}

/// Aggregated result of one `copy_mappings` call.
#[derive(Debug, Clone, Default)]
pub struct CopyStats {
    pub file_count: usize,
    pub byte_count: u64,
    pub warnings: Vec<String>,
    pub positions: Vec<PositionCopyRecord>,
    /// Project-root-relative whole-file destinations materialized this
    /// pass (position-range destinations are tracked separately in
    /// `positions`), for the caller to hash into `FileHashes`.
    pub whole_file_destinations: Vec<String>,
}

static WEB_URL_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(blob|tree)/[^/]+/").unwrap());

/// Strips a `blob/<ref>/` or `tree/<ref>/` prefix some users paste in
/// directly from a GitHub file-view URL.
fn strip_web_url_prefix(from: &str) -> &str {
    match WEB_URL_PREFIX.find(from) {
        Some(m) => &from[m.end()..],
        None => from,
    }
}

/// `basename(src_file)`, falling back to `vendor_name` when the basename is
/// `""`, `"."`, or `"/"`; `default_target` (when set) is prepended.
///
/// Resolution of spec §9 item 4 (SPEC_FULL.md §9.4): when
/// `basename(src) == vendor_name` this keeps the single-component result
/// rather than nesting it again under `vendor_name` — `default_target`
/// already supplies the nesting when the caller wants it.
pub fn compute_auto_path(src_file: &str, default_target: Option<&str>, vendor_name: &str) -> String {
    let base = Path::new(src_file)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");
    let base = if base.is_empty() || base == "." || base == "/" {
        vendor_name
    } else {
        base
    };
    match default_target {
        Some(target) if !target.is_empty() => format!("{}/{}", target.trim_end_matches('/'), base),
        _ => base.to_string(),
    }
}

fn parse_field(field: &str) -> Result<(String, Option<crate::model::PositionSpec>), VendorError> {
    let (path, suffix) = split_position_suffix(field);
    match suffix {
        Some(s) => Ok((path.to_string(), Some(parse_position_spec(field, s)?))),
        None => Ok((path.to_string(), None)),
    }
}

/// Iterates `branch_spec.mapping` applying spec §4.8's algorithm.
/// `repo_root` is the fetched clone (or, for internal vendors, the
/// project root); `project_root` is where destinations are written.
pub fn copy_mappings(
    repo_root: &Path,
    project_root: &Path,
    vendor: &str,
    r#ref: &str,
    branch_spec: &BranchSpec,
) -> Result<CopyStats, VendorError> {
    let mut stats = CopyStats::default();

    for mapping in &branch_spec.mapping {
        let from_stripped = strip_web_url_prefix(&mapping.from);
        let (src_file, src_pos) = parse_field(from_stripped).map_err(|e| attach_vendor_ref(e, vendor, r#ref))?;
        let (mut dest_file, dest_pos) = if mapping.to.is_empty() || mapping.to == "." {
            (String::new(), None)
        } else {
            parse_field(&mapping.to).map_err(|e| attach_vendor_ref(e, vendor, r#ref))?
        };

        if dest_file.is_empty() || dest_file == "." {
            dest_file = compute_auto_path(&src_file, branch_spec.default_target.as_deref(), vendor);
        }

        validate_dest_path(&dest_file).map_err(|e| attach_vendor_ref(e, vendor, r#ref))?;

        let dest_path = project_root.join(&dest_file);
        let src_path = repo_root.join(&src_file);

        if let Some(pos) = src_pos {
            let content = std::fs::read(&src_path).map_err(|_| VendorError::PathNotFound {
                path: src_file.clone(),
                vendor: vendor.to_string(),
                r#ref: r#ref.to_string(),
            })?;
            let source_hash = compute_bytes_checksum(&content);
            let extracted = extract_position(&src_file, &content, &pos)?;
            if let Some(parent) = dest_path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| VendorError::Internal {
                    message: format!("{}: {e}", parent.display()),
                })?;
            }
            place_content(&dest_path, &extracted, dest_pos.as_ref())?;
            stats.file_count += 1;
            stats.byte_count += extracted.len() as u64;
            stats.positions.push(PositionCopyRecord {
                from: mapping.from.clone(),
                to: dest_file.clone(),
                source_hash,
            });
            continue;
        }

        let metadata = std::fs::symlink_metadata(&src_path).map_err(|_| VendorError::PathNotFound {
            path: src_file.clone(),
            vendor: vendor.to_string(),
            r#ref: r#ref.to_string(),
        })?;

        if metadata.is_dir() {
            copy_dir_recursive(&src_path, &dest_path, &dest_file, &mut stats).map_err(|e| VendorError::Internal {
                message: format!("copying directory {}: {e}", src_file),
            })?;
        } else {
            copy_one_file(&src_path, &dest_path, &dest_file, &mut stats).map_err(|e| VendorError::Internal {
                message: format!("copying file {}: {e}", src_file),
            })?;
            stats.whole_file_destinations.push(dest_file.clone());
        }
    }

    Ok(stats)
}

fn attach_vendor_ref(err: VendorError, vendor: &str, r#ref: &str) -> VendorError {
    match err {
        VendorError::ValidationFailed { field, message, .. } => VendorError::ValidationFailed {
            vendor: vendor.to_string(),
            field,
            message: format!("ref '{ref}': {message}"),
        },
        other => other,
    }
}

fn copy_one_file(src: &Path, dest: &Path, dest_rel: &str, stats: &mut CopyStats) -> std::io::Result<()> {
    let content = std::fs::read(src)?;

    if dest.is_file() {
        let existing = std::fs::read(dest)?;
        if existing != content {
            stats
                .warnings
                .push(format!("{dest_rel}: overwriting local modifications"));
        }
    }

    if is_binary_content(&content) {
        stats
            .warnings
            .push(format!("{dest_rel}: binary file copied as-is"));
    }

    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(dest, &content)?;
    stats.file_count += 1;
    stats.byte_count += content.len() as u64;
    Ok(())
}

fn copy_dir_recursive(src: &Path, dest: &Path, dest_rel_prefix: &str, stats: &mut CopyStats) -> std::io::Result<()> {
    std::fs::create_dir_all(dest)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let name = entry.file_name();
        if name == ".git" {
            continue;
        }
        let name_str = name.to_string_lossy().into_owned();
        let src_child = entry.path();
        let dest_child = dest.join(&name);
        let dest_rel = format!("{dest_rel_prefix}/{name_str}");
        let meta = entry.metadata()?;
        if meta.is_dir() {
            copy_dir_recursive(&src_child, &dest_child, &dest_rel, stats)?;
        } else {
            copy_one_file(&src_child, &dest_child, &dest_rel, stats)?;
            stats.whole_file_destinations.push(dest_rel);
        }
    }
    Ok(())
}

/// True when `path` exists and its content differs from `expected_hash`
/// (used by verify/accept, spec §4.12).
pub fn has_local_modification(path: &Path, expected_hash: &str) -> bool {
    match compute_file_checksum(path) {
        Ok(hash) => hash != expected_hash,
        Err(_) => true,
    }
}
