//! Same-repo vendor sync (spec §4.10): no remote, no `GitClient` involved.
//! The "commit hash" that drives cache-skip and stale-lock detection is
//! derived deterministically from the source files' own content.

use std::path::Path;

use crate::checksum::compute_manifest_hash;
use crate::copy::copy_mappings;
use crate::error::VendorError;
use crate::model::{BranchSpec, PositionRecord, RefMetadata};

/// Copies every mapping in `branch_spec` from `project_root` back into
/// `project_root` (source and destination share a root for internal
/// vendors), then derives a content-addressed "commit hash" over every
/// source file touched, so `can_skip_sync` works unmodified for this path.
pub fn sync_internal_ref(
    project_root: &Path,
    vendor: &str,
    branch_spec: &BranchSpec,
) -> Result<RefMetadata, VendorError> {
    let stats = copy_mappings(project_root, project_root, vendor, &branch_spec.r#ref, branch_spec)?;

    let mut file_hashes = std::collections::BTreeMap::new();
    for dest in &stats.whole_file_destinations {
        let hash = crate::checksum::compute_file_checksum(&project_root.join(dest))
            .map_err(|e| VendorError::Internal {
                message: format!("hashing {dest}: {e}"),
            })?;
        file_hashes.insert(dest.clone(), hash);
    }
    for pos in &stats.positions {
        file_hashes.insert(pos.to.clone(), pos.source_hash.clone());
    }

    let mut manifest: Vec<(String, String)> = file_hashes
        .iter()
        .map(|(p, h)| (p.clone(), h.clone()))
        .collect();
    for pos in &stats.positions {
        manifest.push((pos.from.clone(), pos.source_hash.clone()));
    }
    let commit_hash = compute_manifest_hash(manifest.iter().map(|(p, h)| (p.as_str(), h.as_str())));

    let positions: Vec<PositionRecord> = stats.positions.into_iter().map(PositionRecord::from).collect();

    Ok(RefMetadata {
        commit_hash,
        source_version_tag: None,
        source_url: String::new(),
        license_spdx: None,
        license_path: None,
        positions,
        file_hashes,
    })
}
