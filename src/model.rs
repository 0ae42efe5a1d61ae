//! The vendor-record data model: `VendorSpec`, `BranchSpec`, `PathMapping`,
//! `PositionSpec`, `LockDetails`, `VendorLock`, `IncrementalSyncCache`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Per-vendor policy; an empty/absent value inherits the config-level
/// default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Enforcement {
    Strict,
    Lenient,
    Info,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Git,
    Internal,
}

impl Default for Source {
    fn default() -> Self {
        Source::Git
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Hooks {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pre_sync: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post_sync: Vec<String>,
}

/// A declared external (or internal) dependency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mirrors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,
    #[serde(default, skip_serializing_if = "Hooks::is_empty")]
    pub hooks: Hooks,
    #[serde(default)]
    pub source: Source,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enforcement: Option<Enforcement>,
    pub specs: Vec<BranchSpec>,
}

impl Hooks {
    fn is_empty(&self) -> bool {
        self.pre_sync.is_empty() && self.post_sync.is_empty()
    }
}

impl VendorSpec {
    /// `Name` must be non-empty; `URL` is required unless `Source ==
    /// Internal`; `Specs` must have at least one entry.
    pub fn validate(&self) -> Result<(), crate::error::VendorError> {
        use crate::error::VendorError;
        if self.name.is_empty() {
            return Err(VendorError::ValidationFailed {
                vendor: self.name.clone(),
                field: "name".into(),
                message: "must be non-empty".into(),
            });
        }
        if self.source == Source::Git && self.url.as_deref().unwrap_or("").is_empty() {
            return Err(VendorError::ValidationFailed {
                vendor: self.name.clone(),
                field: "url".into(),
                message: "required unless source is internal".into(),
            });
        }
        if self.specs.is_empty() {
            return Err(VendorError::ValidationFailed {
                vendor: self.name.clone(),
                field: "specs".into(),
                message: "must declare at least one ref".into(),
            });
        }
        Ok(())
    }
}

/// One ref of one vendor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchSpec {
    pub r#ref: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_target: Option<String>,
    pub mapping: Vec<PathMapping>,
}

/// A source-to-destination copy rule. `From`/`To` may carry a position
/// suffix (`:L<n>[-L<m>]`, `:L<n>C<c>-L<m>C<d>`, `:L<n>-EOF`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathMapping {
    pub from: String,
    #[serde(default)]
    pub to: String,
}

/// A parsed position suffix. Lines and columns are 1-indexed, inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionSpec {
    pub start_line: usize,
    pub end_line: usize,
    pub start_col: Option<usize>,
    pub end_col: Option<usize>,
    pub to_eof: bool,
}

impl PositionSpec {
    pub fn has_columns(&self) -> bool {
        self.start_col.is_some() && self.end_col.is_some()
    }
}

/// One position-mapping record persisted in the lockfile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionRecord {
    pub from: String,
    pub to: String,
    pub source_hash: String,
}

/// Per (vendor, ref) record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LockDetails {
    pub name: String,
    pub r#ref: String,
    pub commit_hash: String,
    pub updated: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_spdx: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_version_tag: Option<String>,
    pub source_url: String,

    pub vendored_at: String,
    pub vendored_by: String,
    pub last_synced_at: String,

    #[serde(default)]
    pub file_hashes: BTreeMap<String, String>,
    #[serde(default)]
    pub accepted_drift: BTreeMap<String, String>,
    #[serde(default)]
    pub positions: Vec<PositionRecord>,
}

impl LockDetails {
    pub fn key(&self) -> (String, String) {
        (self.name.clone(), self.r#ref.clone())
    }
}

/// Ordered list of `LockDetails`. Identity key is `(Name, Ref)`; duplicates
/// are ill-formed (rejected by `VendorLock::validate`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VendorLock {
    #[serde(default)]
    pub vendors: Vec<LockDetails>,
}

impl VendorLock {
    pub fn find(&self, name: &str, r#ref: &str) -> Option<&LockDetails> {
        self.vendors
            .iter()
            .find(|d| d.name == name && d.r#ref == r#ref)
    }

    pub fn find_mut(&mut self, name: &str, r#ref: &str) -> Option<&mut LockDetails> {
        self.vendors
            .iter_mut()
            .find(|d| d.name == name && d.r#ref == r#ref)
    }

    /// `(Name, Ref)` -> `CommitHash`, as used to decide checkout-locked vs.
    /// checkout-latest during sync.
    pub fn commit_map(&self) -> BTreeMap<(String, String), String> {
        self.vendors
            .iter()
            .map(|d| (d.key(), d.commit_hash.clone()))
            .collect()
    }

    pub fn validate(&self) -> Result<(), crate::error::VendorError> {
        use crate::error::VendorError;
        let mut seen = std::collections::HashSet::new();
        for d in &self.vendors {
            if !seen.insert(d.key()) {
                return Err(VendorError::ValidationFailed {
                    vendor: d.name.clone(),
                    field: "ref".into(),
                    message: format!("duplicate lock entry for ref '{}'", d.r#ref),
                });
            }
        }
        Ok(())
    }
}

/// One hashed file entry in an incremental sync cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheFileEntry {
    pub path: String,
    pub hash: String,
}

/// Per (vendor, ref) side table used for fast skip-on-unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct IncrementalSyncCache {
    pub vendor_name: String,
    pub r#ref: String,
    pub commit_hash: String,
    pub cached_at: String,
    pub files: Vec<CacheFileEntry>,
}

/// Root persisted config document: `{compliance?, vendors: [...]}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VendorConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compliance: Option<ComplianceConfig>,
    #[serde(default)]
    pub vendors: Vec<VendorSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ComplianceConfig {
    #[serde(default)]
    pub allowed_licenses: Vec<String>,
    #[serde(default = "default_enforcement")]
    pub default_enforcement: Enforcement,
}

fn default_enforcement() -> Enforcement {
    Enforcement::Lenient
}

impl VendorConfig {
    pub fn find(&self, name: &str) -> Option<&VendorSpec> {
        self.vendors.iter().find(|v| v.name == name)
    }

    /// Vendor enforcement level, falling through to the config default and
    /// finally `Lenient` when no compliance block is configured.
    pub fn enforcement_for(&self, vendor: &VendorSpec) -> Enforcement {
        vendor.enforcement.unwrap_or_else(|| {
            self.compliance
                .as_ref()
                .map(|c| c.default_enforcement)
                .unwrap_or(Enforcement::Lenient)
        })
    }
}

/// Per-ref outcome of a sync pass, shared by the networked (§4.9k) and
/// internal (§4.10) engines; `update` folds this into a `LockDetails`.
#[derive(Debug, Clone, Default)]
pub struct RefMetadata {
    pub commit_hash: String,
    pub source_version_tag: Option<String>,
    pub source_url: String,
    pub license_spdx: Option<String>,
    pub license_path: Option<String>,
    pub positions: Vec<PositionRecord>,
    pub file_hashes: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_vendor() -> VendorSpec {
        VendorSpec {
            name: "lib".into(),
            url: Some("https://github.com/owner/repo".into()),
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
                    from: "src/api.go".into(),
                    to: "vendor/lib/api.go".into(),
                }],
            }],
        }
    }

    #[test]
    fn validate_rejects_empty_name() {
        let mut v = minimal_vendor();
        v.name = String::new();
        assert!(v.validate().is_err());
    }

    #[test]
    fn validate_rejects_missing_url_for_git_source() {
        let mut v = minimal_vendor();
        v.url = None;
        assert!(v.validate().is_err());
    }

    #[test]
    fn validate_allows_missing_url_for_internal_source() {
        let mut v = minimal_vendor();
        v.url = None;
        v.source = Source::Internal;
        assert!(v.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_specs() {
        let mut v = minimal_vendor();
        v.specs.clear();
        assert!(v.validate().is_err());
    }

    #[test]
    fn lock_validate_rejects_duplicate_ref_keys() {
        let entry = |name: &str, r#ref: &str| LockDetails {
            name: name.into(),
            r#ref: r#ref.into(),
            commit_hash: "abc".into(),
            updated: "2026-01-01T00:00:00Z".into(),
            license_spdx: None,
            license_path: None,
            source_version_tag: None,
            source_url: "https://example.com".into(),
            vendored_at: "2026-01-01T00:00:00Z".into(),
            vendored_by: "tester".into(),
            last_synced_at: "2026-01-01T00:00:00Z".into(),
            file_hashes: BTreeMap::new(),
            accepted_drift: BTreeMap::new(),
            positions: vec![],
        };
        let lock = VendorLock {
            vendors: vec![entry("lib", "main"), entry("lib", "main")],
        };
        assert!(lock.validate().is_err());
    }

    #[test]
    fn enforcement_falls_through_to_default() {
        let cfg = VendorConfig {
            compliance: Some(ComplianceConfig {
                allowed_licenses: vec![],
                default_enforcement: Enforcement::Strict,
            }),
            vendors: vec![],
        };
        let v = minimal_vendor();
        assert_eq!(cfg.enforcement_for(&v), Enforcement::Strict);
    }
}
