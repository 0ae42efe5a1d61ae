//! Pluggable license detection (spec §2's component table: "text pattern
//! matcher + provider-API or fallback clone-and-scan"; SPEC_FULL.md §4.14).
//!
//! The canonical license-filename list is fixed once here and used at every
//! call site that looks for a vendor's license (resolving spec §9 item 3,
//! which flags that the source's file list "varies slightly across code
//! paths").

use std::path::{Path, PathBuf};

/// Every filename this engine treats as a candidate license file, checked
/// in this order at the root of a fetched tree.
pub const LICENSE_FILENAMES: &[&str] = &[
    "LICENSE",
    "LICENSE.txt",
    "LICENSE.md",
    "LICENCE",
    "LICENCE.txt",
    "LICENCE.md",
    "COPYING",
    "COPYING.txt",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confidence {
    /// Matched a known SPDX header phrase.
    High,
    /// A license file exists but its body didn't match a known pattern.
    Unknown,
}

#[derive(Debug, Clone)]
pub struct DetectedLicense {
    pub spdx: String,
    pub path: PathBuf,
    pub confidence: Confidence,
}

pub trait LicenseDetector: Send + Sync {
    fn detect(&self, clone_dir: &Path) -> anyhow::Result<Option<DetectedLicense>>;
}

/// SPDX identifier -> header phrases that, if present, identify it. Kept
/// intentionally small; an unmatched-but-present file still gets recorded
/// as `UNKNOWN`, never silently dropped.
const SPDX_PATTERNS: &[(&str, &[&str])] = &[
    ("MIT", &["Permission is hereby granted, free of charge"]),
    (
        "Apache-2.0",
        &["Apache License", "Version 2.0"],
    ),
    (
        "BSD-3-Clause",
        &["Redistributions of source code must retain", "Neither the name"],
    ),
    (
        "BSD-2-Clause",
        &["Redistributions of source code must retain"],
    ),
    ("GPL-3.0", &["GNU GENERAL PUBLIC LICENSE", "Version 3"]),
    ("MPL-2.0", &["Mozilla Public License Version 2.0"]),
    ("ISC", &["ISC License", "Permission to use, copy, modify"]),
    ("Unlicense", &["This is free and unencumbered software"]),
);

fn match_spdx(body: &str) -> Option<&'static str> {
    SPDX_PATTERNS
        .iter()
        .find(|(_, phrases)| phrases.iter().all(|p| body.contains(p)))
        .map(|(spdx, _)| *spdx)
}

/// Scans [`LICENSE_FILENAMES`] at the root of `clone_dir` and matches the
/// body against a small set of SPDX header phrases.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextPatternDetector;

impl LicenseDetector for TextPatternDetector {
    fn detect(&self, clone_dir: &Path) -> anyhow::Result<Option<DetectedLicense>> {
        for name in LICENSE_FILENAMES {
            let path = clone_dir.join(name);
            if !path.is_file() {
                continue;
            }
            let body = std::fs::read_to_string(&path).unwrap_or_default();
            return Ok(Some(match match_spdx(&body) {
                Some(spdx) => DetectedLicense {
                    spdx: spdx.to_string(),
                    path,
                    confidence: Confidence::High,
                },
                None => DetectedLicense {
                    spdx: "UNKNOWN".to_string(),
                    path,
                    confidence: Confidence::Unknown,
                },
            }));
        }
        Ok(None)
    }
}

/// A black-box remote license lookup (spec §1: HTTP clients for license
/// APIs are out of scope, consumed only as an interface). No concrete
/// implementation ships in this crate.
pub trait LicenseApi: Send + Sync {
    fn lookup(&self, project_identifier: &str) -> anyhow::Result<Option<String>>;
}

/// Tries `api` first, keyed by `project_identifier`; falls back to
/// [`TextPatternDetector`] when the API errs, returns nothing, or is
/// absent entirely.
pub struct ProviderLicenseDetector<'a> {
    pub api: Option<&'a dyn LicenseApi>,
    pub project_identifier: String,
    pub fallback: TextPatternDetector,
}

impl LicenseDetector for ProviderLicenseDetector<'_> {
    fn detect(&self, clone_dir: &Path) -> anyhow::Result<Option<DetectedLicense>> {
        if let Some(api) = self.api {
            match api.lookup(&self.project_identifier) {
                Ok(Some(spdx)) => {
                    return Ok(Some(DetectedLicense {
                        spdx,
                        path: clone_dir.join("LICENSE"),
                        confidence: Confidence::High,
                    }));
                }
                Ok(None) => {}
                Err(e) => log::warn!("license API lookup failed for {}: {e}", self.project_identifier),
            }
        }
        self.fallback.detect(clone_dir)
    }
}

/// Copies the first matching license file found in `clone_dir` to
/// `<licenses_dir>/<vendor>.txt` (spec §4.9g). Returns `None` when no
/// license file is present.
pub fn propagate_license(
    detector: &dyn LicenseDetector,
    clone_dir: &Path,
    licenses_dir: &Path,
    vendor: &str,
) -> anyhow::Result<Option<DetectedLicense>> {
    let Some(detected) = detector.detect(clone_dir)? else {
        return Ok(None);
    };
    std::fs::create_dir_all(licenses_dir)?;
    let dest = licenses_dir.join(format!("{vendor}.txt"));
    std::fs::copy(&detected.path, &dest)?;
    Ok(Some(DetectedLicense {
        path: dest,
        ..detected
    }))
}

#[derive(Debug, Clone, Default)]
pub struct ComplianceChecker;

impl ComplianceChecker {
    /// `Ok(())` when the license is allowlisted, enforcement is `info`
    /// (report-only), or there's no compliance config at all; otherwise a
    /// structured `ComplianceFailed` (spec §7).
    pub fn check(
        &self,
        compliance: Option<&crate::model::ComplianceConfig>,
        enforcement: crate::model::Enforcement,
        vendor: &str,
        license: &str,
    ) -> Result<(), crate::error::VendorError> {
        use crate::error::VendorError;
        use crate::model::Enforcement;

        if enforcement == Enforcement::Info {
            return Ok(());
        }
        let Some(compliance) = compliance else {
            return Ok(());
        };
        if compliance.allowed_licenses.is_empty() {
            return Ok(());
        }
        if compliance.allowed_licenses.iter().any(|l| l == license) {
            return Ok(());
        }
        Err(VendorError::ComplianceFailed {
            vendor: vendor.to_string(),
            license: license.to_string(),
        })
    }
}
