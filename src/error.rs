//! Error taxonomy for the sync/lock/verify engine.
//!
//! Every variant is a tagged kind rather than a string: callers that need to
//! branch on the failure (the CLI exit-code table, the stale-commit recovery
//! loop) match on the enum instead of parsing text out of a message.

use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum VendorError {
    /// Lookup by name failed.
    VendorNotFound { name: String },
    /// Malformed config, bad position suffix, or an unknown field on `set`.
    ValidationFailed {
        vendor: String,
        field: String,
        message: String,
    },
    /// A mapping source does not exist in the fetched tree.
    PathNotFound {
        path: String,
        vendor: String,
        r#ref: String,
    },
    /// The locked commit no longer exists upstream.
    StaleCommit { vendor: String, short_sha: String },
    /// Checkout failed after all fallbacks were exhausted.
    CheckoutFailed {
        vendor: String,
        r#ref: String,
        underlying: String,
    },
    /// Both `FETCH_HEAD` and the named ref failed to check out.
    RefCheckoutFailed {
        vendor: String,
        r#ref: String,
        underlying: String,
    },
    /// A pre- or post-sync hook failed or timed out.
    HookError {
        vendor: String,
        stage: HookStage,
        command: String,
        underlying: String,
    },
    /// The detected license is not in the compliance allowlist.
    ComplianceFailed { vendor: String, license: String },
    /// Catch-all I/O or invariant violation.
    Internal { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookStage {
    PreSync,
    PostSync,
}

impl fmt::Display for HookStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookStage::PreSync => write!(f, "pre-sync"),
            HookStage::PostSync => write!(f, "post-sync"),
        }
    }
}

impl VendorError {
    /// Stable string published for scripting, independent of `Display` text.
    pub fn code(&self) -> &'static str {
        match self {
            VendorError::VendorNotFound { .. } => "ErrCodeVendorNotFound",
            VendorError::ValidationFailed { .. } => "ErrCodeValidationFailed",
            VendorError::PathNotFound { .. } => "ErrCodePathNotFound",
            VendorError::StaleCommit { .. } => "ErrCodeStaleCommit",
            VendorError::CheckoutFailed { .. } => "ErrCodeCheckoutFailed",
            VendorError::RefCheckoutFailed { .. } => "ErrCodeRefCheckoutFailed",
            VendorError::HookError { .. } => "ErrCodeHookError",
            VendorError::ComplianceFailed { .. } => "ErrCodeComplianceFailed",
            VendorError::Internal { .. } => "ErrCodeInternalError",
        }
    }

    /// CLI exit code this kind maps to (spec's exit-code table).
    pub fn exit_code(&self) -> i32 {
        match self {
            VendorError::VendorNotFound { .. } => 3,
            VendorError::ValidationFailed { .. } => 4,
            _ => 1,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        VendorError::Internal {
            message: message.into(),
        }
    }
}

impl fmt::Display for VendorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VendorError::VendorNotFound { name } => {
                write!(f, "vendor '{name}' not found")
            }
            VendorError::ValidationFailed {
                vendor,
                field,
                message,
            } => {
                write!(
                    f,
                    "vendor '{vendor}': invalid {field}: {message}"
                )
            }
            VendorError::PathNotFound {
                path,
                vendor,
                r#ref,
            } => {
                write!(
                    f,
                    "vendor '{vendor}' ref '{ref}': path '{path}' not found in fetched tree"
                )
            }
            VendorError::StaleCommit { vendor, short_sha } => {
                write!(
                    f,
                    "vendor '{vendor}': locked commit {short_sha} no longer exists upstream; run update to refresh the lockfile"
                )
            }
            VendorError::CheckoutFailed {
                vendor,
                r#ref,
                underlying,
            } => {
                write!(
                    f,
                    "vendor '{vendor}' ref '{ref}': checkout failed: {underlying}"
                )
            }
            VendorError::RefCheckoutFailed {
                vendor,
                r#ref,
                underlying,
            } => {
                write!(
                    f,
                    "vendor '{vendor}' ref '{ref}': FETCH_HEAD and ref checkout both failed: {underlying}"
                )
            }
            VendorError::HookError {
                vendor,
                stage,
                command,
                underlying,
            } => {
                write!(
                    f,
                    "vendor '{vendor}': {stage} hook `{command}` failed: {underlying}"
                )
            }
            VendorError::ComplianceFailed { vendor, license } => {
                write!(
                    f,
                    "vendor '{vendor}': license '{license}' is not in the compliance allowlist"
                )
            }
            VendorError::Internal { message } => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for VendorError {}

pub fn is_vendor_not_found(err: &VendorError) -> bool {
    matches!(err, VendorError::VendorNotFound { .. })
}

pub fn is_stale_commit(err: &VendorError) -> bool {
    matches!(err, VendorError::StaleCommit { .. })
}

pub fn is_validation_error(err: &VendorError) -> bool {
    matches!(err, VendorError::ValidationFailed { .. })
}

pub fn is_path_not_found(err: &VendorError) -> bool {
    matches!(err, VendorError::PathNotFound { .. })
}

pub fn is_compliance_failed(err: &VendorError) -> bool {
    matches!(err, VendorError::ComplianceFailed { .. })
}

/// Path whose validation failed, attached for callers that only have an
/// `anyhow::Error` chain and want the offending path for a remediation hint.
#[derive(Debug)]
pub struct InvalidPath(pub PathBuf);

impl fmt::Display for InvalidPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "path escapes the project root: {}", self.0.display())
    }
}

impl std::error::Error for InvalidPath {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_match_table() {
        assert_eq!(
            VendorError::VendorNotFound {
                name: "lib".into()
            }
            .exit_code(),
            3
        );
        assert_eq!(
            VendorError::ValidationFailed {
                vendor: "lib".into(),
                field: "to".into(),
                message: "bad".into()
            }
            .exit_code(),
            4
        );
        assert_eq!(
            VendorError::internal("boom").exit_code(),
            1
        );
    }

    #[test]
    fn predicates_match_their_own_kind_only() {
        let e = VendorError::StaleCommit {
            vendor: "lib".into(),
            short_sha: "deadbee".into(),
        };
        assert!(is_stale_commit(&e));
        assert!(!is_vendor_not_found(&e));
        assert!(!is_validation_error(&e));
    }

    #[test]
    fn display_includes_vendor_and_ref() {
        let e = VendorError::PathNotFound {
            path: "src/api.go".into(),
            vendor: "lib".into(),
            r#ref: "main".into(),
        };
        let s = e.to_string();
        assert!(s.contains("lib"));
        assert!(s.contains("main"));
        assert!(s.contains("src/api.go"));
    }
}
