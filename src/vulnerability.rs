//! Black-box vulnerability lookup interface (SPEC_FULL.md §4.15). The core
//! never calls a concrete implementation; `status` accepts an optional
//! `&dyn VulnerabilityApi` and folds advisories into its report without
//! changing the PASS/WARN/FAIL derivation (spec §1 scopes HTTP clients out,
//! consumed only as an interface).

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone)]
pub struct Advisory {
    pub id: String,
    pub severity: Severity,
    pub summary: String,
}

pub trait VulnerabilityApi: Send + Sync {
    fn check(&self, source_url: &str, commit: &str) -> anyhow::Result<Vec<Advisory>>;
}

/// Queries `api` (when present) and logs, but never fails, a lookup error —
/// advisories are informational in this engine (spec §4.15).
pub fn check_advisories(
    api: Option<&dyn VulnerabilityApi>,
    source_url: &str,
    commit: &str,
) -> Vec<Advisory> {
    let Some(api) = api else { return Vec::new() };
    match api.check(source_url, commit) {
        Ok(advisories) => advisories,
        Err(e) => {
            log::warn!("vulnerability lookup failed for {source_url}@{commit}: {e}");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysFails;
    impl VulnerabilityApi for AlwaysFails {
        fn check(&self, _source_url: &str, _commit: &str) -> anyhow::Result<Vec<Advisory>> {
            anyhow::bail!("network unreachable")
        }
    }

    #[test]
    fn api_failure_degrades_to_empty_not_an_error() {
        let advisories = check_advisories(Some(&AlwaysFails), "https://example.com/repo", "abc");
        assert!(advisories.is_empty());
    }

    #[test]
    fn absent_api_returns_empty() {
        assert!(check_advisories(None, "https://example.com/repo", "abc").is_empty());
    }

    #[test]
    fn severity_orders_low_to_critical() {
        assert!(Severity::Low < Severity::Critical);
    }
}
