//! Typed surface the sync engine talks to instead of shelling out directly
//! (spec §4.5). `GitClient` is a capability set; `real::RealGitClient` backs
//! it with an actual `git` binary, `fake::FakeGitClient` backs it with an
//! in-memory fixture for tests (property 6/9, S4, S5).

mod fake;
mod real;

pub use fake::{FakeGitClient, FakeRepo};
pub use real::RealGitClient;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cooperative cancellation token threaded through every `GitClient` call
/// (spec §5/§9: SIGINT during a long fetch must cancel cleanly).
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        CancelToken(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Returns an error if this token has already been cancelled; the
    /// call site invokes this before and after the actual subprocess call
    /// so cancellation is observed promptly.
    pub fn check(&self) -> anyhow::Result<()> {
        if self.is_cancelled() {
            anyhow::bail!("context cancelled");
        }
        Ok(())
    }
}

/// Options for [`GitClient::clone_repo`].
#[derive(Debug, Clone, Default)]
pub struct CloneOptions {
    pub depth: Option<u32>,
    pub no_checkout: bool,
    /// `--filter=blob:none`, for exploring a tree without materializing blobs.
    pub blob_filter: bool,
}

/// One entry of `git log <range>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub sha: String,
    pub subject: String,
}

/// One entry of `ListTree`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub path: String,
    pub is_dir: bool,
}

/// The capability set the sync/update engine requires of a Git
/// implementation (spec §4.5). Every method takes a [`CancelToken`] and
/// must return promptly once it observes cancellation.
pub trait GitClient: Send + Sync {
    fn init(&self, dir: &Path, cancel: &CancelToken) -> anyhow::Result<()>;
    fn add_remote(&self, dir: &Path, name: &str, url: &str, cancel: &CancelToken) -> anyhow::Result<()>;
    fn set_remote_url(&self, dir: &Path, name: &str, url: &str, cancel: &CancelToken) -> anyhow::Result<()>;
    /// `depth == Some(1)` is a shallow fetch; `None` fetches full history.
    fn fetch(&self, dir: &Path, remote: &str, depth: Option<u32>, r#ref: &str, cancel: &CancelToken) -> anyhow::Result<()>;
    fn fetch_all(&self, dir: &Path, remote: &str, cancel: &CancelToken) -> anyhow::Result<()>;
    fn checkout(&self, dir: &Path, r#ref: &str, cancel: &CancelToken) -> anyhow::Result<()>;
    fn get_head_hash(&self, dir: &Path, cancel: &CancelToken) -> anyhow::Result<String>;
    /// Tag at `sha`, preferring a semver-looking tag (`^v?\d+\.\d+\.\d+`).
    fn get_tag_for_commit(&self, dir: &Path, sha: &str, cancel: &CancelToken) -> anyhow::Result<Option<String>>;
    fn list_tree(&self, dir: &Path, r#ref: &str, subdir: &str, cancel: &CancelToken) -> anyhow::Result<Vec<TreeEntry>>;
    fn log(&self, dir: &Path, range: &str, cancel: &CancelToken) -> anyhow::Result<Vec<LogEntry>>;
    fn clone_repo(&self, dir: &Path, url: &str, opts: &CloneOptions, cancel: &CancelToken) -> anyhow::Result<()>;
    fn config_get(&self, dir: &Path, key: &str, cancel: &CancelToken) -> anyhow::Result<Option<String>>;
    fn config_set(&self, dir: &Path, key: &str, value: &str, cancel: &CancelToken) -> anyhow::Result<()>;
    /// Remote commit hash for `ref` at `url` without a local clone
    /// (`git ls-remote`), used by `status`'s outdated check.
    fn remote_head(&self, url: &str, r#ref: &str, cancel: &CancelToken) -> anyhow::Result<String>;
}

/// The canonical single-remote name the fetch-with-fallback shape (spec
/// §4.7) requires: add one remote named `"origin"`, swap its URL on
/// mirror fallback, never add a second remote.
pub const ORIGIN: &str = "origin";
