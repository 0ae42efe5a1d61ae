//! An in-memory [`GitClient`] fixture for tests: scripted repos with
//! branches/tags/commit contents, scriptable fetch failures, and call
//! counters so tests can assert "zero network operations" (property 6) or
//! "both mirrors were tried" (property 9) without touching a real `git`
//! binary.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::{CancelToken, CloneOptions, GitClient, LogEntry, TreeEntry};

#[derive(Debug, Clone, Default)]
pub struct FakeRepo {
    /// ref name (branch/tag/"HEAD") -> commit sha.
    pub refs: HashMap<String, String>,
    /// commit sha -> file contents at that commit.
    pub commits: HashMap<String, HashMap<String, Vec<u8>>>,
    /// commit sha -> tag name, when one exists.
    pub tags: HashMap<String, String>,
}

impl FakeRepo {
    pub fn with_commit(mut self, r#ref: &str, sha: &str, files: &[(&str, &str)]) -> Self {
        self.refs.insert(r#ref.to_string(), sha.to_string());
        self.refs.entry("HEAD".to_string()).or_insert_with(|| sha.to_string());
        self.commits.insert(
            sha.to_string(),
            files
                .iter()
                .map(|(p, c)| (p.to_string(), c.as_bytes().to_vec()))
                .collect(),
        );
        self
    }

    pub fn with_tag(mut self, sha: &str, tag: &str) -> Self {
        self.tags.insert(sha.to_string(), tag.to_string());
        self
    }
}

#[derive(Default)]
struct Inner {
    repos: HashMap<String, FakeRepo>,
    fail_urls: HashSet<String>,
    dir_remote: HashMap<PathBuf, String>,
    dir_fetched_sha: HashMap<PathBuf, String>,
    dir_head: HashMap<PathBuf, String>,
    config: HashMap<(PathBuf, String), String>,
    calls: HashMap<&'static str, usize>,
}

/// Scriptable fake used by integration tests; see module docs.
#[derive(Default)]
pub struct FakeGitClient {
    inner: Mutex<Inner>,
}

impl FakeGitClient {
    pub fn new() -> Self {
        FakeGitClient::default()
    }

    pub fn add_repo(&self, url: &str, repo: FakeRepo) {
        self.inner.lock().unwrap().repos.insert(url.to_string(), repo);
    }

    /// Marks `url` so every `fetch`/`fetch_all`/`clone_repo` against it
    /// fails, for mirror-fallback and aggregated-failure tests.
    pub fn fail(&self, url: &str) {
        self.inner.lock().unwrap().fail_urls.insert(url.to_string());
    }

    pub fn call_count(&self, op: &str) -> usize {
        *self.inner.lock().unwrap().calls.get(op).unwrap_or(&0)
    }

    fn bump(&self, op: &'static str) {
        *self.inner.lock().unwrap().calls.entry(op).or_insert(0) += 1;
    }

    fn resolve(repo: &FakeRepo, r#ref: &str) -> Option<String> {
        if let Some(sha) = repo.refs.get(r#ref) {
            return Some(sha.clone());
        }
        if repo.commits.contains_key(r#ref) {
            return Some(r#ref.to_string());
        }
        None
    }
}

impl GitClient for FakeGitClient {
    fn init(&self, dir: &Path, _cancel: &CancelToken) -> anyhow::Result<()> {
        self.bump("init");
        std::fs::create_dir_all(dir)?;
        Ok(())
    }

    fn add_remote(&self, dir: &Path, _name: &str, url: &str, _cancel: &CancelToken) -> anyhow::Result<()> {
        self.bump("add_remote");
        self.inner
            .lock()
            .unwrap()
            .dir_remote
            .insert(dir.to_path_buf(), url.to_string());
        Ok(())
    }

    fn set_remote_url(&self, dir: &Path, _name: &str, url: &str, _cancel: &CancelToken) -> anyhow::Result<()> {
        self.bump("set_remote_url");
        self.inner
            .lock()
            .unwrap()
            .dir_remote
            .insert(dir.to_path_buf(), url.to_string());
        Ok(())
    }

    fn fetch(&self, dir: &Path, _remote: &str, _depth: Option<u32>, r#ref: &str, _cancel: &CancelToken) -> anyhow::Result<()> {
        self.bump("fetch");
        let mut inner = self.inner.lock().unwrap();
        let url = inner
            .dir_remote
            .get(dir)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no remote configured for {}", dir.display()))?;
        if inner.fail_urls.contains(&url) {
            anyhow::bail!("simulated fetch failure for {url}");
        }
        let repo = inner
            .repos
            .get(&url)
            .ok_or_else(|| anyhow::anyhow!("fake repo not registered: {url}"))?;
        let sha = Self::resolve(repo, r#ref)
            .ok_or_else(|| anyhow::anyhow!("couldn't find remote ref {ref}"))?;
        inner.dir_fetched_sha.insert(dir.to_path_buf(), sha);
        Ok(())
    }

    fn fetch_all(&self, dir: &Path, remote: &str, cancel: &CancelToken) -> anyhow::Result<()> {
        self.bump("fetch_all");
        self.fetch(dir, remote, None, "HEAD", cancel)
    }

    fn checkout(&self, dir: &Path, r#ref: &str, _cancel: &CancelToken) -> anyhow::Result<()> {
        self.bump("checkout");
        let mut inner = self.inner.lock().unwrap();
        let url = inner
            .dir_remote
            .get(dir)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no remote configured for {}", dir.display()))?;
        let sha = if r#ref == "FETCH_HEAD" {
            inner
                .dir_fetched_sha
                .get(dir)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("reference is not a tree: FETCH_HEAD"))?
        } else {
            let repo = inner
                .repos
                .get(&url)
                .ok_or_else(|| anyhow::anyhow!("fake repo not registered: {url}"))?;
            Self::resolve(repo, r#ref)
                .ok_or_else(|| anyhow::anyhow!("reference is not a tree: {ref}"))?
        };
        let repo = inner.repos.get(&url).unwrap();
        let files = repo
            .commits
            .get(&sha)
            .ok_or_else(|| anyhow::anyhow!("not a valid object: {sha}"))?
            .clone();
        drop(inner);
        for (path, content) in &files {
            let dest = dir.join(path);
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&dest, content)?;
        }
        self.inner.lock().unwrap().dir_head.insert(dir.to_path_buf(), sha);
        Ok(())
    }

    fn get_head_hash(&self, dir: &Path, _cancel: &CancelToken) -> anyhow::Result<String> {
        self.bump("get_head_hash");
        self.inner
            .lock()
            .unwrap()
            .dir_head
            .get(dir)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no HEAD for {}", dir.display()))
    }

    fn get_tag_for_commit(&self, dir: &Path, sha: &str, _cancel: &CancelToken) -> anyhow::Result<Option<String>> {
        self.bump("get_tag_for_commit");
        let inner = self.inner.lock().unwrap();
        let url = inner.dir_remote.get(dir).cloned();
        let Some(url) = url else { return Ok(None) };
        Ok(inner.repos.get(&url).and_then(|r| r.tags.get(sha).cloned()))
    }

    fn list_tree(&self, dir: &Path, r#ref: &str, subdir: &str, _cancel: &CancelToken) -> anyhow::Result<Vec<TreeEntry>> {
        self.bump("list_tree");
        let inner = self.inner.lock().unwrap();
        let url = inner
            .dir_remote
            .get(dir)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no remote configured"))?;
        let repo = inner.repos.get(&url).ok_or_else(|| anyhow::anyhow!("no such repo"))?;
        let sha = Self::resolve(repo, r#ref).ok_or_else(|| anyhow::anyhow!("no such ref {ref}"))?;
        let files = repo.commits.get(&sha).cloned().unwrap_or_default();
        let prefix = if subdir.is_empty() || subdir == "." {
            String::new()
        } else {
            format!("{subdir}/")
        };
        Ok(files
            .keys()
            .filter(|p| p.starts_with(&prefix))
            .map(|p| TreeEntry {
                path: p.clone(),
                is_dir: false,
            })
            .collect())
    }

    fn log(&self, _dir: &Path, _range: &str, _cancel: &CancelToken) -> anyhow::Result<Vec<LogEntry>> {
        self.bump("log");
        Ok(Vec::new())
    }

    fn clone_repo(&self, dir: &Path, url: &str, _opts: &CloneOptions, cancel: &CancelToken) -> anyhow::Result<()> {
        self.bump("clone_repo");
        self.init(dir, cancel)?;
        self.add_remote(dir, super::ORIGIN, url, cancel)?;
        self.fetch_all(dir, super::ORIGIN, cancel)?;
        self.checkout(dir, "FETCH_HEAD", cancel)
    }

    fn config_get(&self, dir: &Path, key: &str, _cancel: &CancelToken) -> anyhow::Result<Option<String>> {
        self.bump("config_get");
        Ok(self
            .inner
            .lock()
            .unwrap()
            .config
            .get(&(dir.to_path_buf(), key.to_string()))
            .cloned())
    }

    fn config_set(&self, dir: &Path, key: &str, value: &str, _cancel: &CancelToken) -> anyhow::Result<()> {
        self.bump("config_set");
        self.inner
            .lock()
            .unwrap()
            .config
            .insert((dir.to_path_buf(), key.to_string()), value.to_string());
        Ok(())
    }

    fn remote_head(&self, url: &str, r#ref: &str, _cancel: &CancelToken) -> anyhow::Result<String> {
        self.bump("remote_head");
        let inner = self.inner.lock().unwrap();
        let repo = inner
            .repos
            .get(url)
            .ok_or_else(|| anyhow::anyhow!("fake repo not registered: {url}"))?;
        Self::resolve(repo, r#ref).ok_or_else(|| anyhow::anyhow!("no such ref {ref}"))
    }
}
