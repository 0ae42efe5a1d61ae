//! Subprocess-backed [`GitClient`], grounded in `shell_exec::run`'s pattern
//! of logging every invocation with timing (teacher's sole process-exec
//! entry point) generalized to git specifically.

use std::path::Path;
use std::process::Command;

use once_cell::sync::Lazy;
use regex::Regex;

use super::{CancelToken, CloneOptions, GitClient, LogEntry, TreeEntry};
use crate::shell_exec::run;

#[derive(Debug, Default, Clone, Copy)]
pub struct RealGitClient;

impl RealGitClient {
    pub fn new() -> Self {
        RealGitClient
    }

    fn git(&self, dir: &Path, args: &[&str], cancel: &CancelToken) -> anyhow::Result<String> {
        cancel.check()?;
        let mut cmd = Command::new("git");
        cmd.args(args);
        cmd.current_dir(dir);
        let output = run(&mut cmd, Some(&dir.display().to_string()))?;
        cancel.check()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("git {}: {}", args.join(" "), stderr.trim());
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

static SEMVER_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"^v?\d+\.\d+\.\d+").unwrap());

impl GitClient for RealGitClient {
    fn init(&self, dir: &Path, cancel: &CancelToken) -> anyhow::Result<()> {
        std::fs::create_dir_all(dir)?;
        self.git(dir, &["init"], cancel)?;
        Ok(())
    }

    fn add_remote(&self, dir: &Path, name: &str, url: &str, cancel: &CancelToken) -> anyhow::Result<()> {
        self.git(dir, &["remote", "add", name, url], cancel)?;
        Ok(())
    }

    fn set_remote_url(&self, dir: &Path, name: &str, url: &str, cancel: &CancelToken) -> anyhow::Result<()> {
        self.git(dir, &["remote", "set-url", name, url], cancel)?;
        Ok(())
    }

    fn fetch(&self, dir: &Path, remote: &str, depth: Option<u32>, r#ref: &str, cancel: &CancelToken) -> anyhow::Result<()> {
        let depth_arg;
        let mut args = vec!["fetch", remote, r#ref];
        if let Some(d) = depth {
            depth_arg = format!("--depth={d}");
            args.insert(1, &depth_arg);
        }
        self.git(dir, &args, cancel)?;
        Ok(())
    }

    fn fetch_all(&self, dir: &Path, remote: &str, cancel: &CancelToken) -> anyhow::Result<()> {
        self.git(dir, &["fetch", remote], cancel)?;
        Ok(())
    }

    fn checkout(&self, dir: &Path, r#ref: &str, cancel: &CancelToken) -> anyhow::Result<()> {
        self.git(dir, &["checkout", r#ref], cancel)?;
        Ok(())
    }

    fn get_head_hash(&self, dir: &Path, cancel: &CancelToken) -> anyhow::Result<String> {
        Ok(self.git(dir, &["rev-parse", "HEAD"], cancel)?.trim().to_string())
    }

    fn get_tag_for_commit(&self, dir: &Path, sha: &str, cancel: &CancelToken) -> anyhow::Result<Option<String>> {
        let out = self.git(dir, &["tag", "--points-at", sha], cancel)?;
        let tags: Vec<&str> = out.lines().filter(|l| !l.is_empty()).collect();
        if tags.is_empty() {
            return Ok(None);
        }
        if let Some(semver) = tags.iter().find(|t| SEMVER_TAG.is_match(t)) {
            return Ok(Some(semver.to_string()));
        }
        Ok(Some(tags[0].to_string()))
    }

    fn list_tree(&self, dir: &Path, r#ref: &str, subdir: &str, cancel: &CancelToken) -> anyhow::Result<Vec<TreeEntry>> {
        let spec = if subdir.is_empty() || subdir == "." {
            r#ref.to_string()
        } else {
            format!("{ref}:{subdir}")
        };
        let out = self.git(dir, &["ls-tree", "-r", "--name-only", &spec], cancel)?;
        Ok(out
            .lines()
            .filter(|l| !l.is_empty())
            .map(|l| TreeEntry {
                path: l.to_string(),
                is_dir: false,
            })
            .collect())
    }

    fn log(&self, dir: &Path, range: &str, cancel: &CancelToken) -> anyhow::Result<Vec<LogEntry>> {
        let out = self.git(dir, &["log", "--format=%H%x09%s", range], cancel)?;
        Ok(out
            .lines()
            .filter_map(|l| {
                let (sha, subject) = l.split_once('\t')?;
                Some(LogEntry {
                    sha: sha.to_string(),
                    subject: subject.to_string(),
                })
            })
            .collect())
    }

    fn clone_repo(&self, dir: &Path, url: &str, opts: &CloneOptions, cancel: &CancelToken) -> anyhow::Result<()> {
        cancel.check()?;
        let mut args: Vec<String> = vec!["clone".into()];
        if let Some(depth) = opts.depth {
            args.push(format!("--depth={depth}"));
        }
        if opts.no_checkout {
            args.push("--no-checkout".into());
        }
        if opts.blob_filter {
            args.push("--filter=blob:none".into());
        }
        args.push(url.to_string());
        args.push(".".to_string());
        std::fs::create_dir_all(dir)?;
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        self.git(dir, &arg_refs, cancel)?;
        Ok(())
    }

    fn config_get(&self, dir: &Path, key: &str, cancel: &CancelToken) -> anyhow::Result<Option<String>> {
        match self.git(dir, &["config", "--get", key], cancel) {
            Ok(v) => Ok(Some(v.trim().to_string())),
            Err(_) => Ok(None),
        }
    }

    fn config_set(&self, dir: &Path, key: &str, value: &str, cancel: &CancelToken) -> anyhow::Result<()> {
        self.git(dir, &["config", key, value], cancel)?;
        Ok(())
    }

    fn remote_head(&self, url: &str, r#ref: &str, cancel: &CancelToken) -> anyhow::Result<String> {
        cancel.check()?;
        let mut cmd = Command::new("git");
        cmd.args(["ls-remote", url, r#ref]);
        let output = run(&mut cmd, Some(url))?;
        cancel.check()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("git ls-remote {url} {ref}: {}", stderr.trim());
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        stdout
            .lines()
            .next()
            .and_then(|l| l.split_whitespace().next())
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("no remote ref '{ref}' found at {url}"))
    }
}
