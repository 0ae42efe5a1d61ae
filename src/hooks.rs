//! Pre- and post-sync shell command execution with sanitized env and a
//! bounded timeout (spec §4.6).
//!
//! Grounded in `shell_exec::ShellConfig` (the teacher's sole cross-platform
//! shell-detection entry point: `sh -c` on POSIX, PowerShell/`cmd` on
//! Windows) and `shell/utils.rs::detect_zsh_compinit`'s `wait_timeout`
//! kill-on-timeout pattern, generalized from a single hardcoded probe
//! command to an arbitrary per-vendor hook.

use std::collections::BTreeMap;
use std::process::Stdio;
use std::time::Duration;

use wait_timeout::ChildExt;

use crate::error::{HookStage, VendorError};
use crate::shell_exec::ShellConfig;

pub const DEFAULT_HOOK_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Replaces `\n`, `\r`, `\0` with a space so an injected value cannot
/// corrupt the child's environment block.
fn sanitize_env_value(v: &str) -> String {
    v.chars()
        .map(|c| match c {
            '\n' | '\r' | '\0' => ' ',
            other => other,
        })
        .collect()
}

/// Context a hook is run with; becomes `GIT_VENDOR_{NAME,URL,REF,COMMIT,
/// ROOT,FILES_COPIED,DIRS_CREATED}` plus any caller-supplied extra vars.
#[derive(Debug, Clone, Default)]
pub struct HookContext {
    pub name: String,
    pub url: String,
    pub r#ref: String,
    pub commit: String,
    pub root: String,
    pub files_copied: usize,
    pub dirs_created: usize,
    pub extra: BTreeMap<String, String>,
}

impl HookContext {
    fn env_vars(&self) -> Vec<(String, String)> {
        let mut vars = vec![
            ("GIT_VENDOR_NAME".to_string(), self.name.clone()),
            ("GIT_VENDOR_URL".to_string(), self.url.clone()),
            ("GIT_VENDOR_REF".to_string(), self.r#ref.clone()),
            ("GIT_VENDOR_COMMIT".to_string(), self.commit.clone()),
            ("GIT_VENDOR_ROOT".to_string(), self.root.clone()),
            ("GIT_VENDOR_FILES_COPIED".to_string(), self.files_copied.to_string()),
            ("GIT_VENDOR_DIRS_CREATED".to_string(), self.dirs_created.to_string()),
        ];
        for (k, v) in &self.extra {
            vars.push((k.clone(), v.clone()));
        }
        vars.into_iter()
            .map(|(k, v)| (k, sanitize_env_value(&v)))
            .collect()
    }
}

/// Runs one hook command in `project_root`, bounded by `timeout`. The
/// parent's environment plus the hook context are passed through; stdout/
/// stderr are inherited, unfiltered (spec §4.6).
pub fn run_hook(
    vendor: &str,
    stage: HookStage,
    command: &str,
    project_root: &std::path::Path,
    ctx: &HookContext,
    timeout: Duration,
) -> Result<(), VendorError> {
    let shell = ShellConfig::get();
    let mut cmd = shell.command(command);
    cmd.current_dir(project_root);
    cmd.stdin(Stdio::null());
    for (k, v) in ctx.env_vars() {
        cmd.env(k, v);
    }

    log::debug!("running {stage} hook for '{vendor}': {command}");

    let mut child = cmd.spawn().map_err(|e| VendorError::HookError {
        vendor: vendor.to_string(),
        stage,
        command: command.to_string(),
        underlying: e.to_string(),
    })?;

    match child.wait_timeout(timeout) {
        Ok(Some(status)) if status.success() => Ok(()),
        Ok(Some(status)) => Err(VendorError::HookError {
            vendor: vendor.to_string(),
            stage,
            command: command.to_string(),
            underlying: format!("exited with {status}"),
        }),
        Ok(None) => {
            kill_child(&mut child);
            let _ = child.wait();
            Err(VendorError::HookError {
                vendor: vendor.to_string(),
                stage,
                command: command.to_string(),
                underlying: format!("hook timed out after {timeout:?}"),
            })
        }
        Err(e) => Err(VendorError::HookError {
            vendor: vendor.to_string(),
            stage,
            command: command.to_string(),
            underlying: e.to_string(),
        }),
    }
}

#[cfg(unix)]
fn kill_child(child: &mut std::process::Child) {
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;
    let _ = signal::kill(Pid::from_raw(child.id() as i32), Signal::SIGKILL);
}

#[cfg(not(unix))]
fn kill_child(child: &mut std::process::Child) {
    let _ = child.kill();
}

/// Runs every hook in `commands` in declaration order, stopping at the
/// first failure. Pre-sync failure aborts the ref (caller propagates);
/// post-sync failure is reported by the caller but does not roll back
/// already-materialized files (spec §4.6) — this function only reports the
/// first failing command; the caller decides whether to continue.
pub fn run_all(
    vendor: &str,
    stage: HookStage,
    commands: &[String],
    project_root: &std::path::Path,
    ctx: &HookContext,
    timeout: Duration,
) -> Result<(), VendorError> {
    for command in commands {
        run_hook(vendor, stage, command, project_root, ctx, timeout)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_newlines_and_nul_in_env_values() {
        assert_eq!(sanitize_env_value("a\nb\rc\0d"), "a b c d");
    }

    #[test]
    fn successful_hook_runs_with_env() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = HookContext {
            name: "lib".into(),
            url: "https://example.com/repo".into(),
            r#ref: "main".into(),
            commit: "abc123".into(),
            root: dir.path().display().to_string(),
            files_copied: 3,
            dirs_created: 1,
            extra: BTreeMap::new(),
        };
        let result = run_hook(
            "lib",
            HookStage::PreSync,
            "test \"$GIT_VENDOR_NAME\" = lib && test \"$GIT_VENDOR_FILES_COPIED\" = 3",
            dir.path(),
            &ctx,
            Duration::from_secs(5),
        );
        assert!(result.is_ok(), "{result:?}");
    }

    #[test]
    fn failing_hook_is_reported_as_hook_error() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = HookContext::default();
        let result = run_hook("lib", HookStage::PostSync, "exit 1", dir.path(), &ctx, Duration::from_secs(5));
        assert!(matches!(result, Err(VendorError::HookError { .. })));
    }

    #[test]
    fn timeout_is_a_distinguishable_error() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = HookContext::default();
        let result = run_hook(
            "lib",
            HookStage::PreSync,
            "sleep 5",
            dir.path(),
            &ctx,
            Duration::from_millis(100),
        );
        match result {
            Err(VendorError::HookError { underlying, .. }) => {
                assert!(underlying.contains("timed out"), "{underlying}");
            }
            other => panic!("expected timeout HookError, got {other:?}"),
        }
    }
}
