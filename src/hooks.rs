// Pre/post commit & checkout hooks: subprocess invocation with a bounded timeout.
//
// `std::process::Command` has no native wait-with-timeout, so a watcher thread
// races the child against a deadline and kills it on expiry, mirroring
// Python's `subprocess.run(timeout=...)`.

use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::time::Duration;

use crate::error::{ForesterError, Result};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HookEnv {
    pub branch: String,
    pub author: String,
    pub message: String,
    pub commit_hash: String,
    pub target: String,
    pub repo_path: String,
}

impl HookEnv {
    fn apply(&self, cmd: &mut Command) {
        cmd.env("DFM_BRANCH", &self.branch)
            .env("DFM_AUTHOR", &self.author)
            .env("DFM_MESSAGE", &self.message)
            .env("DFM_COMMIT_HASH", &self.commit_hash)
            .env("DFM_TARGET", &self.target)
            .env("DFM_REPO_PATH", &self.repo_path);
    }
}

#[must_use]
pub fn hooks_dir(dfm_dir: &Path) -> std::path::PathBuf {
    dfm_dir.join("hooks")
}

#[must_use]
pub fn hook_exists(dfm_dir: &Path, name: &str) -> bool {
    let path = hooks_dir(dfm_dir).join(name);
    path.exists() && is_executable(&path)
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path).is_ok_and(|m| m.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(_path: &Path) -> bool {
    true
}

struct HookOutcome {
    status: Option<i32>,
    stderr: String,
    timed_out: bool,
}

fn run_with_timeout(mut cmd: Command, timeout: Duration) -> std::io::Result<HookOutcome> {
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    let mut child = cmd.spawn()?;
    let (tx, rx) = mpsc::channel();

    let mut stderr = child.stderr.take();
    let stderr_handle = std::thread::spawn(move || {
        use std::io::Read;
        let mut buf = String::new();
        if let Some(s) = stderr.as_mut() {
            let _ = s.read_to_string(&mut buf);
        }
        buf
    });

    let mut waited_child = child;
    std::thread::spawn(move || {
        let result = waited_child.wait();
        let _ = tx.send(result);
    });

    match rx.recv_timeout(timeout) {
        Ok(Ok(status)) => Ok(HookOutcome {
            status: status.code(),
            stderr: stderr_handle.join().unwrap_or_default(),
            timed_out: false,
        }),
        Ok(Err(e)) => Err(e),
        Err(_) => Ok(HookOutcome { status: None, stderr: stderr_handle.join().unwrap_or_default(), timed_out: true }),
    }
}

fn invoke(dfm_dir: &Path, name: &str, env: &HookEnv, timeout: Duration) -> Result<Option<HookOutcome>> {
    if !hook_exists(dfm_dir, name) {
        return Ok(None);
    }
    let path = hooks_dir(dfm_dir).join(name);
    let mut cmd = Command::new(&path);
    env.apply(&mut cmd);
    let outcome = run_with_timeout(cmd, timeout)
        .map_err(|source| crate::error::ForesterError::Io { path: path.clone(), source })?;
    Ok(Some(outcome))
}

/// Blocking: non-zero exit (or timeout) fails the commit.
pub fn run_pre_commit_hook(dfm_dir: &Path, env: &HookEnv) -> Result<()> {
    run_blocking(dfm_dir, "pre-commit", env)
}

pub fn run_pre_checkout_hook(dfm_dir: &Path, env: &HookEnv) -> Result<()> {
    run_blocking(dfm_dir, "pre-checkout", env)
}

fn run_blocking(dfm_dir: &Path, name: &str, env: &HookEnv) -> Result<()> {
    let Some(outcome) = invoke(dfm_dir, name, env, DEFAULT_TIMEOUT)? else { return Ok(()) };
    if outcome.timed_out {
        return Err(ForesterError::HookFailed {
            hook: name.to_string(),
            code: -1,
            stderr: "hook timed out".to_string(),
        });
    }
    match outcome.status {
        Some(0) => Ok(()),
        code => Err(ForesterError::HookFailed {
            hook: name.to_string(),
            code: code.unwrap_or(-1),
            stderr: outcome.stderr,
        }),
    }
}

/// Advisory: non-zero exit is logged, never surfaced.
pub fn run_post_commit_hook(dfm_dir: &Path, env: &HookEnv) {
    run_advisory(dfm_dir, "post-commit", env);
}

pub fn run_post_checkout_hook(dfm_dir: &Path, env: &HookEnv) {
    run_advisory(dfm_dir, "post-checkout", env);
}

fn run_advisory(dfm_dir: &Path, name: &str, env: &HookEnv) {
    match invoke(dfm_dir, name, env, DEFAULT_TIMEOUT) {
        Ok(Some(outcome)) if outcome.timed_out => {
            tracing::warn!(hook = name, "hook timed out");
        }
        Ok(Some(outcome)) if outcome.status != Some(0) => {
            tracing::warn!(hook = name, code = ?outcome.status, stderr = %outcome.stderr, "post-hook failed");
        }
        Ok(_) => {}
        Err(e) => tracing::warn!(hook = name, error = %e, "failed to invoke hook"),
    }
}
