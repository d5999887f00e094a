//! OS capabilities used to reclaim a locked checkout directory.
//!
//! Removing a checkout can fail while a lingering `git` process holds handles
//! inside it, or while files carry read-only (Windows: also system/hidden)
//! attributes. [`Platform`] exposes the three escalation steps; the ordering
//! and pauses between them live in the repository manager.

use std::fs::{self, Permissions};
use std::path::Path;
use std::process::Command;
use std::time::Duration;

use anyhow::{Result, anyhow};
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use crate::core::retry::{RetryPolicy, always, retry_with_backoff};
use crate::io::process::run_command;

const TOOL_TIMEOUT: Duration = Duration::from_secs(30);
const TOOL_OUTPUT_LIMIT_BYTES: usize = 64 * 1024;

/// Escalation steps for reclaiming a directory.
pub trait Platform {
    /// Terminate version-control helper processes that may hold handles under `path`.
    fn terminate_vcs_processes(&self, path: &Path) -> Result<()>;

    /// Clear read-only (and on Windows system/hidden) attributes under `path`.
    fn clear_attributes(&self, path: &Path) -> Result<()>;

    /// Recursively delete `path`, escalating to the OS removal command.
    fn force_remove(&self, path: &Path) -> Result<()>;
}

/// Backend for the current OS.
pub fn native(removal: RetryPolicy) -> Box<dyn Platform> {
    if cfg!(windows) {
        Box::new(WindowsPlatform { removal })
    } else {
        Box::new(UnixPlatform { removal })
    }
}

/// `pkill` / permission bits / `rm -rf`.
#[derive(Debug, Clone)]
pub struct UnixPlatform {
    pub removal: RetryPolicy,
}

impl Platform for UnixPlatform {
    #[instrument(skip_all, fields(path = %path.display()))]
    fn terminate_vcs_processes(&self, path: &Path) -> Result<()> {
        let pattern = vcs_process_pattern(path)?;
        let mut cmd = Command::new("pkill");
        cmd.arg("-TERM").arg("-f").arg(&pattern);
        let output = run_command(cmd, Some(TOOL_TIMEOUT), TOOL_OUTPUT_LIMIT_BYTES)?;
        match output.status.code() {
            Some(0) => {
                info!("terminated git processes holding the checkout");
                Ok(())
            }
            Some(1) => {
                debug!("no git processes matched");
                Ok(())
            }
            code => Err(anyhow!(
                "pkill exited with {code:?}: {}",
                output.stderr_lossy().trim()
            )),
        }
    }

    fn clear_attributes(&self, path: &Path) -> Result<()> {
        make_tree_writable(path)
    }

    fn force_remove(&self, path: &Path) -> Result<()> {
        remove_with_fallback(path, &self.removal, || {
            let mut cmd = Command::new("rm");
            cmd.arg("-rf").arg(path);
            cmd
        })
    }
}

/// `taskkill` / `attrib` / `rmdir /s /q`.
#[derive(Debug, Clone)]
pub struct WindowsPlatform {
    pub removal: RetryPolicy,
}

impl Platform for WindowsPlatform {
    #[instrument(skip_all)]
    fn terminate_vcs_processes(&self, _path: &Path) -> Result<()> {
        let mut cmd = Command::new("taskkill");
        cmd.args(["/F", "/IM", "git.exe"]);
        let output = run_command(cmd, Some(TOOL_TIMEOUT), TOOL_OUTPUT_LIMIT_BYTES)?;
        match output.status.code() {
            Some(0) => {
                info!("terminated git processes");
                Ok(())
            }
            // 128: no matching process.
            Some(128) => {
                debug!("no git processes running");
                Ok(())
            }
            code => Err(anyhow!(
                "taskkill exited with {code:?}: {}",
                output.stderr_lossy().trim()
            )),
        }
    }

    #[instrument(skip_all, fields(path = %path.display()))]
    fn clear_attributes(&self, path: &Path) -> Result<()> {
        let mut cmd = Command::new("attrib");
        cmd.args(["-r", "-s", "-h"])
            .arg(path.join("*.*"))
            .args(["/s", "/d"]);
        let output = run_command(cmd, Some(TOOL_TIMEOUT), TOOL_OUTPUT_LIMIT_BYTES)?;
        if !output.succeeded() {
            warn!(exit_code = ?output.status.code(), "attrib did not succeed");
        }
        make_tree_writable(path)
    }

    fn force_remove(&self, path: &Path) -> Result<()> {
        remove_with_fallback(path, &self.removal, || {
            let mut cmd = Command::new("cmd");
            cmd.args(["/c", "rmdir", "/s", "/q"]).arg(path);
            cmd
        })
    }
}

/// `pkill -f` pattern for git processes working on `path` or below it.
///
/// The path is anchored at its end so sibling directories sharing a prefix
/// (`repository-backup`) do not match.
fn vcs_process_pattern(path: &Path) -> Result<String> {
    let absolute = std::path::absolute(path)?;
    Ok(format!(
        "git.*{}(/|[[:space:]]|$)",
        regex::escape(&absolute.display().to_string())
    ))
}

/// True if anything (including a dangling symlink) exists at `path`.
pub fn is_present(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// Give the owner write access to every entry under `path` (best-effort).
///
/// Symlinks are skipped so nothing outside the tree is touched.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn make_tree_writable(path: &Path) -> Result<()> {
    make_tree_writable_with(path, |entry, permissions| {
        fs::set_permissions(entry, permissions)
    })
}

fn make_tree_writable_with<F>(path: &Path, mut set_permissions: F) -> Result<()>
where
    F: FnMut(&Path, Permissions) -> std::io::Result<()>,
{
    if !is_present(path) {
        return Ok(());
    }
    let mut changed = 0usize;
    for entry in WalkDir::new(path).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                debug!(err = %err, "skipping unreadable entry");
                continue;
            }
        };
        if entry.path_is_symlink() {
            continue;
        }
        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(err) => {
                debug!(err = %err, "skipping entry without metadata");
                continue;
            }
        };
        let mut permissions = metadata.permissions();
        if !grant_owner_write(&mut permissions, metadata.is_dir()) {
            continue;
        }
        match set_permissions(entry.path(), permissions) {
            Ok(()) => changed += 1,
            Err(err) => {
                warn!(entry = %entry.path().display(), err = %err, "could not make entry writable");
            }
        }
    }
    debug!(changed, "cleared read-only attributes");
    Ok(())
}

#[cfg(unix)]
fn grant_owner_write(permissions: &mut Permissions, is_dir: bool) -> bool {
    use std::os::unix::fs::PermissionsExt;
    let wanted = if is_dir { 0o700 } else { 0o200 };
    let mode = permissions.mode();
    if mode & wanted == wanted {
        return false;
    }
    permissions.set_mode(mode | wanted);
    true
}

#[cfg(not(unix))]
fn grant_owner_write(permissions: &mut Permissions, _is_dir: bool) -> bool {
    if !permissions.readonly() {
        return false;
    }
    #[allow(clippy::permissions_set_readonly_false)]
    permissions.set_readonly(false);
    true
}

/// Delete `path` with retries, then fall back to the OS removal command.
fn remove_with_fallback<F>(path: &Path, policy: &RetryPolicy, fallback: F) -> Result<()>
where
    F: FnOnce() -> Command,
{
    let removed = retry_with_backoff(
        policy,
        "remove checkout",
        |_| remove_tree(path),
        always,
    );
    if removed.is_ok() {
        return Ok(());
    }

    warn!(path = %path.display(), "removal still failing, using OS command");
    let output = run_command(fallback(), Some(TOOL_TIMEOUT), TOOL_OUTPUT_LIMIT_BYTES)?;
    if is_present(path) {
        return Err(anyhow!(
            "{} still present after OS removal (exit {:?}): {}",
            path.display(),
            output.status.code(),
            output.stderr_lossy().trim()
        ));
    }
    Ok(())
}

fn remove_tree(path: &Path) -> Result<()> {
    if !is_present(path) {
        return Ok(());
    }
    let metadata = fs::symlink_metadata(path)?;
    if metadata.is_dir() {
        fs::remove_dir_all(path)?;
    } else {
        fs::remove_file(path)?;
    }
    if is_present(path) {
        return Err(anyhow!("{} still present", path.display()));
    }
    Ok(())
}
