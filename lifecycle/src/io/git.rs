//! Git adapter for the repository lifecycle.
//!
//! The lifecycle manager only needs clone, branch enumeration, and checkout,
//! so we keep a small, explicit wrapper around `git` subprocess calls behind
//! the [`VersionControl`] trait.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument};

use crate::core::branch::branch_name;

/// Version-control operations the repository lifecycle depends on.
pub trait VersionControl {
    /// Clone `url` into `dest`, which must not exist yet.
    fn clone_repository(&self, url: &str, dest: &Path) -> Result<()>;

    /// Branch names available in the clone (local and remote-tracking, deduplicated).
    fn branch_refs(&self, workdir: &Path) -> Result<Vec<String>>;

    /// Check out an existing branch.
    fn checkout(&self, workdir: &Path, branch: &str) -> Result<()>;
}

/// [`VersionControl`] backed by the `git` executable.
#[derive(Debug, Clone, Copy, Default)]
pub struct GitCli;

impl VersionControl for GitCli {
    fn clone_repository(&self, url: &str, dest: &Path) -> Result<()> {
        Git::clone_into(url, dest).map(|_| ())
    }

    fn branch_refs(&self, workdir: &Path) -> Result<Vec<String>> {
        Git::new(workdir).branch_refs()
    }

    fn checkout(&self, workdir: &Path, branch: &str) -> Result<()> {
        Git::new(workdir).checkout_branch(branch)
    }
}

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    /// Clone `url` into `dest`, creating missing parent directories.
    ///
    /// git runs from the parent directory with the final path component as
    /// target, so relative destinations resolve the same way as absolute ones.
    #[instrument(skip_all, fields(url, dest = %dest.display()))]
    pub fn clone_into(url: &str, dest: &Path) -> Result<Self> {
        let name = dest
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| anyhow!("clone destination {} has no usable name", dest.display()))?;
        let parent = match dest.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)
            .with_context(|| format!("create clone parent {}", parent.display()))?;

        debug!("cloning");
        Git::new(&parent).run_checked(&["clone", "--", url, name])?;
        Ok(Git::new(dest))
    }

    /// Return the current branch name (errors on detached HEAD).
    #[cfg(any(test, feature = "test-support"))]
    #[instrument(skip_all)]
    pub fn current_branch(&self) -> Result<String> {
        let out = self.run_capture(&["rev-parse", "--abbrev-ref", "HEAD"])?;
        let name = out.trim().to_string();
        if name == "HEAD" {
            tracing::warn!("detached HEAD detected");
            return Err(anyhow!("detached HEAD"));
        }
        debug!(branch = %name, "current branch");
        Ok(name)
    }

    /// Branch names from local heads and remote-tracking refs, sorted and deduplicated.
    pub fn branch_refs(&self) -> Result<Vec<String>> {
        let out = self.run_capture(&[
            "for-each-ref",
            "--format=%(refname)",
            "refs/heads",
            "refs/remotes",
        ])?;
        let mut names: Vec<String> = out
            .lines()
            .filter_map(|line| branch_name(line.trim()))
            .map(str::to_string)
            .collect();
        names.sort();
        names.dedup();
        debug!(count = names.len(), "enumerated branches");
        Ok(names)
    }

    /// Checkout an existing branch (remote-only branches get a tracking branch).
    #[instrument(skip_all, fields(branch))]
    pub fn checkout_branch(&self, branch: &str) -> Result<()> {
        debug!(branch, "checking out branch");
        self.run_checked(&["checkout", branch])?;
        Ok(())
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        let output = self.run_checked(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            // Never block on a credential prompt.
            .env("GIT_TERMINAL_PROMPT", "0")
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}
