//! Ownership of the single on-disk checkout.
//!
//! [`RepositoryManager`] guarantees that every clone starts from an absent
//! directory. When passive removal is not enough it escalates through the
//! [`Platform`] steps (terminate holders, clear attributes, force-remove),
//! pausing between steps so the OS can release handles.

use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, error, info, instrument, warn};

use crate::core::branch::select_branch;
use crate::core::retry::RetryPolicy;
use crate::error::RepositoryError;
use crate::io::config::RepositorySettings;
use crate::io::git::{GitCli, VersionControl};
use crate::io::platform::{self, Platform, is_present};

/// Attempts made by the passive removal step before the OS fallback.
const REMOVAL_ATTEMPTS: u32 = 3;

/// The checkout currently owned by a [`RepositoryManager`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryHandle {
    pub local_path: PathBuf,
    pub remote_url: String,
    /// `main` or `master` when one was checked out, `None` for the clone default.
    pub active_branch: Option<String>,
}

/// Owns the checkout directory and the handle describing it.
pub struct RepositoryManager {
    path: PathBuf,
    settle_delay: Duration,
    vcs: Box<dyn VersionControl>,
    platform: Box<dyn Platform>,
    handle: Option<RepositoryHandle>,
}

impl RepositoryManager {
    pub fn new(
        path: impl Into<PathBuf>,
        settle_delay: Duration,
        vcs: Box<dyn VersionControl>,
        platform: Box<dyn Platform>,
    ) -> Self {
        Self {
            path: path.into(),
            settle_delay,
            vcs,
            platform,
            handle: None,
        }
    }

    /// Manager using `git` and the native platform backend.
    pub fn from_settings(settings: &RepositorySettings) -> Self {
        let removal = RetryPolicy::new(REMOVAL_ATTEMPTS, settings.settle_delay());
        Self::new(
            settings.path.clone(),
            settings.settle_delay(),
            Box::new(GitCli),
            platform::native(removal),
        )
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The handle from the last successful clone, if any.
    pub fn get_repository(&self) -> Option<&RepositoryHandle> {
        self.handle.as_ref()
    }

    /// Remove the checkout directory, escalating as needed.
    ///
    /// Each step runs even when the previous one failed. Succeeds iff the
    /// directory is absent afterwards. An absent directory is a no-op.
    #[instrument(skip_all, fields(path = %self.path.display()))]
    pub fn force_cleanup(&self) -> Result<(), RepositoryError> {
        if !is_present(&self.path) {
            debug!("checkout directory absent, nothing to clean");
            return Ok(());
        }

        info!("forcing cleanup of checkout directory");
        self.step("terminate git processes", |platform, path| {
            platform.terminate_vcs_processes(path)
        });
        self.settle();
        self.step("clear attributes", |platform, path| platform.clear_attributes(path));
        self.settle();
        self.step("force remove", |platform, path| platform.force_remove(path));
        self.settle();

        if is_present(&self.path) {
            error!("checkout directory still present after cleanup");
            return Err(RepositoryError::CleanupIncomplete {
                path: self.path.clone(),
            });
        }
        info!("checkout directory removed");
        Ok(())
    }

    /// Clean the checkout, clone `remote_url`, and check out `main` or `master`.
    ///
    /// On failure the handle stays unset and any partial clone is removed.
    #[instrument(skip_all, fields(remote_url, path = %self.path.display()))]
    pub fn initialize_repository(
        &mut self,
        remote_url: &str,
    ) -> Result<&RepositoryHandle, RepositoryError> {
        self.handle = None;
        self.force_cleanup()?;

        let result = (|| -> Result<RepositoryHandle, RepositoryError> {
            self.clone_fresh(remote_url)?;
            let branches = self
                .vcs
                .branch_refs(&self.path)
                .map_err(|err| RepositoryError::Branches {
                    message: format!("{err:#}"),
                })?;
            debug!(?branches, "available branches");
            let active_branch = match select_branch(&branches) {
                Some(branch) => {
                    self.checkout(branch)?;
                    Some(branch.to_string())
                }
                None => {
                    warn!("neither main nor master found, keeping clone default");
                    None
                }
            };
            Ok(RepositoryHandle {
                local_path: self.path.clone(),
                remote_url: remote_url.to_string(),
                active_branch,
            })
        })();

        match result {
            Ok(handle) => {
                info!(branch = ?handle.active_branch, "repository initialized");
                Ok(self.handle.insert(handle))
            }
            Err(err) => {
                error!(err = %err, "repository initialization failed");
                self.discard_partial_clone();
                Err(err)
            }
        }
    }

    /// Recovery path: remove the checkout, clone again, and check out `branch`.
    ///
    /// Unlike [`Self::initialize_repository`], a missing branch is an error.
    #[instrument(skip_all, fields(remote_url, branch))]
    pub fn hard_reset(
        &mut self,
        remote_url: &str,
        branch: &str,
    ) -> Result<&RepositoryHandle, RepositoryError> {
        self.handle = None;
        self.force_cleanup()?;

        let result = self
            .clone_fresh(remote_url)
            .and_then(|()| self.checkout(branch));
        match result {
            Ok(()) => {
                info!("hard reset complete");
                Ok(self.handle.insert(RepositoryHandle {
                    local_path: self.path.clone(),
                    remote_url: remote_url.to_string(),
                    active_branch: Some(branch.to_string()),
                }))
            }
            Err(err) => {
                error!(err = %err, "hard reset failed");
                self.discard_partial_clone();
                Err(err)
            }
        }
    }

    fn clone_fresh(&self, remote_url: &str) -> Result<(), RepositoryError> {
        self.vcs
            .clone_repository(remote_url, &self.path)
            .map_err(|err| RepositoryError::Clone {
                url: remote_url.to_string(),
                message: format!("{err:#}"),
            })
    }

    fn checkout(&self, branch: &str) -> Result<(), RepositoryError> {
        self.vcs
            .checkout(&self.path, branch)
            .map_err(|err| RepositoryError::Checkout {
                branch: branch.to_string(),
                message: format!("{err:#}"),
            })
    }

    fn step<F>(&self, name: &str, op: F)
    where
        F: FnOnce(&dyn Platform, &Path) -> Result<()>,
    {
        match op(self.platform.as_ref(), &self.path) {
            Ok(()) => debug!(step = name, "cleanup step done"),
            Err(err) => warn!(step = name, err = %format!("{err:#}"), "cleanup step failed, continuing"),
        }
    }

    fn settle(&self) {
        if !self.settle_delay.is_zero() {
            thread::sleep(self.settle_delay);
        }
    }

    fn discard_partial_clone(&self) {
        if !is_present(&self.path) {
            return;
        }
        if let Err(err) = self.force_cleanup() {
            warn!(err = %err, "could not discard partial clone");
        }
    }
}
