//! Test-only fakes for the pipeline's trait seams.
//!
//! Fakes hand out shared handles (`Clone`) so a test can box one copy into
//! the code under test and inspect the other afterwards.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::rc::Rc;

use anyhow::{Context, Result, anyhow};
use tempfile::TempDir;

use crate::error::{GenerationError, MonitorError};
use crate::io::config::Settings;
use crate::io::generation::{GenerationClient, Transport, TransportRequest, TransportResponse};
use crate::io::git::VersionControl;
use crate::io::health::HealthProbe;
use crate::io::platform::Platform;

/// Settings with every pause set to zero.
pub fn fast_settings() -> Settings {
    let mut settings = Settings::default();
    settings.generation.retry_delay_secs = 0;
    settings.repository.settle_delay_ms = 0;
    settings.monitoring.retry_delay_secs = 0;
    settings
}

/// Client over `transport` with a valid credential and [`fast_settings`].
pub fn scripted_client(transport: &ScriptedTransport) -> GenerationClient {
    GenerationClient::with_transport(
        Some("sk-test-key"),
        fast_settings().generation,
        Box::new(transport.clone()),
    )
    .expect("test credential is valid")
}

/// 200 response carrying `text` as the first choice.
pub fn completion(text: &str) -> Result<TransportResponse, GenerationError> {
    let body = serde_json::json!({
        "choices": [{"message": {"role": "assistant", "content": text}}],
    });
    Ok(TransportResponse {
        status: 200,
        body: body.to_string(),
    })
}

pub fn status_response(status: u16) -> Result<TransportResponse, GenerationError> {
    Ok(TransportResponse {
        status,
        body: format!("{{\"error\": \"status {status}\"}}"),
    })
}

pub fn transport_error(message: &str) -> Result<TransportResponse, GenerationError> {
    Err(GenerationError::Transport(message.to_string()))
}

/// [`Transport`] replaying a fixed script of responses.
///
/// Once the script is exhausted every call fails with a transport error.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    script: Rc<RefCell<VecDeque<Result<TransportResponse, GenerationError>>>>,
    requests: Rc<RefCell<Vec<TransportRequest>>>,
}

impl ScriptedTransport {
    pub fn new(script: Vec<Result<TransportResponse, GenerationError>>) -> Self {
        Self {
            script: Rc::new(RefCell::new(script.into())),
            requests: Rc::default(),
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.borrow().len()
    }

    pub fn requests(&self) -> Vec<TransportRequest> {
        self.requests.borrow().clone()
    }
}

impl Transport for ScriptedTransport {
    fn send(&self, request: &TransportRequest) -> Result<TransportResponse, GenerationError> {
        self.requests.borrow_mut().push(request.clone());
        self.script
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Err(GenerationError::Transport("script exhausted".to_string())))
    }
}

/// [`HealthProbe`] replaying a fixed script of answers.
#[derive(Clone, Default)]
pub struct ScriptedProbe {
    script: Rc<RefCell<VecDeque<Result<u16, MonitorError>>>>,
    calls: Rc<RefCell<usize>>,
}

impl ScriptedProbe {
    pub fn new(script: Vec<Result<u16, MonitorError>>) -> Self {
        Self {
            script: Rc::new(RefCell::new(script.into())),
            calls: Rc::default(),
        }
    }

    pub fn calls(&self) -> usize {
        *self.calls.borrow()
    }
}

impl HealthProbe for ScriptedProbe {
    fn probe(&self, _url: &str) -> Result<u16, MonitorError> {
        *self.calls.borrow_mut() += 1;
        self.script
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Err(MonitorError::Transport("script exhausted".to_string())))
    }
}

#[derive(Default)]
struct VcsState {
    clones: usize,
    checkouts: Vec<String>,
}

/// [`VersionControl`] that materializes a directory instead of cloning.
#[derive(Clone, Default)]
pub struct FakeVcs {
    branches: Vec<String>,
    fail_clone: bool,
    state: Rc<RefCell<VcsState>>,
}

impl FakeVcs {
    pub fn with_branches(branches: &[&str]) -> Self {
        Self {
            branches: branches.iter().map(|name| (*name).to_string()).collect(),
            ..Self::default()
        }
    }

    /// Leaves a partial directory behind and then fails.
    pub fn failing_clone() -> Self {
        Self {
            fail_clone: true,
            ..Self::default()
        }
    }

    pub fn clones(&self) -> usize {
        self.state.borrow().clones
    }

    pub fn checkouts(&self) -> Vec<String> {
        self.state.borrow().checkouts.clone()
    }
}

impl VersionControl for FakeVcs {
    fn clone_repository(&self, url: &str, dest: &Path) -> Result<()> {
        if dest.exists() {
            return Err(anyhow!("destination {} already exists", dest.display()));
        }
        fs::create_dir_all(dest.join(".git"))?;
        if self.fail_clone {
            return Err(anyhow!("remote {url} hung up unexpectedly"));
        }
        fs::write(dest.join("README.md"), format!("cloned from {url}\n"))?;
        self.state.borrow_mut().clones += 1;
        Ok(())
    }

    fn branch_refs(&self, _workdir: &Path) -> Result<Vec<String>> {
        Ok(self.branches.clone())
    }

    fn checkout(&self, _workdir: &Path, branch: &str) -> Result<()> {
        if !self.branches.iter().any(|name| name == branch) {
            return Err(anyhow!("pathspec '{branch}' did not match"));
        }
        self.state.borrow_mut().checkouts.push(branch.to_string());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformCall {
    Terminate,
    ClearAttributes,
    ForceRemove,
}

/// [`Platform`] that records calls and removes directories with `std::fs`.
#[derive(Clone, Default)]
pub struct RecordingPlatform {
    calls: Rc<RefCell<Vec<PlatformCall>>>,
    fail_early_steps: bool,
    stubborn: bool,
}

impl RecordingPlatform {
    /// Terminate and attribute clearing fail; removal still works.
    pub fn failing_early_steps() -> Self {
        Self {
            fail_early_steps: true,
            ..Self::default()
        }
    }

    /// Removal reports success but leaves the directory in place.
    pub fn stubborn() -> Self {
        Self {
            stubborn: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<PlatformCall> {
        self.calls.borrow().clone()
    }

    fn record(&self, call: PlatformCall) {
        self.calls.borrow_mut().push(call);
    }
}

impl Platform for RecordingPlatform {
    fn terminate_vcs_processes(&self, _path: &Path) -> Result<()> {
        self.record(PlatformCall::Terminate);
        if self.fail_early_steps {
            return Err(anyhow!("pkill unavailable"));
        }
        Ok(())
    }

    fn clear_attributes(&self, _path: &Path) -> Result<()> {
        self.record(PlatformCall::ClearAttributes);
        if self.fail_early_steps {
            return Err(anyhow!("permission denied"));
        }
        Ok(())
    }

    fn force_remove(&self, path: &Path) -> Result<()> {
        self.record(PlatformCall::ForceRemove);
        if self.stubborn {
            return Ok(());
        }
        fs::remove_dir_all(path)?;
        Ok(())
    }
}

/// A local git repository to clone from, living in its own temp directory.
pub struct SourceRepo {
    _temp: TempDir,
    path: PathBuf,
}

impl SourceRepo {
    /// Create a repository whose initial branch is `default_branch`, plus
    /// one extra branch per entry of `others`, each with one commit.
    pub fn new(default_branch: &str, others: &[&str]) -> Result<Self> {
        let temp = tempfile::tempdir().context("tempdir")?;
        let path = temp.path().join("source");
        fs::create_dir_all(&path)?;
        let repo = Self { _temp: temp, path };

        repo.git(&["init", "--quiet", "-b", default_branch])?;
        fs::write(repo.path.join("README.md"), "source\n")?;
        repo.git(&["add", "README.md"])?;
        repo.commit("initial")?;
        for branch in others {
            repo.git(&["checkout", "--quiet", "-b", branch])?;
            fs::write(repo.path.join(format!("{branch}.txt")), *branch)?;
            repo.git(&["add", "."])?;
            repo.commit(branch)?;
        }
        repo.git(&["checkout", "--quiet", default_branch])?;
        Ok(repo)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Clone URL (a plain local path).
    pub fn url(&self) -> String {
        self.path.display().to_string()
    }

    fn commit(&self, message: &str) -> Result<()> {
        self.git(&[
            "-c",
            "user.name=Lifecycle Tests",
            "-c",
            "user.email=lifecycle@example.com",
            "commit",
            "--quiet",
            "-m",
            message,
        ])
    }

    fn git(&self, args: &[&str]) -> Result<()> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.path)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))?;
        if !output.status.success() {
            return Err(anyhow!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        Ok(())
    }
}
