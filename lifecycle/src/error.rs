//! Typed errors for the pipeline's public surface.
//!
//! Internal plumbing (git and process helpers) reports `anyhow` errors with
//! context; these enums are what callers of the library match on:
//! - `CredentialError` / `ClientError`: generation client construction
//! - `GenerationError`: a single generation call (folded into `GenerationResult`)
//! - `RepositoryError`: checkout directory cleanup, clone, and checkout
//! - `AgentError`: pipeline agent operations
//! - `MonitorError`: health probing

use std::path::PathBuf;

use thiserror::Error;

/// Status reported when the generation service rejects the credential.
pub const UNAUTHORIZED_STATUS: u16 = 401;
/// Synthetic status reported for every other generation failure.
pub const SYNTHETIC_FAILURE_STATUS: u16 = 500;

/// Credential problems detected before any request is sent.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CredentialError {
    #[error("generation service credential is required")]
    Missing,

    #[error("generation service credential is malformed: {reason}")]
    Malformed { reason: String },
}

/// Failure to construct a generation client.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error("http client setup failed: {0}")]
    Http(String),
}

/// Failure of a single generation call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerationError {
    /// The service answered 401.
    #[error("Authentication failed")]
    Unauthorized,

    /// No HTTP status was received (connect, timeout, body read).
    #[error("request failed: {0}")]
    Transport(String),

    /// The service answered with a non-2xx status other than 401.
    #[error("service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// 2xx response whose body is not a usable completion.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl GenerationError {
    /// Status code reported in a failed `GenerationResult`.
    pub fn status_code(&self) -> u16 {
        match self {
            GenerationError::Unauthorized => UNAUTHORIZED_STATUS,
            _ => SYNTHETIC_FAILURE_STATUS,
        }
    }
}

/// Checkout directory and version-control failures.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("checkout directory {} is still present after forced cleanup", path.display())]
    CleanupIncomplete { path: PathBuf },

    #[error("clone of {url} failed: {message}")]
    Clone { url: String, message: String },

    #[error("listing branches failed: {message}")]
    Branches { message: String },

    #[error("checkout of branch {branch} failed: {message}")]
    Checkout { branch: String, message: String },
}

/// Failures surfaced by the pipeline agents.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("repository URL not provided")]
    MissingRepositoryUrl,

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("empty response from generation service")]
    EmptyResponse,

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("prompt rendering failed: {0}")]
    Prompt(#[from] minijinja::Error),

    #[error("serialize deployment config: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("deployment script {} could not be run: {message}", script.display())]
    Deploy { script: PathBuf, message: String },
}

/// Health probing failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MonitorError {
    #[error("health endpoint returned HTTP {0}")]
    UnexpectedStatus(u16),

    #[error("health request failed: {0}")]
    Transport(String),

    #[error("{url} unhealthy after {attempts} attempts: {last}")]
    Unhealthy {
        url: String,
        attempts: u32,
        last: Box<MonitorError>,
    },
}
