//! Shared value types for the pipeline.
//!
//! These are transient: built per call or per run, never persisted.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::GenerationError;

/// Model used when the caller does not name one.
pub const DEFAULT_MODEL: &str = "deepseek-chat";
/// Output token budget used when the caller does not set one.
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 3000;

/// One text-in/text-out call to the generation service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub model: String,
    /// Always > 0.
    pub max_output_tokens: u32,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: DEFAULT_MODEL.to_string(),
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the output budget. Zero is clamped to one.
    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = max_output_tokens.max(1);
        self
    }
}

/// Outcome of a generation call.
///
/// `text` is empty on failure. `status_code` is the service's status on
/// success, 401 when the credential was rejected, and 500 otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationResult {
    pub text: String,
    pub status_code: u16,
    pub error: Option<GenerationError>,
}

impl GenerationResult {
    pub fn success(text: impl Into<String>, status_code: u16) -> Self {
        Self {
            text: text.into(),
            status_code,
            error: None,
        }
    }

    pub fn failure(error: GenerationError) -> Self {
        Self {
            text: String::new(),
            status_code: error.status_code(),
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }

    pub fn into_result(self) -> Result<String, GenerationError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.text),
        }
    }
}

/// Target environment of a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeployEnvironment {
    #[default]
    Development,
    Staging,
    Production,
}

/// Deployment configuration submitted for validation.
///
/// Serialized as JSON text (`healthCheckEndpoint` key) and sent to the
/// generation service as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentConfig {
    pub port: u16,
    pub environment: DeployEnvironment,
    pub health_check_endpoint: String,
}

/// Steps of a pipeline run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Repository,
    CodeGeneration,
    CodeReview,
    Testing,
    Validation,
    Deployment,
    Monitoring,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Repository => "repository",
            Stage::CodeGeneration => "code generation",
            Stage::CodeReview => "code review",
            Stage::Testing => "testing",
            Stage::Validation => "validation",
            Stage::Deployment => "deployment",
            Stage::Monitoring => "monitoring",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a stage ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    Passed,
    Failed,
}

/// Recorded result of one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageOutcome {
    pub stage: Stage,
    pub status: StageStatus,
    /// Human-readable summary (error text on failure).
    pub detail: String,
}

impl StageOutcome {
    pub fn passed(stage: Stage, detail: impl Into<String>) -> Self {
        Self {
            stage,
            status: StageStatus::Passed,
            detail: detail.into(),
        }
    }

    pub fn failed(stage: Stage, detail: impl Into<String>) -> Self {
        Self {
            stage,
            status: StageStatus::Failed,
            detail: detail.into(),
        }
    }
}
