//! Repository acquisition, code generation, and code review.

use tracing::{info, instrument, warn};

use crate::core::review::{comments_or_notice, error_comment};
use crate::error::AgentError;
use crate::io::generation::GenerationClient;
use crate::io::prompt::PromptEngine;
use crate::io::repository::{RepositoryHandle, RepositoryManager};

use super::complete;

pub struct DevelopmentAgent<'a> {
    client: &'a GenerationClient,
    repositories: &'a mut RepositoryManager,
    prompts: PromptEngine,
    default_repo_url: Option<String>,
}

impl<'a> DevelopmentAgent<'a> {
    pub fn new(
        client: &'a GenerationClient,
        repositories: &'a mut RepositoryManager,
        default_repo_url: Option<String>,
    ) -> Result<Self, AgentError> {
        Ok(Self {
            client,
            repositories,
            prompts: PromptEngine::new()?,
            default_repo_url: default_repo_url.filter(|url| !url.trim().is_empty()),
        })
    }

    /// Acquire a fresh checkout of `url`, or of the default URL when `url` is unset or blank.
    #[instrument(skip_all)]
    pub fn set_repository(&mut self, url: Option<&str>) -> Result<&RepositoryHandle, AgentError> {
        let url = url
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .map(str::to_string)
            .or_else(|| self.default_repo_url.clone())
            .ok_or_else(|| {
                warn!("no repository URL given and no default configured");
                AgentError::MissingRepositoryUrl
            })?;
        info!(url = %url, "setting up repository");
        Ok(self.repositories.initialize_repository(&url)?)
    }

    pub fn repository(&self) -> Option<&RepositoryHandle> {
        self.repositories.get_repository()
    }

    /// Generate code for `requirements` following `project_type` conventions.
    #[instrument(skip_all, fields(project_type))]
    pub fn generate_code(&self, requirements: &str, project_type: &str) -> Result<String, AgentError> {
        let prompt = self.prompts.development(requirements, project_type)?;
        let request = self
            .client
            .request(prompt)
            .with_max_output_tokens(self.client.settings().code_max_output_tokens);
        let code = complete(self.client, &request)?;
        info!(bytes = code.len(), "code generated");
        Ok(code)
    }

    /// Review `code` against the seven-point rubric.
    ///
    /// Never empty: failures come back as a single explanatory comment.
    #[instrument(skip_all, fields(code_bytes = code.len()))]
    pub fn review_code(&self, code: &str) -> Vec<String> {
        let prompt = match self.prompts.review(code) {
            Ok(prompt) => prompt,
            Err(err) => return vec![error_comment(&err)],
        };
        let result = self.client.generate(&self.client.request(prompt));
        match result.into_result() {
            Ok(text) => comments_or_notice(&text),
            Err(err) => {
                warn!(err = %err, "code review failed");
                vec![error_comment(&err)]
            }
        }
    }
}
