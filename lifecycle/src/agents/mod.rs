//! Pipeline stage façades.
//!
//! Each agent borrows the shared [`GenerationClient`] and exposes one stage's
//! operations. Agents keep no state between calls beyond their collaborators.

use tracing::warn;

use crate::core::types::GenerationRequest;
use crate::error::AgentError;
use crate::io::generation::GenerationClient;

pub mod deployment;
pub mod development;
pub mod monitoring;
pub mod testing;

pub use deployment::{DeployReport, DeploymentAgent};
pub use development::DevelopmentAgent;
pub use monitoring::MonitoringAgent;
pub use testing::{CommandTestCase, FnTestCase, TestCase, TestFailure, TestReport, TestingAgent};

/// Send `request` and require non-blank text back.
pub(crate) fn complete(
    client: &GenerationClient,
    request: &GenerationRequest,
) -> Result<String, AgentError> {
    let text = client.generate(request).into_result()?;
    if text.trim().is_empty() {
        warn!("generation service returned no text");
        return Err(AgentError::EmptyResponse);
    }
    Ok(text)
}
