//! Deployment config validation and deploy script execution.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use tracing::{error, info, instrument, warn};

use crate::core::types::DeploymentConfig;
use crate::error::AgentError;
use crate::io::generation::GenerationClient;
use crate::io::process::{DEFAULT_OUTPUT_LIMIT_BYTES, run_command};
use crate::io::prompt::PromptEngine;

use super::complete;

/// Outcome of a deploy script run. Output is captured, not interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployReport {
    pub script: PathBuf,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl DeployReport {
    pub fn succeeded(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

pub struct DeploymentAgent<'a> {
    client: &'a GenerationClient,
    prompts: PromptEngine,
    script: PathBuf,
    command: Vec<String>,
    timeout: Option<Duration>,
}

impl<'a> DeploymentAgent<'a> {
    /// `command` is the interpreter and its flags; the absolute script path is appended.
    pub fn new(
        client: &'a GenerationClient,
        script: impl Into<PathBuf>,
        command: Vec<String>,
    ) -> Result<Self, AgentError> {
        Ok(Self {
            client,
            prompts: PromptEngine::new()?,
            script: script.into(),
            command,
            timeout: None,
        })
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Ask the generation service whether `config` is valid.
    ///
    /// True iff the response mentions "valid" in any case (so "invalid" also passes).
    #[instrument(skip_all, fields(port = config.port))]
    pub fn validate_deployment(&self, config: &DeploymentConfig) -> Result<bool, AgentError> {
        let json = serde_json::to_string(config)?;
        let prompt = self.prompts.validate(&json)?;
        let verdict = complete(self.client, &self.client.request(prompt))?;
        let valid = verdict.to_lowercase().contains("valid");
        info!(valid, "deployment config checked");
        Ok(valid)
    }

    /// Run the deploy script and wait for it (bounded by the optional timeout).
    #[instrument(skip_all, fields(script = %self.script.display()))]
    pub fn deploy(&self) -> Result<DeployReport, AgentError> {
        let script = std::path::absolute(&self.script).map_err(|err| AgentError::Deploy {
            script: self.script.clone(),
            message: format!("resolve script path: {err}"),
        })?;
        let Some((program, flags)) = self.command.split_first() else {
            return Err(AgentError::Deploy {
                script,
                message: "deployment command is empty".to_string(),
            });
        };
        let mut cmd = Command::new(program);
        cmd.args(flags).arg(&script);

        let output = run_command(cmd, self.timeout, DEFAULT_OUTPUT_LIMIT_BYTES).map_err(|err| {
            error!(err = %format!("{err:#}"), "deploy script could not be started");
            AgentError::Deploy {
                script: script.clone(),
                message: format!("{err:#}"),
            }
        })?;
        let report = DeployReport {
            script,
            exit_code: output.status.code(),
            stdout: output.stdout_lossy(),
            stderr: output.stderr_lossy(),
            timed_out: output.timed_out,
        };
        if report.succeeded() {
            info!("deployment succeeded");
        } else {
            warn!(exit_code = ?report.exit_code, timed_out = report.timed_out, "deployment failed");
        }
        Ok(report)
    }

    pub fn script(&self) -> &Path {
        &self.script
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::DeployEnvironment;
    use crate::test_support::{ScriptedTransport, completion, scripted_client, status_response};

    fn config() -> DeploymentConfig {
        DeploymentConfig {
            port: 3000,
            environment: DeployEnvironment::Development,
            health_check_endpoint: "/health".to_string(),
        }
    }

    #[test]
    fn validation_matches_valid_substring_case_insensitively() {
        let transport = ScriptedTransport::new(vec![
            completion("The configuration is VALID."),
            completion("This config is invalid: port in use"),
            completion("Looks wrong"),
        ]);
        let client = scripted_client(&transport);
        let agent = DeploymentAgent::new(&client, "deploy.sh", vec!["sh".to_string()]).expect("agent");

        assert!(agent.validate_deployment(&config()).expect("first"));
        assert!(agent.validate_deployment(&config()).expect("second"));
        assert!(!agent.validate_deployment(&config()).expect("third"));

        let prompt = &transport.requests()[0].body.messages[0].content;
        assert_eq!(
            prompt,
            "Validate deployment config:\n{\"port\":3000,\"environment\":\"development\",\"healthCheckEndpoint\":\"/health\"}"
        );
    }

    #[test]
    fn validation_surfaces_generation_failure() {
        let transport = ScriptedTransport::new(vec![
            status_response(503),
            status_response(503),
            status_response(503),
        ]);
        let client = scripted_client(&transport);
        let agent = DeploymentAgent::new(&client, "deploy.sh", vec!["sh".to_string()]).expect("agent");
        assert!(matches!(
            agent.validate_deployment(&config()),
            Err(AgentError::Generation(_))
        ));
    }

    #[test]
    fn missing_interpreter_is_a_deploy_error() {
        let client = scripted_client(&ScriptedTransport::new(Vec::new()));
        let agent = DeploymentAgent::new(
            &client,
            "deploy.ps1",
            vec!["definitely-not-an-interpreter-xyz".to_string()],
        )
        .expect("agent");
        let err = agent.deploy().unwrap_err();
        assert!(matches!(err, AgentError::Deploy { ref script, .. } if script.is_absolute()));
    }

    #[cfg(unix)]
    #[test]
    fn deploy_reports_exit_code_and_output() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ok = temp.path().join("ok.sh");
        std::fs::write(&ok, "echo deployed\n").expect("write");
        let bad = temp.path().join("bad.sh");
        std::fs::write(&bad, "echo nope >&2\nexit 2\n").expect("write");
        let client = scripted_client(&ScriptedTransport::new(Vec::new()));

        let report = DeploymentAgent::new(&client, &ok, vec!["sh".to_string()])
            .expect("agent")
            .deploy()
            .expect("deploy");
        assert!(report.succeeded());
        assert_eq!(report.stdout, "deployed\n");

        let report = DeploymentAgent::new(&client, &bad, vec!["sh".to_string()])
            .expect("agent")
            .deploy()
            .expect("deploy");
        assert!(!report.succeeded());
        assert_eq!(report.exit_code, Some(2));
        assert_eq!(report.stderr, "nope\n");
    }

    #[cfg(unix)]
    #[test]
    fn deploy_timeout_counts_as_failure() {
        let temp = tempfile::tempdir().expect("tempdir");
        let slow = temp.path().join("slow.sh");
        std::fs::write(&slow, "exec sleep 5\n").expect("write");
        let client = scripted_client(&ScriptedTransport::new(Vec::new()));

        let report = DeploymentAgent::new(&client, &slow, vec!["sh".to_string()])
            .expect("agent")
            .with_timeout(Some(Duration::from_millis(100)))
            .deploy()
            .expect("deploy");
        assert!(report.timed_out);
        assert!(!report.succeeded());
    }
}
