//! Test generation and an in-process test suite.

use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::error::AgentError;
use crate::io::generation::GenerationClient;
use crate::io::process::{DEFAULT_OUTPUT_LIMIT_BYTES, run_command};
use crate::io::prompt::PromptEngine;

use super::complete;

/// Bytes of stderr quoted in a failing command's message.
const FAILURE_TAIL_BYTES: usize = 2000;

/// One executable check.
pub trait TestCase {
    fn name(&self) -> &str;

    /// `Err` carries the failure message.
    fn run(&self) -> Result<(), String>;
}

/// Test case backed by a closure.
pub struct FnTestCase<F> {
    name: String,
    check: F,
}

impl<F> FnTestCase<F>
where
    F: Fn() -> Result<(), String>,
{
    pub fn new(name: impl Into<String>, check: F) -> Self {
        Self {
            name: name.into(),
            check,
        }
    }
}

impl<F> TestCase for FnTestCase<F>
where
    F: Fn() -> Result<(), String>,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self) -> Result<(), String> {
        (self.check)()
    }
}

/// Test case that runs a command and passes on exit code 0.
#[derive(Debug, Clone)]
pub struct CommandTestCase {
    pub name: String,
    pub argv: Vec<String>,
    pub workdir: PathBuf,
    pub timeout: Option<Duration>,
}

impl CommandTestCase {
    pub fn new(argv: Vec<String>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            name: argv.join(" "),
            argv,
            workdir: workdir.into(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

impl TestCase for CommandTestCase {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self) -> Result<(), String> {
        let Some((program, args)) = self.argv.split_first() else {
            return Err("empty command".to_string());
        };
        let mut cmd = Command::new(program);
        cmd.args(args).current_dir(&self.workdir);
        let output = run_command(cmd, self.timeout, DEFAULT_OUTPUT_LIMIT_BYTES)
            .map_err(|err| format!("{err:#}"))?;
        if output.timed_out {
            return Err("timed out".to_string());
        }
        if !output.succeeded() {
            let stderr = output.stderr_lossy();
            return Err(format!(
                "exit code {:?}: {}",
                output.status.code(),
                tail(stderr.trim(), FAILURE_TAIL_BYTES)
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestFailure {
    pub name: String,
    pub message: String,
}

/// Aggregate result of [`TestingAgent::run_tests`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TestReport {
    pub total: usize,
    pub failures: Vec<TestFailure>,
}

impl TestReport {
    /// True when no case failed (an empty suite counts as successful).
    pub fn was_successful(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn passed(&self) -> usize {
        self.total.saturating_sub(self.failures.len())
    }
}

pub struct TestingAgent<'a> {
    client: &'a GenerationClient,
    prompts: PromptEngine,
    cases: Vec<Box<dyn TestCase>>,
}

impl<'a> TestingAgent<'a> {
    pub fn new(client: &'a GenerationClient) -> Result<Self, AgentError> {
        Ok(Self {
            client,
            prompts: PromptEngine::new()?,
            cases: Vec::new(),
        })
    }

    /// Ask the generation service for unit tests covering `code`.
    #[instrument(skip_all, fields(code_bytes = code.len()))]
    pub fn generate_tests(&self, code: &str) -> Result<String, AgentError> {
        let prompt = self.prompts.tests(code)?;
        complete(self.client, &self.client.request(prompt))
    }

    pub fn add_test(&mut self, case: impl TestCase + 'static) {
        debug!(name = case.name(), "test case added");
        self.cases.push(Box::new(case));
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    /// Run every case in insertion order. A panicking case counts as failed.
    #[instrument(skip_all, fields(cases = self.cases.len()))]
    pub fn run_tests(&self) -> TestReport {
        let mut report = TestReport {
            total: self.cases.len(),
            failures: Vec::new(),
        };
        for case in &self.cases {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| case.run()))
                .unwrap_or_else(|payload| Err(panic_message(payload.as_ref())));
            match outcome {
                Ok(()) => debug!(name = case.name(), "test passed"),
                Err(message) => {
                    warn!(name = case.name(), message = %message, "test failed");
                    report.failures.push(TestFailure {
                        name: case.name().to_string(),
                        message,
                    });
                }
            }
        }
        info!(
            total = report.total,
            failed = report.failures.len(),
            "test run finished"
        );
        report
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    format!("panicked: {detail}")
}

fn tail(text: &str, limit: usize) -> &str {
    if text.len() <= limit {
        return text;
    }
    let mut start = text.len() - limit;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedTransport, completion, scripted_client};

    #[test]
    fn empty_suite_is_successful() {
        let client = scripted_client(&ScriptedTransport::new(Vec::new()));
        let agent = TestingAgent::new(&client).expect("agent");
        let report = agent.run_tests();
        assert!(report.was_successful());
        assert_eq!(report.total, 0);
    }

    #[test]
    fn failures_and_panics_are_collected() {
        let client = scripted_client(&ScriptedTransport::new(Vec::new()));
        let mut agent = TestingAgent::new(&client).expect("agent");
        agent.add_test(FnTestCase::new("passes", || Ok(())));
        agent.add_test(FnTestCase::new("fails", || Err("expected 1, got 2".to_string())));
        agent.add_test(FnTestCase::new("panics", || -> Result<(), String> {
            panic!("boom")
        }));

        let report = agent.run_tests();
        assert!(!report.was_successful());
        assert_eq!(report.total, 3);
        assert_eq!(report.passed(), 1);
        assert_eq!(report.failures[0].name, "fails");
        assert_eq!(report.failures[0].message, "expected 1, got 2");
        assert_eq!(report.failures[1].name, "panics");
        assert_eq!(report.failures[1].message, "panicked: boom");
    }

    #[test]
    fn passed_never_underflows() {
        let report = TestReport {
            total: 1,
            failures: vec![
                TestFailure {
                    name: "a".to_string(),
                    message: "x".to_string(),
                },
                TestFailure {
                    name: "b".to_string(),
                    message: "y".to_string(),
                },
            ],
        };
        assert_eq!(report.passed(), 0);
        assert!(!report.was_successful());
    }

    #[test]
    fn generate_tests_returns_service_text() {
        let transport = ScriptedTransport::new(vec![completion("describe('api', ...)")]);
        let client = scripted_client(&transport);
        let agent = TestingAgent::new(&client).expect("agent");

        let tests = agent.generate_tests("app.get('/health')").expect("tests");
        assert_eq!(tests, "describe('api', ...)");
        assert_eq!(
            transport.requests()[0].body.messages[0].content,
            "Generate unit tests for:\napp.get('/health')"
        );
    }

    #[cfg(unix)]
    #[test]
    fn command_cases_run_in_workdir() {
        let temp = tempfile::tempdir().expect("tempdir");
        std::fs::write(temp.path().join("marker"), "x").expect("write");
        let client = scripted_client(&ScriptedTransport::new(Vec::new()));
        let mut agent = TestingAgent::new(&client).expect("agent");
        let argv = |script: &str| vec!["sh".to_string(), "-c".to_string(), script.to_string()];
        agent.add_test(CommandTestCase::new(argv("test -f marker"), temp.path()));
        agent.add_test(CommandTestCase::new(argv("echo broken >&2; exit 4"), temp.path()));

        let report = agent.run_tests();
        assert_eq!(report.total, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].name, "sh -c echo broken >&2; exit 4");
        assert_eq!(report.failures[0].message, "exit code Some(4): broken");
    }

    #[test]
    fn tail_respects_char_boundaries() {
        assert_eq!(tail("abc", 10), "abc");
        assert_eq!(tail("aé", 1), "");
        assert_eq!(tail("abcdef", 2), "ef");
    }
}
