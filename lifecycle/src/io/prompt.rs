//! Prompt templates sent to the generation service.
//!
//! Templates are registered without a file extension so minijinja applies no
//! auto-escaping: code and JSON must reach the service verbatim.

use minijinja::{Environment, context};
use tracing::debug;

const DEVELOPMENT_TEMPLATE: &str = include_str!("prompts/development.md");
const REVIEW_TEMPLATE: &str = include_str!("prompts/review.md");
const TESTS_TEMPLATE: &str = include_str!("prompts/tests.md");
const VALIDATE_TEMPLATE: &str = include_str!("prompts/validate.md");

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    pub fn new() -> Result<Self, minijinja::Error> {
        let mut env = Environment::new();
        env.add_template("development", DEVELOPMENT_TEMPLATE)?;
        env.add_template("review", REVIEW_TEMPLATE)?;
        env.add_template("tests", TESTS_TEMPLATE)?;
        env.add_template("validate", VALIDATE_TEMPLATE)?;
        Ok(Self { env })
    }

    /// Scaffold prompt for code generation.
    pub fn development(
        &self,
        requirements: &str,
        project_type: &str,
    ) -> Result<String, minijinja::Error> {
        self.render(
            "development",
            context! {
                requirements => requirements.trim(),
                project_type => project_type.trim(),
            },
        )
    }

    /// Seven-point review rubric followed by the code.
    pub fn review(&self, code: &str) -> Result<String, minijinja::Error> {
        self.render("review", context! { code => code })
    }

    pub fn tests(&self, code: &str) -> Result<String, minijinja::Error> {
        self.render("tests", context! { code => code })
    }

    /// `config` is already-serialized JSON text.
    pub fn validate(&self, config: &str) -> Result<String, minijinja::Error> {
        self.render("validate", context! { config => config })
    }

    fn render(&self, name: &str, ctx: minijinja::Value) -> Result<String, minijinja::Error> {
        let rendered = self.env.get_template(name)?.render(ctx)?;
        debug!(template = name, bytes = rendered.len(), "rendered prompt");
        Ok(rendered)
    }
}
