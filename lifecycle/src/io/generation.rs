//! Client for the remote generation service.
//!
//! [`GenerationClient::generate`] never fails outward: every failure mode is
//! folded into a [`GenerationResult`] after the retry budget is spent. The
//! HTTP layer sits behind [`Transport`] so tests can script responses.

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument};

use crate::core::credential::Credential;
use crate::core::retry::{always, retry_with_backoff};
use crate::core::types::{GenerationRequest, GenerationResult};
use crate::error::{ClientError, CredentialError, GenerationError, UNAUTHORIZED_STATUS};
use crate::io::config::GenerationSettings;

/// Bytes of an error body kept in [`GenerationError::Status`].
const ERROR_BODY_LIMIT: usize = 512;

/// Chat-completions request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatRequest {
    /// Single-turn request with the prompt as user content.
    pub fn single_turn(request: &GenerationRequest) -> Self {
        Self {
            model: request.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: request.prompt.clone(),
            }],
            max_tokens: request.max_output_tokens,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

/// Everything a transport needs to send one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportRequest {
    pub endpoint: String,
    pub authorization: String,
    pub body: ChatRequest,
}

/// Raw HTTP answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

/// Abstraction over the HTTP layer.
pub trait Transport {
    /// Send the request. `Err` means no HTTP status was received.
    fn send(&self, request: &TransportRequest) -> Result<TransportResponse, GenerationError>;
}

/// [`Transport`] backed by a blocking reqwest client.
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ClientError::Http(err.to_string()))?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: &TransportRequest) -> Result<TransportResponse, GenerationError> {
        let response = self
            .client
            .post(&request.endpoint)
            .header(AUTHORIZATION, request.authorization.as_str())
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .json(&request.body)
            .send()
            .map_err(|err| GenerationError::Transport(err.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|err| GenerationError::Transport(err.to_string()))?;
        Ok(TransportResponse { status, body })
    }
}

/// Retrying client for the generation service.
pub struct GenerationClient {
    credential: Credential,
    settings: GenerationSettings,
    transport: Box<dyn Transport>,
}

impl GenerationClient {
    /// Build a client talking HTTP to `settings.endpoint`.
    pub fn new(credential: Option<&str>, settings: GenerationSettings) -> Result<Self, ClientError> {
        let credential = Credential::parse(credential)?;
        let transport = HttpTransport::new(Duration::from_secs(settings.request_timeout_secs))?;
        Ok(Self::assemble(credential, settings, Box::new(transport)))
    }

    /// Build a client over a caller-supplied transport.
    pub fn with_transport(
        credential: Option<&str>,
        settings: GenerationSettings,
        transport: Box<dyn Transport>,
    ) -> Result<Self, CredentialError> {
        let credential = Credential::parse(credential)?;
        Ok(Self::assemble(credential, settings, transport))
    }

    fn assemble(
        credential: Credential,
        settings: GenerationSettings,
        transport: Box<dyn Transport>,
    ) -> Self {
        debug!(credential = %credential.redacted(), endpoint = %settings.endpoint, "generation client ready");
        Self {
            credential,
            settings,
            transport,
        }
    }

    pub fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    /// Request for `prompt` using the configured model and output budget.
    pub fn request(&self, prompt: impl Into<String>) -> GenerationRequest {
        GenerationRequest::new(prompt)
            .with_model(self.settings.model.clone())
            .with_max_output_tokens(self.settings.max_output_tokens)
    }

    /// Send `request`, retrying every failure up to the configured budget.
    #[instrument(skip_all, fields(model = %request.model, max_output_tokens = request.max_output_tokens))]
    pub fn generate(&self, request: &GenerationRequest) -> GenerationResult {
        let outbound = TransportRequest {
            endpoint: self.settings.endpoint.clone(),
            authorization: self.credential.authorization_header(),
            body: ChatRequest::single_turn(request),
        };
        let outcome = retry_with_backoff(
            &self.settings.retry_policy(),
            "generation",
            |attempt| {
                debug!(attempt, prompt_bytes = request.prompt.len(), "sending generation request");
                self.attempt(&outbound)
            },
            always,
        );
        match outcome {
            Ok((text, status)) => {
                info!(status, response_bytes = text.len(), "generation succeeded");
                GenerationResult::success(text, status)
            }
            Err(err) => {
                error!(err = %err, "generation failed");
                GenerationResult::failure(err)
            }
        }
    }

    fn attempt(&self, request: &TransportRequest) -> Result<(String, u16), GenerationError> {
        let response = self.transport.send(request)?;
        debug!(status = response.status, "generation response");
        if response.status == UNAUTHORIZED_STATUS {
            error!("authentication failed");
            return Err(GenerationError::Unauthorized);
        }
        if !(200..300).contains(&response.status) {
            return Err(GenerationError::Status {
                status: response.status,
                body: truncate(&response.body, ERROR_BODY_LIMIT),
            });
        }
        let text = first_completion(&response.body)?;
        Ok((text, response.status))
    }
}

fn first_completion(body: &str) -> Result<String, GenerationError> {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|err| GenerationError::MalformedResponse(err.to_string()))?;
    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| GenerationError::MalformedResponse("no choices in response".to_string()))?;
    choice.message.content.ok_or_else(|| {
        GenerationError::MalformedResponse("first choice has no message content".to_string())
    })
}

fn truncate(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.trim().to_string();
    }
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", text[..end].trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        ScriptedTransport, completion, fast_settings, status_response, transport_error,
    };

    fn client(transport: &ScriptedTransport) -> GenerationClient {
        GenerationClient::with_transport(
            Some("Bearer sk-test-key"),
            fast_settings().generation,
            Box::new(transport.clone()),
        )
        .expect("client")
    }

    #[test]
    fn success_on_first_attempt_returns_content_and_status() {
        let transport = ScriptedTransport::new(vec![completion("hello world")]);
        let result = client(&transport).generate(&GenerationRequest::new("say hi"));

        assert_eq!(result.text, "hello world");
        assert_eq!(result.status_code, 200);
        assert!(result.error.is_none());
        assert_eq!(transport.calls(), 1);
    }

    #[test]
    fn request_body_and_headers_match_service_contract() {
        let transport = ScriptedTransport::new(vec![completion("ok")]);
        let request = GenerationRequest::new("write code")
            .with_model("deepseek-coder")
            .with_max_output_tokens(1234);
        client(&transport).generate(&request);

        let sent = transport.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].authorization, "Bearer sk-test-key");
        let body = serde_json::to_value(&sent[0].body).expect("json");
        assert_eq!(
            body,
            serde_json::json!({
                "model": "deepseek-coder",
                "messages": [{"role": "user", "content": "write code"}],
                "max_tokens": 1234,
            })
        );
    }

    #[test]
    fn persistent_401_surfaces_auth_failure_after_full_budget() {
        let transport = ScriptedTransport::new(vec![
            status_response(401),
            status_response(401),
            status_response(401),
            completion("never reached"),
        ]);
        let result = client(&transport).generate(&GenerationRequest::new("x"));

        assert_eq!(result.status_code, 401);
        assert!(result.text.is_empty());
        assert_eq!(result.error, Some(GenerationError::Unauthorized));
        assert_eq!(result.error_message().as_deref(), Some("Authentication failed"));
        assert_eq!(transport.calls(), 3);
    }

    #[test]
    fn success_on_third_attempt_stops_retrying() {
        let transport = ScriptedTransport::new(vec![
            transport_error("connection reset"),
            status_response(503),
            completion("finally"),
            completion("extra"),
        ]);
        let result = client(&transport).generate(&GenerationRequest::new("x"));

        assert_eq!(result.text, "finally");
        assert_eq!(transport.calls(), 3);
    }

    #[test]
    fn auth_failure_then_success_recovers() {
        let transport = ScriptedTransport::new(vec![status_response(401), completion("ok")]);
        let result = client(&transport).generate(&GenerationRequest::new("x"));
        assert!(result.is_success());
        assert_eq!(transport.calls(), 2);
    }

    #[test]
    fn transport_errors_become_synthetic_500_with_description() {
        let transport = ScriptedTransport::new(vec![
            transport_error("timed out"),
            transport_error("timed out"),
            transport_error("dns failure"),
        ]);
        let result = client(&transport).generate(&GenerationRequest::new("x"));

        assert_eq!(result.status_code, 500);
        assert!(result.text.is_empty());
        assert_eq!(
            result.error_message().as_deref(),
            Some("request failed: dns failure")
        );
    }

    #[test]
    fn malformed_body_is_retried_and_reported() {
        let transport = ScriptedTransport::new(vec![
            Ok(TransportResponse {
                status: 200,
                body: "not json".to_string(),
            }),
            Ok(TransportResponse {
                status: 200,
                body: r#"{"choices": []}"#.to_string(),
            }),
            Ok(TransportResponse {
                status: 200,
                body: r#"{"choices": [{"message": {"role": "assistant"}}]}"#.to_string(),
            }),
        ]);
        let result = client(&transport).generate(&GenerationRequest::new("x"));

        assert_eq!(result.status_code, 500);
        assert!(matches!(
            result.error,
            Some(GenerationError::MalformedResponse(_))
        ));
        assert_eq!(transport.calls(), 3);
    }

    #[test]
    fn construction_fails_before_any_request_for_bad_credentials() {
        for raw in [None, Some(""), Some("   "), Some("Bearer sk-"), Some("sk-has space")] {
            let transport = ScriptedTransport::new(vec![completion("unused")]);
            let built = GenerationClient::with_transport(
                raw,
                fast_settings().generation,
                Box::new(transport.clone()),
            );
            assert!(built.is_err(), "{raw:?} should be rejected");
            assert_eq!(transport.calls(), 0);
        }
    }

    #[test]
    fn request_uses_configured_model_and_budget() {
        let transport = ScriptedTransport::new(Vec::new());
        let mut settings = fast_settings().generation;
        settings.model = "custom-model".to_string();
        settings.max_output_tokens = 77;
        let client =
            GenerationClient::with_transport(Some("k"), settings, Box::new(transport)).expect("client");
        let request = client.request("p");
        assert_eq!(request.model, "custom-model");
        assert_eq!(request.max_output_tokens, 77);
    }

    #[test]
    fn long_error_bodies_are_truncated_on_char_boundary() {
        let body = "é".repeat(600);
        let truncated = truncate(&body, 5);
        assert_eq!(truncated, "éé…");
    }
}
