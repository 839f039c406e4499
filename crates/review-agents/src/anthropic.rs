//! Completion Service over the Anthropic Messages API.
//!
//! Structured output is forced through a single tool, `emit_result`, whose
//! input schema is the requested result schema. The tool input is the
//! result. One HTTP attempt per call; retry and the per-call budget belong
//! to the substrate.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use review_coordination::{
    CallRole, CompletionError, CompletionRequest, CompletionResponse, CompletionResult,
    CompletionService,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
pub const API_VERSION: &str = "2023-06-01";
const RESULT_TOOL: &str = "emit_result";

#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    pub api_key: String,
    pub base_url: String,
    /// Client-side limit for one HTTP attempt.
    pub request_timeout: Duration,
}

impl AnthropicConfig {
    /// `ANTHROPIC_API_KEY` is required; `REVIEW_ANTHROPIC_URL` overrides the
    /// endpoint.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY").context("ANTHROPIC_API_KEY is not set")?;
        let base_url =
            std::env::var("REVIEW_ANTHROPIC_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.into());
        Ok(Self {
            api_key,
            base_url,
            request_timeout: Duration::from_secs(90),
        })
    }
}

pub struct AnthropicCompletions {
    client: reqwest::Client,
    config: AnthropicConfig,
}

impl AnthropicCompletions {
    pub fn new(config: AnthropicConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client, config })
    }

    fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.config.base_url.trim_end_matches('/'))
    }
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    usage: Usage,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    ToolUse {
        name: String,
        input: Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct Usage {
    input_tokens: u64,
    output_tokens: u64,
}

/// Messages API body forcing the result tool.
pub(crate) fn request_body(request: &CompletionRequest) -> Value {
    let mut schema = request.schema.clone();
    if let Some(map) = schema.as_object_mut() {
        map.remove("$schema");
    }
    json!({
        "model": request.model,
        "max_tokens": request.max_tokens,
        "system": request.system_prompt,
        "messages": [{"role": "user", "content": request.user_prompt}],
        "tools": [{
            "name": RESULT_TOOL,
            "description": "Return the structured result of this task.",
            "input_schema": schema,
        }],
        "tool_choice": {"type": "tool", "name": RESULT_TOOL},
    })
}

/// Map an HTTP status to the completion failure taxonomy.
pub(crate) fn status_error(status: u16, body: &str) -> CompletionError {
    let detail = format!("HTTP {status}: {}", body.chars().take(300).collect::<String>());
    match status {
        429 => CompletionError::RateLimited(detail),
        408 | 529 | 500..=599 => CompletionError::Transient(detail),
        _ => CompletionError::Fatal(detail),
    }
}

fn transport_error(err: reqwest::Error, started: Instant) -> CompletionError {
    if err.is_timeout() {
        CompletionError::TimedOut {
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    } else if err.is_connect() || err.is_request() {
        CompletionError::Transient(err.to_string())
    } else {
        CompletionError::Fatal(err.to_string())
    }
}

fn extract_result(
    role: CallRole,
    response: MessagesResponse,
) -> CompletionResult<CompletionResponse> {
    let output = response
        .content
        .into_iter()
        .find_map(|block| match block {
            ContentBlock::ToolUse { name, input } if name == RESULT_TOOL => Some(input),
            _ => None,
        })
        .ok_or_else(|| CompletionError::MalformedOutput {
            role,
            reason: format!("response has no {RESULT_TOOL} tool call"),
        })?;
    Ok(CompletionResponse {
        output,
        input_tokens: response.usage.input_tokens,
        output_tokens: response.usage.output_tokens,
    })
}

#[async_trait]
impl CompletionService for AnthropicCompletions {
    async fn complete(&self, request: CompletionRequest) -> CompletionResult<CompletionResponse> {
        let started = Instant::now();
        let response = self
            .client
            .post(self.messages_url())
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&request_body(&request))
            .send()
            .await
            .map_err(|e| transport_error(e, started))?;

        let status = response.status();
        debug!(role = %request.role, status = status.as_u16(), "Messages API responded");
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status.as_u16(), &body));
        }

        let parsed: MessagesResponse =
            response
                .json()
                .await
                .map_err(|e| CompletionError::MalformedOutput {
                    role: request.role,
                    reason: e.to_string(),
                })?;
        extract_result(request.role, parsed)
    }
}
