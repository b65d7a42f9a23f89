//! OpenAI-compatible `/chat/completions` client.

use std::time::Instant;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use lessonforge_shared::{ClientConfig, LessonError, Result};

use crate::{Completion, FinishReason, GenerationOptions, TextGenerator};

/// User-Agent string for generation requests.
const USER_AGENT: &str = concat!("LessonForge/", env!("CARGO_PKG_VERSION"));

/// Longest error body we keep for diagnostics.
const MAX_ERROR_BODY: usize = 500;

/// HTTP generation client for one configured endpoint.
///
/// Built from an explicit [`ClientConfig`]; there is no process-wide client.
pub struct ChatClient {
    config: ClientConfig,
    client: Client,
}

impl ChatClient {
    /// Create a client for the given endpoint.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| LessonError::Upstream(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.as_str().trim_end_matches('/')
        )
    }
}

#[async_trait]
impl TextGenerator for ChatClient {
    fn name(&self) -> &str {
        &self.config.name
    }

    #[instrument(skip_all, fields(endpoint = %self.config.name, model = %self.config.model, max_tokens = options.max_output_tokens))]
    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<Completion> {
        let started = Instant::now();
        let payload = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: options.max_output_tokens,
            temperature: options.temperature,
        };

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LessonError::UpstreamTimeout {
                        after_ms: self.config.request_timeout.as_millis() as u64,
                    }
                } else {
                    LessonError::Upstream(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body: String = body.chars().take(MAX_ERROR_BODY).collect();
            return Err(LessonError::UpstreamStatus {
                status: status.as_u16(),
                body,
            });
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| LessonError::Upstream(format!("invalid response body: {e}")))?;

        let choice = body.choices.into_iter().next().ok_or(LessonError::EmptyOutput)?;
        let text = choice.message.content.unwrap_or_default();
        let usage = body.usage.unwrap_or_default();

        debug!(
            latency_ms = started.elapsed().as_millis() as u64,
            chars = text.len(),
            finish = ?choice.finish_reason,
            "completion received"
        );

        Ok(Completion {
            text,
            finish_reason: FinishReason::from_api(choice.finish_reason.as_deref()),
            tokens_in: usage.prompt_tokens,
            tokens_out: usage.completion_tokens,
            model: body.model.unwrap_or_else(|| self.config.model.clone()),
        })
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}
