//! OpenAI-backed decision provider.
//!
//! One [`OpenAiDecisionProvider`] serves any OpenAI-compatible chat
//! completions endpoint via a configurable base URL. Every decision call
//! uses the API's structured-output mode: the schema from the request is
//! sent as a strict `json_schema` response format, so the model's reply is
//! already shaped like the decision type before we ever parse it.
//!
//! Transient failures (rate limits, overload, 5xx) are retried inside the
//! provider with exponential backoff. Handlers never retry on their own.

use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
    ChatCompletionRequestSystemMessageContent, ChatCompletionRequestUserMessage,
    ChatCompletionRequestUserMessageContent, CreateChatCompletionRequest, ResponseFormat,
    ResponseFormatJsonSchema,
};
use async_openai::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{info_span, warn, Instrument};

use concierge_core::decision::{DecisionProvider, DecisionRequest};
use concierge_types::error::DecisionError;

/// First retry waits this long; each further retry doubles it.
const RETRY_BASE_DELAY_MS: u64 = 250;

/// Configuration for [`OpenAiDecisionProvider`].
pub struct OpenAiProviderConfig {
    /// API key for authentication. Exposed only while constructing the
    /// underlying client.
    pub api_key: SecretString,
    /// Base URL for the API (e.g., "https://api.openai.com/v1").
    pub base_url: String,
    /// Model identifier (e.g., "gpt-4o-mini").
    pub model: String,
    /// Total attempts per decision, including the first. Clamped to >= 1.
    pub max_attempts: u32,
}

/// Decision provider speaking the OpenAI chat completions protocol.
///
/// # API Key Security
///
/// Does NOT derive Debug to prevent accidental exposure of internal state
/// including the API key inside the `async_openai::Client`.
pub struct OpenAiDecisionProvider {
    client: Client<OpenAIConfig>,
    model: String,
    max_attempts: u32,
}

impl OpenAiDecisionProvider {
    pub fn new(config: OpenAiProviderConfig) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(config.api_key.expose_secret())
            .with_api_base(&config.base_url);

        Self {
            client: Client::with_config(openai_config),
            model: config.model,
            max_attempts: config.max_attempts.max(1),
        }
    }

    /// Provider pointed at the official OpenAI endpoint.
    ///
    /// Uses `https://api.openai.com/v1` as the base URL and three attempts
    /// per decision.
    pub fn openai(api_key: SecretString, model: &str) -> Self {
        Self::new(OpenAiProviderConfig {
            api_key,
            base_url: "https://api.openai.com/v1".to_string(),
            model: model.to_string(),
            max_attempts: 3,
        })
    }

    /// Build a chat completion request with the decision schema attached
    /// as a strict structured-output format.
    fn build_request(&self, request: &DecisionRequest) -> CreateChatCompletionRequest {
        let messages = vec![
            ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
                content: ChatCompletionRequestSystemMessageContent::Text(
                    request.system_prompt.clone(),
                ),
                name: None,
            }),
            ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                content: ChatCompletionRequestUserMessageContent::Text(request.input.clone()),
                name: None,
            }),
        ];

        CreateChatCompletionRequest {
            model: self.model.clone(),
            messages,
            response_format: Some(ResponseFormat::JsonSchema {
                json_schema: ResponseFormatJsonSchema {
                    description: None,
                    name: request.schema_name.clone(),
                    schema: Some(request.schema.clone()),
                    strict: Some(true),
                },
            }),
            ..Default::default()
        }
    }

    fn backoff_delay(attempt: u32) -> Duration {
        let ms = RETRY_BASE_DELAY_MS * 2u64.pow(attempt.saturating_sub(1));
        // Jitter: 0.8x to 1.2x
        let jitter = 0.8 + rand::random::<f64>() * 0.4;
        Duration::from_millis((ms as f64 * jitter) as u64)
    }

    async fn generate_once(&self, request: &DecisionRequest) -> Result<Value, DecisionError> {
        let response = self
            .client
            .chat()
            .create(self.build_request(request))
            .await
            .map_err(map_openai_error)?;

        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();

        if content.trim().is_empty() {
            return Err(DecisionError::EmptyResponse);
        }

        serde_json::from_str(&content).map_err(|err| DecisionError::SchemaMismatch {
            schema: request.schema_name.clone(),
            message: err.to_string(),
        })
    }
}

// OpenAiDecisionProvider intentionally does NOT derive Debug to prevent
// accidental exposure of internal state including the API key inside the
// async-openai Client.

impl DecisionProvider for OpenAiDecisionProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(&self, request: &DecisionRequest) -> Result<Value, DecisionError> {
        // Span fields follow the OTel GenAI semantic conventions so the
        // optional exporter produces recognizable LLM-call spans.
        let span = info_span!(
            "gen_ai.decision",
            gen_ai.system = "openai",
            gen_ai.request.model = %self.model,
            schema = %request.schema_name,
        );

        async {
            let mut attempt = 1;
            loop {
                match self.generate_once(request).await {
                    Ok(value) => return Ok(value),
                    Err(err) if err.is_transient() && attempt < self.max_attempts => {
                        let delay = Self::backoff_delay(attempt);
                        warn!(
                            schema = %request.schema_name,
                            attempt,
                            max_attempts = self.max_attempts,
                            delay_ms = delay.as_millis() as u64,
                            error = %err,
                            "transient decision failure, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    Err(err) => return Err(err),
                }
            }
        }
        .instrument(span)
        .await
    }
}

/// Map an `async_openai::error::OpenAIError` to a [`DecisionError`].
fn map_openai_error(err: async_openai::error::OpenAIError) -> DecisionError {
    use async_openai::error::OpenAIError;

    match &err {
        OpenAIError::ApiError(api_err) => {
            let code = api_err.code.as_deref().unwrap_or("");
            let error_type = api_err.r#type.as_deref().unwrap_or("");

            if code == "authentication_error"
                || error_type == "authentication_error"
                || api_err.message.contains("Incorrect API key")
                || api_err.message.contains("Invalid API key")
            {
                DecisionError::AuthenticationFailed
            } else if code == "rate_limit_exceeded" || error_type == "rate_limit_error" {
                DecisionError::RateLimited {
                    retry_after_ms: None,
                }
            } else if code == "server_error" || error_type == "overloaded_error" {
                DecisionError::Overloaded(api_err.message.clone())
            } else {
                DecisionError::Provider {
                    message: err.to_string(),
                }
            }
        }
        OpenAIError::Reqwest(reqwest_err) => {
            if let Some(status) = reqwest_err.status() {
                match status.as_u16() {
                    401 => DecisionError::AuthenticationFailed,
                    429 => DecisionError::RateLimited {
                        retry_after_ms: None,
                    },
                    529 => DecisionError::Overloaded(err.to_string()),
                    _ => DecisionError::Provider {
                        message: err.to_string(),
                    },
                }
            } else {
                DecisionError::Provider {
                    message: err.to_string(),
                }
            }
        }
        OpenAIError::JSONDeserialize(_, content) => DecisionError::Provider {
            message: format!("failed to parse response: {content}"),
        },
        OpenAIError::InvalidArgument(msg) => DecisionError::InvalidRequest(msg.clone()),
        _ => DecisionError::Provider {
            message: err.to_string(),
        },
    }
}
