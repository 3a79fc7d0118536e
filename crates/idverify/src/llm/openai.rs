//! `OpenAI` chat-completions client with image input and JSON-schema replies.
//!
//! Works against the public `OpenAI` API (or any compatible base URL) and
//! against Azure `OpenAI` deployments:
//!
//! ```no_run
//! use idverify::config::LlmSettings;
//! use idverify::llm::OpenAIClient;
//!
//! # fn example() -> Result<(), idverify::llm::LlmError> {
//! let settings = LlmSettings {
//!     azure_endpoint: Some("https://my-resource.openai.azure.com".into()),
//!     api_key: std::env::var("AZURE_OPENAI_API_KEY").unwrap_or_default(),
//!     ..LlmSettings::default()
//! };
//! let client = OpenAIClient::new(settings)?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::debug;

use super::{CompletionRequest, ImageInput, LanguageModel, LlmError};
use crate::config::LlmSettings;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: f32,
    response_format: ResponseFormat<'a>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    format_type: &'static str,
    json_schema: JsonSchemaFormat<'a>,
}

#[derive(Debug, Serialize)]
struct JsonSchemaFormat<'a> {
    name: &'a str,
    schema: &'a Value,
    strict: bool,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
    detail: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

fn image_part(image: &ImageInput) -> ContentPart {
    let b64 = base64::engine::general_purpose::STANDARD.encode(&image.data);
    ContentPart::ImageUrl {
        image_url: ImageUrl {
            url: format!("data:{};base64,{b64}", image.mime),
            detail: "high",
        },
    }
}

/// HTTP client for `OpenAI` and Azure `OpenAI` chat completions
#[derive(Debug, Clone)]
pub struct OpenAIClient {
    http_client: Client,
    settings: LlmSettings,
}

impl OpenAIClient {
    /// Create a client with the configured request timeout
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(settings: LlmSettings) -> Result<Self, LlmError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| LlmError::Transport(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            settings,
        })
    }

    /// Chat-completions URL for the configured provider
    #[must_use]
    pub fn completions_url(&self) -> String {
        match &self.settings.azure_endpoint {
            Some(endpoint) => format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                endpoint.trim_end_matches('/'),
                self.settings.model,
                self.settings.azure_api_version
            ),
            None => format!(
                "{}/chat/completions",
                self.settings.api_base.trim_end_matches('/')
            ),
        }
    }

    fn build_request<'a>(&'a self, request: &CompletionRequest<'a>) -> ChatRequest<'a> {
        let mut content = Vec::with_capacity(request.images.len() + 1);
        content.push(ContentPart::Text {
            text: request.prompt.to_string(),
        });
        content.extend(request.images.iter().map(image_part));

        ChatRequest {
            model: &self.settings.model,
            messages: vec![Message {
                role: "user",
                content,
            }],
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
            response_format: ResponseFormat {
                format_type: "json_schema",
                json_schema: JsonSchemaFormat {
                    name: &request.schema.name,
                    schema: &request.schema.schema,
                    strict: false,
                },
            },
        }
    }
}

#[async_trait]
impl LanguageModel for OpenAIClient {
    async fn complete(&self, request: CompletionRequest<'_>) -> Result<String, LlmError> {
        let start = Instant::now();
        let body = self.build_request(&request);

        let builder = self.http_client.post(self.completions_url()).json(&body);
        let builder = if self.settings.azure_endpoint.is_some() {
            builder.header("api-key", &self.settings.api_key)
        } else {
            builder.bearer_auth(&self.settings.api_key)
        };

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Transport(format!("failed to parse response: {e}")))?;

        debug!(
            "{} completion with {} image(s) took {}ms",
            request.schema.name,
            request.images.len(),
            start.elapsed().as_millis()
        );

        chat.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(LlmError::EmptyResponse)
    }
}
