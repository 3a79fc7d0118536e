//! Language-model seam.
//!
//! The pipeline talks to the extraction oracle through [`LanguageModel`]: one
//! prompt, any number of images, and a JSON schema the reply must follow.
//! [`complete_structured`] adds the parse step for types implementing
//! [`StructuredOutput`].
//!
//! - [`openai`] - OpenAI and Azure OpenAI chat-completions client

pub mod openai;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::Path;
use thiserror::Error;

pub use openai::OpenAIClient;

/// Language-model call errors
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("request timed out")]
    Timeout,

    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("response had no content")]
    EmptyResponse,

    #[error("response did not match schema {schema}: {reason}")]
    MalformedOutput { schema: String, reason: String },
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::Transport(e.to_string())
        }
    }
}

/// An image attached to a prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInput {
    pub mime: &'static str,
    pub data: Vec<u8>,
}

impl ImageInput {
    /// Read an image file, taking the MIME type from its extension
    ///
    /// # Errors
    /// Returns an error if the file cannot be read.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let mime = match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("jpg" | "jpeg") => "image/jpeg",
            _ => "image/png",
        };
        Ok(Self {
            mime,
            data: std::fs::read(path)?,
        })
    }
}

/// Named JSON schema the reply must conform to
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseSchema {
    pub name: String,
    pub schema: Value,
}

/// One schema-constrained completion
#[derive(Debug, Clone, Copy)]
pub struct CompletionRequest<'a> {
    pub prompt: &'a str,
    pub images: &'a [ImageInput],
    pub schema: &'a ResponseSchema,
}

/// A vision-capable language model returning schema-constrained JSON
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Raw reply text for one request
    async fn complete(&self, request: CompletionRequest<'_>) -> Result<String, LlmError>;
}

/// A type the model can be asked to produce
pub trait StructuredOutput: DeserializeOwned {
    fn schema_name() -> &'static str;

    fn json_schema() -> Value;

    fn response_schema() -> ResponseSchema {
        ResponseSchema {
            name: Self::schema_name().to_string(),
            schema: Self::json_schema(),
        }
    }
}

/// Ask for a `T` and parse the reply
///
/// # Errors
/// Returns the call's error, or `MalformedOutput` if the reply does not
/// parse as `T`.
pub async fn complete_structured<T: StructuredOutput>(
    model: &dyn LanguageModel,
    prompt: &str,
    images: &[ImageInput],
) -> Result<T, LlmError> {
    let schema = T::response_schema();
    let reply = model
        .complete(CompletionRequest {
            prompt,
            images,
            schema: &schema,
        })
        .await?;

    serde_json::from_str(&extract_json(&reply)).map_err(|e| LlmError::MalformedOutput {
        schema: schema.name,
        reason: e.to_string(),
    })
}

/// Extract JSON from a reply, handling markdown code fences.
pub(crate) fn extract_json(text: &str) -> String {
    let text = text.trim();

    if text.starts_with("```") {
        if let Some(start) = text.find('\n') {
            let after_first_line = &text[start + 1..];
            if let Some(end) = after_first_line.rfind("```") {
                return after_first_line[..end].trim().to_string();
            }
        }
    }

    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            return text[start..=end].to_string();
        }
    }

    text.to_string()
}
