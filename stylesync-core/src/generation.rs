//! Generation stage: visual attributes + trend keywords to a `Listing`, via
//! the Groq OpenAI-compatible chat completions API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{Listing, StageOutcome, VisualAttributes};
use crate::vision::strip_code_fence;

pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";

const SYSTEM_PROMPT: &str = "You are an e-commerce copywriter for fashion brands. \
Write a product listing that converts: confident, sensory tone, focused on benefits. \
Work the target keywords in naturally. Return ONLY a JSON object with keys \
title (50-60 characters), description (2-3 paragraphs), features (array of 3 bullet \
strings) and price_estimate (a USD range).";

#[async_trait]
pub trait GenerationStage: Send + Sync {
    async fn write_listing(
        &self,
        visual: &VisualAttributes,
        keywords: &[String],
    ) -> StageOutcome<Listing>;
}

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Completion contained no message")]
    EmptyResponse,

    #[error("Completion was not valid listing JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Missing API key")]
    MissingApiKey,
}

#[derive(Debug, Clone)]
pub struct WriterConfig {
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
}

// ============================================================================
// Chat completion structs (private)
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

// ============================================================================
// GroqListingWriter
// ============================================================================

#[derive(Debug, Clone)]
pub struct GroqListingWriter {
    client: Client,
    config: WriterConfig,
    base_url: String,
}

impl GroqListingWriter {
    pub fn new(config: WriterConfig) -> Result<Self, GenerationError> {
        Self::with_base_url(config, GROQ_BASE_URL.to_string())
    }

    pub fn with_base_url(config: WriterConfig, base_url: String) -> Result<Self, GenerationError> {
        if config.api_key.is_empty() {
            return Err(GenerationError::MissingApiKey);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;

        Ok(Self {
            client,
            config,
            base_url,
        })
    }

    pub async fn write_raw(
        &self,
        visual: &VisualAttributes,
        keywords: &[String],
    ) -> Result<Listing, GenerationError> {
        let product_data = serde_json::to_string_pretty(visual)?;
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: format!(
                        "PRODUCT DATA:\n{}\n\nTARGET KEYWORDS:\n{}",
                        product_data,
                        keywords.join(", ")
                    ),
                },
            ],
            temperature: self.config.temperature,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .ok()
                .and_then(|b| b.error)
                .map(|e| e.message)
                .unwrap_or(body);
            return Err(GenerationError::Api {
                code: status.as_u16(),
                message,
            });
        }

        let parsed: ChatResponse = response.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or(GenerationError::EmptyResponse)?;

        Ok(serde_json::from_str(strip_code_fence(&content))?)
    }
}

#[async_trait]
impl GenerationStage for GroqListingWriter {
    async fn write_listing(
        &self,
        visual: &VisualAttributes,
        keywords: &[String],
    ) -> StageOutcome<Listing> {
        match self.write_raw(visual, keywords).await {
            Ok(listing) => StageOutcome::fresh(listing),
            Err(e) => {
                tracing::warn!(error = %e, model = %self.config.model, "Listing generation failed, using fallback listing");
                StageOutcome::degraded(Listing::fallback_from(visual))
            }
        }
    }
}

/// Used when no generation key is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledWriter;

#[async_trait]
impl GenerationStage for DisabledWriter {
    async fn write_listing(
        &self,
        visual: &VisualAttributes,
        _keywords: &[String],
    ) -> StageOutcome<Listing> {
        StageOutcome::degraded(Listing::fallback_from(visual))
    }
}
