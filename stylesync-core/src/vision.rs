//! Vision stage: product image to `VisualAttributes` via Gemini
//! `generateContent`. Never fails outward: any error becomes
//! `VisualAttributes::analysis_failed`.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::embeddings::{gemini_error, API_KEY_HEADER, GEMINI_BASE_URL};
use crate::models::{StageOutcome, VisualAttributes};

const ANALYSIS_PROMPT: &str = "Analyze this product image for an e-commerce listing. \
Identify the main color, the product type, the design style or vibe, and three distinct \
visual features. Return strictly a JSON object with keys: main_color, product_type, \
design_style, visual_features (an array of strings).";

/// Image bytes borrowed from the upload for the duration of one request.
#[derive(Debug, Clone, Copy)]
pub struct ImageInput<'a> {
    pub bytes: &'a [u8],
    pub mime_type: &'a str,
}

#[async_trait]
pub trait VisionStage: Send + Sync {
    async fn analyze(&self, image: ImageInput<'_>) -> StageOutcome<VisualAttributes>;
}

#[derive(Error, Debug)]
pub enum VisionError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Response contained no text candidate")]
    EmptyResponse,

    #[error("Response was not valid attribute JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Missing API key")]
    MissingApiKey,
}

// ============================================================================
// Gemini API structs (private)
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<RequestContent>,
    generation_config: GenerationSettings,
}

#[derive(Debug, Serialize)]
struct RequestContent {
    parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum RequestPart {
    Image { inline_data: InlineData },
    Text { text: String },
}

#[derive(Debug, Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationSettings {
    response_mime_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

// ============================================================================
// GeminiVisionClient
// ============================================================================

#[derive(Debug, Clone)]
pub struct GeminiVisionClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiVisionClient {
    pub fn new(api_key: String, model: String) -> Result<Self, VisionError> {
        Self::with_base_url(api_key, model, GEMINI_BASE_URL.to_string())
    }

    pub fn with_base_url(
        api_key: String,
        model: String,
        base_url: String,
    ) -> Result<Self, VisionError> {
        if api_key.is_empty() {
            return Err(VisionError::MissingApiKey);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;

        Ok(Self {
            client,
            api_key,
            model,
            base_url,
        })
    }

    pub async fn analyze_raw(&self, image: ImageInput<'_>) -> Result<VisualAttributes, VisionError> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url, self.model
        );

        let request = GenerateRequest {
            contents: vec![RequestContent {
                parts: vec![
                    RequestPart::Image {
                        inline_data: InlineData {
                            mime_type: image.mime_type.to_string(),
                            data: base64::engine::general_purpose::STANDARD.encode(image.bytes),
                        },
                    },
                    RequestPart::Text {
                        text: ANALYSIS_PROMPT.to_string(),
                    },
                ],
            }],
            generation_config: GenerationSettings {
                response_mime_type: "application/json",
            },
        };

        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&request)
            .send()
            .await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let (code, message) = gemini_error(status, body);
            return Err(VisionError::Api { code, message });
        }

        let parsed: GenerateResponse = response.json().await?;
        let text = parsed
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .find_map(|p| p.text)
            .ok_or(VisionError::EmptyResponse)?;

        Ok(serde_json::from_str(strip_code_fence(&text))?)
    }
}

#[async_trait]
impl VisionStage for GeminiVisionClient {
    async fn analyze(&self, image: ImageInput<'_>) -> StageOutcome<VisualAttributes> {
        match self.analyze_raw(image).await {
            Ok(attributes) => StageOutcome::fresh(attributes),
            Err(e) => {
                tracing::warn!(error = %e, model = %self.model, "Visual analysis failed, using placeholder attributes");
                StageOutcome::degraded(VisualAttributes::analysis_failed(e))
            }
        }
    }
}

/// Used when no vision key is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledVision;

#[async_trait]
impl VisionStage for DisabledVision {
    async fn analyze(&self, _image: ImageInput<'_>) -> StageOutcome<VisualAttributes> {
        StageOutcome::degraded(VisualAttributes::analysis_failed("vision API key not configured"))
    }
}

/// Remove a surrounding markdown code fence (```json … ```) if present.
pub fn strip_code_fence(text: &str) -> &str {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    let fence = FENCE.get_or_init(|| {
        Regex::new(r"(?s)^\s*```[A-Za-z]*\s*(.*?)\s*```\s*$").expect("static regex")
    });
    match fence.captures(text).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str(),
        None => text.trim(),
    }
}
