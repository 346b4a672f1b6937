//! Gemini (Google) image generation provider.

use crate::config::api_key_from_env;
use crate::error::{parse_retry_after, sanitize_error_message, CoverGenError, Result};
use crate::image::provider::ImageProvider;
use crate::image::types::{
    AspectRatio, EditRequest, GeneratedImage, GenerationMetadata, GenerationRequest, ImageFormat,
    ImageProviderKind, ImageSize,
};
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Instant;

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Gemini image model variants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GeminiModel {
    /// Nano Banana - Gemini 2.5 Flash Image (fast, economical).
    NanoBanana,
    /// Nano Banana Pro - Gemini 3 Pro Image (highest quality, paid key).
    #[default]
    NanoBananaPro,
}

impl GeminiModel {
    /// Returns the API model identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NanoBanana => "gemini-2.5-flash-image",
            Self::NanoBananaPro => "gemini-3-pro-image-preview",
        }
    }
}

impl FromStr for GeminiModel {
    type Err = CoverGenError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "flash" | "nano-banana" | "gemini-2.5-flash-image" => Ok(Self::NanoBanana),
            "pro" | "nano-banana-pro" | "gemini-3-pro-image-preview" => Ok(Self::NanoBananaPro),
            other => Err(CoverGenError::Config(format!(
                "unknown Gemini model '{other}'. Valid values: pro, flash"
            ))),
        }
    }
}

/// Builder for GeminiProvider.
#[derive(Debug, Clone, Default)]
pub struct GeminiProviderBuilder {
    api_key: Option<String>,
    model: GeminiModel,
}

impl GeminiProviderBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the API key. Falls back to `GOOGLE_API_KEY`, `GEMINI_API_KEY` or `API_KEY`.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the Gemini model variant.
    pub fn model(mut self, model: GeminiModel) -> Self {
        self.model = model;
        self
    }

    /// Builds the provider, resolving the API key.
    pub fn build(self) -> Result<GeminiProvider> {
        let api_key = self
            .api_key
            .filter(|k| !k.trim().is_empty())
            .or_else(api_key_from_env)
            .ok_or_else(|| {
                CoverGenError::Auth("GOOGLE_API_KEY not set and no API key provided".into())
            })?;

        Ok(GeminiProvider {
            client: reqwest::Client::new(),
            api_key,
            model: self.model,
        })
    }
}

/// Gemini image generation provider.
pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    model: GeminiModel,
}

impl GeminiProvider {
    /// Creates a new `GeminiProviderBuilder`.
    pub fn builder() -> GeminiProviderBuilder {
        GeminiProviderBuilder::new()
    }

    /// Returns the configured model.
    pub fn model(&self) -> GeminiModel {
        self.model
    }

    async fn generate_content(&self, body: &GeminiRequest) -> Result<GeneratedImage> {
        let start = Instant::now();

        let url = format!("{}/{}:generateContent", API_BASE, self.model.as_str());

        tracing::debug!(model = self.model.as_str(), "sending Gemini generateContent request");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let text = response.text().await.unwrap_or_default();
            return Err(parse_error(status.as_u16(), &text, &headers));
        }

        let gemini_response: GeminiResponse = response.json().await?;
        let (data, format) = extract_image(gemini_response)?;

        let duration_ms = start.elapsed().as_millis() as u64;
        tracing::debug!(duration_ms, bytes = data.len(), "Gemini image received");

        Ok(GeneratedImage::new(
            data,
            format,
            ImageProviderKind::Gemini,
            GenerationMetadata {
                model: Some(self.model.as_str().to_string()),
                duration_ms: Some(duration_ms),
            },
        ))
    }
}

#[async_trait]
impl ImageProvider for GeminiProvider {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedImage> {
        if request.prompt.trim().is_empty() {
            return Err(CoverGenError::InvalidRequest("prompt must not be empty".into()));
        }
        self.generate_content(&GeminiRequest::from_generation_request(request))
            .await
    }

    async fn edit(&self, request: &EditRequest) -> Result<GeneratedImage> {
        if request.image.is_empty() {
            return Err(CoverGenError::InvalidRequest("no image to edit".into()));
        }
        self.generate_content(&GeminiRequest::from_edit_request(request))
            .await
    }

    fn kind(&self) -> ImageProviderKind {
        ImageProviderKind::Gemini
    }

    async fn health_check(&self) -> Result<()> {
        let url = format!("{}/{}", API_BASE, self.model.as_str());

        let response = self
            .client
            .get(&url)
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await?;

        match response.status().as_u16() {
            401 | 403 => Err(CoverGenError::Auth("Invalid API key".into())),
            404 => Err(CoverGenError::InvalidRequest(
                "Model not found. Verify the model name is correct.".into(),
            )),
            s if !(200..300).contains(&s) => Err(CoverGenError::Api {
                status: s,
                message: "Health check failed".into(),
            }),
            _ => Ok(()),
        }
    }
}

fn parse_error(status: u16, text: &str, headers: &reqwest::header::HeaderMap) -> CoverGenError {
    let text = sanitize_error_message(text);
    let lower = text.to_lowercase();
    if status == 402 {
        return CoverGenError::Billing(
            "Gemini billing issue: enable billing at https://aistudio.google.com".into(),
        );
    }
    if status == 401
        || status == 403
        || lower.contains("api key not valid")
        || lower.contains("api_key_invalid")
    {
        return CoverGenError::Auth(text);
    }
    if status == 404 {
        return CoverGenError::InvalidRequest(
            "Model not found. Verify the model name is correct.".into(),
        );
    }
    if status == 429 {
        let retry_after = parse_retry_after(headers).map(std::time::Duration::from_secs);
        return CoverGenError::RateLimited { retry_after };
    }
    if lower.contains("safety")
        || lower.contains("blocked")
        || lower.contains("content_policy")
        || lower.contains("prohibited")
    {
        return CoverGenError::ContentBlocked(text);
    }
    CoverGenError::Api {
        status,
        message: text,
    }
}

/// Pulls the first inline image out of a successful response.
fn extract_image(response: GeminiResponse) -> Result<(Vec<u8>, ImageFormat)> {
    // Blocks are reported with HTTP 200
    if let Some(ref feedback) = response.prompt_feedback {
        if let Some(ref reason) = feedback.block_reason {
            let msg = feedback
                .block_reason_message
                .clone()
                .unwrap_or_else(|| format!("Prompt blocked: {}", reason));
            return Err(CoverGenError::ContentBlocked(msg));
        }
    }

    let candidate = response.candidates.into_iter().next().ok_or_else(|| {
        CoverGenError::UnexpectedResponse(
            "No image returned. It may have been blocked by safety filters.".into(),
        )
    })?;

    if let Some(ref finish_reason) = candidate.finish_reason {
        match finish_reason.as_str() {
            "SAFETY"
            | "IMAGE_SAFETY"
            | "IMAGE_PROHIBITED_CONTENT"
            | "IMAGE_RECITATION"
            | "RECITATION"
            | "PROHIBITED_CONTENT"
            | "BLOCKLIST" => {
                return Err(CoverGenError::ContentBlocked(format!(
                    "Content blocked by Gemini safety filter: {}",
                    finish_reason
                )));
            }
            "IMAGE_OTHER" | "NO_IMAGE" => {
                return Err(CoverGenError::UnexpectedResponse(format!(
                    "Generation failed: {}. Try a different prompt.",
                    finish_reason
                )));
            }
            _ => {}
        }
    }

    let parts = candidate.content.map(|c| c.parts).unwrap_or_default();

    let mut text_answer = None;
    let mut inline_data = None;
    for part in parts {
        if inline_data.is_none() {
            inline_data = part.inline_data;
        }
        if text_answer.is_none() {
            text_answer = part.text;
        }
    }

    let inline_data = match (inline_data, text_answer) {
        (Some(inline), _) => inline,
        (None, Some(text)) => {
            return Err(CoverGenError::UnexpectedResponse(format!(
                "Model returned text instead of an image: {}",
                sanitize_error_message(&text)
            )));
        }
        (None, None) => {
            return Err(CoverGenError::UnexpectedResponse(
                "No image returned. It may have been blocked by safety filters.".into(),
            ));
        }
    };

    let data = base64::engine::general_purpose::STANDARD
        .decode(&inline_data.data)
        .map_err(|e| CoverGenError::Decode(e.to_string()))?;

    let format = ImageFormat::from_mime_type(&inline_data.mime_type)
        .or_else(|| ImageFormat::from_magic_bytes(&data))
        .unwrap_or_default();

    Ok((data, format))
}

// Request/Response types
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    generation_config: GeminiConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiRequestPart>,
}

/// A part in a Gemini request - can be text or inline image data.
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum GeminiRequestPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: GeminiInlineData,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiConfig {
    response_modalities: Vec<String>,
    image_config: GeminiImageConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiImageConfig {
    aspect_ratio: &'static str,
    image_size: &'static str,
}

impl GeminiRequest {
    fn new(
        parts: Vec<GeminiRequestPart>,
        aspect_ratio: AspectRatio,
        image_size: ImageSize,
        seed: Option<u64>,
    ) -> Self {
        Self {
            contents: vec![GeminiContent { parts }],
            generation_config: GeminiConfig {
                response_modalities: vec!["IMAGE".to_string()],
                image_config: GeminiImageConfig {
                    aspect_ratio: aspect_ratio.as_str(),
                    image_size: image_size.as_str(),
                },
                seed,
            },
        }
    }

    fn from_generation_request(req: &GenerationRequest) -> Self {
        let mut parts = Vec::new();

        // The reference image goes first
        if let Some(ref reference) = req.reference_image {
            parts.push(GeminiRequestPart::InlineData {
                inline_data: GeminiInlineData {
                    mime_type: reference.mime_type.clone(),
                    data: base64::engine::general_purpose::STANDARD.encode(&reference.data),
                },
            });
        }

        parts.push(GeminiRequestPart::Text {
            text: req.prompt.clone(),
        });

        Self::new(parts, req.aspect_ratio, req.image_size, req.effective_seed())
    }

    fn from_edit_request(req: &EditRequest) -> Self {
        let mime_type = ImageFormat::from_magic_bytes(&req.image)
            .unwrap_or_default()
            .mime_type()
            .to_string();

        let parts = vec![
            GeminiRequestPart::InlineData {
                inline_data: GeminiInlineData {
                    mime_type,
                    data: base64::engine::general_purpose::STANDARD.encode(&req.image),
                },
            },
            GeminiRequestPart::Text {
                text: req.prompt.clone(),
            },
        ];

        Self::new(parts, req.aspect_ratio, req.image_size, None)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContentResponse>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
    #[serde(default)]
    block_reason_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiContentResponse {
    #[serde(default)]
    parts: Vec<GeminiPartResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPartResponse {
    #[serde(default)]
    inline_data: Option<InlineData>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}
