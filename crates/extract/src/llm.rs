use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::media::InlineImage;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// One prompt, optionally with an image attached.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub prompt: String,
    pub image: Option<InlineImage>,
}

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("failed to reach model API: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("model API returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("model blocked the prompt: {0}")]
    Blocked(String),
    #[error("could not decode model API response: {0}")]
    Decode(String),
    #[error("model returned no text")]
    EmptyResponse,
    #[error("model call timed out after {0:?}")]
    Timeout(Duration),
    #[error("model call was cancelled before it started")]
    Cancelled,
}

impl ModelError {
    /// Whether the same request may succeed if sent again.
    pub fn is_transient(&self) -> bool {
        match self {
            ModelError::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            ModelError::Status { status, .. } => *status == 429 || *status >= 500,
            ModelError::Timeout(_) => true,
            ModelError::Blocked(_)
            | ModelError::Decode(_)
            | ModelError::EmptyResponse
            | ModelError::Cancelled => false,
        }
    }
}

/// External generative model producing free-form analysis text.
#[async_trait]
pub trait AnalysisModel: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, request: &ModelRequest) -> Result<String, ModelError>;
}

#[derive(Clone)]
pub struct GeminiClient {
    api_key: String,
    base_url: String,
    model: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text { text: &'a str },
    Inline { inline_data: InlineData<'a> },
}

#[derive(Serialize)]
struct InlineData<'a> {
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    response_mime_type: &'static str, // ask for bare JSON
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

impl GeminiClient {
    pub fn new(api_key: String, model: String) -> Result<Self, ModelError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            model,
            client,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url,
            self.model.trim_start_matches("models/")
        )
    }
}

#[async_trait]
impl AnalysisModel for GeminiClient {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &ModelRequest) -> Result<String, ModelError> {
        let mut parts = vec![Part::Text { text: &request.prompt }];
        if let Some(image) = &request.image {
            parts.push(Part::Inline {
                inline_data: InlineData {
                    mime_type: &image.mime_type,
                    data: &image.data,
                },
            });
        }

        let body = GenerateRequest {
            contents: vec![Content { role: "user", parts }],
            generation_config: GenerationConfig {
                temperature: 0.2,
                response_mime_type: "application/json",
            },
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let text = response.text().await?;
        let parsed: GenerateResponse =
            serde_json::from_str(&text).map_err(|e| ModelError::Decode(e.to_string()))?;
        collect_text(parsed)
    }
}

/// Concatenated text parts of the first candidate.
fn collect_text(response: GenerateResponse) -> Result<String, ModelError> {
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(ModelError::Blocked(reason));
    }

    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        Err(ModelError::EmptyResponse)
    } else {
        Ok(text)
    }
}
