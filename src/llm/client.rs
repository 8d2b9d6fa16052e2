//! Gemini API client shared by the AI parser and the summarizer.
//!
//! Thin wrapper over `generateContent` with a bounded retry policy:
//! three attempts, exponential backoff (1s, 2s, 4s) on connection errors,
//! 429 and 5xx responses. Anything past the third attempt surfaces as an
//! error and becomes the job's terminal error message; the queue's
//! delivery-attempt ceiling is the only retry layer above this one.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Attempts per call, including the first.
const MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("GEMINI_API_KEY not configured")]
    NotConfigured,
    #[error("model connection error: {0}")]
    Connection(String),
    #[error("model API error: {0}")]
    Api(String),
    #[error("unexpected model response: {0}")]
    Parse(String),
}

/// One part of a request: either prompt text or inline document bytes.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum GeminiPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: GeminiInlineData,
    },
}

impl GeminiPart {
    pub fn text(text: impl Into<String>) -> Self {
        GeminiPart::Text { text: text.into() }
    }

    pub fn inline(mime_type: &str, base64_data: String) -> Self {
        GeminiPart::InlineData {
            inline_data: GeminiInlineData {
                mime_type: mime_type.to_string(),
                data: base64_data,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GeminiInlineData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
    error: Option<GeminiApiError>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiResponseContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseContent {
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiApiError {
    message: String,
}

/// Gemini `generateContent` client.
#[derive(Clone)]
pub struct GeminiClient {
    http: Client,
    api_key: Option<String>,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: Option<String>, model: &str, timeout: Duration) -> Self {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build HTTP client");
        Self {
            http,
            api_key,
            model: model.to_string(),
        }
    }

    /// Whether a credential is configured. No network call.
    pub fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Call `generateContent` and return the first candidate's text.
    pub async fn generate(&self, parts: Vec<GeminiPart>) -> Result<String, LlmError> {
        let api_key = self.api_key.as_ref().ok_or(LlmError::NotConfigured)?;
        let url = format!(
            "{GEMINI_BASE_URL}/models/{}:generateContent",
            self.model
        );
        let request = GeminiRequest {
            contents: vec![GeminiContent { parts }],
        };

        let mut last_error = LlmError::Api("no attempt made".to_string());
        for attempt in 1..=MAX_ATTEMPTS {
            match self.call_once(&url, api_key, &request).await {
                Ok(text) => return Ok(text),
                Err(e) if retryable(&e) && attempt < MAX_ATTEMPTS => {
                    let delay = Duration::from_secs(1 << (attempt - 1)).min(Duration::from_secs(10));
                    warn!(attempt, error = %e, "model call failed, retrying in {:?}", delay);
                    tokio::time::sleep(delay).await;
                    last_error = e;
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_error)
    }

    async fn call_once(
        &self,
        url: &str,
        api_key: &str,
        request: &GeminiRequest,
    ) -> Result<String, LlmError> {
        debug!(model = %self.model, "calling generateContent");
        let resp = self
            .http
            .post(url)
            .header("x-goog-api-key", api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| LlmError::Connection(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("HTTP {status}: {body}")));
        }

        let parsed: GeminiResponse = resp
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        if let Some(error) = parsed.error {
            return Err(LlmError::Api(error.message));
        }

        parsed
            .candidates
            .and_then(|mut candidates| candidates.drain(..).next())
            .and_then(|candidate| candidate.content)
            .and_then(|content| {
                content
                    .parts
                    .into_iter()
                    .find_map(|part| part.text)
            })
            .ok_or_else(|| LlmError::Parse("response carried no text candidate".to_string()))
    }
}

fn retryable(error: &LlmError) -> bool {
    match error {
        LlmError::Connection(_) => true,
        LlmError::Api(message) => {
            message.starts_with(&format!("HTTP {}", StatusCode::TOO_MANY_REQUESTS))
                || message.starts_with("HTTP 5")
        }
        _ => false,
    }
}
