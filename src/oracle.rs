// The oracle: an external generative model behind a prompt-in, text-out seam.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Environment variable holding the Gemini API key.
pub const GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-lite";
pub const DEFAULT_TEMPERATURE: f32 = 2.0;
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("oracle credential is not configured (set {0})")]
    MissingCredential(&'static str),

    #[error("oracle request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("oracle returned HTTP {status}: {message}")]
    Status { status: u16, message: String },
}

/// Text completion: one prompt in, free text out. One call per request, no retry.
///
/// A reply without usable text (a blocked candidate, say) is `Ok` with an
/// empty string; callers treat it like any other unparseable reply.
#[async_trait]
pub trait Oracle: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, OracleError>;
}

/// Oracle backed by the Gemini `generateContent` REST endpoint.
#[derive(Clone)]
pub struct GeminiOracle {
    client: Client,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    base_url: String,
}

impl GeminiOracle {
    /// A missing key is not an error here: every call reports it instead, so the
    /// process still serves the endpoints that do not need the oracle.
    pub fn new(api_key: Option<String>, model: impl Into<String>, temperature: f32) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            model: model.into(),
            temperature,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn has_credential(&self) -> bool {
        self.api_key.is_some()
    }

    fn request_body(&self, prompt: &str) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content {
                role: "user".to_string(),
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
            },
        }
    }
}

#[async_trait]
impl Oracle for GeminiOracle {
    async fn complete(&self, prompt: &str) -> Result<String, OracleError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(OracleError::MissingCredential(GEMINI_API_KEY_ENV))?;

        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", api_key)
            .json(&self.request_body(prompt))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(OracleError::Status {
                status,
                message: error_message(&body),
            });
        }

        let parsed: GenerateContentResponse = response.json().await?;
        Ok(extract_text(parsed))
    }
}

// ── Wire types ────────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Deserialize)]
struct ErrorWrapper {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    status: Option<String>,
}

/// Concatenate the text parts of the first candidate. Empty when there is none.
fn extract_text(response: GenerateContentResponse) -> String {
    let Some(candidate) = response
        .candidates
        .and_then(|candidates| candidates.into_iter().next())
    else {
        tracing::warn!("Oracle reply carried no candidates");
        return String::new();
    };

    let text: String = candidate
        .content
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect()
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        tracing::warn!(
            finish_reason = candidate.finish_reason.as_deref().unwrap_or("unknown"),
            "Oracle reply carried no text"
        );
    }
    text
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorWrapper>(body)
        .map(|wrapper| {
            let msg = wrapper.error.message.unwrap_or_else(|| body.to_string());
            match wrapper.error.status {
                Some(status) if !status.is_empty() => format!("{status}: {msg}"),
                _ => msg,
            }
        })
        .unwrap_or_else(|_| body.to_string())
}
