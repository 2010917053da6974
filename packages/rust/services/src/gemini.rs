//! Gemini `generateContent` backend, model listing and model probing.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use studykit_shared::GeminiConfig;

use crate::{Explainer, ServiceError, build_client};

/// Generation on the detailed tier can take well over a minute.
const GENERATE_TIMEOUT_SECS: u64 = 180;

const API_VERSION: &str = "v1beta";
const API_KEY_HEADER: &str = "x-goog-api-key";
const LIST_PAGE_SIZE: &str = "1000";

/// Prompt sent when probing whether a model answers at all.
const PROBE_PROMPT: &str = "Hello";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
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

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListModelsResponse {
    #[serde(default)]
    models: Vec<ModelEntry>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelEntry {
    name: String,
    display_name: Option<String>,
}

/// A model id usable in `[gemini]` config, with its human-readable name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInfo {
    pub name: String,
    pub display_name: String,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Gemini REST client authenticated with an API key.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(base_url: &str, api_key: impl Into<String>) -> Result<Self, ServiceError> {
        Ok(Self {
            client: build_client(Duration::from_secs(GENERATE_TIMEOUT_SECS))?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    pub fn from_config(config: &GeminiConfig, api_key: impl Into<String>) -> Result<Self, ServiceError> {
        Self::new(&config.base_url, api_key)
    }

    fn model_url(&self, model: &str, method: &str) -> String {
        let model = model.trim_start_matches('/');
        let prefix = if model.starts_with("models/") { "" } else { "models/" };
        format!("{}/{API_VERSION}/{prefix}{model}:{method}", self.base_url)
    }

    /// All models whose id mentions "gemini", across every result page.
    #[instrument(skip_all)]
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>, ServiceError> {
        let url = format!("{}/{API_VERSION}/models", self.base_url);
        let mut models = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .get(&url)
                .header(API_KEY_HEADER, &self.api_key)
                .query(&[("pageSize", LIST_PAGE_SIZE)]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let response = request.send().await?;
            let status = response.status();
            let body = response.text().await?;
            if !status.is_success() {
                return Err(ServiceError::from_response(status, &body));
            }

            let page: ListModelsResponse = serde_json::from_str(&body)
                .map_err(|e| ServiceError::InvalidResponse(format!("model list: {e}")))?;

            models.extend(
                page.models
                    .into_iter()
                    .filter(|m| m.name.to_lowercase().contains("gemini"))
                    .map(|m| ModelInfo {
                        display_name: m.display_name.unwrap_or_else(|| "No description".into()),
                        name: m.name,
                    }),
            );

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        info!(count = models.len(), "listed gemini models");
        Ok(models)
    }
}

impl Explainer for GeminiClient {
    #[instrument(skip_all, fields(model = %model, prompt_chars = prompt.chars().count()))]
    async fn explain(&self, model: &str, prompt: &str) -> Result<String, ServiceError> {
        let request = GenerateRequest {
            contents: [Content {
                parts: [Part { text: prompt }],
            }],
        };

        let response = self
            .client
            .post(self.model_url(model, "generateContent"))
            .header(API_KEY_HEADER, &self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ServiceError::from_response(status, &body));
        }

        let text = response_text(&body)?;
        debug!(chars = text.chars().count(), "explanation generated");
        Ok(text)
    }
}

/// Concatenated text parts of the first candidate, trimmed.
fn response_text(body: &str) -> Result<String, ServiceError> {
    let parsed: GenerateResponse = serde_json::from_str(body)
        .map_err(|e| ServiceError::InvalidResponse(format!("generateContent: {e}")))?;

    let content = parsed
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .ok_or_else(|| ServiceError::InvalidResponse("response has no candidates".into()))?;

    let text: String = content.parts.into_iter().filter_map(|p| p.text).collect();
    if text.trim().is_empty() {
        return Err(ServiceError::InvalidResponse("candidate has no text".into()));
    }
    Ok(text.trim().to_string())
}

// ---------------------------------------------------------------------------
// Probing
// ---------------------------------------------------------------------------

/// Outcome of sending the probe prompt to one candidate model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeStatus {
    Available,
    NotFound,
    RateLimited,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub model: String,
    pub status: ProbeStatus,
}

/// Try each candidate in order until one answers, pausing `delay` between attempts.
///
/// Returns one result per candidate tried; the last one is `Available` if any model worked.
pub async fn probe_models<E: Explainer>(
    explainer: &E,
    candidates: &[String],
    delay: Duration,
) -> Vec<ProbeResult> {
    let mut results = Vec::with_capacity(candidates.len());

    for (i, model) in candidates.iter().enumerate() {
        if i > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let status = match explainer.explain(model, PROBE_PROMPT).await {
            Ok(_) => ProbeStatus::Available,
            Err(ServiceError::Http { status: 404, .. }) => ProbeStatus::NotFound,
            Err(e) if e.is_rate_limited() => ProbeStatus::RateLimited,
            Err(e) => ProbeStatus::Failed(e.to_string()),
        };

        if status == ProbeStatus::Available {
            info!(%model, "model available");
        } else {
            warn!(%model, ?status, "model unavailable");
        }

        let done = status == ProbeStatus::Available;
        results.push(ProbeResult {
            model: model.clone(),
            status,
        });
        if done {
            break;
        }
    }

    results
}
