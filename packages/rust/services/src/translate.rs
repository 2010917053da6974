//! Google Translate (`translate_a/single`, `client=gtx`) backend.

use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use tracing::{debug, instrument};
use url::Url;

use studykit_shared::TranslateConfig;

use crate::{ServiceError, Translator, build_client};

const TRANSLATE_TIMEOUT_SECS: u64 = 30;

/// Keyless Google Translate client.
#[derive(Debug, Clone)]
pub struct GoogleTranslator {
    client: Client,
    endpoint: Url,
}

impl GoogleTranslator {
    pub fn new(endpoint: &str) -> Result<Self, ServiceError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| ServiceError::Network(format!("invalid endpoint {endpoint}: {e}")))?;
        Ok(Self {
            client: build_client(Duration::from_secs(TRANSLATE_TIMEOUT_SECS))?,
            endpoint,
        })
    }

    pub fn from_config(config: &TranslateConfig) -> Result<Self, ServiceError> {
        Self::new(&config.endpoint)
    }
}

impl Translator for GoogleTranslator {
    #[instrument(skip_all, fields(chars = text.chars().count(), lang = %target))]
    async fn translate(&self, text: &str, source: &str, target: &str) -> Result<String, ServiceError> {
        if text.trim().is_empty() {
            return Ok(String::new());
        }

        let response = self
            .client
            .get(self.endpoint.clone())
            .query(&[
                ("client", "gtx"),
                ("sl", source),
                ("tl", target),
                ("dt", "t"),
                ("q", text),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ServiceError::from_response(status, &body));
        }

        let translated = parse_segments(&body)?;
        debug!(out_chars = translated.chars().count(), "translated");
        Ok(translated)
    }
}

/// Concatenate the translated segments `[0][i][0]` of a gtx response.
fn parse_segments(body: &str) -> Result<String, ServiceError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| ServiceError::InvalidResponse(format!("not JSON: {e}")))?;

    let segments = value
        .get(0)
        .and_then(Value::as_array)
        .ok_or_else(|| ServiceError::InvalidResponse("missing segment list".into()))?;

    Ok(segments
        .iter()
        .filter_map(|seg| seg.get(0).and_then(Value::as_str))
        .collect())
}
