//! Google Gemini classifier (`models/{model}:generateContent`)

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;

use super::{
    build_prompt, parse_verdict, with_retries, Classifier, Verdict, MAX_OUTPUT_TOKENS, TEMPERATURE,
};
use crate::config::ClassifierConfig;
use crate::error::{ClassifierError, Result};

const PROVIDER: &str = "Gemini";
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

pub struct GeminiClassifier {
    http: Client,
    endpoint: String,
    api_key: SecretString,
    max_retries: u32,
}

impl GeminiClassifier {
    pub fn new(config: &ClassifierConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ClassifierError::Network(format!("failed to build HTTP client: {}", e)))?;

        let base = config
            .base_url
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/');

        Ok(Self {
            http,
            endpoint: format!("{}/models/{}:generateContent", base, config.model),
            api_key: SecretString::from(config.api_key.expose_secret().to_string()),
            max_retries: config.max_retries,
        })
    }

    async fn send_once(
        &self,
        body: &serde_json::Value,
    ) -> std::result::Result<String, ClassifierError> {
        let response = self
            .http
            .post(&self.endpoint)
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(body)
            .send()
            .await
            .map_err(|e| ClassifierError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClassifierError::Status {
                provider: PROVIDER,
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ClassifierError::Decode(e.to_string()))?;

        let candidate = parsed
            .candidates
            .into_iter()
            .next()
            .ok_or(ClassifierError::EmptyResponse(PROVIDER))?;

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        Ok(text)
    }
}

#[async_trait]
impl Classifier for GeminiClassifier {
    async fn classify(&self, text: &str) -> Result<Verdict> {
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": build_prompt(text) }] }],
            "generationConfig": {
                "temperature": TEMPERATURE,
                "maxOutputTokens": MAX_OUTPUT_TOKENS,
            },
        });

        let content = with_retries(PROVIDER, self.max_retries, || self.send_once(&body)).await?;
        let verdict = parse_verdict(&content);
        tracing::debug!(
            provider = PROVIDER,
            relevant = verdict.relevant,
            raw = %verdict.raw,
            "classified"
        );
        Ok(verdict)
    }

    fn provider(&self) -> &str {
        "gemini"
    }
}
