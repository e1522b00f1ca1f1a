//! Hackathon relevance classification via a language model
//!
//! A classifier sends one post's text to a chat-style model with a fixed
//! prompt and turns the reply into a [`Verdict`]. The provider is picked once
//! at startup by [`create_classifier`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;

use crate::config::{ClassifierConfig, ClassifierProvider};
use crate::error::{ClassifierError, Result};

pub mod gemini;
pub mod mock;
pub mod openai;

/// Sampling temperature for every classification request
pub const TEMPERATURE: f64 = 0.1;
/// Output token cap for every classification request
pub const MAX_OUTPUT_TOKENS: u32 = 500;

const PROMPT_TEMPLATE: &str = r#"You are screening social media posts for a developer community.

Decide whether the post below is about a hackathon: announcing, organizing, recruiting for, joining, judging, sponsoring or reporting on one. Posts that only mention coding, startups or generic tech events are not hackathon related.

Post:
"""
{text}
"""

Answer with a single JSON object and nothing else:
{"is_hackathon_related": true or false, "confidence": a number between 0 and 1, "reason": "one short sentence"}"#;

/// Outcome of classifying one post
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub relevant: bool,
    /// The cleaned model output the decision was taken from
    pub raw: String,
}

#[async_trait]
pub trait Classifier: Send + Sync {
    /// Classify the text of one post.
    async fn classify(&self, text: &str) -> Result<Verdict>;

    /// Provider name for logs
    fn provider(&self) -> &str;
}

/// Build the classifier selected by `config.provider`.
pub fn create_classifier(config: &ClassifierConfig) -> Result<Box<dyn Classifier>> {
    let classifier: Box<dyn Classifier> = match config.provider {
        ClassifierProvider::OpenAi => Box::new(openai::OpenAiClassifier::new(config)?),
        ClassifierProvider::Gemini => Box::new(gemini::GeminiClassifier::new(config)?),
    };
    tracing::debug!(provider = %config.provider, model = %config.model, "classifier ready");
    Ok(classifier)
}

pub fn build_prompt(text: &str) -> String {
    PROMPT_TEMPLATE.replace("{text}", text)
}

/// Trim the model output and cut it down to the outermost `{...}` span, if any.
pub fn extract_json(content: &str) -> &str {
    let trimmed = content.trim();
    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => trimmed,
    }
}

#[derive(Deserialize)]
struct ModelAnswer {
    is_hackathon_related: bool,
}

/// Interpret a model reply.
///
/// A parseable JSON answer decides by its `is_hackathon_related` field.
/// Anything else is relevant iff the cleaned text contains `true` in any case.
pub fn parse_verdict(content: &str) -> Verdict {
    let cleaned = extract_json(content);
    let relevant = match serde_json::from_str::<ModelAnswer>(cleaned) {
        Ok(answer) => answer.is_hackathon_related,
        Err(e) => {
            tracing::debug!(
                error = %e,
                "model answer is not valid JSON, falling back to keyword match"
            );
            cleaned.to_lowercase().contains("true")
        }
    };

    Verdict {
        relevant,
        raw: cleaned.to_string(),
    }
}

/// Run `request` up to `max_retries + 1` times.
///
/// Only retryable errors (transport failures, non-success status) trigger
/// another attempt; they are issued back to back. Once the attempts are
/// used up the last error is returned wrapped in `RetriesExhausted`.
pub(crate) async fn with_retries<F, Fut>(
    provider: &'static str,
    max_retries: u32,
    mut request: F,
) -> std::result::Result<String, ClassifierError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<String, ClassifierError>>,
{
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        match request().await {
            Ok(content) => return Ok(content),
            Err(e) if e.is_retryable() && attempt <= max_retries => {
                tracing::warn!(
                    provider,
                    attempt,
                    error = %e,
                    "classification attempt failed, retrying"
                );
            }
            Err(e) if e.is_retryable() => {
                return Err(ClassifierError::RetriesExhausted {
                    attempts: attempt,
                    last: Box::new(e),
                });
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_prompt_embeds_text() {
        let prompt = build_prompt("Join HackMIT this weekend!");
        assert!(prompt.contains("Join HackMIT this weekend!"));
        assert!(prompt.contains("is_hackathon_related"));
        assert!(!prompt.contains("{text}"));
    }

    #[test]
    fn test_extract_json_from_fenced_output() {
        let content = "```json\n{\"is_hackathon_related\": true, \"confidence\": 0.9}\n```";
        assert_eq!(
            extract_json(content),
            "{\"is_hackathon_related\": true, \"confidence\": 0.9}"
        );
    }

    #[test]
    fn test_extract_json_without_braces_returns_trimmed() {
        assert_eq!(extract_json("  no json here \n"), "no json here");
        assert_eq!(extract_json("} backwards {"), "} backwards {");
    }

    #[test]
    fn test_parse_embedded_json() {
        let verdict = parse_verdict(
            "Sure! {\"is_hackathon_related\": true, \"confidence\": 0.95, \"reason\": \"announces a hackathon\"} Hope that helps.",
        );
        assert!(verdict.relevant);
        assert_eq!(
            verdict.raw,
            "{\"is_hackathon_related\": true, \"confidence\": 0.95, \"reason\": \"announces a hackathon\"}"
        );
    }

    #[test]
    fn test_parse_json_false() {
        let answer = r#"{"is_hackathon_related": false, "reason": "true story about lunch"}"#;
        let verdict = parse_verdict(answer);
        assert!(!verdict.relevant);
    }

    #[test]
    fn test_parse_malformed_json_with_true() {
        let verdict = parse_verdict("{is_hackathon_related: True}");
        assert!(verdict.relevant);
        assert_eq!(verdict.raw, "{is_hackathon_related: True}");
    }

    #[test]
    fn test_parse_neither_json_nor_true() {
        assert!(!parse_verdict("I am not sure.").relevant);
        assert!(!parse_verdict("").relevant);
    }

    #[tokio::test]
    async fn test_with_retries_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = with_retries("test", 3, || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(ClassifierError::Network("reset".to_string()))
            } else {
                Ok("ok".to_string())
            }
        })
        .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retries_exhausts_attempts() {
        let calls = AtomicU32::new(0);
        let result = with_retries("test", 2, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<String, _>(ClassifierError::Status {
                provider: "test",
                status: 500,
                body: "boom".to_string(),
            })
        })
        .await;

        match result.unwrap_err() {
            ClassifierError::RetriesExhausted { attempts, last } => {
                assert_eq!(attempts, 3);
                assert!(last.to_string().contains("boom"));
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retries_does_not_retry_decode_errors() {
        let calls = AtomicU32::new(0);
        let result = with_retries("test", 5, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<String, _>(ClassifierError::Decode("bad".to_string()))
        })
        .await;

        assert!(matches!(result, Err(ClassifierError::Decode(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_with_retries_zero_retries_is_single_attempt() {
        let calls = AtomicU32::new(0);
        let result = with_retries("test", 0, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<String, _>(ClassifierError::Network("down".to_string()))
        })
        .await;

        assert!(matches!(
            result,
            Err(ClassifierError::RetriesExhausted { attempts: 1, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
