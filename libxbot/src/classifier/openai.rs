//! OpenAI-compatible chat completions classifier
//!
//! Works with any endpoint that speaks the `/chat/completions` protocol.

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

const PROVIDER: &str = "OpenAI";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAiClassifier {
    http: Client,
    endpoint: String,
    api_key: SecretString,
    model: String,
    max_retries: u32,
}

impl OpenAiClassifier {
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
            endpoint: format!("{}/chat/completions", base),
            api_key: SecretString::from(config.api_key.expose_secret().to_string()),
            model: config.model.clone(),
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
            .bearer_auth(self.api_key.expose_secret())
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

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ClassifierError::Decode(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.unwrap_or_default())
            .ok_or(ClassifierError::EmptyResponse(PROVIDER))
    }
}

#[async_trait]
impl Classifier for OpenAiClassifier {
    async fn classify(&self, text: &str) -> Result<Verdict> {
        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": build_prompt(text) }],
            "temperature": TEMPERATURE,
            "max_tokens": MAX_OUTPUT_TOKENS,
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
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClassifierProvider;
    use crate::error::XbotError;
    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Clone)]
    struct FakeLlm {
        calls: Arc<AtomicUsize>,
        /// Number of leading calls answered with 500
        failures: usize,
        /// Raw body returned on success
        reply: String,
        last_request: Arc<Mutex<Option<(HeaderMap, Value)>>>,
    }

    impl FakeLlm {
        fn answering(content: &str, failures: usize) -> Self {
            Self {
                calls: Arc::new(AtomicUsize::new(0)),
                failures,
                reply: json!({"choices": [{"message": {"role": "assistant", "content": content}}]})
                    .to_string(),
                last_request: Arc::new(Mutex::new(None)),
            }
        }

        fn raw(body: &str) -> Self {
            Self {
                reply: body.to_string(),
                ..Self::answering("", 0)
            }
        }
    }

    async fn completions(
        State(llm): State<FakeLlm>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> (StatusCode, String) {
        let n = llm.calls.fetch_add(1, Ordering::SeqCst);
        *llm.last_request.lock().unwrap() = Some((headers, body));
        if n < llm.failures {
            return (StatusCode::INTERNAL_SERVER_ERROR, "upstream overloaded".to_string());
        }
        (StatusCode::OK, llm.reply.clone())
    }

    async fn start(llm: FakeLlm) -> String {
        let app = Router::new()
            .route("/v1/chat/completions", post(completions))
            .with_state(llm);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/v1", addr)
    }

    fn config(base_url: String, max_retries: u32) -> ClassifierConfig {
        ClassifierConfig {
            provider: ClassifierProvider::OpenAi,
            api_key: SecretString::from("sk-test".to_string()),
            model: "gpt-4o-mini".to_string(),
            base_url: Some(base_url),
            timeout: Duration::from_secs(5),
            max_retries,
        }
    }

    #[tokio::test]
    async fn test_classify_sends_expected_request() {
        let llm = FakeLlm::answering("{\"is_hackathon_related\": true, \"confidence\": 0.9}", 0);
        let classifier = OpenAiClassifier::new(&config(start(llm.clone()).await, 3)).unwrap();

        let verdict = classifier.classify("Join our hackathon!").await.unwrap();
        assert!(verdict.relevant);
        assert_eq!(verdict.raw, "{\"is_hackathon_related\": true, \"confidence\": 0.9}");

        let (headers, body) = llm.last_request.lock().unwrap().clone().unwrap();
        assert_eq!(headers.get("authorization").unwrap(), "Bearer sk-test");
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["temperature"], 0.1);
        assert_eq!(body["max_tokens"], 500);
        assert_eq!(body["messages"][0]["role"], "user");
        assert!(body["messages"][0]["content"]
            .as_str()
            .unwrap()
            .contains("Join our hackathon!"));
    }

    #[tokio::test]
    async fn test_classify_retries_then_succeeds() {
        let llm = FakeLlm::answering("{\"is_hackathon_related\": false}", 2);
        let classifier = OpenAiClassifier::new(&config(start(llm.clone()).await, 3)).unwrap();

        let verdict = classifier.classify("lunch").await.unwrap();
        assert!(!verdict.relevant);
        assert_eq!(llm.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_classify_gives_up_after_max_retries_plus_one() {
        let llm = FakeLlm::answering("unused", usize::MAX);
        let classifier = OpenAiClassifier::new(&config(start(llm.clone()).await, 2)).unwrap();

        let err = classifier.classify("anything").await.unwrap_err();
        match err {
            XbotError::Classifier(ClassifierError::RetriesExhausted { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last, ClassifierError::Status { status: 500, .. }));
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(llm.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_empty_choices_is_not_retried() {
        let llm = FakeLlm::raw("{\"choices\": []}");
        let classifier = OpenAiClassifier::new(&config(start(llm.clone()).await, 3)).unwrap();

        let err = classifier.classify("anything").await.unwrap_err();
        assert!(matches!(
            err,
            XbotError::Classifier(ClassifierError::EmptyResponse(_))
        ));
        assert_eq!(llm.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_undecodable_body_is_not_retried() {
        let llm = FakeLlm::raw("<html>gateway</html>");
        let classifier = OpenAiClassifier::new(&config(start(llm.clone()).await, 3)).unwrap();

        let err = classifier.classify("anything").await.unwrap_err();
        assert!(matches!(err, XbotError::Classifier(ClassifierError::Decode(_))));
        assert_eq!(llm.calls.load(Ordering::SeqCst), 1);
    }
}
