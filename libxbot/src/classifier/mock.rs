//! Mock classifier for testing
//!
//! Answers by substring rules instead of calling a model, and records every
//! text it was asked about.

use async_trait::async_trait;
use std::sync::Mutex;

use super::{parse_verdict, Classifier, Verdict};
use crate::error::{ClassifierError, Result};

/// What the mock answers for a matching text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockAnswer {
    Relevant,
    NotRelevant,
    Fail,
}

pub struct MockClassifier {
    rules: Vec<(String, MockAnswer)>,
    default: MockAnswer,
    seen: Mutex<Vec<String>>,
}

impl MockClassifier {
    /// Answer `default` for every text without a matching rule
    pub fn new(default: MockAnswer) -> Self {
        Self {
            rules: Vec::new(),
            default,
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Answer `answer` for texts containing `needle`. First matching rule wins.
    pub fn with_rule(mut self, needle: &str, answer: MockAnswer) -> Self {
        self.rules.push((needle.to_string(), answer));
        self
    }

    pub fn call_count(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Classifier for MockClassifier {
    async fn classify(&self, text: &str) -> Result<Verdict> {
        self.seen.lock().unwrap().push(text.to_string());

        let answer = self
            .rules
            .iter()
            .find(|(needle, _)| text.contains(needle.as_str()))
            .map(|(_, answer)| *answer)
            .unwrap_or(self.default);

        match answer {
            MockAnswer::Relevant => Ok(parse_verdict(
                r#"{"is_hackathon_related": true, "confidence": 1.0, "reason": "mock"}"#,
            )),
            MockAnswer::NotRelevant => Ok(parse_verdict(
                r#"{"is_hackathon_related": false, "confidence": 1.0, "reason": "mock"}"#,
            )),
            MockAnswer::Fail => Err(ClassifierError::RetriesExhausted {
                attempts: 1,
                last: Box::new(ClassifierError::Network("mock classifier failure".to_string())),
            }
            .into()),
        }
    }

    fn provider(&self) -> &str {
        "mock"
    }
}
