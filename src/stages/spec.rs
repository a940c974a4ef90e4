//! Spec extraction: feature request → API [`Spec`].
//!
//! With a reasoning provider the spec comes from the model (JSON answer,
//! re-prompted when unparseable, transient failures retried with backoff).
//! Without one, [`KeywordSpecGuess`] derives it from the wording.
//! Either way the result passes the `spec` envelope before it is returned.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::{Metered, SpecExtraction};
use crate::contracts::{FeatureRequest, Spec};
use crate::error::{AsgaError, Result};
use crate::provider::{InferenceRequest, ReasoningProvider, RetryConfig};
use crate::validation::EnvelopeValidator;
use crate::workflow::Stage;

const SYSTEM_PROMPT: &str = "You extract API specifications from user stories. \
     Respond ONLY with valid JSON, no prose and no extra keys.\n\
     Format: {\"endpoint\": \"/<path>\", \"method\": \"<GET|POST|PUT|PATCH|DELETE>\", \
     \"request_schema\": {<JSON schema>}, \"response_schema\": {<JSON schema>}}";

const REINFORCE: &str = "\n\nYour previous answer was not valid JSON in the required format. \
     Answer with the JSON object only.";

/// Spec extraction backed by an optional reasoning provider.
pub struct SpecExtractor {
    provider: Option<Arc<dyn ReasoningProvider>>,
    retry: RetryConfig,
    validator: EnvelopeValidator,
}

impl SpecExtractor {
    pub fn new(
        provider: Option<Arc<dyn ReasoningProvider>>,
        retry: RetryConfig,
        validator: EnvelopeValidator,
    ) -> Self {
        Self {
            provider,
            retry,
            validator,
        }
    }

    fn extract_with_provider(
        &self,
        provider: &dyn ReasoningProvider,
        user_story: &str,
    ) -> Result<Metered<Spec>> {
        let max_calls = self.retry.max_calls.max(1);
        let mut tokens = 0u32;
        let mut last_error = AsgaError::stage(Stage::Spec, "provider was never called");

        for attempt in 1..=max_calls {
            let mut prompt = format!("User story: {user_story}");
            if attempt > 1 {
                prompt.push_str(REINFORCE);
            }
            let request = InferenceRequest {
                system: SYSTEM_PROMPT.to_string(),
                prompt,
            };

            match provider.infer(&request) {
                Ok(inference) => {
                    tokens = tokens.saturating_add(inference.total_tokens);
                    match parse_spec(&inference.text) {
                        Ok(spec) => return Ok(Metered { value: spec, tokens }),
                        Err(reason) => {
                            warn!(
                                attempt,
                                max_calls,
                                %reason,
                                "unusable spec answer, re-prompting"
                            );
                            last_error = AsgaError::stage(Stage::Spec, reason);
                        }
                    }
                }
                Err(err) if err.is_transient() && attempt < max_calls => {
                    let delay_ms = self.retry.delay_after(attempt, &err);
                    warn!(attempt, max_calls, %err, delay_ms, "provider call failed, retrying");
                    std::thread::sleep(Duration::from_millis(delay_ms));
                    last_error = err.into();
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(last_error)
    }
}

impl SpecExtraction for SpecExtractor {
    fn extract(&self, request: &FeatureRequest) -> Result<Metered<Spec>> {
        let metered = match &self.provider {
            Some(provider) => self.extract_with_provider(provider.as_ref(), &request.user_story)?,
            None => Metered::free(KeywordSpecGuess::guess(&request.user_story)),
        };
        self.validator.validate_contract(&metered.value)?;
        debug!(
            endpoint = %metered.value.endpoint,
            method = %metered.value.method,
            tokens = metered.tokens,
            "spec extracted"
        );
        Ok(metered)
    }
}

/// Raw model answer; schemas may come back as objects or JSON text.
#[derive(Debug, Deserialize)]
struct SpecAnswer {
    endpoint: String,
    method: String,
    #[serde(default)]
    request_schema: Value,
    #[serde(default)]
    response_schema: Value,
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    match trimmed.strip_prefix("```") {
        Some(rest) => {
            let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or(rest);
            body.trim_end().trim_end_matches("```").trim()
        }
        None => trimmed,
    }
}

fn schema_text(value: Value) -> String {
    match value {
        Value::Null => "{}".to_string(),
        Value::String(text) if serde_json::from_str::<Value>(&text).is_ok() => text,
        Value::String(text) => Value::String(text).to_string(),
        other => other.to_string(),
    }
}

fn normalize_endpoint(endpoint: &str) -> String {
    let trimmed = endpoint.trim();
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

fn parse_spec(text: &str) -> std::result::Result<Spec, String> {
    let answer: SpecAnswer = serde_json::from_str(strip_code_fence(text))
        .map_err(|e| format!("failed to parse spec JSON: {e}"))?;
    if answer.endpoint.trim().is_empty() || answer.method.trim().is_empty() {
        return Err("spec answer has an empty endpoint or method".to_string());
    }
    Ok(Spec {
        endpoint: normalize_endpoint(&answer.endpoint),
        method: answer.method.trim().to_uppercase(),
        request_schema: schema_text(answer.request_schema),
        response_schema: schema_text(answer.response_schema),
    })
}

/// Derives a spec from the verbs and nouns of a user story.
pub struct KeywordSpecGuess;

impl KeywordSpecGuess {
    /// Weighted keyword-based method selection plus a pluralized resource path.
    pub fn guess(user_story: &str) -> Spec {
        let lower = user_story.to_lowercase();
        let words: Vec<&str> = lower
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        let method_keywords: &[(&str, &str, u32)] = &[
            ("upload", "POST", 10),
            ("create", "POST", 10),
            ("submit", "POST", 8),
            ("register", "POST", 8),
            ("add", "POST", 5),
            ("send", "POST", 5),
            ("update", "PUT", 10),
            ("replace", "PUT", 8),
            ("edit", "PATCH", 8),
            ("rename", "PATCH", 8),
            ("delete", "DELETE", 10),
            ("remove", "DELETE", 8),
            ("list", "GET", 10),
            ("download", "GET", 8),
            ("fetch", "GET", 8),
            ("show", "GET", 5),
            ("view", "GET", 5),
            ("search", "GET", 5),
            ("get", "GET", 5),
        ];

        let mut scores: HashMap<&str, u32> = HashMap::new();
        for &(keyword, method, weight) in method_keywords {
            if words.contains(&keyword) {
                *scores.entry(method).or_insert(0) += weight;
            }
        }
        // Ties resolve alphabetically so the guess is stable.
        let method = scores
            .into_iter()
            .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(method, _)| method)
            .unwrap_or("GET");

        let resource = words
            .iter()
            .rev()
            .copied()
            .find(|w| {
                !STOPWORDS.contains(w)
                    && !method_keywords.iter().any(|(k, _, _)| k == w)
                    && w.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
            })
            .map(|w| pluralize(w))
            .unwrap_or_else(|| "demo".to_string());

        let has_body = matches!(method, "POST" | "PUT" | "PATCH");
        let request_schema = if has_body {
            json!({"type": "object"})
        } else {
            json!({})
        };
        let response_schema = if method == "GET" && words.contains(&"list") {
            json!({"type": "array"})
        } else {
            json!({"type": "object"})
        };

        Spec {
            endpoint: format!("/{resource}"),
            method: method.to_string(),
            request_schema: request_schema.to_string(),
            response_schema: response_schema.to_string(),
        }
    }
}

const STOPWORDS: &[&str] = &[
    "a", "an", "the", "my", "our", "your", "their", "all", "every", "new", "to", "of", "for",
    "from", "with", "and", "or", "in", "on", "by", "me", "i", "we", "as", "it", "can", "want",
    "should", "be", "able", "user", "so", "that",
];

fn pluralize(word: &str) -> String {
    if word.ends_with('s') {
        word.to_string()
    } else if let Some(stem) = word.strip_suffix('y')
        && !stem.ends_with(['a', 'e', 'i', 'o', 'u'])
    {
        format!("{stem}ies")
    } else {
        format!("{word}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{Inference, ProviderError};
    use std::sync::Mutex;

    /// Replays scripted answers in order.
    struct ScriptedProvider {
        answers: Mutex<Vec<Result<Inference, ProviderError>>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedProvider {
        fn new(mut answers: Vec<Result<Inference, ProviderError>>) -> Self {
            answers.reverse();
            Self {
                answers: Mutex::new(answers),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl ReasoningProvider for ScriptedProvider {
        fn infer(&self, request: &InferenceRequest) -> Result<Inference, ProviderError> {
            self.calls.lock().unwrap().push(request.prompt.clone());
            self.answers
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(ProviderError::Parse("script exhausted".into())))
        }
    }

    fn answer(text: &str, tokens: u32) -> Result<Inference, ProviderError> {
        Ok(Inference {
            text: text.to_string(),
            total_tokens: tokens,
        })
    }

    fn extractor(provider: Option<Arc<dyn ReasoningProvider>>) -> SpecExtractor {
        SpecExtractor::new(
            provider,
            RetryConfig {
                max_calls: 3,
                base_delay_ms: 0,
            },
            EnvelopeValidator::builtin().unwrap(),
        )
    }

    #[test]
    fn keyword_guess_upload_a_file() {
        let spec = KeywordSpecGuess::guess("upload a file");
        assert_eq!(spec.endpoint, "/files");
        assert_eq!(spec.method, "POST");
    }

    #[test]
    fn keyword_guess_list_files() {
        let spec = KeywordSpecGuess::guess("list files");
        assert_eq!(spec.endpoint, "/files");
        assert_eq!(spec.method, "GET");
        assert_eq!(spec.response_schema, r#"{"type":"array"}"#);
    }

    #[test]
    fn keyword_guess_defaults() {
        let spec = KeywordSpecGuess::guess("hi");
        assert_eq!(spec.method, "GET");
        assert_eq!(spec.request_schema, "{}");

        let spec = KeywordSpecGuess::guess("");
        assert_eq!(spec.endpoint, "/demo");
    }

    #[test]
    fn keyword_guess_delete_category() {
        let spec = KeywordSpecGuess::guess("As a user I want to delete a category");
        assert_eq!(spec.method, "DELETE");
        assert_eq!(spec.endpoint, "/categories");
    }

    #[test]
    fn offline_extraction_is_validated_and_free() {
        let metered = extractor(None)
            .extract(&FeatureRequest::new("upload a file"))
            .unwrap();
        assert_eq!(metered.tokens, 0);
        assert_eq!(metered.value.endpoint, "/files");
    }

    #[test]
    fn provider_answer_is_parsed() {
        let provider = Arc::new(ScriptedProvider::new(vec![answer(
            r#"{"endpoint": "files", "method": "post", "request_schema": {}, "response_schema": {"type": "object"}}"#,
            42,
        )]));
        let metered = extractor(Some(provider))
            .extract(&FeatureRequest::new("upload"))
            .unwrap();
        assert_eq!(metered.value.endpoint, "/files");
        assert_eq!(metered.value.method, "POST");
        assert_eq!(metered.value.request_schema, "{}");
        assert_eq!(metered.value.response_schema, r#"{"type":"object"}"#);
        assert_eq!(metered.tokens, 42);
    }

    #[test]
    fn fenced_answer_is_accepted() {
        let text = "```json\n{\"endpoint\": \"/demo\", \"method\": \"GET\"}\n```";
        let spec = parse_spec(text).unwrap();
        assert_eq!(spec.endpoint, "/demo");
        assert_eq!(spec.request_schema, "{}");
    }

    #[test]
    fn unparseable_answer_is_re_prompted() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            answer("not json", 5),
            answer(r#"{"endpoint": "/demo", "method": "GET"}"#, 7),
        ]));
        let metered = extractor(Some(provider.clone()))
            .extract(&FeatureRequest::new("demo"))
            .unwrap();
        assert_eq!(metered.tokens, 12);
        let calls = provider.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert!(calls[1].contains("previous answer was not valid JSON"));
    }

    #[test]
    fn transient_failures_are_retried_then_surface() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Err(ProviderError::RateLimited { retry_after_ms: 0 }),
            Err(ProviderError::ApiError {
                status: 503,
                message: "busy".into(),
            }),
            Err(ProviderError::ApiError {
                status: 503,
                message: "still busy".into(),
            }),
        ]));
        let err = extractor(Some(provider.clone()))
            .extract(&FeatureRequest::new("demo"))
            .unwrap_err();
        assert!(matches!(
            err,
            AsgaError::Provider(ProviderError::ApiError { status: 503, .. })
        ));
        assert_eq!(provider.calls.lock().unwrap().len(), 3);
    }

    #[test]
    fn permanent_failure_is_not_retried() {
        let provider = Arc::new(ScriptedProvider::new(vec![Err(ProviderError::ApiError {
            status: 401,
            message: "bad key".into(),
        })]));
        let err = extractor(Some(provider.clone()))
            .extract(&FeatureRequest::new("demo"))
            .unwrap_err();
        assert!(matches!(err, AsgaError::Provider(_)));
        assert_eq!(provider.calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn invalid_method_fails_validation() {
        let provider = Arc::new(ScriptedProvider::new(vec![answer(
            r#"{"endpoint": "/demo", "method": "FETCH"}"#,
            3,
        )]));
        let err = extractor(Some(provider))
            .extract(&FeatureRequest::new("demo"))
            .unwrap_err();
        assert!(matches!(err, AsgaError::Validation(_)));
    }

    #[test]
    fn pluralize_words() {
        assert_eq!(pluralize("file"), "files");
        assert_eq!(pluralize("files"), "files");
        assert_eq!(pluralize("category"), "categories");
        assert_eq!(pluralize("key"), "keys");
    }
}
