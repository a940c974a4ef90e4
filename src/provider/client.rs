use std::time::Duration;

use reqwest::Client;
use tokio::runtime::Handle;

use super::error::ProviderError;
use super::types::{
    ChatCompletionRequest, ChatCompletionResponse, ChatMessage, Inference, InferenceRequest,
};
use super::ReasoningProvider;
use crate::config::AsgaConfig;

pub const API_BASE: &str = "https://openrouter.ai/api/v1";

/// Client for an OpenAI-compatible `chat/completions` endpoint.
///
/// Requests are async; the [`ReasoningProvider`] impl blocks on the runtime
/// captured at construction, so it must be called from a blocking worker.
pub struct OpenRouterClient {
    api_key: String,
    client: Client,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    seed: Option<u64>,
    handle: Handle,
}

impl OpenRouterClient {
    pub fn from_config(config: &AsgaConfig) -> Result<Self, ProviderError> {
        let mut client = Self::with_base_url(
            config.api_key.clone(),
            config.api_base.clone(),
            config.model.clone(),
        )?;
        client.max_tokens = config.max_tokens;
        client.temperature = config.temperature;
        client.seed = Some(config.seed);
        Ok(client)
    }

    /// Create a client pointing at a custom base URL (useful for testing).
    pub fn with_base_url(
        api_key: String,
        base_url: String,
        model: String,
    ) -> Result<Self, ProviderError> {
        let handle = Handle::try_current().map_err(|e| ProviderError::Runtime(e.to_string()))?;
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self {
            api_key,
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            max_tokens: 4096,
            temperature: 0.0,
            seed: None,
            handle,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn chat_request(&self, request: &InferenceRequest) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            seed: self.seed,
            messages: vec![
                ChatMessage::system(request.system.clone()),
                ChatMessage::user(request.prompt.clone()),
            ],
        }
    }

    pub async fn complete(
        &self,
        req: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, ProviderError> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json")
            .json(req)
            .send()
            .await?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|secs| secs.saturating_mul(1000))
                .unwrap_or(1000);
            return Err(ProviderError::RateLimited {
                retry_after_ms: retry_after,
            });
        }

        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(ProviderError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.json::<ChatCompletionResponse>().await?;
        Ok(body)
    }
}

impl ReasoningProvider for OpenRouterClient {
    fn infer(&self, request: &InferenceRequest) -> Result<Inference, ProviderError> {
        let chat = self.chat_request(request);
        let response = self.handle.block_on(self.complete(&chat))?;
        let text = response
            .first_text()
            .ok_or_else(|| ProviderError::Parse("response has no choices".into()))?
            .to_string();
        Ok(Inference {
            text,
            total_tokens: response.total_tokens(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn completion(content: &str, tokens: u32) -> serde_json::Value {
        json!({
            "id": "gen-1",
            "model": "test-model",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": content}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 1, "completion_tokens": tokens - 1, "total_tokens": tokens}
        })
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn infer_returns_text_and_usage() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("hello", 42)))
            .mount(&server)
            .await;

        let client =
            OpenRouterClient::with_base_url("sk-test".into(), server.uri(), "test-model".into())
                .unwrap();
        let request = InferenceRequest {
            system: "be terse".into(),
            prompt: "hi".into(),
        };
        let inference = tokio::task::spawn_blocking(move || client.infer(&request))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(inference.text, "hello");
        assert_eq!(inference.total_tokens, 42);
    }

    #[tokio::test]
    async fn rate_limit_maps_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "2"))
            .mount(&server)
            .await;

        let client =
            OpenRouterClient::with_base_url("k".into(), server.uri(), "m".into()).unwrap();
        let req = client.chat_request(&InferenceRequest {
            system: String::new(),
            prompt: "x".into(),
        });
        let err = client.complete(&req).await.unwrap_err();
        assert!(matches!(
            err,
            ProviderError::RateLimited {
                retry_after_ms: 2000
            }
        ));
    }

    #[tokio::test]
    async fn huge_retry_after_saturates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(429).insert_header("retry-after", u64::MAX.to_string()),
            )
            .mount(&server)
            .await;

        let client =
            OpenRouterClient::with_base_url("k".into(), server.uri(), "m".into()).unwrap();
        let req = client.chat_request(&InferenceRequest {
            system: String::new(),
            prompt: "x".into(),
        });
        let err = client.complete(&req).await.unwrap_err();
        assert!(matches!(
            err,
            ProviderError::RateLimited {
                retry_after_ms: u64::MAX
            }
        ));
    }

    #[tokio::test]
    async fn server_error_maps_to_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client =
            OpenRouterClient::with_base_url("k".into(), server.uri(), "m".into()).unwrap();
        let req = client.chat_request(&InferenceRequest {
            system: String::new(),
            prompt: "x".into(),
        });
        match client.complete(&req).await.unwrap_err() {
            ProviderError::ApiError { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn construction_requires_runtime() {
        let result = OpenRouterClient::with_base_url("k".into(), API_BASE.into(), "m".into());
        assert!(matches!(result, Err(ProviderError::Runtime(_))));
    }
}
