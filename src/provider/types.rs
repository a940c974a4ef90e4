//! Tipos de dados para o endpoint `chat/completions` (formato OpenAI/OpenRouter)
//! e para a interface neutra [`InferenceRequest`] / [`Inference`] usada pelos estágios.

use serde::{Deserialize, Serialize};

/// Entrada neutra do provedor: instrução de sistema mais prompt do usuário.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferenceRequest {
    pub system: String,
    pub prompt: String,
}

/// Saída neutra do provedor: texto gerado e tokens consumidos.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inference {
    pub text: String,
    pub total_tokens: u32,
}

/// Corpo da requisição para `POST {api_base}/chat/completions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    /// Identificador do modelo (ex.: "mistralai/mistral-large").
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Semente para respostas reprodutíveis, quando o modelo suporta.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    pub messages: Vec<ChatMessage>,
}

/// Uma única mensagem da conversa.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// "system", "user" ou "assistant".
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub model: String,
    pub choices: Vec<Choice>,
    /// Alguns provedores omitem o uso de tokens.
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub index: u32,
    pub message: ChatMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

impl ChatCompletionResponse {
    /// Texto da primeira escolha, sem espaços nas bordas.
    pub fn first_text(&self) -> Option<&str> {
        self.choices.first().map(|c| c.message.content.trim())
    }

    pub fn total_tokens(&self) -> u32 {
        self.usage.as_ref().map(|u| u.total_tokens).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_skips_missing_seed() {
        let req = ChatCompletionRequest {
            model: "test".into(),
            max_tokens: 64,
            temperature: 0.0,
            seed: None,
            messages: vec![ChatMessage::user("Hello")],
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(!json.contains("seed"));
        assert!(json.contains(r#""role":"user""#));
    }

    #[test]
    fn response_deserialize_from_api_format() {
        let api_json = r#"{
            "id": "gen-123",
            "model": "mistralai/mistral-large",
            "choices": [
                {"index": 0, "message": {"role": "assistant", "content": "  {\"a\": 1}\n"}, "finish_reason": "stop"}
            ],
            "usage": {"prompt_tokens": 5, "completion_tokens": 15, "total_tokens": 20}
        }"#;
        let resp: ChatCompletionResponse = serde_json::from_str(api_json).unwrap();
        assert_eq!(resp.first_text(), Some(r#"{"a": 1}"#));
        assert_eq!(resp.total_tokens(), 20);
    }

    #[test]
    fn response_without_usage() {
        let json = r#"{"id": "gen-456", "model": "m", "choices": []}"#;
        let resp: ChatCompletionResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.first_text(), None);
        assert_eq!(resp.total_tokens(), 0);
    }
}
