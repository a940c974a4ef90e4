//! Tipos de erro para o provedor de raciocínio (API compatível com OpenAI).
//!
//! Define [`ProviderError`] com variantes para rate limiting, erros da API,
//! erros de rede e respostas ilegíveis.

use thiserror::Error;

/// Erros que podem ocorrer ao consultar o provedor de raciocínio.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// O servidor retornou HTTP 429 (rate limit).
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Erro retornado pela API (ex.: 401 chave inválida, 500 erro interno).
    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    /// Falha de rede subjacente (DNS, conexão recusada, timeout).
    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// A resposta não continha o conteúdo esperado.
    #[error("failed to parse provider response: {0}")]
    Parse(String),

    /// Chamada síncrona feita sem runtime tokio disponível.
    #[error("runtime unavailable: {0}")]
    Runtime(String),
}

impl ProviderError {
    /// Falhas que valem uma nova tentativa dentro do próprio estágio.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::RateLimited { .. } | ProviderError::NetworkError(_) => true,
            ProviderError::ApiError { status, .. } => *status >= 500,
            ProviderError::Parse(_) | ProviderError::Runtime(_) => false,
        }
    }
}
