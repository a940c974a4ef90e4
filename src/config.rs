//! Configuração do ASGA carregada a partir de `asga.toml`.
//!
//! A struct [`AsgaConfig`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! As variáveis `OPENROUTER_*` têm precedência sobre o arquivo.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::provider::RetryConfig;
use crate::workflow::RepairPolicy;

pub const DEFAULT_CONFIG_FILE: &str = "asga.toml";

/// Configuração de nível superior carregada de `asga.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct AsgaConfig {
    /// Chave da API OpenRouter. Vazia = extrator de spec por palavras-chave.
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_api_base")]
    pub api_base: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Limite de tokens por resposta; também é o teto de orçamento do job.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Semente usada pelo provedor e pela síntese de testes.
    #[serde(default = "default_seed")]
    pub seed: u64,

    #[serde(default)]
    pub temperature: f32,

    /// Chamadas ao provedor permitidas por estágio antes de falhar.
    #[serde(default = "default_provider_retries")]
    pub provider_retries: u32,

    /// Atraso base em milissegundos para backoff exponencial.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Tentativas de reparo antes de encerrar como "exhausted".
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Nota mínima da crítica para aceitar o patch.
    #[serde(default = "default_score_threshold")]
    pub score_threshold: f64,

    #[serde(default = "default_schema_dir")]
    pub schema_dir: PathBuf,

    #[serde(default = "default_prompt_dir")]
    pub prompt_dir: PathBuf,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Tempo que um job terminado e nunca consumido fica registrado.
    #[serde(default = "default_job_retention_secs")]
    pub job_retention_secs: u64,

    /// Logs em JSON em vez de texto.
    #[serde(default)]
    pub log_json: bool,
}

fn default_api_base() -> String {
    crate::provider::client::API_BASE.to_string()
}

fn default_model() -> String {
    "mistralai/mistral-large".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_seed() -> u64 {
    42
}

fn default_provider_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_attempts() -> u32 {
    crate::workflow::MAX_ATTEMPTS
}

fn default_score_threshold() -> f64 {
    crate::workflow::SCORE_THRESHOLD
}

fn default_schema_dir() -> PathBuf {
    PathBuf::from("schemas/mcp")
}

fn default_prompt_dir() -> PathBuf {
    PathBuf::from("docs")
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_job_retention_secs() -> u64 {
    3600
}

impl Default for AsgaConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: default_api_base(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            seed: default_seed(),
            temperature: 0.0,
            provider_retries: default_provider_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_attempts: default_max_attempts(),
            score_threshold: default_score_threshold(),
            schema_dir: default_schema_dir(),
            prompt_dir: default_prompt_dir(),
            host: default_host(),
            port: default_port(),
            job_retention_secs: default_job_retention_secs(),
            log_json: false,
        }
    }
}

impl AsgaConfig {
    /// Carrega um arquivo explícito (que precisa existir) ou `asga.toml` do
    /// diretório atual, com defaults se não existir.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::read(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::read(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    fn read(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str::<AsgaConfig>(&contents)
            .with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Variáveis de ambiente têm precedência sobre o arquivo de configuração.
    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(key) = var("OPENROUTER_API_KEY")
            && !key.is_empty()
        {
            self.api_key = key;
        }
        if let Some(model) = var("OPENROUTER_MODEL")
            && !model.is_empty()
        {
            self.model = model;
        }
        if let Some(max_tokens) = var("OPENROUTER_MAX_TOKENS") {
            self.max_tokens = max_tokens
                .parse()
                .context("OPENROUTER_MAX_TOKENS must be an integer")?;
        }
        if let Some(seed) = var("OPENROUTER_SEED") {
            self.seed = seed.parse().context("OPENROUTER_SEED must be an integer")?;
        }
        Ok(())
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.is_empty()
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_calls: self.provider_retries.max(1),
            base_delay_ms: self.base_delay_ms,
        }
    }

    pub fn repair_policy(&self) -> RepairPolicy {
        RepairPolicy {
            max_attempts: self.max_attempts,
            score_threshold: self.score_threshold,
            token_budget: self.max_tokens,
        }
    }
}
