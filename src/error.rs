use std::fmt;

use thiserror::Error;
use uuid::Uuid;

use crate::provider::ProviderError;

#[derive(Debug, Error)]
pub enum AsgaError {
    #[error("Validation failed: {0}")]
    Validation(#[from] SchemaViolation),

    #[error("Feature request rejected: {0}")]
    SecurityRejection(String),

    #[error("Token budget exceeded: used {used}, limit {limit}")]
    BudgetExceeded { used: u32, limit: u32 },

    #[error("Stage `{stage}` failed: {message}")]
    Stage { stage: String, message: String },

    #[error("Stage `{stage}` invoked without `{field}`")]
    MissingInput { stage: String, field: &'static str },

    #[error("Reasoning provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Job already finished and consumed: {0}")]
    Gone(Uuid),

    #[error("Job is already being streamed: {0}")]
    AlreadySubscribed(Uuid),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl AsgaError {
    /// Shorthand for a stage-internal failure.
    pub fn stage(stage: impl fmt::Display, message: impl Into<String>) -> Self {
        Self::Stage {
            stage: stage.to_string(),
            message: message.into(),
        }
    }
}

pub type Result<T, E = AsgaError> = std::result::Result<T, E>;

/// An envelope that did not satisfy its schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaViolation {
    pub schema: String,
    pub errors: Vec<String>,
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "schema `{}`: {}", self.schema, self.errors.join(", "))
    }
}

impl std::error::Error for SchemaViolation {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_violation_display() {
        let violation = SchemaViolation {
            schema: "spec".into(),
            errors: vec!["/payload: \"method\" is a required property".into()],
        };
        assert_eq!(
            AsgaError::from(violation).to_string(),
            "Validation failed: schema `spec`: /payload: \"method\" is a required property"
        );
    }

    #[test]
    fn budget_display() {
        let err = AsgaError::BudgetExceeded {
            used: 5000,
            limit: 4096,
        };
        assert_eq!(err.to_string(), "Token budget exceeded: used 5000, limit 4096");
    }

    #[test]
    fn stage_shorthand() {
        let err = AsgaError::stage("tests", "generated code does not parse");
        assert_eq!(
            err.to_string(),
            "Stage `tests` failed: generated code does not parse"
        );
    }
}
