//! Data contracts exchanged between workflow stages.
//!
//! Every record implements [`Contract`], the single serialization capability
//! used for envelopes and event deltas.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// A record that can cross the process boundary under a stable name.
pub trait Contract: Serialize {
    /// Field name used in workflow state deltas and schema lookups.
    const NAME: &'static str;

    /// JSON form of the record.
    fn payload(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureRequest {
    pub user_story: String,
}

impl FeatureRequest {
    pub fn new(user_story: impl Into<String>) -> Self {
        Self {
            user_story: user_story.into(),
        }
    }
}

/// API specification derived from a feature request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spec {
    pub endpoint: String,
    pub method: String,
    /// JSON text.
    pub request_schema: String,
    /// JSON text.
    pub response_schema: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tests {
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patch {
    pub diff: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Critique {
    pub score: f64,
    pub feedback: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairPlan {
    pub steps: Vec<String>,
}

impl Contract for FeatureRequest {
    const NAME: &'static str = "feature_request";
}

impl Contract for Spec {
    const NAME: &'static str = "spec";
}

impl Contract for Tests {
    const NAME: &'static str = "tests";
}

impl Contract for Patch {
    const NAME: &'static str = "patch";
}

impl Contract for Critique {
    const NAME: &'static str = "critique";
}

impl Contract for RepairPlan {
    const NAME: &'static str = "repair_plan";
}

/// Hex SHA-256 of a text artifact.
pub fn content_digest(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

impl Tests {
    pub fn digest(&self) -> String {
        content_digest(&self.code)
    }
}

impl Patch {
    pub fn digest(&self) -> String {
        content_digest(&self.diff)
    }
}

impl Critique {
    pub fn passes(&self, threshold: f64) -> bool {
        self.score >= threshold
    }
}
