mod engine;
mod record;
mod state;

use serde::{Deserialize, Serialize};

pub use engine::{RunResult, WorkflowEngine, WorkflowEngineBuilder, screen_feature_request};
pub use record::RunRecord;
pub use state::{Outcome, Stage, StageEvent, StateMachine, StateUpdate, Transition, WorkflowState};

/// Repair attempts before a run is declared exhausted.
pub const MAX_ATTEMPTS: u32 = 3;
/// Minimum critique score (inclusive) that ends a run as passed.
pub const SCORE_THRESHOLD: f64 = 0.8;
/// Default token budget for a single run.
pub const TOKEN_BUDGET: u32 = 4096;

/// Limits applied to every run of an engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairPolicy {
    pub max_attempts: u32,
    pub score_threshold: f64,
    /// Tokens a run may spend; zero disables the check.
    pub token_budget: u32,
}

impl Default for RepairPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            score_threshold: SCORE_THRESHOLD,
            token_budget: TOKEN_BUDGET,
        }
    }
}
