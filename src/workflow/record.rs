use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::state::{Outcome, Stage, WorkflowState};

/// Structured audit record produced at the end of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: Uuid,
    pub user_story: String,
    pub outcome: Outcome,
    pub stage_transitions: Vec<Stage>,
    pub attempts: u32,
    pub max_attempts: u32,
    pub final_score: Option<f64>,
    pub tokens_used: u32,
    pub tests_digest: Option<String>,
    pub patch_digest: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: i64,
}

impl RunRecord {
    pub fn from_run(
        run_id: Uuid,
        state: &WorkflowState,
        outcome: Outcome,
        stage_transitions: Vec<Stage>,
        max_attempts: u32,
        started_at: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            run_id,
            user_story: state.feature_request.user_story.clone(),
            outcome,
            stage_transitions,
            attempts: state.attempts,
            max_attempts,
            final_score: state.critique.as_ref().map(|c| c.score),
            tokens_used: state.tokens_used,
            tests_digest: state.tests.as_ref().map(|t| t.digest()),
            patch_digest: state.patch.as_ref().map(|p| p.digest()),
            started_at,
            completed_at: now,
            duration_ms: (now - started_at).num_milliseconds(),
        }
    }
}
