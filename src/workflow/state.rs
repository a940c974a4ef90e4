use std::fmt;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::contracts::{Contract, Critique, FeatureRequest, Patch, RepairPlan, Spec, Tests};
use crate::error::{AsgaError, Result};

use super::RepairPolicy;

/// The five stages of the workflow graph.
///
/// A run flows: SPEC → TESTS → CODE → CRITIC → (REPAIR → CODE → CRITIC)* → end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Spec,
    Tests,
    Code,
    Critic,
    Repair,
}

impl Stage {
    /// Entry point of every run.
    pub const START: Stage = Stage::Spec;

    pub fn name(self) -> &'static str {
        match self {
            Stage::Spec => "spec",
            Stage::Tests => "tests",
            Stage::Code => "code",
            Stage::Critic => "critic",
            Stage::Repair => "repair",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How a run that did not error came to an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// The critique met the threshold.
    Passed,
    /// The repair budget ran out with a critique still below threshold.
    Exhausted,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Passed => write!(f, "passed"),
            Outcome::Exhausted => write!(f, "exhausted"),
        }
    }
}

/// The result of evaluating the edges leaving a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Next(Stage),
    Terminate(Outcome),
}

/// Accumulator threaded through the graph.
///
/// Optional fields fill in as stages complete and are never cleared.
/// `attempts` is only raised by the repair stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub feature_request: FeatureRequest,
    pub spec: Option<Spec>,
    pub tests: Option<Tests>,
    pub patch: Option<Patch>,
    pub critique: Option<Critique>,
    pub repair_plan: Option<RepairPlan>,
    pub attempts: u32,
    pub tokens_used: u32,
}

impl WorkflowState {
    pub fn new(feature_request: FeatureRequest) -> Self {
        Self {
            feature_request,
            spec: None,
            tests: None,
            patch: None,
            critique: None,
            repair_plan: None,
            attempts: 0,
            tokens_used: 0,
        }
    }

    pub fn merge(&mut self, update: StateUpdate) {
        match update {
            StateUpdate::Spec { spec, token_count } => {
                self.spec = Some(spec);
                self.tokens_used = self.tokens_used.saturating_add(token_count);
            }
            StateUpdate::Tests(tests) => self.tests = Some(tests),
            StateUpdate::Patch(patch) => self.patch = Some(patch),
            StateUpdate::Critique(critique) => self.critique = Some(critique),
            StateUpdate::Repair { plan, attempts } => {
                self.repair_plan = Some(plan);
                self.attempts = self.attempts.max(attempts);
            }
        }
    }
}

/// Fetch a stage input, failing if an earlier stage never produced it.
pub(crate) fn required<'a, T>(
    value: &'a Option<T>,
    stage: Stage,
    field: &'static str,
) -> Result<&'a T> {
    value.as_ref().ok_or_else(|| AsgaError::MissingInput {
        stage: stage.to_string(),
        field,
    })
}

/// Partial update produced by one stage execution.
#[derive(Debug, Clone, PartialEq)]
pub enum StateUpdate {
    Spec { spec: Spec, token_count: u32 },
    Tests(Tests),
    Patch(Patch),
    Critique(Critique),
    Repair { plan: RepairPlan, attempts: u32 },
}

impl StateUpdate {
    /// Field name → value mapping mirroring the state change.
    pub fn delta(&self) -> serde_json::Result<Map<String, Value>> {
        let mut delta = Map::new();
        match self {
            StateUpdate::Spec { spec, token_count } => {
                delta.insert(Spec::NAME.into(), spec.payload()?);
                delta.insert("token_count".into(), Value::from(*token_count));
            }
            StateUpdate::Tests(tests) => {
                delta.insert(Tests::NAME.into(), tests.payload()?);
            }
            StateUpdate::Patch(patch) => {
                delta.insert(Patch::NAME.into(), patch.payload()?);
            }
            StateUpdate::Critique(critique) => {
                delta.insert(Critique::NAME.into(), critique.payload()?);
            }
            StateUpdate::Repair { plan, attempts } => {
                delta.insert(RepairPlan::NAME.into(), plan.payload()?);
                delta.insert("attempts".into(), Value::from(*attempts));
            }
        }
        Ok(delta)
    }
}

/// One merged stage output, serialized as `{"<stage>": {<delta>}}`.
#[derive(Debug, Clone, PartialEq)]
pub struct StageEvent {
    pub stage: Stage,
    pub delta: Map<String, Value>,
}

impl StageEvent {
    pub fn new(stage: Stage, update: &StateUpdate) -> serde_json::Result<Self> {
        Ok(Self {
            stage,
            delta: update.delta()?,
        })
    }
}

impl Serialize for StageEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(self.stage.name(), &self.delta)?;
        map.end()
    }
}

/// Edge evaluation for the workflow graph.
pub struct StateMachine;

impl StateMachine {
    /// Compute the transition out of `stage` given the state after its merge.
    ///
    /// - `spec`, `tests` and `code` have a single unconditional edge.
    /// - `critic` terminates when the score meets the threshold, else repairs.
    /// - `repair` terminates once the attempt budget is spent, else re-enters
    ///   `code`.
    pub fn next(stage: Stage, state: &WorkflowState, policy: &RepairPolicy) -> Result<Transition> {
        let transition = match stage {
            Stage::Spec => Transition::Next(Stage::Tests),
            Stage::Tests => Transition::Next(Stage::Code),
            Stage::Code => Transition::Next(Stage::Critic),
            Stage::Critic => {
                let critique = required(&state.critique, stage, Critique::NAME)?;
                if critique.passes(policy.score_threshold) {
                    Transition::Terminate(Outcome::Passed)
                } else {
                    Transition::Next(Stage::Repair)
                }
            }
            Stage::Repair => {
                if state.attempts >= policy.max_attempts {
                    Transition::Terminate(Outcome::Exhausted)
                } else {
                    Transition::Next(Stage::Code)
                }
            }
        };
        Ok(transition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with_score(score: f64, attempts: u32) -> WorkflowState {
        let mut state = WorkflowState::new(FeatureRequest::new("hi"));
        state.critique = Some(Critique {
            score,
            feedback: String::new(),
        });
        state.attempts = attempts;
        state
    }

    #[test]
    fn linear_edges() {
        let state = WorkflowState::new(FeatureRequest::new("hi"));
        let policy = RepairPolicy::default();
        assert_eq!(
            StateMachine::next(Stage::Spec, &state, &policy).unwrap(),
            Transition::Next(Stage::Tests)
        );
        assert_eq!(
            StateMachine::next(Stage::Tests, &state, &policy).unwrap(),
            Transition::Next(Stage::Code)
        );
        assert_eq!(
            StateMachine::next(Stage::Code, &state, &policy).unwrap(),
            Transition::Next(Stage::Critic)
        );
    }

    #[test]
    fn critic_routes_on_threshold() {
        let policy = RepairPolicy::default();
        let pass = state_with_score(0.8, 0);
        assert_eq!(
            StateMachine::next(Stage::Critic, &pass, &policy).unwrap(),
            Transition::Terminate(Outcome::Passed)
        );
        let fail = state_with_score(0.79, 0);
        assert_eq!(
            StateMachine::next(Stage::Critic, &fail, &policy).unwrap(),
            Transition::Next(Stage::Repair)
        );
    }

    #[test]
    fn repair_stops_at_attempt_cap() {
        let policy = RepairPolicy::default();
        assert_eq!(
            StateMachine::next(Stage::Repair, &state_with_score(0.5, 2), &policy).unwrap(),
            Transition::Next(Stage::Code)
        );
        assert_eq!(
            StateMachine::next(Stage::Repair, &state_with_score(0.5, 3), &policy).unwrap(),
            Transition::Terminate(Outcome::Exhausted)
        );
    }

    #[test]
    fn critic_without_critique_is_an_error() {
        let state = WorkflowState::new(FeatureRequest::new("hi"));
        let err = StateMachine::next(Stage::Critic, &state, &RepairPolicy::default()).unwrap_err();
        assert!(matches!(err, AsgaError::MissingInput { field: "critique", .. }));
    }

    #[test]
    fn merge_keeps_attempts_monotonic() {
        let mut state = WorkflowState::new(FeatureRequest::new("hi"));
        state.merge(StateUpdate::Repair {
            plan: RepairPlan::default(),
            attempts: 2,
        });
        state.merge(StateUpdate::Repair {
            plan: RepairPlan::default(),
            attempts: 1,
        });
        assert_eq!(state.attempts, 2);
    }

    #[test]
    fn merge_accumulates_tokens() {
        let mut state = WorkflowState::new(FeatureRequest::new("hi"));
        let spec = Spec {
            endpoint: "/demo".into(),
            method: "GET".into(),
            request_schema: "{}".into(),
            response_schema: "{}".into(),
        };
        state.merge(StateUpdate::Spec {
            spec: spec.clone(),
            token_count: 10,
        });
        assert_eq!(state.spec, Some(spec));
        assert_eq!(state.tokens_used, 10);
    }

    #[test]
    fn event_serializes_under_stage_name() {
        let update = StateUpdate::Repair {
            plan: RepairPlan {
                steps: vec!["fix 1".into()],
            },
            attempts: 1,
        };
        let event = StageEvent::new(Stage::Repair, &update).unwrap();
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["repair"]["attempts"], 1);
        assert_eq!(json["repair"]["repair_plan"]["steps"][0], "fix 1");
    }

    #[test]
    fn stage_display() {
        assert_eq!(Stage::Spec.to_string(), "spec");
        assert_eq!(Stage::Critic.to_string(), "critic");
        assert_eq!(Stage::Repair.to_string(), "repair");
        assert_eq!(Outcome::Exhausted.to_string(), "exhausted");
    }
}
