use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, info_span, warn};
use uuid::Uuid;

use super::RepairPolicy;
use super::record::RunRecord;
use super::state::{
    Outcome, Stage, StageEvent, StateMachine, StateUpdate, Transition, WorkflowState, required,
};
use crate::config::AsgaConfig;
use crate::contracts::{Contract, Critique, FeatureRequest, Patch, Spec, Tests};
use crate::error::{AsgaError, Result};
use crate::provider::ReasoningProvider;
use crate::stages::{
    Critic, Metered, PatchGeneration, RepairStrategy, SpecExtraction, Strategies, TestSynthesis,
};
use crate::validation::EnvelopeValidator;

/// Lower-cased fragments treated as prompt injection in a user story.
const INJECTION_PATTERNS: &[&str] = &[
    "ignore previous",
    "ignore all previous",
    "disregard previous",
    "system:",
];

/// Reject feature requests that try to steer the reasoning provider.
pub fn screen_feature_request(request: &FeatureRequest) -> Result<()> {
    let lower = request.user_story.to_lowercase();
    match INJECTION_PATTERNS.iter().find(|p| lower.contains(*p)) {
        Some(pattern) => Err(AsgaError::SecurityRejection(format!(
            "possible prompt injection (`{pattern}`)"
        ))),
        None => Ok(()),
    }
}

/// Final state of a run that reached a terminal edge.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub state: WorkflowState,
    pub outcome: Outcome,
    pub record: RunRecord,
}

/// The compiled workflow graph.
///
/// Routing lives in [`StateMachine`]; this type owns the strategies, the
/// repair policy, and the stage-invocation loop.
pub struct WorkflowEngine {
    spec: Arc<dyn SpecExtraction>,
    tests: Arc<dyn TestSynthesis>,
    code: Arc<dyn PatchGeneration>,
    critic: Arc<dyn Critic>,
    repair: Arc<dyn RepairStrategy>,
    policy: RepairPolicy,
}

#[derive(Default)]
pub struct WorkflowEngineBuilder {
    spec: Option<Arc<dyn SpecExtraction>>,
    tests: Option<Arc<dyn TestSynthesis>>,
    code: Option<Arc<dyn PatchGeneration>>,
    critic: Option<Arc<dyn Critic>>,
    repair: Option<Arc<dyn RepairStrategy>>,
    policy: RepairPolicy,
}

impl WorkflowEngineBuilder {
    pub fn strategies(self, strategies: Strategies) -> Self {
        Self {
            spec: Some(strategies.spec),
            tests: Some(strategies.tests),
            code: Some(strategies.code),
            critic: Some(strategies.critic),
            repair: Some(strategies.repair),
            ..self
        }
    }

    pub fn spec_extraction(mut self, stage: Arc<dyn SpecExtraction>) -> Self {
        self.spec = Some(stage);
        self
    }

    pub fn test_synthesis(mut self, stage: Arc<dyn TestSynthesis>) -> Self {
        self.tests = Some(stage);
        self
    }

    pub fn patch_generation(mut self, stage: Arc<dyn PatchGeneration>) -> Self {
        self.code = Some(stage);
        self
    }

    pub fn critic(mut self, stage: Arc<dyn Critic>) -> Self {
        self.critic = Some(stage);
        self
    }

    pub fn repair(mut self, stage: Arc<dyn RepairStrategy>) -> Self {
        self.repair = Some(stage);
        self
    }

    pub fn policy(mut self, policy: RepairPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Compile the graph; every stage needs a strategy.
    pub fn build(self) -> Result<WorkflowEngine> {
        fn missing(stage: Stage) -> AsgaError {
            AsgaError::Config(format!("no strategy for stage `{stage}`"))
        }
        Ok(WorkflowEngine {
            spec: self.spec.ok_or_else(|| missing(Stage::Spec))?,
            tests: self.tests.ok_or_else(|| missing(Stage::Tests))?,
            code: self.code.ok_or_else(|| missing(Stage::Code))?,
            critic: self.critic.ok_or_else(|| missing(Stage::Critic))?,
            repair: self.repair.ok_or_else(|| missing(Stage::Repair))?,
            policy: self.policy,
        })
    }
}

impl WorkflowEngine {
    pub fn builder() -> WorkflowEngineBuilder {
        WorkflowEngineBuilder::default()
    }

    /// Engine wired with the default strategies and the configured policy.
    pub fn standard(
        config: &AsgaConfig,
        validator: EnvelopeValidator,
        provider: Option<Arc<dyn ReasoningProvider>>,
    ) -> Result<Self> {
        Self::builder()
            .strategies(Strategies::standard(config, validator, provider))
            .policy(config.repair_policy())
            .build()
    }

    pub fn policy(&self) -> &RepairPolicy {
        &self.policy
    }

    /// Run to a terminal edge, discarding intermediate events.
    pub fn run(&self, request: FeatureRequest) -> Result<RunResult> {
        self.run_with(request, |_| {})
    }

    /// Run to a terminal edge, handing each merged stage output to `on_event`
    /// in execution order.
    ///
    /// Any stage error aborts the run; nothing is re-invoked except through
    /// the repair → code edge.
    pub fn run_with<F>(&self, request: FeatureRequest, mut on_event: F) -> Result<RunResult>
    where
        F: FnMut(StageEvent),
    {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let run_span = info_span!("workflow_run", %run_id, user_story = %request.user_story);
        let _run = run_span.enter();

        let mut state = WorkflowState::new(request);
        let mut history = Vec::new();
        let mut stage = Stage::START;

        let outcome = loop {
            let update = {
                let stage_span = info_span!("stage", stage = %stage, attempts = state.attempts);
                let _stage = stage_span.enter();
                match self.execute(stage, &state) {
                    Ok(update) => update,
                    Err(err) => {
                        error!(%err, "stage failed, aborting run");
                        return Err(err);
                    }
                }
            };

            let event = StageEvent::new(stage, &update)?;
            state.merge(update);
            history.push(stage);
            on_event(event);

            match StateMachine::next(stage, &state, &self.policy)? {
                Transition::Next(next) => {
                    debug!(from = %stage, to = %next, "transition");
                    stage = next;
                }
                Transition::Terminate(outcome) => break outcome,
            }
        };

        match outcome {
            Outcome::Passed => info!(attempts = state.attempts, "run passed"),
            Outcome::Exhausted => warn!(
                attempts = state.attempts,
                score = ?state.critique.as_ref().map(|c| c.score),
                "repair attempts exhausted"
            ),
        }

        let record = RunRecord::from_run(
            run_id,
            &state,
            outcome,
            history,
            self.policy.max_attempts,
            started_at,
        );
        Ok(RunResult {
            state,
            outcome,
            record,
        })
    }

    /// Invoke one stage with exactly the inputs it declares.
    fn execute(&self, stage: Stage, state: &WorkflowState) -> Result<StateUpdate> {
        match stage {
            Stage::Spec => {
                screen_feature_request(&state.feature_request)?;
                let Metered { value, tokens } = self.spec.extract(&state.feature_request)?;
                let used = state.tokens_used.saturating_add(tokens);
                let limit = self.policy.token_budget;
                if limit > 0 && used >= limit {
                    return Err(AsgaError::BudgetExceeded { used, limit });
                }
                Ok(StateUpdate::Spec {
                    spec: value,
                    token_count: tokens,
                })
            }
            Stage::Tests => {
                let spec = required(&state.spec, stage, Spec::NAME)?;
                Ok(StateUpdate::Tests(self.tests.synthesize(spec)?))
            }
            Stage::Code => {
                let tests = required(&state.tests, stage, Tests::NAME)?;
                Ok(StateUpdate::Patch(self.code.generate(tests)?))
            }
            Stage::Critic => {
                let patch = required(&state.patch, stage, Patch::NAME)?;
                Ok(StateUpdate::Critique(self.critic.critique(patch)?))
            }
            Stage::Repair => {
                let critique = required(&state.critique, stage, Critique::NAME)?;
                let attempts = state.attempts + 1;
                let plan = self.repair.plan(critique, attempts)?;
                Ok(StateUpdate::Repair { plan, attempts })
            }
        }
    }
}
