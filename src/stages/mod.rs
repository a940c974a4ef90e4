//! Pluggable stage strategies invoked by the workflow engine.
//!
//! Each trait is a typed function from one stage input to one output.
//! Strategies know nothing about tracing spans or routing.

mod critic;
mod patch;
mod repair;
mod spec;
mod synthesis;

use std::sync::Arc;

pub use critic::MarkerCritic;
pub use patch::AssertionPatcher;
pub use repair::PlanRepair;
pub use spec::{KeywordSpecGuess, SpecExtractor};
pub use synthesis::SeededTestSynthesizer;

use crate::config::AsgaConfig;
use crate::contracts::{Critique, FeatureRequest, Patch, RepairPlan, Spec, Tests};
use crate::error::Result;
use crate::provider::ReasoningProvider;
use crate::validation::EnvelopeValidator;

/// Assertion emitted by freshly synthesized tests.
pub const FAILING_ASSERTION: &str = "assert!(false";
/// Assertion a successful patch leaves behind.
pub const PASSING_ASSERTION: &str = "assert!(true";

/// A stage output plus the tokens spent producing it.
#[derive(Debug, Clone, PartialEq)]
pub struct Metered<T> {
    pub value: T,
    pub tokens: u32,
}

impl<T> Metered<T> {
    pub fn free(value: T) -> Self {
        Self { value, tokens: 0 }
    }
}

pub trait SpecExtraction: Send + Sync {
    fn extract(&self, request: &FeatureRequest) -> Result<Metered<Spec>>;
}

pub trait TestSynthesis: Send + Sync {
    fn synthesize(&self, spec: &Spec) -> Result<Tests>;
}

pub trait PatchGeneration: Send + Sync {
    fn generate(&self, tests: &Tests) -> Result<Patch>;
}

pub trait Critic: Send + Sync {
    fn critique(&self, patch: &Patch) -> Result<Critique>;
}

/// Produces the remediation plan for repair attempt number `attempt` (1-based).
pub trait RepairStrategy: Send + Sync {
    fn plan(&self, critique: &Critique, attempt: u32) -> Result<RepairPlan>;
}

/// The full set of strategies a workflow run needs.
#[derive(Clone)]
pub struct Strategies {
    pub spec: Arc<dyn SpecExtraction>,
    pub tests: Arc<dyn TestSynthesis>,
    pub code: Arc<dyn PatchGeneration>,
    pub critic: Arc<dyn Critic>,
    pub repair: Arc<dyn RepairStrategy>,
}

impl Strategies {
    /// Default strategies. The spec stage uses `provider` when given and
    /// falls back to keyword guessing otherwise.
    pub fn standard(
        config: &AsgaConfig,
        validator: EnvelopeValidator,
        provider: Option<Arc<dyn ReasoningProvider>>,
    ) -> Self {
        Self {
            spec: Arc::new(SpecExtractor::new(
                provider,
                config.retry_config(),
                validator.clone(),
            )),
            tests: Arc::new(SeededTestSynthesizer::new(config.seed)),
            code: Arc::new(AssertionPatcher),
            critic: Arc::new(MarkerCritic::new(validator)),
            repair: Arc::new(PlanRepair),
        }
    }
}
