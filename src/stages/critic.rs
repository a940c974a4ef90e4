use super::{Critic, PASSING_ASSERTION};
use crate::contracts::{Critique, Patch};
use crate::error::Result;
use crate::validation::EnvelopeValidator;

const PASSING_SCORE: f64 = 0.9;
const FAILING_SCORE: f64 = 0.5;

/// Scores a patch by whether it adds a passing assertion.
pub struct MarkerCritic {
    validator: EnvelopeValidator,
}

impl MarkerCritic {
    pub fn new(validator: EnvelopeValidator) -> Self {
        Self { validator }
    }
}

fn adds_passing_assertion(diff: &str) -> bool {
    diff.lines().any(|line| {
        line.starts_with('+') && !line.starts_with("+++") && line.contains(PASSING_ASSERTION)
    })
}

impl Critic for MarkerCritic {
    fn critique(&self, patch: &Patch) -> Result<Critique> {
        let critique = if adds_passing_assertion(&patch.diff) {
            Critique {
                score: PASSING_SCORE,
                feedback: "looks good".into(),
            }
        } else {
            Critique {
                score: FAILING_SCORE,
                feedback: "needs work: patch does not make the failing test pass".into(),
            }
        };
        self.validator.validate_contract(&critique)?;
        Ok(critique)
    }
}
