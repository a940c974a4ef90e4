use super::RepairStrategy;
use crate::contracts::{Critique, RepairPlan};
use crate::error::Result;

/// Plans one numbered fix per attempt, carrying the critique feedback along.
pub struct PlanRepair;

impl RepairStrategy for PlanRepair {
    fn plan(&self, critique: &Critique, attempt: u32) -> Result<RepairPlan> {
        let mut steps = vec![format!("fix {attempt}")];
        if !critique.feedback.is_empty() {
            steps.push(format!("address critique: {}", critique.feedback));
        }
        Ok(RepairPlan { steps })
    }
}
