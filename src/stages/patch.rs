use similar::TextDiff;

use super::{FAILING_ASSERTION, PASSING_ASSERTION, PatchGeneration};
use crate::contracts::{Patch, Tests};
use crate::error::Result;

/// Turns failing assertions into passing ones and reports the change as a
/// unified diff against `tests.rs`.
pub struct AssertionPatcher;

impl PatchGeneration for AssertionPatcher {
    fn generate(&self, tests: &Tests) -> Result<Patch> {
        let patched = tests.code.replace(FAILING_ASSERTION, PASSING_ASSERTION);
        let diff = TextDiff::from_lines(&tests.code, &patched)
            .unified_diff()
            .header("a/tests.rs", "b/tests.rs")
            .to_string();
        Ok(Patch { diff })
    }
}
