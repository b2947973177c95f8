//! Retrieval plans: the ordered backend steps executed for one intent.
//!
//! A plan is static configuration. Each step names a backend and two rules,
//! one applied when the backend returns evidence and one applied when it
//! returns nothing (or fails). Jumps may only move forward, which bounds
//! every execution by the number of steps.

use crate::error::{Result, TableSageError};
use crate::types::{BackendKind, Intent};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What to do after a step completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepRule {
    /// Advance to the following step.
    Next,
    /// Advance to the first later step that uses this backend.
    JumpTo(BackendKind),
    /// Stop querying and assemble what has been accumulated.
    Assemble,
}

impl fmt::Display for StepRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepRule::Next => f.write_str("next"),
            StepRule::JumpTo(backend) => write!(f, "jump to {backend}"),
            StepRule::Assemble => f.write_str("assemble"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    pub backend: BackendKind,
    pub on_hit: StepRule,
    pub on_empty: StepRule,
}

impl PlanStep {
    pub fn new(backend: BackendKind, on_hit: StepRule, on_empty: StepRule) -> Self {
        Self {
            backend,
            on_hit,
            on_empty,
        }
    }

    /// Step that continues with the next one whatever the outcome.
    pub fn always_next(backend: BackendKind) -> Self {
        Self::new(backend, StepRule::Next, StepRule::Next)
    }

    /// Step that ends the plan whatever the outcome.
    pub fn terminal(backend: BackendKind) -> Self {
        Self::new(backend, StepRule::Assemble, StepRule::Assemble)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalPlan {
    intent: Intent,
    #[serde(default)]
    steps: Vec<PlanStep>,
}

impl RetrievalPlan {
    /// Build and validate a plan.
    pub fn new(intent: Intent, steps: Vec<PlanStep>) -> Result<Self> {
        let plan = Self { intent, steps };
        plan.validate()?;
        Ok(plan)
    }

    /// Build a plan from literal steps without validating it.
    ///
    /// Plans that come from configuration go through [`RetrievalPlan::new`].
    pub fn from_steps(intent: Intent, steps: Vec<PlanStep>) -> Self {
        Self { intent, steps }
    }

    /// The plan for `fallback`: no backend is ever consulted.
    pub const fn introduce_only() -> Self {
        Self {
            intent: Intent::Fallback,
            steps: Vec::new(),
        }
    }

    pub fn intent(&self) -> Intent {
        self.intent
    }

    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    pub fn is_introduce_only(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn backends(&self) -> Vec<BackendKind> {
        self.steps.iter().map(|step| step.backend).collect()
    }

    /// Index of the step that follows `index` under `rule`, or `None` when
    /// the plan should assemble.
    pub fn resolve(&self, index: usize, rule: StepRule) -> Option<usize> {
        match rule {
            StepRule::Next => {
                let next = index + 1;
                (next < self.steps.len()).then_some(next)
            }
            StepRule::JumpTo(target) => self
                .steps
                .iter()
                .enumerate()
                .skip(index + 1)
                .find(|(_, step)| step.backend == target)
                .map(|(position, _)| position),
            StepRule::Assemble => None,
        }
    }

    /// Check the structural invariants of the plan.
    pub fn validate(&self) -> Result<()> {
        if self.intent == Intent::Fallback {
            if !self.steps.is_empty() {
                return Err(TableSageError::invalid_plan(
                    self.intent,
                    "fallback must not query any backend",
                ));
            }
            return Ok(());
        }

        if self.steps.is_empty() {
            return Err(TableSageError::invalid_plan(
                self.intent,
                "plan must contain at least one step",
            ));
        }

        for (index, step) in self.steps.iter().enumerate() {
            for rule in [step.on_hit, step.on_empty] {
                if let StepRule::JumpTo(target) = rule {
                    if self.resolve(index, rule).is_none() {
                        return Err(TableSageError::invalid_plan(
                            self.intent,
                            format!(
                                "step {} ({}) jumps to {} but no later step uses it",
                                index + 1,
                                step.backend,
                                target
                            ),
                        ));
                    }
                }
            }
        }

        Ok(())
    }
}

impl fmt::Display for RetrievalPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.steps.is_empty() {
            return write!(f, "{}: introduce only", self.intent);
        }
        write!(f, "{}:", self.intent)?;
        for (index, step) in self.steps.iter().enumerate() {
            write!(
                f,
                " [{}] {} (hit: {}, empty: {})",
                index + 1,
                step.backend,
                step.on_hit,
                step.on_empty
            )?;
        }
        Ok(())
    }
}
