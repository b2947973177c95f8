//! Intent routing: a fixed table from intent to retrieval plan.

use std::collections::BTreeMap;
use tablesage_core::{
    BackendKind, Intent, PlanStep, Query, Result, RetrievalPlan, StepRule, TableSageError,
};
use tracing::{debug, info};

/// One plan per intent. Built once at startup, read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingTable {
    plans: BTreeMap<Intent, RetrievalPlan>,
}

impl RoutingTable {
    /// The built-in table.
    ///
    /// Ingredient discovery tries the dataset first and then the graph; an
    /// internal hit always continues to the web for external references.
    pub fn standard() -> Self {
        let plans = [
            RetrievalPlan::introduce_only(),
            RetrievalPlan::from_steps(
                Intent::IngredientDiscovery,
                vec![
                    PlanStep::new(
                        BackendKind::Structured,
                        StepRule::JumpTo(BackendKind::Web),
                        StepRule::Next,
                    ),
                    PlanStep::new(
                        BackendKind::Graph,
                        StepRule::JumpTo(BackendKind::Web),
                        StepRule::Next,
                    ),
                    PlanStep::always_next(BackendKind::Vector),
                    PlanStep::terminal(BackendKind::Web),
                ],
            ),
            RetrievalPlan::from_steps(
                Intent::TrendingInsights,
                vec![
                    PlanStep::new(
                        BackendKind::Graph,
                        StepRule::JumpTo(BackendKind::Web),
                        StepRule::Next,
                    ),
                    PlanStep::always_next(BackendKind::Vector),
                    PlanStep::terminal(BackendKind::Web),
                ],
            ),
            RetrievalPlan::from_steps(
                Intent::HistoricalContext,
                vec![PlanStep::terminal(BackendKind::Web)],
            ),
            RetrievalPlan::from_steps(
                Intent::ComparativeAnalysis,
                vec![
                    PlanStep::always_next(BackendKind::Vector),
                    PlanStep::terminal(BackendKind::Web),
                ],
            ),
            RetrievalPlan::from_steps(
                Intent::MenuInnovation,
                vec![
                    PlanStep::always_next(BackendKind::Vector),
                    PlanStep::terminal(BackendKind::Web),
                ],
            ),
        ];

        Self {
            plans: plans
                .into_iter()
                .map(|plan| (plan.intent(), plan))
                .collect(),
        }
    }

    /// The built-in table with `overrides` replacing individual plans.
    pub fn with_overrides(overrides: &[RetrievalPlan]) -> Result<Self> {
        let mut table = Self::standard();
        for plan in overrides {
            plan.validate()?;
            table.plans.insert(plan.intent(), plan.clone());
            info!(plan = %plan, "Routing override applied");
        }
        table.check_complete()?;
        Ok(table)
    }

    fn check_complete(&self) -> Result<()> {
        for intent in Intent::ALL {
            if !self.plans.contains_key(&intent) {
                return Err(TableSageError::invalid_plan(intent, "no plan defined"));
            }
        }
        Ok(())
    }

    /// Plan for `intent`; intents without a plan use the fallback plan.
    pub fn plan(&self, intent: Intent) -> &RetrievalPlan {
        match self.plans.get(&intent) {
            Some(plan) => plan,
            None => self
                .plans
                .get(&Intent::Fallback)
                .unwrap_or(&FALLBACK_PLAN),
        }
    }

    /// All plans in intent order.
    pub fn plans(&self) -> impl Iterator<Item = &RetrievalPlan> {
        self.plans.values()
    }
}

static FALLBACK_PLAN: RetrievalPlan = RetrievalPlan::introduce_only();

impl Default for RoutingTable {
    fn default() -> Self {
        Self::standard()
    }
}

/// Maps a classified query to its retrieval plan. Pure lookup; never fails.
#[derive(Debug, Clone, Default)]
pub struct IntentRouter {
    table: RoutingTable,
}

impl IntentRouter {
    pub fn new(table: RoutingTable) -> Self {
        Self { table }
    }

    pub fn route(&self, query: &Query, intent: Intent) -> &RetrievalPlan {
        let plan = self.table.plan(intent);
        debug!(
            intent = %intent,
            steps = plan.steps().len(),
            query_chars = query.text().chars().count(),
            "Routed query"
        );
        plan
    }

    pub fn table(&self) -> &RoutingTable {
        &self.table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_table_is_complete_and_valid() {
        let table = RoutingTable::standard();
        for intent in Intent::ALL {
            let plan = table.plan(intent);
            assert_eq!(plan.intent(), intent);
            assert!(plan.validate().is_ok());
        }
        assert!(table.plan(Intent::Fallback).is_introduce_only());
        assert_eq!(table.plans().count(), Intent::ALL.len());
        assert!(table.check_complete().is_ok());
    }

    #[test]
    fn test_standard_plans_match_reference_behavior() {
        let table = RoutingTable::standard();
        assert_eq!(
            table.plan(Intent::IngredientDiscovery).backends(),
            vec![
                BackendKind::Structured,
                BackendKind::Graph,
                BackendKind::Vector,
                BackendKind::Web
            ]
        );
        assert_eq!(
            table.plan(Intent::TrendingInsights).backends(),
            vec![BackendKind::Graph, BackendKind::Vector, BackendKind::Web]
        );
        assert_eq!(
            table.plan(Intent::HistoricalContext).backends(),
            vec![BackendKind::Web]
        );

        let ingredient = table.plan(Intent::IngredientDiscovery);
        assert_eq!(ingredient.resolve(0, ingredient.steps()[0].on_hit), Some(3));
        assert_eq!(ingredient.resolve(0, ingredient.steps()[0].on_empty), Some(1));
    }

    #[test]
    fn test_override_replaces_single_plan() {
        let custom = RetrievalPlan::new(
            Intent::HistoricalContext,
            vec![
                PlanStep::always_next(BackendKind::Graph),
                PlanStep::terminal(BackendKind::Web),
            ],
        )
        .unwrap();

        let table = RoutingTable::with_overrides(&[custom.clone()]).unwrap();
        assert_eq!(table.plan(Intent::HistoricalContext), &custom);
        assert_eq!(
            table.plan(Intent::MenuInnovation),
            RoutingTable::standard().plan(Intent::MenuInnovation)
        );
    }

    #[test]
    fn test_route_unknown_label_goes_to_fallback() {
        let router = IntentRouter::default();
        let query = Query::new("hmm");
        let plan = router.route(&query, Intent::from_label("unknown_label"));
        assert_eq!(plan.intent(), Intent::Fallback);
        assert!(plan.steps().is_empty());
    }
}
