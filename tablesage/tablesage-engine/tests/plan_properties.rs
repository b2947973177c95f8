//! Property tests for routing and plan execution.

use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use tablesage_backends::mock::{ScriptedGenerator, StaticBackend};
use tablesage_core::config::OrchestratorConfig;
use tablesage_core::{
    AssistantMetrics, BackendKind, EntityMap, Intent, PlanStep, Query, RetrievalPlan, StepRule,
};
use tablesage_engine::{APOLOGY, IntentRouter, Orchestrator, Synthesizer, Terminal};

const BACKENDS: [BackendKind; 4] = [
    BackendKind::Structured,
    BackendKind::Vector,
    BackendKind::Graph,
    BackendKind::Web,
];

fn arb_backend() -> impl Strategy<Value = BackendKind> {
    prop_oneof![
        Just(BackendKind::Structured),
        Just(BackendKind::Vector),
        Just(BackendKind::Graph),
        Just(BackendKind::Web),
    ]
}

fn arb_rule() -> impl Strategy<Value = StepRule> {
    prop_oneof![
        Just(StepRule::Next),
        Just(StepRule::Assemble),
        arb_backend().prop_map(StepRule::JumpTo),
    ]
}

fn arb_intent() -> impl Strategy<Value = Intent> {
    prop_oneof![
        Just(Intent::IngredientDiscovery),
        Just(Intent::TrendingInsights),
        Just(Intent::HistoricalContext),
        Just(Intent::ComparativeAnalysis),
        Just(Intent::MenuInnovation),
    ]
}

/// Plans that pass validation.
fn arb_plan() -> impl Strategy<Value = RetrievalPlan> {
    let step = (arb_backend(), arb_rule(), arb_rule())
        .prop_map(|(backend, on_hit, on_empty)| PlanStep::new(backend, on_hit, on_empty));
    (arb_intent(), prop::collection::vec(step, 1..7))
        .prop_filter_map("jump without a later target", |(intent, steps)| {
            RetrievalPlan::new(intent, steps).ok()
        })
}

/// Backends visited when each backend either always hits or never does.
fn expected_walk(plan: &RetrievalPlan, hits: &HashMap<BackendKind, bool>) -> Vec<BackendKind> {
    let mut visited = Vec::new();
    let mut cursor = Some(0);
    while let Some(index) = cursor {
        let step = plan.steps()[index];
        visited.push(step.backend);
        let rule = if hits[&step.backend] {
            step.on_hit
        } else {
            step.on_empty
        };
        cursor = plan.resolve(index, rule);
    }
    visited
}

proptest! {
    #[test]
    fn resolve_only_moves_forward(plan in arb_plan()) {
        let len = plan.steps().len();
        for (index, step) in plan.steps().iter().enumerate() {
            for rule in [step.on_hit, step.on_empty] {
                if let Some(next) = plan.resolve(index, rule) {
                    prop_assert!(next > index);
                    prop_assert!(next < len);
                }
            }
        }
    }

    #[test]
    fn unknown_labels_route_to_fallback(label in "[a-z_]{1,24}") {
        prop_assume!(Intent::ALL.iter().all(|intent| intent.as_str() != label));

        let router = IntentRouter::default();
        let query = Query::new("anything");
        let plan = router.route(&query, Intent::from_label(&label));
        prop_assert!(plan.is_introduce_only());
    }

    #[test]
    fn execution_follows_plan_rules(
        plan in arb_plan(),
        pattern in prop::collection::vec(any::<bool>(), 4),
        prefetch in any::<bool>(),
    ) {
        let hits: HashMap<BackendKind, bool> =
            BACKENDS.iter().copied().zip(pattern.iter().copied()).collect();

        let config = OrchestratorConfig {
            prefetch_next_step: prefetch,
            ..OrchestratorConfig::default()
        };
        let generator = Arc::new(ScriptedGenerator::with_outputs(["synthesized"]));
        let synthesizer = Synthesizer::new(
            generator.clone(),
            config.prompt_char_budget,
            config.generation_timeout(),
        );
        let mut orchestrator =
            Orchestrator::new(synthesizer, &config, Arc::new(AssistantMetrics::new()));
        for backend in BACKENDS {
            let adapter = if hits[&backend] {
                StaticBackend::hit(backend, [[("name", "row")]])
            } else {
                StaticBackend::empty(backend)
            };
            orchestrator = orchestrator.with_backend(Arc::new(adapter));
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        let run = runtime.block_on(orchestrator.execute(
            "query",
            plan.intent(),
            &EntityMap::new(),
            &plan,
        ));

        let walked: Vec<BackendKind> = run.steps.iter().map(|step| step.backend).collect();
        let expected = expected_walk(&plan, &hits);
        prop_assert_eq!(&walked, &expected);
        prop_assert_eq!(run.terminal, Terminal::Done);

        let contributing: Vec<BackendKind> = expected
            .iter()
            .copied()
            .filter(|backend| hits[backend])
            .collect();
        prop_assert_eq!(run.accumulated.sources(), contributing.clone());

        if contributing.is_empty() {
            prop_assert_eq!(run.text.as_str(), APOLOGY);
            prop_assert_eq!(generator.call_count(), 0);
        } else {
            prop_assert_eq!(generator.call_count(), contributing.len() + 1);
        }
    }
}
