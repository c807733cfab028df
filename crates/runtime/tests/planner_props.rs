#![allow(clippy::unwrap_used)]

use capflow_core::CapabilityKind;
use capflow_runtime::{heuristic_task, infer_capability, parse_plan};
use proptest::prelude::*;
use serde_json::json;

proptest! {
    #[test]
    fn plan_never_exceeds_cap(count in 0usize..20, cap in 1usize..8) {
        let tasks: Vec<_> = (0..count)
            .map(|i| json!({ "title": format!("t{}", i), "kind": "retrieval", "objective": format!("o{}", i) }))
            .collect();
        let plan = parse_plan(&json!({ "tasks": tasks }), cap);
        prop_assert_eq!(plan.len(), count.min(cap));
        let all_distinct = plan.iter().enumerate().all(|(i, a)| plan.iter().skip(i + 1).all(|b| a.id != b.id));
        prop_assert!(all_distinct);
    }

    #[test]
    fn heuristic_task_always_has_known_kind(input in "\\PC{1,80}") {
        let task = heuristic_task(&input);
        prop_assert!(task.kind.parse::<CapabilityKind>().is_ok());
        prop_assert_eq!(task.objective, input.trim().to_string());
    }

    #[test]
    fn docx_mention_wins(prefix in "[a-z ]{0,20}", name in "[a-z]{1,8}") {
        let input = format!("{} run {}.docx", prefix, name);
        prop_assert_eq!(infer_capability(&input), CapabilityKind::DocumentEditing);
    }
}
