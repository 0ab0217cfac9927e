mod common;

use common::ScriptedLLM;
use proptest::prelude::*;
use story_agent::conversation::{ConversationController, StateKind};
use story_agent::llm::{AttributeKind, ToolError};

// Strategy for one attribute report: either kind, sometimes with a blank value
fn report_strategy() -> impl Strategy<Value = (AttributeKind, String)> {
    let kind = prop_oneof![Just(AttributeKind::Name), Just(AttributeKind::Location)];
    let value = prop_oneof![
        3 => "[A-Za-z]{1,12}".prop_map(|s| s.to_string()),
        1 => "[ \t]{0,3}".prop_map(|s| s.to_string()),
    ];
    (kind, value)
}

proptest! {
    #[test]
    fn prop_handoff_iff_both_attributes_recorded(
        reports in proptest::collection::vec(report_strategy(), 0..12)
    ) {
        let mut controller = ConversationController::new(ScriptedLLM::new(vec![]));
        let mut has_name = false;
        let mut has_location = false;
        let mut handoffs = 0;

        for (kind, value) in &reports {
            let handed_off = handoffs > 0;
            let result = controller.record_user_attribute(*kind, value);

            if handed_off {
                prop_assert!(
                    matches!(result, Err(ToolError::Unavailable { .. })),
                    "Introduction tool accepted after handoff: {:?}",
                    result
                );
                continue;
            }

            if value.trim().is_empty() {
                prop_assert!(matches!(result, Err(ToolError::InvalidParameters(_))));
                continue;
            }

            match kind {
                AttributeKind::Name => has_name = true,
                AttributeKind::Location => has_location = true,
            }

            let handoff = result.expect("valid report accepted");
            prop_assert_eq!(handoff.is_some(), has_name && has_location);
            if handoff.is_some() {
                handoffs += 1;
            }
        }

        prop_assert!(handoffs <= 1);
        prop_assert_eq!(handoffs == 1, has_name && has_location);
        let expected = if handoffs == 1 {
            StateKind::Storytelling
        } else {
            StateKind::Introduction
        };
        prop_assert_eq!(controller.state().kind(), expected);
        prop_assert!(controller.maybe_handoff().is_none());
    }

    #[test]
    fn prop_handoff_carries_latest_values(
        names in proptest::collection::vec("[A-Za-z]{1,12}", 1..4),
        location in "[A-Za-z]{1,12}",
    ) {
        let mut controller = ConversationController::new(ScriptedLLM::new(vec![]));

        for name in &names {
            let handoff = controller
                .record_user_attribute(AttributeKind::Name, name)
                .expect("name accepted");
            prop_assert!(handoff.is_none());
        }

        let handoff = controller
            .record_user_attribute(AttributeKind::Location, &location)
            .expect("location accepted")
            .expect("handoff once both are known");

        prop_assert_eq!(&handoff.name, names.last().unwrap());
        prop_assert_eq!(&handoff.location, &location);
    }
}
