mod common;

use common::*;
use serde_json::json;
use story_agent::conversation::{ConversationController, StateKind, UtteranceKind};
use story_agent::llm::{AttributeKind, LLMError, Role, ToolError};

#[tokio::test]
async fn test_name_then_location_hands_off_after_second_call() {
    let llm = ScriptedLLM::new(vec![
        Ok(reply("Hi, I'm Echo! What's your name?")),
        Ok(tool_calls(&[attribute("name", "Ava")])),
        Ok(reply("Lovely to meet you, Ava. Where are you from?")),
        Ok(tool_calls(&[attribute("location", "Kyoto")])),
        Ok(reply("Once upon a time, in Kyoto, lived a girl named Ava.")),
    ]);
    let mut controller = ConversationController::new(llm.clone());

    let greeting = controller.greet().await;
    assert_eq!(greeting.texts(), vec!["Hi, I'm Echo! What's your name?"]);

    let first = controller.handle_transcript("My name is Ava").await;
    assert!(first.handoff.is_none());
    assert_eq!(controller.state().kind(), StateKind::Introduction);
    assert_eq!(controller.profile().name(), Some("Ava"));
    assert_eq!(
        first.texts(),
        vec!["Lovely to meet you, Ava. Where are you from?"]
    );

    let second = controller.handle_transcript("I'm from Kyoto").await;
    let handoff = second.handoff.as_ref().expect("handoff after the second attribute");
    assert_eq!(handoff.name, "Ava");
    assert_eq!(handoff.location, "Kyoto");
    assert_eq!(
        second.texts(),
        vec![
            "Let's start the story!",
            "Once upon a time, in Kyoto, lived a girl named Ava."
        ]
    );
    assert_eq!(controller.state().kind(), StateKind::Storytelling);

    // The storyteller starts from its own prompt, without the introduction's history
    let requests = llm.requests();
    let story_request = requests.last().unwrap();
    assert_eq!(story_request.len(), 1);
    assert_eq!(story_request[0].role, Role::System);
    assert!(story_request[0]
        .content
        .contains("The user's name is Ava, from Kyoto."));
}

#[tokio::test]
async fn test_tools_offered_follow_the_active_agent() {
    let llm = ScriptedLLM::new(vec![
        Ok(reply("Hello!")),
        Ok(tool_calls(&[attribute("name", "Ava"), attribute("location", "Kyoto")])),
        Ok(reply("Once upon a time...")),
        Ok(reply("And then...")),
    ]);
    let mut controller = ConversationController::new(llm.clone());

    controller.greet().await;
    controller.handle_transcript("Ava, from Kyoto").await;
    controller.handle_transcript("What happened next?").await;

    assert_eq!(
        llm.offered(),
        vec![
            vec!["record_user_attribute".to_string()],
            vec!["record_user_attribute".to_string()],
            vec!["story_finished".to_string()],
            vec!["story_finished".to_string()],
        ]
    );
}

#[tokio::test]
async fn test_empty_value_is_rejected() {
    let llm = ScriptedLLM::new(vec![]);
    let mut controller = ConversationController::new(llm);

    let err = controller
        .record_user_attribute(AttributeKind::Name, "")
        .unwrap_err();
    assert!(matches!(err, ToolError::InvalidParameters(_)));
    assert_eq!(controller.profile().name(), None);

    controller
        .record_user_attribute(AttributeKind::Location, "Kyoto")
        .unwrap();
    assert!(controller
        .record_user_attribute(AttributeKind::Name, "   ")
        .is_err());
    assert_eq!(controller.state().kind(), StateKind::Introduction);
}

#[tokio::test]
async fn test_blank_attribute_from_model_does_not_hand_off() {
    let llm = ScriptedLLM::new(vec![
        Ok(tool_calls(&[attribute("name", " "), attribute("location", "Kyoto")])),
        Ok(reply("Sorry, what was your name?")),
    ]);
    let mut controller = ConversationController::new(llm.clone());

    let outcome = controller.handle_transcript("uh, from Kyoto").await;

    assert!(outcome.handoff.is_none());
    assert_eq!(controller.profile().name(), None);
    assert_eq!(controller.profile().location(), Some("Kyoto"));

    // The model hears about the rejection through the tool result
    let followup = &llm.requests()[1];
    let results: Vec<&str> = followup
        .iter()
        .filter(|m| m.role == Role::Tool)
        .map(|m| m.content.as_str())
        .collect();
    assert!(results[0].starts_with("Error:"));
    assert!(results[1].contains("Still missing: name"));
}

#[tokio::test]
async fn test_handoff_happens_at_most_once() {
    let llm = ScriptedLLM::new(vec![]);
    let mut controller = ConversationController::new(llm);

    assert!(controller.maybe_handoff().is_none());
    assert!(controller
        .record_user_attribute(AttributeKind::Name, "Ava")
        .unwrap()
        .is_none());

    let handoff = controller
        .record_user_attribute(AttributeKind::Location, "Kyoto")
        .unwrap()
        .expect("handoff");
    assert_eq!(handoff.utterance.kind, UtteranceKind::Transition);
    assert_eq!(handoff.utterance.text, "Let's start the story!");

    assert!(controller.maybe_handoff().is_none());
    assert!(controller.maybe_handoff().is_none());

    let err = controller
        .record_user_attribute(AttributeKind::Name, "Ben")
        .unwrap_err();
    assert!(matches!(err, ToolError::Unavailable { .. }));
    assert_eq!(controller.profile().name(), Some("Ava"));
}

#[tokio::test]
async fn test_llm_failure_rolls_back_the_turn() {
    let llm = ScriptedLLM::new(vec![
        Ok(tool_calls(&[attribute("name", "Ava")])),
        Err(LLMError::ApiError {
            status: 503,
            message: "overloaded".to_string(),
        }),
    ]);
    let mut controller = ConversationController::new(llm);

    let outcome = controller.handle_transcript("I'm Ava").await;

    assert_eq!(outcome.utterances.len(), 1);
    assert_eq!(outcome.utterances[0].kind, UtteranceKind::Fallback);
    assert_eq!(outcome.utterances[0].state, StateKind::Introduction);
    assert_eq!(controller.state().kind(), StateKind::Introduction);
    assert_eq!(controller.profile().name(), None);
}

#[tokio::test]
async fn test_malformed_tool_calls_are_ignored() {
    let llm = ScriptedLLM::new(vec![
        Ok(tool_calls(&[
            ("record_user_attribute", json!({"kind": "age", "value": "9"})),
            (
                "record_user_attribute",
                json!({"kind": "name", "value": "Ava", "extra": true}),
            ),
            ("record_user_attribute", serde_json::Value::Null),
            ("open_the_pod_bay_doors", json!({})),
            ("story_finished", json!({})),
        ])),
        Ok(reply("Could you tell me your name?")),
    ]);
    let mut controller = ConversationController::new(llm.clone());

    let outcome = controller.handle_transcript("hello").await;

    assert_eq!(outcome.texts(), vec!["Could you tell me your name?"]);
    assert!(outcome.handoff.is_none());
    assert!(!outcome.finished);
    assert!(!controller.is_finished());
    assert_eq!(controller.profile().name(), None);
    assert_eq!(controller.state().kind(), StateKind::Introduction);

    let errors = llm.requests()[1]
        .iter()
        .filter(|m| m.role == Role::Tool && m.content.starts_with("Error:"))
        .count();
    assert_eq!(errors, 5);
}

#[tokio::test]
async fn test_empty_transcript_is_silent() {
    let llm = ScriptedLLM::new(vec![]);
    let mut controller = ConversationController::new(llm.clone());

    assert!(controller.handle_transcript("   ").await.is_silent());
    assert!(llm.offered().is_empty());
}
