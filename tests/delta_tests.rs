//! Delta assembly from the outside: chunks in, messages out.

use pretty_assertions::assert_eq;
use serde_json::json;

use colloquy::delta::{apply, Assembled, DeltaAssembler, DeltaError, PartialAssistantMessage};
use colloquy::types::stream::ToolCallDelta;
use colloquy::types::{ContentPart, FinishReason, MessageContent, Role, StreamEvent, ToolCall};

#[test]
fn chunks_assemble_into_a_tool_calling_message() {
    let mut partial = PartialAssistantMessage::new();
    for chunk in [
        json!({ "choices": [{ "index": 0, "delta": { "role": "assistant", "content": "" } }] }),
        json!({ "choices": [{ "index": 0, "delta": { "tool_calls": [
            { "index": 0, "id": "call_a", "function": { "name": "weather", "arguments": "{\"ci" } }
        ] } }] }),
        json!({ "choices": [{ "index": 0, "delta": { "tool_calls": [
            { "index": 0, "function": { "arguments": "ty\":\"Oslo\"}" } },
            { "index": 1, "id": "call_b", "function": { "name": "time", "arguments": "{}" } }
        ] } }] }),
        json!({ "choices": [{ "index": 0, "delta": {}, "finish_reason": "tool_calls" }] }),
    ] {
        partial.apply_chunk(&chunk).unwrap();
    }

    assert!(partial.is_finished());
    let finalized = partial.finalize(0).unwrap();
    assert_eq!(finalized.finish_reason, Some(FinishReason::ToolCalls));
    assert!(finalized.requests_tools());
    assert_eq!(finalized.message.role, Role::Assistant);
    assert_eq!(
        finalized.message.content,
        MessageContent::Parts(vec![
            ContentPart::FunctionCall(ToolCall {
                id: "call_a".into(),
                function_name: "weather".into(),
                arguments_json: r#"{"city":"Oslo"}"#.into(),
            }),
            ContentPart::FunctionCall(ToolCall {
                id: "call_b".into(),
                function_name: "time".into(),
                arguments_json: "{}".into(),
            }),
        ])
    );
}

#[test]
fn events_and_chunks_agree() {
    let events = vec![
        StreamEvent::role(Role::Assistant),
        StreamEvent::content("Hi "),
        StreamEvent::content("there"),
        StreamEvent::tool_call(ToolCallDelta {
            index: 0,
            id: Some("call_1".into()),
            name: Some("lookup".into()),
            arguments_fragment: Some("{}".into()),
        }),
        StreamEvent::finish(FinishReason::ToolCalls),
    ];

    let mut via_events = PartialAssistantMessage::new();
    let mut via_chunks = PartialAssistantMessage::new();
    for event in &events {
        via_events.apply_event(event).unwrap();
        via_chunks.apply_chunk(&event.to_chunk().unwrap()).unwrap();
    }

    assert_eq!(via_events.choices(), via_chunks.choices());
    assert_eq!(via_events.choice(0).unwrap().content, "Hi there");
}

#[test]
fn choices_assemble_independently() {
    let mut partial = PartialAssistantMessage::new();
    partial
        .apply_chunk(&json!({ "choices": [
            { "index": 1, "delta": { "content": "second" } },
            { "index": 0, "delta": { "content": "first" } }
        ] }))
        .unwrap();
    partial
        .apply_chunk(&json!({ "choices": [{ "index": 1, "delta": {}, "finish_reason": "length" }] }))
        .unwrap();

    let choices = partial.choices();
    assert_eq!(choices.len(), 2);
    assert_eq!(choices[0].content, "first");
    assert_eq!(choices[1].content, "second");
    assert_eq!(choices[1].finish_reason, Some(FinishReason::Length));
    assert!(!partial.is_finished());
}

#[test]
fn empty_deltas_change_nothing() {
    let mut assembler = DeltaAssembler::new();
    assembler
        .apply(&json!({ "choices": [{ "index": 0, "delta": { "content": "x" } }] }))
        .unwrap();
    let before = assembler.value().cloned();

    assembler.apply(&json!({})).unwrap();
    assembler.apply(&json!({ "choices": [] })).unwrap();

    assert_eq!(assembler.value().cloned(), before);
}

#[test]
fn null_clears_a_field() {
    let acc = apply(None, &json!({ "content": "draft", "role": "assistant" })).unwrap();
    let acc = apply(Some(acc), &json!({ "content": null })).unwrap();

    assert_eq!(acc.get("content"), Some(&Assembled::Null));
    assert_eq!(acc.get("role").and_then(Assembled::as_str), Some("assistant"));
}

#[test]
fn malformed_chunk_leaves_partial_untouched() {
    let mut partial = PartialAssistantMessage::new();
    partial
        .apply_chunk(&json!({ "choices": [{ "index": 0, "delta": { "content": "kept" } }] }))
        .unwrap();

    let err = partial
        .apply_chunk(&json!({ "choices": [{ "delta": { "content": "lost" } }] }))
        .unwrap_err();

    assert_eq!(err, DeltaError::MissingIndex { position: 0 });
    assert_eq!(partial.choice(0).unwrap().content, "kept");
}

#[test]
fn unknown_finish_reason_is_preserved() {
    let mut partial = PartialAssistantMessage::new();
    partial
        .apply_chunk(&json!({ "choices": [{ "index": 0, "delta": { "content": "." }, "finish_reason": "eos_token" }] }))
        .unwrap();

    assert_eq!(
        partial.finalize(0).unwrap().finish_reason,
        Some(FinishReason::Other("eos_token".into()))
    );
}
