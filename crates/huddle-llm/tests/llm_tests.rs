//! Tests for huddle-llm: request types and the scripted provider

use futures::StreamExt;
use huddle_llm::*;

// ===========================================================================
// LlmRequest
// ===========================================================================

#[test]
fn llm_request_default() {
    let req = LlmRequest::default();
    assert!(req.model.contains("claude"));
    assert!(req.messages.is_empty());
    assert!(req.system.is_none());
    assert!(req.temperature.is_none());
}

#[test]
fn single_turn_sets_system_and_user() {
    let req = LlmRequest::single_turn("m", "be terse", "hello");
    assert_eq!(req.model, "m");
    assert_eq!(req.system.as_deref(), Some("be terse"));
    assert_eq!(req.messages, vec![LlmMessage::user("hello")]);
}

#[test]
fn request_serialization_skips_unset_fields() {
    let req = LlmRequest {
        max_tokens: None,
        ..LlmRequest::single_turn("m", "sys", "hi")
    };
    let json = serde_json::to_value(&req).unwrap();
    assert!(json.get("max_tokens").is_none());
    assert!(json.get("temperature").is_none());
    assert_eq!(json["messages"][0]["role"], "user");
}

// ===========================================================================
// ScriptedProvider
// ===========================================================================

#[tokio::test]
async fn scripted_streams_chunks_in_order() {
    let provider = ScriptedProvider::constant(ScriptStep::chunks(["a", "b", "c"]));
    let mut stream = provider
        .complete_stream(LlmRequest::single_turn("m", "s", "p"))
        .await
        .unwrap();

    let mut text = Vec::new();
    let mut done = false;
    while let Some(delta) = stream.next().await {
        match delta.unwrap() {
            StreamDelta::Text(t) => text.push(t),
            StreamDelta::Done { .. } => done = true,
            StreamDelta::Error(e) => panic!("unexpected error {}", e),
        }
    }
    assert_eq!(text, vec!["a", "b", "c"]);
    assert!(done);
    assert_eq!(provider.call_count().await, 1);
}

#[tokio::test]
async fn scripted_records_requests() {
    let provider = ScriptedProvider::constant(ScriptStep::chunks(["x"]));
    provider
        .complete(LlmRequest::single_turn("m", "style prompt", "question"))
        .await
        .unwrap();
    let requests = provider.requests().await;
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].system.as_deref(), Some("style prompt"));
}

#[tokio::test]
async fn scripted_sequence_then_default() {
    let provider = ScriptedProvider::sequence(vec![
        ScriptStep::chunks(["first"]),
        ScriptStep::Reject("down".into()),
    ]);
    let req = || LlmRequest::single_turn("m", "s", "p");

    assert_eq!(provider.complete(req()).await.unwrap(), "first");
    assert!(matches!(
        provider.complete(req()).await,
        Err(LlmError::RequestFailed(_))
    ));
    assert_eq!(provider.complete(req()).await.unwrap(), "(script exhausted)");
}

#[tokio::test]
async fn complete_surfaces_mid_stream_failure() {
    let provider = ScriptedProvider::constant(ScriptStep::FailAfter {
        chunks: vec!["partial".into()],
        error: "connection reset".into(),
    });
    let err = provider
        .complete(LlmRequest::single_turn("m", "s", "p"))
        .await
        .unwrap_err();
    assert!(matches!(err, LlmError::StreamError(ref m) if m == "connection reset"));
}

#[test]
fn llm_error_display() {
    let e = LlmError::RateLimited {
        retry_after_ms: 5000,
    };
    assert_eq!(e.to_string(), "rate limited: retry after 5000ms");
}
