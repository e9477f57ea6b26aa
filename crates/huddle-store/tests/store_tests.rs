//! Tests for huddle-store: in-memory persistence and the HTTP session validator

use huddle_core::*;
use huddle_store::*;

fn dm(from: &str, to: &str, text: &str) -> ChatMessage {
    ChatMessage::new(from.into(), Recipient::User(to.into()), text)
}

fn group_msg(from: &str, group: &str, text: &str) -> ChatMessage {
    ChatMessage::new(from.into(), Recipient::Group(group.into()), text)
}

// ===========================================================================
// Messages
// ===========================================================================

#[tokio::test]
async fn eligible_filter_for_user_counts_sent_non_generated() {
    let store = MemoryStore::new();
    store.insert_message(dm("alice", "bob", "one")).await.unwrap();
    store.insert_message(group_msg("alice", "g1", "two")).await.unwrap();
    store.insert_message(dm("bob", "alice", "not hers")).await.unwrap();
    store
        .insert_message(ChatMessage::generated(
            "alice".into(),
            Recipient::User("bob".into()),
            "generated",
        ))
        .await
        .unwrap();

    let filter = MessageFilter::eligible_for(&Subject::User("alice".into()));
    assert_eq!(store.count_messages(&filter).await.unwrap(), 2);
    let texts: Vec<String> = store
        .query_messages(&filter)
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.content)
        .collect();
    assert_eq!(texts, vec!["one", "two"]);
}

#[tokio::test]
async fn eligible_filter_for_group_excludes_agent_replies() {
    let store = MemoryStore::new();
    store.insert_message(group_msg("alice", "g1", "a")).await.unwrap();
    store.insert_message(group_msg("bob", "g1", "b")).await.unwrap();
    store.insert_message(group_msg("bob", "g2", "elsewhere")).await.unwrap();
    store
        .insert_message(ChatMessage::generated(
            UserId::collective(),
            Recipient::Group("g1".into()),
            "agent",
        ))
        .await
        .unwrap();

    let filter = MessageFilter::eligible_for(&Subject::Group("g1".into()));
    assert_eq!(store.count_messages(&filter).await.unwrap(), 2);

    let all = MessageFilter {
        include_generated: true,
        ..filter
    };
    assert_eq!(store.count_messages(&all).await.unwrap(), 3);
}

#[tokio::test]
async fn limit_keeps_most_recent() {
    let store = MemoryStore::new();
    for i in 0..5 {
        store.insert_message(dm("alice", "bob", &format!("m{}", i))).await.unwrap();
    }
    let filter = MessageFilter {
        limit: Some(2),
        ..MessageFilter::eligible_for(&Subject::User("alice".into()))
    };
    let texts: Vec<String> = store
        .query_messages(&filter)
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.content)
        .collect();
    assert_eq!(texts, vec!["m3", "m4"]);
}

#[tokio::test]
async fn failed_writes_surface_as_persistence_errors() {
    let store = MemoryStore::new();
    store.fail_writes(true);
    let err = store.insert_message(dm("a", "b", "x")).await.unwrap_err();
    assert!(matches!(err, Error::Persistence(_)));
    store.fail_writes(false);
    assert!(store.insert_message(dm("a", "b", "x")).await.is_ok());
}

// ===========================================================================
// Users and groups
// ===========================================================================

#[tokio::test]
async fn group_members_and_not_found() {
    let store = MemoryStore::new();
    store.set_group("g1", ["alice", "bob"]);
    let members = store.query_group_members(&"g1".into()).await.unwrap();
    assert_eq!(members, vec![UserId::new("alice"), UserId::new("bob")]);
    assert!(store.user_exists(&"bob".into()).await.unwrap());

    let err = store.query_group_members(&"nope".into()).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));

    store.remove_group(&"g1".into());
    assert!(store.query_group_members(&"g1".into()).await.is_err());
}

#[tokio::test]
async fn unknown_user_does_not_exist() {
    let store = MemoryStore::new();
    store.add_user("alice");
    assert!(store.user_exists(&"alice".into()).await.unwrap());
    assert!(!store.user_exists(&"mallory".into()).await.unwrap());
}

// ===========================================================================
// Style models
// ===========================================================================

fn model(subject: Subject, count: u64, prompt: &str) -> StyleModel {
    StyleModel {
        observed_message_count: count,
        rendered_prompt: prompt.to_string(),
        has_minimum_data: true,
        ..StyleModel::empty(subject)
    }
}

#[tokio::test]
async fn upsert_is_monotonic_in_observed_count() {
    let store = MemoryStore::new();
    let subject = Subject::User("alice".into());
    store.upsert_style_model(model(subject.clone(), 20, "newer")).await.unwrap();
    store.upsert_style_model(model(subject.clone(), 10, "older")).await.unwrap();
    let stored = store.get_style_model(&subject).await.unwrap().unwrap();
    assert_eq!(stored.observed_message_count, 20);
    assert_eq!(stored.rendered_prompt, "newer");

    // Equal counts replace: two recomputes of the same snapshot, last write wins.
    store.upsert_style_model(model(subject.clone(), 20, "again")).await.unwrap();
    let stored = store.get_style_model(&subject).await.unwrap().unwrap();
    assert_eq!(stored.rendered_prompt, "again");
}

#[tokio::test]
async fn reset_replaces_with_empty_model() {
    let store = MemoryStore::new();
    let subject = Subject::Group("g1".into());
    assert!(store.get_style_model(&subject).await.unwrap().is_none());
    store.upsert_style_model(model(subject.clone(), 40, "x")).await.unwrap();
    store.reset_style_model(&subject).await.unwrap();
    let stored = store.get_style_model(&subject).await.unwrap().unwrap();
    assert!(stored.reset_at.is_some());
    assert_eq!(stored, StyleModel::reset(subject, stored.reset_at.unwrap()));
}

#[tokio::test]
async fn model_computed_before_reset_is_ignored() {
    let store = MemoryStore::new();
    let subject = Subject::User("alice".into());
    store.reset_style_model(&subject).await.unwrap();
    let reset_at = store.get_style_model(&subject).await.unwrap().unwrap().reset_at;

    // A recompute that started before the reset carries no watermark.
    store.upsert_style_model(model(subject.clone(), 30, "stale")).await.unwrap();
    let stored = store.get_style_model(&subject).await.unwrap().unwrap();
    assert_eq!(stored.observed_message_count, 0);
    assert!(!stored.has_prompt());

    // One computed after the reset is accepted from a low count.
    let fresh = StyleModel {
        reset_at,
        ..model(subject.clone(), 2, "fresh")
    };
    store.upsert_style_model(fresh).await.unwrap();
    let stored = store.get_style_model(&subject).await.unwrap().unwrap();
    assert_eq!(stored.rendered_prompt, "fresh");
    assert_eq!(stored.reset_at, reset_at);
}

#[tokio::test]
async fn since_filter_skips_older_messages() {
    let store = MemoryStore::new();
    store.insert_message(dm("alice", "bob", "before")).await.unwrap();
    let cutoff = chrono::Utc::now();
    store.insert_message(dm("alice", "bob", "after")).await.unwrap();

    let filter = MessageFilter::eligible_for(&Subject::User("alice".into())).since(Some(cutoff));
    assert_eq!(store.count_messages(&filter).await.unwrap(), 1);
    let kept = store.query_messages(&filter).await.unwrap();
    assert_eq!(kept[0].content, "after");
}

// ===========================================================================
// HttpSessionValidator
// ===========================================================================

async fn spawn_session_service() -> String {
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::get;
    use axum::{Json, Router};

    async fn validate(headers: HeaderMap) -> std::result::Result<Json<serde_json::Value>, StatusCode> {
        match headers.get("authorization").and_then(|v| v.to_str().ok()) {
            Some("Bearer good") => Ok(Json(serde_json::json!({ "userId": "alice" }))),
            Some("Bearer broken") => Err(StatusCode::INTERNAL_SERVER_ERROR),
            _ => Err(StatusCode::UNAUTHORIZED),
        }
    }

    let app = Router::new().route("/validate", get(validate));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}/validate", addr)
}

#[tokio::test]
async fn http_validator_accepts_and_rejects() {
    let url = spawn_session_service().await;
    let validator = HttpSessionValidator::new(url);

    let user = validator.validate(&Credentials::bearer("good")).await.unwrap();
    assert_eq!(user.as_str(), "alice");

    for token in ["bad", "broken"] {
        let err = validator.validate(&Credentials::bearer(token)).await.unwrap_err();
        assert!(matches!(err, Error::AuthenticationFailure { .. }), "{}", token);
    }
    assert!(validator.validate(&Credentials::default()).await.is_err());
}

#[tokio::test]
async fn http_validator_unreachable_service_fails_closed() {
    let validator = HttpSessionValidator::new("http://127.0.0.1:1/validate");
    let err = validator.validate(&Credentials::bearer("good")).await.unwrap_err();
    assert!(matches!(err, Error::AuthenticationFailure { .. }));
}
