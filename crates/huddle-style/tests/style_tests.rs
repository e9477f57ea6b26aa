//! Tests for huddle-style: feature extraction, prompts, and the scheduler

use huddle_core::*;
use huddle_store::*;
use huddle_style::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn config() -> StyleConfig {
    StyleConfig::default()
}

async fn send_direct(store: &MemoryStore, from: &str, n: usize) {
    for i in 0..n {
        store
            .insert_message(ChatMessage::new(
                from.into(),
                Recipient::User("friend".into()),
                format!("haha no way {} 😂", i),
            ))
            .await
            .unwrap();
    }
}

async fn send_group(store: &MemoryStore, group: &str, from: &str, n: usize) {
    for i in 0..n {
        store
            .insert_message(ChatMessage::new(
                from.into(),
                Recipient::Group(group.into()),
                format!("see you at the game {}!", i),
            ))
            .await
            .unwrap();
    }
}

/// Delegates to a [`MemoryStore`] and counts full history reads.
struct CountingStore {
    inner: MemoryStore,
    history_reads: AtomicUsize,
}

#[async_trait::async_trait]
impl MessageStore for CountingStore {
    async fn insert_message(&self, message: ChatMessage) -> Result<ChatMessage> {
        self.inner.insert_message(message).await
    }
    async fn query_messages(&self, filter: &MessageFilter) -> Result<Vec<ChatMessage>> {
        self.history_reads.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.inner.query_messages(filter).await
    }
    async fn count_messages(&self, filter: &MessageFilter) -> Result<u64> {
        tokio::task::yield_now().await;
        self.inner.count_messages(filter).await
    }
    async fn query_group_members(&self, group: &GroupId) -> Result<Vec<UserId>> {
        self.inner.query_group_members(group).await
    }
    async fn user_exists(&self, user: &UserId) -> Result<bool> {
        self.inner.user_exists(user).await
    }
    async fn upsert_style_model(&self, model: StyleModel) -> Result<()> {
        self.inner.upsert_style_model(model).await
    }
    async fn get_style_model(&self, subject: &Subject) -> Result<Option<StyleModel>> {
        self.inner.get_style_model(subject).await
    }
    async fn reset_style_model(&self, subject: &Subject) -> Result<()> {
        self.inner.reset_style_model(subject).await
    }
}

/// Delegates to a [`MemoryStore`]; history reads wait for a permit so a test
/// can act while a recompute is parked mid-read.
struct GatedStore {
    inner: MemoryStore,
    entered: tokio::sync::Notify,
    release: tokio::sync::Semaphore,
}

impl GatedStore {
    fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            entered: tokio::sync::Notify::new(),
            release: tokio::sync::Semaphore::new(0),
        }
    }
}

#[async_trait::async_trait]
impl MessageStore for GatedStore {
    async fn insert_message(&self, message: ChatMessage) -> Result<ChatMessage> {
        self.inner.insert_message(message).await
    }
    async fn query_messages(&self, filter: &MessageFilter) -> Result<Vec<ChatMessage>> {
        let messages = self.inner.query_messages(filter).await;
        self.entered.notify_one();
        let _permit = self
            .release
            .acquire()
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;
        messages
    }
    async fn count_messages(&self, filter: &MessageFilter) -> Result<u64> {
        self.inner.count_messages(filter).await
    }
    async fn query_group_members(&self, group: &GroupId) -> Result<Vec<UserId>> {
        self.inner.query_group_members(group).await
    }
    async fn user_exists(&self, user: &UserId) -> Result<bool> {
        self.inner.user_exists(user).await
    }
    async fn upsert_style_model(&self, model: StyleModel) -> Result<()> {
        self.inner.upsert_style_model(model).await
    }
    async fn get_style_model(&self, subject: &Subject) -> Result<Option<StyleModel>> {
        self.inner.get_style_model(subject).await
    }
    async fn reset_style_model(&self, subject: &Subject) -> Result<()> {
        self.inner.reset_style_model(subject).await
    }
}

// ===========================================================================
// Eligibility
// ===========================================================================

#[test]
fn is_due_at_interval_boundary() {
    assert!(!is_due(9, 0, 10));
    assert!(is_due(10, 0, 10));
    assert!(!is_due(29, 10, 20));
    assert!(is_due(30, 10, 20));
    assert!(!is_due(5, 10, 10));
}

#[tokio::test]
async fn should_recompute_counts_only_eligible_messages() {
    let store = Arc::new(MemoryStore::new());
    let scheduler = StyleScheduler::new(store.clone(), config());
    let alice = Subject::User("alice".into());

    send_direct(&store, "alice", 9).await;
    store
        .insert_message(ChatMessage::generated(
            "alice".into(),
            Recipient::User("friend".into()),
            "generated does not count",
        ))
        .await
        .unwrap();
    assert!(!scheduler.should_recompute(&alice).await.unwrap());

    send_direct(&store, "alice", 1).await;
    assert!(scheduler.should_recompute(&alice).await.unwrap());
}

#[tokio::test]
async fn group_interval_and_minimum_are_larger() {
    let store = Arc::new(MemoryStore::new());
    let scheduler = StyleScheduler::new(store.clone(), config());
    let group = Subject::Group("g1".into());
    assert_eq!(scheduler.interval(SubjectKind::Group), 20);
    assert_eq!(scheduler.minimum(SubjectKind::Group), 20);

    send_group(&store, "g1", "alice", 19).await;
    assert!(!scheduler.should_recompute(&group).await.unwrap());
    send_group(&store, "g1", "bob", 1).await;
    assert!(scheduler.should_recompute(&group).await.unwrap());
}

// ===========================================================================
// Recompute
// ===========================================================================

#[tokio::test]
async fn recompute_stores_model_with_minimum_flag() {
    let store = Arc::new(MemoryStore::new());
    let scheduler = StyleScheduler::new(store.clone(), config());
    let alice = Subject::User("alice".into());

    send_direct(&store, "alice", 12).await;
    let model = scheduler.recompute(&alice).await.unwrap();
    assert_eq!(model.observed_message_count, 12);
    assert!(model.has_minimum_data);
    assert!(model.has_prompt());
    assert!(model.features.phrases.contains(&"haha no".to_string()));
    assert_eq!(model.rendered_prompt, render_prompt(SubjectKind::User, &model.features));
    assert!(model.last_computed_at.is_some());

    let stored = store.get_style_model(&alice).await.unwrap().unwrap();
    assert_eq!(stored, model);
    assert_eq!(scheduler.recomputes(), 1);
}

#[tokio::test]
async fn recompute_below_minimum_keeps_flag_false() {
    let store = Arc::new(MemoryStore::new());
    let scheduler = StyleScheduler::new(store.clone(), config());
    let group = Subject::Group("g1".into());

    send_group(&store, "g1", "alice", 15).await;
    let model = scheduler.recompute(&group).await.unwrap();
    assert_eq!(model.observed_message_count, 15);
    assert!(!model.has_minimum_data);
}

#[tokio::test]
async fn ensure_fresh_recomputes_only_when_due() {
    let store = Arc::new(MemoryStore::new());
    let scheduler = StyleScheduler::new(store.clone(), config());
    let alice = Subject::User("alice".into());

    send_direct(&store, "alice", 5).await;
    let model = scheduler.ensure_fresh(&alice).await.unwrap();
    assert_eq!(model, StyleModel::empty(alice.clone()));
    assert_eq!(scheduler.recomputes(), 0);

    send_direct(&store, "alice", 6).await;
    let model = scheduler.ensure_fresh(&alice).await.unwrap();
    assert_eq!(model.observed_message_count, 11);
    assert_eq!(scheduler.recomputes(), 1);

    send_direct(&store, "alice", 3).await;
    let model = scheduler.ensure_fresh(&alice).await.unwrap();
    assert_eq!(model.observed_message_count, 11);
    assert_eq!(scheduler.recomputes(), 1);
}

#[tokio::test]
async fn reset_forgets_history_and_rebuilds_from_newer_messages() {
    let store = Arc::new(MemoryStore::new());
    let scheduler = StyleScheduler::new(store.clone(), config());
    let alice = Subject::User("alice".into());

    send_direct(&store, "alice", 10).await;
    scheduler.ensure_fresh(&alice).await.unwrap();
    scheduler.reset(&alice).await.unwrap();

    let stored = store.get_style_model(&alice).await.unwrap().unwrap();
    assert!(!stored.has_prompt());
    assert!(!stored.has_minimum_data);
    assert!(stored.reset_at.is_some());
    assert_eq!(scheduler.eligible_count(&alice).await.unwrap(), 0);

    // One more message is not enough to relearn anything.
    send_direct(&store, "alice", 1).await;
    assert!(!scheduler.should_recompute(&alice).await.unwrap());
    let model = scheduler.ensure_fresh(&alice).await.unwrap();
    assert!(!model.has_prompt());
    assert_eq!(scheduler.recomputes(), 1);

    // A full interval after the reset rebuilds from those messages only.
    for i in 0..9 {
        store
            .insert_message(ChatMessage::new(
                "alice".into(),
                Recipient::User("friend".into()),
                format!("good morning team {}", i),
            ))
            .await
            .unwrap();
    }
    let rebuilt = scheduler.ensure_fresh(&alice).await.unwrap();
    assert_eq!(rebuilt.observed_message_count, 10);
    assert_eq!(rebuilt.reset_at, stored.reset_at);
    assert!(rebuilt.features.phrases.contains(&"good morning".to_string()));
    assert!(!rebuilt.features.phrases.contains(&"haha no".to_string()));
}

#[tokio::test]
async fn reset_survives_a_recompute_already_in_flight() {
    let store = Arc::new(GatedStore::new());
    send_direct(&store.inner, "alice", 20).await;
    let scheduler = Arc::new(StyleScheduler::new(store.clone(), config()));
    let alice = Subject::User("alice".into());

    scheduler.observe(alice.clone());
    store.entered.notified().await;
    scheduler.reset(&alice).await.unwrap();
    store.release.add_permits(1);
    scheduler.wait_idle().await;

    let stored = store.get_style_model(&alice).await.unwrap().unwrap();
    assert!(!stored.has_prompt());
    assert_eq!(stored.observed_message_count, 0);
    assert!(stored.reset_at.is_some());
}

#[tokio::test]
async fn recompute_surfaces_persistence_errors() {
    let store = Arc::new(MemoryStore::new());
    let scheduler = StyleScheduler::new(store.clone(), config());
    send_direct(&store, "alice", 10).await;
    store.fail_writes(true);

    let err = scheduler
        .recompute(&Subject::User("alice".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Persistence(_)));
    assert_eq!(scheduler.recomputes(), 0);
}

// ===========================================================================
// Background observe
// ===========================================================================

#[tokio::test]
async fn observe_recomputes_in_background() {
    let store = Arc::new(MemoryStore::new());
    let scheduler = Arc::new(StyleScheduler::new(store.clone(), config()));
    let alice = Subject::User("alice".into());

    send_direct(&store, "alice", 10).await;
    scheduler.observe(alice.clone());
    scheduler.wait_idle().await;

    assert_eq!(scheduler.recomputes(), 1);
    assert!(store.get_style_model(&alice).await.unwrap().is_some());
    assert!(!scheduler.is_computing(&alice));
}

#[tokio::test]
async fn observe_skips_while_recompute_in_flight() {
    let store = Arc::new(CountingStore {
        inner: MemoryStore::new(),
        history_reads: AtomicUsize::new(0),
    });
    send_direct(&store.inner, "alice", 10).await;
    let scheduler = Arc::new(StyleScheduler::new(store.clone(), config()));
    let alice = Subject::User("alice".into());

    scheduler.observe(alice.clone());
    assert!(scheduler.is_computing(&alice));
    scheduler.observe(alice.clone());
    scheduler.observe(alice.clone());
    scheduler.wait_idle().await;

    assert_eq!(store.history_reads.load(Ordering::SeqCst), 1);
    assert_eq!(scheduler.recomputes(), 1);
    assert!(!scheduler.is_computing(&alice));

    // Flag released: the next trigger runs again (and finds nothing due).
    scheduler.observe(alice.clone());
    assert!(scheduler.is_computing(&alice));
    scheduler.wait_idle().await;
    assert_eq!(store.history_reads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn observe_failure_is_logged_and_releases_flag() {
    let store = Arc::new(MemoryStore::new());
    let scheduler = Arc::new(StyleScheduler::new(store.clone(), config()));
    let alice = Subject::User("alice".into());
    send_direct(&store, "alice", 10).await;
    store.fail_writes(true);

    scheduler.observe(alice.clone());
    scheduler.wait_idle().await;
    assert!(!scheduler.is_computing(&alice));
    assert_eq!(scheduler.recomputes(), 0);
}

#[tokio::test]
async fn user_and_group_flags_are_independent() {
    let store = Arc::new(MemoryStore::new());
    let scheduler = Arc::new(StyleScheduler::new(store.clone(), config()));
    send_group(&store, "g1", "alice", 20).await;

    scheduler.observe(Subject::User("alice".into()));
    scheduler.observe(Subject::Group("g1".into()));
    assert!(scheduler.is_computing(&Subject::User("alice".into())));
    assert!(scheduler.is_computing(&Subject::Group("g1".into())));
    scheduler.wait_idle().await;

    // alice sent 20 group messages, so both her model and the group's are due.
    assert_eq!(scheduler.recomputes(), 2);
}

// ===========================================================================
// Features through the public API
// ===========================================================================

#[test]
fn extract_features_respects_limits() {
    let contents = ["a b c d e f", "a b c d e f", "!!! ??? ... ,,, ;;;"];
    let features = extract_features(
        &contents,
        FeatureLimits {
            max_phrases: 3,
            max_symbols: 2,
        },
    );
    assert_eq!(features.phrases.len(), 3);
    assert_eq!(features.symbols.len(), 2);
    assert!(features.average_length > 0.0);
}
