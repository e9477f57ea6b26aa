//! Style model scheduler
//!
//! Decides when a subject's style model is stale and recomputes it. Message
//! routing triggers `observe`, which runs in the background and never blocks
//! the caller. Generation calls `ensure_fresh` inline before it reads the
//! model.

use crate::features::{extract_features, FeatureLimits};
use crate::prompt::render_prompt;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use huddle_core::{Result, StyleConfig, StyleModel, Subject, SubjectKind};
use huddle_store::{MessageFilter, MessageStore};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// True when enough new messages arrived since the last recompute.
pub fn is_due(current: u64, last_computed: u64, interval: u64) -> bool {
    current.saturating_sub(last_computed) >= interval
}

pub struct StyleScheduler {
    store: Arc<dyn MessageStore>,
    config: StyleConfig,
    in_flight: Arc<DashMap<Subject, ()>>,
    tracker: TaskTracker,
    recomputes: AtomicU64,
}

/// Clears a subject's in-flight flag when the background recompute ends,
/// including when it fails or panics.
struct InFlight {
    subjects: Arc<DashMap<Subject, ()>>,
    subject: Subject,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.subjects.remove(&self.subject);
    }
}

impl StyleScheduler {
    pub fn new(store: Arc<dyn MessageStore>, config: StyleConfig) -> Self {
        Self {
            store,
            config,
            in_flight: Arc::new(DashMap::new()),
            tracker: TaskTracker::new(),
            recomputes: AtomicU64::new(0),
        }
    }

    pub fn interval(&self, kind: SubjectKind) -> u64 {
        match kind {
            SubjectKind::User => self.config.user_interval,
            SubjectKind::Group => self.config.group_interval,
        }
    }

    pub fn minimum(&self, kind: SubjectKind) -> u64 {
        match kind {
            SubjectKind::User => self.config.user_minimum,
            SubjectKind::Group => self.config.group_minimum,
        }
    }

    fn limits(&self) -> FeatureLimits {
        FeatureLimits {
            max_phrases: self.config.max_phrases,
            max_symbols: self.config.max_symbols,
        }
    }

    /// Non-generated messages a subject's model learns from, counted from
    /// the last reset.
    pub async fn eligible_count(&self, subject: &Subject) -> Result<u64> {
        let stored = self.store.get_style_model(subject).await?;
        self.count_since_reset(subject, stored.as_ref()).await
    }

    async fn count_since_reset(&self, subject: &Subject, stored: Option<&StyleModel>) -> Result<u64> {
        let filter = MessageFilter::eligible_for(subject).since(stored.and_then(|m| m.reset_at));
        self.store.count_messages(&filter).await
    }

    /// Whether the stored model is at least one interval behind.
    pub async fn should_recompute(&self, subject: &Subject) -> Result<bool> {
        let stored = self.store.get_style_model(subject).await?;
        let current = self.count_since_reset(subject, stored.as_ref()).await?;
        let last = stored.map(|m| m.observed_message_count).unwrap_or(0);
        Ok(is_due(current, last, self.interval(subject.kind())))
    }

    /// Rebuild the model from every eligible message since the last reset
    /// and store it.
    pub async fn recompute(&self, subject: &Subject) -> Result<StyleModel> {
        let reset_at = self
            .store
            .get_style_model(subject)
            .await?
            .and_then(|m| m.reset_at);
        let messages = self
            .store
            .query_messages(&MessageFilter::eligible_for(subject).since(reset_at))
            .await?;
        let count = messages.len() as u64;
        let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();

        let features = extract_features(&contents, self.limits());
        let rendered_prompt = render_prompt(subject.kind(), &features);
        let model = StyleModel {
            subject: subject.clone(),
            observed_message_count: count,
            has_minimum_data: count >= self.minimum(subject.kind()),
            features,
            rendered_prompt,
            last_computed_at: Some(Utc::now()),
            reset_at,
        };

        self.store.upsert_style_model(model.clone()).await?;
        self.recomputes.fetch_add(1, Ordering::Relaxed);
        info!(
            "Recomputed style model for {} from {} messages",
            subject, count
        );
        Ok(model)
    }

    /// Recompute if due, then return the current model. A subject that has
    /// never been computed and is not yet due gets an empty model.
    pub async fn ensure_fresh(&self, subject: &Subject) -> Result<StyleModel> {
        let stored = self.store.get_style_model(subject).await?;
        let current = self.count_since_reset(subject, stored.as_ref()).await?;
        let last = stored.as_ref().map(|m| m.observed_message_count).unwrap_or(0);

        if is_due(current, last, self.interval(subject.kind())) {
            return self.recompute(subject).await;
        }
        Ok(stored.unwrap_or_else(|| StyleModel::empty(subject.clone())))
    }

    /// Check the subject in the background and recompute when due. Skipped
    /// when a background recompute for the same subject is still running.
    pub fn observe(self: &Arc<Self>, subject: Subject) {
        let Some(guard) = self.claim(&subject) else {
            debug!("Style recompute already in flight for {}", subject);
            return;
        };

        let scheduler = Arc::clone(self);
        self.tracker.spawn(async move {
            let _guard = guard;
            match scheduler.should_recompute(&subject).await {
                Ok(true) => {
                    if let Err(e) = scheduler.recompute(&subject).await {
                        warn!("Style recompute for {} failed: {}", subject, e);
                    }
                }
                Ok(false) => {}
                Err(e) => warn!("Style check for {} failed: {}", subject, e),
            }
        });
    }

    fn claim(&self, subject: &Subject) -> Option<InFlight> {
        match self.in_flight.entry(subject.clone()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(());
                Some(InFlight {
                    subjects: Arc::clone(&self.in_flight),
                    subject: subject.clone(),
                })
            }
        }
    }

    /// Whether a background recompute currently holds the subject's flag.
    pub fn is_computing(&self, subject: &Subject) -> bool {
        self.in_flight.contains_key(subject)
    }

    /// Forget the subject's learned style. Messages sent before now are
    /// never learned from again, and a recompute already running is
    /// discarded by the store.
    pub async fn reset(&self, subject: &Subject) -> Result<()> {
        self.store.reset_style_model(subject).await?;
        info!("Reset style model for {}", subject);
        Ok(())
    }

    /// Completed recomputes since startup.
    pub fn recomputes(&self) -> u64 {
        self.recomputes.load(Ordering::Relaxed)
    }

    /// Wait for every background recompute spawned so far.
    pub async fn wait_idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Stop accepting work and drain what is running.
    pub async fn shutdown(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}
