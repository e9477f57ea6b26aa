//! Generation stream orchestrator
//!
//! Runs one agent reply: checks the subject has enough history, refreshes its
//! style model, streams the provider's output to the audience and stores the
//! finished reply.
//!
//! Per stream the audience sees `stream-start`, then `stream-chunk` in
//! provider order, then `stream-end` whose `content` is the concatenation of
//! every chunk. A failed stream ends with the apology chunk and `*:error`
//! instead, and nothing is stored.

use crate::presence::{deliver, ConnectionHandle};
use crate::router::MessageRouter;
use futures::StreamExt;
use huddle_core::{
    ChatMessage, Error, GenerationConfig, GroupId, OutboundEvent, Recipient, Result, StreamScope,
    Subject, UserId,
};
use huddle_llm::{LlmProvider, LlmRequest, StreamDelta};
use huddle_style::StyleScheduler;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// How a generation ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Not enough eligible history; canned reply sent.
    NotEnoughData,
    /// History is there but no prompt could be rendered; canned reply sent.
    NoModel,
    /// Provider reply streamed and stored.
    Complete(ChatMessage),
    /// Provider failed; apology and error sent.
    Failed,
}

/// Who receives a stream.
struct Audience {
    handles: Vec<ConnectionHandle>,
}

impl Audience {
    /// Send to everyone still connected, dropping anyone who has gone.
    fn send(&mut self, event: OutboundEvent) {
        self.handles.retain(|h| deliver(h, event.clone()));
    }
}

/// One request to an agent.
struct Job {
    subject: Subject,
    scope: StreamScope,
    agent: UserId,
    recipient: Recipient,
    prompt: String,
}

pub struct GenerationOrchestrator {
    router: Arc<MessageRouter>,
    scheduler: Arc<StyleScheduler>,
    provider: Arc<dyn LlmProvider>,
    config: GenerationConfig,
    tracker: TaskTracker,
    completed: AtomicU64,
}

impl GenerationOrchestrator {
    pub fn new(
        router: Arc<MessageRouter>,
        scheduler: Arc<StyleScheduler>,
        provider: Arc<dyn LlmProvider>,
        config: GenerationConfig,
    ) -> Self {
        Self {
            router,
            scheduler,
            provider,
            config,
            tracker: TaskTracker::new(),
            completed: AtomicU64::new(0),
        }
    }

    /// Reply to `origin` as their companion.
    pub async fn companion(&self, origin: &ConnectionHandle, request: String) -> Outcome {
        let job = Job {
            subject: Subject::User(origin.user.clone()),
            scope: StreamScope::Companion,
            agent: UserId::companion(),
            recipient: Recipient::User(origin.user.clone()),
            prompt: request,
        };
        let audience = Audience {
            handles: vec![origin.clone()],
        };
        self.run(origin, job, audience).await
    }

    /// Reply to a mention of the group agent. The stream goes to every
    /// online member, including the one who mentioned it.
    pub async fn collective(
        &self,
        origin: &ConnectionHandle,
        group: GroupId,
        mention: String,
    ) -> Outcome {
        let scope = StreamScope::Group(group.clone());
        let audience = match self.router.members_for(&group, &origin.user).await {
            Ok(_) => match self.router.resolve_online(&Recipient::Group(group.clone())).await {
                Ok(handles) => Audience { handles },
                Err(e) => return self.reject(origin, &scope, e),
            },
            Err(e) => return self.reject(origin, &scope, e),
        };

        let job = Job {
            subject: Subject::Group(group.clone()),
            scope,
            agent: UserId::collective(),
            recipient: Recipient::Group(group),
            prompt: format!(
                "{} mentioned you in the group chat and said:\n\n{}\n\nReply to the group.",
                origin.user, mention
            ),
        };
        self.run(origin, job, audience).await
    }

    /// Run `companion` as a tracked background task.
    pub fn spawn_companion(self: &Arc<Self>, origin: ConnectionHandle, request: String) {
        let orchestrator = Arc::clone(self);
        self.tracker.spawn(async move {
            orchestrator.companion(&origin, request).await;
        });
    }

    /// Run `collective` as a tracked background task.
    pub fn spawn_collective(
        self: &Arc<Self>,
        origin: ConnectionHandle,
        group: GroupId,
        mention: String,
    ) {
        let orchestrator = Arc::clone(self);
        self.tracker.spawn(async move {
            orchestrator.collective(&origin, group, mention).await;
        });
    }

    fn reject(&self, origin: &ConnectionHandle, scope: &StreamScope, e: Error) -> Outcome {
        warn!("Generation for {} refused: {}", origin.user, e);
        deliver(origin, scope.error(None, e.client_message()));
        Outcome::Failed
    }

    async fn run(&self, origin: &ConnectionHandle, job: Job, mut audience: Audience) -> Outcome {
        let kind = job.subject.kind();

        let count = match self.scheduler.eligible_count(&job.subject).await {
            Ok(count) => count,
            Err(e) => return self.reject(origin, &job.scope, e),
        };
        if count < self.scheduler.minimum(kind) {
            debug!("{} has {} messages, not enough to generate", job.subject, count);
            self.canned(origin, &job.scope, &self.config.not_enough_data_text);
            return Outcome::NotEnoughData;
        }

        let model = match self.scheduler.ensure_fresh(&job.subject).await {
            Ok(model) => model,
            Err(e) => return self.reject(origin, &job.scope, e),
        };
        if !model.has_prompt() {
            self.canned(origin, &job.scope, &self.config.no_model_text);
            return Outcome::NoModel;
        }

        let stream_id = Uuid::new_v4();
        audience.send(job.scope.start(stream_id));

        let request = LlmRequest {
            max_tokens: Some(self.config.max_tokens),
            temperature: self.config.temperature,
            ..LlmRequest::single_turn(&self.config.model, &model.rendered_prompt, &job.prompt)
        };

        let content = match self.stream(request, &job.scope, stream_id, &mut audience).await {
            Ok(content) => content,
            Err(e) => {
                warn!("Generation for {} failed: {}", job.subject, e);
                self.fail(&job.scope, stream_id, &mut audience, e);
                return Outcome::Failed;
            }
        };

        let message = match self
            .router
            .record_generated(job.agent, job.recipient.clone(), content.clone())
            .await
        {
            Ok(message) => message,
            Err(e) => {
                audience.send(job.scope.error(Some(stream_id), e.client_message()));
                return Outcome::Failed;
            }
        };

        // The finished reply goes to whoever is online now.
        let mut recipients = match self.router.resolve_online(&job.recipient).await {
            Ok(handles) => Audience { handles },
            Err(e) => {
                warn!("Could not resolve recipients for {}: {}", job.subject, e);
                audience
            }
        };
        recipients.send(job.scope.end(stream_id, content, Some(message.clone())));

        self.completed.fetch_add(1, Ordering::Relaxed);
        info!(
            "{} replied to {} ({} chars)",
            message.sender_id,
            job.subject,
            message.content.chars().count()
        );
        Outcome::Complete(message)
    }

    /// Forward provider output. The provider stream is drained even after
    /// every listener has gone.
    async fn stream(
        &self,
        request: LlmRequest,
        scope: &StreamScope,
        stream_id: Uuid,
        audience: &mut Audience,
    ) -> Result<String> {
        let mut stream = self
            .provider
            .complete_stream(request)
            .await
            .map_err(|e| Error::GenerationFailure(e.to_string()))?;

        let mut content = String::new();
        while let Some(delta) = stream.next().await {
            match delta {
                Ok(StreamDelta::Text(text)) => {
                    if text.is_empty() {
                        continue;
                    }
                    content.push_str(&text);
                    audience.send(scope.chunk(stream_id, text));
                }
                Ok(StreamDelta::Done { stop_reason, .. }) => {
                    debug!("Stream {} done: {:?}", stream_id, stop_reason);
                    break;
                }
                Ok(StreamDelta::Error(e)) => return Err(Error::GenerationFailure(e)),
                Err(e) => return Err(Error::GenerationFailure(e.to_string())),
            }
        }

        if content.is_empty() {
            return Err(Error::GenerationFailure("empty reply".into()));
        }
        Ok(content)
    }

    fn fail(&self, scope: &StreamScope, stream_id: Uuid, audience: &mut Audience, e: Error) {
        audience.send(scope.chunk(stream_id, self.config.apology_text.clone()));
        audience.send(scope.error(Some(stream_id), e.client_message()));
    }

    /// A one-chunk stream to the requester only. Nothing is stored.
    fn canned(&self, origin: &ConnectionHandle, scope: &StreamScope, text: &str) {
        let stream_id = Uuid::new_v4();
        deliver(origin, scope.start(stream_id));
        deliver(origin, scope.chunk(stream_id, text));
        deliver(origin, scope.end(stream_id, text, None));
    }

    /// Replies stored since startup.
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Wait for every generation spawned so far.
    pub async fn wait_idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    pub async fn shutdown(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}
