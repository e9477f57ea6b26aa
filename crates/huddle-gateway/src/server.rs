//! Gateway server: shared state, HTTP routes, and the listener

use crate::auth::{authenticate, bearer_token, TokenQuery};
use crate::presence::PresenceRegistry;
use crate::router::MessageRouter;
use crate::stream::GenerationOrchestrator;
use crate::ws::handle_connection;
use axum::{
    extract::{Path, Query, State, WebSocketUpgrade},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use huddle_core::{Error, GroupNotification, HuddleConfig};
use huddle_llm::LlmProvider;
use huddle_store::{MessageStore, PresenceStore, SessionValidator};
use huddle_style::StyleScheduler;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Everything a connection or HTTP handler needs.
pub struct GatewayState {
    pub config: HuddleConfig,
    pub validator: Arc<dyn SessionValidator>,
    pub presence: Arc<PresenceRegistry>,
    pub scheduler: Arc<StyleScheduler>,
    pub router: Arc<MessageRouter>,
    pub orchestrator: Arc<GenerationOrchestrator>,
    pub started_at: Instant,
}

impl GatewayState {
    /// Wire the gateway components together over the given collaborators.
    pub fn new(
        config: HuddleConfig,
        store: Arc<dyn MessageStore>,
        presence_store: Arc<dyn PresenceStore>,
        validator: Arc<dyn SessionValidator>,
        provider: Arc<dyn LlmProvider>,
    ) -> Arc<Self> {
        let presence = Arc::new(PresenceRegistry::new(
            presence_store,
            Duration::from_secs(config.presence.ttl_secs),
        ));
        let scheduler = Arc::new(StyleScheduler::new(store.clone(), config.style.clone()));
        let router = Arc::new(MessageRouter::new(
            store,
            presence.clone(),
            scheduler.clone(),
        ));
        let orchestrator = Arc::new(GenerationOrchestrator::new(
            router.clone(),
            scheduler.clone(),
            provider,
            config.generation.clone(),
        ));

        Arc::new(Self {
            config,
            validator,
            presence,
            scheduler,
            router,
            orchestrator,
            started_at: Instant::now(),
        })
    }

    /// Wait for background generations and style recomputes to finish.
    pub async fn drain(&self) {
        self.orchestrator.shutdown().await;
        self.scheduler.shutdown().await;
    }
}

pub fn build_app(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .route("/groups/:group_id/events", post(group_events_handler))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Serve until ctrl-c, then drain background work.
pub async fn start_gateway(state: Arc<GatewayState>) -> anyhow::Result<()> {
    let server = &state.config.server;
    let bind_addr: SocketAddr = format!("{}:{}", server.bind.to_addr(), server.port).parse()?;

    info!("Huddle Gateway v{} starting", env!("CARGO_PKG_VERSION"));
    info!("  Listening on: {}", bind_addr);
    info!("  WebSocket: ws://{}/ws", bind_addr);
    info!("  Auth mode: {:?}", state.config.auth.mode);
    info!("  Model: {}", state.config.generation.model);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, build_app(state.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Draining background tasks");
    state.drain().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Could not listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}

/// The handshake is validated before upgrading; a rejected client gets a
/// plain 401 and never sees a socket.
async fn ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    Query(query): Query<TokenQuery>,
    State(state): State<Arc<GatewayState>>,
) -> Response {
    match authenticate(state.validator.as_ref(), &headers, &query).await {
        Ok(user) => ws
            .on_upgrade(move |socket| handle_connection(socket, state, user))
            .into_response(),
        Err(_) => (StatusCode::UNAUTHORIZED, "unauthorized").into_response(),
    }
}

async fn health_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "uptimeSecs": state.started_at.elapsed().as_secs(),
        "connections": state.presence.connection_count(),
        "styleRecomputes": state.scheduler.recomputes(),
        "repliesCompleted": state.orchestrator.completed(),
    }))
}

/// Membership changes pushed by the service that owns groups.
async fn group_events_handler(
    Path(group_id): Path<String>,
    headers: HeaderMap,
    State(state): State<Arc<GatewayState>>,
    Json(notification): Json<GroupNotification>,
) -> Response {
    if let Some(expected) = &state.config.auth.service_token {
        if bearer_token(&headers).as_deref() != Some(expected.as_str()) {
            return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
        }
    }

    match state.router.notify_group(group_id.into(), notification).await {
        Ok(reached) => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({ "delivered": reached })),
        )
            .into_response(),
        Err(Error::NotFound(what)) => {
            (StatusCode::NOT_FOUND, format!("{} not found", what)).into_response()
        }
        Err(e) => {
            warn!("Group notification failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.client_message()).into_response()
        }
    }
}
