//! WebSocket connection handling
//!
//! Each connection has one outbound queue. Everything addressed to the
//! connection (acks, forwards, stream frames, status broadcasts) goes through
//! that queue, so frames from one producer arrive in the order they were sent.

use crate::presence::{deliver, ConnectionHandle};
use crate::server::GatewayState;
use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::{SinkExt, StreamExt};
use huddle_core::{InboundEvent, OutboundEvent, StreamScope, Subject, UserId};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Serve an authenticated connection until either side closes it.
pub async fn handle_connection(socket: WebSocket, state: Arc<GatewayState>, user: UserId) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<OutboundEvent>();
    let handle = ConnectionHandle::new(user, tx);

    if let Err(e) = state.presence.register(&handle).await {
        warn!("Could not register {}: {}", handle.user, e);
        let _ = ws_tx.send(WsMessage::Close(None)).await;
        return;
    }
    info!("Client connected: {} ({})", handle.user, handle.id);

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(WsMessage::Text(text))) => {
                        match InboundEvent::parse(&text) {
                            Ok(event) => dispatch(&state, &handle, event).await,
                            Err(e) => warn!(
                                "Unparseable frame from {}: {} ({})",
                                handle.user,
                                text.chars().take(100).collect::<String>(),
                                e
                            ),
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) => {
                        info!("Client disconnected: {}", handle.user);
                        break;
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket error for {}: {}", handle.user, e);
                        break;
                    }
                    None => break,
                    _ => {} // Binary, Ping, Pong
                }
            }

            Some(event) = rx.recv() => {
                match event.to_json() {
                    Ok(json) => {
                        if ws_tx.send(WsMessage::Text(json)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("Could not encode {}: {}", event.name(), e),
                }
            }
        }
    }

    if let Err(e) = state.presence.deregister(&handle).await {
        warn!("Could not deregister {}: {}", handle.user, e);
    }
}

/// Act on one inbound event. Failures become scoped error events on the
/// originating connection; the connection stays open.
pub async fn dispatch(state: &GatewayState, handle: &ConnectionHandle, event: InboundEvent) {
    debug!("{} from {}", event.name(), handle.user);
    match event {
        InboundEvent::MessageSend {
            to_user_id,
            content,
        } => {
            if let Err(e) = state
                .router
                .route_direct(handle, to_user_id.clone(), content)
                .await
            {
                deliver(
                    handle,
                    OutboundEvent::MessageError {
                        error: e.client_message(),
                        to_user_id: Some(to_user_id),
                    },
                );
            }
        }

        InboundEvent::UserTyping { to_user_id } => {
            state.router.user_typing(handle, &to_user_id).await;
        }

        InboundEvent::UserCheckStatus { user_ids } => {
            state.router.check_status(handle, user_ids).await;
        }

        InboundEvent::AgentMessage { content } => {
            match state.router.route_to_companion(handle, content.clone()).await {
                Ok(_) => state.orchestrator.spawn_companion(handle.clone(), content),
                Err(e) => {
                    deliver(handle, StreamScope::Companion.error(None, e.client_message()));
                }
            }
        }

        InboundEvent::AgentReset {} => {
            match state.scheduler.reset(&Subject::User(handle.user.clone())).await {
                Ok(()) => {
                    deliver(handle, OutboundEvent::AgentReset {});
                }
                Err(e) => {
                    deliver(handle, StreamScope::Companion.error(None, e.client_message()));
                }
            }
        }

        InboundEvent::GroupMessageSend { group_id, content } => {
            if let Err(e) = state
                .router
                .route_group(handle, group_id.clone(), content)
                .await
            {
                deliver(
                    handle,
                    OutboundEvent::GroupMessageError {
                        group_id,
                        error: e.client_message(),
                    },
                );
            }
        }

        InboundEvent::GroupTyping { group_id } => {
            if let Err(e) = state.router.group_typing(handle, group_id.clone()).await {
                deliver(
                    handle,
                    OutboundEvent::GroupMessageError {
                        group_id,
                        error: e.client_message(),
                    },
                );
            }
        }

        InboundEvent::GroupAgentMention { group_id, content } => {
            match state
                .router
                .route_group(handle, group_id.clone(), content.clone())
                .await
            {
                Ok(_) => state
                    .orchestrator
                    .spawn_collective(handle.clone(), group_id, content),
                Err(e) => {
                    deliver(
                        handle,
                        StreamScope::Group(group_id).error(None, e.client_message()),
                    );
                }
            }
        }
    }
}
