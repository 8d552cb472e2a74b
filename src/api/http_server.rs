// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use axum::{
    extract::{rejection::JsonRejection, Json, State},
    http::HeaderMap,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use std::{future::Future, net::SocketAddr, sync::Arc};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::echo::{EchoRequest, EchoResponse, ECHO_PATH};
use super::errors::ApiError;
use crate::negotiation::field_hook::{DecodedPayload, FieldCryptoHook, FieldTag};
use crate::negotiation::server::NegotiationResponder;
use crate::negotiation::types::{
    NegotiationRequest, NegotiationResponse, SessionRole, DATA_KEY_HEADER, SESSION_ID_HEADER,
    TOKEN_HEADER,
};

#[derive(Clone)]
pub struct AppState {
    pub responder: Arc<NegotiationResponder>,
    pub hook: FieldCryptoHook,
}

impl AppState {
    pub fn new(responder: Arc<NegotiationResponder>) -> Self {
        let hook = FieldCryptoHook::new(responder.config().decrypt_failure_policy);
        Self { responder, hook }
    }
}

/// Build the node's router
pub fn router(state: AppState) -> Router {
    let negotiation_path = state.responder.config().negotiation_path.clone();
    Router::new()
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route(&negotiation_path, post(negotiate_handler))
        .route(ECHO_PATH, post(secured_echo_handler))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Serve until `shutdown` resolves
pub async fn start_server<F>(addr: SocketAddr, state: AppState, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Negotiation server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let cache = state.responder.cache();
    Json(json!({
        "status": "ok",
        "server_sessions": cache.count(SessionRole::Server).await,
    }))
}

async fn version_handler() -> impl IntoResponse {
    Json(crate::version::get_version_info())
}

async fn negotiate_handler(
    State(state): State<AppState>,
    request: Result<Json<NegotiationRequest>, JsonRejection>,
) -> Result<Json<NegotiationResponse>, ApiError> {
    let Json(request) = request?;
    tracing::debug!("Negotiation request for session {}", request.session_id);
    let response = state.responder.respond(&request).await?;
    Ok(Json(response))
}

async fn secured_echo_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(body) = body?;
    let context = state
        .responder
        .open_request(
            header(&headers, SESSION_ID_HEADER),
            header(&headers, TOKEN_HEADER),
            header(&headers, DATA_KEY_HEADER),
        )
        .await?;

    let decoded: DecodedPayload<EchoRequest> =
        state
            .hook
            .open(body, FieldTag::RequestSensitive, &context.request)?;
    if decoded.is_degraded() {
        tracing::warn!(
            "⚠️ Echo request on session {} had undecryptable fields: {:?}",
            context.session.session_id(),
            decoded.degraded_fields
        );
    }

    let reply = EchoResponse {
        message: decoded.value.message,
        session_id: context.session.session_id().to_string(),
        scheme: context.session.encryption_scheme().to_string(),
        received_at_ms: state.responder.cache().clock().now_millis(),
    };
    let sealed = state
        .hook
        .seal(&reply, FieldTag::ResponseSensitive, &context.response)?;
    Ok(Json(sealed))
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
}
