//! Admin API for API key management
//!
//! Served on `server.admin_addr` when configured, otherwise mounted on the
//! main listener. Keys are persisted to the key store first and then applied
//! to the in-memory pool. Each store+pool mutation runs under one admin lock,
//! so concurrent calls apply to the pool in the order they hit the store.
//!
//! Endpoints:
//! - GET    /admin/keys         list redacted keys and the cursor position
//! - POST   /admin/keys         add a key
//! - POST   /admin/keys/remove  remove one key
//! - DELETE /admin/keys         remove every key

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use common::Secret;
use gemini::{GeminiClient, KeyStore};
use key_pool::KeyPool;

use crate::error::{ApiError, new_request_id};

/// Shared state for admin API handlers.
#[derive(Clone)]
pub struct AdminState {
    store: Arc<KeyStore>,
    pool: Arc<KeyPool<GeminiClient>>,
    mutation: Arc<Mutex<()>>,
}

impl AdminState {
    pub fn new(store: Arc<KeyStore>, pool: Arc<KeyPool<GeminiClient>>) -> Self {
        Self {
            store,
            pool,
            mutation: Arc::new(Mutex::new(())),
        }
    }
}

/// Build the admin axum router with all key management endpoints.
pub fn build_admin_router(state: AdminState) -> Router {
    Router::new()
        .route(
            "/admin/keys",
            get(list_keys).post(add_key).delete(clear_keys),
        )
        .route("/admin/keys/remove", post(remove_key))
        .with_state(state)
}

#[derive(Deserialize)]
struct KeyRequest {
    key: String,
}

fn json_response(status: StatusCode, body: serde_json::Value) -> Response {
    (
        status,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

/// Extract the trimmed key from the request body.
fn parse_key(payload: Result<axum::Json<KeyRequest>, JsonRejection>) -> Result<String, ApiError> {
    let axum::Json(body) = payload.map_err(|e| ApiError::InvalidRequest(e.body_text()))?;
    Ok(body.key.trim().to_string())
}

/// GET /admin/keys: redacted key list. Never exposes key material.
async fn list_keys(State(state): State<AdminState>) -> Response {
    let keys = state.pool.hints().await;
    let initialized = !keys.is_empty();
    json_response(
        StatusCode::OK,
        serde_json::json!({ "keys": keys, "initialized": initialized }),
    )
}

/// POST /admin/keys: trim, persist and add to the pool.
///
/// 201 when added, 200 when the key was already stored, 400 when blank.
async fn add_key(
    State(state): State<AdminState>,
    payload: Result<axum::Json<KeyRequest>, JsonRejection>,
) -> Response {
    let request_id = new_request_id();
    let key = match parse_key(payload) {
        Ok(k) => k,
        Err(e) => return e.into_response_with_id(&request_id),
    };
    if key.is_empty() {
        return ApiError::InvalidRequest("key must not be empty".into())
            .into_response_with_id(&request_id);
    }

    let hint = Secret::new(key.clone()).hint();
    let _guard = state.mutation.lock().await;
    match state.store.save_key(&key).await {
        Ok(Some(saved)) => {
            state.pool.add(&saved).await;
            let keys_total = state.pool.size().await;
            info!(key_hint = %hint, keys_total, "API key added");
            json_response(
                StatusCode::CREATED,
                serde_json::json!({ "status": "added", "hint": hint }),
            )
        }
        Ok(None) => json_response(
            StatusCode::OK,
            serde_json::json!({ "status": "exists", "hint": hint }),
        ),
        Err(e) => {
            warn!(key_hint = %hint, error = %e, "failed to persist API key");
            ApiError::from(e).into_response_with_id(&request_id)
        }
    }
}

/// POST /admin/keys/remove: remove one (trimmed) key from the store and the pool.
async fn remove_key(
    State(state): State<AdminState>,
    payload: Result<axum::Json<KeyRequest>, JsonRejection>,
) -> Response {
    let request_id = new_request_id();
    let key = match parse_key(payload) {
        Ok(k) => k,
        Err(e) => return e.into_response_with_id(&request_id),
    };

    let hint = Secret::new(key.clone()).hint();
    let _guard = state.mutation.lock().await;
    match state.store.remove_key(Some(&key)).await {
        Ok(true) => {
            state.pool.remove(Some(&key)).await;
            let keys_total = state.pool.size().await;
            info!(key_hint = %hint, keys_total, "API key removed");
            json_response(
                StatusCode::OK,
                serde_json::json!({ "status": "removed", "hint": hint }),
            )
        }
        Ok(false) => json_response(
            StatusCode::NOT_FOUND,
            serde_json::json!({ "status": "not_found", "hint": hint }),
        ),
        Err(e) => {
            warn!(key_hint = %hint, error = %e, "failed to remove API key");
            ApiError::from(e).into_response_with_id(&request_id)
        }
    }
}

/// DELETE /admin/keys: remove every key. Idempotent.
async fn clear_keys(State(state): State<AdminState>) -> Response {
    let request_id = new_request_id();
    let _guard = state.mutation.lock().await;
    if let Err(e) = state.store.remove_key(None).await {
        warn!(error = %e, "failed to clear API keys");
        return ApiError::from(e).into_response_with_id(&request_id);
    }
    state.pool.remove(None).await;
    info!("all API keys removed");
    json_response(StatusCode::OK, serde_json::json!({ "status": "cleared" }))
}
