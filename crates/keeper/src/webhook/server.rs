//! Inbound HTTP surface: the signed notification endpoint, signed admin
//! routes, and read-only reward lookups.

use std::sync::Arc;

use alloy_primitives::Address;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use launchpad_types::*;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use super::{verify_signature, Delivery, WebhookEvent};
use crate::airdrop::AirdropEngine;
use crate::deployment::DeploymentQueue;
use crate::error::KeeperError;
use crate::store::Store;

/// Shared handler state
#[derive(Clone)]
pub struct ApiState {
    pub secret: Arc<Vec<u8>>,
    pub events: mpsc::Sender<Delivery>,
    pub store: Arc<dyn Store>,
    pub queue: Arc<DeploymentQueue>,
    pub engine: Arc<AirdropEngine>,
}

/// Body of `POST /admin/launches`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterLaunch {
    pub id: FairLaunchId,
    pub creator: Address,
    pub name: String,
    pub ticker: String,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub socials: Vec<SocialAccount>,
}

#[derive(Debug, Deserialize)]
struct JobsQuery {
    state: Option<JobState>,
}

/// Build the router; `webhook_path` receives contract notifications
pub fn router(state: ApiState, webhook_path: &str) -> Router {
    Router::new()
        .route(webhook_path, post(receive_notification))
        .route("/health", get(health_handler))
        .route("/admin/jobs", get(list_jobs))
        .route("/admin/jobs/:id/requeue", post(requeue_job))
        .route("/admin/launches", post(register_launch))
        .route("/rewards/:user", get(user_rewards))
        .route("/rewards/:token/:index/:user", get(claim_proof))
        .with_state(state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

/// Reject unless the signature header matches the raw body
fn authenticate(state: &ApiState, headers: &HeaderMap, body: &[u8]) -> Result<(), KeeperError> {
    let signature = headers
        .get(WEBHOOK_SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| KeeperError::Unauthorized("missing signature header".to_string()))?;

    if !verify_signature(&state.secret, body, signature) {
        return Err(KeeperError::Unauthorized("signature mismatch".to_string()));
    }
    Ok(())
}

fn parse_address(value: &str) -> Result<Address, KeeperError> {
    value
        .parse::<Address>()
        .map_err(|e| KeeperError::BadPayload(format!("invalid address '{}': {}", value, e)))
}

async fn receive_notification(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), KeeperError> {
    if let Err(e) = authenticate(&state, &headers, &body) {
        warn!("Rejected webhook: {}", e);
        return Err(e);
    }

    let event: WebhookEvent = serde_json::from_slice(&body)?;
    let kind = event.kind();
    debug!(kind, "Webhook accepted");

    let (reply, result) = oneshot::channel();
    state
        .events
        .send(Delivery { event, reply })
        .await
        .map_err(|_| KeeperError::Unavailable)?;

    // 2xx only once applied; anything else makes the relayer redeliver
    let outcome = result
        .await
        .map_err(|_| KeeperError::Unavailable)?
        .map_err(KeeperError::Reconcile)?;
    Ok((StatusCode::OK, Json(json!({ "type": kind, "outcome": outcome.label() }))))
}

async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().timestamp(),
        "service": "launchpad-keeper"
    }))
}

async fn list_jobs(
    State(state): State<ApiState>,
    Query(query): Query<JobsQuery>,
    headers: HeaderMap,
) -> Result<Json<Value>, KeeperError> {
    authenticate(&state, &headers, &[])?;

    let job_state = query.state.unwrap_or(JobState::Failed);
    let jobs = state.queue.jobs(job_state).await?;
    Ok(Json(json!({ "state": job_state, "total": jobs.len(), "jobs": jobs })))
}

async fn requeue_job(
    State(state): State<ApiState>,
    Path(id): Path<FairLaunchId>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, KeeperError> {
    authenticate(&state, &headers, &body)?;

    if !state.queue.requeue(id, Utc::now()).await? {
        return Err(KeeperError::NotFound(format!("no failed deployment job for fair launch {}", id)));
    }
    Ok(Json(json!({ "requeued": id })))
}

async fn register_launch(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), KeeperError> {
    authenticate(&state, &headers, &body)?;

    let request: RegisterLaunch = serde_json::from_slice(&body)?;
    let mut launch = FairLaunch::new(request.id, request.creator, &request.name, &request.ticker, request.end_time);
    launch.socials = request.socials;

    if !state.store.insert_fair_launch(&launch).await? {
        return Ok((StatusCode::CONFLICT, Json(json!({ "error": format!("fair launch {} already registered", launch.id) }))));
    }

    info!(fair_launch_id = launch.id, ticker = %launch.ticker, "Fair launch registered");
    Ok((StatusCode::CREATED, Json(json!({ "registered": launch.id }))))
}

async fn user_rewards(
    State(state): State<ApiState>,
    Path(user): Path<String>,
) -> Result<Json<Value>, KeeperError> {
    let user = parse_address(&user)?;
    let rewards = state.engine.rewards_for(&user).await?;
    Ok(Json(json!({ "user": user, "total": rewards.len(), "rewards": rewards })))
}

async fn claim_proof(
    State(state): State<ApiState>,
    Path((token, index, user)): Path<(String, u64, String)>,
) -> Result<Json<RewardAllocation>, KeeperError> {
    let token = parse_address(&token)?;
    let user = parse_address(&user)?;

    state
        .engine
        .claim_for(&token, &user, index)
        .await?
        .map(Json)
        .ok_or_else(|| KeeperError::NotFound(format!("no unclaimed reward for {} in {}#{}", user, token, index)))
}
