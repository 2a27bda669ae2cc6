use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde_json::{Value, json};
use uuid::Uuid;

use super::{AccessRequest, ApiError, AppState, NewItemRequest, OptimizeRequest, ProtectRequest};
use crate::engine::Placement;
use crate::error::RetentionError;
use crate::memory::access::AccessRecord;
use crate::memory::protection::ProtectionEntry;
use crate::memory::types::{ItemId, ItemSnapshot, StorageTier, TrackedItem};
use crate::memory::weight::clamp_unit;
use crate::metrics::MetricsSnapshot;
use crate::optimizer::{OptimizationRunReport, OptimizerState};
use crate::signals::SignalReading;

type ApiResult<T> = std::result::Result<T, ApiError>;

fn parse_id(raw: &str) -> ApiResult<ItemId> {
    Uuid::parse_str(raw).map_err(|_| ApiError::bad_request(format!("Invalid item id: {raw}")))
}

pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "scheduler_running": state.engine.scheduler_running(),
    }))
}

pub async fn create_item_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewItemRequest>,
) -> ApiResult<(StatusCode, Json<Placement>)> {
    let placement = state
        .engine
        .classify_new_item(req.relevance, req.emotional_weight, &req.owner_id, &req.context_id)
        .await?;
    state.signals.push(
        placement.item_id,
        SignalReading {
            relevance: clamp_unit(req.relevance),
            emotional_weight: clamp_unit(req.emotional_weight),
        },
    );
    Ok((StatusCode::CREATED, Json(placement)))
}

pub async fn get_item_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<ItemSnapshot>> {
    let id = parse_id(&id)?;
    Ok(Json(state.engine.get_item(id)?))
}

pub async fn delete_item_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<TrackedItem>> {
    let id = parse_id(&id)?;
    let item = state.engine.untrack_item(id)?;
    state.signals.remove(id);
    Ok(Json(item))
}

pub async fn access_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<AccessRequest>,
) -> ApiResult<Json<AccessRecord>> {
    let id = parse_id(&id)?;
    Ok(Json(state.engine.record_access(id, req.latency_ms, req.was_hit)?))
}

/// Store fresh classifier signals for the next pass to pick up
pub async fn signals_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(reading): Json<SignalReading>,
) -> ApiResult<StatusCode> {
    let id = parse_id(&id)?;
    if !state.engine.core().index.contains(id) {
        return Err(RetentionError::ItemNotFound(id).into());
    }
    let reading = SignalReading {
        relevance: clamp_unit(reading.relevance),
        emotional_weight: clamp_unit(reading.emotional_weight),
    };
    state.signals.push(id, reading);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn protect_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<ProtectRequest>,
) -> ApiResult<Json<ProtectionEntry>> {
    let id = parse_id(&id)?;
    Ok(Json(state.engine.protect(id, &req.reason)?))
}

pub async fn unprotect_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let id = parse_id(&id)?;
    let was_protected = state.engine.unprotect(id)?;
    Ok(Json(json!({ "item_id": id, "was_protected": was_protected })))
}

pub async fn distribution_handler(
    State(state): State<Arc<AppState>>,
    Path(owner): Path<String>,
) -> Json<BTreeMap<StorageTier, usize>> {
    Json(state.engine.get_tier_distribution(&owner))
}

pub async fn protected_handler(
    State(state): State<Arc<AppState>>,
    Path(owner): Path<String>,
) -> Json<Value> {
    let items = state.engine.list_protected(&owner);
    Json(json!({ "owner_id": owner, "items": items }))
}

pub async fn optimize_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<OptimizeRequest>,
) -> ApiResult<Json<OptimizationRunReport>> {
    let report = state
        .engine
        .run_optimization_pass(req.owner_id.as_deref())
        .await?;
    Ok(Json(report))
}

pub async fn cancel_handler(State(state): State<Arc<AppState>>) -> StatusCode {
    state.engine.cancel_running_pass();
    StatusCode::ACCEPTED
}

pub async fn optimizer_state_handler(State(state): State<Arc<AppState>>) -> Json<OptimizerState> {
    Json(state.engine.optimizer_state())
}

pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> Json<MetricsSnapshot> {
    Json(state.engine.get_metrics())
}
