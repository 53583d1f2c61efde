//! Saga trigger, callback and query endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::AggregateId;
use domain::Aggregate;
use event_store::EventStore;
use order_saga::{
    Leg, LegKind, OrderSaga, ParticipantClient, ProductInfo, SagaCoordinator, SagaReceipt,
};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

pub type SharedStore = Arc<dyn EventStore>;
pub type SharedParticipant = Arc<dyn ParticipantClient>;
pub type Coordinator = SagaCoordinator<SharedStore, SharedParticipant, SharedParticipant>;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub coordinator: Coordinator,
}

// -- Request types --

#[derive(Deserialize)]
pub struct StartSagaRequest {
    pub order_id: Option<String>,
    pub product: serde_json::Value,
}

#[derive(Deserialize)]
pub struct LegSuccessRequest {
    pub external_id: String,
}

#[derive(Deserialize)]
pub struct CauseRequest {
    pub cause: String,
}

// -- Response types --

#[derive(Serialize)]
pub struct NotificationResponse {
    pub participant: String,
    pub action: String,
    pub delivered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize)]
pub struct ReceiptResponse {
    pub saga_id: String,
    pub version: i64,
    pub status: String,
    pub notifications: Vec<NotificationResponse>,
}

impl From<SagaReceipt> for ReceiptResponse {
    fn from(receipt: SagaReceipt) -> Self {
        let notifications = receipt
            .notifications
            .outcomes
            .iter()
            .map(|outcome| NotificationResponse {
                participant: outcome.intent.leg().to_string(),
                action: outcome.intent.action().to_string(),
                delivered: outcome.result.is_ok(),
                error: outcome.result.as_ref().err().map(ToString::to_string),
            })
            .collect();

        Self {
            saga_id: receipt.saga_id.to_string(),
            version: receipt.version.as_i64(),
            status: receipt.status.to_string(),
            notifications,
        }
    }
}

#[derive(Serialize)]
pub struct LegResponse {
    pub status: String,
    pub external_id: Option<String>,
}

impl From<&Leg> for LegResponse {
    fn from(leg: &Leg) -> Self {
        Self {
            status: leg.status.to_string(),
            external_id: leg.external_id.clone(),
        }
    }
}

#[derive(Serialize)]
pub struct SagaResponse {
    pub saga_id: String,
    pub version: i64,
    pub status: String,
    pub product: Option<ProductInfo>,
    pub shipment: LegResponse,
    pub invoice: LegResponse,
    pub failure_cause: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl SagaResponse {
    fn new(saga_id: &AggregateId, saga: &OrderSaga) -> Self {
        Self {
            saga_id: saga_id.to_string(),
            version: saga.version().as_i64(),
            status: saga.status().to_string(),
            product: saga.product().cloned(),
            shipment: saga.shipment().into(),
            invoice: saga.invoice().into(),
            failure_cause: saga.failure_cause().map(String::from),
            started_at: saga.started_at(),
            finished_at: saga.finished_at(),
        }
    }
}

/// Response type for event envelope data.
#[derive(Serialize)]
pub struct EventEnvelopeResponse {
    pub event_id: String,
    pub event_type: String,
    pub aggregate_id: String,
    pub version: i64,
    pub timestamp: String,
    pub payload: serde_json::Value,
}

// -- Handlers --

/// POST /sagas: start the saga of an order.
#[tracing::instrument(skip(state, req))]
pub async fn start(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StartSagaRequest>,
) -> Result<(StatusCode, Json<ReceiptResponse>), ApiError> {
    let order_id = match req.order_id {
        Some(id) => parse_saga_id(&id)?,
        None => AggregateId::new(),
    };

    let receipt = state
        .coordinator
        .start(order_id, ProductInfo(req.product))
        .await?;

    Ok((StatusCode::CREATED, Json(receipt.into())))
}

/// GET /sagas/{id}: current state of a saga.
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SagaResponse>, ApiError> {
    let saga_id = parse_saga_id(&id)?;
    let saga = state
        .coordinator
        .get_saga(&saga_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Saga {id} not found")))?;

    Ok(Json(SagaResponse::new(&saga_id, &saga)))
}

/// GET /sagas/{id}/events: event log of a saga.
#[tracing::instrument(skip(state))]
pub async fn events(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<EventEnvelopeResponse>>, ApiError> {
    let saga_id = parse_saga_id(&id)?;
    let envelopes = state.coordinator.saga_events(&saga_id).await?;

    let responses = envelopes
        .into_iter()
        .map(|e| EventEnvelopeResponse {
            event_id: e.event_id.to_string(),
            event_type: e.event_type,
            aggregate_id: e.aggregate_id.to_string(),
            version: e.version.as_i64(),
            timestamp: e.timestamp.to_rfc3339(),
            payload: e.payload,
        })
        .collect();

    Ok(Json(responses))
}

/// POST /sagas/{id}/{leg}/success: a participant finished its action.
#[tracing::instrument(skip(state, req))]
pub async fn leg_success(
    State(state): State<Arc<AppState>>,
    Path((id, leg)): Path<(String, String)>,
    Json(req): Json<LegSuccessRequest>,
) -> Result<Json<ReceiptResponse>, ApiError> {
    let saga_id = parse_saga_id(&id)?;
    let leg = parse_leg(&leg)?;
    if req.external_id.trim().is_empty() {
        return Err(ApiError::BadRequest("external_id must not be empty".to_string()));
    }

    let receipt = state
        .coordinator
        .report_leg_success(leg, &saga_id, req.external_id)
        .await?;
    Ok(Json(receipt.into()))
}

/// POST /sagas/{id}/{leg}/failure: a participant could not perform its action.
#[tracing::instrument(skip(state, req))]
pub async fn leg_failure(
    State(state): State<Arc<AppState>>,
    Path((id, leg)): Path<(String, String)>,
    Json(req): Json<CauseRequest>,
) -> Result<Json<ReceiptResponse>, ApiError> {
    let saga_id = parse_saga_id(&id)?;
    let leg = parse_leg(&leg)?;

    let receipt = state
        .coordinator
        .report_leg_failure(leg, &saga_id, req.cause)
        .await?;
    Ok(Json(receipt.into()))
}

/// POST /sagas/{id}/{leg}/compensated: a participant undid its action.
#[tracing::instrument(skip(state))]
pub async fn leg_compensated(
    State(state): State<Arc<AppState>>,
    Path((id, leg)): Path<(String, String)>,
) -> Result<Json<ReceiptResponse>, ApiError> {
    let saga_id = parse_saga_id(&id)?;
    let leg = parse_leg(&leg)?;

    let receipt = state
        .coordinator
        .notify_leg_compensated(leg, &saga_id)
        .await?;
    Ok(Json(receipt.into()))
}

/// POST /sagas/{id}/complete
#[tracing::instrument(skip(state))]
pub async fn complete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ReceiptResponse>, ApiError> {
    let saga_id = parse_saga_id(&id)?;
    let receipt = state.coordinator.complete(&saga_id).await?;
    Ok(Json(receipt.into()))
}

/// POST /sagas/{id}/compensate: undo every leg of the saga.
#[tracing::instrument(skip(state, req))]
pub async fn compensate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<CauseRequest>,
) -> Result<Json<ReceiptResponse>, ApiError> {
    let saga_id = parse_saga_id(&id)?;
    let receipt = state
        .coordinator
        .init_compensation(&saga_id, req.cause)
        .await?;
    Ok(Json(receipt.into()))
}

fn parse_saga_id(id: &str) -> Result<AggregateId, ApiError> {
    AggregateId::parse(id)
        .ok_or_else(|| ApiError::BadRequest("saga id must not be empty".to_string()))
}

fn parse_leg(leg: &str) -> Result<LegKind, ApiError> {
    leg.parse::<LegKind>()
        .map_err(|e| ApiError::BadRequest(e.to_string()))
}
