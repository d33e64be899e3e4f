//! HTTP API
//!
//! Member identity comes from the `X-Member-Id` header set by the upstream
//! identity gateway. `/internal/*` routes are for the equipment tracker.

pub mod envelope;

use axum::{
    async_trait,
    body::Bytes,
    extract::{rejection::QueryRejection, FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    routing::{delete, get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use waitlist_core::{
    EntryId, EquipmentId, MemberId, PositionView, QueueCoordinator, QueueEntry, QueueEvent,
    QueueView,
};

pub use self::envelope::{ApiError, Envelope, ErrorBody};

pub const MEMBER_HEADER: &str = "x-member-id";

const DEFAULT_HISTORY_LIMIT: u32 = 50;
const MAX_HISTORY_LIMIT: u32 = 500;

type ApiResult<T> = std::result::Result<Envelope<T>, ApiError>;

/// Build the API router
pub fn router(coordinator: QueueCoordinator) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/equipment/:id/queue", post(join).get(queue))
        .route("/equipment/:id/queue/me", delete(leave))
        .route("/equipment/:id/queue/claim", post(claim))
        .route("/equipment/:id/queue/position", get(position))
        .route("/equipment/:id/queue/history", get(history))
        .route("/internal/equipment/:id/freed", post(freed))
        .method_not_allowed_fallback(method_not_allowed)
        .fallback(not_found)
        .with_state(coordinator)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// EXTRACTORS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Calling member, from `X-Member-Id`
#[derive(Debug, Clone)]
pub struct Member(pub MemberId);

#[async_trait]
impl<S> FromRequestParts<S> for Member
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(MEMBER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| Self(MemberId::new(value)))
            .ok_or_else(|| ApiError::bad_request("missing or blank X-Member-Id header"))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// PAYLOADS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct JoinRequest {
    display_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinResponse {
    pub position: u32,
    pub entry_id: EntryId,
    pub total_in_queue: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreedResponse {
    pub promoted: Option<QueueEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Deserialize)]
struct HistoryParams {
    limit: Option<u32>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// HANDLERS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn health() -> Envelope<HealthResponse> {
    Envelope::ok(HealthResponse {
        status: "ok".to_string(),
    })
}

async fn join(
    State(coordinator): State<QueueCoordinator>,
    Path(id): Path<String>,
    Member(member_id): Member,
    body: Bytes,
) -> ApiResult<JoinResponse> {
    let request = parse_join_body(&body)?;
    let display_name = request
        .display_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty());

    let outcome = coordinator
        .join(&EquipmentId::new(id), &member_id, display_name)
        .await?;

    Ok(Envelope::ok(JoinResponse {
        position: outcome.position,
        entry_id: outcome.entry.id,
        total_in_queue: outcome.total_in_queue,
    }))
}

async fn leave(
    State(coordinator): State<QueueCoordinator>,
    Path(id): Path<String>,
    Member(member_id): Member,
) -> ApiResult<QueueEntry> {
    let entry = coordinator.leave(&EquipmentId::new(id), &member_id).await?;
    Ok(Envelope::ok(entry))
}

async fn claim(
    State(coordinator): State<QueueCoordinator>,
    Path(id): Path<String>,
    Member(member_id): Member,
) -> ApiResult<QueueEntry> {
    let entry = coordinator.claim(&EquipmentId::new(id), &member_id).await?;
    Ok(Envelope::ok(entry))
}

async fn position(
    State(coordinator): State<QueueCoordinator>,
    Path(id): Path<String>,
    Member(member_id): Member,
) -> ApiResult<PositionView> {
    let view = coordinator
        .position(&EquipmentId::new(id), &member_id)
        .await?;
    Ok(Envelope::ok(view))
}

async fn queue(
    State(coordinator): State<QueueCoordinator>,
    Path(id): Path<String>,
) -> ApiResult<QueueView> {
    let view = coordinator.queue(&EquipmentId::new(id)).await?;
    Ok(Envelope::ok(view))
}

async fn history(
    State(coordinator): State<QueueCoordinator>,
    Path(id): Path<String>,
    params: Result<Query<HistoryParams>, QueryRejection>,
) -> ApiResult<Vec<QueueEvent>> {
    let Query(params) = params.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let limit = params.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    if limit == 0 || limit > MAX_HISTORY_LIMIT {
        return Err(ApiError::bad_request(format!(
            "limit must be 1-{MAX_HISTORY_LIMIT}"
        )));
    }

    let events = coordinator.history(&EquipmentId::new(id), limit).await?;
    Ok(Envelope::ok(events))
}

async fn freed(
    State(coordinator): State<QueueCoordinator>,
    Path(id): Path<String>,
) -> ApiResult<FreedResponse> {
    let promoted = coordinator.on_resource_freed(&EquipmentId::new(id)).await?;
    Ok(Envelope::ok(FreedResponse { promoted }))
}

async fn not_found() -> (StatusCode, Envelope<()>) {
    (
        StatusCode::NOT_FOUND,
        Envelope::failure(waitlist_core::ErrorKind::NotFound, "no such route"),
    )
}

async fn method_not_allowed() -> (StatusCode, Envelope<()>) {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Envelope::failure(
            waitlist_core::ErrorKind::InvalidRequest,
            "method not allowed for this route",
        ),
    )
}

/// An empty body means "no display name"
fn parse_join_body(body: &[u8]) -> Result<JoinRequest, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(JoinRequest::default());
    }
    serde_json::from_slice(body).map_err(|e| ApiError::bad_request(format!("invalid body: {e}")))
}
