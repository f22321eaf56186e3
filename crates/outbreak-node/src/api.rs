//! HTTP API for the node.

use crate::node::NodeState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use outbreak_engine::geo::{GeoPoint, GeographicLevel};
use outbreak_engine::resonance::{InteractionEvent, InteractionKind, Resonance};
use outbreak_engine::{
    Cluster, Error, InfectionEvent, InfectionRequest, LevelSummary, NewSeed, Notification,
    PropagationState, Seed,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

type AppState = Arc<NodeState>;

/// Build the API router.
pub fn build_router(state: AppState) -> Router {
    // CORS layer for browser access
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/v1/health", get(health))
        // Seeds
        .route("/api/v1/seeds", post(create_seed))
        .route("/api/v1/seeds/:id", get(get_seed))
        .route("/api/v1/seeds/:id/propagation", get(get_propagation))
        .route("/api/v1/seeds/:id/infections", post(infect))
        .route("/api/v1/seeds/:id/interactions", post(record_interaction))
        .route("/api/v1/seeds/:id/resonance", get(get_resonance))
        .route("/api/v1/seeds/:id/cluster", get(get_cluster))
        .route("/api/v1/seeds/:id/dormant", post(make_dormant))
        .route("/api/v1/seeds/:id/awaken", post(awaken))
        // Ladder
        .route("/api/v1/levels", get(list_levels))
        // Users
        .route("/api/v1/users/:id/vector", put(set_interest_vector))
        // Event source intake
        .route("/api/v1/notifications", post(notify))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Engine error rendered with a neutral message.
#[derive(Debug)]
pub struct ApiError(pub Error);

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: String,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            Error::SeedNotFound(_) => StatusCode::NOT_FOUND,
            Error::SeedExpired { .. } => StatusCode::GONE,
            Error::SeedDormant { .. } => StatusCode::LOCKED,
            Error::LevelLocked { .. } | Error::UnroutableLocation { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Error::DuplicateInfection { .. } => StatusCode::CONFLICT,
            Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Error::Persistence(_) | Error::Worker(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    fn code(&self) -> &'static str {
        match &self.0 {
            Error::SeedNotFound(_) => "seed_not_found",
            Error::SeedExpired { .. } => "seed_expired",
            Error::SeedDormant { .. } => "seed_dormant",
            Error::LevelLocked { .. } => "level_locked",
            Error::UnroutableLocation { .. } => "unroutable_location",
            Error::DuplicateInfection { .. } => "duplicate_infection",
            Error::InvalidInput(_) => "invalid_input",
            Error::Persistence(_) => "persistence",
            Error::Timeout(_) => "timeout",
            Error::Worker(_) => "worker",
        }
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(error = %self.0, "request failed");
        }
        let body = ErrorBody {
            error: self.0.public_message().to_string(),
            code: self.code().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// --- Health endpoints ---

async fn health() -> &'static str {
    "OK"
}

// --- Seed endpoints ---

async fn create_seed(
    State(state): State<AppState>,
    Json(draft): Json<NewSeed>,
) -> ApiResult<(StatusCode, Json<Seed>)> {
    let seed = state.engine.create_seed(draft).await?;
    Ok((StatusCode::CREATED, Json(seed)))
}

async fn get_seed(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Seed>> {
    Ok(Json(state.engine.seed(&id)?))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PropagationView {
    pub state: PropagationState,
    pub levels: Vec<LevelSummary>,
}

async fn get_propagation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<PropagationView>> {
    let view = PropagationView {
        state: state.engine.propagation(&id)?,
        levels: state.engine.level_summary(&id)?,
    };
    Ok(Json(view))
}

#[derive(Debug, Deserialize)]
pub struct InfectRequest {
    pub user_id: String,
    pub location: GeoPoint,
    #[serde(default)]
    pub source_user_id: Option<String>,
}

async fn infect(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<InfectRequest>,
) -> ApiResult<(StatusCode, Json<InfectionEvent>)> {
    let mut request = InfectionRequest::new(id, req.user_id, req.location);
    request.source_user_id = req.source_user_id;
    let event = state.engine.infect(request).await?;
    Ok((StatusCode::CREATED, Json(event)))
}

#[derive(Debug, Deserialize)]
pub struct InteractRequest {
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: InteractionKind,
    #[serde(default)]
    pub strength: Option<f64>,
    #[serde(default)]
    pub occurred_at: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InteractionOutcome {
    pub resonance: Resonance,
    pub cluster: Option<Cluster>,
}

async fn record_interaction(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<InteractRequest>,
) -> ApiResult<(StatusCode, Json<InteractionOutcome>)> {
    let event = InteractionEvent::new(
        id.clone(),
        req.user_id,
        req.kind,
        req.strength.unwrap_or(1.0),
        req.occurred_at.unwrap_or_else(|| state.engine.now()),
    );
    let cluster = state.engine.record_interaction(event).await?;
    let resonance = state.engine.luminosity(&id)?;
    Ok((StatusCode::CREATED, Json(InteractionOutcome { resonance, cluster })))
}

async fn get_resonance(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Resonance>> {
    Ok(Json(state.engine.luminosity(&id)?))
}

async fn get_cluster(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.engine.cluster(&id) {
        Ok(Some(cluster)) => Json(cluster).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ErrorBody {
                error: "no cluster yet".to_string(),
                code: "no_cluster".to_string(),
            }),
        )
            .into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct DormantRequest {
    #[serde(default)]
    pub until: Option<u64>,
}

async fn make_dormant(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<DormantRequest>,
) -> ApiResult<Json<Seed>> {
    Ok(Json(state.engine.make_dormant(&id, req.until).await?))
}

async fn awaken(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Seed>> {
    Ok(Json(state.engine.awaken(&id).await?))
}

// --- Ladder ---

async fn list_levels(State(state): State<AppState>) -> Json<Vec<GeographicLevel>> {
    Json(state.engine.ladder().levels().to_vec())
}

// --- Users ---

#[derive(Debug, Deserialize)]
pub struct InterestVector {
    pub vector: Vec<f32>,
}

async fn set_interest_vector(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(req): Json<InterestVector>,
) -> ApiResult<StatusCode> {
    if req.vector.iter().any(|x| !x.is_finite()) {
        return Err(ApiError(Error::InvalidInput("vector must be finite".into())));
    }
    state
        .store
        .set_interest_vector(&user_id, &req.vector)
        .map_err(|e| ApiError(e.into()))?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Notifications ---

async fn notify(
    State(state): State<AppState>,
    Json(notification): Json<Notification>,
) -> ApiResult<StatusCode> {
    state
        .notifications
        .try_send(notification)
        .map_err(|e| ApiError(Error::Persistence(format!("notification queue: {}", e))))?;
    Ok(StatusCode::ACCEPTED)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::RocksStore;
    use outbreak_engine::{EngineConfig, EventDispatcher, PropagationEngine, SeedKind};
    use tempfile::TempDir;

    fn state() -> (AppState, TempDir, EventDispatcher) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(RocksStore::open(dir.path()).unwrap());
        let engine = Arc::new(
            PropagationEngine::new(store.clone(), store.clone(), EngineConfig::default()).unwrap(),
        );
        let (notifications, dispatcher) = EventDispatcher::channel(engine.clone(), 4);
        let state = Arc::new(NodeState {
            engine,
            store,
            notifications,
        });
        (state, dir, dispatcher)
    }

    async fn seeded() -> (AppState, TempDir, Seed) {
        let (state, dir, _) = state();
        let draft = NewSeed::new("author", "news", SeedKind::Opinion, GeoPoint::new(40.0, -74.0));
        let (status, Json(seed)) = create_seed(State(state.clone()), Json(draft)).await.unwrap();
        assert_eq!(status, StatusCode::CREATED);
        (state, dir, seed)
    }

    #[test]
    fn status_mapping() {
        let cases = [
            (Error::SeedNotFound("x".into()), StatusCode::NOT_FOUND),
            (
                Error::LevelLocked {
                    seed_id: "x".into(),
                    level: 2,
                },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (Error::Persistence("down".into()), StatusCode::SERVICE_UNAVAILABLE),
            (
                Error::Timeout(std::time::Duration::from_secs(5)),
                StatusCode::GATEWAY_TIMEOUT,
            ),
        ];
        for (error, status) in cases {
            assert_eq!(ApiError(error).into_response().status(), status);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn locked_level_reads_neutral() {
        let (state, _dir, seed) = seeded().await;
        let far = seed.origin.offset_north_km(5.0);
        let req = InfectRequest {
            user_id: "u1".into(),
            location: far,
            source_user_id: None,
        };
        let err = infect(State(state), Path(seed.id), Json(req)).await.unwrap_err();
        assert_eq!(err.0.public_message(), "not yet reachable here");
        assert_eq!(err.code(), "level_locked");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn interaction_returns_resonance() {
        let (state, _dir, seed) = seeded().await;
        let req = InteractRequest {
            user_id: "u1".into(),
            kind: InteractionKind::Resonate,
            strength: None,
            occurred_at: None,
        };
        let (_, Json(outcome)) = record_interaction(State(state.clone()), Path(seed.id.clone()), Json(req))
            .await
            .unwrap();
        assert_eq!(outcome.resonance.luminosity, 100.0);
        assert!(outcome.cluster.is_none());

        let response = get_cluster(State(state), Path(seed.id)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn propagation_view_lists_levels() {
        let (state, _dir, seed) = seeded().await;
        let Json(view) = get_propagation(State(state.clone()), Path(seed.id)).await.unwrap();
        assert_eq!(view.levels.len(), 4);
        assert_eq!(view.state.total_infected, 1);

        let Json(levels) = list_levels(State(state)).await;
        assert_eq!(levels[1].name, "neighborhood");
    }

    #[tokio::test]
    async fn interest_vectors_are_stored() {
        let (state, _dir, _) = state();
        let req = InterestVector {
            vector: vec![0.5, 0.5],
        };
        let status = set_interest_vector(State(state.clone()), Path("u1".into()), Json(req))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(
            outbreak_engine::UserDirectory::interest_vector(state.store.as_ref(), "u1").unwrap(),
            Some(vec![0.5, 0.5])
        );
    }

    #[tokio::test]
    async fn notifications_are_queued() {
        let (state, _dir, _dispatcher) = state();
        let status = notify(
            State(state),
            Json(Notification::SeedCreated {
                seed_id: "abc".into(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::ACCEPTED);
    }
}
