use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use geo::{Coord, Rect};
use itertools::Itertools;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::{Config, PresentationPolicy};
use crate::coord::{self, Coordinate};
use crate::error::ScoringError;
use crate::model::{LandmarkCategory, NewReport, Route};
use crate::ranking::Ranking;
use crate::refresh::ReportFeed;
use crate::safety::SafetyScorer;
use crate::store::{ReportSink, SafetyStore};

/// Half-width, in degrees, of the box served by `/api/reports/nearby`.
const NEARBY_SPAN_DEG: f64 = 0.1;

// Cloned into every handler; the store behind it is shared.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ReportSink>,
    pub scorer: SafetyScorer,
    pub policy: PresentationPolicy,
    pub feed: watch::Receiver<Arc<ReportFeed>>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn ReportSink>,
        config: &Config,
        feed: watch::Receiver<Arc<ReportFeed>>,
    ) -> Self {
        Self {
            store,
            scorer: SafetyScorer::new(config.engine),
            policy: config.presentation,
            feed,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    // Allows a local HTML map client to talk to the API
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health))
        .route("/api/routes/safety-score", post(score_route))
        .route("/api/routes/rank", post(rank_routes))
        .route("/api/safety-points", get(list_landmarks))
        .route("/api/safety-points/:type", get(landmarks_by_type))
        .route("/api/reports", get(list_reports).post(submit_report))
        .route("/api/reports/nearby", get(nearby_reports))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// --- Errors ---

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Scoring(ScoringError),
    Internal(String),
}

impl From<ScoringError> for ApiError {
    fn from(e: ScoringError) -> Self {
        ApiError::Scoring(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        ApiError::Internal(format!("scoring task failed: {e}"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Scoring(e @ ScoringError::StoreUnavailable(_)) => {
                error!("{}", e);
                (StatusCode::SERVICE_UNAVAILABLE, e.to_string())
            }
            ApiError::Scoring(e) => (StatusCode::BAD_REQUEST, e.to_string()),
            ApiError::Internal(msg) => {
                error!("{}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };
        (status, Json(json!({ "success": false, "error": message }))).into_response()
    }
}

type ApiResult = Result<Json<Value>, ApiError>;

// --- API DTOs ---

#[derive(Deserialize)]
struct ScoreRequest {
    coordinates: Vec<Coordinate>,
}

#[derive(Deserialize)]
struct RankRequest {
    routes: Vec<Route>,
}

#[derive(Deserialize)]
struct FeedQuery {
    skip: Option<usize>,
    limit: Option<usize>,
}

#[derive(Deserialize)]
struct NearbyQuery {
    lat: Option<f64>,
    lng: Option<f64>,
}

// --- Handlers ---

async fn health() -> Json<Value> {
    Json(json!({ "success": true, "message": "Server is running" }))
}

async fn score_route(
    State(state): State<AppState>,
    payload: Result<Json<ScoreRequest>, JsonRejection>,
) -> ApiResult {
    let Json(request) = payload?;
    let route = Route::from_points(request.coordinates);

    let result = tokio::task::spawn_blocking(move || {
        let bounds = route.bounding_box(state.scorer.config().proximity_radius_km);
        let snapshot = state.store.snapshot(bounds.as_ref())?;
        Ok::<_, ScoringError>(state.scorer.score_route(&route, &snapshot))
    })
    .await??;

    Ok(Json(json!({
        "success": true,
        "score": result.score,
        "scoreDetails": {
            "rawScore": result.raw_score,
            "coordinatesChecked": result.coordinates_checked,
        }
    })))
}

async fn rank_routes(
    State(state): State<AppState>,
    payload: Result<Json<RankRequest>, JsonRejection>,
) -> ApiResult {
    let Json(request) = payload?;

    let ranking = tokio::task::spawn_blocking(move || {
        let all_points: Vec<Coordinate> = request
            .routes
            .iter()
            .flat_map(|r| r.coordinates.iter().copied())
            .collect();
        let bounds = coord::bounding_box(&all_points, state.scorer.config().proximity_radius_km);
        let snapshot = state.store.snapshot(bounds.as_ref())?;
        Ok::<_, ScoringError>(Ranking::rank(
            &request.routes,
            &snapshot,
            &state.scorer,
            &state.policy,
        ))
    })
    .await??;

    let safest = ranking.safest().map(|r| r.index);
    Ok(Json(json!({
        "success": true,
        "routes": ranking.routes,
        "safest": safest,
    })))
}

async fn list_landmarks(State(state): State<AppState>) -> ApiResult {
    let points = state.store.landmarks(None)?;
    Ok(Json(json!({ "success": true, "points": points })))
}

async fn landmarks_by_type(
    State(state): State<AppState>,
    Path(kind): Path<String>,
) -> ApiResult {
    let category: LandmarkCategory = kind.parse()?;
    let points: Vec<_> = state
        .store
        .landmarks(None)?
        .into_iter()
        .filter(|l| l.category == category)
        .collect();
    Ok(Json(json!({ "success": true, "points": points })))
}

async fn list_reports(
    State(state): State<AppState>,
    query: Result<Query<FeedQuery>, QueryRejection>,
) -> ApiResult {
    let Query(query) = query?;
    let skip = query.skip.unwrap_or(0);
    let limit = query.limit.unwrap_or(50);
    let feed = state.feed.borrow().clone();
    Ok(Json(json!({
        "success": true,
        "reports": feed.page(skip, limit),
        "total": feed.reports.len(),
        "skip": skip,
        "limit": limit,
        "refreshedAt": feed.refreshed_at,
    })))
}

async fn submit_report(
    State(state): State<AppState>,
    payload: Result<Json<NewReport>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(new) = payload?;
    let report = state.store.submit_report(new)?;
    info!(id = %report.id, category = ?report.category, "Report submitted");
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Report submitted successfully",
            "report": report,
        })),
    ))
}

async fn nearby_reports(
    State(state): State<AppState>,
    query: Result<Query<NearbyQuery>, QueryRejection>,
) -> ApiResult {
    let Query(query) = query?;
    let (Some(lat), Some(lng)) = (query.lat, query.lng) else {
        return Err(ApiError::BadRequest("lat and lng required".to_string()));
    };
    let center = Coordinate::new(lat, lng)?;
    let bounds = Rect::new(
        Coord {
            x: (center.lon() - NEARBY_SPAN_DEG).max(-180.0),
            y: (center.lat() - NEARBY_SPAN_DEG).max(-90.0),
        },
        Coord {
            x: (center.lon() + NEARBY_SPAN_DEG).min(180.0),
            y: (center.lat() + NEARBY_SPAN_DEG).min(90.0),
        },
    );
    let reports: Vec<_> = state
        .store
        .reports(Some(&bounds))?
        .into_iter()
        .sorted_by(|a, b| b.timestamp.cmp(&a.timestamp))
        .collect();
    Ok(Json(json!({ "success": true, "reports": reports })))
}
