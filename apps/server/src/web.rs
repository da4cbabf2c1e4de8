use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use light_schedule::{curve_value, point::HOURS_PER_DAY, AnchorPoint, PointError};
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{info, warn};

use crate::config::{update_interval, IntervalError};
use crate::coordinator::{Coordinator, InstanceStatus};
use crate::registry::Registry;

const DEFAULT_CURVE_STEP: f64 = 0.25;
const MIN_CURVE_STEP: f64 = 1.0 / 60.0;

#[derive(Clone)]
pub struct WebState {
    pub registry: Arc<Registry>,
    pub static_dir: PathBuf,
}

// Numbers may arrive as JSON numbers or as strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum LooseNumber {
    Int(i64),
    Float(f64),
    Text(String),
}

fn lenient_int<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    match LooseNumber::deserialize(deserializer)? {
        LooseNumber::Int(v) => Ok(v),
        LooseNumber::Float(v) if v.is_finite() => Ok(v.trunc() as i64),
        LooseNumber::Float(v) => Err(de::Error::custom(format!("expected an integer, got {}", v))),
        LooseNumber::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| de::Error::custom(format!("expected an integer, got {:?}", s))),
    }
}

fn lenient_float<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    match LooseNumber::deserialize(deserializer)? {
        LooseNumber::Int(v) => Ok(v as f64),
        LooseNumber::Float(v) => Ok(v),
        LooseNumber::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| de::Error::custom(format!("expected a number, got {:?}", s))),
    }
}

#[derive(Debug, Deserialize)]
pub struct PointRequest {
    #[serde(deserialize_with = "lenient_float")]
    pub hour: f64,
    #[serde(deserialize_with = "lenient_int")]
    pub brightness: i64,
}

impl PointRequest {
    fn validated(&self) -> Result<AnchorPoint, PointError> {
        AnchorPoint::validated(self.hour, self.brightness)
    }
}

#[derive(Debug, Deserialize)]
pub struct ScheduleRequest {
    pub schedule_points: Vec<PointRequest>,
}

impl ScheduleRequest {
    fn validated(&self) -> Result<Vec<AnchorPoint>, PointError> {
        self.schedule_points
            .iter()
            .map(PointRequest::validated)
            .collect()
    }
}

#[derive(Debug, Deserialize)]
pub struct OptionsRequest {
    pub update_interval: u64,
}

#[derive(Debug, Deserialize)]
pub struct CurveQuery {
    /// Hours between samples.
    pub step: Option<f64>,
}

/// One sample of the brightness curve, unrounded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurveSample {
    pub hour: f64,
    pub brightness: f64,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unknown scheduler: {0}")]
    NotFound(String),

    #[error("invalid schedule point: {0}")]
    InvalidPoint(#[from] PointError),

    #[error("invalid options: {0}")]
    InvalidOptions(#[from] IntervalError),

    #[error("curve step must be within 1/60..=24 hours, got {0}")]
    InvalidStep(f64),

    #[error("invalid request body: {}", .0.body_text())]
    BadBody(#[from] JsonRejection),

    #[error("invalid query: {}", .0.body_text())]
    BadQuery(#[from] QueryRejection),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::InvalidPoint(_) | ApiError::InvalidOptions(_) | ApiError::InvalidStep(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ApiError::BadBody(rejection) => rejection.status(),
            ApiError::BadQuery(rejection) => rejection.status(),
        };
        let body = Json(json!({
            "success": false,
            "error": self.to_string()
        }));
        (status, body).into_response()
    }
}

pub fn router(registry: Arc<Registry>, static_dir: PathBuf) -> Router {
    Router::new()
        .route("/", get(index_page))
        .route("/api/schedulers", get(list_schedulers))
        .route("/api/schedulers/:id", get(get_scheduler))
        .route("/api/schedulers/:id/curve", get(scheduler_curve))
        .route("/api/schedulers/:id/schedule", post(update_schedule))
        .route("/api/schedulers/:id/point", post(set_point))
        .route("/api/schedulers/:id/refresh", post(refresh))
        .route("/api/schedulers/:id/options", post(update_options))
        .route("/api/curve", post(preview_curve))
        .nest_service("/static", ServeDir::new(&static_dir))
        .layer(TraceLayer::new_for_http())
        .with_state(WebState {
            registry,
            static_dir,
        })
}

pub async fn serve(listen: String, registry: Arc<Registry>, static_dir: PathBuf) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(&listen)
        .await
        .with_context(|| format!("Failed to bind web server on {}", listen))?;
    info!(%listen, "web server listening");
    axum::serve(listener, router(registry, static_dir)).await?;
    Ok(())
}

/// Sample the curve of `points` from 0 to 24 hours inclusive.
pub fn sample_curve(points: &[AnchorPoint], step: f64) -> Vec<CurveSample> {
    let samples = (HOURS_PER_DAY / step).ceil() as usize;
    (0..=samples)
        .map(|i| {
            let hour = (i as f64 * step).min(HOURS_PER_DAY);
            CurveSample {
                hour,
                brightness: curve_value(hour, points),
            }
        })
        .collect()
}

fn curve_step(query: &CurveQuery) -> Result<f64, ApiError> {
    let step = query.step.unwrap_or(DEFAULT_CURVE_STEP);
    if (MIN_CURVE_STEP..=HOURS_PER_DAY).contains(&step) {
        Ok(step)
    } else {
        Err(ApiError::InvalidStep(step))
    }
}

fn scheduler(state: &WebState, id: &str) -> Result<Arc<Coordinator>, ApiError> {
    state
        .registry
        .get(id)
        .cloned()
        .ok_or_else(|| ApiError::NotFound(id.to_string()))
}

async fn index_page(State(state): State<WebState>) -> Response {
    let path = state.static_dir.join("index.html");
    match tokio::fs::read_to_string(&path).await {
        Ok(content) => Html(content).into_response(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read editor page");
            (StatusCode::NOT_FOUND, Html("Error loading page")).into_response()
        }
    }
}

async fn list_schedulers(State(state): State<WebState>) -> Json<Vec<InstanceStatus>> {
    let mut statuses = Vec::with_capacity(state.registry.len());
    for coordinator in state.registry.iter() {
        statuses.push(coordinator.status().await);
    }
    Json(statuses)
}

async fn get_scheduler(
    State(state): State<WebState>,
    Path(id): Path<String>,
) -> Result<Json<InstanceStatus>, ApiError> {
    let coordinator = scheduler(&state, &id)?;
    Ok(Json(coordinator.status().await))
}

async fn scheduler_curve(
    State(state): State<WebState>,
    Path(id): Path<String>,
    query: Result<Query<CurveQuery>, QueryRejection>,
) -> Result<Json<Vec<CurveSample>>, ApiError> {
    let coordinator = scheduler(&state, &id)?;
    let Query(query) = query?;
    let step = curve_step(&query)?;
    Ok(Json(sample_curve(&coordinator.points().await, step)))
}

async fn preview_curve(
    query: Result<Query<CurveQuery>, QueryRejection>,
    payload: Result<Json<ScheduleRequest>, JsonRejection>,
) -> Result<Json<Vec<CurveSample>>, ApiError> {
    let Query(query) = query?;
    let Json(request) = payload?;
    let step = curve_step(&query)?;
    let points = request.validated()?;
    Ok(Json(sample_curve(&points, step)))
}

async fn update_schedule(
    State(state): State<WebState>,
    Path(id): Path<String>,
    payload: Result<Json<ScheduleRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let coordinator = scheduler(&state, &id)?;
    let Json(request) = payload?;
    let points = request.validated()?;

    coordinator.update_schedule(points).await;
    Ok(Json(json!({
        "success": true,
        "schedule_points": coordinator.points().await
    })))
}

async fn set_point(
    State(state): State<WebState>,
    Path(id): Path<String>,
    payload: Result<Json<PointRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let coordinator = scheduler(&state, &id)?;
    let Json(request) = payload?;
    let point = request.validated()?;

    coordinator
        .set_schedule_point(point.hour, point.brightness)
        .await;
    Ok(Json(json!({
        "success": true,
        "schedule_points": coordinator.points().await
    })))
}

async fn refresh(
    State(state): State<WebState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    scheduler(&state, &id)?.request_refresh();
    Ok(Json(json!({
        "success": true
    })))
}

async fn update_options(
    State(state): State<WebState>,
    Path(id): Path<String>,
    payload: Result<Json<OptionsRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let coordinator = scheduler(&state, &id)?;
    let Json(request) = payload?;
    let interval = update_interval(request.update_interval)?;

    coordinator.set_update_interval(interval).await;
    Ok(Json(json!({
        "success": true,
        "update_interval": interval.as_secs()
    })))
}
