//! Thin JSON surface over the staleness gate.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use common::config::HallConfig;
use common::{calendar, meal_index, CalendarDay, MealIndex};
use menu_cache::{RefreshDecision, StalenessGate};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

#[derive(Clone)]
pub struct AppState {
    pub gate: StalenessGate,
    pub halls: Arc<Vec<HallConfig>>,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("cache unavailable, retry shortly")]
    Unavailable,

    #[error("crawl failed")]
    Crawl(#[source] common::Error),

    #[error("internal error")]
    Internal(#[source] common::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Crawl(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if let AppError::Crawl(e) | AppError::Internal(e) = &self {
            warn!("Request failed: {}", e);
        }

        (status, self.to_string()).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/menus", get(menus))
        .route("/api/calendar", get(calendar_view))
        .route("/fullcrawl", get(full_crawl))
        .route("/healthz", get(healthz))
        .with_state(state)
}

async fn menus(State(state): State<AppState>) -> Result<Response, AppError> {
    let snapshot = state.gate.read_snapshot();
    if snapshot.is_unpopulated() {
        return Err(AppError::Unavailable);
    }

    let body = serde_json::to_vec(snapshot.as_ref()).map_err(|e| AppError::Internal(e.into()))?;
    Ok(([(header::CONTENT_TYPE, "application/json")], body).into_response())
}

#[derive(Serialize)]
struct CalendarView<'a> {
    days: Vec<CalendarDay<'a>>,
    meals: MealIndex,
    halls: &'a [HallConfig],
}

async fn calendar_view(State(state): State<AppState>) -> Result<Response, AppError> {
    let snapshot = state.gate.read_snapshot();
    if snapshot.is_unpopulated() {
        return Err(AppError::Unavailable);
    }

    let view = CalendarView {
        days: calendar(&snapshot),
        meals: meal_index(&snapshot),
        halls: &state.halls,
    };
    Ok(Json(view).into_response())
}

#[derive(Deserialize)]
struct FullCrawlParams {
    #[serde(default)]
    wait: bool,
}

async fn full_crawl(
    State(state): State<AppState>,
    Query(params): Query<FullCrawlParams>,
) -> Result<String, AppError> {
    let decision = state
        .gate
        .force_refresh(params.wait)
        .await
        .map_err(AppError::Crawl)?;

    Ok(match decision {
        RefreshDecision::Completed(summary) => format!(
            "Crawled {} days: {} fetched, {} closed, {} failed in {:.1}s\n",
            summary.dates.len(),
            summary.fetched,
            summary.closed,
            summary.failed,
            summary.elapsed.as_secs_f64()
        ),
        RefreshDecision::JoinedInFlight => "Crawl already running; it has now finished\n".into(),
        RefreshDecision::Launched => "Crawl started\n".into(),
        RefreshDecision::AlreadyRunning => "Crawl already running\n".into(),
        RefreshDecision::Fresh => "Cache is fresh\n".into(),
    })
}

#[derive(Serialize)]
struct Health {
    state: String,
    refreshing: bool,
    age_secs: Option<i64>,
    days: usize,
}

async fn healthz(State(state): State<AppState>) -> Json<Health> {
    let snapshot = state.gate.store().read();
    Json(Health {
        state: state.gate.state().to_string(),
        refreshing: state.gate.is_refreshing(),
        age_secs: snapshot.age_secs(Utc::now()),
        days: snapshot.dates.len(),
    })
}
