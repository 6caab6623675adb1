use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use super::domain::{MetricSnapshot, RuleDefinition, RuleScope};
use super::repository::{ActionHistoryStore, AwardLedger, RuleRepository};
use super::service::{EngagementEvent, ScoringService, ScoringServiceError};

/// Router builder exposing evaluation and catalog endpoints.
pub fn criteria_router<R, H, L>(service: Arc<ScoringService<R, H, L>>) -> Router
where
    R: RuleRepository + 'static,
    H: ActionHistoryStore + 'static,
    L: AwardLedger + 'static,
{
    Router::new()
        .route(
            "/api/v1/engagement/evaluate",
            post(engagement_handler::<R, H, L>),
        )
        .route("/api/v1/badges/evaluate", post(badge_handler::<R, H, L>))
        .route("/api/v1/rules", get(rules_handler::<R, H, L>))
        .route("/api/v1/rules/refresh", post(refresh_handler::<R, H, L>))
        .with_state(service)
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RulesQuery {
    #[serde(default)]
    pub(crate) scope: Option<String>,
}

pub(crate) async fn engagement_handler<R, H, L>(
    State(service): State<Arc<ScoringService<R, H, L>>>,
    axum::Json(event): axum::Json<EngagementEvent>,
) -> Response
where
    R: RuleRepository + 'static,
    H: ActionHistoryStore + 'static,
    L: AwardLedger + 'static,
{
    match service.score_engagement(event, Utc::now()) {
        Ok(result) => (StatusCode::OK, axum::Json(result)).into_response(),
        Err(error) => service_error_response(error),
    }
}

pub(crate) async fn badge_handler<R, H, L>(
    State(service): State<Arc<ScoringService<R, H, L>>>,
    axum::Json(snapshot): axum::Json<MetricSnapshot>,
) -> Response
where
    R: RuleRepository + 'static,
    H: ActionHistoryStore + 'static,
    L: AwardLedger + 'static,
{
    match service.evaluate_badges(snapshot, Utc::now()) {
        Ok(evaluation) => (StatusCode::OK, axum::Json(evaluation)).into_response(),
        Err(error) => service_error_response(error),
    }
}

pub(crate) async fn rules_handler<R, H, L>(
    State(service): State<Arc<ScoringService<R, H, L>>>,
    Query(query): Query<RulesQuery>,
) -> Response
where
    R: RuleRepository + 'static,
    H: ActionHistoryStore + 'static,
    L: AwardLedger + 'static,
{
    let catalog = service.catalog();
    let rules: Vec<RuleDefinition> = match query.scope.as_deref() {
        Some(raw) => match raw.parse::<RuleScope>() {
            Ok(scope) => catalog.list_active(&scope).cloned().collect(),
            Err(error) => {
                let payload = json!({ "error": error.to_string() });
                return (StatusCode::BAD_REQUEST, axum::Json(payload)).into_response();
            }
        },
        None => catalog.active_rules().cloned().collect(),
    };

    (StatusCode::OK, axum::Json(json!({ "rules": rules }))).into_response()
}

pub(crate) async fn refresh_handler<R, H, L>(
    State(service): State<Arc<ScoringService<R, H, L>>>,
) -> Response
where
    R: RuleRepository + 'static,
    H: ActionHistoryStore + 'static,
    L: AwardLedger + 'static,
{
    match service.refresh_catalog() {
        Ok(report) => (StatusCode::OK, axum::Json(report)).into_response(),
        Err(ScoringServiceError::Rules(error)) => {
            let payload = json!({ "error": error.to_string() });
            (StatusCode::SERVICE_UNAVAILABLE, axum::Json(payload)).into_response()
        }
        Err(other) => service_error_response(other),
    }
}

fn service_error_response(error: ScoringServiceError) -> Response {
    let payload = json!({ "error": error.to_string() });
    (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response()
}
