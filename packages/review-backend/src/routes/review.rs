use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use chrono::Utc;
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::models::ReviewResult;
use crate::response::AppError;
use crate::services::ReviewError;
use crate::state::AppState;

const MAX_PAGE_SIZE: i64 = 100;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/due-items", get(due_items))
        .route("/submit", post(submit))
        .route("/add-item", post(add_item))
}

#[derive(Debug, Deserialize)]
struct DueItemsQuery {
    limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct SubmitRequest {
    item_id: String,
    quality: i64,
}

#[derive(Debug, Deserialize)]
struct AddItemQuery {
    vocab_id: String,
}

async fn due_items(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    query: Result<Query<DueItemsQuery>, QueryRejection>,
) -> Result<Response, AppError> {
    let Query(query) = query.map_err(|err| AppError::validation(err.body_text()))?;
    let limit = query
        .limit
        .unwrap_or(state.config().review.session_limit)
        .clamp(1, MAX_PAGE_SIZE);

    let due = state
        .review()
        .select_due(&user.id, Utc::now(), limit)
        .await
        .map_err(review_error)?;

    Ok(Json(due).into_response())
}

async fn submit(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    payload: Result<Json<SubmitRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(payload) = payload.map_err(|err| AppError::validation(err.body_text()))?;
    if payload.item_id.trim().is_empty() {
        return Err(AppError::validation("item_id must not be empty"));
    }

    let updated = state
        .review()
        .submit_review(&user.id, &payload.item_id, payload.quality, Utc::now())
        .await
        .map_err(review_error)?;

    Ok(Json(ReviewResult::from(&updated)).into_response())
}

async fn add_item(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    query: Result<Query<AddItemQuery>, QueryRejection>,
) -> Result<Response, AppError> {
    let Query(query) = query.map_err(|err| AppError::validation(err.body_text()))?;

    let item = state
        .review()
        .ensure_review_state(&user.id, query.vocab_id.trim(), Utc::now())
        .await
        .map_err(review_error)?;

    Ok(Json(item).into_response())
}

fn review_error(err: ReviewError) -> AppError {
    match err {
        ReviewError::InvalidQuality(value) => AppError::invalid_quality(format!(
            "quality must be one of 1 (hard), 3 (good) or 5 (easy), got {value}"
        )),
        // Another learner's item answers exactly like a missing one.
        ReviewError::NotFound(_) | ReviewError::Forbidden(_) => {
            AppError::not_found("review item not found")
        }
        ReviewError::SessionComplete => AppError::bad_request("review session has no remaining items"),
        ReviewError::Transient(message) => {
            tracing::warn!(error = %message, "transient review store failure");
            AppError::transient("review store is busy, fetch the item again and retry")
        }
        ReviewError::InvalidState(message) => {
            tracing::error!(error = %message, "stored review state violates scheduler invariants");
            AppError::internal(message)
        }
        ReviewError::Sql(source) => {
            tracing::warn!(error = %source, "review store query failed");
            AppError::internal(source.to_string())
        }
    }
}
