use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Duration;
use validator::Validate;

use crate::{
    extractors::AppJson,
    handlers::{ensure_user_access, ApiError},
    metrics::{ATTEMPTS_DELETED_TOTAL, ATTEMPTS_RECORDED_TOTAL, ATTEMPT_COMMIT_CONFLICTS_TOTAL},
    middlewares::auth::JwtClaims,
    models::{
        attempt::{AttemptListResponse, DeleteQuestionAttemptsResponse, ListAttemptsQuery},
        Attempt, CreateAttemptRequest,
    },
    services::{AppState, AttemptStoreError},
    utils::retry::{retry_if, RetryConfig},
};

/// A century of history; anything wider is a client error.
const MAX_LOOKBACK_DAYS: u32 = 36_500;

pub(crate) async fn create_attempt(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(user_id): Path<String>,
    AppJson(payload): AppJson<CreateAttemptRequest>,
) -> Result<(StatusCode, Json<Attempt>), ApiError> {
    ensure_user_access(&claims, &user_id)?;
    payload.validate()?;

    let attempt = payload.into_attempt(&user_id);
    let store = state.attempt_store();

    with_commit_retry(&state, || store.add_attempt(&attempt)).await?;

    ATTEMPTS_RECORDED_TOTAL
        .with_label_values(&[if attempt.is_correct { "true" } else { "false" }])
        .inc();
    tracing::info!(
        user_id = %attempt.user_id,
        question_id = %attempt.question_id,
        attempt_id = %attempt.attempt_id,
        is_correct = attempt.is_correct,
        "attempt recorded"
    );

    Ok((StatusCode::CREATED, Json(attempt)))
}

pub(crate) async fn list_attempts(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(user_id): Path<String>,
    Query(query): Query<ListAttemptsQuery>,
) -> Result<Json<AttemptListResponse>, ApiError> {
    ensure_user_access(&claims, &user_id)?;
    let store = state.attempt_store();

    let attempts = match query.lookback_days {
        Some(days) => {
            store
                .list_with_lookback_window(&user_id, Some(lookback(days)?))
                .await?
        }
        None => store.list_by_user_id(&user_id).await?,
    };

    Ok(Json(AttemptListResponse::new(user_id, attempts)))
}

/// Lookback listing with the configured default window.
pub(crate) async fn list_recent_attempts(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(user_id): Path<String>,
    Query(query): Query<ListAttemptsQuery>,
) -> Result<Json<AttemptListResponse>, ApiError> {
    ensure_user_access(&claims, &user_id)?;

    let days = query.lookback_days.unwrap_or(state.config.lookback_days);
    let attempts = state
        .attempt_store()
        .list_with_lookback_window(&user_id, Some(lookback(days)?))
        .await?;

    Ok(Json(AttemptListResponse::new(user_id, attempts)))
}

pub(crate) async fn get_attempt(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path((user_id, attempt_id)): Path<(String, String)>,
) -> Result<Json<Attempt>, ApiError> {
    ensure_user_access(&claims, &user_id)?;
    let attempt = state
        .attempt_store()
        .get_attempt(&user_id, &attempt_id)
        .await?;
    Ok(Json(attempt))
}

pub(crate) async fn list_question_attempts(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path((user_id, question_id)): Path<(String, String)>,
) -> Result<Json<AttemptListResponse>, ApiError> {
    ensure_user_access(&claims, &user_id)?;
    let attempts = state
        .attempt_store()
        .list_by_question_id(&user_id, &question_id)
        .await?;
    Ok(Json(AttemptListResponse::new(user_id, attempts)))
}

pub(crate) async fn delete_attempt(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path((user_id, question_id, attempt_id)): Path<(String, String, String)>,
) -> Result<StatusCode, ApiError> {
    ensure_user_access(&claims, &user_id)?;
    let store = state.attempt_store();

    with_commit_retry(&state, || {
        store.delete_attempt(&user_id, &attempt_id, &question_id)
    })
    .await?;

    ATTEMPTS_DELETED_TOTAL.inc();
    tracing::info!(%user_id, %question_id, %attempt_id, "attempt deleted");

    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn delete_question_attempts(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path((user_id, question_id)): Path<(String, String)>,
) -> Result<Json<DeleteQuestionAttemptsResponse>, ApiError> {
    ensure_user_access(&claims, &user_id)?;
    let store = state.attempt_store();

    let deleted = with_commit_retry(&state, || {
        store.delete_question_attempts(&user_id, &question_id)
    })
    .await?;

    ATTEMPTS_DELETED_TOTAL.inc_by(deleted as u64);
    tracing::info!(%user_id, %question_id, deleted, "question attempts deleted");

    Ok(Json(DeleteQuestionAttemptsResponse {
        question_id,
        deleted,
    }))
}

/// Retries store writes aborted by a concurrent commit. Every other error is
/// returned on the first occurrence.
async fn with_commit_retry<F, Fut, T>(state: &AppState, op: F) -> Result<T, AttemptStoreError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, AttemptStoreError>>,
{
    let config = RetryConfig::with_max_attempts(state.config.commit_retries);
    retry_if(&config, op, |err| {
        let aborted = matches!(err, AttemptStoreError::TransactionAborted);
        if aborted {
            ATTEMPT_COMMIT_CONFLICTS_TOTAL.inc();
            tracing::debug!("commit aborted by a concurrent write, retrying");
        }
        aborted
    })
    .await
}

fn lookback(days: u32) -> Result<Duration, ApiError> {
    if days == 0 {
        return Err(ApiError::bad_request("lookback_days must be at least 1"));
    }
    if days > MAX_LOOKBACK_DAYS {
        return Err(ApiError::bad_request(format!(
            "lookback_days must be at most {}",
            MAX_LOOKBACK_DAYS
        )));
    }
    Ok(Duration::days(i64::from(days)))
}
