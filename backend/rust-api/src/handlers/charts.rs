use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use chrono::{FixedOffset, Utc};

use crate::{
    handlers::{ensure_user_access, ApiError},
    metrics::CHART_REQUESTS_TOTAL,
    middlewares::auth::JwtClaims,
    models::{chart::ChartQuery, ChartSeries},
    services::{chart_service, AppState, ChartDuration},
};

/// Largest real-world UTC offset, in minutes.
const MAX_TZ_OFFSET_MINUTES: i32 = 14 * 60;

pub(crate) async fn get_attempt_chart(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<JwtClaims>,
    Path(user_id): Path<String>,
    Query(query): Query<ChartQuery>,
) -> Result<Json<ChartSeries>, ApiError> {
    ensure_user_access(&claims, &user_id)?;

    let duration: ChartDuration = query.duration.as_deref().unwrap_or("1W").parse()?;
    let offset = parse_offset(query.tz_offset_minutes.unwrap_or(0))?;
    let now = Utc::now().with_timezone(&offset);

    CHART_REQUESTS_TOTAL
        .with_label_values(&[duration.as_str()])
        .inc();

    let store = state.attempt_store();
    let attempts = match duration.covered_since(&now)? {
        Some(since) => store.list_since(&user_id, since).await?,
        None => store.list_by_user_id(&user_id).await?,
    };
    let series = chart_service::attempt_series(&attempts, duration, &now)?;

    tracing::debug!(%user_id, %duration, attempts = attempts.len(), "chart series built");

    Ok(Json(series))
}

fn parse_offset(minutes: i32) -> Result<FixedOffset, ApiError> {
    if !(-MAX_TZ_OFFSET_MINUTES..=MAX_TZ_OFFSET_MINUTES).contains(&minutes) {
        return Err(ApiError::bad_request(format!(
            "tz_offset_minutes must be within ±{}",
            MAX_TZ_OFFSET_MINUTES
        )));
    }
    minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
        .ok_or_else(|| ApiError::bad_request("tz_offset_minutes is out of range"))
}
