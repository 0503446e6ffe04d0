//! Bucket ingestion, retrieval and purge routes.
//!
//! `/data*` routes work on calendar-dated buckets, `/data-unix*` routes on
//! epoch-dated buckets.

use crate::{ApiError, RouterState};
use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use common::interval::{self, Granularity};
use common::{Bucket, DateRepresentation, Measurement};
use purger::PurgeOutcome;
use serde::Deserialize;
use serde_json::json;

/// Query parameters of an explicit-range purge
#[derive(Debug, Deserialize)]
pub struct RangeParams {
    #[serde(rename = "startDate")]
    pub start_date: Option<String>,
    #[serde(rename = "endDate")]
    pub end_date: Option<String>,
}

/// Validate `:type`/`:value` before anything touches the store.
fn parse_selection(kind: &str, value: &str) -> Result<(Granularity, i64), ApiError> {
    let granularity = kind.parse::<Granularity>()?;
    let value = interval::parse_value(value)?;
    Ok((granularity, value))
}

async fn insert<S: RouterState>(
    state: &S,
    representation: DateRepresentation,
) -> Result<Json<Vec<Measurement>>, ApiError> {
    let bucket = state.ingest().ingest(representation).await?;
    Ok(Json(bucket.measurements))
}

async fn query<S: RouterState>(
    state: &S,
    representation: DateRepresentation,
    kind: &str,
    value: &str,
) -> Result<Json<Vec<Bucket>>, ApiError> {
    let (granularity, value) = parse_selection(kind, value)?;
    let buckets = state
        .retrieval()
        .query(representation, granularity, value)
        .await?;
    Ok(Json(buckets))
}

async fn purge<S: RouterState>(
    state: &S,
    representation: DateRepresentation,
    kind: &str,
    value: &str,
) -> Result<String, ApiError> {
    let (granularity, value) = parse_selection(kind, value)?;

    match state
        .purge()
        .purge_granularity(representation, granularity, value)
        .await?
    {
        PurgeOutcome::NothingToPurge { .. } => Err(ApiError::NotFound(format!(
            "No data found for {granularity} {value}"
        ))),
        PurgeOutcome::Purged(report) => Ok(format!(
            "Data for {granularity} {value} has been backed up and deleted (backup: {})",
            report.artifact.path
        )),
    }
}

async fn purge_range<S: RouterState>(
    state: &S,
    representation: DateRepresentation,
    params: &RangeParams,
) -> Result<Json<serde_json::Value>, ApiError> {
    let outcome = state
        .purge()
        .purge_range(
            representation,
            params.start_date.as_deref(),
            params.end_date.as_deref(),
        )
        .await?;

    match outcome {
        PurgeOutcome::NothingToPurge { interval } => Err(ApiError::NotFound(format!(
            "No data found between {} and {}",
            interval.start.to_rfc3339(),
            interval.end.to_rfc3339()
        ))),
        PurgeOutcome::Purged(report) => Ok(Json(json!({
            "message": "Data has been backed up and deleted",
            "backup": report.artifact.path,
            "deleted": report.deleted,
            "start": report.interval.start.to_rfc3339(),
            "end": report.interval.end.to_rfc3339(),
        }))),
    }
}

/// POST /insert-dummy
///
/// Synthesize today's bucket with a calendar date; returns its measurements
#[tracing::instrument]
pub async fn insert_calendar<S: RouterState>(
    State(state): State<S>,
) -> Result<impl IntoResponse, ApiError> {
    insert(&state, DateRepresentation::Calendar).await
}

/// POST /insert-unix
///
/// Same as `/insert-dummy` with the date stored as epoch milliseconds
#[tracing::instrument]
pub async fn insert_epoch<S: RouterState>(
    State(state): State<S>,
) -> Result<impl IntoResponse, ApiError> {
    insert(&state, DateRepresentation::Epoch).await
}

/// GET /data/:type/:value
#[tracing::instrument]
pub async fn get_calendar<S: RouterState>(
    State(state): State<S>,
    Path((kind, value)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    query(&state, DateRepresentation::Calendar, &kind, &value).await
}

/// GET /data-unix/:type/:value
#[tracing::instrument]
pub async fn get_epoch<S: RouterState>(
    State(state): State<S>,
    Path((kind, value)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    query(&state, DateRepresentation::Epoch, &kind, &value).await
}

/// DELETE /data/:type/:value
///
/// Back up and delete the calendar buckets of the selected interval
#[tracing::instrument]
pub async fn purge_calendar<S: RouterState>(
    State(state): State<S>,
    Path((kind, value)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    purge(&state, DateRepresentation::Calendar, &kind, &value).await
}

/// DELETE /data-unix/:type/:value
#[tracing::instrument]
pub async fn purge_epoch<S: RouterState>(
    State(state): State<S>,
    Path((kind, value)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    purge(&state, DateRepresentation::Epoch, &kind, &value).await
}

/// DELETE /data?startDate=&endDate=
#[tracing::instrument]
pub async fn purge_calendar_range<S: RouterState>(
    State(state): State<S>,
    Query(params): Query<RangeParams>,
) -> Result<impl IntoResponse, ApiError> {
    purge_range(&state, DateRepresentation::Calendar, &params).await
}

/// DELETE /data-unix?startDate=&endDate=
#[tracing::instrument]
pub async fn purge_epoch_range<S: RouterState>(
    State(state): State<S>,
    Query(params): Query<RangeParams>,
) -> Result<impl IntoResponse, ApiError> {
    purge_range(&state, DateRepresentation::Epoch, &params).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::IntervalError;

    #[test]
    fn test_parse_selection() {
        assert_eq!(
            parse_selection("month", "11").unwrap(),
            (Granularity::Month, 11)
        );
        assert!(matches!(
            parse_selection("hour", "1"),
            Err(ApiError::Input(IntervalError::InvalidGranularity(_)))
        ));
        assert!(matches!(
            parse_selection("day", "tomorrow"),
            Err(ApiError::Input(IntervalError::InvalidValue(_)))
        ));
    }
}
