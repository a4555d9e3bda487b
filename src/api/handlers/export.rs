use crate::api::handlers::series::parse_hours;
use crate::error::{AppError, Result};
use crate::export::{file_name, CsvFormat};
use crate::ws::AppState;
use axum::{
    body::Body,
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use futures::{stream, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};

/// Stream the selected window as CSV, header row first, ascending by time.
pub async fn export_csv(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response> {
    let param = |key: &str| params.get(key).map(String::as_str);

    let format = CsvFormat::from_params(
        param("sep"),
        param("decimal"),
        param("timefmt"),
        param("cols"),
    )?;

    let aggregate = match param("aggregate").map(str::to_ascii_lowercase).as_deref() {
        None | Some("raw") => false,
        Some("minute") => true,
        Some(other) => {
            return Err(AppError::Validation(format!(
                "aggregate must be 'raw' or 'minute', got '{}'",
                other
            )))
        }
    };

    let to = parse_time(&params, "to")?;
    let (from, to) = match parse_time(&params, "from")? {
        Some(from) => (from, to.unwrap_or_else(Utc::now)),
        None => {
            let hours = parse_hours(&params, state.query.config().export_default_hours)?;
            let window = state.query.resolve(hours, to.unwrap_or_else(Utc::now));
            (window.from, window.to)
        }
    };

    let points = state.query.stream_range(from, to, aggregate)?;
    info!(%from, %to, aggregate, "exporting csv");

    let header_row = format.header();
    let rows = points.map(move |point| match point {
        Ok(point) => Ok(format.row(&point)),
        Err(e) => {
            error!(error = %e, "csv export aborted mid-stream");
            Err(e)
        }
    });
    let body = stream::once(futures::future::ready(Ok::<_, AppError>(header_row))).chain(rows);

    let disposition = format!("attachment; filename=\"{}\"", file_name(from, to));
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from_stream(body),
    )
        .into_response())
}

fn parse_time(params: &HashMap<String, String>, key: &str) -> Result<Option<DateTime<Utc>>> {
    params
        .get(key)
        .map(|raw| {
            DateTime::parse_from_rfc3339(raw.trim())
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|_| {
                    AppError::Validation(format!("'{}' must be an RFC 3339 timestamp", key))
                })
        })
        .transpose()
}
