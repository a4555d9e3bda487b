use crate::api::models::SeriesResponse;
use crate::error::{AppError, Result};
use crate::models::DerivedPoint;
use crate::ws::AppState;
use axum::{
    extract::{Query, State},
    response::Json,
};
use std::collections::HashMap;
use std::sync::Arc;

pub async fn get_series(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<SeriesResponse>> {
    let hours = parse_hours(&params, state.query.config().default_hours)?;
    let series = state.query.get_series(hours).await?;
    Ok(Json(series.into()))
}

/// The newest reading, or `null` before the first successful poll.
pub async fn get_latest(State(state): State<Arc<AppState>>) -> Result<Json<Option<DerivedPoint>>> {
    Ok(Json(state.query.get_latest().await?))
}

/// `hours` must be an integer when present. Range clamping is left to the
/// query service.
pub fn parse_hours(params: &HashMap<String, String>, default: u32) -> Result<i64> {
    match params.get("hours") {
        None => Ok(i64::from(default)),
        Some(raw) => raw.trim().parse::<i64>().map_err(|_| {
            AppError::Validation(format!("hours must be an integer, got '{}'", raw))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_hours() {
        assert_eq!(parse_hours(&params(&[]), 1).unwrap(), 1);
        assert_eq!(parse_hours(&params(&[("hours", "48")]), 1).unwrap(), 48);
        assert_eq!(parse_hours(&params(&[("hours", "-3")]), 1).unwrap(), -3);
        assert!(matches!(
            parse_hours(&params(&[("hours", "1.5")]), 1),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            parse_hours(&params(&[("hours", "abc")]), 1),
            Err(AppError::Validation(_))
        ));
    }
}
