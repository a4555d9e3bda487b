use crate::models::DerivedPoint;
use crate::services::Series;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct SeriesResponse {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    /// True when `points` are per-minute means rather than raw rows.
    pub aggregated: bool,
    pub points: Vec<DerivedPoint>,
}

impl From<Series> for SeriesResponse {
    fn from(series: Series) -> Self {
        Self {
            from: series.window.from,
            to: series.window.to,
            aggregated: series.window.aggregate,
            points: series.points,
        }
    }
}
