pub mod measurement;

pub use measurement::MeasurementRepository;

use crate::error::Result;
use crate::models::{AggregatedPoint, Measurement};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;

/// Append-only time-series of meter readings.
///
/// Only the collector writes; API handlers read. Ranges are inclusive on
/// both ends and results are ascending by time.
#[async_trait]
pub trait MeasurementStore: Send + Sync {
    async fn insert(&self, measurement: &Measurement) -> Result<()>;

    /// Most recent row; ties on timestamp go to the later insert.
    async fn latest(&self) -> Result<Option<Measurement>>;

    async fn series_raw(&self, from: DateTime<Utc>, to: DateTime<Utc>)
        -> Result<Vec<Measurement>>;

    /// Minute buckets of the range. Empty minutes are omitted.
    async fn series_aggregated(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<AggregatedPoint>>;

    /// Same rows as `series_raw`, yielded as they are read.
    fn stream_raw(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> BoxStream<'static, Result<Measurement>>;

    fn stream_aggregated(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> BoxStream<'static, Result<AggregatedPoint>>;
}
