use crate::config::QueryConfig;
use crate::derived::{enrich, enrich_aggregated};
use crate::error::{AppError, Result};
use crate::models::DerivedPoint;
use crate::repositories::MeasurementStore;
use chrono::{DateTime, Duration, Utc};
use futures::stream::{BoxStream, StreamExt};
use std::sync::Arc;

/// A `[from, to]` range plus the read path to serve it with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub hours: u32,
    pub aggregate: bool,
}

#[derive(Debug, Clone)]
pub struct Series {
    pub window: ResolvedWindow,
    pub points: Vec<DerivedPoint>,
}

#[derive(Clone)]
pub struct QueryService {
    store: Arc<dyn MeasurementStore>,
    config: QueryConfig,
}

impl QueryService {
    pub fn new(store: Arc<dyn MeasurementStore>, config: QueryConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    pub fn clamp_hours(&self, hours: i64) -> u32 {
        hours.clamp(1, i64::from(self.config.max_hours)) as u32
    }

    /// Clamp the requested trailing window and pick raw or minute reads.
    pub fn resolve(&self, hours: i64, now: DateTime<Utc>) -> ResolvedWindow {
        let hours = self.clamp_hours(hours);
        ResolvedWindow {
            from: now - Duration::hours(i64::from(hours)),
            to: now,
            hours,
            aggregate: hours > self.config.aggregate_after_hours,
        }
    }

    pub async fn get_series(&self, hours: i64) -> Result<Series> {
        let window = self.resolve(hours, Utc::now());
        let points = self
            .get_range(window.from, window.to, window.aggregate)
            .await?;
        Ok(Series { window, points })
    }

    pub async fn get_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        aggregate: bool,
    ) -> Result<Vec<DerivedPoint>> {
        self.check_range(from, to)?;

        let points = if aggregate {
            self.store
                .series_aggregated(from, to)
                .await?
                .iter()
                .map(enrich_aggregated)
                .collect()
        } else {
            self.store
                .series_raw(from, to)
                .await?
                .into_iter()
                .map(enrich)
                .collect()
        };
        Ok(points)
    }

    /// Like `get_range`, but rows are enriched and yielded as the store
    /// reads them instead of being collected first.
    pub fn stream_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        aggregate: bool,
    ) -> Result<BoxStream<'static, Result<DerivedPoint>>> {
        self.check_range(from, to)?;

        let points = if aggregate {
            self.store
                .stream_aggregated(from, to)
                .map(|row| row.map(|bucket| enrich_aggregated(&bucket)))
                .boxed()
        } else {
            self.store
                .stream_raw(from, to)
                .map(|row| row.map(enrich))
                .boxed()
        };
        Ok(points)
    }

    fn check_range(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<()> {
        if from > to {
            return Err(AppError::Validation(
                "'from' must not be after 'to'".into(),
            ));
        }
        let max_span = Duration::hours(i64::from(self.config.max_hours));
        if to - from > max_span {
            return Err(AppError::Validation(format!(
                "range exceeds the maximum of {} hours",
                self.config.max_hours
            )));
        }
        Ok(())
    }

    pub async fn get_latest(&self) -> Result<Option<DerivedPoint>> {
        Ok(self.store.latest().await?.map(enrich))
    }
}
