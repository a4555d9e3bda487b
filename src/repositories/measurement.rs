use crate::db::DbPool;
use crate::error::{AppError, Result};
use crate::models::{AggregatedPoint, Measurement};
use crate::repositories::MeasurementStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{BoxStream, StreamExt};
use sqlx::{sqlite::SqliteRow, FromRow, Row};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

const BUCKET_MS: i64 = 60_000;

#[derive(Clone)]
pub struct MeasurementRepository {
    pool: DbPool,
}

impl MeasurementRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn ts_from_millis(ms: i64, column: &str) -> std::result::Result<DateTime<Utc>, sqlx::Error> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: format!("timestamp out of range: {}", ms).into(),
    })
}

impl<'r> FromRow<'r, SqliteRow> for Measurement {
    fn from_row(row: &'r SqliteRow) -> std::result::Result<Self, sqlx::Error> {
        Ok(Self {
            measured_at: ts_from_millis(row.try_get("measured_at_ms")?, "measured_at_ms")?,
            active_power_w: row.try_get("active_power_w")?,
            total_import_kwh: row.try_get("total_import_kwh")?,
            voltage_l1_v: row.try_get("voltage_l1_v")?,
            voltage_l2_v: row.try_get("voltage_l2_v")?,
            voltage_l3_v: row.try_get("voltage_l3_v")?,
            active_current_l1_a: row.try_get("active_current_l1_a")?,
            active_current_l2_a: row.try_get("active_current_l2_a")?,
            active_current_l3_a: row.try_get("active_current_l3_a")?,
        })
    }
}

impl<'r> FromRow<'r, SqliteRow> for AggregatedPoint {
    fn from_row(row: &'r SqliteRow) -> std::result::Result<Self, sqlx::Error> {
        Ok(Self {
            bucket_start: ts_from_millis(row.try_get("bucket_ms")?, "bucket_ms")?,
            sample_count: row.try_get("sample_count")?,
            active_power_w: row.try_get("active_power_w")?,
            total_import_kwh: row.try_get("total_import_kwh")?,
            voltage_l1_v: row.try_get("voltage_l1_v")?,
            voltage_l2_v: row.try_get("voltage_l2_v")?,
            voltage_l3_v: row.try_get("voltage_l3_v")?,
            active_current_l1_a: row.try_get("active_current_l1_a")?,
            active_current_l2_a: row.try_get("active_current_l2_a")?,
            active_current_l3_a: row.try_get("active_current_l3_a")?,
        })
    }
}

const SELECT_RAW: &str = r#"
    SELECT
        measured_at_ms, active_power_w, total_import_kwh,
        voltage_l1_v, voltage_l2_v, voltage_l3_v,
        active_current_l1_a, active_current_l2_a, active_current_l3_a
    FROM p1_measurements
    WHERE measured_at_ms >= ? AND measured_at_ms <= ?
    ORDER BY measured_at_ms ASC, id ASC
"#;

// AVG ignores NULLs per column, so a missing phase only blanks itself.
const SELECT_MINUTE_BUCKETS: &str = r#"
    SELECT
        (measured_at_ms / ?) * ? AS bucket_ms,
        COUNT(*) AS sample_count,
        AVG(active_power_w) AS active_power_w,
        AVG(total_import_kwh) AS total_import_kwh,
        AVG(voltage_l1_v) AS voltage_l1_v,
        AVG(voltage_l2_v) AS voltage_l2_v,
        AVG(voltage_l3_v) AS voltage_l3_v,
        AVG(active_current_l1_a) AS active_current_l1_a,
        AVG(active_current_l2_a) AS active_current_l2_a,
        AVG(active_current_l3_a) AS active_current_l3_a
    FROM p1_measurements
    WHERE measured_at_ms >= ? AND measured_at_ms <= ?
    GROUP BY bucket_ms
    ORDER BY bucket_ms ASC
"#;

/// Rows buffered between the database cursor and a slow consumer.
const STREAM_BUFFER: usize = 64;

impl MeasurementRepository {
    /// Run `sql` on a background task and hand rows over as they are decoded.
    /// The cursor is dropped as soon as the consumer goes away.
    fn stream_rows<T>(&self, sql: &'static str, binds: Vec<i64>) -> BoxStream<'static, Result<T>>
    where
        T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin + 'static,
    {
        let pool = self.pool.clone();
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);

        tokio::spawn(async move {
            let mut query = sqlx::query_as::<_, T>(sql);
            for value in binds {
                query = query.bind(value);
            }
            let mut rows = query.fetch(&pool);
            while let Some(row) = rows.next().await {
                if tx.send(row.map_err(AppError::Storage)).await.is_err() {
                    debug!("row stream consumer went away");
                    break;
                }
            }
        });

        ReceiverStream::new(rx).boxed()
    }
}

#[async_trait]
impl MeasurementStore for MeasurementRepository {
    async fn insert(&self, m: &Measurement) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO p1_measurements (
                measured_at_ms, active_power_w, total_import_kwh,
                voltage_l1_v, voltage_l2_v, voltage_l3_v,
                active_current_l1_a, active_current_l2_a, active_current_l3_a
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(m.measured_at.timestamp_millis())
        .bind(m.active_power_w)
        .bind(m.total_import_kwh)
        .bind(m.voltage_l1_v)
        .bind(m.voltage_l2_v)
        .bind(m.voltage_l3_v)
        .bind(m.active_current_l1_a)
        .bind(m.active_current_l2_a)
        .bind(m.active_current_l3_a)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn latest(&self) -> Result<Option<Measurement>> {
        sqlx::query_as::<_, Measurement>(
            r#"
            SELECT
                measured_at_ms, active_power_w, total_import_kwh,
                voltage_l1_v, voltage_l2_v, voltage_l3_v,
                active_current_l1_a, active_current_l2_a, active_current_l3_a
            FROM p1_measurements
            ORDER BY measured_at_ms DESC, id DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::Storage)
    }

    async fn series_raw(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Measurement>> {
        sqlx::query_as::<_, Measurement>(SELECT_RAW)
            .bind(from.timestamp_millis())
            .bind(to.timestamp_millis())
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::Storage)
    }

    async fn series_aggregated(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<AggregatedPoint>> {
        sqlx::query_as::<_, AggregatedPoint>(SELECT_MINUTE_BUCKETS)
            .bind(BUCKET_MS)
            .bind(BUCKET_MS)
            .bind(from.timestamp_millis())
            .bind(to.timestamp_millis())
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::Storage)
    }

    fn stream_raw(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> BoxStream<'static, Result<Measurement>> {
        self.stream_rows(
            SELECT_RAW,
            vec![from.timestamp_millis(), to.timestamp_millis()],
        )
    }

    fn stream_aggregated(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> BoxStream<'static, Result<AggregatedPoint>> {
        self.stream_rows(
            SELECT_MINUTE_BUCKETS,
            vec![
                BUCKET_MS,
                BUCKET_MS,
                from.timestamp_millis(),
                to.timestamp_millis(),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{connect_in_memory, init_schema};
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;

    async fn repo() -> MeasurementRepository {
        let pool = connect_in_memory().await.unwrap();
        init_schema(&pool).await.unwrap();
        MeasurementRepository::new(pool)
    }

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, h, m, s).unwrap()
    }

    fn reading(ts: DateTime<Utc>, power: f64, l1: Option<f64>) -> Measurement {
        Measurement {
            measured_at: ts,
            active_power_w: Some(power),
            total_import_kwh: Some(1000.0 + power / 1000.0),
            voltage_l1_v: Some(230.0),
            voltage_l2_v: Some(231.0),
            voltage_l3_v: None,
            active_current_l1_a: l1,
            active_current_l2_a: Some(2.0),
            active_current_l3_a: Some(3.0),
        }
    }

    #[tokio::test]
    async fn test_latest_empty() {
        let repo = repo().await;
        assert!(repo.latest().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_latest_breaks_ties_by_insertion_order() {
        let repo = repo().await;
        repo.insert(&reading(at(10, 0, 0), 100.0, Some(1.0))).await.unwrap();
        repo.insert(&reading(at(10, 0, 10), 200.0, Some(1.0))).await.unwrap();
        repo.insert(&reading(at(10, 0, 10), 300.0, Some(1.0))).await.unwrap();

        let latest = repo.latest().await.unwrap().unwrap();
        assert_eq!(latest.active_power_w, Some(300.0));
    }

    #[tokio::test]
    async fn test_series_raw_inclusive_and_ascending() {
        let repo = repo().await;
        for (i, s) in [50u32, 0, 20, 40, 10].iter().enumerate() {
            repo.insert(&reading(at(10, 0, *s), i as f64, None)).await.unwrap();
        }

        let rows = repo.series_raw(at(10, 0, 10), at(10, 0, 40)).await.unwrap();
        let times: Vec<_> = rows.iter().map(|r| r.measured_at).collect();
        assert_eq!(times, vec![at(10, 0, 10), at(10, 0, 20), at(10, 0, 40)]);
    }

    #[tokio::test]
    async fn test_series_raw_round_trips_nulls() {
        let repo = repo().await;
        let m = reading(at(9, 30, 0), 512.5, None);
        repo.insert(&m).await.unwrap();

        let rows = repo.series_raw(at(9, 0, 0), at(10, 0, 0)).await.unwrap();
        assert_eq!(rows, vec![m]);
    }

    #[tokio::test]
    async fn test_series_raw_is_repeatable() {
        let repo = repo().await;
        for s in 0..6 {
            repo.insert(&reading(at(11, 0, s * 10), s as f64, Some(1.0))).await.unwrap();
        }

        let first = repo.series_raw(at(11, 0, 0), at(12, 0, 0)).await.unwrap();
        let second = repo.series_raw(at(11, 0, 0), at(12, 0, 0)).await.unwrap();
        assert_eq!(first.len(), 6);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_aggregated_one_row_per_minute() {
        let repo = repo().await;
        let rows: Vec<_> = (0..3)
            .map(|m| reading(at(12, m, 0), 100.0 * (m + 1) as f64, Some(m as f64)))
            .collect();
        for r in &rows {
            repo.insert(r).await.unwrap();
        }

        let buckets = repo.series_aggregated(at(12, 0, 0), at(12, 5, 0)).await.unwrap();
        assert_eq!(buckets.len(), 3);
        for (bucket, row) in buckets.iter().zip(&rows) {
            assert_eq!(bucket.sample_count, 1);
            assert_eq!(&bucket.as_measurement(), row);
        }
    }

    #[tokio::test]
    async fn test_aggregated_means_skip_nulls_per_column() {
        let repo = repo().await;
        repo.insert(&reading(at(13, 0, 5), 100.0, Some(4.0))).await.unwrap();
        repo.insert(&reading(at(13, 0, 25), 300.0, None)).await.unwrap();
        repo.insert(&reading(at(13, 0, 45), 200.0, Some(6.0))).await.unwrap();

        let buckets = repo.series_aggregated(at(13, 0, 0), at(13, 1, 0)).await.unwrap();
        assert_eq!(buckets.len(), 1);
        let b = &buckets[0];
        assert_eq!(b.bucket_start, at(13, 0, 0));
        assert_eq!(b.sample_count, 3);
        assert_eq!(b.active_power_w, Some(200.0));
        assert_eq!(b.active_current_l1_a, Some(5.0));
        assert_eq!(b.active_current_l2_a, Some(2.0));
        assert_eq!(b.voltage_l3_v, None);
    }

    #[tokio::test]
    async fn test_aggregated_omits_empty_minutes() {
        let repo = repo().await;
        repo.insert(&reading(at(14, 0, 0), 1.0, None)).await.unwrap();
        repo.insert(&reading(at(14, 5, 30), 2.0, None)).await.unwrap();

        let buckets = repo
            .series_aggregated(at(14, 0, 0), at(14, 0, 0) + Duration::minutes(10))
            .await
            .unwrap();
        let starts: Vec<_> = buckets.iter().map(|b| b.bucket_start).collect();
        assert_eq!(starts, vec![at(14, 0, 0), at(14, 5, 0)]);
    }

    #[tokio::test]
    async fn test_stream_raw_matches_series_raw() {
        let repo = repo().await;
        for i in 0..150 {
            repo.insert(&reading(at(9, 0, 0) + Duration::seconds(i * 10), i as f64, Some(1.0)))
                .await
                .unwrap();
        }
        let (from, to) = (at(9, 0, 0), at(9, 20, 0));

        let streamed: Vec<Measurement> = repo
            .stream_raw(from, to)
            .map(|row| row.unwrap())
            .collect()
            .await;
        let listed = repo.series_raw(from, to).await.unwrap();

        assert_eq!(streamed.len(), 121);
        assert_eq!(streamed, listed);
    }

    #[tokio::test]
    async fn test_stream_aggregated_matches_series_aggregated() {
        let repo = repo().await;
        for i in 0..12 {
            repo.insert(&reading(at(10, 0, 0) + Duration::seconds(i * 15), 100.0 * i as f64, None))
                .await
                .unwrap();
        }
        let (from, to) = (at(10, 0, 0), at(10, 5, 0));

        let streamed: Vec<AggregatedPoint> = repo
            .stream_aggregated(from, to)
            .map(|row| row.unwrap())
            .collect()
            .await;

        assert_eq!(streamed.len(), 3);
        assert_eq!(streamed, repo.series_aggregated(from, to).await.unwrap());
    }

    #[tokio::test]
    async fn test_dropping_stream_releases_connection() {
        let repo = repo().await;
        for i in 0..200 {
            repo.insert(&reading(at(11, 0, 0) + Duration::seconds(i), 1.0, None))
                .await
                .unwrap();
        }

        let mut stream = repo.stream_raw(at(11, 0, 0), at(12, 0, 0));
        assert!(stream.next().await.unwrap().is_ok());
        drop(stream);

        // The only pooled connection must come back for this to complete.
        assert!(repo.latest().await.unwrap().is_some());
    }
}
