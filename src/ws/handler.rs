use crate::collector::CollectorStatus;
use crate::config::LimitsConfig;
use crate::services::QueryService;
use crate::ws::broadcaster::Broadcaster;
use crate::ws::connection::handle_connection;
use axum::{
    extract::{
        ws::{WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Shared by every HTTP handler and live connection.
#[derive(Clone)]
pub struct AppState {
    pub query: QueryService,
    pub broadcaster: Broadcaster,
    pub limits: LimitsConfig,
    pub collector_status: watch::Receiver<CollectorStatus>,
}

impl AppState {
    pub fn new(
        query: QueryService,
        broadcaster: Broadcaster,
        limits: LimitsConfig,
        collector_status: watch::Receiver<CollectorStatus>,
    ) -> Self {
        Self {
            query,
            broadcaster,
            limits,
            collector_status,
        }
    }
}

/// Upgrade to the live stream. The viewer first receives the latest stored
/// reading, then every reading the collector publishes afterwards.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    let client_id = uuid::Uuid::new_v4().to_string();
    info!(client_id = %client_id, "live viewer upgrading");

    ws.on_upgrade(move |socket: WebSocket| handle_connection(socket, state, client_id))
}

pub async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueryConfig;
    use crate::repositories::MeasurementStore;
    use crate::models::{AggregatedPoint, Measurement};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use futures::stream::{self, BoxStream, StreamExt};

    struct EmptyStore;

    #[async_trait]
    impl MeasurementStore for EmptyStore {
        async fn insert(&self, _m: &Measurement) -> crate::error::Result<()> {
            Ok(())
        }
        async fn latest(&self) -> crate::error::Result<Option<Measurement>> {
            Ok(None)
        }
        async fn series_raw(
            &self,
            _: DateTime<Utc>,
            _: DateTime<Utc>,
        ) -> crate::error::Result<Vec<Measurement>> {
            Ok(vec![])
        }
        async fn series_aggregated(
            &self,
            _: DateTime<Utc>,
            _: DateTime<Utc>,
        ) -> crate::error::Result<Vec<AggregatedPoint>> {
            Ok(vec![])
        }
        fn stream_raw(
            &self,
            _: DateTime<Utc>,
            _: DateTime<Utc>,
        ) -> BoxStream<'static, crate::error::Result<Measurement>> {
            stream::empty().boxed()
        }
        fn stream_aggregated(
            &self,
            _: DateTime<Utc>,
            _: DateTime<Utc>,
        ) -> BoxStream<'static, crate::error::Result<AggregatedPoint>> {
            stream::empty().boxed()
        }
    }

    #[test]
    fn test_app_state_creation() {
        let (_tx, rx) = watch::channel(CollectorStatus::default());
        let state = AppState::new(
            QueryService::new(Arc::new(EmptyStore), QueryConfig::default()),
            Broadcaster::new(200),
            LimitsConfig::default(),
            rx,
        );

        assert_eq!(state.limits.phase_limit_a, 16.0);
        assert_eq!(state.query.config().max_hours, 744);
        assert_eq!(state.broadcaster.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_health_check() {
        assert_eq!(health_check().await, "OK");
    }
}
