use crate::error::AppError;
use crate::models::DerivedPoint;
use crate::ws::broadcaster::Subscription;
use crate::ws::handler::AppState;
use axum::extract::ws::{Message, WebSocket};
use futures::{Sink, SinkExt, StreamExt};
use std::fmt::Display;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Forward live readings to one viewer until either side goes away.
pub async fn handle_connection(socket: WebSocket, state: Arc<AppState>, client_id: String) {
    info!(client_id = %client_id, "live viewer connected");

    // Register before reading `latest` so nothing published in between is missed.
    let mut subscription = state.broadcaster.subscribe();
    let subscriber_id = subscription.id();
    let evictions = subscription.evictions();
    let latest = match state.query.get_latest().await {
        Ok(latest) => latest,
        Err(e) => {
            warn!(client_id = %client_id, error = %e, "could not load latest reading");
            None
        }
    };

    let (mut ws_sender, mut ws_receiver) = socket.split();

    let send_client_id = client_id.clone();
    let mut send_task = tokio::spawn(async move {
        if let Err(e) = forward_live(&mut ws_sender, &mut subscription, latest).await {
            warn!(client_id = %send_client_id, error = %e, "dropping live viewer");
        }
    });

    let recv_client_id = client_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = ws_receiver.next().await {
            match msg {
                Ok(Message::Close(_)) => {
                    debug!(client_id = %recv_client_id, "viewer sent close");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    debug!(client_id = %recv_client_id, error = %e, "viewer transport error");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.broadcaster.unsubscribe(subscriber_id);
    let evicted = evictions.count();
    if evicted > 0 {
        warn!(client_id = %client_id, evicted, "live viewer fell behind; readings were dropped");
    }

    info!(client_id = %client_id, "live viewer disconnected");
}

/// Send `latest` (if any), then every published reading, until the
/// subscription ends or the sink fails.
///
/// A reading published between subscribing and loading `latest` shows up as
/// the first queued message; it is skipped only if it is that same reading.
pub async fn forward_live<S>(
    sink: &mut S,
    subscription: &mut Subscription,
    latest: Option<DerivedPoint>,
) -> Result<(), AppError>
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    if let Some(point) = &latest {
        send_point(sink, point).await?;
    }

    let mut initial = latest;
    while let Some(point) = subscription.recv().await {
        if let Some(initial) = initial.take() {
            if *point == initial {
                continue;
            }
        }
        send_point(sink, &point).await?;
    }
    Ok(())
}

async fn send_point<S>(sink: &mut S, point: &DerivedPoint) -> Result<(), AppError>
where
    S: Sink<Message> + Unpin,
    S::Error: Display,
{
    let json = serde_json::to_string(point).map_err(|e| {
        error!("Failed to serialize live reading: {}", e);
        AppError::Json(e)
    })?;

    sink.send(Message::Text(json.into()))
        .await
        .map_err(|e| AppError::Delivery(e.to_string()))
}
