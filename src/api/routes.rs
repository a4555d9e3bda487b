use crate::api::handlers::{export, meta, series};
use crate::ws::{health_check, ws_handler, AppState};
use axum::{extract::Request, routing::get, Router};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::Level;

pub fn create_router(state: Arc<AppState>) -> Router {
    let public_routes = Router::new().route("/health", get(health_check));

    let api_routes = Router::new()
        .route("/api/series", get(series::get_series))
        .route("/api/latest", get(series::get_latest))
        .route("/api/export.csv", get(export::export_csv))
        .route("/api/limits", get(meta::get_limits))
        .route("/api/status", get(meta::get_status));

    let live_routes = Router::new().route("/ws", get(ws_handler));

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .merge(live_routes)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(|request: &Request| {
                            tracing::span!(
                                Level::INFO,
                                "http_request",
                                method = %request.method(),
                                uri = %request.uri(),
                            )
                        })
                        .on_request(|_request: &Request, _span: &tracing::Span| {
                            tracing::event!(Level::DEBUG, "received request");
                        })
                        .on_response(
                            |response: &axum::response::Response,
                             latency: std::time::Duration,
                             _span: &tracing::Span| {
                                tracing::event!(
                                    Level::INFO,
                                    status = %response.status(),
                                    latency = ?latency,
                                    "request completed"
                                );
                            },
                        )
                        .on_failure(
                            |error: tower_http::classify::ServerErrorsFailureClass,
                             _latency: std::time::Duration,
                             _span: &tracing::Span| {
                                tracing::event!(Level::ERROR, error = %error, "request failed");
                            },
                        ),
                )
                .layer(CorsLayer::permissive()),
        )
}
