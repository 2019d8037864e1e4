mod config;
mod dto;
mod error;
mod handlers;
mod services;
mod state;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::body::Body;
use axum::http::{Request, Response};
use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ServerConfig;
pub use crate::state::ServerState;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .compact()
        .init();

    let config = ServerConfig::from_env();
    let addr = config.bind_addr.clone();
    let state = Arc::new(ServerState::load(config)?);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Starting server on {}", addr);
    axum::serve(listener, app(state)).await?;

    Ok(())
}

fn app(state: Arc<ServerState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|req: &Request<Body>| {
            tracing::info_span!(
                "request",
                method = %req.method(),
                uri = %req.uri(),
                version = ?req.version(),
            )
        })
        .on_response(|res: &Response<Body>, latency: Duration, _span: &tracing::Span| {
            info!(
                latency = %format!("{} ms", latency.as_millis()),
                status = %res.status().as_u16(),
                "finished processing request"
            );
        });

    let api_routes = Router::new()
        .route("/api/judge", post(handlers::judge::judge))
        .route("/api/artifacts", get(handlers::artifacts::list))
        .route("/api/artifacts/{key}/{tag}", get(handlers::artifacts::get))
        .route("/api/results", get(handlers::results::list))
        .route("/api/project", get(handlers::project::get))
        .route("/api/pipelines", get(handlers::pipelines::list))
        .route("/api/pipelines/{id}/run", post(handlers::pipelines::run))
        .route("/api/runs", get(handlers::runs::list))
        .route(
            "/api/runs/{id}",
            get(handlers::runs::get).delete(handlers::runs::delete),
        )
        .route("/api/metrics/summary", get(handlers::runs::metrics_summary))
        .layer(ServiceBuilder::new().layer(trace_layer));

    Router::new()
        .merge(api_routes)
        .route("/health", get(handlers::health))
        .layer(cors)
        .with_state(state)
}
