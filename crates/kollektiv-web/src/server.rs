//! Main web server setup and startup.
//!
//! [`WebServer`] composes the axum router, registers every route, and
//! starts the HTTP listener.

use std::sync::Arc;
use std::time::Duration;

use axum::error_handling::HandleErrorLayer;
use axum::http::{HeaderValue, Method, StatusCode};
use axum::routing::{get, post};
use axum::{BoxError, Router};
use tower::buffer::BufferLayer;
use tower::limit::RateLimitLayer;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::{api, sse, webhooks};
use crate::state::Services;

async fn handle_rate_limit_error(err: BoxError) -> (StatusCode, String) {
    (StatusCode::TOO_MANY_REQUESTS, format!("rate limit error: {err}"))
}

pub struct WebServer {
    services: Arc<Services>,
}

impl WebServer {
    pub fn new(services: Services) -> Self {
        Self { services: Arc::new(services) }
    }

    fn router(&self) -> Router {
        let cors = if self.services.config.cors_allowed_origins.is_empty() {
            CorsLayer::new().allow_origin(tower_http::cors::Any).allow_methods(tower_http::cors::Any)
        } else {
            let origins: Vec<HeaderValue> = self
                .services
                .config
                .cors_allowed_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods([Method::GET, Method::POST])
        };

        // A single process-wide bucket, not per-client: `AppConfig`'s limit
        // is a blunt deployment-level safeguard, not a fairness mechanism.
        let rate_limit = ServiceBuilder::new()
            .layer(HandleErrorLayer::new(handle_rate_limit_error))
            .layer(BufferLayer::new(1024))
            .layer(RateLimitLayer::new(self.services.config.rate_limit_per_minute as u64, Duration::from_secs(60)));

        Router::new()
            .route("/health", get(api::health))
            .route("/api/v0/sources", post(api::add_source))
            .route("/api/v0/sources", get(api::list_sources))
            .route("/api/v0/sources/{id}", get(api::get_source))
            .route("/api/v0/sources/{id}/events", get(sse::source_events))
            .route("/api/v0/chat", post(sse::chat))
            .route("/api/v0/conversations", get(api::list_conversations))
            .route("/api/v0/conversations/{id}", get(api::get_conversation))
            .route("/webhooks/firecrawl", post(webhooks::firecrawl_webhook))
            .layer(cors)
            .layer(rate_limit)
            .layer(TraceLayer::new_for_http())
            .with_state(self.services.clone())
    }

    pub async fn start(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = self.services.config.bind_addr;
        let router = self.router();

        tracing::info!(%addr, "starting web server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router).await?;

        Ok(())
    }
}
