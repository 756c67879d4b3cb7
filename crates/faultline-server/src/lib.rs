//! HTTP API and SSE streaming server for Faultline.
//!
//! # Routes
//!
//! | Method | Path | Handler |
//! |--------|------|---------|
//! | GET | `/health` | liveness and corpus size |
//! | POST | `/api/diagnose` | retrieval-augmented diagnosis |
//! | POST | `/api/diagnose/agent` | tool-calling diagnosis, single response |
//! | POST | `/api/diagnose/stream` | tool-calling diagnosis as Server-Sent Events |

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

pub use config::ServerConfig;
pub use error::{ErrorResponse, Result, ServerError};
pub use routes::{AgentRequest, CaseSummary, DiagnoseRequest, DiagnoseResponse, HealthResponse};
pub use state::AppState;

use std::net::SocketAddr;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, header},
};
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// The Faultline HTTP server.
pub struct Server {
    /// Application state.
    state: AppState,
}

impl Server {
    /// Create a server from a pre-built application state.
    pub fn from_state(state: AppState) -> Self {
        Self { state }
    }

    /// Build the router with all routes and middleware.
    pub fn router(&self) -> Router {
        use axum::routing::post;

        Router::new()
            .merge(routes::health_routes())
            .route("/api/diagnose", post(routes::diagnose_handler))
            .route("/api/diagnose/agent", post(routes::agent_diagnose_handler))
            .route("/api/diagnose/stream", post(routes::stream_handler))
            .layer(DefaultBodyLimit::max(self.state.config.max_body_size))
            .layer(cors_layer(&self.state.config.cors_origins))
            // TraceLayer for detailed HTTP tracing
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Run the server until Ctrl-C.
    pub async fn run(self) -> Result<()> {
        let addr = self.state.config.bind_address;
        self.run_on(addr).await
    }

    /// Run the server on a specific address.
    pub async fn run_on(self, addr: SocketAddr) -> Result<()> {
        let router = self.router();

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Internal(format!("Failed to bind {}: {}", addr, e)))?;

        info!(%addr, knowledge_cases = self.state.knowledge_cases, "Server listening");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| ServerError::Internal(format!("Server error: {}", e)))?;

        info!("Server stopped");
        Ok(())
    }

    /// Get the configured bind address.
    pub fn bind_address(&self) -> SocketAddr {
        self.state.config.bind_address
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
