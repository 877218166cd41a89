//! Core server implementation

use crate::{
    config::{CorsConfig, ServerConfig},
    error::{ServerError, ServerResult},
    handlers,
};
use axum::{
    http::{HeaderName, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};
use zephyr_core::{EngineHandle, GenerationWorker, RequestService};

/// Main server state
#[derive(Clone)]
pub struct ServerState {
    pub config: Arc<ServerConfig>,
    pub service: RequestService,
}

impl ServerState {
    pub fn new(config: ServerConfig, service: RequestService) -> Self {
        Self { config: Arc::new(config), service }
    }
}

/// Zephyr HTTP server
pub struct ZephyrServer {
    state: ServerState,
    worker: Arc<GenerationWorker>,
}

impl ZephyrServer {
    /// Create a server around an already loaded engine
    pub fn new(config: ServerConfig, engine: EngineHandle) -> ServerResult<Self> {
        let worker = Arc::new(GenerationWorker::spawn(engine, &config.worker)?);
        let service = RequestService::new(Arc::clone(&worker));
        let state = ServerState::new(config, service);

        Ok(Self { state, worker })
    }

    /// Start serving until a shutdown signal arrives, then drain the worker
    pub async fn start(self) -> ServerResult<()> {
        let addr = self.state.config.bind;
        let app = create_router(self.state.clone())?;

        let listener = TcpListener::bind(addr).await.map_err(ServerError::Io)?;
        info!("Server listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| ServerError::Internal(format!("Server error: {}", e)))?;

        self.shutdown().await;
        Ok(())
    }

    /// Stop the generation worker after in-flight jobs finish
    pub async fn shutdown(&self) {
        info!("Shutting down Zephyr server");
        self.worker.shutdown().await;
    }

    /// Get server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }

    /// Get server state
    pub fn state(&self) -> &ServerState {
        &self.state
    }
}

/// Build the router with all routes and middleware
pub fn create_router(state: ServerState) -> ServerResult<Router> {
    let mut router = Router::new()
        .route("/ask-zephyr", post(handlers::ask::ask_zephyr))
        .route("/health", get(handlers::health::health_check))
        .route("/health/ready", get(handlers::health::readiness_check))
        .layer(RequestBodyLimitLayer::new(state.config.limits.max_body_size))
        .layer(TraceLayer::new_for_http());

    if state.config.cors.enabled {
        router = router.layer(cors_layer(&state.config.cors)?);
    }

    Ok(router.with_state(state))
}

fn is_wildcard(values: &[String]) -> bool {
    values.iter().any(|v| v == "*")
}

fn cors_layer(config: &CorsConfig) -> ServerResult<CorsLayer> {
    let origins = if is_wildcard(&config.allowed_origins) {
        AllowOrigin::any()
    } else {
        let origins = config
            .allowed_origins
            .iter()
            .map(|origin| {
                HeaderValue::from_str(origin)
                    .map_err(|e| ServerError::Config(format!("Invalid CORS origin {:?}: {}", origin, e)))
            })
            .collect::<ServerResult<Vec<_>>>()?;
        AllowOrigin::list(origins)
    };

    let methods = if is_wildcard(&config.allowed_methods) {
        AllowMethods::any()
    } else {
        let methods = config
            .allowed_methods
            .iter()
            .map(|method| {
                method
                    .parse::<Method>()
                    .map_err(|e| ServerError::Config(format!("Invalid CORS method {:?}: {}", method, e)))
            })
            .collect::<ServerResult<Vec<_>>>()?;
        AllowMethods::list(methods)
    };

    let headers = if is_wildcard(&config.allowed_headers) {
        AllowHeaders::any()
    } else {
        let headers = config
            .allowed_headers
            .iter()
            .map(|header| {
                header
                    .parse::<HeaderName>()
                    .map_err(|e| ServerError::Config(format!("Invalid CORS header {:?}: {}", header, e)))
            })
            .collect::<ServerResult<Vec<_>>>()?;
        AllowHeaders::list(headers)
    };

    Ok(CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(methods)
        .allow_headers(headers)
        .max_age(Duration::from_secs(config.max_age)))
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            warn!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await
        }
    }
}
