use axum::{response::Json, routing::get, Router};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

use crate::auth::{auth_router, StrategyRegistry};
use crate::cart::{cart_router, product_router, CartService};
use crate::{StorefrontError, NAME, VERSION};

#[derive(Serialize, Debug, Clone)]
pub struct ApiStatus {
    pub status: String,
    pub name: String,
    pub version: String,
}

// Configuration for the HTTP server
#[derive(Debug, Clone)]
pub struct WebConfig {
    pub port: u16,
    pub host: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "0.0.0.0".to_string(),
        }
    }
}

pub struct WebServer {
    config: WebConfig,
    registry: Arc<StrategyRegistry>,
    carts: CartService,
}

impl WebServer {
    pub fn new(config: WebConfig, registry: Arc<StrategyRegistry>, carts: CartService) -> Self {
        Self {
            config,
            registry,
            carts,
        }
    }

    pub async fn start(&self) -> crate::Result<()> {
        let app = self.router();
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .map_err(|e| StorefrontError::Server(format!("invalid listen address: {e}")))?;
        let listener = TcpListener::bind(addr).await?;

        log::info!("🛒 Storefront API listening on http://{}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        log::info!("Server stopped");
        Ok(())
    }

    /// Full API surface, also used directly by the HTTP tests
    pub fn router(&self) -> Router {
        Router::new()
            .route("/api/status", get(api_status))
            .nest("/api/sessions", auth_router(Arc::clone(&self.registry)))
            .nest(
                "/api/carts",
                cart_router(self.carts.clone(), Arc::clone(&self.registry)),
            )
            .nest(
                "/api/products",
                product_router(self.carts.clone(), Arc::clone(&self.registry)),
            )
            .layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            )
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    log::info!("Shutdown requested");
}

async fn api_status() -> Json<ApiStatus> {
    Json(ApiStatus {
        status: "ready".to_string(),
        name: NAME.to_string(),
        version: VERSION.to_string(),
    })
}
