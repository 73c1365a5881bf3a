//! JSON-RPC over HTTP
//!
//! `POST /mcp` takes one JSON-RPC request per body and answers with the same
//! payload the stdio transport would write. Handlers are synchronous, so each
//! request runs on tokio's blocking pool.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use super::protocol::{process_line, McpHandler};
use crate::error::{IMessageError, Result};

/// HTTP transport settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: 8787,
        }
    }
}

/// Bind the listener; `host` may be a name such as `localhost`
pub async fn bind(config: &HttpConfig) -> Result<tokio::net::TcpListener> {
    tokio::net::TcpListener::bind((config.host.as_str(), config.port))
        .await
        .map_err(|e| {
            IMessageError::Config(format!(
                "Cannot bind HTTP transport to {}:{}: {}",
                config.host, config.port, e
            ))
        })
}

/// Build the router
pub fn router<H: McpHandler + 'static>(handler: Arc<H>) -> Router {
    Router::new()
        .route("/mcp", post(rpc_handler::<H>))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(handler)
}

/// Serve until the listener fails
pub async fn serve<H: McpHandler + 'static>(handler: Arc<H>, config: &HttpConfig) -> Result<()> {
    let listener = bind(config).await?;
    tracing::info!("HTTP transport listening on {}", listener.local_addr()?);
    axum::serve(listener, router(handler)).await?;
    Ok(())
}

/// Health check endpoint
async fn health_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/json")],
        serde_json::json!({
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
        })
        .to_string(),
    )
}

async fn rpc_handler<H: McpHandler + 'static>(
    State(handler): State<Arc<H>>,
    body: String,
) -> Response {
    let outcome = tokio::task::spawn_blocking(move || process_line(handler.as_ref(), &body)).await;

    match outcome {
        Ok(Ok(Some(json))) => ([(header::CONTENT_TYPE, "application/json")], json).into_response(),
        // Notification: nothing to send back
        Ok(Ok(None)) => StatusCode::ACCEPTED.into_response(),
        Ok(Err(e)) => {
            tracing::error!("Failed to encode response: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
        Err(e) => {
            tracing::error!("Request handler panicked: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
