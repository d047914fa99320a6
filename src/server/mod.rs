//! HTTP query service
//!
//! `POST /query` takes `{"query": "..."}` and answers `{"query", "response"}`.
//! A missing or blank query gets `{"error": "No query provided"}` without
//! touching the providers or the query log.

mod query_log;

pub use query_log::{QueryLog, QueryLogEntry};

use crate::error::{Result, ScriptRagError};
use crate::storage::VectorIndex;
use crate::synthesis::AnswerSynthesizer;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Shared handles for request handlers
#[derive(Clone)]
pub struct AppState {
    pub synthesizer: Arc<AnswerSynthesizer>,
    pub index: Arc<VectorIndex>,
    pub query_log: Option<Arc<QueryLog>>,
}

#[derive(Debug, Deserialize)]
struct QueryRequest {
    #[serde(default)]
    query: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QueryResponse {
    pub query: String,
    pub response: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub records: usize,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/query", post(query_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Serve until Ctrl-C
pub async fn serve(state: AppState, bind: &str) -> Result<()> {
    let addr: SocketAddr = bind.parse().map_err(|_| ScriptRagError::InvalidConfigValue {
        path: "server.bind".to_string(),
        message: format!("invalid bind address {}", bind),
    })?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ScriptRagError::Io {
            source: e,
            context: format!("Failed to bind {}", addr),
        })?;

    info!("Listening on http://{}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await
        .map_err(|e| ScriptRagError::Io {
            source: e,
            context: "Server error".to_string(),
        })?;

    info!("Server stopped");
    Ok(())
}

async fn query_handler(State(state): State<AppState>, body: Bytes) -> Response {
    // Anything without a usable `query` string is treated as no query
    let query = serde_json::from_slice::<QueryRequest>(&body)
        .ok()
        .and_then(|request| request.query)
        .filter(|query| !query.trim().is_empty());

    let Some(query) = query else {
        return no_query();
    };

    debug!("Query: {}", query);

    match state.synthesizer.synthesize(&query).await {
        Ok(response) => {
            if let Some(log) = &state.query_log {
                log.record(&query, &response).await;
            }
            Json(QueryResponse { query, response }).into_response()
        }
        Err(ScriptRagError::EmptyQuery) => no_query(),
        Err(e) => {
            error!("Query failed: {}", e);
            (
                status_for(&e),
                Json(ErrorBody {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

async fn health_handler(State(state): State<AppState>) -> Response {
    let index = Arc::clone(&state.index);
    let count = tokio::task::spawn_blocking(move || index.count())
        .await
        .map_err(|e| ScriptRagError::IndexUnavailable(e.to_string()))
        .and_then(|result| result);

    match count {
        Ok(records) => Json(HealthResponse {
            status: "ok".to_string(),
            records,
        })
        .into_response(),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ErrorBody {
                error: e.to_string(),
            }),
        )
            .into_response(),
    }
}

fn no_query() -> Response {
    Json(ErrorBody {
        error: ScriptRagError::EmptyQuery.to_string(),
    })
    .into_response()
}

/// HTTP status for a failed query
pub fn status_for(err: &ScriptRagError) -> StatusCode {
    match err {
        ScriptRagError::Provider { .. } => StatusCode::BAD_GATEWAY,
        ScriptRagError::IndexUnavailable(_) | ScriptRagError::Database(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        ScriptRagError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
