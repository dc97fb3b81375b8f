mod address;
mod error;
mod limits;
mod tx;

use std::sync::Arc;

use axum::routing::{any, get, post};
use axum::{Json, Router};
use tower_http::cors::{AllowOrigin, CorsLayer};

use tally_core::{ChainSource, TransactionQuery};

// ==============================================================================
// Application State
// ==============================================================================

pub struct AppState {
    pub source: Arc<dyn ChainSource>,
    pub default_query: TransactionQuery,
}

type SharedState = Arc<AppState>;

// ==============================================================================
// Router
// ==============================================================================

pub fn build_router(state: AppState, origin: &str) -> eyre::Result<Router> {
    // Only reflect the allowed origin when the request's Origin header
    // actually matches. Otherwise, omit the header entirely so browsers
    // get a clean CORS rejection instead of a mismatched origin value.
    let allowed: axum::http::HeaderValue = origin
        .parse()
        .map_err(|e| eyre::eyre!("invalid origin `{origin}`: {e}"))?;
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(
            move |request_origin: &axum::http::HeaderValue, _| *request_origin == allowed,
        ))
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers([axum::http::header::CONTENT_TYPE]);

    if state.default_query.batch_size == 0 {
        return Err(eyre::eyre!("default batch size must be at least 1"));
    }

    let shared = Arc::new(state);

    let api = Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/limits", get(limits::get_limits))
        .route("/api/v1/server/version", get(server_version))
        .route("/api/v1/address/{address}/balance", get(address::get_balance))
        .route("/api/v1/address/{address}/history", get(address::get_history))
        .route(
            "/api/v1/address/{address}/transactions",
            get(address::get_transactions),
        )
        .route("/api/v1/transactions", post(address::post_transactions))
        .route("/api/v1/tx/{txid}", get(tx::get_transaction))
        .route("/api/v1/tx/{txid}/raw", get(tx::get_raw_transaction))
        .route("/api/v1/block/{height}/header", get(tx::get_block_header));

    Ok(Router::new()
        .merge(api)
        .route("/api", any(api_not_found))
        .route("/api/{*path}", any(api_not_found))
        .layer(cors)
        .with_state(shared))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn server_version(
    axum::extract::State(state): axum::extract::State<SharedState>,
) -> Result<Json<tally_core::types::ServerVersion>, error::AppError> {
    Ok(Json(state.source.server_version().await?))
}

async fn api_not_found() -> error::AppError {
    error::AppError::NotFound("API route not found".to_string())
}
