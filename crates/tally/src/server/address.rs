use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use tally_core::types::{AddressTransactions, HistoryEntry, TransactionReport};
use tally_core::TransactionQuery;

use super::error::AppError;
use super::limits::{validate_limit_bounds, HARD_MAX_BATCH_SIZE, MAX_ADDRESSES_PER_REQUEST};
use super::SharedState;

// ==============================================================================
// DTOs
// ==============================================================================

#[derive(Default, Deserialize)]
pub(super) struct TransactionsQuery {
    min_confirmations: Option<u64>,
    batch_size: Option<usize>,
}

#[derive(Deserialize)]
pub(super) struct MultiAddressRequest {
    addresses: Vec<String>,
    #[serde(flatten)]
    query: TransactionsQuery,
}

#[derive(Serialize)]
pub(super) struct BalanceResponse {
    address: String,
    confirmed_sats: i64,
    unconfirmed_sats: i64,
    total_sats: i64,
    total_btc: f64,
}

#[derive(Serialize)]
pub(super) struct HistoryResponse {
    address: String,
    entries: Vec<HistoryEntry>,
}

#[derive(Serialize)]
pub(super) struct TransactionsResponse {
    address: String,
    min_confirmations: u64,
    batch_size: usize,
    partial: bool,
    #[serde(flatten)]
    report: TransactionReport,
}

#[derive(Serialize)]
pub(super) struct MultiAddressResponse {
    min_confirmations: u64,
    batch_size: usize,
    results: Vec<AddressTransactions>,
}

// ==============================================================================
// Handlers
// ==============================================================================

pub(super) async fn get_balance(
    State(state): State<SharedState>,
    Path(address): Path<String>,
) -> Result<Json<BalanceResponse>, AppError> {
    let balance = state.source.get_address_balance(&address).await?;
    let total = balance.total();

    Ok(Json(BalanceResponse {
        address,
        confirmed_sats: balance.confirmed,
        unconfirmed_sats: balance.unconfirmed,
        total_sats: total.to_sat(),
        total_btc: total.to_btc(),
    }))
}

pub(super) async fn get_history(
    State(state): State<SharedState>,
    Path(address): Path<String>,
) -> Result<Json<HistoryResponse>, AppError> {
    let entries = state.source.get_address_history(&address).await?;
    Ok(Json(HistoryResponse { address, entries }))
}

pub(super) async fn get_transactions(
    State(state): State<SharedState>,
    Path(address): Path<String>,
    Query(query): Query<TransactionsQuery>,
) -> Result<Json<TransactionsResponse>, AppError> {
    let query = resolve_query(&state.default_query, &query)?;
    let report = state.source.get_transactions(&address, &query).await?;

    Ok(Json(TransactionsResponse {
        address,
        min_confirmations: query.min_confirmations,
        batch_size: query.batch_size,
        partial: report.is_partial(),
        report,
    }))
}

pub(super) async fn post_transactions(
    State(state): State<SharedState>,
    body: Result<Json<MultiAddressRequest>, JsonRejection>,
) -> Result<Json<MultiAddressResponse>, AppError> {
    let Json(request) = body?;
    if request.addresses.is_empty() {
        return Err(AppError::BadRequest("addresses must not be empty".into()));
    }
    if request.addresses.len() > MAX_ADDRESSES_PER_REQUEST {
        return Err(AppError::BadRequest(format!(
            "at most {MAX_ADDRESSES_PER_REQUEST} addresses per request"
        )));
    }

    let query = resolve_query(&state.default_query, &request.query)?;
    let results = state
        .source
        .get_transactions_for_addresses(&request.addresses, &query)
        .await?;

    Ok(Json(MultiAddressResponse {
        min_confirmations: query.min_confirmations,
        batch_size: query.batch_size,
        results,
    }))
}

/// Merge request overrides into the configured defaults, clamping the batch
/// size to the hard ceiling.
fn resolve_query(
    defaults: &TransactionQuery,
    query: &TransactionsQuery,
) -> Result<TransactionQuery, AppError> {
    validate_limit_bounds("batch_size", query.batch_size, HARD_MAX_BATCH_SIZE)?;

    Ok(TransactionQuery {
        min_confirmations: query
            .min_confirmations
            .unwrap_or(defaults.min_confirmations),
        batch_size: query
            .batch_size
            .unwrap_or(defaults.batch_size)
            .min(HARD_MAX_BATCH_SIZE),
    })
}
