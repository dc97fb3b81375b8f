use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use tally_core::types::{BlockHeaderInfo, Transaction};

use super::error::AppError;
use super::SharedState;

#[derive(Serialize)]
pub(super) struct RawTransactionResponse {
    txid: String,
    hex: String,
}

pub(super) async fn get_transaction(
    State(state): State<SharedState>,
    Path(txid_str): Path<String>,
) -> Result<Json<Transaction>, AppError> {
    let txid = parse_txid(&txid_str)?;
    Ok(Json(state.source.get_transaction(txid).await?))
}

pub(super) async fn get_raw_transaction(
    State(state): State<SharedState>,
    Path(txid_str): Path<String>,
) -> Result<Json<RawTransactionResponse>, AppError> {
    let txid = parse_txid(&txid_str)?;
    let hex = state.source.get_raw_transaction(txid).await?;
    Ok(Json(RawTransactionResponse {
        txid: txid.to_string(),
        hex,
    }))
}

pub(super) async fn get_block_header(
    State(state): State<SharedState>,
    Path(height_str): Path<String>,
) -> Result<Json<BlockHeaderInfo>, AppError> {
    let height: u32 = height_str
        .parse()
        .map_err(|e| AppError::BadRequest(format!("invalid block height: {e}")))?;
    Ok(Json(state.source.get_block_header(height).await?))
}

fn parse_txid(txid_str: &str) -> Result<bitcoin::Txid, AppError> {
    txid_str
        .parse()
        .map_err(|e| AppError::BadRequest(format!("invalid txid: {e}")))
}
