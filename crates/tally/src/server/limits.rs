use axum::extract::State;
use axum::Json;
use serde::Serialize;

use super::error::AppError;
use super::SharedState;

// ==============================================================================
// Hard Ceilings for Transaction Queries
// ==============================================================================
//
// These caps protect the public peers regardless of CLI configuration.

pub(crate) const HARD_MAX_BATCH_SIZE: usize = 100;
pub(crate) const MAX_ADDRESSES_PER_REQUEST: usize = 50;

#[derive(Serialize)]
pub(super) struct LimitsResponse {
    hard_max_batch_size: usize,
    configured_default_batch_size: usize,
    effective_default_batch_size: usize,
    default_min_confirmations: u64,
    max_addresses_per_request: usize,
}

pub(super) async fn get_limits(State(state): State<SharedState>) -> Json<LimitsResponse> {
    let configured_default_batch_size = state.default_query.batch_size;

    Json(LimitsResponse {
        hard_max_batch_size: HARD_MAX_BATCH_SIZE,
        configured_default_batch_size,
        effective_default_batch_size: configured_default_batch_size.min(HARD_MAX_BATCH_SIZE),
        default_min_confirmations: state.default_query.min_confirmations,
        max_addresses_per_request: MAX_ADDRESSES_PER_REQUEST,
    })
}

pub(super) fn validate_limit_bounds(
    field: &str,
    value: Option<usize>,
    max: usize,
) -> Result<(), AppError> {
    if let Some(limit) = value {
        if limit == 0 {
            return Err(AppError::BadRequest(format!("{field} must be at least 1")));
        }
        if limit > max {
            return Err(AppError::BadRequest(format!(
                "{field} must be at most {max}"
            )));
        }
    }
    Ok(())
}
