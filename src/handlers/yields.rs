use axum::{
    Json,
    extract::{Path, State},
};

use crate::AppState;
use crate::handlers::errors::{ApiError, parse_chain, portfolio_error};
use crate::models::blockchain::ApyResponse;
use crate::models::yield_position::{YieldPosition, YieldProtocol};

/// Handler for GET /api/yield/protocols/{chain}
pub async fn get_protocols(
    State(state): State<AppState>,
    Path(chain): Path<String>,
) -> Result<Json<Vec<YieldProtocol>>, ApiError> {
    let chain = parse_chain(&chain)?;
    Ok(Json(state.yields.protocols_for(chain)))
}

/// Handler for GET /api/yield/positions/{address}/{chain}
///
/// A chain without a registered provider has no positions.
pub async fn get_positions(
    State(state): State<AppState>,
    Path((address, chain)): Path<(String, String)>,
) -> Result<Json<Vec<YieldPosition>>, ApiError> {
    let chain = parse_chain(&chain)?;

    if let Some(provider) = state.registry.get(chain) {
        provider
            .ensure_valid_address(&address)
            .map_err(|e| portfolio_error(e.into()))?;
    }

    Ok(Json(state.yields.positions_for(&address, chain).await))
}

/// Handler for GET /api/yield/apy/{protocol}/{pool}
pub async fn get_apy(
    State(state): State<AppState>,
    Path((protocol_id, pool_address)): Path<(String, String)>,
) -> Result<Json<ApyResponse>, ApiError> {
    let apy = state
        .yields
        .current_apy_by_id(&pool_address, &protocol_id)
        .map_err(portfolio_error)?;

    Ok(Json(ApyResponse {
        protocol_id,
        pool_address,
        apy,
    }))
}
