use axum::{
    Json,
    extract::{Path, State},
};
use std::sync::Arc;

use crate::AppState;
use crate::error::PortfolioError;
use crate::handlers::errors::{ApiError, chain_error, parse_chain, portfolio_error};
use crate::models::blockchain::{
    AddressValidationResponse, NativeBalanceResponse, NetworkStatusResponse, TokenBalanceResponse,
};
use crate::models::chain::Chain;
use crate::models::token::TokenBalance;
use crate::services::chain_provider::ChainProvider;

fn provider_for(state: &AppState, chain: &str) -> Result<Arc<dyn ChainProvider>, ApiError> {
    let chain = parse_chain(chain)?;
    state
        .registry
        .get(chain)
        .ok_or_else(|| portfolio_error(PortfolioError::UnsupportedChain(chain)))
}

/// Handler for GET /api/blockchain/supported
pub async fn get_supported_chains(State(state): State<AppState>) -> Json<Vec<Chain>> {
    Json(state.registry.providers().map(|p| p.chain().clone()).collect())
}

/// Handler for GET /api/blockchain/{chain}/{address}/balance
pub async fn get_native_balance(
    State(state): State<AppState>,
    Path((chain, address)): Path<(String, String)>,
) -> Result<Json<NativeBalanceResponse>, ApiError> {
    let provider = provider_for(&state, &chain)?;
    let balance = provider.native_balance(&address).await.map_err(chain_error)?;

    Ok(Json(NativeBalanceResponse {
        chain: provider.chain().id,
        wallet_address: address,
        symbol: provider.chain().native_symbol.clone(),
        balance,
    }))
}

/// Handler for GET /api/blockchain/{chain}/{address}/token/{contract}
pub async fn get_token_balance(
    State(state): State<AppState>,
    Path((chain, address, contract)): Path<(String, String, String)>,
) -> Result<Json<TokenBalanceResponse>, ApiError> {
    let provider = provider_for(&state, &chain)?;
    provider.ensure_valid_address(&address).map_err(chain_error)?;

    let token = provider.token_info(&contract).await.map_err(chain_error)?;
    let balance = provider.token_balance(&address, &contract).await.map_err(chain_error)?;

    Ok(Json(TokenBalanceResponse {
        chain: provider.chain().id,
        wallet_address: address,
        value_usd: balance * token.price_usd,
        token,
        balance,
    }))
}

/// Handler for GET /api/blockchain/{chain}/{address}/tokens
pub async fn get_all_token_balances(
    State(state): State<AppState>,
    Path((chain, address)): Path<(String, String)>,
) -> Result<Json<Vec<TokenBalance>>, ApiError> {
    let provider = provider_for(&state, &chain)?;
    let balances = provider.all_token_balances(&address).await.map_err(chain_error)?;
    Ok(Json(balances))
}

/// Handler for GET /api/blockchain/{chain}/validate/{address}
pub async fn validate_address(
    State(state): State<AppState>,
    Path((chain, address)): Path<(String, String)>,
) -> Result<Json<AddressValidationResponse>, ApiError> {
    let provider = provider_for(&state, &chain)?;

    Ok(Json(AddressValidationResponse {
        chain: provider.chain().id,
        is_valid: provider.is_valid_address(&address),
        address,
    }))
}

/// Handler for GET /api/blockchain/{chain}/status
pub async fn get_network_status(
    State(state): State<AppState>,
    Path(chain): Path<String>,
) -> Result<Json<NetworkStatusResponse>, ApiError> {
    let provider = provider_for(&state, &chain)?;
    let (block_number, gas_price) = tokio::try_join!(provider.block_number(), provider.gas_price()).map_err(chain_error)?;

    Ok(Json(NetworkStatusResponse {
        chain: provider.chain().id,
        block_number,
        gas_price_gwei: gas_price,
    }))
}
