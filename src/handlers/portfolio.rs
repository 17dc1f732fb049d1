use axum::{
    Json,
    extract::{Path, Query, State},
};

use crate::AppState;
use crate::handlers::errors::{ApiError, portfolio_error};
use crate::models::portfolio::{PortfolioSummary, PortfolioValueQuery, PortfolioValueResponse};
use crate::models::token::TokenBalance;
use crate::models::yield_position::YieldPosition;

/// Handler for GET /api/portfolio/{address}
pub async fn get_portfolio(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<PortfolioSummary>, ApiError> {
    tracing::info!("Fetching portfolio for {}", address);
    let portfolio = state.portfolio.portfolio(&address).await.map_err(portfolio_error)?;
    Ok(Json(portfolio.into()))
}

/// Handler for GET /api/portfolio/{address}/tokens
pub async fn get_token_balances(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<Vec<TokenBalance>>, ApiError> {
    let balances = state.portfolio.token_balances(&address).await.map_err(portfolio_error)?;
    Ok(Json(balances))
}

/// Handler for GET /api/portfolio/{address}/yield
pub async fn get_yield_positions(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<Vec<YieldPosition>>, ApiError> {
    let positions = state.portfolio.yield_positions(&address).await.map_err(portfolio_error)?;
    Ok(Json(positions))
}

/// Handler for GET /api/portfolio/{address}/value?currency=eur
pub async fn get_portfolio_value(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Query(query): Query<PortfolioValueQuery>,
) -> Result<Json<PortfolioValueResponse>, ApiError> {
    let currency = query.currency.unwrap_or_else(|| "usd".to_string());
    let total_value = state
        .portfolio
        .total_value(&address, &currency)
        .await
        .map_err(portfolio_error)?;

    Ok(Json(PortfolioValueResponse {
        wallet_address: address,
        currency: currency.to_uppercase(),
        total_value,
    }))
}

/// Handler for POST /api/portfolio/{address}/refresh
pub async fn refresh_portfolio(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<PortfolioSummary>, ApiError> {
    tracing::info!("Refreshing portfolio for {}", address);
    let portfolio = state.portfolio.refresh(&address).await.map_err(portfolio_error)?;
    Ok(Json(portfolio.into()))
}
