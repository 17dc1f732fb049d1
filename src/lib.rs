// src/lib.rs

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use services::{cache::Cache, chain_provider::ChainRegistry, portfolio::PortfolioService, yield_service::YieldService};

#[derive(Clone)]
pub struct AppState {
    pub portfolio: PortfolioService,
    pub yields: YieldService,
    pub registry: ChainRegistry,
    pub cache: Cache,
}

pub mod config;
pub mod error;

pub mod models {
    pub mod blockchain;
    pub mod chain;
    pub mod portfolio;
    pub mod token;
    pub mod yield_position;
}

pub mod services {
    pub mod cache;
    pub mod chain_provider;
    pub mod coingecko;
    pub mod evm_provider;
    pub mod memory_cache;
    pub mod portfolio;
    pub mod price_oracle;
    pub mod protocols;
    pub mod rate_limiter;
    pub mod redis_cache;
    pub mod yield_service;
}

pub mod handlers {
    pub mod blockchain;
    pub mod errors;
    pub mod health;
    pub mod portfolio;
    pub mod yields;
}

/// HTTP routes over the shared state
pub fn router(state: AppState) -> Router {
    use handlers::{blockchain, health, portfolio, yields};

    Router::new()
        .route("/health", get(health::health))
        .route("/health/ping", get(health::ping))
        .route("/api/portfolio/{address}", get(portfolio::get_portfolio))
        .route("/api/portfolio/{address}/tokens", get(portfolio::get_token_balances))
        .route("/api/portfolio/{address}/yield", get(portfolio::get_yield_positions))
        .route("/api/portfolio/{address}/value", get(portfolio::get_portfolio_value))
        .route("/api/portfolio/{address}/refresh", post(portfolio::refresh_portfolio))
        .route("/api/blockchain/supported", get(blockchain::get_supported_chains))
        .route("/api/blockchain/{chain}/{address}/balance", get(blockchain::get_native_balance))
        .route(
            "/api/blockchain/{chain}/{address}/token/{contract}",
            get(blockchain::get_token_balance),
        )
        .route("/api/blockchain/{chain}/{address}/tokens", get(blockchain::get_all_token_balances))
        .route("/api/blockchain/{chain}/validate/{address}", get(blockchain::validate_address))
        .route("/api/blockchain/{chain}/status", get(blockchain::get_network_status))
        .route("/api/yield/protocols/{chain}", get(yields::get_protocols))
        .route("/api/yield/positions/{address}/{chain}", get(yields::get_positions))
        .route("/api/yield/apy/{protocol}/{pool}", get(yields::get_apy))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
