use anyhow::Context;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use portfolio_aggregator::{
    AppState,
    config::AppConfig,
    router,
    services::{
        cache::{Cache, build_cache_store},
        chain_provider::{ChainProvider, ChainRegistry},
        coingecko::{COINGECKO_RESOURCE, CoinGeckoService},
        evm_provider::EvmChainProvider,
        portfolio::PortfolioService,
        price_oracle::PriceOracle,
        rate_limiter::RateLimiter,
        yield_service::YieldService,
    },
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,portfolio_aggregator=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env().context("Invalid configuration")?;

    let store = build_cache_store(&config.cache, &config.redis).await;
    let cache = Cache::new(store, config.cache.default_ttl);

    let rate_limiter = RateLimiter::new();
    rate_limiter.configure(COINGECKO_RESOURCE, config.rate_limits.coingecko_per_sec);

    let oracle: Arc<dyn PriceOracle> = Arc::new(
        CoinGeckoService::new(&config.coingecko, &config.cache, cache.clone(), rate_limiter.clone())
            .context("Failed to set up CoinGecko client")?,
    );

    let mut providers: Vec<Arc<dyn ChainProvider>> = Vec::new();
    for chain in &config.chains {
        let provider = EvmChainProvider::new(chain, &config.rate_limits, oracle.clone(), rate_limiter.clone())
            .with_context(|| format!("Failed to set up {} provider", chain.chain))?;
        providers.push(Arc::new(provider));
    }
    if providers.is_empty() {
        tracing::warn!("No chains configured; set ETHEREUM_RPC_URL, POLYGON_RPC_URL or BSC_RPC_URL");
    }

    let registry = ChainRegistry::new(providers);
    let yields = YieldService::new(registry.clone());
    let portfolio = PortfolioService::new(registry.clone(), yields.clone(), oracle, cache.clone())
        .with_deadline(config.portfolio_deadline);

    let state = AppState {
        portfolio,
        yields,
        registry,
        cache,
    };

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;

    tracing::info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, router(state)).await?;
    Ok(())
}
