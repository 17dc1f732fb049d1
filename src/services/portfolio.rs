//! Portfolio aggregation across chains.
//!
//! Each read fans out to every provider that accepts the wallet address and
//! merges what comes back. A provider that fails or misses the deadline
//! contributes nothing and is listed in `Portfolio::failed_sources`; the rest
//! of the portfolio is still returned and cached.

use futures_util::future::join_all;
use rust_decimal::Decimal;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{ChainError, PortfolioError};
use crate::models::portfolio::{Portfolio, SourceFailure, merge_token_balances};
use crate::models::token::TokenBalance;
use crate::models::yield_position::YieldPosition;
use crate::services::cache::Cache;
use crate::services::chain_provider::{ChainProvider, ChainRegistry};
use crate::services::price_oracle::PriceOracle;
use crate::services::yield_service::YieldService;

/// Currencies `total_value` can report in
pub const SUPPORTED_CURRENCIES: [&str; 6] = ["usd", "eur", "gbp", "jpy", "btc", "eth"];

/// Stable coin whose quote converts USD totals into other currencies
const CONVERSION_SYMBOL: &str = "USDC";

#[derive(Clone)]
pub struct PortfolioService {
    registry: ChainRegistry,
    yield_service: YieldService,
    oracle: Arc<dyn PriceOracle>,
    cache: Cache,
    deadline: Option<Duration>,
}

impl PortfolioService {
    pub fn new(registry: ChainRegistry, yield_service: YieldService, oracle: Arc<dyn PriceOracle>, cache: Cache) -> Self {
        Self {
            registry,
            yield_service,
            oracle,
            cache,
            deadline: None,
        }
    }

    /// Per-source time limit; a source still pending when it expires counts as failed
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub async fn portfolio(&self, address: &str) -> Result<Portfolio, PortfolioError> {
        let providers = self.accepting_providers(address)?;
        self.cache
            .get_or_set(&portfolio_key(address), None, || async {
                Ok(self.build_portfolio(address, &providers).await)
            })
            .await
    }

    pub async fn token_balances(&self, address: &str) -> Result<Vec<TokenBalance>, PortfolioError> {
        let providers = self.accepting_providers(address)?;
        self.cache
            .get_or_set(&token_balances_key(address), None, || async {
                let (balances, _) = self.collect_token_balances(address, &providers).await;
                Ok(balances)
            })
            .await
    }

    pub async fn yield_positions(&self, address: &str) -> Result<Vec<YieldPosition>, PortfolioError> {
        let providers = self.accepting_providers(address)?;
        self.cache
            .get_or_set(&yield_positions_key(address), None, || async {
                let (positions, _) = self.collect_yield_positions(address, &providers).await;
                Ok(positions)
            })
            .await
    }

    /// Total portfolio value in `currency` (one of [`SUPPORTED_CURRENCIES`], any case)
    pub async fn total_value(&self, address: &str, currency: &str) -> Result<Decimal, PortfolioError> {
        let currency = normalize_currency(currency)?;
        self.accepting_providers(address)?;

        self.cache
            .get_or_set(&portfolio_value_key(address, &currency), None, || async {
                let total_usd = self.portfolio(address).await?.total_value_usd();
                if currency == "usd" {
                    return Ok(total_usd);
                }

                let rate = self.oracle.price_of(CONVERSION_SYMBOL, &currency).await;
                if rate.is_zero() {
                    return Err(PortfolioError::ConversionUnavailable(currency.clone()));
                }
                Ok(total_usd * rate)
            })
            .await
    }

    /// Drop every cached view of the wallet and rebuild the portfolio now
    pub async fn refresh(&self, address: &str) -> Result<Portfolio, PortfolioError> {
        let providers = self.accepting_providers(address)?;

        // Builds already running for these keys will not store their results
        for key in wallet_keys(address) {
            self.cache.invalidate(&key).await;
        }
        info!(wallet = %address, "Cleared cached portfolio data");

        // Computed outside get_or_set so an in-flight build is not reused
        let portfolio = self.build_portfolio(address, &providers).await;
        self.cache.set(&portfolio_key(address), &portfolio, None).await;
        Ok(portfolio)
    }

    fn accepting_providers(&self, address: &str) -> Result<Vec<Arc<dyn ChainProvider>>, PortfolioError> {
        let providers = self.registry.accepting(address);
        if providers.is_empty() {
            return Err(PortfolioError::InvalidAddress(address.to_string()));
        }
        Ok(providers)
    }

    async fn build_portfolio(&self, address: &str, providers: &[Arc<dyn ChainProvider>]) -> Portfolio {
        info!(wallet = %address, chains = providers.len(), "Building portfolio");

        let ((balances, token_failures), (positions, yield_failures)) = tokio::join!(
            self.collect_token_balances(address, providers),
            self.collect_yield_positions(address, providers),
        );

        let mut portfolio = Portfolio::new(address);
        portfolio.token_balances = balances;
        portfolio.yield_positions = positions;
        portfolio.failed_sources = token_failures.into_iter().chain(yield_failures).collect();

        if !portfolio.failed_sources.is_empty() {
            warn!(
                wallet = %address,
                failed = portfolio.failed_sources.len(),
                "Portfolio built with missing sources"
            );
        }
        portfolio
    }

    async fn collect_token_balances(
        &self,
        address: &str,
        providers: &[Arc<dyn ChainProvider>],
    ) -> (Vec<TokenBalance>, Vec<SourceFailure>) {
        let (balances, failures) = self
            .fan_out(providers, "all_token_balances", |provider| async move {
                provider.all_token_balances(address).await
            })
            .await;
        (merge_token_balances(balances), failures)
    }

    async fn collect_yield_positions(
        &self,
        address: &str,
        providers: &[Arc<dyn ChainProvider>],
    ) -> (Vec<YieldPosition>, Vec<SourceFailure>) {
        self.fan_out(providers, "yield_positions", |provider| async move {
            self.yield_service.try_positions_for(address, provider.chain().id).await
        })
        .await
    }

    /// Run `call` against every provider concurrently, keeping successes and
    /// recording failures
    async fn fan_out<T, F, Fut>(
        &self,
        providers: &[Arc<dyn ChainProvider>],
        operation: &str,
        call: F,
    ) -> (Vec<T>, Vec<SourceFailure>)
    where
        F: Fn(Arc<dyn ChainProvider>) -> Fut,
        Fut: Future<Output = Result<Vec<T>, ChainError>>,
    {
        let calls = providers.iter().map(|provider| {
            let chain = provider.chain().id;
            let pending = call(provider.clone());
            async move { (chain, self.within_deadline(pending).await) }
        });

        let mut items = Vec::new();
        let mut failures = Vec::new();
        for (chain, result) in join_all(calls).await {
            match result {
                Ok(mut found) => {
                    debug!(chain = %chain, operation, count = found.len(), "Source succeeded");
                    items.append(&mut found);
                }
                Err(message) => {
                    warn!(chain = %chain, operation, error = %message, "Source failed, skipping its contribution");
                    failures.push(SourceFailure {
                        chain,
                        operation: operation.to_string(),
                        message,
                    });
                }
            }
        }
        (items, failures)
    }

    async fn within_deadline<T>(&self, pending: impl Future<Output = Result<T, ChainError>>) -> Result<T, String> {
        match self.deadline {
            Some(limit) => match tokio::time::timeout(limit, pending).await {
                Ok(result) => result.map_err(|e| e.to_string()),
                Err(_) => Err(format!("timed out after {:?}", limit)),
            },
            None => pending.await.map_err(|e| e.to_string()),
        }
    }
}

fn normalize_currency(currency: &str) -> Result<String, PortfolioError> {
    let normalized = currency.trim().to_lowercase();
    if SUPPORTED_CURRENCIES.contains(&normalized.as_str()) {
        Ok(normalized)
    } else {
        Err(PortfolioError::UnsupportedCurrency(currency.to_string()))
    }
}

// EVM addresses are case-insensitive, so keys use the lowercase form

fn portfolio_key(address: &str) -> String {
    format!("portfolio:{}", address.to_lowercase())
}

fn token_balances_key(address: &str) -> String {
    format!("tokenBalances:{}", address.to_lowercase())
}

fn yield_positions_key(address: &str) -> String {
    format!("yieldPositions:{}", address.to_lowercase())
}

fn portfolio_value_key(address: &str, currency: &str) -> String {
    format!("portfolioValue:{}:{}", address.to_lowercase(), currency)
}

/// Every cache key scoped to one wallet
fn wallet_keys(address: &str) -> Vec<String> {
    let mut keys = vec![
        portfolio_key(address),
        token_balances_key(address),
        yield_positions_key(address),
    ];
    keys.extend(SUPPORTED_CURRENCIES.iter().map(|c| portfolio_value_key(address, c)));
    keys
}
