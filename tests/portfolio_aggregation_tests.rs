mod common;

use async_trait::async_trait;
use portfolio_aggregator::error::{ChainError, PortfolioError};
use portfolio_aggregator::models::chain::{Chain, ChainId};
use portfolio_aggregator::models::token::{Token, TokenBalance};
use portfolio_aggregator::models::yield_position::YieldPosition;
use portfolio_aggregator::services::cache::Cache;
use portfolio_aggregator::services::chain_provider::{ChainProvider, ChainRegistry, is_valid_evm_address};
use portfolio_aggregator::services::portfolio::PortfolioService;
use portfolio_aggregator::services::yield_service::YieldService;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crate::common::{Behavior, StubOracle, StubProvider, WALLET, portfolio_service};

fn cache() -> Cache {
    Cache::in_memory(Duration::from_secs(60))
}

#[tokio::test]
async fn test_failing_chain_does_not_abort_portfolio() {
    let ethereum = Arc::new(
        StubProvider::new(ChainId::Ethereum)
            .with_balance("ETH", dec!(1), dec!(2000))
            .with_position("aave-ethereum", dec!(3650), dec!(10)),
    );
    let polygon = Arc::new(
        StubProvider::new(ChainId::Polygon)
            .with_balance("POL", dec!(10), dec!(1))
            .behaving(Behavior::Fail),
    );
    let bsc = Arc::new(StubProvider::new(ChainId::BinanceSmartChain).with_balance("BNB", dec!(2), dec!(500)));

    let service = portfolio_service(&[ethereum, polygon, bsc], StubOracle::default(), cache(), None);
    let portfolio = service.portfolio(WALLET).await.unwrap();

    let symbols: Vec<_> = portfolio.token_balances.iter().map(|b| b.token.symbol.as_str()).collect();
    assert_eq!(symbols, vec!["ETH", "BNB"]);
    assert_eq!(portfolio.yield_positions.len(), 1);

    // 2000 + 1000 in tokens, 3650 deposited at 10%
    assert_eq!(portfolio.total_token_value_usd(), dec!(3000));
    assert_eq!(portfolio.total_value_usd(), dec!(6650));
    assert_eq!(portfolio.estimated_daily_yield_usd(), dec!(1));
    assert_eq!(portfolio.estimated_annual_yield_usd(), dec!(365));

    let failed: Vec<_> = portfolio
        .failed_sources
        .iter()
        .map(|f| (f.chain, f.operation.as_str()))
        .collect();
    assert_eq!(failed.len(), 2);
    assert!(failed.contains(&(ChainId::Polygon, "all_token_balances")));
    assert!(failed.contains(&(ChainId::Polygon, "yield_positions")));
    assert!(portfolio.failed_sources[0].message.contains("rpc unavailable"));
}

#[tokio::test]
async fn test_duplicate_balances_are_summed() {
    let ethereum = Arc::new(
        StubProvider::new(ChainId::Ethereum)
            .with_balance("USDC", dec!(100), dec!(1))
            .with_balance("USDC", dec!(50), dec!(1)),
    );
    let service = portfolio_service(&[ethereum], StubOracle::default(), cache(), None);

    let balances = service.token_balances(WALLET).await.unwrap();
    assert_eq!(balances.len(), 1);
    assert_eq!(balances[0].balance, dec!(150));
}

#[tokio::test]
async fn test_portfolio_is_served_from_cache() {
    let ethereum = Arc::new(StubProvider::new(ChainId::Ethereum).with_balance("ETH", dec!(1), dec!(2000)));
    let service = portfolio_service(&[ethereum.clone()], StubOracle::default(), cache(), None);

    let first = service.portfolio(WALLET).await.unwrap();
    let second = service.portfolio(&WALLET.to_lowercase()).await.unwrap();

    assert_eq!(first.total_value_usd(), second.total_value_usd());
    assert_eq!(ethereum.balance_calls(), 1);
}

#[tokio::test]
async fn test_concurrent_requests_share_one_build() {
    let ethereum = Arc::new(StubProvider::new(ChainId::Ethereum).with_balance("ETH", dec!(1), dec!(2000)));
    let service = portfolio_service(&[ethereum.clone()], StubOracle::default(), cache(), None);

    let requests = (0..5).map(|_| service.portfolio(WALLET));
    let results = futures_util::future::join_all(requests).await;

    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(ethereum.balance_calls(), 1);
}

#[tokio::test]
async fn test_refresh_invalidates_wallet_keys() {
    let ethereum = Arc::new(StubProvider::new(ChainId::Ethereum).with_balance("ETH", dec!(1), dec!(2000)));
    let oracle = StubOracle::default().with_price("USDC", "eur", dec!(0.5));
    let cache = cache();
    let service = portfolio_service(&[ethereum.clone()], oracle, cache.clone(), None);

    service.portfolio(WALLET).await.unwrap();
    service.token_balances(WALLET).await.unwrap();
    assert_eq!(service.total_value(WALLET, "EUR").await.unwrap(), dec!(1000));

    let wallet = WALLET.to_lowercase();
    assert!(cache.exists(&format!("portfolioValue:{}:eur", wallet)).await);
    let calls_before = ethereum.balance_calls();

    let refreshed = service.refresh(WALLET).await.unwrap();
    assert_eq!(refreshed.total_value_usd(), dec!(2000));
    assert_eq!(ethereum.balance_calls(), calls_before + 1);

    assert!(!cache.exists(&format!("portfolioValue:{}:eur", wallet)).await);
    assert!(!cache.exists(&format!("tokenBalances:{}", wallet)).await);
    // rebuilt and stored again
    assert!(cache.exists(&format!("portfolio:{}", wallet)).await);
}

#[tokio::test]
async fn test_pending_source_past_deadline_counts_as_failed() {
    let ethereum = Arc::new(StubProvider::new(ChainId::Ethereum).with_balance("ETH", dec!(1), dec!(2000)));
    let polygon = Arc::new(StubProvider::new(ChainId::Polygon).behaving(Behavior::Hang));
    let service = portfolio_service(
        &[ethereum, polygon],
        StubOracle::default(),
        cache(),
        Some(Duration::from_millis(200)),
    );

    let started = Instant::now();
    let portfolio = service.portfolio(WALLET).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(portfolio.total_value_usd(), dec!(2000));
    assert!(
        portfolio
            .failed_sources
            .iter()
            .any(|f| f.chain == ChainId::Polygon && f.message.contains("timed out"))
    );
}

#[tokio::test]
async fn test_invalid_address_fails_before_any_call() {
    let ethereum = Arc::new(StubProvider::new(ChainId::Ethereum));
    let service = portfolio_service(&[ethereum.clone()], StubOracle::default(), cache(), None);

    let err = service.portfolio("0xnot-an-address").await.unwrap_err();
    assert!(err.is_validation());
    assert!(matches!(err, PortfolioError::InvalidAddress(_)));
    assert!(service.yield_positions("").await.is_err());
    assert_eq!(ethereum.balance_calls(), 0);
}

#[tokio::test]
async fn test_total_value_currencies() {
    let ethereum = Arc::new(StubProvider::new(ChainId::Ethereum).with_balance("ETH", dec!(1), dec!(2000)));
    let oracle = StubOracle::default().with_price("USDC", "eur", dec!(0.5));
    let service = portfolio_service(&[ethereum], oracle, cache(), None);

    assert_eq!(service.total_value(WALLET, "usd").await.unwrap(), dec!(2000));
    assert_eq!(service.total_value(WALLET, "eur").await.unwrap(), dec!(1000));

    let err = service.total_value(WALLET, "doge").await.unwrap_err();
    assert!(matches!(err, PortfolioError::UnsupportedCurrency(_)));
    assert!(err.is_validation());

    // no USDC quote in yen
    let err = service.total_value(WALLET, "jpy").await.unwrap_err();
    assert!(matches!(err, PortfolioError::ConversionUnavailable(_)));
}

/// Wallet whose ETH balance grows by one on every read; the first read is slow
struct GrowingWallet {
    chain: Chain,
    reads: AtomicUsize,
}

#[async_trait]
impl ChainProvider for GrowingWallet {
    fn chain(&self) -> &Chain {
        &self.chain
    }

    fn is_valid_address(&self, address: &str) -> bool {
        is_valid_evm_address(address)
    }

    async fn native_balance(&self, _address: &str) -> Result<Decimal, ChainError> {
        Ok(Decimal::ZERO)
    }

    async fn token_balance(&self, _address: &str, _contract_address: &str) -> Result<Decimal, ChainError> {
        Ok(Decimal::ZERO)
    }

    async fn all_token_balances(&self, address: &str) -> Result<Vec<TokenBalance>, ChainError> {
        let read = self.reads.fetch_add(1, Ordering::SeqCst);
        if read == 0 {
            tokio::time::sleep(Duration::from_millis(300)).await;
        }
        let eth = Token::new("ETH", "Ether", self.chain.id, None, 18).with_price(Decimal::ONE);
        Ok(vec![TokenBalance::new(eth, address, Decimal::from(read + 1))])
    }

    async fn token_info(&self, _contract_address: &str) -> Result<Token, ChainError> {
        Err(ChainError::provider(self.chain.id, "-", "token_info", "unsupported"))
    }

    async fn yield_positions(&self, _address: &str) -> Result<Vec<YieldPosition>, ChainError> {
        Ok(Vec::new())
    }

    async fn gas_price(&self) -> Result<Decimal, ChainError> {
        Ok(Decimal::ONE)
    }

    async fn block_number(&self) -> Result<u64, ChainError> {
        Ok(1)
    }
}

#[tokio::test]
async fn test_build_started_before_refresh_does_not_overwrite_it() {
    let wallet: Arc<dyn ChainProvider> = Arc::new(GrowingWallet {
        chain: ChainId::Ethereum.descriptor(),
        reads: AtomicUsize::new(0),
    });
    let registry = ChainRegistry::new(vec![wallet]);
    let service = PortfolioService::new(
        registry.clone(),
        YieldService::new(registry),
        Arc::new(StubOracle::default()),
        cache(),
    );

    let (slow, refreshed) = tokio::join!(service.portfolio(WALLET), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        service.refresh(WALLET).await
    });

    assert_eq!(slow.unwrap().total_value_usd(), dec!(1));
    assert_eq!(refreshed.unwrap().total_value_usd(), dec!(2));

    // served from cache, still the refreshed build
    let served = service.portfolio(WALLET).await.unwrap();
    assert_eq!(served.total_value_usd(), dec!(2));
}
