#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use chrono::Utc;
use portfolio_aggregator::{
    AppState,
    error::ChainError,
    models::{
        chain::{Chain, ChainId},
        token::{Token, TokenBalance, TokenKey},
        yield_position::YieldPosition,
    },
    services::{
        cache::Cache,
        chain_provider::{ChainProvider, ChainRegistry, is_valid_evm_address},
        portfolio::PortfolioService,
        price_oracle::{PriceOracle, PriceQuote},
        protocols::protocol_by_id,
        yield_service::YieldService,
    },
};
use rust_decimal::Decimal;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub const WALLET: &str = "0x742d35Cc6634C0532925a3b844Bc454e4438f44e";

#[derive(Clone, Copy, PartialEq)]
pub enum Behavior {
    Succeed,
    Fail,
    Hang,
}

/// In-memory chain provider with call counting
pub struct StubProvider {
    chain: Chain,
    balances: Vec<TokenBalance>,
    positions: Vec<YieldPosition>,
    behavior: Behavior,
    pub balance_calls: AtomicUsize,
    pub yield_calls: AtomicUsize,
}

impl StubProvider {
    pub fn new(chain: ChainId) -> Self {
        Self {
            chain: chain.descriptor(),
            balances: Vec::new(),
            positions: Vec::new(),
            behavior: Behavior::Succeed,
            balance_calls: AtomicUsize::new(0),
            yield_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_balance(mut self, symbol: &str, quantity: Decimal, price: Decimal) -> Self {
        let contract = format!("0x{:040x}", self.balances.len() + 1);
        let token = Token::new(symbol, symbol, self.chain.id, Some(contract), 18).with_price(price);
        self.balances.push(TokenBalance::new(token, WALLET, quantity));
        self
    }

    /// Deposit of `quantity` USDC (priced at 1) in the chain's first lending protocol
    pub fn with_position(mut self, protocol_id: &str, quantity: Decimal, apy: Decimal) -> Self {
        let protocol = protocol_by_id(protocol_id).expect("known protocol");
        let usdc = Token::new("USDC", "USD Coin", self.chain.id, None, 6).with_price(Decimal::ONE);
        self.positions.push(YieldPosition {
            id: format!("{}-{}", protocol_id, self.positions.len()),
            wallet_address: WALLET.to_string(),
            protocol,
            pool_name: "USDC pool".to_string(),
            pool_address: "0x0000000000000000000000000000000000000abc".to_string(),
            deposited_tokens: vec![TokenBalance::new(usdc, WALLET, quantity)],
            apy,
            entry_time: Utc::now(),
            last_updated: Utc::now(),
        });
        self
    }

    pub fn behaving(mut self, behavior: Behavior) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn balance_calls(&self) -> usize {
        self.balance_calls.load(Ordering::SeqCst)
    }

    async fn act<T>(&self, address: &str, operation: &'static str, value: T) -> Result<T, ChainError> {
        match self.behavior {
            Behavior::Succeed => Ok(value),
            Behavior::Fail => Err(ChainError::provider(self.chain.id, address, operation, "rpc unavailable")),
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(value)
            }
        }
    }
}

#[async_trait]
impl ChainProvider for StubProvider {
    fn chain(&self) -> &Chain {
        &self.chain
    }

    fn is_valid_address(&self, address: &str) -> bool {
        is_valid_evm_address(address)
    }

    async fn native_balance(&self, address: &str) -> Result<Decimal, ChainError> {
        self.ensure_valid_address(address)?;
        let native: Decimal = self
            .balances
            .iter()
            .filter(|b| b.token.symbol == self.chain.native_symbol)
            .map(|b| b.balance)
            .sum();
        self.act(address, "native_balance", native).await
    }

    async fn token_balance(&self, address: &str, contract_address: &str) -> Result<Decimal, ChainError> {
        self.ensure_valid_address(address)?;
        let balance = self
            .balances
            .iter()
            .find(|b| b.token.contract_address.as_deref() == Some(contract_address))
            .map(|b| b.balance)
            .unwrap_or_default();
        self.act(address, "token_balance", balance).await
    }

    async fn all_token_balances(&self, address: &str) -> Result<Vec<TokenBalance>, ChainError> {
        self.ensure_valid_address(address)?;
        self.balance_calls.fetch_add(1, Ordering::SeqCst);
        // Give concurrent callers a chance to pile up
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.act(address, "all_token_balances", self.balances.clone()).await
    }

    async fn token_info(&self, contract_address: &str) -> Result<Token, ChainError> {
        self.balances
            .iter()
            .find(|b| b.token.contract_address.as_deref() == Some(contract_address))
            .map(|b| b.token.clone())
            .ok_or_else(|| ChainError::provider(self.chain.id, "-", "token_info", "unknown contract"))
    }

    async fn yield_positions(&self, address: &str) -> Result<Vec<YieldPosition>, ChainError> {
        self.ensure_valid_address(address)?;
        self.yield_calls.fetch_add(1, Ordering::SeqCst);
        self.act(address, "yield_positions", self.positions.clone()).await
    }

    async fn gas_price(&self) -> Result<Decimal, ChainError> {
        self.act("-", "gas_price", Decimal::from(20)).await
    }

    async fn block_number(&self) -> Result<u64, ChainError> {
        self.act("-", "block_number", 12_345_678).await
    }
}

/// Oracle answering from a fixed (symbol, currency) table
#[derive(Default)]
pub struct StubOracle {
    prices: HashMap<(String, String), Decimal>,
}

impl StubOracle {
    pub fn with_price(mut self, symbol: &str, currency: &str, price: Decimal) -> Self {
        self.prices
            .insert((symbol.to_uppercase(), currency.to_lowercase()), price);
        self
    }

    fn lookup(&self, symbol: &str, currency: &str) -> Decimal {
        self.prices
            .get(&(symbol.to_uppercase(), currency.to_lowercase()))
            .copied()
            .unwrap_or_default()
    }
}

#[async_trait]
impl PriceOracle for StubOracle {
    async fn price_of(&self, symbol: &str, currency: &str) -> Decimal {
        self.lookup(symbol, currency)
    }

    async fn price_of_token(&self, token: &Token, currency: &str) -> Decimal {
        self.lookup(&token.symbol, currency)
    }

    async fn prices_of_symbols(&self, symbols: &[String], currency: &str) -> HashMap<String, Decimal> {
        symbols
            .iter()
            .map(|s| (s.clone(), self.lookup(s, currency)))
            .collect()
    }

    async fn quotes_of(&self, tokens: &[Token], currency: &str) -> HashMap<TokenKey, PriceQuote> {
        tokens
            .iter()
            .map(|t| {
                let quote = PriceQuote {
                    price: self.lookup(&t.symbol, currency),
                    change_24h: Decimal::ZERO,
                };
                (t.key(), quote)
            })
            .collect()
    }

    async fn price_change_percent(&self, _symbol: &str, _days: u32) -> Decimal {
        Decimal::ZERO
    }
}

pub fn registry(providers: &[Arc<StubProvider>]) -> ChainRegistry {
    ChainRegistry::new(
        providers
            .iter()
            .map(|p| p.clone() as Arc<dyn ChainProvider>)
            .collect(),
    )
}

pub fn portfolio_service(
    providers: &[Arc<StubProvider>],
    oracle: StubOracle,
    cache: Cache,
    deadline: Option<Duration>,
) -> PortfolioService {
    let registry = registry(providers);
    let yields = YieldService::new(registry.clone());
    PortfolioService::new(registry, yields, Arc::new(oracle), cache).with_deadline(deadline)
}

pub fn app_state(providers: &[Arc<StubProvider>], oracle: StubOracle) -> AppState {
    let cache = Cache::in_memory(Duration::from_secs(60));
    let registry = registry(providers);
    let yields = YieldService::new(registry.clone());
    let portfolio = PortfolioService::new(registry.clone(), yields.clone(), Arc::new(oracle), cache.clone())
        .with_deadline(Some(Duration::from_secs(2)));

    AppState {
        portfolio,
        yields,
        registry,
        cache,
    }
}

/// Request counters of the stub price API
#[derive(Clone, Default)]
pub struct PriceApiHits {
    pub coin_list: Arc<AtomicUsize>,
    pub simple_price: Arc<AtomicUsize>,
    pub market_chart: Arc<AtomicUsize>,
}

pub struct PriceServer {
    pub base_url: String,
    pub hits: PriceApiHits,
}

/// Local stand-in for the price API, bound to an ephemeral port
pub async fn spawn_price_server() -> PriceServer {
    let hits = PriceApiHits::default();
    let app = Router::new()
        .route("/coins/list", get(coin_list))
        .route("/simple/price", get(simple_price))
        .route("/coins/{id}/market_chart", get(market_chart))
        .with_state(hits.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    PriceServer {
        base_url: format!("http://{}", addr),
        hits,
    }
}

async fn coin_list(State(hits): State<PriceApiHits>) -> Json<Value> {
    hits.coin_list.fetch_add(1, Ordering::SeqCst);
    Json(json!([
        {"id": "pepe-token", "symbol": "pepe", "name": "Pepe"},
        {"id": "explode", "symbol": "boom", "name": "Boom"}
    ]))
}

async fn simple_price(
    State(hits): State<PriceApiHits>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, StatusCode> {
    hits.simple_price.fetch_add(1, Ordering::SeqCst);

    let currency = params.get("vs_currencies").cloned().unwrap_or_default();
    let ids = params.get("ids").cloned().unwrap_or_default();

    let mut body = serde_json::Map::new();
    for id in ids.split(',') {
        let price = match (id, currency.as_str()) {
            ("explode", _) => return Err(StatusCode::INTERNAL_SERVER_ERROR),
            ("ethereum", "usd") => 2000.0,
            ("ethereum", "eur") => 1500.0,
            ("usd-coin", "usd") => 1.0,
            ("usd-coin", "eur") => 0.75,
            ("pepe-token", "usd") => 0.5,
            _ => continue,
        };
        let mut quote = serde_json::Map::new();
        quote.insert(currency.clone(), json!(price));
        quote.insert(format!("{}_24h_change", currency), json!(1.5));
        body.insert(id.to_string(), Value::Object(quote));
    }
    Ok(Json(Value::Object(body)))
}

async fn market_chart(State(hits): State<PriceApiHits>, Path(_id): Path<String>) -> Json<Value> {
    hits.market_chart.fetch_add(1, Ordering::SeqCst);
    Json(json!({ "prices": [[0, 100.0], [1, 110.0], [2, 125.0]] }))
}

/// Lido stETH receipt token on Ethereum
pub const STETH: &str = "0xae7ab96520DE3A18E5e111B5EaAb095312D7fE84";

pub struct ChainServer {
    pub rpc_url: String,
    pub explorer_url: String,
}

/// Local stand-in for an EVM JSON-RPC node and an Etherscan-style explorer.
///
/// The wallet holds 1 stETH and nothing else; the explorer reports one stETH
/// transfer. Gas price is 20 gwei, the head block 12345678.
pub async fn spawn_chain_server() -> ChainServer {
    let app = Router::new()
        .route("/", post(json_rpc))
        .route("/api", get(explorer));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    ChainServer {
        rpc_url: format!("http://{}", addr),
        explorer_url: format!("http://{}/api", addr),
    }
}

async fn json_rpc(Json(request): Json<Value>) -> Json<Value> {
    let result = match request["method"].as_str().unwrap_or_default() {
        "eth_getBalance" => json!("0x0"),
        "eth_gasPrice" => json!(format!("0x{:x}", 20_000_000_000u64)),
        "eth_blockNumber" => json!(format!("0x{:x}", 12_345_678u64)),
        "eth_chainId" => json!("0x1"),
        "eth_call" => {
            let to = request["params"][0]["to"].as_str().unwrap_or_default();
            let amount: u128 = if to.eq_ignore_ascii_case(STETH) {
                1_000_000_000_000_000_000
            } else {
                0
            };
            json!(format!("0x{:064x}", amount))
        }
        other => {
            return Json(json!({
                "jsonrpc": "2.0",
                "id": request["id"],
                "error": {"code": -32601, "message": format!("method {} not found", other)}
            }));
        }
    };
    Json(json!({"jsonrpc": "2.0", "id": request["id"], "result": result}))
}

async fn explorer(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
    assert_eq!(params.get("action").map(String::as_str), Some("tokentx"));
    Json(json!({
        "status": "1",
        "message": "OK",
        "result": [{
            "contractAddress": STETH.to_lowercase(),
            "tokenName": "Liquid staked Ether 2.0",
            "tokenSymbol": "stETH",
            "tokenDecimal": "18",
            "value": "1000000000000000000"
        }]
    }))
}
