//! Static catalog of yield protocols and the pools whose receipt tokens are
//! read to detect positions.

use crate::models::chain::ChainId;
use crate::models::token::Token;
use crate::models::yield_position::{ProtocolCategory, YieldProtocol};

/// Every protocol the service knows about, across chains
pub fn known_protocols() -> Vec<YieldProtocol> {
    use ProtocolCategory::*;

    vec![
        YieldProtocol::new("Aave", ChainId::Ethereum, Lending, Some("https://aave.com")),
        YieldProtocol::new("Uniswap", ChainId::Ethereum, LiquidityPool, Some("https://uniswap.org")),
        YieldProtocol::new("Yearn", ChainId::Ethereum, Vault, Some("https://yearn.fi")),
        YieldProtocol::new("Lido", ChainId::Ethereum, Staking, Some("https://lido.fi")),
        YieldProtocol::new("Aave", ChainId::Polygon, Lending, Some("https://aave.com")),
        YieldProtocol::new("Quickswap", ChainId::Polygon, LiquidityPool, Some("https://quickswap.exchange")),
        YieldProtocol::new("PancakeSwap", ChainId::BinanceSmartChain, LiquidityPool, Some("https://pancakeswap.finance")),
    ]
}

pub fn protocols_for(chain: ChainId) -> Vec<YieldProtocol> {
    known_protocols()
        .into_iter()
        .filter(|protocol| protocol.chain == chain)
        .collect()
}

/// Lookup by protocol id (e.g., "aave-ethereum")
pub fn protocol_by_id(id: &str) -> Option<YieldProtocol> {
    let id = id.to_lowercase();
    known_protocols().into_iter().find(|protocol| protocol.id == id)
}

/// A pool whose deposits are represented by a receipt token held in the
/// wallet, redeemable 1:1 for `underlying`.
#[derive(Debug, Clone)]
pub struct TrackedPool {
    pub protocol: YieldProtocol,
    pub pool_name: String,
    pub receipt_token: String,
    pub underlying: Token,
}

impl TrackedPool {
    fn new(protocol_name: &str, chain: ChainId, pool_name: &str, receipt_token: &str, underlying: Token) -> Option<Self> {
        let protocol = protocols_for(chain)
            .into_iter()
            .find(|protocol| protocol.name == protocol_name)?;

        Some(Self {
            protocol,
            pool_name: pool_name.to_string(),
            receipt_token: receipt_token.to_string(),
            underlying,
        })
    }
}

fn erc20(symbol: &str, name: &str, chain: ChainId, contract: &str, decimals: u8, coingecko_id: &str) -> Token {
    Token::new(symbol, name, chain, Some(contract.to_string()), decimals).with_coingecko_id(coingecko_id)
}

pub fn tracked_pools(chain: ChainId) -> Vec<TrackedPool> {
    let pools = match chain {
        ChainId::Ethereum => vec![
            TrackedPool::new(
                "Aave",
                chain,
                "Aave V3 USDC",
                "0x98C23E9d8f34FEFb1B7BD6a91B7FF122F4e16F5c",
                erc20("USDC", "USD Coin", chain, "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48", 6, "usd-coin"),
            ),
            TrackedPool::new(
                "Aave",
                chain,
                "Aave V3 WETH",
                "0x4d5F47FA6A74757f35C14fD3a6Ef8E3C9BC514E8",
                erc20("WETH", "Wrapped Ether", chain, "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2", 18, "weth"),
            ),
            TrackedPool::new(
                "Lido",
                chain,
                "Lido stETH",
                "0xae7ab96520DE3A18E5e111B5EaAb095312D7fE84",
                Token::native(&chain.descriptor()).with_coingecko_id("ethereum"),
            ),
        ],
        ChainId::Polygon => vec![TrackedPool::new(
            "Aave",
            chain,
            "Aave V3 USDC.e",
            "0x625E7708f30cA75bfd92586e17077590C60eb4cD",
            erc20("USDC", "USD Coin (PoS)", chain, "0x2791Bca1f2de4661ED88A30C99A7a9449Aa84174", 6, "usd-coin"),
        )],
        _ => Vec::new(),
    };

    pools.into_iter().flatten().collect()
}

/// Whether `contract` is the receipt token of a tracked pool on `chain`.
///
/// Those holdings are reported as yield positions, not token balances.
pub fn is_receipt_token(chain: ChainId, contract: &str) -> bool {
    tracked_pools(chain)
        .iter()
        .any(|pool| pool.receipt_token.eq_ignore_ascii_case(contract))
}
