use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::token::Token;

/// Supported blockchain networks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChainId {
    Ethereum,
    Polygon,
    BinanceSmartChain,
    Avalanche,
    Arbitrum,
    Optimism,
    Fantom,
}

impl ChainId {
    pub const ALL: [ChainId; 7] = [
        ChainId::Ethereum,
        ChainId::Polygon,
        ChainId::BinanceSmartChain,
        ChainId::Avalanche,
        ChainId::Arbitrum,
        ChainId::Optimism,
        ChainId::Fantom,
    ];

    /// Path/config slug (e.g., "ethereum", "bsc")
    pub fn slug(&self) -> &'static str {
        match self {
            ChainId::Ethereum => "ethereum",
            ChainId::Polygon => "polygon",
            ChainId::BinanceSmartChain => "bsc",
            ChainId::Avalanche => "avalanche",
            ChainId::Arbitrum => "arbitrum",
            ChainId::Optimism => "optimism",
            ChainId::Fantom => "fantom",
        }
    }

    /// Static descriptor for this chain
    pub fn descriptor(&self) -> Chain {
        match self {
            ChainId::Ethereum => Chain::evm(*self, "Ethereum", 1, "ETH", "Ether", dec!(12.0), "https://etherscan.io"),
            ChainId::Polygon => Chain::evm(*self, "Polygon", 137, "POL", "Polygon Ecosystem Token", dec!(2.1), "https://polygonscan.com"),
            ChainId::BinanceSmartChain => Chain::evm(*self, "BNB Smart Chain", 56, "BNB", "BNB", dec!(3.0), "https://bscscan.com"),
            ChainId::Avalanche => Chain::evm(*self, "Avalanche C-Chain", 43114, "AVAX", "Avalanche", dec!(2.0), "https://snowtrace.io"),
            ChainId::Arbitrum => Chain::evm(*self, "Arbitrum One", 42161, "ETH", "Ether", dec!(0.25), "https://arbiscan.io"),
            ChainId::Optimism => Chain::evm(*self, "OP Mainnet", 10, "ETH", "Ether", dec!(2.0), "https://optimistic.etherscan.io"),
            ChainId::Fantom => Chain::evm(*self, "Fantom Opera", 250, "FTM", "Fantom", dec!(1.0), "https://ftmscan.com"),
        }
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for ChainId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ethereum" | "eth" | "mainnet" => Ok(ChainId::Ethereum),
            "polygon" | "matic" => Ok(ChainId::Polygon),
            "bsc" | "bnb" | "binance-smart-chain" | "binancesmartchain" => Ok(ChainId::BinanceSmartChain),
            "avalanche" | "avax" => Ok(ChainId::Avalanche),
            "arbitrum" => Ok(ChainId::Arbitrum),
            "optimism" => Ok(ChainId::Optimism),
            "fantom" => Ok(ChainId::Fantom),
            other => Err(format!("Unsupported blockchain: {}", other)),
        }
    }
}

/// Immutable chain descriptor, created once at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chain {
    pub id: ChainId,
    pub name: String,
    /// EVM chain id (1 for Ethereum mainnet)
    pub chain_id: u64,
    pub native_symbol: String,
    pub native_name: String,
    pub native_decimals: u8,
    pub average_block_time_secs: Decimal,
    pub explorer_url: String,
    pub is_evm: bool,
}

impl Chain {
    fn evm(
        id: ChainId,
        name: &str,
        chain_id: u64,
        native_symbol: &str,
        native_name: &str,
        average_block_time_secs: Decimal,
        explorer_url: &str,
    ) -> Self {
        Self {
            id,
            name: name.to_string(),
            chain_id,
            native_symbol: native_symbol.to_string(),
            native_name: native_name.to_string(),
            native_decimals: 18,
            average_block_time_secs,
            explorer_url: explorer_url.to_string(),
            is_evm: true,
        }
    }

    /// Native currency as an unpriced token
    pub fn native_token(&self) -> Token {
        Token::native(self)
    }
}
