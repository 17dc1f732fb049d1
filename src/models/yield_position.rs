use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::chain::ChainId;
use super::token::TokenBalance;

const DAYS_PER_YEAR: Decimal = dec!(365);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProtocolCategory {
    Lending,
    LiquidityPool,
    Vault,
    Staking,
    Farming,
}

impl ProtocolCategory {
    /// Fixed APY (percent) per category.
    ///
    /// This is an approximation used in place of a live on-chain rate; no
    /// protocol is queried for its actual yield.
    pub fn default_apy(&self) -> Decimal {
        match self {
            ProtocolCategory::Lending => dec!(3.5),
            ProtocolCategory::LiquidityPool => dec!(15.0),
            ProtocolCategory::Vault => dec!(8.0),
            ProtocolCategory::Staking => dec!(6.0),
            ProtocolCategory::Farming => dec!(25.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YieldProtocol {
    pub id: String,
    pub name: String,
    pub chain: ChainId,
    pub category: ProtocolCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
}

impl YieldProtocol {
    pub fn new(name: &str, chain: ChainId, category: ProtocolCategory, website: Option<&str>) -> Self {
        Self {
            id: format!("{}-{}", name.to_lowercase().replace(' ', "-"), chain.slug()),
            name: name.to_string(),
            chain,
            category,
            website: website.map(str::to_string),
        }
    }
}

/// A wallet's deposit in a yield-bearing pool.
///
/// Value and yield figures are computed from `deposited_tokens` and `apy`
/// on every read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YieldPosition {
    pub id: String,
    pub wallet_address: String,
    pub protocol: YieldProtocol,
    pub pool_name: String,
    pub pool_address: String,
    pub deposited_tokens: Vec<TokenBalance>,
    /// Annual percentage yield, in percent (3.5 = 3.5%)
    pub apy: Decimal,
    pub entry_time: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl YieldPosition {
    pub fn total_value_usd(&self) -> Decimal {
        self.deposited_tokens.iter().map(TokenBalance::value_usd).sum()
    }

    pub fn annual_yield_usd(&self) -> Decimal {
        self.total_value_usd() * self.apy / dec!(100)
    }

    pub fn daily_yield_usd(&self) -> Decimal {
        self.annual_yield_usd() / DAYS_PER_YEAR
    }

    pub fn chain(&self) -> ChainId {
        self.protocol.chain
    }
}
