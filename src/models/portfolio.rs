use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};

use super::chain::ChainId;
use super::token::{TokenBalance, TokenKey};
use super::yield_position::YieldPosition;

/// A provider contribution that was dropped from the aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceFailure {
    pub chain: ChainId,
    pub operation: String,
    pub message: String,
}

/// Wallet holdings across all registered chains.
///
/// Only the two lists are stored; every monetary rollup is derived from
/// them when read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    pub wallet_address: String,
    pub token_balances: Vec<TokenBalance>,
    pub yield_positions: Vec<YieldPosition>,
    #[serde(default)]
    pub failed_sources: Vec<SourceFailure>,
    pub last_updated: DateTime<Utc>,
}

impl Portfolio {
    pub fn new(wallet_address: &str) -> Self {
        Self {
            wallet_address: wallet_address.to_string(),
            token_balances: Vec::new(),
            yield_positions: Vec::new(),
            failed_sources: Vec::new(),
            last_updated: Utc::now(),
        }
    }

    pub fn total_token_value_usd(&self) -> Decimal {
        self.token_balances.iter().map(TokenBalance::value_usd).sum()
    }

    pub fn total_yield_value_usd(&self) -> Decimal {
        self.yield_positions.iter().map(YieldPosition::total_value_usd).sum()
    }

    pub fn total_value_usd(&self) -> Decimal {
        self.total_token_value_usd() + self.total_yield_value_usd()
    }

    pub fn estimated_daily_yield_usd(&self) -> Decimal {
        self.yield_positions.iter().map(YieldPosition::daily_yield_usd).sum()
    }

    pub fn estimated_annual_yield_usd(&self) -> Decimal {
        self.estimated_daily_yield_usd() * dec!(365)
    }

    /// Value-weighted APY over all yield positions, in percent
    pub fn average_apy(&self) -> Decimal {
        let yield_value = self.total_yield_value_usd();
        if yield_value > Decimal::ZERO {
            self.estimated_annual_yield_usd() / yield_value * dec!(100)
        } else {
            Decimal::ZERO
        }
    }

    /// USD value per chain name, tokens and yield positions combined
    pub fn chain_distribution(&self) -> HashMap<String, Decimal> {
        let mut distribution: HashMap<String, Decimal> = HashMap::new();
        for balance in &self.token_balances {
            *distribution.entry(balance.token.chain.descriptor().name).or_default() += balance.value_usd();
        }
        for position in &self.yield_positions {
            *distribution.entry(position.chain().descriptor().name).or_default() += position.total_value_usd();
        }
        distribution
    }

    /// USD value per token symbol, including tokens deposited in yield positions
    pub fn token_distribution(&self) -> HashMap<String, Decimal> {
        let mut distribution: HashMap<String, Decimal> = HashMap::new();
        let deposited = self.yield_positions.iter().flat_map(|p| p.deposited_tokens.iter());
        for balance in self.token_balances.iter().chain(deposited) {
            *distribution.entry(balance.token.symbol.clone()).or_default() += balance.value_usd();
        }
        distribution
    }

    pub fn protocol_distribution(&self) -> HashMap<String, Decimal> {
        let mut distribution: HashMap<String, Decimal> = HashMap::new();
        for position in &self.yield_positions {
            *distribution.entry(position.protocol.name.clone()).or_default() += position.total_value_usd();
        }
        distribution
    }
}

/// Collapse balances sharing (symbol, chain) into one entry by summing quantities.
///
/// The result does not depend on input order: entries come out sorted by
/// chain then symbol, and the first non-zero price seen for a key wins.
pub fn merge_token_balances(balances: Vec<TokenBalance>) -> Vec<TokenBalance> {
    let mut merged: BTreeMap<TokenKey, TokenBalance> = BTreeMap::new();

    for balance in balances {
        match merged.entry(balance.token.key()) {
            Entry::Occupied(mut entry) => {
                let existing = entry.get_mut();
                existing.balance += balance.balance;
                if existing.token.price_usd.is_zero() && !balance.token.price_usd.is_zero() {
                    existing.token.price_usd = balance.token.price_usd;
                    existing.token.price_change_24h = balance.token.price_change_24h;
                }
                if balance.last_updated > existing.last_updated {
                    existing.last_updated = balance.last_updated;
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(balance);
            }
        }
    }

    merged.into_values().collect()
}

/// Portfolio with its derived figures, as returned over HTTP
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioSummary {
    pub wallet_address: String,
    pub token_balances: Vec<TokenBalance>,
    pub yield_positions: Vec<YieldPosition>,
    pub total_token_value_usd: Decimal,
    pub total_yield_value_usd: Decimal,
    pub total_portfolio_value_usd: Decimal,
    pub estimated_daily_yield_usd: Decimal,
    pub estimated_annual_yield_usd: Decimal,
    pub average_portfolio_apy: Decimal,
    pub chain_distribution: HashMap<String, Decimal>,
    pub token_distribution: HashMap<String, Decimal>,
    pub protocol_distribution: HashMap<String, Decimal>,
    pub failed_sources: Vec<SourceFailure>,
    pub last_updated: DateTime<Utc>,
}

impl From<Portfolio> for PortfolioSummary {
    fn from(portfolio: Portfolio) -> Self {
        Self {
            total_token_value_usd: portfolio.total_token_value_usd(),
            total_yield_value_usd: portfolio.total_yield_value_usd(),
            total_portfolio_value_usd: portfolio.total_value_usd(),
            estimated_daily_yield_usd: portfolio.estimated_daily_yield_usd(),
            estimated_annual_yield_usd: portfolio.estimated_annual_yield_usd(),
            average_portfolio_apy: portfolio.average_apy(),
            chain_distribution: portfolio.chain_distribution(),
            token_distribution: portfolio.token_distribution(),
            protocol_distribution: portfolio.protocol_distribution(),
            wallet_address: portfolio.wallet_address,
            token_balances: portfolio.token_balances,
            yield_positions: portfolio.yield_positions,
            failed_sources: portfolio.failed_sources,
            last_updated: portfolio.last_updated,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PortfolioValueQuery {
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioValueResponse {
    pub wallet_address: String,
    pub currency: String,
    pub total_value: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::token::Token;
    use crate::models::yield_position::{ProtocolCategory, YieldProtocol};

    const WALLET: &str = "0x00000000000000000000000000000000000000aa";

    fn balance(symbol: &str, chain: ChainId, qty: Decimal, price: Decimal) -> TokenBalance {
        let token = Token::new(symbol, symbol, chain, None, 18).with_price(price);
        TokenBalance::new(token, WALLET, qty)
    }

    fn yield_position(value: Decimal, apy: Decimal) -> YieldPosition {
        YieldPosition {
            id: "pos".to_string(),
            wallet_address: WALLET.to_string(),
            protocol: YieldProtocol::new("Aave", ChainId::Ethereum, ProtocolCategory::Lending, None),
            pool_name: "USDC Lending".to_string(),
            pool_address: "0x0".to_string(),
            deposited_tokens: vec![balance("USDC", ChainId::Ethereum, value, dec!(1))],
            apy,
            entry_time: Utc::now(),
            last_updated: Utc::now(),
        }
    }

    #[test]
    fn test_merge_sums_same_symbol_and_chain() {
        let merged = merge_token_balances(vec![
            balance("USDC", ChainId::Ethereum, dec!(100), dec!(1)),
            balance("USDC", ChainId::Ethereum, dec!(50), dec!(1)),
        ]);

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].token.symbol, "USDC");
        assert_eq!(merged[0].balance, dec!(150));
    }

    #[test]
    fn test_merge_keeps_chains_apart() {
        let merged = merge_token_balances(vec![
            balance("USDC", ChainId::Ethereum, dec!(100), dec!(1)),
            balance("USDC", ChainId::Polygon, dec!(50), dec!(1)),
            balance("ETH", ChainId::Ethereum, dec!(1), dec!(2000)),
        ]);
        assert_eq!(merged.len(), 3);
    }

    #[test]
    fn test_merge_is_order_independent() {
        let a = vec![
            balance("USDC", ChainId::Ethereum, dec!(100), dec!(0)),
            balance("ETH", ChainId::Ethereum, dec!(1), dec!(2000)),
            balance("USDC", ChainId::Ethereum, dec!(50), dec!(1)),
        ];
        let mut b = a.clone();
        b.reverse();

        let keyed = |v: Vec<TokenBalance>| -> Vec<(String, Decimal, Decimal)> {
            merge_token_balances(v)
                .into_iter()
                .map(|t| (t.token.symbol, t.balance, t.token.price_usd))
                .collect()
        };
        assert_eq!(keyed(a), keyed(b));
    }

    #[test]
    fn test_rollups() {
        let mut portfolio = Portfolio::new(WALLET);
        portfolio.token_balances = vec![
            balance("ETH", ChainId::Ethereum, dec!(0.25), dec!(2000)),
            balance("USDC", ChainId::Polygon, dec!(500), dec!(1)),
        ];
        portfolio.yield_positions = vec![yield_position(dec!(500), dec!(36.5))];

        assert_eq!(portfolio.total_token_value_usd(), dec!(1000));
        assert_eq!(portfolio.total_yield_value_usd(), dec!(500));
        assert_eq!(portfolio.total_value_usd(), dec!(1500));
        assert_eq!(portfolio.estimated_daily_yield_usd(), dec!(0.5));
        assert_eq!(portfolio.estimated_annual_yield_usd(), dec!(182.5));
        assert_eq!(portfolio.average_apy(), dec!(36.5));
    }

    #[test]
    fn test_average_apy_without_positions() {
        let portfolio = Portfolio::new(WALLET);
        assert_eq!(portfolio.average_apy(), Decimal::ZERO);
        assert_eq!(portfolio.total_value_usd(), Decimal::ZERO);
    }

    #[test]
    fn test_distributions() {
        let mut portfolio = Portfolio::new(WALLET);
        portfolio.token_balances = vec![
            balance("USDC", ChainId::Ethereum, dec!(100), dec!(1)),
            balance("USDC", ChainId::Polygon, dec!(50), dec!(1)),
        ];
        portfolio.yield_positions = vec![yield_position(dec!(200), dec!(3.5))];

        let by_chain = portfolio.chain_distribution();
        assert_eq!(by_chain.get("Ethereum"), Some(&dec!(300)));
        assert_eq!(by_chain.get("Polygon"), Some(&dec!(50)));

        let by_token = portfolio.token_distribution();
        assert_eq!(by_token.get("USDC"), Some(&dec!(350)));

        let by_protocol = portfolio.protocol_distribution();
        assert_eq!(by_protocol.get("Aave"), Some(&dec!(200)));
    }

    #[test]
    fn test_cached_form_has_no_rollups() {
        let mut portfolio = Portfolio::new(WALLET);
        portfolio.token_balances = vec![balance("ETH", ChainId::Ethereum, dec!(1), dec!(2000))];

        let json = serde_json::to_value(&portfolio).unwrap();
        assert!(json.get("total_value_usd").is_none());

        let restored: Portfolio = serde_json::from_value(json).unwrap();
        assert_eq!(restored.total_value_usd(), dec!(2000));
    }
}
