use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::ChainError;
use crate::models::chain::{Chain, ChainId};
use crate::models::token::{Token, TokenBalance};
use crate::models::yield_position::YieldPosition;

lazy_static! {
    static ref EVM_ADDRESS: Regex = Regex::new(r"^0x[0-9a-fA-F]{40}$").unwrap();
}

/// `0x` followed by 40 hex digits, any case
pub fn is_valid_evm_address(address: &str) -> bool {
    EVM_ADDRESS.is_match(address)
}

/// Read access to one blockchain.
///
/// Every method that touches the network rejects a malformed address with
/// [`ChainError::InvalidAddress`] before issuing any request. Upstream
/// failures come back as [`ChainError::Provider`]; nothing is swallowed here.
#[async_trait]
pub trait ChainProvider: Send + Sync {
    fn chain(&self) -> &Chain;

    fn is_valid_address(&self, address: &str) -> bool;

    fn ensure_valid_address(&self, address: &str) -> Result<(), ChainError> {
        if self.is_valid_address(address) {
            Ok(())
        } else {
            Err(ChainError::invalid_address(self.chain().id, address))
        }
    }

    async fn native_balance(&self, address: &str) -> Result<Decimal, ChainError>;

    async fn token_balance(&self, address: &str, contract_address: &str) -> Result<Decimal, ChainError>;

    /// Every non-zero holding of `address`, native currency included, priced
    async fn all_token_balances(&self, address: &str) -> Result<Vec<TokenBalance>, ChainError>;

    async fn token_info(&self, contract_address: &str) -> Result<Token, ChainError>;

    async fn yield_positions(&self, address: &str) -> Result<Vec<YieldPosition>, ChainError>;

    /// Current gas price in gwei
    async fn gas_price(&self) -> Result<Decimal, ChainError>;

    async fn block_number(&self) -> Result<u64, ChainError>;
}

/// Chain -> provider map, built once at startup
#[derive(Clone, Default)]
pub struct ChainRegistry {
    providers: Arc<BTreeMap<ChainId, Arc<dyn ChainProvider>>>,
}

impl ChainRegistry {
    /// Later entries for the same chain replace earlier ones
    pub fn new(providers: Vec<Arc<dyn ChainProvider>>) -> Self {
        let providers = providers
            .into_iter()
            .map(|provider| (provider.chain().id, provider))
            .collect();
        Self {
            providers: Arc::new(providers),
        }
    }

    pub fn get(&self, chain: ChainId) -> Option<Arc<dyn ChainProvider>> {
        self.providers.get(&chain).cloned()
    }

    pub fn chains(&self) -> Vec<ChainId> {
        self.providers.keys().copied().collect()
    }

    pub fn providers(&self) -> impl Iterator<Item = &Arc<dyn ChainProvider>> {
        self.providers.values()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Providers whose address format accepts `address`
    pub fn accepting(&self, address: &str) -> Vec<Arc<dyn ChainProvider>> {
        self.providers
            .values()
            .filter(|provider| provider.is_valid_address(address))
            .cloned()
            .collect()
    }
}
