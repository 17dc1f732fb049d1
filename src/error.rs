use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

use crate::models::chain::ChainId;

/// Errors raised by a chain provider
#[derive(Debug, Clone, Error)]
pub enum ChainError {
    /// Caller mistake; never retried
    #[error("Invalid {chain} address: {address}")]
    InvalidAddress { chain: ChainId, address: String },

    /// Upstream RPC/explorer failure
    #[error("{chain} {operation} failed for wallet {wallet}{}: {message}", contract_suffix(.contract))]
    Provider {
        chain: ChainId,
        wallet: String,
        contract: Option<String>,
        operation: &'static str,
        message: String,
    },
}

lazy_static! {
    static ref URL: Regex = Regex::new(r"(https?|wss?)://(?:[^@/\s()]*@)?([^/?#\s()]+)[^\s()]*").unwrap();
}

/// Strip credentials, paths and query strings from every URL in `message`
pub fn mask_urls(message: &str) -> String {
    URL.replace_all(message, "${1}://${2}/***").into_owned()
}

fn contract_suffix(contract: &Option<String>) -> String {
    contract
        .as_ref()
        .map(|c| format!(" (contract {})", c))
        .unwrap_or_default()
}

impl ChainError {
    pub fn invalid_address(chain: ChainId, address: &str) -> Self {
        ChainError::InvalidAddress {
            chain,
            address: address.to_string(),
        }
    }

    pub fn provider(
        chain: ChainId,
        wallet: &str,
        operation: &'static str,
        message: impl ToString,
    ) -> Self {
        ChainError::Provider {
            chain,
            wallet: wallet.to_string(),
            contract: None,
            operation,
            message: mask_urls(&message.to_string()),
        }
    }

    pub fn with_contract(self, contract_address: &str) -> Self {
        match self {
            ChainError::Provider {
                chain,
                wallet,
                operation,
                message,
                ..
            } => ChainError::Provider {
                chain,
                wallet,
                contract: Some(contract_address.to_string()),
                operation,
                message,
            },
            other => other,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, ChainError::InvalidAddress { .. })
    }
}

/// Price API failures. Kept inside the oracle, which degrades to zero.
#[derive(Debug, Error)]
pub enum PriceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("CoinGecko API error {status}: {body}")]
    Upstream { status: u16, body: String },
}

/// Cache backend failures. Kept inside the cache, which degrades to a miss.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Redis connection timed out after {0}s")]
    ConnectTimeout(u64),
}

#[derive(Debug, Error)]
pub enum PortfolioError {
    #[error("Invalid wallet address: {0}")]
    InvalidAddress(String),

    #[error("Unsupported currency: {0}")]
    UnsupportedCurrency(String),

    #[error("No provider registered for {0}")]
    UnsupportedChain(ChainId),

    #[error("Unknown protocol: {0}")]
    UnknownProtocol(String),

    #[error("No conversion rate available for {0}")]
    ConversionUnavailable(String),

    #[error(transparent)]
    Chain(#[from] ChainError),
}

impl PortfolioError {
    pub fn is_validation(&self) -> bool {
        match self {
            PortfolioError::InvalidAddress(_) | PortfolioError::UnsupportedCurrency(_) => true,
            PortfolioError::Chain(e) => e.is_validation(),
            PortfolioError::UnsupportedChain(_)
            | PortfolioError::UnknownProtocol(_)
            | PortfolioError::ConversionUnavailable(_) => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}
