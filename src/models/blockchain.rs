use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::chain::ChainId;
use super::token::Token;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NativeBalanceResponse {
    pub chain: ChainId,
    pub wallet_address: String,
    pub symbol: String,
    pub balance: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenBalanceResponse {
    pub chain: ChainId,
    pub wallet_address: String,
    pub token: Token,
    pub balance: Decimal,
    pub value_usd: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressValidationResponse {
    pub chain: ChainId,
    pub address: String,
    pub is_valid: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApyResponse {
    pub protocol_id: String,
    pub pool_address: String,
    /// Percent
    pub apy: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkStatusResponse {
    pub chain: ChainId,
    pub block_number: u64,
    pub gas_price_gwei: Decimal,
}
