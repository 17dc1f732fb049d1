use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::error::{ChainError, PortfolioError};
use crate::models::chain::ChainId;
use crate::models::yield_position::{YieldPosition, YieldProtocol};
use crate::services::chain_provider::ChainRegistry;
use crate::services::protocols;

/// Yield discovery across registered chains.
///
/// APYs are category defaults (see [`crate::models::yield_position::ProtocolCategory::default_apy`]),
/// not live protocol rates.
#[derive(Clone)]
pub struct YieldService {
    registry: ChainRegistry,
}

impl YieldService {
    pub fn new(registry: ChainRegistry) -> Self {
        Self { registry }
    }

    pub fn protocols_for(&self, chain: ChainId) -> Vec<YieldProtocol> {
        protocols::protocols_for(chain)
    }

    pub fn protocol_by_id(&self, id: &str) -> Option<YieldProtocol> {
        protocols::protocol_by_id(id)
    }

    /// Positions on `chain`, or empty when the chain has no provider or the
    /// provider fails (logged)
    pub async fn positions_for(&self, address: &str, chain: ChainId) -> Vec<YieldPosition> {
        match self.try_positions_for(address, chain).await {
            Ok(positions) => positions,
            Err(e) => {
                warn!(chain = %chain, wallet = %address, error = %e, "Yield position lookup failed");
                Vec::new()
            }
        }
    }

    /// Like [`Self::positions_for`] but surfaces provider errors
    pub async fn try_positions_for(&self, address: &str, chain: ChainId) -> Result<Vec<YieldPosition>, ChainError> {
        let Some(provider) = self.registry.get(chain) else {
            debug!(chain = %chain, "No provider registered, no yield positions");
            return Ok(Vec::new());
        };
        provider.yield_positions(address).await
    }

    /// Current APY (percent) for a pool of `protocol`
    pub fn current_apy(&self, _pool_address: &str, protocol: &YieldProtocol) -> Decimal {
        protocol.category.default_apy()
    }

    /// APY by protocol id, for callers that only have the identifier
    pub fn current_apy_by_id(&self, pool_address: &str, protocol_id: &str) -> Result<Decimal, PortfolioError> {
        let protocol = self
            .protocol_by_id(protocol_id)
            .ok_or_else(|| PortfolioError::UnknownProtocol(protocol_id.to_string()))?;
        Ok(self.current_apy(pool_address, &protocol))
    }

    pub fn estimated_daily_yield(&self, position: &YieldPosition) -> Decimal {
        position.daily_yield_usd()
    }

    pub fn estimated_annual_yield(&self, position: &YieldPosition) -> Decimal {
        position.annual_yield_usd()
    }
}
