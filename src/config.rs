//! Environment-driven settings.
//!
//! Every value has a default except the per-chain RPC URLs: a chain is only
//! registered when its `<CHAIN>_RPC_URL` is present.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::models::chain::ChainId;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub cache: CacheSettings,
    pub redis: RedisSettings,
    pub coingecko: CoinGeckoSettings,
    pub chains: Vec<ChainSettings>,
    pub rate_limits: RateLimitSettings,
    /// Overall deadline for one portfolio fan-out; None disables it
    pub portfolio_deadline: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub default_ttl: Duration,
    pub price_ttl: Duration,
    pub coin_list_ttl: Duration,
    pub max_capacity: u64,
    pub use_redis: bool,
}

#[derive(Debug, Clone)]
pub struct RedisSettings {
    pub url: String,
    pub key_prefix: String,
    pub connect_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct CoinGeckoSettings {
    pub base_url: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ChainSettings {
    pub chain: ChainId,
    pub rpc_url: String,
    pub explorer_api_url: String,
    pub explorer_api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    pub coingecko_per_sec: u32,
    pub rpc_per_sec: u32,
    pub explorer_per_sec: u32,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(5 * 60),
            price_ttl: Duration::from_secs(2 * 60),
            coin_list_ttl: Duration::from_secs(24 * 3600),
            max_capacity: 10_000,
            use_redis: false,
        }
    }
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            coingecko_per_sec: 2,
            rpc_per_sec: 5,
            explorer_per_sec: 3,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = CacheSettings::default();
        let cache = CacheSettings {
            default_ttl: Duration::from_secs(60 * parse_var("CACHE_DEFAULT_TTL_MINUTES", 5u64)?),
            price_ttl: Duration::from_secs(60 * parse_var("CACHE_PRICE_TTL_MINUTES", 2u64)?),
            coin_list_ttl: Duration::from_secs(3600 * parse_var("CACHE_COIN_LIST_TTL_HOURS", 24u64)?),
            max_capacity: parse_var("CACHE_MAX_CAPACITY", defaults.max_capacity)?,
            use_redis: parse_var("CACHE_USE_REDIS", defaults.use_redis)?,
        };

        let redis = RedisSettings {
            url: string_var("REDIS_URL", "redis://localhost:6379"),
            key_prefix: string_var("REDIS_KEY_PREFIX", "portfolio:"),
            connect_timeout: Duration::from_secs(parse_var("REDIS_CONNECT_TIMEOUT_SECS", 5u64)?),
        };

        let coingecko = CoinGeckoSettings {
            base_url: string_var("COINGECKO_BASE_URL", "https://api.coingecko.com/api/v3"),
            api_key: optional_var("COINGECKO_API_KEY"),
        };

        let rate_defaults = RateLimitSettings::default();
        let rate_limits = RateLimitSettings {
            coingecko_per_sec: parse_var("COINGECKO_RATE_LIMIT", rate_defaults.coingecko_per_sec)?,
            rpc_per_sec: parse_var("RPC_RATE_LIMIT", rate_defaults.rpc_per_sec)?,
            explorer_per_sec: parse_var("EXPLORER_RATE_LIMIT", rate_defaults.explorer_per_sec)?,
        };

        let chains = [
            (ChainId::Ethereum, "ETHEREUM", "https://api.etherscan.io/api"),
            (ChainId::Polygon, "POLYGON", "https://api.polygonscan.com/api"),
            (ChainId::BinanceSmartChain, "BSC", "https://api.bscscan.com/api"),
        ]
        .into_iter()
        .filter_map(|(chain, prefix, default_explorer)| {
            optional_var(&format!("{}_RPC_URL", prefix)).map(|rpc_url| ChainSettings {
                chain,
                rpc_url,
                explorer_api_url: string_var(&format!("{}_EXPLORER_URL", prefix), default_explorer),
                explorer_api_key: optional_var(&format!("{}_EXPLORER_API_KEY", prefix)),
            })
        })
        .collect();

        let deadline_secs: u64 = parse_var("PORTFOLIO_DEADLINE_SECS", 30)?;

        Ok(Self {
            bind_addr: string_var("BIND_ADDR", "0.0.0.0:3000"),
            cache,
            redis,
            coingecko,
            chains,
            rate_limits,
            portfolio_deadline: (deadline_secs > 0).then(|| Duration::from_secs(deadline_secs)),
        })
    }
}

fn optional_var(key: &str) -> Option<String> {
    env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn string_var(key: &str, default: &str) -> String {
    optional_var(key).unwrap_or_else(|| default.to_string())
}

fn parse_var<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match optional_var(key) {
        Some(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value,
        }),
        None => Ok(default),
    }
}
